/*
 *
 *    Copyright (c) 2020-2024 Project CHIP Authors
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

use core::time::Duration;

use rs_matter_thermostat::acl::CallerIdentity;
use rs_matter_thermostat::dm::clusters::thermostat::{
    AttributeId, Feature, ListOp, Preset, PresetScenario, Schedule, SystemMode,
};
use rs_matter_thermostat::error::ErrorCode;
use rs_matter_thermostat::im::{AtomicRequest, AtomicRequestType, IMStatusCode};

use crate::common::{
    advance, alice, bob, cluster, init_env_logger, TestCluster, ALL_FEATURES, HOME, NIGHT,
};

const PRESETS: u32 = AttributeId::Presets.id();
const SCHEDULES: u32 = AttributeId::Schedules.id();

fn count(cluster: &TestCluster, caller: Option<&CallerIdentity>) -> usize {
    let mut count = 0;

    cluster
        .read_presets(caller, |_| {
            count += 1;
            Ok(())
        })
        .unwrap();

    count
}

#[test]
fn test_begin_while_open() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);
    let begin = AtomicRequest::begin(&[PRESETS], 30_000).unwrap();

    let response = cluster.handle_atomic_request(&alice(), &begin).unwrap();
    assert_eq!(response.status, IMStatusCode::Success);
    assert_eq!(response.status_of(PRESETS), Some(IMStatusCode::Success));
    // The delegate allows at most 10s per attribute
    assert_eq!(response.timeout, Some(Duration::from_secs(10)));
    assert!(cluster.in_atomic_write(Some(&alice()), None));

    let err = cluster.handle_atomic_request(&bob(), &begin).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Busy);

    let err = cluster.handle_atomic_request(&alice(), &begin).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInState);

    // Even on a disjoint attribute set
    let begin = AtomicRequest::begin(&[SCHEDULES], 30_000).unwrap();
    let err = cluster.handle_atomic_request(&bob(), &begin).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Busy);

    assert!(cluster.in_atomic_write(Some(&alice()), None));
    assert!(!cluster.in_atomic_write(Some(&bob()), None));
}

#[test]
fn test_begin_malformed() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);

    // No timeout
    let request = AtomicRequest::new(AtomicRequestType::BeginWrite, &[PRESETS], None).unwrap();
    let err = cluster.handle_atomic_request(&alice(), &request).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidCommand);

    // No attributes
    let request = AtomicRequest::begin(&[], 1000).unwrap();
    let err = cluster.handle_atomic_request(&alice(), &request).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidCommand);

    // Duplicate attribute
    let request = AtomicRequest::begin(&[PRESETS, PRESETS], 1000).unwrap();
    let response = cluster.handle_atomic_request(&alice(), &request).unwrap();
    assert_eq!(response.status, IMStatusCode::InvalidCommand);
    assert_eq!(response.attribute_status[0].status, IMStatusCode::Success);
    assert_eq!(response.attribute_status[1].status, IMStatusCode::InvalidCommand);
    assert_eq!(response.timeout, None);

    // Attributes which cannot be written atomically
    let setpoint = AttributeId::OccupiedHeatingSetpoint.id();
    let request = AtomicRequest::begin(&[PRESETS, setpoint, 0xFFF0], 1000).unwrap();
    let response = cluster.handle_atomic_request(&alice(), &request).unwrap();
    assert_eq!(response.status, IMStatusCode::InvalidCommand);
    assert_eq!(response.status_of(PRESETS), Some(IMStatusCode::Success));
    assert_eq!(response.status_of(setpoint), Some(IMStatusCode::UnsupportedWrite));
    assert_eq!(response.status_of(0xFFF0), Some(IMStatusCode::UnsupportedAttribute));

    assert!(!cluster.session().is_open());
    assert!(cluster.delegate().pending_presets().is_empty());
}

#[test]
fn test_begin_without_feature() {
    init_env_logger();

    let mut cluster = cluster(Feature::HEATING | Feature::COOLING | Feature::PRESETS);

    let request = AtomicRequest::begin(&[PRESETS, SCHEDULES], 1000).unwrap();
    let response = cluster.handle_atomic_request(&alice(), &request).unwrap();
    assert_eq!(response.status, IMStatusCode::InvalidCommand);
    assert_eq!(response.status_of(PRESETS), Some(IMStatusCode::Success));
    assert_eq!(
        response.status_of(SCHEDULES),
        Some(IMStatusCode::UnsupportedAttribute)
    );
    assert!(!cluster.session().is_open());
}

#[test]
fn test_begin_without_device_timeout() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);
    cluster
        .delegate_mut()
        .set_atomic_write_timeout(Duration::ZERO);

    let request = AtomicRequest::begin(&[PRESETS], 1000).unwrap();
    let response = cluster.handle_atomic_request(&alice(), &request).unwrap();
    assert_eq!(response.status, IMStatusCode::Failure);
    assert_eq!(response.timeout, None);
    assert!(!cluster.session().is_open());
}

#[test]
fn test_timeout_is_summed_over_attributes() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);

    let request = AtomicRequest::begin(&[PRESETS, SCHEDULES], 60_000).unwrap();
    let response = cluster.handle_atomic_request(&alice(), &request).unwrap();
    assert_eq!(response.status, IMStatusCode::Success);
    assert_eq!(response.timeout, Some(Duration::from_secs(20)));
    assert_eq!(cluster.deadline(), Some(Duration::from_secs(20)));
}

#[test]
fn test_pending_view() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);

    let request = AtomicRequest::begin(&[PRESETS], 5000).unwrap();
    cluster.handle_atomic_request(&alice(), &request).unwrap();

    // Seeded from the committed list
    assert_eq!(cluster.delegate().pending_presets(), cluster.delegate().presets());

    cluster
        .write_presets(
            &alice(),
            ListOp::AppendItem(
                Preset::new(PresetScenario::Occupied).with_setpoints(Some(2500), Some(2000)),
            ),
        )
        .unwrap();

    assert_eq!(count(&cluster, Some(&alice())), 4);
    assert_eq!(count(&cluster, Some(&bob())), 3);
    assert_eq!(count(&cluster, None), 3);

    let err = cluster
        .write_presets(&bob(), ListOp::AppendItem(Preset::new(PresetScenario::Sleep)))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Busy);

    let err = cluster
        .write_presets(&alice(), ListOp::DeleteItem(0))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedWrite);

    // Schedules are not part of the session
    let err = cluster
        .write_schedules(&alice(), ListOp::AppendItem(Schedule::new(SystemMode::Heat)))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInState);

    let request = AtomicRequest::rollback(&[PRESETS]).unwrap();
    cluster.handle_atomic_request(&alice(), &request).unwrap();

    let err = cluster
        .write_presets(&alice(), ListOp::AppendItem(Preset::new(PresetScenario::Sleep)))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInState);
    assert_eq!(cluster.delegate().presets().len(), 3);
}

#[test]
fn test_commit() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);
    let dataver = cluster.dataver();

    let request = AtomicRequest::begin(&[PRESETS], 5000).unwrap();
    cluster.handle_atomic_request(&alice(), &request).unwrap();

    cluster
        .write_presets(
            &alice(),
            ListOp::AppendItem(
                Preset::new(PresetScenario::UserDefined)
                    .with_name("Movie night")
                    .unwrap()
                    .with_setpoints(Some(2500), Some(2050)),
            ),
        )
        .unwrap();

    let request = AtomicRequest::commit(&[PRESETS]).unwrap();
    let response = cluster.handle_atomic_request(&alice(), &request).unwrap();
    assert_eq!(response.status, IMStatusCode::Success);
    assert_eq!(response.status_of(PRESETS), Some(IMStatusCode::Success));

    assert!(!cluster.session().is_open());
    assert!(cluster.delegate().pending_presets().is_empty());
    assert_ne!(cluster.dataver(), dataver);

    let presets = cluster.delegate().presets();
    assert_eq!(presets.len(), 4);

    let added = &presets[3];
    assert_eq!(added.scenario, PresetScenario::UserDefined);
    assert_eq!(added.built_in, Some(false));
    assert!(added.handle.is_some());
    assert!(presets[..3].iter().all(|p| p.handle != added.handle));
}

#[test]
fn test_commit_omitting_built_in() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);
    let committed = cluster.delegate().presets().to_vec();

    let request = AtomicRequest::begin(&[PRESETS], 5000).unwrap();
    cluster.handle_atomic_request(&alice(), &request).unwrap();

    let without_home = committed
        .iter()
        .filter(|p| !p.handle_matches(HOME))
        .cloned()
        .collect::<Vec<_>>();

    cluster
        .write_presets(&alice(), ListOp::ReplaceAll(&without_home))
        .unwrap();

    let request = AtomicRequest::commit(&[PRESETS]).unwrap();
    let response = cluster.handle_atomic_request(&alice(), &request).unwrap();
    assert_eq!(response.status, IMStatusCode::Failure);
    assert_eq!(
        response.status_of(PRESETS),
        Some(IMStatusCode::ConstraintError)
    );

    assert_eq!(cluster.delegate().presets(), committed.as_slice());
    assert!(cluster.delegate().pending_presets().is_empty());
    assert!(!cluster.session().is_open());
}

#[test]
fn test_commit_all_or_nothing() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);
    let presets = cluster.delegate().presets().to_vec();
    let schedules = cluster.delegate().schedules().to_vec();

    let request = AtomicRequest::begin(&[PRESETS, SCHEDULES], 5000).unwrap();
    cluster.handle_atomic_request(&alice(), &request).unwrap();

    // Valid on its own
    cluster
        .write_presets(
            &alice(),
            ListOp::AppendItem(Preset::new(PresetScenario::Occupied)),
        )
        .unwrap();

    // A schedule without transitions
    cluster
        .write_schedules(&alice(), ListOp::AppendItem(Schedule::new(SystemMode::Heat)))
        .unwrap();

    let request = AtomicRequest::commit(&[SCHEDULES, PRESETS]).unwrap();
    let response = cluster.handle_atomic_request(&alice(), &request).unwrap();
    assert_eq!(response.status, IMStatusCode::Failure);
    assert_eq!(response.status_of(PRESETS), Some(IMStatusCode::Success));
    assert_eq!(
        response.status_of(SCHEDULES),
        Some(IMStatusCode::ConstraintError)
    );

    assert_eq!(cluster.delegate().presets(), presets.as_slice());
    assert_eq!(cluster.delegate().schedules(), schedules.as_slice());
    assert!(!cluster.session().is_open());
}

#[test]
fn test_commit_ownership() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);

    let request = AtomicRequest::commit(&[PRESETS]).unwrap();
    let err = cluster.handle_atomic_request(&alice(), &request).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInState);

    let request = AtomicRequest::begin(&[PRESETS], 5000).unwrap();
    cluster.handle_atomic_request(&alice(), &request).unwrap();

    let request = AtomicRequest::commit(&[PRESETS]).unwrap();
    let err = cluster.handle_atomic_request(&bob(), &request).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInState);

    let request = AtomicRequest::commit(&[PRESETS, SCHEDULES]).unwrap();
    let err = cluster.handle_atomic_request(&alice(), &request).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInState);

    let request = AtomicRequest::rollback(&[SCHEDULES]).unwrap();
    let err = cluster.handle_atomic_request(&alice(), &request).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInState);

    // None of the rejected requests closed the session
    assert!(cluster.in_atomic_write(Some(&alice()), None));
}

#[test]
fn test_rollback_then_begin() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);

    for (owner, next) in [(alice(), bob()), (bob(), bob())] {
        let request = AtomicRequest::begin(&[PRESETS, SCHEDULES], 5000).unwrap();
        let response = cluster.handle_atomic_request(&owner, &request).unwrap();
        assert_eq!(response.status, IMStatusCode::Success);

        cluster
            .write_presets(&owner, ListOp::ReplaceAll(&[]))
            .unwrap();

        let request = AtomicRequest::rollback(&[SCHEDULES, PRESETS]).unwrap();
        let response = cluster.handle_atomic_request(&owner, &request).unwrap();
        assert_eq!(response.status, IMStatusCode::Success);
        assert!(cluster.delegate().pending_presets().is_empty());
        assert_eq!(cluster.delegate().presets().len(), 3);

        let request = AtomicRequest::begin(&[PRESETS, SCHEDULES], 5000).unwrap();
        let response = cluster.handle_atomic_request(&next, &request).unwrap();
        assert_eq!(response.status, IMStatusCode::Success);

        let request = AtomicRequest::rollback(&[PRESETS, SCHEDULES]).unwrap();
        cluster.handle_atomic_request(&next, &request).unwrap();
    }
}

#[test]
fn test_timeout() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);

    let request = AtomicRequest::begin(&[PRESETS], 5000).unwrap();
    cluster.handle_atomic_request(&alice(), &request).unwrap();
    let token = cluster.token().unwrap();

    advance(Duration::from_secs(6));
    assert!(cluster.on_timeout(token));
    assert!(!cluster.session().is_open());
    assert!(cluster.delegate().pending_presets().is_empty());

    let request = AtomicRequest::commit(&[PRESETS]).unwrap();
    let err = cluster.handle_atomic_request(&alice(), &request).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInState);

    // A stale token does not touch a newer session
    let request = AtomicRequest::begin(&[PRESETS], 5000).unwrap();
    cluster.handle_atomic_request(&bob(), &request).unwrap();

    assert!(!cluster.on_timeout(token));
    assert!(cluster.in_atomic_write(Some(&bob()), None));
    assert_ne!(cluster.token(), Some(token));
}

#[test]
fn test_expiry_without_timer() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);

    let request = AtomicRequest::begin(&[PRESETS], 1000).unwrap();
    cluster.handle_atomic_request(&alice(), &request).unwrap();

    advance(Duration::from_millis(1000));
    assert!(!cluster.in_atomic_write(Some(&alice()), None));

    let err = cluster
        .write_presets(&alice(), ListOp::AppendItem(Preset::new(PresetScenario::Sleep)))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInState);
    assert!(!cluster.session().is_open());

    // Someone else may start right away
    let request = AtomicRequest::begin(&[PRESETS], 1000).unwrap();
    let response = cluster.handle_atomic_request(&bob(), &request).unwrap();
    assert_eq!(response.status, IMStatusCode::Success);
}

#[test]
fn test_reset() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);

    let request = AtomicRequest::begin(&[PRESETS], 1000).unwrap();
    cluster.handle_atomic_request(&alice(), &request).unwrap();
    cluster.handle_add_thermostat_suggestion(NIGHT, None, 60).unwrap();

    cluster.reset();

    assert!(!cluster.session().is_open());
    assert!(cluster.delegate().pending_presets().is_empty());
    assert!(cluster.thermostat_suggestions().is_empty());
    assert!(cluster.current_thermostat_suggestion().is_none());
}
