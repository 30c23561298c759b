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

use core::pin::pin;
use core::time::Duration;

use embassy_futures::block_on;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_time::Timer;

use rs_matter_thermostat::dm::clusters::thermostat::{
    AttributeId, SetpointConfig, ThermostatCluster,
};
use rs_matter_thermostat::error::ErrorCode;
use rs_matter_thermostat::im::{AtomicRequest, IMStatusCode};
use rs_matter_thermostat::server::ThermostatServer;
use rs_matter_thermostat::utils::epoch::{sys_epoch, sys_utc};

use crate::common::{
    advance, alice, bob, cluster, init_env_logger, test_epoch, thermostat, TestThermostat,
    ALL_FEATURES, ENDPOINT,
};

const PRESETS: u32 = AttributeId::Presets.id();

type TestServer = ThermostatServer<NoopRawMutex, TestThermostat, 2>;

#[test]
fn test_registry() {
    init_env_logger();

    let server = TestServer::new(test_epoch);
    server.add_endpoint(cluster(ALL_FEATURES)).unwrap();

    let err = server.add_endpoint(cluster(ALL_FEATURES)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Duplicate);

    let err = server
        .with(ENDPOINT + 1, |cluster| Ok(cluster.dataver()))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::EndpointNotFound);

    let err = server
        .with(ENDPOINT, |cluster| {
            cluster.write_min_setpoint_dead_band(-1)
        })
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConstraintError);
}

#[test]
fn test_deadlines() {
    init_env_logger();

    let server = TestServer::new(test_epoch);
    server.add_endpoint(cluster(ALL_FEATURES)).unwrap();
    server
        .add_endpoint(ThermostatCluster::new(
            ENDPOINT + 1,
            ALL_FEATURES,
            thermostat(),
            &SetpointConfig::new(),
            test_epoch,
            sys_utc,
        ))
        .unwrap();

    assert_eq!(server.next_deadline(), None);

    let begin = |timeout_ms| AtomicRequest::begin(&[PRESETS], timeout_ms).unwrap();

    server
        .with(ENDPOINT, |cluster| {
            cluster.handle_atomic_request(&alice(), &begin(4000))
        })
        .unwrap();
    server
        .with(ENDPOINT + 1, |cluster| {
            cluster.handle_atomic_request(&bob(), &begin(2000))
        })
        .unwrap();

    assert_eq!(server.next_deadline(), Some(Duration::from_secs(2)));

    advance(Duration::from_secs(3));
    assert_eq!(server.expire_due(), 1);
    assert_eq!(server.next_deadline(), Some(Duration::from_secs(4)));

    let token = server.with(ENDPOINT, |cluster| Ok(cluster.token())).unwrap().unwrap();
    assert_eq!(server.on_timeout(ENDPOINT, token), Ok(true));
    assert_eq!(server.on_timeout(ENDPOINT, token), Ok(false));

    assert_eq!(server.next_deadline(), None);
    assert_eq!(server.expire_due(), 0);
}

#[test]
fn test_runner() {
    init_env_logger();

    let server = ThermostatServer::<NoopRawMutex, TestThermostat, 1>::new(sys_epoch);
    server
        .add_endpoint(ThermostatCluster::new(
            ENDPOINT,
            ALL_FEATURES,
            thermostat(),
            &SetpointConfig::new(),
            sys_epoch,
            sys_utc,
        ))
        .unwrap();

    let response = server
        .with(ENDPOINT, |cluster| {
            cluster.handle_atomic_request(&alice(), &AtomicRequest::begin(&[PRESETS], 50)?)
        })
        .unwrap();
    assert_eq!(response.status, IMStatusCode::Success);
    assert_eq!(response.timeout, Some(Duration::from_millis(50)));

    let result = block_on(async {
        let mut run = pin!(server.run());
        let mut wait = pin!(Timer::after(embassy_time::Duration::from_millis(500)));

        select(&mut run, &mut wait).await
    });
    assert!(matches!(result, Either::Second(())));

    server
        .with(ENDPOINT, |cluster| {
            assert!(!cluster.session().is_open());
            assert!(cluster.delegate().pending_presets().is_empty());

            Ok(())
        })
        .unwrap();
}
