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

use rs_matter_thermostat::dm::clusters::thermostat::{
    AttributeId, Feature, Handle, SetpointRaiseLowerMode, SystemMode, ThermostatDelegate,
};
use rs_matter_thermostat::error::ErrorCode;

use crate::common::{cluster, init_env_logger, TestCluster, ALL_FEATURES, AWAY, HOME, WEEKDAYS};

fn pairs(cluster: &TestCluster) -> [(i16, i16); 2] {
    let setpoints = cluster.setpoints();

    [true, false].map(|occupied| (setpoints.heating(occupied), setpoints.cooling(occupied)))
}

#[test]
fn test_shift_past_limit() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);

    cluster
        .write_setpoint(AttributeId::OccupiedCoolingSetpoint, 3200)
        .unwrap();

    // Keeping the deadband would need a cooling setpoint of 32.50 °C
    let err = cluster
        .write_setpoint(AttributeId::OccupiedHeatingSetpoint, 3000)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConstraintError);

    assert_eq!(cluster.setpoints().heating(true), 2000);
    assert_eq!(cluster.setpoints().cooling(true), 3200);

    let err = cluster
        .write_setpoint(AttributeId::OccupiedHeatingSetpoint, 3100)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConstraintError);
}

#[test]
fn test_dead_band_holds() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);
    let dead_band = cluster.setpoints().dead_band();

    let writes = (700..=3000)
        .step_by(230)
        .flat_map(|v| {
            [
                (AttributeId::OccupiedHeatingSetpoint, v),
                (AttributeId::UnoccupiedCoolingSetpoint, v + 500),
                (AttributeId::UnoccupiedHeatingSetpoint, v),
                (AttributeId::OccupiedCoolingSetpoint, 3200 - v / 2),
            ]
        })
        .collect::<Vec<_>>();

    for (attr, value) in writes {
        let _ = cluster.write_setpoint(attr, value);

        for (heating, cooling) in pairs(&cluster) {
            assert!(
                cooling - heating >= dead_band,
                "{:?} = {} broke the deadband: {} / {}",
                attr,
                value,
                heating,
                cooling
            );
        }
    }
}

#[test]
fn test_shift_keeps_dead_band() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);

    cluster
        .write_setpoint(AttributeId::OccupiedHeatingSetpoint, 2500)
        .unwrap();
    assert_eq!(pairs(&cluster)[0], (2500, 2750));

    cluster
        .write_setpoint(AttributeId::OccupiedCoolingSetpoint, 2000)
        .unwrap();
    assert_eq!(pairs(&cluster)[0], (1750, 2000));

    // Without auto mode nothing is shifted
    let mut cluster = crate::common::cluster(Feature::HEATING | Feature::COOLING);

    cluster
        .write_setpoint(AttributeId::OccupiedHeatingSetpoint, 2550)
        .unwrap();
    assert_eq!(pairs(&cluster)[0], (2550, 2600));
}

#[test]
fn test_features() {
    init_env_logger();

    let mut cluster = cluster(Feature::HEATING | Feature::COOLING);

    let err = cluster
        .write_setpoint(AttributeId::UnoccupiedHeatingSetpoint, 2000)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedAttribute);

    let err = cluster
        .write_setpoint(AttributeId::SystemMode, 2000)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedAttribute);

    let err = cluster.write_min_setpoint_dead_band(20).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedAttribute);

    let err = cluster.write_system_mode(SystemMode::Auto).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConstraintError);

    cluster.write_system_mode(SystemMode::Heat).unwrap();
    assert_eq!(cluster.system_mode(), SystemMode::Heat);

    let mut cluster = crate::common::cluster(Feature::HEATING);

    let err = cluster
        .write_setpoint(AttributeId::OccupiedCoolingSetpoint, 2600)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedAttribute);

    let err = cluster
        .handle_setpoint_raise_lower(SetpointRaiseLowerMode::Cool, 10)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidCommand);

    let err = cluster.write_system_mode(SystemMode::Precooling).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConstraintError);
}

#[test]
fn test_dead_band() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);

    let err = cluster.write_min_setpoint_dead_band(-1).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConstraintError);

    cluster.write_min_setpoint_dead_band(20).unwrap();
    assert_eq!(cluster.setpoints().min_setpoint_dead_band(), 20);

    // The maximum limits are only 2 °C apart
    let err = cluster.write_min_setpoint_dead_band(25).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConstraintError);
    assert_eq!(cluster.setpoints().min_setpoint_dead_band(), 20);
}

#[test]
fn test_limits() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);
    let dataver = cluster.dataver();

    // Too close to the minimum cooling limit
    let err = cluster
        .write_setpoint_limit(AttributeId::MinHeatSetpointLimit, 2100)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConstraintError);

    let err = cluster
        .write_setpoint_limit(AttributeId::MaxCoolSetpointLimit, 3300)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConstraintError);
    assert_eq!(cluster.dataver(), dataver);

    let mut cluster = crate::common::cluster(Feature::HEATING | Feature::COOLING);

    cluster
        .write_setpoint_limit(AttributeId::MinHeatSetpointLimit, 2100)
        .unwrap();
    assert_eq!(cluster.setpoints().heating(true), 2100);

    let err = cluster
        .write_setpoint(AttributeId::OccupiedHeatingSetpoint, 2000)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConstraintError);
}

#[test]
fn test_raise_lower() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);

    cluster
        .handle_setpoint_raise_lower(SetpointRaiseLowerMode::Both, 10)
        .unwrap();
    assert_eq!(pairs(&cluster)[0], (2100, 2700));

    cluster
        .handle_setpoint_raise_lower(SetpointRaiseLowerMode::Heat, -50)
        .unwrap();
    assert_eq!(pairs(&cluster)[0], (1600, 2700));

    // Lowering cooling below the deadband drags heating along
    cluster
        .handle_setpoint_raise_lower(SetpointRaiseLowerMode::Cool, -90)
        .unwrap();
    assert_eq!(pairs(&cluster)[0], (1550, 1800));

    // The unoccupied pair is untouched
    assert_eq!(pairs(&cluster)[1], (2000, 2600));
}

#[test]
fn test_active_preset() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);

    let err = cluster
        .handle_set_active_preset_request(Some(b"nope"))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    cluster.handle_set_active_preset_request(Some(HOME)).unwrap();
    assert_eq!(pairs(&cluster)[0], (2100, 2400));
    assert_eq!(
        cluster.delegate().active_preset_handle(),
        Some(Handle::new(HOME).unwrap())
    );

    // Applied to the unoccupied pair, and still a preset of our own
    cluster.handle_set_active_preset_request(Some(AWAY)).unwrap();
    assert_eq!(pairs(&cluster), [(2100, 2400), (1800, 2800)]);
    assert_eq!(
        cluster.delegate().active_preset_handle(),
        Some(Handle::new(AWAY).unwrap())
    );

    cluster.handle_set_active_preset_request(None).unwrap();
    assert_eq!(cluster.delegate().active_preset_handle(), None);

    let mut cluster = crate::common::cluster(Feature::HEATING | Feature::COOLING);
    let err = cluster
        .handle_set_active_preset_request(Some(HOME))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::CommandNotFound);
}

#[test]
fn test_writes_clear_active_handles() {
    init_env_logger();

    let mut cluster = cluster(ALL_FEATURES);

    cluster.handle_set_active_preset_request(Some(HOME)).unwrap();
    cluster
        .handle_set_active_schedule_request(Some(WEEKDAYS))
        .unwrap();

    // Writing the value the preset set is not a change
    cluster
        .write_setpoint(AttributeId::OccupiedHeatingSetpoint, 2100)
        .unwrap();
    assert!(cluster.delegate().active_preset_handle().is_some());
    assert!(cluster.delegate().active_schedule_handle().is_some());

    cluster
        .write_setpoint(AttributeId::OccupiedHeatingSetpoint, 2000)
        .unwrap();
    assert_eq!(cluster.delegate().active_preset_handle(), None);
    assert_eq!(cluster.delegate().active_schedule_handle(), None);

    cluster.handle_set_active_preset_request(Some(HOME)).unwrap();
    cluster
        .handle_setpoint_raise_lower(SetpointRaiseLowerMode::Heat, 1)
        .unwrap();
    assert_eq!(cluster.delegate().active_preset_handle(), None);
}
