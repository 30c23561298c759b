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

//! Data types of the Thermostat cluster used by the presets, schedules and suggestions engine.
//!
//! All list entries own their (bounded) members, so that entries can be freely moved
//! between the committed store, the staging store and the validators.

use core::fmt;

use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use strum::FromRepr;

use crate::error::{Error, ErrorCode};

pub const MAX_HANDLE_LEN: usize = 16;
pub const MAX_NAME_LEN: usize = 64;
pub const MAX_TRANSITIONS: usize = 16;

/// Last valid minute of a day, for `Transition::transition_time`.
pub const MAX_TRANSITION_TIME: u16 = 1439;

pub type Name = heapless::String<MAX_NAME_LEN>;

/// Attributes of the Thermostat cluster that the engine reads or writes.
#[derive(FromRepr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AttributeId {
    AbsMinHeatSetpointLimit = 0x0003,
    AbsMaxHeatSetpointLimit = 0x0004,
    AbsMinCoolSetpointLimit = 0x0005,
    AbsMaxCoolSetpointLimit = 0x0006,
    OccupiedCoolingSetpoint = 0x0011,
    OccupiedHeatingSetpoint = 0x0012,
    UnoccupiedCoolingSetpoint = 0x0013,
    UnoccupiedHeatingSetpoint = 0x0014,
    MinHeatSetpointLimit = 0x0015,
    MaxHeatSetpointLimit = 0x0016,
    MinCoolSetpointLimit = 0x0017,
    MaxCoolSetpointLimit = 0x0018,
    MinSetpointDeadBand = 0x0019,
    SystemMode = 0x001C,
    PresetTypes = 0x0048,
    ScheduleTypes = 0x0049,
    NumberOfPresets = 0x004A,
    NumberOfSchedules = 0x004B,
    NumberOfScheduleTransitions = 0x004C,
    NumberOfScheduleTransitionPerDay = 0x004D,
    ActivePresetHandle = 0x004E,
    ActiveScheduleHandle = 0x004F,
    Presets = 0x0050,
    Schedules = 0x0051,
    MaxThermostatSuggestions = 0x0053,
    ThermostatSuggestions = 0x0054,
    CurrentThermostatSuggestion = 0x0055,
}

impl AttributeId {
    pub fn from_id(id: u32) -> Option<Self> {
        Self::from_repr(id)
    }

    pub const fn id(self) -> u32 {
        self as u32
    }
}

/// The list attributes which can be edited inside an atomic write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrCategory {
    Presets,
    Schedules,
}

impl AttrCategory {
    pub const fn attribute(self) -> AttributeId {
        match self {
            Self::Presets => AttributeId::Presets,
            Self::Schedules => AttributeId::Schedules,
        }
    }

    pub const fn id(self) -> u32 {
        self.attribute().id()
    }

    pub fn from_attribute(attr: AttributeId) -> Option<Self> {
        match attr {
            AttributeId::Presets => Some(Self::Presets),
            AttributeId::Schedules => Some(Self::Schedules),
            _ => None,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        AttributeId::from_id(id).and_then(Self::from_attribute)
    }
}

bitflags! {
    /// Optional features of the Thermostat cluster.
    #[repr(transparent)]
    #[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct Feature: u32 {
        const HEATING = 0x0001;
        const COOLING = 0x0002;
        const OCCUPANCY = 0x0004;
        const SETBACK = 0x0010;
        const AUTO_MODE = 0x0020;
        const LOCAL_TEMPERATURE_NOT_EXPOSED = 0x0040;
        const MATTER_SCHEDULE_CONFIGURATION = 0x0080;
        const PRESETS = 0x0100;
        const THERMOSTAT_SUGGESTIONS = 0x0200;
    }
}

bitflags! {
    #[repr(transparent)]
    #[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct PresetTypeFeatures: u16 {
        const AUTOMATIC = 0x01;
        const SUPPORTS_NAMES = 0x02;
    }
}

bitflags! {
    #[repr(transparent)]
    #[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct ScheduleTypeFeatures: u16 {
        const SUPPORTS_PRESETS = 0x01;
        const SUPPORTS_SETPOINTS = 0x02;
        const SUPPORTS_NAMES = 0x04;
        const SUPPORTS_OFF = 0x08;
    }
}

bitflags! {
    #[repr(transparent)]
    #[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct DayOfWeek: u8 {
        const SUNDAY = 0x01;
        const MONDAY = 0x02;
        const TUESDAY = 0x04;
        const WEDNESDAY = 0x08;
        const THURSDAY = 0x10;
        const FRIDAY = 0x20;
        const SATURDAY = 0x40;
        const AWAY = 0x80;
    }
}

#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresetScenario {
    Occupied = 1,
    Unoccupied = 2,
    Sleep = 3,
    Wake = 4,
    Vacation = 5,
    GoingToSleep = 6,
    UserDefined = 254,
}

impl TryFrom<u8> for PresetScenario {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        FromPrimitive::from_u8(value).ok_or_else(|| ErrorCode::ConstraintError.into())
    }
}

#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemMode {
    Off = 0,
    Auto = 1,
    Cool = 3,
    Heat = 4,
    EmergencyHeat = 5,
    Precooling = 6,
    FanOnly = 7,
    Dry = 8,
    Sleep = 9,
}

impl TryFrom<u8> for SystemMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        FromPrimitive::from_u8(value).ok_or_else(|| ErrorCode::ConstraintError.into())
    }
}

/// The side(s) a SetpointRaiseLower command applies to.
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetpointRaiseLowerMode {
    Heat = 0,
    Cool = 1,
    Both = 2,
}

/// An opaque preset or schedule handle, at most `MAX_HANDLE_LEN` bytes long.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Handle(heapless::Vec<u8, MAX_HANDLE_LEN>);

impl Handle {
    pub fn new(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.is_empty() {
            Err(ErrorCode::ConstraintError)?;
        }

        heapless::Vec::from_slice(bytes)
            .map(Self)
            .map_err(|_| ErrorCode::ConstraintError.into())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq<[u8]> for Handle {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_slice() == other
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter() {
            write!(f, "{:02x}", b)?;
        }

        Ok(())
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub fn name(value: &str) -> Result<Name, Error> {
    let mut name = Name::new();
    name.push_str(value)
        .map_err(|_| Error::new(ErrorCode::ConstraintError))?;

    Ok(name)
}

/// An entry of the `PresetTypes` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PresetType {
    pub scenario: PresetScenario,
    pub number_of_presets: u8,
    pub features: PresetTypeFeatures,
}

/// An entry of the `ScheduleTypes` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleType {
    pub system_mode: SystemMode,
    pub number_of_schedules: u8,
    pub features: ScheduleTypeFeatures,
}

/// An entry of the `Presets` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub handle: Option<Handle>,
    pub scenario: PresetScenario,
    /// `None` when the field is absent, `Some(None)` when it is explicitly null.
    pub name: Option<Option<Name>>,
    pub cooling_setpoint: Option<i16>,
    pub heating_setpoint: Option<i16>,
    pub built_in: Option<bool>,
}

impl Preset {
    /// A new, caller-side preset without a handle.
    pub const fn new(scenario: PresetScenario) -> Self {
        Self {
            handle: None,
            scenario,
            name: None,
            cooling_setpoint: None,
            heating_setpoint: None,
            built_in: Some(false),
        }
    }

    pub fn with_handle(mut self, handle: &[u8]) -> Result<Self, Error> {
        self.handle = Some(Handle::new(handle)?);
        Ok(self)
    }

    pub fn with_name(mut self, value: &str) -> Result<Self, Error> {
        self.name = Some(Some(name(value)?));
        Ok(self)
    }

    pub const fn with_setpoints(mut self, cooling: Option<i16>, heating: Option<i16>) -> Self {
        self.cooling_setpoint = cooling;
        self.heating_setpoint = heating;
        self
    }

    pub const fn with_built_in(mut self, built_in: Option<bool>) -> Self {
        self.built_in = built_in;
        self
    }

    pub fn is_built_in(&self) -> bool {
        self.built_in == Some(true)
    }

    pub fn has_name(&self) -> bool {
        matches!(&self.name, Some(Some(name)) if !name.is_empty())
    }

    pub fn handle_matches(&self, handle: &[u8]) -> bool {
        matches!(&self.handle, Some(h) if h == handle)
    }
}

/// An entry of the `Transitions` list of a schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub day_of_week: DayOfWeek,
    /// Minutes since midnight.
    pub transition_time: u16,
    pub preset_handle: Option<Handle>,
    pub system_mode: Option<SystemMode>,
    pub cooling_setpoint: Option<i16>,
    pub heating_setpoint: Option<i16>,
}

impl Transition {
    pub const fn new(day_of_week: DayOfWeek, transition_time: u16) -> Self {
        Self {
            day_of_week,
            transition_time,
            preset_handle: None,
            system_mode: None,
            cooling_setpoint: None,
            heating_setpoint: None,
        }
    }

    pub fn with_preset(mut self, handle: &[u8]) -> Result<Self, Error> {
        self.preset_handle = Some(Handle::new(handle)?);
        Ok(self)
    }

    pub const fn with_system_mode(mut self, mode: SystemMode) -> Self {
        self.system_mode = Some(mode);
        self
    }

    pub const fn with_setpoints(mut self, cooling: Option<i16>, heating: Option<i16>) -> Self {
        self.cooling_setpoint = cooling;
        self.heating_setpoint = heating;
        self
    }

    pub fn has_setpoint(&self) -> bool {
        self.cooling_setpoint.is_some() || self.heating_setpoint.is_some()
    }
}

/// An entry of the `Schedules` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub handle: Option<Handle>,
    pub system_mode: SystemMode,
    pub name: Option<Option<Name>>,
    pub preset_handle: Option<Handle>,
    pub transitions: heapless::Vec<Transition, MAX_TRANSITIONS>,
    pub built_in: Option<bool>,
}

impl Schedule {
    pub const fn new(system_mode: SystemMode) -> Self {
        Self {
            handle: None,
            system_mode,
            name: None,
            preset_handle: None,
            transitions: heapless::Vec::new(),
            built_in: Some(false),
        }
    }

    pub fn with_handle(mut self, handle: &[u8]) -> Result<Self, Error> {
        self.handle = Some(Handle::new(handle)?);
        Ok(self)
    }

    pub fn with_name(mut self, value: &str) -> Result<Self, Error> {
        self.name = Some(Some(name(value)?));
        Ok(self)
    }

    pub fn with_preset(mut self, handle: &[u8]) -> Result<Self, Error> {
        self.preset_handle = Some(Handle::new(handle)?);
        Ok(self)
    }

    pub fn with_transition(mut self, transition: Transition) -> Result<Self, Error> {
        self.transitions
            .push(transition)
            .map_err(|_| ErrorCode::ResourceExhausted)?;
        Ok(self)
    }

    pub const fn with_built_in(mut self, built_in: Option<bool>) -> Self {
        self.built_in = built_in;
        self
    }

    pub fn is_built_in(&self) -> bool {
        self.built_in == Some(true)
    }

    pub fn has_name(&self) -> bool {
        matches!(&self.name, Some(Some(name)) if !name.is_empty())
    }

    pub fn handle_matches(&self, handle: &[u8]) -> bool {
        matches!(&self.handle, Some(h) if h == handle)
    }

    /// All preset handles this schedule refers to, at the schedule level and in transitions.
    pub fn preset_handles(&self) -> impl Iterator<Item = &Handle> {
        self.preset_handle
            .iter()
            .chain(self.transitions.iter().filter_map(|t| t.preset_handle.as_ref()))
    }
}

/// An entry of the `ThermostatSuggestions` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub unique_id: u8,
    pub preset_handle: Handle,
    /// Seconds since the Matter epoch.
    pub effective_time: u32,
    /// Seconds since the Matter epoch.
    pub expiration_time: u32,
}

/// A list write, as delivered by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListOp<'a, T> {
    /// Replace the whole list.
    ReplaceAll(&'a [T]),
    /// Append one item to the list.
    AppendItem(T),
    /// Replace the item at the given index.
    ReplaceItem(u16, T),
    /// Delete the item at the given index.
    DeleteItem(u16),
}
