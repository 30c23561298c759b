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

//! An in-memory `ThermostatDelegate`, for devices which do not need custom storage of
//! their presets and schedules, and for tests.

use core::time::Duration;

use log::debug;

use crate::error::{Error, ErrorCode};

use super::delegate::{entry_at, ThermostatDelegate};
use super::staging::StagingStore;
use super::types::{AttrCategory, Handle, Preset, PresetType, Schedule, ScheduleType};

/// Maximum number of `PresetTypes` entries, one per scenario.
pub const MAX_PRESET_TYPES: usize = 7;
/// Maximum number of `ScheduleTypes` entries, one per system mode.
pub const MAX_SCHEDULE_TYPES: usize = 9;

/// Default upper bound of an atomic write on one attribute.
pub const DEFAULT_ATOMIC_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// A thermostat delegate keeping up to `P` presets and `S` schedules in memory.
pub struct BasicThermostat<const P: usize, const S: usize> {
    preset_types: heapless::Vec<PresetType, MAX_PRESET_TYPES>,
    schedule_types: heapless::Vec<ScheduleType, MAX_SCHEDULE_TYPES>,
    number_of_presets: u8,
    number_of_schedules: u8,
    number_of_schedule_transitions: u8,
    number_of_schedule_transitions_per_day: Option<u8>,
    max_thermostat_suggestions: u8,
    presets: heapless::Vec<Preset, P>,
    pending_presets: StagingStore<Preset, P>,
    schedules: heapless::Vec<Schedule, S>,
    pending_schedules: StagingStore<Schedule, S>,
    active_preset: Option<Handle>,
    active_schedule: Option<Handle>,
    atomic_write_timeout: Duration,
    next_handle: u32,
}

impl<const P: usize, const S: usize> Default for BasicThermostat<P, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const P: usize, const S: usize> BasicThermostat<P, S> {
    pub const fn new() -> Self {
        Self {
            preset_types: heapless::Vec::new(),
            schedule_types: heapless::Vec::new(),
            number_of_presets: P as u8,
            number_of_schedules: S as u8,
            number_of_schedule_transitions: super::types::MAX_TRANSITIONS as u8,
            number_of_schedule_transitions_per_day: None,
            max_thermostat_suggestions: 0,
            presets: heapless::Vec::new(),
            pending_presets: StagingStore::new(),
            schedules: heapless::Vec::new(),
            pending_schedules: StagingStore::new(),
            active_preset: None,
            active_schedule: None,
            atomic_write_timeout: DEFAULT_ATOMIC_WRITE_TIMEOUT,
            next_handle: 0,
        }
    }

    pub fn add_preset_type(&mut self, preset_type: PresetType) -> Result<(), Error> {
        self.preset_types
            .push(preset_type)
            .map_err(|_| ErrorCode::NoSpace.into())
    }

    pub fn add_schedule_type(&mut self, schedule_type: ScheduleType) -> Result<(), Error> {
        self.schedule_types
            .push(schedule_type)
            .map_err(|_| ErrorCode::NoSpace.into())
    }

    /// Provision a committed preset, typically a built-in one.
    pub fn add_preset(&mut self, mut preset: Preset) -> Result<(), Error> {
        if preset.handle.is_none() {
            let presets = &self.presets;
            preset.handle = Some(new_handle(&mut self.next_handle, |h| {
                presets.iter().any(|p| p.handle_matches(h.as_slice()))
            }));
        }

        preset.built_in = Some(preset.is_built_in());

        self.presets
            .push(preset)
            .map_err(|_| ErrorCode::NoSpace.into())
    }

    /// Provision a committed schedule, typically a built-in one.
    pub fn add_schedule(&mut self, mut schedule: Schedule) -> Result<(), Error> {
        if schedule.handle.is_none() {
            let schedules = &self.schedules;
            schedule.handle = Some(new_handle(&mut self.next_handle, |h| {
                schedules.iter().any(|s| s.handle_matches(h.as_slice()))
            }));
        }

        schedule.built_in = Some(schedule.is_built_in());

        self.schedules
            .push(schedule)
            .map_err(|_| ErrorCode::NoSpace.into())
    }

    pub fn set_number_of_presets(&mut self, value: u8) {
        self.number_of_presets = value;
    }

    pub fn set_number_of_schedules(&mut self, value: u8) {
        self.number_of_schedules = value;
    }

    pub fn set_number_of_schedule_transitions(&mut self, value: u8, per_day: Option<u8>) {
        self.number_of_schedule_transitions = value;
        self.number_of_schedule_transitions_per_day = per_day;
    }

    pub fn set_max_thermostat_suggestions(&mut self, value: u8) {
        self.max_thermostat_suggestions = value;
    }

    pub fn set_atomic_write_timeout(&mut self, timeout: Duration) {
        self.atomic_write_timeout = timeout;
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    pub fn pending_presets(&self) -> &[Preset] {
        self.pending_presets.as_slice()
    }

    pub fn schedules(&self) -> &[Schedule] {
        &self.schedules
    }

    pub fn pending_schedules(&self) -> &[Schedule] {
        self.pending_schedules.as_slice()
    }
}

/// Allocate a handle from `counter` which `in_use` does not know about.
fn new_handle<F>(counter: &mut u32, in_use: F) -> Handle
where
    F: Fn(&Handle) -> bool,
{
    loop {
        *counter = counter.wrapping_add(1);

        // Four bytes always fit into a handle
        if let Ok(handle) = Handle::new(&counter.to_be_bytes()) {
            if !in_use(&handle) {
                break handle;
            }
        }
    }
}

impl<const P: usize, const S: usize> ThermostatDelegate for BasicThermostat<P, S> {
    fn preset_type_at(&self, index: usize) -> Result<PresetType, Error> {
        entry_at(&self.preset_types, index)
    }

    fn schedule_type_at(&self, index: usize) -> Result<ScheduleType, Error> {
        entry_at(&self.schedule_types, index)
    }

    fn number_of_presets(&self) -> u8 {
        self.number_of_presets
    }

    fn number_of_schedules(&self) -> u8 {
        self.number_of_schedules
    }

    fn number_of_schedule_transitions(&self) -> u8 {
        self.number_of_schedule_transitions
    }

    fn number_of_schedule_transitions_per_day(&self) -> Option<u8> {
        self.number_of_schedule_transitions_per_day
    }

    fn max_thermostat_suggestions(&self) -> u8 {
        self.max_thermostat_suggestions
    }

    fn preset_at(&self, index: usize) -> Result<Preset, Error> {
        entry_at(&self.presets, index)
    }

    fn pending_preset_at(&self, index: usize) -> Result<Preset, Error> {
        entry_at(self.pending_presets.as_slice(), index)
    }

    fn schedule_at(&self, index: usize) -> Result<Schedule, Error> {
        entry_at(&self.schedules, index)
    }

    fn pending_schedule_at(&self, index: usize) -> Result<Schedule, Error> {
        entry_at(self.pending_schedules.as_slice(), index)
    }

    fn clear_pending_presets(&mut self) {
        self.pending_presets.clear();
    }

    fn append_pending_preset(&mut self, preset: Preset) -> Result<(), Error> {
        self.pending_presets.append(preset)
    }

    fn set_pending_preset(&mut self, index: usize, preset: Preset) -> Result<(), Error> {
        let entry = self
            .pending_presets
            .get_mut(index)
            .ok_or(ErrorCode::NotFound)?;

        *entry = preset;

        Ok(())
    }

    fn commit_pending_presets(&mut self) -> Result<(), Error> {
        let mut pending = self.pending_presets.take();

        for index in 0..pending.len() {
            if pending[index].handle.is_none() {
                let handle = new_handle(&mut self.next_handle, |h| {
                    pending.iter().any(|p| p.handle_matches(h.as_slice()))
                });
                debug!("Assigned preset handle {}", handle);
                pending[index].handle = Some(handle);
            }
        }

        self.presets = pending;

        Ok(())
    }

    fn clear_pending_schedules(&mut self) {
        self.pending_schedules.clear();
    }

    fn append_pending_schedule(&mut self, schedule: Schedule) -> Result<(), Error> {
        self.pending_schedules.append(schedule)
    }

    fn commit_pending_schedules(&mut self) -> Result<(), Error> {
        let mut pending = self.pending_schedules.take();

        for index in 0..pending.len() {
            if pending[index].handle.is_none() {
                let handle = new_handle(&mut self.next_handle, |h| {
                    pending.iter().any(|s| s.handle_matches(h.as_slice()))
                });
                debug!("Assigned schedule handle {}", handle);
                pending[index].handle = Some(handle);
            }

            if pending[index].built_in.is_none() {
                pending[index].built_in = Some(false);
            }
        }

        self.schedules = pending;

        Ok(())
    }

    fn active_preset_handle(&self) -> Option<Handle> {
        self.active_preset.clone()
    }

    fn set_active_preset_handle(&mut self, handle: Option<Handle>) -> Result<(), Error> {
        self.active_preset = handle;
        Ok(())
    }

    fn active_schedule_handle(&self) -> Option<Handle> {
        self.active_schedule.clone()
    }

    fn set_active_schedule_handle(&mut self, handle: Option<Handle>) -> Result<(), Error> {
        self.active_schedule = handle;
        Ok(())
    }

    fn max_atomic_write_timeout(&self, _attr: AttrCategory) -> Option<Duration> {
        Some(self.atomic_write_timeout)
    }
}
