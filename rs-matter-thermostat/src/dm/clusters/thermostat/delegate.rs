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

//! The device-side SPI consumed by the thermostat server.

use core::time::Duration;

use crate::error::{Error, ErrorCode};

use super::types::{
    AttrCategory, Handle, Preset, PresetScenario, PresetType, Schedule, ScheduleType, Suggestion,
    SystemMode,
};

/// The hooks a concrete thermostat device implements so that the server can stage,
/// validate and commit edits of its `Presets` and `Schedules` attributes.
///
/// The committed lists, the pending (staged) lists and the catalogs are all owned by the
/// implementor. The `*_at(index)` accessors return `Err(ErrorCode::EndOfList)` once
/// `index` runs past the last entry; any other error aborts the validation pass
/// that triggered the access.
pub trait ThermostatDelegate {
    fn preset_type_at(&self, index: usize) -> Result<PresetType, Error>;

    fn schedule_type_at(&self, index: usize) -> Result<ScheduleType, Error>;

    /// The `NumberOfPresets` attribute.
    fn number_of_presets(&self) -> u8;

    /// The `NumberOfSchedules` attribute.
    fn number_of_schedules(&self) -> u8;

    /// The `NumberOfScheduleTransitions` attribute.
    fn number_of_schedule_transitions(&self) -> u8;

    /// The `NumberOfScheduleTransitionPerDay` attribute; `None` when null.
    fn number_of_schedule_transitions_per_day(&self) -> Option<u8> {
        None
    }

    /// The `MaxThermostatSuggestions` attribute.
    fn max_thermostat_suggestions(&self) -> u8 {
        0
    }

    fn preset_at(&self, index: usize) -> Result<Preset, Error>;

    fn pending_preset_at(&self, index: usize) -> Result<Preset, Error>;

    fn schedule_at(&self, index: usize) -> Result<Schedule, Error>;

    fn pending_schedule_at(&self, index: usize) -> Result<Schedule, Error>;

    fn clear_pending_presets(&mut self);

    fn append_pending_preset(&mut self, preset: Preset) -> Result<(), Error>;

    /// Overwrite the pending preset at `index` with its normalized form.
    fn set_pending_preset(&mut self, index: usize, preset: Preset) -> Result<(), Error>;

    /// Replace the committed presets with the pending ones.
    ///
    /// Pending entries without a handle are assigned a fresh, unique handle.
    ///
    /// Called only after every category of the session passed validation and its
    /// precommit hook. It must not fail at that point: the server does not undo a
    /// category committed earlier in the same session, so anything which can go wrong
    /// belongs in `on_atomic_write_precommit`.
    fn commit_pending_presets(&mut self) -> Result<(), Error>;

    fn clear_pending_schedules(&mut self);

    fn append_pending_schedule(&mut self, schedule: Schedule) -> Result<(), Error>;

    /// Replace the committed schedules with the pending ones, assigning handles as needed.
    ///
    /// Must not fail, for the same reason as `commit_pending_presets`.
    fn commit_pending_schedules(&mut self) -> Result<(), Error>;

    fn active_preset_handle(&self) -> Option<Handle>;

    fn set_active_preset_handle(&mut self, handle: Option<Handle>) -> Result<(), Error>;

    fn active_schedule_handle(&self) -> Option<Handle> {
        None
    }

    fn set_active_schedule_handle(&mut self, _handle: Option<Handle>) -> Result<(), Error> {
        Ok(())
    }

    /// Whether the device itself still depends on the preset with the given handle,
    /// beyond it being the active preset or being referenced by a committed schedule.
    fn is_preset_in_use(&self, _handle: &Handle) -> bool {
        false
    }

    /// The longest atomic write the device allows on `attr`, or `None` if it does not
    /// support staging that attribute.
    fn max_atomic_write_timeout(&self, attr: AttrCategory) -> Option<Duration>;

    /// Called when an atomic write opens on `attr`. The default seeds the pending list
    /// with the committed entries.
    fn on_atomic_write_begin(&mut self, attr: AttrCategory) -> Result<(), Error> {
        match attr {
            AttrCategory::Presets => {
                self.clear_pending_presets();
                let mut index = 0;
                while let Some(preset) = next_entry(self.preset_at(index))? {
                    self.append_pending_preset(preset)?;
                    index += 1;
                }
            }
            AttrCategory::Schedules => {
                self.clear_pending_schedules();
                let mut index = 0;
                while let Some(schedule) = next_entry(self.schedule_at(index))? {
                    self.append_pending_schedule(schedule)?;
                    index += 1;
                }
            }
        }

        Ok(())
    }

    /// Called after the server validated the pending list of `attr` and before it is
    /// committed. Returning an error rejects the commit.
    fn on_atomic_write_precommit(&mut self, _attr: AttrCategory) -> Result<(), Error> {
        Ok(())
    }

    /// Called once the pending list of `attr` has been committed.
    fn on_atomic_write_commit(&mut self, _attr: AttrCategory) {}

    /// Called when an atomic write on `attr` is rolled back, explicitly or by timeout.
    fn on_atomic_write_rollback(&mut self, attr: AttrCategory) {
        match attr {
            AttrCategory::Presets => self.clear_pending_presets(),
            AttrCategory::Schedules => self.clear_pending_schedules(),
        }
    }

    /// Called when the occupied setpoints were changed because a preset was applied.
    fn on_preset_applied(&mut self, _handle: &Handle) {}

    /// Decide which of the (non-expired, in-order) suggestions is the current one.
    ///
    /// The default picks the most recently effective suggestion that is already in effect.
    fn evaluate_current_suggestion(&self, suggestions: &[Suggestion], now: u32) -> Option<u8> {
        suggestions
            .iter()
            .filter(|s| s.effective_time <= now)
            .max_by_key(|s| s.effective_time)
            .map(|s| s.unique_id)
    }
}

/// An iterator over the entries produced by `at(0)`, `at(1)`, ... which stops at the
/// end-of-list sentinel.
///
/// Any other error is yielded once, mapped to `InvalidInState`, and ends the iteration.
pub struct Entries<A> {
    at: A,
    index: usize,
    done: bool,
}

impl<T, A> Iterator for Entries<A>
where
    A: FnMut(usize) -> Result<T, Error>,
{
    type Item = Result<T, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match (self.at)(self.index) {
            Ok(entry) => {
                self.index += 1;
                Some(Ok(entry))
            }
            Err(e) if e.is_end_of_list() => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e.map_list_access()))
            }
        }
    }
}

pub fn entries<T, A>(at: A) -> Entries<A>
where
    A: FnMut(usize) -> Result<T, Error>,
{
    Entries {
        at,
        index: 0,
        done: false,
    }
}

/// Find the first entry produced by `at` which matches `pred`.
pub fn find_entry<T, A, P>(at: A, mut pred: P) -> Result<Option<T>, Error>
where
    A: FnMut(usize) -> Result<T, Error>,
    P: FnMut(&T) -> bool,
{
    for entry in entries(at) {
        let entry = entry?;
        if pred(&entry) {
            return Ok(Some(entry));
        }
    }

    Ok(None)
}

/// Look up the `PresetTypes` catalog entry for `scenario`.
pub fn preset_type_for<D: ThermostatDelegate + ?Sized>(
    delegate: &D,
    scenario: PresetScenario,
) -> Result<Option<PresetType>, Error> {
    find_entry(|i| delegate.preset_type_at(i), |t| t.scenario == scenario)
}

/// Look up the `ScheduleTypes` catalog entry for `mode`.
pub fn schedule_type_for<D: ThermostatDelegate + ?Sized>(
    delegate: &D,
    mode: SystemMode,
) -> Result<Option<ScheduleType>, Error> {
    find_entry(|i| delegate.schedule_type_at(i), |t| t.system_mode == mode)
}

/// Look up a committed preset by its handle.
pub fn committed_preset<D: ThermostatDelegate + ?Sized>(
    delegate: &D,
    handle: &[u8],
) -> Result<Option<Preset>, Error> {
    find_entry(|i| delegate.preset_at(i), |p| p.handle_matches(handle))
}

/// Look up a committed schedule by its handle.
pub fn committed_schedule<D: ThermostatDelegate + ?Sized>(
    delegate: &D,
    handle: &[u8],
) -> Result<Option<Schedule>, Error> {
    find_entry(|i| delegate.schedule_at(i), |s| s.handle_matches(handle))
}

/// Turn the result of one `*_at(index)` call into `Ok(None)` at the end of the list.
pub fn next_entry<T>(result: Result<T, Error>) -> Result<Option<T>, Error> {
    match result {
        Ok(entry) => Ok(Some(entry)),
        Err(e) if e.is_end_of_list() => Ok(None),
        Err(e) => Err(e.map_list_access()),
    }
}

/// Map an out-of-range index to the end-of-list sentinel.
pub fn entry_at<T: Clone>(entries: &[T], index: usize) -> Result<T, Error> {
    entries
        .get(index)
        .cloned()
        .ok_or_else(|| ErrorCode::EndOfList.into())
}
