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

//! Commit-time validation of the pending `Schedules` list.

use log::warn;

use crate::error::{Error, ErrorCode};

use super::atomic::{CommitContext, CommitValidator};
use super::delegate::{
    committed_preset, committed_schedule, entries, find_entry, schedule_type_for,
    ThermostatDelegate,
};
use super::types::{
    DayOfWeek, Handle, Schedule, ScheduleType, ScheduleTypeFeatures, SystemMode, Transition,
    MAX_TRANSITION_TIME,
};

/// Number of distinct system modes.
const MODES: usize = 9;

/// The individual days a per-day transition cap applies to.
const DAYS: [DayOfWeek; 8] = [
    DayOfWeek::SUNDAY,
    DayOfWeek::MONDAY,
    DayOfWeek::TUESDAY,
    DayOfWeek::WEDNESDAY,
    DayOfWeek::THURSDAY,
    DayOfWeek::FRIDAY,
    DayOfWeek::SATURDAY,
    DayOfWeek::AWAY,
];

/// Validates a pending `Schedules` list against the committed one, the `ScheduleTypes`
/// catalog and the committed `Presets` list.
pub struct SchedulesValidator;

impl CommitValidator for SchedulesValidator {
    fn precommit<D>(&self, delegate: &mut D, _ctx: &CommitContext<'_>) -> Result<(), Error>
    where
        D: ThermostatDelegate + ?Sized,
    {
        self.check_coverage(delegate)?;
        self.check_admission(delegate)?;
        self.check_active_schedule(delegate)
    }
}

impl SchedulesValidator {
    fn check_coverage<D>(&self, delegate: &D) -> Result<(), Error>
    where
        D: ThermostatDelegate + ?Sized,
    {
        for old in entries(|i| delegate.schedule_at(i)) {
            let old = old?;

            let Some(handle) = &old.handle else {
                continue;
            };

            if old.is_built_in() && pending_schedule(delegate, handle)?.is_none() {
                warn!("Built-in schedule {} missing from pending schedules", handle);
                Err(ErrorCode::ConstraintError)?;
            }
        }

        Ok(())
    }

    fn check_admission<D>(&self, delegate: &D) -> Result<(), Error>
    where
        D: ThermostatDelegate + ?Sized,
    {
        let number_of_schedules = delegate.number_of_schedules() as usize;

        let mut total = 0;
        let mut per_mode = heapless::Vec::<(SystemMode, u8), MODES>::new();

        for (index, candidate) in entries(|i| delegate.pending_schedule_at(i)).enumerate() {
            let candidate = candidate?;

            if let Some(handle) = &candidate.handle {
                let Some(old) = committed_schedule(delegate, handle.as_slice())? else {
                    warn!("Pending schedule {} does not exist", handle);
                    return Err(ErrorCode::NotFound.into());
                };

                let duplicate = entries(|i| delegate.pending_schedule_at(i))
                    .take(index)
                    .try_fold(false, |dup, s| {
                        s.map(|s| dup || s.handle_matches(handle.as_slice()))
                    })?;

                if duplicate {
                    warn!("Pending schedule handle {} is not unique", handle);
                    Err(ErrorCode::ConstraintError)?;
                }

                if let Some(built_in) = candidate.built_in {
                    if built_in != old.is_built_in() {
                        warn!("Pending schedule {} flips its built-in flag", handle);
                        Err(ErrorCode::ConstraintError)?;
                    }
                }
            } else if candidate.is_built_in() {
                warn!("New schedules cannot be built-in");
                Err(ErrorCode::ConstraintError)?;
            }

            let Some(schedule_type) = schedule_type_for(delegate, candidate.system_mode)? else {
                warn!("No schedule type for system mode {:?}", candidate.system_mode);
                return Err(ErrorCode::ConstraintError.into());
            };

            self.check_schedule(delegate, &candidate, &schedule_type)?;

            total += 1;
            if total > number_of_schedules {
                warn!("More than {} pending schedules", number_of_schedules);
                Err(ErrorCode::ResourceExhausted)?;
            }

            let count = match per_mode
                .iter_mut()
                .find(|(mode, _)| *mode == candidate.system_mode)
            {
                Some((_, count)) => {
                    *count += 1;
                    *count
                }
                None => {
                    per_mode
                        .push((candidate.system_mode, 1))
                        .map_err(|_| ErrorCode::ResourceExhausted)?;
                    1
                }
            };

            if count > schedule_type.number_of_schedules {
                warn!(
                    "More than {} pending schedules for system mode {:?}",
                    schedule_type.number_of_schedules, candidate.system_mode
                );
                Err(ErrorCode::ResourceExhausted)?;
            }
        }

        Ok(())
    }

    /// Rules local to one schedule and the catalog entry of its system mode.
    fn check_schedule<D>(
        &self,
        delegate: &D,
        schedule: &Schedule,
        schedule_type: &ScheduleType,
    ) -> Result<(), Error>
    where
        D: ThermostatDelegate + ?Sized,
    {
        let features = schedule_type.features;

        if schedule.system_mode == SystemMode::Off
            && !features.contains(ScheduleTypeFeatures::SUPPORTS_OFF)
        {
            warn!("Schedules for system mode Off are not supported");
            Err(ErrorCode::ConstraintError)?;
        }

        if schedule.has_name() && !features.contains(ScheduleTypeFeatures::SUPPORTS_NAMES) {
            warn!(
                "Schedules for system mode {:?} do not support names",
                schedule.system_mode
            );
            Err(ErrorCode::ConstraintError)?;
        }

        if let Some(handle) = &schedule.preset_handle {
            check_preset_reference(delegate, handle, features)?;
        }

        if schedule.transitions.is_empty() {
            warn!("Schedule without transitions");
            Err(ErrorCode::ConstraintError)?;
        }

        let max_transitions = delegate.number_of_schedule_transitions() as usize;
        if schedule.transitions.len() > max_transitions {
            warn!("More than {} transitions in a schedule", max_transitions);
            Err(ErrorCode::ResourceExhausted)?;
        }

        if let Some(per_day) = delegate.number_of_schedule_transitions_per_day() {
            for day in DAYS {
                let count = schedule
                    .transitions
                    .iter()
                    .filter(|t| t.day_of_week.contains(day))
                    .count();

                if count > per_day as usize {
                    warn!("More than {} transitions on {:?}", per_day, day);
                    Err(ErrorCode::ResourceExhausted)?;
                }
            }
        }

        for transition in schedule.transitions.iter() {
            check_transition(delegate, transition, features)?;
        }

        Ok(())
    }

    /// The active schedule, if any, has to remain in the list.
    fn check_active_schedule<D>(&self, delegate: &D) -> Result<(), Error>
    where
        D: ThermostatDelegate + ?Sized,
    {
        if let Some(handle) = delegate.active_schedule_handle() {
            if pending_schedule(delegate, &handle)?.is_none() {
                warn!("Active schedule {} missing from pending schedules", handle);
                Err(ErrorCode::InvalidInState)?;
            }
        }

        Ok(())
    }
}

fn check_transition<D>(
    delegate: &D,
    transition: &Transition,
    features: ScheduleTypeFeatures,
) -> Result<(), Error>
where
    D: ThermostatDelegate + ?Sized,
{
    if transition.day_of_week.is_empty() || transition.transition_time > MAX_TRANSITION_TIME {
        Err(ErrorCode::ConstraintError)?;
    }

    if transition.preset_handle.is_none()
        && transition.system_mode.is_none()
        && !transition.has_setpoint()
    {
        warn!("Transition without a preset, a system mode or a setpoint");
        Err(ErrorCode::ConstraintError)?;
    }

    if let Some(handle) = &transition.preset_handle {
        check_preset_reference(delegate, handle, features)?;
    }

    if transition.has_setpoint() && !features.contains(ScheduleTypeFeatures::SUPPORTS_SETPOINTS) {
        warn!("Transition setpoints are not supported");
        Err(ErrorCode::ConstraintError)?;
    }

    Ok(())
}

/// Schedules may only refer to committed presets, and only if their type allows presets.
fn check_preset_reference<D>(
    delegate: &D,
    handle: &Handle,
    features: ScheduleTypeFeatures,
) -> Result<(), Error>
where
    D: ThermostatDelegate + ?Sized,
{
    if !features.contains(ScheduleTypeFeatures::SUPPORTS_PRESETS) {
        warn!("Schedule refers to preset {} without preset support", handle);
        Err(ErrorCode::ConstraintError)?;
    }

    if committed_preset(delegate, handle.as_slice())?.is_none() {
        warn!("Schedule refers to unknown preset {}", handle);
        Err(ErrorCode::ConstraintError)?;
    }

    Ok(())
}

fn pending_schedule<D>(delegate: &D, handle: &Handle) -> Result<Option<Schedule>, Error>
where
    D: ThermostatDelegate + ?Sized,
{
    find_entry(
        |i| delegate.pending_schedule_at(i),
        |s| s.handle_matches(handle.as_slice()),
    )
}
