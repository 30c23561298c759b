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

//! Commit-time validation of the pending `Presets` list.

use log::warn;

use crate::error::{Error, ErrorCode};

use super::atomic::{CommitContext, CommitValidator};
use super::delegate::{
    committed_preset, entries, find_entry, next_entry, preset_type_for, ThermostatDelegate,
};
use super::setpoints::Setpoints;
use super::types::{AttrCategory, Handle, Preset, PresetScenario, PresetTypeFeatures, Schedule};

/// Number of distinct preset scenarios.
const SCENARIOS: usize = 7;

/// Validates a pending `Presets` list against the committed one and the `PresetTypes`
/// catalog, then clamps the pending setpoints into the current limits.
pub struct PresetsValidator;

impl CommitValidator for PresetsValidator {
    fn precommit<D>(&self, delegate: &mut D, ctx: &CommitContext<'_>) -> Result<(), Error>
    where
        D: ThermostatDelegate + ?Sized,
    {
        self.check_coverage(delegate, ctx)?;
        self.check_admission(delegate)?;
        self.normalize(delegate, ctx.setpoints)
    }
}

impl PresetsValidator {
    /// Every built-in and every referenced committed preset has to survive the commit.
    fn check_coverage<D>(&self, delegate: &D, ctx: &CommitContext<'_>) -> Result<(), Error>
    where
        D: ThermostatDelegate + ?Sized,
    {
        for old in entries(|i| delegate.preset_at(i)) {
            let old = old?;

            let Some(handle) = &old.handle else {
                continue;
            };

            if pending_preset(delegate, handle)?.is_some() {
                continue;
            }

            if old.is_built_in() {
                warn!("Built-in preset {} missing from pending presets", handle);
                Err(ErrorCode::ConstraintError)?;
            }

            if is_referenced(delegate, ctx, handle)? {
                warn!("Preset {} is still in use and cannot be removed", handle);
                Err(ErrorCode::InvalidInState)?;
            }
        }

        Ok(())
    }

    fn check_admission<D>(&self, delegate: &D) -> Result<(), Error>
    where
        D: ThermostatDelegate + ?Sized,
    {
        let number_of_presets = delegate.number_of_presets() as usize;

        let mut total = 0;
        let mut per_scenario = heapless::Vec::<(PresetScenario, u8), SCENARIOS>::new();

        for (index, candidate) in entries(|i| delegate.pending_preset_at(i)).enumerate() {
            let candidate = candidate?;

            if let Some(handle) = &candidate.handle {
                let Some(old) = committed_preset(delegate, handle.as_slice())? else {
                    warn!("Pending preset {} does not exist", handle);
                    return Err(ErrorCode::NotFound.into());
                };

                let duplicate = entries(|i| delegate.pending_preset_at(i))
                    .take(index)
                    .try_fold(false, |dup, p| {
                        p.map(|p| dup || p.handle_matches(handle.as_slice()))
                    })?;

                if duplicate {
                    warn!("Pending preset handle {} is not unique", handle);
                    Err(ErrorCode::ConstraintError)?;
                }

                if let Some(built_in) = candidate.built_in {
                    if built_in != old.is_built_in() {
                        warn!("Pending preset {} flips its built-in flag", handle);
                        Err(ErrorCode::ConstraintError)?;
                    }
                }
            } else if candidate.is_built_in() {
                warn!("New presets cannot be built-in");
                Err(ErrorCode::ConstraintError)?;
            }

            let Some(preset_type) = preset_type_for(delegate, candidate.scenario)? else {
                warn!("No preset type for scenario {:?}", candidate.scenario);
                return Err(ErrorCode::ConstraintError.into());
            };

            if candidate.has_name()
                && !preset_type
                    .features
                    .contains(PresetTypeFeatures::SUPPORTS_NAMES)
            {
                warn!("Scenario {:?} does not support names", candidate.scenario);
                Err(ErrorCode::ConstraintError)?;
            }

            total += 1;
            if total > number_of_presets {
                warn!("More than {} pending presets", number_of_presets);
                Err(ErrorCode::ResourceExhausted)?;
            }

            let count = match per_scenario
                .iter_mut()
                .find(|(scenario, _)| *scenario == candidate.scenario)
            {
                Some((_, count)) => {
                    *count += 1;
                    *count
                }
                None => {
                    per_scenario
                        .push((candidate.scenario, 1))
                        .map_err(|_| ErrorCode::ResourceExhausted)?;
                    1
                }
            };

            if count > preset_type.number_of_presets {
                warn!(
                    "More than {} pending presets for scenario {:?}",
                    preset_type.number_of_presets, candidate.scenario
                );
                Err(ErrorCode::ResourceExhausted)?;
            }
        }

        Ok(())
    }

    /// Settle the built-in flag of every pending preset and clamp its setpoints into
    /// the current limits.
    fn normalize<D>(&self, delegate: &mut D, setpoints: &Setpoints) -> Result<(), Error>
    where
        D: ThermostatDelegate + ?Sized,
    {
        let mut index = 0;

        while let Some(preset) = next_entry(delegate.pending_preset_at(index))? {
            let built_in = match &preset.handle {
                Some(handle) => committed_preset(delegate, handle.as_slice())?
                    .map(|old| old.is_built_in())
                    .unwrap_or(false),
                None => false,
            };

            let normalized = Preset {
                built_in: Some(built_in),
                cooling_setpoint: preset
                    .cooling_setpoint
                    .map(|v| setpoints.enforce_cooling_limits(v)),
                heating_setpoint: preset
                    .heating_setpoint
                    .map(|v| setpoints.enforce_heating_limits(v)),
                ..preset.clone()
            };

            if normalized != preset {
                delegate.set_pending_preset(index, normalized)?;
            }

            index += 1;
        }

        Ok(())
    }
}

fn pending_preset<D>(delegate: &D, handle: &Handle) -> Result<Option<Preset>, Error>
where
    D: ThermostatDelegate + ?Sized,
{
    find_entry(
        |i| delegate.pending_preset_at(i),
        |p| p.handle_matches(handle.as_slice()),
    )
}

/// Whether anything other than the preset list itself depends on the preset.
///
/// When the schedules are committed by the same session, their pending list is the one
/// which will refer to the preset afterwards.
fn is_referenced<D>(delegate: &D, ctx: &CommitContext<'_>, handle: &Handle) -> Result<bool, Error>
where
    D: ThermostatDelegate + ?Sized,
{
    if delegate.active_preset_handle().as_ref() == Some(handle)
        || delegate.is_preset_in_use(handle)
        || ctx.suggestions.iter().any(|s| s.preset_handle == *handle)
    {
        return Ok(true);
    }

    let refers = |s: &Schedule| s.preset_handles().any(|h| h == handle);

    let schedule = if ctx.is_staged(AttrCategory::Schedules) {
        find_entry(|i| delegate.pending_schedule_at(i), refers)?
    } else {
        find_entry(|i| delegate.schedule_at(i), refers)?
    };

    Ok(schedule.is_some())
}
