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

//! The `ThermostatSuggestions` list: time-bounded preset suggestions and the choice of
//! the current one.

use log::{debug, info, warn};

use crate::error::{Error, ErrorCode};
use crate::utils::epoch::SECONDS_PER_DAY;

use super::delegate::{committed_preset, ThermostatDelegate};
use super::types::{Handle, Suggestion};

/// Default capacity of the suggestions list.
pub const MAX_SUGGESTIONS: usize = 8;

pub const MIN_EXPIRATION_MINUTES: u16 = 30;
pub const MAX_EXPIRATION_MINUTES: u16 = 1440;

/// Ordered list of suggestions plus the id of the current one.
#[derive(Debug, Clone, Default)]
pub struct SuggestionLedger<const N: usize> {
    entries: heapless::Vec<Suggestion, N>,
    current: Option<u8>,
}

impl<const N: usize> SuggestionLedger<N> {
    #[inline(always)]
    pub const fn new() -> Self {
        Self {
            entries: heapless::Vec::new(),
            current: None,
        }
    }

    pub fn entries(&self) -> &[Suggestion] {
        &self.entries
    }

    pub fn get(&self, unique_id: u8) -> Option<&Suggestion> {
        self.entries.iter().find(|s| s.unique_id == unique_id)
    }

    /// The `CurrentThermostatSuggestion` attribute.
    pub fn current(&self) -> Option<&Suggestion> {
        self.current.and_then(|id| self.get(id))
    }

    /// Add a suggestion and return its unique id.
    ///
    /// `now` is the current UTC time in Matter-epoch seconds, `None` if unknown.
    pub fn add<D>(
        &mut self,
        preset_handle: &[u8],
        effective_time: Option<u32>,
        expiration_minutes: u16,
        now: Option<u32>,
        delegate: &D,
    ) -> Result<u8, Error>
    where
        D: ThermostatDelegate + ?Sized,
    {
        let Some(now) = now else {
            warn!("Cannot add a suggestion without knowing the time");
            return Err(ErrorCode::InvalidInState.into());
        };

        if !(MIN_EXPIRATION_MINUTES..=MAX_EXPIRATION_MINUTES).contains(&expiration_minutes) {
            Err(ErrorCode::ConstraintError)?;
        }

        self.sweep_expired(now);

        let effective_time = effective_time.unwrap_or(now);

        if effective_time > now.saturating_add(SECONDS_PER_DAY) {
            warn!("Suggestion effective more than a day from now");
            Err(ErrorCode::InvalidCommand)?;
        }

        let lifetime = expiration_minutes as u32 * 60;
        let expiration_time = effective_time.saturating_add(lifetime);

        if expiration_time <= now {
            warn!("Suggestion expired before it was added");
            Err(ErrorCode::InvalidCommand)?;
        }

        let handle = Handle::new(preset_handle)?;

        if committed_preset(delegate, handle.as_slice())?.is_none() {
            warn!("Suggested preset {} does not exist", handle);
            Err(ErrorCode::NotFound)?;
        }

        let max = N.min(delegate.max_thermostat_suggestions() as usize);
        if self.entries.len() >= max {
            Err(ErrorCode::ResourceExhausted)?;
        }

        let unique_id = (0..=u8::MAX)
            .find(|id| self.get(*id).is_none())
            .ok_or(ErrorCode::ResourceExhausted)?;

        self.entries
            .push(Suggestion {
                unique_id,
                preset_handle: handle,
                effective_time,
                expiration_time,
            })
            .map_err(|_| ErrorCode::ResourceExhausted)?;

        info!("Added thermostat suggestion {}", unique_id);

        self.re_evaluate(now, delegate);

        Ok(unique_id)
    }

    /// Remove the suggestion with the given id, keeping the order of the others.
    pub fn remove<D>(&mut self, unique_id: u8, now: Option<u32>, delegate: &D) -> Result<(), Error>
    where
        D: ThermostatDelegate + ?Sized,
    {
        if let Some(now) = now {
            self.sweep_expired(now);
        }

        let index = self
            .entries
            .iter()
            .position(|s| s.unique_id == unique_id)
            .ok_or(ErrorCode::NotFound)?;

        self.entries.remove(index);

        info!("Removed thermostat suggestion {}", unique_id);

        match now {
            Some(now) => self.re_evaluate(now, delegate),
            None => {
                if self.current == Some(unique_id) {
                    self.current = None;
                }
            }
        }

        Ok(())
    }

    /// Drop every suggestion that expired at or before `now`.
    ///
    /// Returns the number of dropped entries.
    pub fn sweep_expired(&mut self, now: u32) -> usize {
        let mut removed = 0;

        for index in (0..self.entries.len()).rev() {
            if self.entries[index].expiration_time <= now {
                let expired = self.entries.remove(index);
                debug!("Thermostat suggestion {} expired", expired.unique_id);

                if self.current == Some(expired.unique_id) {
                    self.current = None;
                }

                removed += 1;
            }
        }

        removed
    }

    /// Sweep expired entries and let the delegate pick the current suggestion.
    pub fn re_evaluate<D>(&mut self, now: u32, delegate: &D)
    where
        D: ThermostatDelegate + ?Sized,
    {
        self.sweep_expired(now);

        let current = delegate
            .evaluate_current_suggestion(&self.entries, now)
            .filter(|id| self.get(*id).is_some());

        if current != self.current {
            debug!("Current thermostat suggestion: {:?}", current);
            self.current = current;
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current = None;
    }
}
