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

//! Heating/cooling setpoints and their limits.
//!
//! Setpoints and limits are in 0.01 °C. The deadband is in 0.1 °C, as it is exposed by
//! the `MinSetpointDeadBand` attribute.

use log::{debug, warn};

use crate::error::{Error, ErrorCode};

use super::types::SetpointRaiseLowerMode;

/// Largest value accepted for `MinSetpointDeadBand`.
pub const MAX_DEAD_BAND: i8 = 127;

/// The four user-writable setpoint limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitKind {
    MinHeat,
    MaxHeat,
    MinCool,
    MaxCool,
}

/// Initial values of the setpoints and their limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetpointConfig {
    pub abs_min_heat: i16,
    pub abs_max_heat: i16,
    pub abs_min_cool: i16,
    pub abs_max_cool: i16,
    pub min_heat: i16,
    pub max_heat: i16,
    pub min_cool: i16,
    pub max_cool: i16,
    pub dead_band: i8,
    pub occupied_heating: i16,
    pub occupied_cooling: i16,
    pub unoccupied_heating: i16,
    pub unoccupied_cooling: i16,
}

impl SetpointConfig {
    pub const fn new() -> Self {
        Self {
            abs_min_heat: 700,
            abs_max_heat: 3000,
            abs_min_cool: 1600,
            abs_max_cool: 3200,
            min_heat: 700,
            max_heat: 3000,
            min_cool: 1600,
            max_cool: 3200,
            dead_band: 25,
            occupied_heating: 2000,
            occupied_cooling: 2600,
            unoccupied_heating: 2000,
            unoccupied_cooling: 2600,
        }
    }
}

impl Default for SetpointConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Pair {
    heating: i16,
    cooling: i16,
}

/// The current setpoints of a thermostat endpoint, together with their limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setpoints {
    abs_min_heat: i16,
    abs_max_heat: i16,
    abs_min_cool: i16,
    abs_max_cool: i16,
    min_heat: i16,
    max_heat: i16,
    min_cool: i16,
    max_cool: i16,
    dead_band: i8,
    occupied: Pair,
    unoccupied: Pair,
}

impl Default for Setpoints {
    fn default() -> Self {
        Self::new(&SetpointConfig::new())
    }
}

impl Setpoints {
    pub const fn new(conf: &SetpointConfig) -> Self {
        Self {
            abs_min_heat: conf.abs_min_heat,
            abs_max_heat: conf.abs_max_heat,
            abs_min_cool: conf.abs_min_cool,
            abs_max_cool: conf.abs_max_cool,
            min_heat: conf.min_heat,
            max_heat: conf.max_heat,
            min_cool: conf.min_cool,
            max_cool: conf.max_cool,
            dead_band: conf.dead_band,
            occupied: Pair {
                heating: conf.occupied_heating,
                cooling: conf.occupied_cooling,
            },
            unoccupied: Pair {
                heating: conf.unoccupied_heating,
                cooling: conf.unoccupied_cooling,
            },
        }
    }

    pub const fn heating(&self, occupied: bool) -> i16 {
        if occupied {
            self.occupied.heating
        } else {
            self.unoccupied.heating
        }
    }

    pub const fn cooling(&self, occupied: bool) -> i16 {
        if occupied {
            self.occupied.cooling
        } else {
            self.unoccupied.cooling
        }
    }

    pub const fn limit(&self, kind: LimitKind) -> i16 {
        match kind {
            LimitKind::MinHeat => self.min_heat,
            LimitKind::MaxHeat => self.max_heat,
            LimitKind::MinCool => self.min_cool,
            LimitKind::MaxCool => self.max_cool,
        }
    }

    /// The `MinSetpointDeadBand` attribute, in 0.1 °C.
    pub const fn min_setpoint_dead_band(&self) -> i8 {
        self.dead_band
    }

    /// The deadband in the unit of the setpoints.
    pub const fn dead_band(&self) -> i16 {
        self.dead_band as i16 * 10
    }

    const fn heat_range(&self) -> (i16, i16) {
        (
            max(self.min_heat, self.abs_min_heat),
            min(self.max_heat, self.abs_max_heat),
        )
    }

    const fn cool_range(&self) -> (i16, i16) {
        (
            max(self.min_cool, self.abs_min_cool),
            min(self.max_cool, self.abs_max_cool),
        )
    }

    /// Clamp a heating setpoint into the configured limits.
    pub fn enforce_heating_limits(&self, value: i16) -> i16 {
        let (lo, hi) = self.heat_range();
        value.max(lo).min(hi)
    }

    /// Clamp a cooling setpoint into the configured limits.
    pub fn enforce_cooling_limits(&self, value: i16) -> i16 {
        let (lo, hi) = self.cool_range();
        value.max(lo).min(hi)
    }

    fn pair_mut(&mut self, occupied: bool) -> &mut Pair {
        if occupied {
            &mut self.occupied
        } else {
            &mut self.unoccupied
        }
    }

    /// Change one setpoint, shifting the other side of the pair if auto mode requires
    /// the deadband to be kept.
    ///
    /// Returns `true` if any setpoint actually changed.
    pub fn change_setpoint(
        &mut self,
        value: i16,
        is_heating: bool,
        auto_mode: bool,
        occupied: bool,
    ) -> Result<bool, Error> {
        let (lo, hi) = if is_heating {
            self.heat_range()
        } else {
            self.cool_range()
        };

        if value < lo || value > hi {
            warn!(
                "Setpoint {} outside of [{}, {}] (heating: {})",
                value, lo, hi, is_heating
            );
            Err(ErrorCode::ConstraintError)?;
        }

        let current = if occupied { self.occupied } else { self.unoccupied };
        let mut new = current;

        if is_heating {
            new.heating = value;
        } else {
            new.cooling = value;
        }

        if auto_mode {
            new = self.keep_dead_band(new, is_heating)?;
        }

        *self.pair_mut(occupied) = new;

        Ok(new != current)
    }

    /// Shift the side opposite to the one just moved so that the pair honors the
    /// deadband. Fails if the shifted side would leave its own limits.
    fn keep_dead_band(&self, mut pair: Pair, heating_moved: bool) -> Result<Pair, Error> {
        let dead_band = self.dead_band() as i32;

        if (pair.cooling as i32 - pair.heating as i32) >= dead_band {
            return Ok(pair);
        }

        if heating_moved {
            let cooling = pair.heating as i32 + dead_band;
            if cooling > self.cool_range().1 as i32 {
                warn!(
                    "Heating setpoint {} would push cooling setpoint past its limit",
                    pair.heating
                );
                Err(ErrorCode::ConstraintError)?;
            }

            debug!("Shifting cooling setpoint to {} to keep the deadband", cooling);
            pair.cooling = cooling as i16;
        } else {
            let heating = pair.cooling as i32 - dead_band;
            if heating < self.heat_range().0 as i32 {
                warn!(
                    "Cooling setpoint {} would push heating setpoint past its limit",
                    pair.cooling
                );
                Err(ErrorCode::ConstraintError)?;
            }

            debug!("Shifting heating setpoint to {} to keep the deadband", heating);
            pair.heating = heating as i16;
        }

        Ok(pair)
    }

    /// Change one of the user setpoint limits.
    pub fn change_setpoint_limit(
        &mut self,
        kind: LimitKind,
        value: i16,
        auto_mode: bool,
    ) -> Result<(), Error> {
        let dead_band = self.dead_band();

        let valid = match kind {
            LimitKind::MinHeat => {
                value >= self.abs_min_heat
                    && value <= self.max_heat
                    && value <= self.abs_max_heat
                    && (!auto_mode || value as i32 <= self.min_cool as i32 - dead_band as i32)
            }
            LimitKind::MaxHeat => {
                value >= self.abs_min_heat
                    && value >= self.min_heat
                    && value <= self.abs_max_heat
                    && (!auto_mode || value as i32 <= self.max_cool as i32 - dead_band as i32)
            }
            LimitKind::MinCool => {
                value >= self.abs_min_cool
                    && value <= self.max_cool
                    && value <= self.abs_max_cool
                    && (!auto_mode || value as i32 >= self.min_heat as i32 + dead_band as i32)
            }
            LimitKind::MaxCool => {
                value >= self.abs_min_cool
                    && value >= self.min_cool
                    && value <= self.abs_max_cool
                    && (!auto_mode || value as i32 >= self.max_heat as i32 + dead_band as i32)
            }
        };

        if !valid {
            warn!("Rejecting {:?} setpoint limit {}", kind, value);
            Err(ErrorCode::ConstraintError)?;
        }

        match kind {
            LimitKind::MinHeat => self.min_heat = value,
            LimitKind::MaxHeat => self.max_heat = value,
            LimitKind::MinCool => self.min_cool = value,
            LimitKind::MaxCool => self.max_cool = value,
        }

        // Pull the setpoints back inside the new limits
        for occupied in [true, false] {
            let heating = self.enforce_heating_limits(self.heating(occupied));
            let cooling = self.enforce_cooling_limits(self.cooling(occupied));
            *self.pair_mut(occupied) = Pair { heating, cooling };
        }

        Ok(())
    }

    /// Change the `MinSetpointDeadBand` attribute.
    pub fn set_min_setpoint_dead_band(&mut self, value: i8, auto_mode: bool) -> Result<(), Error> {
        if !(0..=MAX_DEAD_BAND).contains(&value) {
            Err(ErrorCode::ConstraintError)?;
        }

        if auto_mode {
            let dead_band = value as i32 * 10;
            let fits = |heating: i16, cooling: i16| cooling as i32 - heating as i32 >= dead_band;

            if !fits(self.occupied.heating, self.occupied.cooling)
                || !fits(self.unoccupied.heating, self.unoccupied.cooling)
                || !fits(self.min_heat, self.min_cool)
                || !fits(self.max_heat, self.max_cool)
            {
                warn!("Deadband {} does not fit the current setpoints", value);
                Err(ErrorCode::ConstraintError)?;
            }
        }

        self.dead_band = value;

        Ok(())
    }

    /// Apply a SetpointRaiseLower command. `amount` is in 0.1 °C.
    ///
    /// The moved setpoints are clamped into their limits; in auto mode the deadband
    /// is kept by shifting the other side, as for a direct write.
    pub fn raise_lower(
        &mut self,
        mode: SetpointRaiseLowerMode,
        amount: i8,
        auto_mode: bool,
        occupied: bool,
    ) -> Result<bool, Error> {
        let delta = amount as i32 * 10;
        let current = if occupied { self.occupied } else { self.unoccupied };

        let heating = self.enforce_heating_limits(saturate(current.heating as i32 + delta));
        let cooling = self.enforce_cooling_limits(saturate(current.cooling as i32 + delta));

        let new = match mode {
            SetpointRaiseLowerMode::Heat => {
                let pair = Pair { heating, ..current };
                if auto_mode {
                    self.keep_dead_band(pair, true)?
                } else {
                    pair
                }
            }
            SetpointRaiseLowerMode::Cool => {
                let pair = Pair { cooling, ..current };
                if auto_mode {
                    self.keep_dead_band(pair, false)?
                } else {
                    pair
                }
            }
            SetpointRaiseLowerMode::Both => {
                let pair = Pair { heating, cooling };
                if auto_mode && (cooling as i32 - heating as i32) < self.dead_band() as i32 {
                    Err(ErrorCode::ConstraintError)?;
                }
                pair
            }
        };

        *self.pair_mut(occupied) = new;

        Ok(new != current)
    }

    /// Overwrite a pair of setpoints with values coming from a preset or a schedule.
    ///
    /// The values are clamped into their limits rather than validated against them.
    /// In auto mode the deadband is kept as for a direct write.
    pub fn apply(
        &mut self,
        cooling: Option<i16>,
        heating: Option<i16>,
        auto_mode: bool,
        occupied: bool,
    ) -> Result<bool, Error> {
        let current = if occupied { self.occupied } else { self.unoccupied };

        let mut new = current;
        if let Some(heating) = heating {
            new.heating = self.enforce_heating_limits(heating);
        }
        if let Some(cooling) = cooling {
            new.cooling = self.enforce_cooling_limits(cooling);
        }

        if auto_mode {
            new = self.keep_dead_band(new, heating.is_some())?;
        }

        *self.pair_mut(occupied) = new;

        Ok(new != current)
    }
}

const fn max(a: i16, b: i16) -> i16 {
    if a > b {
        a
    } else {
        b
    }
}

const fn min(a: i16, b: i16) -> i16 {
    if a < b {
        a
    } else {
        b
    }
}

fn saturate(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
