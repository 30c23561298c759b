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

//! The server side of the Thermostat cluster: atomic writes of the `Presets` and
//! `Schedules` attributes, setpoints and their limits, and thermostat suggestions.

use core::time::Duration;

use log::{debug, info, warn};

use crate::acl::CallerIdentity;
use crate::dm::types::Dataver;
use crate::error::{Error, ErrorCode};
use crate::im::{AtomicRequest, AtomicRequestType, AtomicResponse};
use crate::utils::epoch::{Epoch, UtcClock};

pub use atomic::*;
pub use basic::*;
pub use delegate::*;
pub use setpoints::*;
pub use staging::*;
pub use suggestions::*;
pub use types::*;

pub mod atomic;
pub mod basic;
pub mod delegate;
pub mod presets;
pub mod schedules;
pub mod setpoints;
pub mod staging;
pub mod suggestions;
pub mod types;

/// One Thermostat cluster instance, i.e. the cluster on one endpoint.
pub struct ThermostatCluster<D> {
    endpoint_id: u16,
    features: Feature,
    delegate: D,
    session: AtomicWriteSession,
    setpoints: Setpoints,
    system_mode: SystemMode,
    occupied: bool,
    suggestions: SuggestionLedger<MAX_SUGGESTIONS>,
    utc: UtcClock,
    dataver: Dataver,
}

impl<D> ThermostatCluster<D>
where
    D: ThermostatDelegate,
{
    pub const fn new(
        endpoint_id: u16,
        features: Feature,
        delegate: D,
        conf: &SetpointConfig,
        epoch: Epoch,
        utc: UtcClock,
    ) -> Self {
        Self {
            endpoint_id,
            features,
            delegate,
            session: AtomicWriteSession::new(epoch),
            setpoints: Setpoints::new(conf),
            system_mode: SystemMode::Off,
            occupied: true,
            suggestions: SuggestionLedger::new(),
            utc,
            dataver: Dataver::new(0),
        }
    }

    pub const fn endpoint_id(&self) -> u16 {
        self.endpoint_id
    }

    pub const fn features(&self) -> Feature {
        self.features
    }

    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    pub fn delegate_mut(&mut self) -> &mut D {
        &mut self.delegate
    }

    pub const fn setpoints(&self) -> &Setpoints {
        &self.setpoints
    }

    pub const fn system_mode(&self) -> SystemMode {
        self.system_mode
    }

    pub const fn session(&self) -> &AtomicWriteSession {
        &self.session
    }

    pub fn dataver(&self) -> u32 {
        self.dataver.get()
    }

    /// Whether the occupied pair of setpoints is in effect.
    pub const fn is_occupied(&self) -> bool {
        self.occupied || !self.features.contains(Feature::OCCUPANCY)
    }

    /// Update the occupancy as sensed by the device.
    pub fn set_occupied(&mut self, occupied: bool) {
        self.occupied = occupied;
    }

    const fn auto_mode(&self) -> bool {
        self.features.contains(Feature::AUTO_MODE)
    }

    /// Handle an `AtomicRequest` command.
    pub fn handle_atomic_request(
        &mut self,
        caller: &CallerIdentity,
        request: &AtomicRequest,
    ) -> Result<AtomicResponse, Error> {
        let attrs = request.attribute_requests.as_slice();

        match request.request_type {
            AtomicRequestType::BeginWrite => self.session.begin(
                caller,
                attrs,
                request.timeout,
                self.features,
                &mut self.delegate,
            ),
            AtomicRequestType::CommitWrite => {
                // Expired suggestions must not keep their presets alive
                self.reevaluate_suggestions();

                let response = self.session.commit(
                    caller,
                    attrs,
                    &mut self.delegate,
                    &self.setpoints,
                    self.suggestions.entries(),
                )?;

                if response.status.is_success() {
                    self.dataver.changed();
                }

                Ok(response)
            }
            AtomicRequestType::RollbackWrite => {
                self.session.rollback(caller, attrs, &mut self.delegate)
            }
        }
    }

    /// The token of the open atomic write, to be handed back to `on_timeout`.
    pub fn token(&self) -> Option<SessionToken> {
        self.session.token()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.session.deadline()
    }

    /// The deadline armed for the session of `token` fired.
    pub fn on_timeout(&mut self, token: SessionToken) -> bool {
        self.session.on_timeout(token, &mut self.delegate)
    }

    /// Roll back the open atomic write if its deadline passed.
    pub fn expire_due(&mut self) -> bool {
        self.session.expire_if_due(&mut self.delegate)
    }

    pub fn in_atomic_write(
        &self,
        caller: Option<&CallerIdentity>,
        attr: Option<AttrCategory>,
    ) -> bool {
        self.session.in_atomic_write(caller, attr)
    }

    /// Read the `Presets` attribute.
    ///
    /// The owner of an atomic write on `Presets` reads its pending list; everyone else
    /// reads the committed one.
    pub fn read_presets<F>(&self, caller: Option<&CallerIdentity>, mut f: F) -> Result<(), Error>
    where
        F: FnMut(&Preset) -> Result<(), Error>,
    {
        self.check_feature(Feature::PRESETS, ErrorCode::UnsupportedAttribute)?;

        let pending = caller.is_some() && self.in_atomic_write(caller, Some(AttrCategory::Presets));

        for preset in entries(|i| {
            if pending {
                self.delegate.pending_preset_at(i)
            } else {
                self.delegate.preset_at(i)
            }
        }) {
            f(&preset?)?;
        }

        Ok(())
    }

    /// Read the `Schedules` attribute, with the same view rules as `read_presets`.
    pub fn read_schedules<F>(&self, caller: Option<&CallerIdentity>, mut f: F) -> Result<(), Error>
    where
        F: FnMut(&Schedule) -> Result<(), Error>,
    {
        self.check_feature(
            Feature::MATTER_SCHEDULE_CONFIGURATION,
            ErrorCode::UnsupportedAttribute,
        )?;

        let pending =
            caller.is_some() && self.in_atomic_write(caller, Some(AttrCategory::Schedules));

        for schedule in entries(|i| {
            if pending {
                self.delegate.pending_schedule_at(i)
            } else {
                self.delegate.schedule_at(i)
            }
        }) {
            f(&schedule?)?;
        }

        Ok(())
    }

    /// Write the `Presets` attribute. Only possible inside an atomic write, where it
    /// edits the pending list.
    pub fn write_presets(
        &mut self,
        caller: &CallerIdentity,
        op: ListOp<'_, Preset>,
    ) -> Result<(), Error> {
        self.check_feature(Feature::PRESETS, ErrorCode::UnsupportedAttribute)?;
        self.check_staged_write(caller, AttrCategory::Presets)?;

        match op {
            ListOp::ReplaceAll(presets) => {
                self.delegate.clear_pending_presets();

                for preset in presets {
                    self.delegate.append_pending_preset(preset.clone())?;
                }
            }
            ListOp::AppendItem(preset) => self.delegate.append_pending_preset(preset)?,
            _ => Err(ErrorCode::UnsupportedWrite)?,
        }

        Ok(())
    }

    /// Write the `Schedules` attribute, with the same rules as `write_presets`.
    pub fn write_schedules(
        &mut self,
        caller: &CallerIdentity,
        op: ListOp<'_, Schedule>,
    ) -> Result<(), Error> {
        self.check_feature(
            Feature::MATTER_SCHEDULE_CONFIGURATION,
            ErrorCode::UnsupportedAttribute,
        )?;
        self.check_staged_write(caller, AttrCategory::Schedules)?;

        match op {
            ListOp::ReplaceAll(schedules) => {
                self.delegate.clear_pending_schedules();

                for schedule in schedules {
                    self.delegate.append_pending_schedule(schedule.clone())?;
                }
            }
            ListOp::AppendItem(schedule) => self.delegate.append_pending_schedule(schedule)?,
            _ => Err(ErrorCode::UnsupportedWrite)?,
        }

        Ok(())
    }

    /// Write one of the four occupied/unoccupied heating/cooling setpoints.
    pub fn write_setpoint(&mut self, attr: AttributeId, value: i16) -> Result<(), Error> {
        let (is_heating, occupied) = match attr {
            AttributeId::OccupiedHeatingSetpoint => (true, true),
            AttributeId::OccupiedCoolingSetpoint => (false, true),
            AttributeId::UnoccupiedHeatingSetpoint => (true, false),
            AttributeId::UnoccupiedCoolingSetpoint => (false, false),
            _ => Err(ErrorCode::UnsupportedAttribute)?,
        };

        let mut required = if is_heating {
            Feature::HEATING
        } else {
            Feature::COOLING
        };
        if !occupied {
            required |= Feature::OCCUPANCY;
        }

        self.check_feature(required, ErrorCode::UnsupportedAttribute)?;

        if self
            .setpoints
            .change_setpoint(value, is_heating, self.auto_mode(), occupied)?
        {
            debug!("Endpoint {}: {:?} set to {}", self.endpoint_id, attr, value);

            self.clear_active_handles()?;
            self.dataver.changed();
        }

        Ok(())
    }

    /// Write one of the four user setpoint limits.
    pub fn write_setpoint_limit(&mut self, attr: AttributeId, value: i16) -> Result<(), Error> {
        let (kind, required) = match attr {
            AttributeId::MinHeatSetpointLimit => (LimitKind::MinHeat, Feature::HEATING),
            AttributeId::MaxHeatSetpointLimit => (LimitKind::MaxHeat, Feature::HEATING),
            AttributeId::MinCoolSetpointLimit => (LimitKind::MinCool, Feature::COOLING),
            AttributeId::MaxCoolSetpointLimit => (LimitKind::MaxCool, Feature::COOLING),
            _ => Err(ErrorCode::UnsupportedAttribute)?,
        };

        self.check_feature(required, ErrorCode::UnsupportedAttribute)?;

        self.setpoints
            .change_setpoint_limit(kind, value, self.auto_mode())?;
        self.dataver.changed();

        Ok(())
    }

    /// Write the `MinSetpointDeadBand` attribute, in 0.1 °C.
    pub fn write_min_setpoint_dead_band(&mut self, value: i8) -> Result<(), Error> {
        self.check_feature(Feature::AUTO_MODE, ErrorCode::UnsupportedAttribute)?;

        self.setpoints.set_min_setpoint_dead_band(value, true)?;
        self.dataver.changed();

        Ok(())
    }

    /// Write the `SystemMode` attribute.
    pub fn write_system_mode(&mut self, mode: SystemMode) -> Result<(), Error> {
        self.check_system_mode(mode)?;

        if self.system_mode != mode {
            info!("Endpoint {}: system mode {:?}", self.endpoint_id, mode);

            self.system_mode = mode;
            self.dataver.changed();
        }

        Ok(())
    }

    /// Handle a `SetpointRaiseLower` command. `amount` is in 0.1 °C.
    pub fn handle_setpoint_raise_lower(
        &mut self,
        mode: SetpointRaiseLowerMode,
        amount: i8,
    ) -> Result<(), Error> {
        let required = match mode {
            SetpointRaiseLowerMode::Heat => Feature::HEATING,
            SetpointRaiseLowerMode::Cool => Feature::COOLING,
            SetpointRaiseLowerMode::Both => Feature::HEATING | Feature::COOLING,
        };

        self.check_feature(required, ErrorCode::InvalidCommand)?;

        if self
            .setpoints
            .raise_lower(mode, amount, self.auto_mode(), self.is_occupied())?
        {
            self.clear_active_handles()?;
            self.dataver.changed();
        }

        Ok(())
    }

    /// Handle a `SetActivePresetRequest` command.
    ///
    /// A null handle clears the active preset. Otherwise the setpoints of the preset
    /// are applied and it becomes the active one.
    pub fn handle_set_active_preset_request(&mut self, handle: Option<&[u8]>) -> Result<(), Error> {
        self.check_feature(Feature::PRESETS, ErrorCode::CommandNotFound)?;

        let Some(handle) = handle else {
            self.delegate.set_active_preset_handle(None)?;
            self.dataver.changed();

            return Ok(());
        };

        let Some(preset) = committed_preset(&self.delegate, handle)? else {
            warn!("Endpoint {}: no preset with handle {:02x?}", self.endpoint_id, handle);
            return Err(ErrorCode::NotFound.into());
        };

        self.apply_preset(&preset)?;

        let handle = Handle::new(handle)?;

        self.delegate.set_active_preset_handle(Some(handle.clone()))?;
        self.delegate.on_preset_applied(&handle);
        self.dataver.changed();

        info!("Endpoint {}: active preset {}", self.endpoint_id, handle);

        Ok(())
    }

    /// Handle a `SetActiveScheduleRequest` command.
    ///
    /// A null handle clears the active schedule. Otherwise the schedule's system mode
    /// and, if it names one, the setpoints of its preset are applied.
    pub fn handle_set_active_schedule_request(
        &mut self,
        handle: Option<&[u8]>,
    ) -> Result<(), Error> {
        self.check_feature(
            Feature::MATTER_SCHEDULE_CONFIGURATION,
            ErrorCode::CommandNotFound,
        )?;

        let Some(handle) = handle else {
            self.delegate.set_active_schedule_handle(None)?;
            self.dataver.changed();

            return Ok(());
        };

        let Some(schedule) = committed_schedule(&self.delegate, handle)? else {
            warn!("Endpoint {}: no schedule with handle {:02x?}", self.endpoint_id, handle);
            return Err(ErrorCode::NotFound.into());
        };

        self.check_system_mode(schedule.system_mode)?;

        if let Some(preset_handle) = &schedule.preset_handle {
            if let Some(preset) = committed_preset(&self.delegate, preset_handle.as_slice())? {
                self.apply_preset(&preset)?;
            }
        }

        self.system_mode = schedule.system_mode;
        self.delegate
            .set_active_schedule_handle(Some(Handle::new(handle)?))?;
        self.dataver.changed();

        info!("Endpoint {}: active schedule {:02x?}", self.endpoint_id, handle);

        Ok(())
    }

    /// Handle an `AddThermostatSuggestion` command and return the id of the new entry.
    pub fn handle_add_thermostat_suggestion(
        &mut self,
        preset_handle: &[u8],
        effective_time: Option<u32>,
        expiration_minutes: u16,
    ) -> Result<u8, Error> {
        self.check_feature(
            Feature::PRESETS | Feature::THERMOSTAT_SUGGESTIONS,
            ErrorCode::CommandNotFound,
        )?;

        let unique_id = self.suggestions.add(
            preset_handle,
            effective_time,
            expiration_minutes,
            (self.utc)(),
            &self.delegate,
        )?;

        self.dataver.changed();

        Ok(unique_id)
    }

    /// Handle a `RemoveThermostatSuggestion` command.
    pub fn handle_remove_thermostat_suggestion(&mut self, unique_id: u8) -> Result<(), Error> {
        self.check_feature(
            Feature::PRESETS | Feature::THERMOSTAT_SUGGESTIONS,
            ErrorCode::CommandNotFound,
        )?;

        self.suggestions
            .remove(unique_id, (self.utc)(), &self.delegate)?;
        self.dataver.changed();

        Ok(())
    }

    /// The `ThermostatSuggestions` attribute.
    pub fn thermostat_suggestions(&self) -> &[Suggestion] {
        self.suggestions.entries()
    }

    /// The `CurrentThermostatSuggestion` attribute.
    pub fn current_thermostat_suggestion(&self) -> Option<&Suggestion> {
        self.suggestions.current()
    }

    /// Drop expired suggestions and pick the current one again, e.g. periodically or
    /// after the node synchronized its time.
    pub fn reevaluate_suggestions(&mut self) {
        if let Some(now) = (self.utc)() {
            let before = self.suggestions.current().map(|s| s.unique_id);
            let len = self.suggestions.entries().len();

            self.suggestions.re_evaluate(now, &self.delegate);

            if before != self.suggestions.current().map(|s| s.unique_id)
                || len != self.suggestions.entries().len()
            {
                self.dataver.changed();
            }
        }
    }

    /// Reset the endpoint: roll back any atomic write and forget all suggestions.
    pub fn reset(&mut self) {
        self.session.abort(&mut self.delegate);
        self.suggestions.clear();
        self.dataver.changed();

        info!("Endpoint {}: thermostat reset", self.endpoint_id);
    }

    fn apply_preset(&mut self, preset: &Preset) -> Result<(), Error> {
        let occupied = !(preset.scenario == PresetScenario::Unoccupied
            && self.features.contains(Feature::OCCUPANCY));

        self.setpoints.apply(
            preset.cooling_setpoint,
            preset.heating_setpoint,
            self.auto_mode(),
            occupied,
        )?;

        Ok(())
    }

    fn clear_active_handles(&mut self) -> Result<(), Error> {
        if self.delegate.active_preset_handle().is_some() {
            debug!(
                "Endpoint {}: setpoints no longer match the active preset",
                self.endpoint_id
            );
            self.delegate.set_active_preset_handle(None)?;
        }

        if self.delegate.active_schedule_handle().is_some() {
            self.delegate.set_active_schedule_handle(None)?;
        }

        Ok(())
    }

    fn check_feature(&self, required: Feature, or: ErrorCode) -> Result<(), Error> {
        if !self.features.contains(required) {
            Err(or)?;
        }

        Ok(())
    }

    fn check_system_mode(&self, mode: SystemMode) -> Result<(), Error> {
        let required = match mode {
            SystemMode::Heat | SystemMode::EmergencyHeat => Feature::HEATING,
            SystemMode::Cool | SystemMode::Precooling => Feature::COOLING,
            SystemMode::Auto => Feature::AUTO_MODE,
            _ => Feature::empty(),
        };

        self.check_feature(required, ErrorCode::ConstraintError)
    }

    /// A staged attribute can only be written by the owner of an atomic write on it.
    fn check_staged_write(
        &mut self,
        caller: &CallerIdentity,
        attr: AttrCategory,
    ) -> Result<(), Error> {
        self.expire_due();

        if self.in_atomic_write(Some(caller), Some(attr)) {
            Ok(())
        } else if self.session.owner_of(attr).is_some() {
            warn!(
                "Endpoint {}: {:?} is being written by another caller",
                self.endpoint_id, attr
            );
            Err(ErrorCode::Busy.into())
        } else {
            warn!(
                "Endpoint {}: {:?} written outside of an atomic write",
                self.endpoint_id, attr
            );
            Err(ErrorCode::InvalidInState.into())
        }
    }
}
