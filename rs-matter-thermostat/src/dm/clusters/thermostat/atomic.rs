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

//! The atomic write session: which attributes are open for staged editing, by whom,
//! and until when.

use core::time::Duration;

use log::{info, warn};

use crate::acl::CallerIdentity;
use crate::error::{Error, ErrorCode};
use crate::im::{AtomicResponse, IMStatusCode, MAX_ATOMIC_ATTRS};
use crate::utils::epoch::Epoch;

use super::delegate::ThermostatDelegate;
use super::presets::PresetsValidator;
use super::schedules::SchedulesValidator;
use super::setpoints::Setpoints;
use super::types::{AttrCategory, AttributeId, Feature, Suggestion};

/// State outside of the delegate which a commit has to be validated against.
#[derive(Debug, Clone, Copy)]
pub struct CommitContext<'a> {
    pub setpoints: &'a Setpoints,
    /// The categories staged by the committing session.
    pub staged: &'a [AttrCategory],
    /// The live `ThermostatSuggestions` entries.
    pub suggestions: &'a [Suggestion],
}

impl CommitContext<'_> {
    /// Whether `attr` is committed together with the category being validated.
    pub fn is_staged(&self, attr: AttrCategory) -> bool {
        self.staged.contains(&attr)
    }
}

/// Validates the pending list of one attribute category before it is committed.
///
/// Validation is all-or-nothing: either the whole pending list is accepted (and possibly
/// normalized in place), or the first failing status is returned and nothing is committed.
pub trait CommitValidator {
    fn precommit<D>(&self, delegate: &mut D, ctx: &CommitContext<'_>) -> Result<(), Error>
    where
        D: ThermostatDelegate + ?Sized;
}

impl AttrCategory {
    /// Run the commit validator of this category.
    pub fn precommit<D>(self, delegate: &mut D, ctx: &CommitContext<'_>) -> Result<(), Error>
    where
        D: ThermostatDelegate + ?Sized,
    {
        match self {
            Self::Presets => PresetsValidator.precommit(delegate, ctx),
            Self::Schedules => SchedulesValidator.precommit(delegate, ctx),
        }
    }

    /// The cluster feature an endpoint needs for this attribute to exist.
    pub const fn feature(self) -> Feature {
        match self {
            Self::Presets => Feature::PRESETS,
            Self::Schedules => Feature::MATTER_SCHEDULE_CONFIGURATION,
        }
    }

    fn commit<D>(self, delegate: &mut D) -> Result<(), Error>
    where
        D: ThermostatDelegate + ?Sized,
    {
        match self {
            Self::Presets => delegate.commit_pending_presets(),
            Self::Schedules => delegate.commit_pending_schedules(),
        }
    }

    fn clear_pending<D>(self, delegate: &mut D)
    where
        D: ThermostatDelegate + ?Sized,
    {
        match self {
            Self::Presets => delegate.clear_pending_presets(),
            Self::Schedules => delegate.clear_pending_schedules(),
        }
    }
}

/// Identifies one particular opening of the session.
///
/// A deadline callback armed for a session carries its token; once that session is
/// closed the token goes stale and the callback does nothing, even if a new session
/// has been opened in the meantime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken {
    generation: u32,
}

type Attributes = heapless::Vec<AttrCategory, MAX_ATOMIC_ATTRS>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenCtx {
    owner: CallerIdentity,
    attributes: Attributes,
    deadline: Duration,
    generation: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Closed,
    Open(OpenCtx),
}

/// The atomic write state machine of one endpoint:
/// `Closed --begin--> Open --{commit | rollback | timeout}--> Closed`.
pub struct AtomicWriteSession {
    state: State,
    generation: u32,
    epoch: Epoch,
}

impl AtomicWriteSession {
    #[inline(always)]
    pub const fn new(epoch: Epoch) -> Self {
        Self {
            state: State::Closed,
            generation: 0,
            epoch,
        }
    }

    pub const fn state(&self) -> &State {
        &self.state
    }

    pub const fn is_open(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    /// The token of the currently open session, if any.
    pub fn token(&self) -> Option<SessionToken> {
        match &self.state {
            State::Open(ctx) => Some(SessionToken {
                generation: ctx.generation,
            }),
            State::Closed => None,
        }
    }

    /// When the currently open session expires, relative to the session's epoch.
    pub fn deadline(&self) -> Option<Duration> {
        match &self.state {
            State::Open(ctx) => Some(ctx.deadline),
            State::Closed => None,
        }
    }

    /// Open a session for `caller` over the attributes `attrs`.
    ///
    /// Returns `Err` when the request as a whole is rejected. A request naming
    /// attributes which cannot be staged yields `Ok` with an `InvalidCommand` overall
    /// status and per-attribute reasons.
    pub fn begin<D>(
        &mut self,
        caller: &CallerIdentity,
        attrs: &[u32],
        timeout_ms: Option<u16>,
        features: Feature,
        delegate: &mut D,
    ) -> Result<AtomicResponse, Error>
    where
        D: ThermostatDelegate + ?Sized,
    {
        self.expire_if_due(delegate);

        if let State::Open(ctx) = &self.state {
            warn!(
                "Atomic write begin from {} while a session of {} is open",
                caller, ctx.owner
            );

            if ctx.owner == *caller {
                Err(ErrorCode::InvalidInState)?;
            } else {
                Err(ErrorCode::Busy)?;
            }
        }

        let Some(timeout_ms) = timeout_ms else {
            return Err(ErrorCode::InvalidCommand.into());
        };

        if attrs.is_empty() || attrs.len() > MAX_ATOMIC_ATTRS {
            Err(ErrorCode::InvalidCommand)?;
        }

        let mut response = AtomicResponse::new(IMStatusCode::Success);
        let mut attributes = Attributes::new();

        for (index, &id) in attrs.iter().enumerate() {
            let status = if attrs[..index].contains(&id) {
                IMStatusCode::InvalidCommand
            } else {
                match AttrCategory::from_id(id) {
                    Some(attr) if features.contains(attr.feature()) => {
                        let _ = attributes.push(attr);
                        IMStatusCode::Success
                    }
                    Some(_) => IMStatusCode::UnsupportedAttribute,
                    None if AttributeId::from_id(id).is_some() => IMStatusCode::UnsupportedWrite,
                    None => IMStatusCode::UnsupportedAttribute,
                }
            };

            if !status.is_success() {
                response.status = IMStatusCode::InvalidCommand;
            }

            response.push(id, status);
        }

        if !response.status.is_success() {
            warn!("Atomic write begin from {} names unsupported attributes", caller);
            return Ok(response);
        }

        let max_timeout = attributes
            .iter()
            .filter_map(|attr| delegate.max_atomic_write_timeout(*attr))
            .fold(Duration::ZERO, |acc, t| acc + t);

        if max_timeout.is_zero() {
            warn!("No attribute of the atomic write reports a timeout");
            response.status = IMStatusCode::Failure;
            return Ok(response);
        }

        let timeout = Duration::from_millis(timeout_ms as u64).min(max_timeout);

        for (index, attr) in attributes.iter().enumerate() {
            if let Err(e) = delegate.on_atomic_write_begin(*attr) {
                warn!("Delegate failed to begin atomic write on {:?}: {:?}", attr, e);

                for attr in &attributes[..=index] {
                    delegate.on_atomic_write_rollback(*attr);
                }

                Err(e)?;
            }
        }

        self.generation = self.generation.wrapping_add(1);
        self.state = State::Open(OpenCtx {
            owner: *caller,
            attributes,
            deadline: (self.epoch)() + timeout,
            generation: self.generation,
        });

        info!(
            "Atomic write opened by {} for {:?}, timeout {}ms",
            caller,
            attrs,
            timeout.as_millis()
        );

        response.timeout = Some(timeout);

        Ok(response)
    }

    /// Validate and commit the pending lists of the open session.
    ///
    /// The session closes whatever the outcome; a failed commit needs a fresh begin.
    /// Every category is validated before any is committed, so a category is only
    /// committed if all of them passed.
    pub fn commit<D>(
        &mut self,
        caller: &CallerIdentity,
        attrs: &[u32],
        delegate: &mut D,
        setpoints: &Setpoints,
        suggestions: &[Suggestion],
    ) -> Result<AtomicResponse, Error>
    where
        D: ThermostatDelegate + ?Sized,
    {
        self.expire_if_due(delegate);

        let attributes = self.check_owner(caller, attrs)?;

        let ctx = CommitContext {
            setpoints,
            staged: &attributes,
            suggestions,
        };

        let mut response = AtomicResponse::new(IMStatusCode::Success);

        for attr in attributes.iter() {
            let result = attr
                .precommit(delegate, &ctx)
                .and_then(|_| delegate.on_atomic_write_precommit(*attr));

            if let Err(e) = &result {
                warn!("Atomic write precommit of {:?} failed: {:?}", attr, e);
                response.status = IMStatusCode::Failure;
            }

            response.push(attr.id(), result.into());
        }

        if response.status.is_success() {
            for (index, attr) in attributes.iter().enumerate() {
                match attr.commit(delegate) {
                    Ok(()) => delegate.on_atomic_write_commit(*attr),
                    Err(e) => {
                        // Breach of the delegate contract; earlier categories stay committed
                        warn!("Delegate failed to commit {:?}: {:?}", attr, e);
                        response.status = IMStatusCode::Failure;
                        response.attribute_status[index].status = e.into();
                    }
                }

                attr.clear_pending(delegate);
            }
        } else {
            for attr in attributes.iter() {
                delegate.on_atomic_write_rollback(*attr);
            }
        }

        info!(
            "Atomic write of {} committed with status {:?}",
            caller, response.status
        );

        self.close();

        Ok(response)
    }

    /// Discard the pending lists of the open session.
    pub fn rollback<D>(
        &mut self,
        caller: &CallerIdentity,
        attrs: &[u32],
        delegate: &mut D,
    ) -> Result<AtomicResponse, Error>
    where
        D: ThermostatDelegate + ?Sized,
    {
        self.expire_if_due(delegate);

        let attributes = self.check_owner(caller, attrs)?;

        let mut response = AtomicResponse::new(IMStatusCode::Success);

        for attr in attributes.iter() {
            delegate.on_atomic_write_rollback(*attr);
            response.push(attr.id(), IMStatusCode::Success);
        }

        info!("Atomic write of {} rolled back", caller);

        self.close();

        Ok(response)
    }

    /// The deadline of the session identified by `token` elapsed.
    ///
    /// Rolls the session back without any ownership check. Does nothing and returns
    /// `false` if that session is no longer open.
    pub fn on_timeout<D>(&mut self, token: SessionToken, delegate: &mut D) -> bool
    where
        D: ThermostatDelegate + ?Sized,
    {
        let State::Open(ctx) = &self.state else {
            return false;
        };

        if ctx.generation != token.generation {
            return false;
        }

        for attr in ctx.attributes.iter() {
            delegate.on_atomic_write_rollback(*attr);
        }

        info!("Atomic write of {} timed out", ctx.owner);

        self.close();

        true
    }

    /// Roll back the open session if its deadline has passed.
    pub fn expire_if_due<D>(&mut self, delegate: &mut D) -> bool
    where
        D: ThermostatDelegate + ?Sized,
    {
        match (self.token(), self.deadline()) {
            (Some(token), Some(deadline)) if (self.epoch)() >= deadline => {
                self.on_timeout(token, delegate)
            }
            _ => false,
        }
    }

    /// Forcefully close the session, e.g. when the endpoint is reset.
    pub fn abort<D>(&mut self, delegate: &mut D)
    where
        D: ThermostatDelegate + ?Sized,
    {
        if let Some(token) = self.token() {
            self.on_timeout(token, delegate);
        }
    }

    /// Whether an unexpired session is open, optionally restricted to one caller and
    /// one attribute.
    pub fn in_atomic_write(
        &self,
        caller: Option<&CallerIdentity>,
        attr: Option<AttrCategory>,
    ) -> bool {
        match &self.state {
            State::Open(ctx) => {
                (self.epoch)() < ctx.deadline
                    && caller.map(|c| *c == ctx.owner).unwrap_or(true)
                    && attr.map(|a| ctx.attributes.contains(&a)).unwrap_or(true)
            }
            State::Closed => false,
        }
    }

    /// The caller holding `attr` open, if any.
    pub fn owner_of(&self, attr: AttrCategory) -> Option<CallerIdentity> {
        match &self.state {
            State::Open(ctx) if self.in_atomic_write(None, Some(attr)) => Some(ctx.owner),
            _ => None,
        }
    }

    fn check_owner(&self, caller: &CallerIdentity, attrs: &[u32]) -> Result<Attributes, Error> {
        let State::Open(ctx) = &self.state else {
            warn!("No atomic write is open for {}", caller);
            return Err(ErrorCode::InvalidInState.into());
        };

        if ctx.owner != *caller {
            warn!("Atomic write is owned by {}, not {}", ctx.owner, caller);
            Err(ErrorCode::InvalidInState)?;
        }

        // The request has to name exactly the set of attributes of the session
        let covered = attrs.iter().all(|id| {
            AttrCategory::from_id(*id)
                .map(|attr| ctx.attributes.contains(&attr))
                .unwrap_or(false)
        });
        let complete = ctx
            .attributes
            .iter()
            .all(|attr| attrs.contains(&attr.id()));

        if !covered || !complete {
            warn!("Atomic write request of {} names a different attribute set", caller);
            Err(ErrorCode::InvalidInState)?;
        }

        Ok(ctx.attributes.clone())
    }

    fn close(&mut self) {
        self.state = State::Closed;
    }
}
