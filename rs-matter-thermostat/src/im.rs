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

//! Interaction Model status codes and the shapes of the Atomic Request / Atomic Response
//! commands as seen by the thermostat server.
//!
//! The wire encoding of these structures is owned by the dispatcher; this module only
//! carries their decoded form.

use core::time::Duration;

use crate::error::{Error, ErrorCode};

/// Maximum number of attributes a single Atomic Request may name.
pub const MAX_ATOMIC_ATTRS: usize = 4;

/// An enumeration of all possible status codes that can be returned by the Interaction Model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IMStatusCode {
    Success = 0,
    Failure = 1,
    UnsupportedEndpoint = 0x7F,
    UnsupportedCommand = 0x81,
    InvalidCommand = 0x85,
    UnsupportedAttribute = 0x86,
    ConstraintError = 0x87,
    UnsupportedWrite = 0x88,
    ResourceExhausted = 0x89,
    NotFound = 0x8b,
    Busy = 0x9c,
    InvalidInState = 0xcb,
}

impl IMStatusCode {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<ErrorCode> for IMStatusCode {
    fn from(e: ErrorCode) -> Self {
        match e {
            ErrorCode::EndpointNotFound => IMStatusCode::UnsupportedEndpoint,
            ErrorCode::UnsupportedAttribute => IMStatusCode::UnsupportedAttribute,
            ErrorCode::CommandNotFound => IMStatusCode::UnsupportedCommand,
            ErrorCode::UnsupportedWrite => IMStatusCode::UnsupportedWrite,
            ErrorCode::InvalidCommand => IMStatusCode::InvalidCommand,
            ErrorCode::Busy => IMStatusCode::Busy,
            ErrorCode::ResourceExhausted | ErrorCode::NoSpace => IMStatusCode::ResourceExhausted,
            ErrorCode::ConstraintError => IMStatusCode::ConstraintError,
            ErrorCode::NotFound => IMStatusCode::NotFound,
            ErrorCode::InvalidInState | ErrorCode::EndOfList => IMStatusCode::InvalidInState,
            ErrorCode::Duplicate | ErrorCode::Failure => IMStatusCode::Failure,
        }
    }
}

impl From<Error> for IMStatusCode {
    fn from(value: Error) -> Self {
        Self::from(value.code())
    }
}

impl From<Result<(), Error>> for IMStatusCode {
    fn from(value: Result<(), Error>) -> Self {
        match value {
            Ok(()) => IMStatusCode::Success,
            Err(e) => e.into(),
        }
    }
}

/// The type of an Atomic Request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicRequestType {
    BeginWrite = 0,
    CommitWrite = 1,
    RollbackWrite = 2,
}

/// A decoded Atomic Request command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomicRequest {
    pub request_type: AtomicRequestType,
    pub attribute_requests: heapless::Vec<u32, MAX_ATOMIC_ATTRS>,
    /// Requested timeout, in milliseconds. Only meaningful for `BeginWrite`.
    pub timeout: Option<u16>,
}

impl AtomicRequest {
    pub fn new(
        request_type: AtomicRequestType,
        attrs: &[u32],
        timeout: Option<u16>,
    ) -> Result<Self, Error> {
        Ok(Self {
            request_type,
            attribute_requests: heapless::Vec::from_slice(attrs)
                .map_err(|_| ErrorCode::InvalidCommand)?,
            timeout,
        })
    }

    pub fn begin(attrs: &[u32], timeout_ms: u16) -> Result<Self, Error> {
        Self::new(AtomicRequestType::BeginWrite, attrs, Some(timeout_ms))
    }

    pub fn commit(attrs: &[u32]) -> Result<Self, Error> {
        Self::new(AtomicRequestType::CommitWrite, attrs, None)
    }

    pub fn rollback(attrs: &[u32]) -> Result<Self, Error> {
        Self::new(AtomicRequestType::RollbackWrite, attrs, None)
    }
}

/// Per-attribute status inside an Atomic Response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomicAttributeStatus {
    pub attribute_id: u32,
    pub status: IMStatusCode,
}

/// A decoded Atomic Response command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomicResponse {
    pub status: IMStatusCode,
    pub attribute_status: heapless::Vec<AtomicAttributeStatus, MAX_ATOMIC_ATTRS>,
    pub timeout: Option<Duration>,
}

impl AtomicResponse {
    pub const fn new(status: IMStatusCode) -> Self {
        Self {
            status,
            attribute_status: heapless::Vec::new(),
            timeout: None,
        }
    }

    /// Record the status of one attribute. The request was already bounded by
    /// `MAX_ATOMIC_ATTRS`, so this cannot overflow.
    pub fn push(&mut self, attribute_id: u32, status: IMStatusCode) {
        let _ = self.attribute_status.push(AtomicAttributeStatus {
            attribute_id,
            status,
        });
    }

    pub fn status_of(&self, attribute_id: u32) -> Option<IMStatusCode> {
        self.attribute_status
            .iter()
            .find(|s| s.attribute_id == attribute_id)
            .map(|s| s.status)
    }
}
