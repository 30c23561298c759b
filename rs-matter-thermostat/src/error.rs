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

use core::fmt;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ErrorCode {
    Busy,
    CommandNotFound,
    ConstraintError,
    Duplicate,
    // The list accessor ran past the last entry
    EndOfList,
    EndpointNotFound,
    Failure,
    InvalidCommand,
    InvalidInState,
    NoSpace,
    NotFound,
    ResourceExhausted,
    UnsupportedAttribute,
    UnsupportedWrite,
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Error {
    code: ErrorCode,
}

impl Error {
    pub const fn new(code: ErrorCode) -> Self {
        Self { code }
    }

    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn remap<F>(self, matcher: F, to: Self) -> Self
    where
        F: FnOnce(&Self) -> bool,
    {
        if matcher(&self) {
            to
        } else {
            self
        }
    }

    /// Anything a delegate reports while a list is being walked, other than
    /// running past its end, means the list cannot be trusted for validation.
    pub fn map_list_access(self) -> Self {
        self.remap(
            |e| e.code() != ErrorCode::EndOfList,
            Error::new(ErrorCode::InvalidInState),
        )
    }

    pub fn is_end_of_list(&self) -> bool {
        self.code == ErrorCode::EndOfList
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error::{}", self)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.code())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
