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

//! Identity of the remote peer issuing a request.

use core::fmt;
use core::num::NonZeroU8;

/// The identity of an authenticated remote writer, as resolved by the dispatcher
/// from the secure session the request arrived on.
///
/// Two requests come from the same caller if and only if both the fabric and the
/// subject match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallerIdentity {
    pub fab_idx: NonZeroU8,
    pub subject: u64,
}

impl CallerIdentity {
    pub const fn new(fab_idx: NonZeroU8, subject: u64) -> Self {
        Self { fab_idx, subject }
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:016X}", self.fab_idx, self.subject)
    }
}
