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

use core::time::Duration;

/// A monotonic clock, used for atomic write deadlines.
pub type Epoch = fn() -> Duration;

/// The wall clock, in seconds since the Matter epoch (2000-01-01 00:00:00 UTC).
///
/// Returns `None` when the node has not (yet) synchronized its time.
pub type UtcClock = fn() -> Option<u32>;

// Seconds from 1970/01/01 00:00:00 till 2000/01/01 00:00:00 UTC
pub const MATTER_EPOCH_SECS: u64 = 946684800;

pub const SECONDS_PER_DAY: u32 = 24 * 60 * 60;

pub fn dummy_epoch() -> Duration {
    Duration::from_secs(0)
}

#[cfg(feature = "std")]
pub fn sys_epoch() -> Duration {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
}

#[cfg(feature = "std")]
pub fn sys_utc() -> Option<u32> {
    sys_epoch()
        .as_secs()
        .checked_sub(MATTER_EPOCH_SECS)
        .and_then(|secs| u32::try_from(secs).ok())
}
