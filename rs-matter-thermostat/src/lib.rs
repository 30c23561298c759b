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

//! The server side of the Matter Thermostat cluster's atomic writes.
//!
//! Presets and schedules are edited in a staging area that is owned by one caller for
//! the duration of an atomic write, validated as a whole on commit, and either copied
//! into the committed lists or discarded. Next to that, the crate keeps the heating and
//! cooling setpoints consistent with their limits and the deadband, and maintains the
//! list of time-bounded thermostat suggestions.
//!
//! Encoding and decoding of the Interaction Model messages is left to the caller.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod acl;
pub mod dm;
pub mod error;
pub mod im;
pub mod server;
pub mod utils;
