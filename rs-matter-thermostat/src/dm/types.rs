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

use core::num::Wrapping;

/// The data version of a cluster instance, bumped on every change of its
/// committed attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dataver(Wrapping<u32>);

impl Dataver {
    pub const fn new(initial: u32) -> Self {
        Self(Wrapping(initial))
    }

    pub fn get(&self) -> u32 {
        self.0 .0
    }

    pub fn changed(&mut self) -> u32 {
        self.0 += Wrapping(1);

        self.get()
    }
}

impl Default for Dataver {
    fn default() -> Self {
        Self::new(0)
    }
}
