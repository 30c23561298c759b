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

//! The staging store: the not-yet-committed working copy of a list attribute.

use crate::error::{Error, ErrorCode};

use super::types::{Preset, Schedule, MAX_TRANSITION_TIME};

/// Structural checks an entry has to pass before it is even staged.
///
/// These only look at the entry itself. Everything that needs the committed list,
/// the catalogs or the rest of the staged list happens at commit time.
pub trait StagedEntry {
    fn check_structure(&self) -> Result<(), Error>;
}

impl StagedEntry for Preset {
    fn check_structure(&self) -> Result<(), Error> {
        // A built-in preset always carries its handle
        if self.is_built_in() && self.handle.is_none() {
            Err(ErrorCode::ConstraintError)?;
        }

        Ok(())
    }
}

impl StagedEntry for Schedule {
    fn check_structure(&self) -> Result<(), Error> {
        if self.is_built_in() && self.handle.is_none() {
            Err(ErrorCode::ConstraintError)?;
        }

        if self
            .transitions
            .iter()
            .any(|t| t.transition_time > MAX_TRANSITION_TIME)
        {
            Err(ErrorCode::ConstraintError)?;
        }

        Ok(())
    }
}

/// An ordered, append-only buffer of pending entries with a fixed capacity `N`.
///
/// The store can be walked any number of times, by index or by iterator.
#[derive(Debug, Clone)]
pub struct StagingStore<T, const N: usize> {
    entries: heapless::Vec<T, N>,
}

impl<T, const N: usize> Default for StagingStore<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> StagingStore<T, N> {
    #[inline(always)]
    pub const fn new() -> Self {
        Self {
            entries: heapless::Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.entries
    }

    /// Move the staged entries out, leaving the store empty.
    pub fn take(&mut self) -> heapless::Vec<T, N> {
        core::mem::take(&mut self.entries)
    }
}

impl<T: StagedEntry, const N: usize> StagingStore<T, N> {
    /// Stage one more entry, after checking its structure.
    pub fn append(&mut self, entry: T) -> Result<(), Error> {
        entry.check_structure()?;

        self.entries
            .push(entry)
            .map_err(|_| ErrorCode::ResourceExhausted.into())
    }
}
