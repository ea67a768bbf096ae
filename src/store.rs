// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The local key-value store a peer owns its slice of the ring with.
//!
//! SPEC_FULL.md treats the concrete store as an external collaborator: only
//! its operational interface (`get`/`set`/`delete`) is specified. This is the
//! simplest thing that satisfies that interface.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Store {
    map: HashMap<Vec<u8>, Vec<u8>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &[u8]) -> Option<&Vec<u8>> {
        self.map.get(key)
    }

    /// Insert-or-replace.
    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.map.insert(key, value);
    }

    /// Returns true iff the key existed and was removed.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        self.map.remove(key).is_some()
    }
}
