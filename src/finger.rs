// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The finger table: 16 shortcut entries used to speed up lookups once built
//! (SPEC_FULL.md §3, §4.3).

use crate::peer::PeerHandle;
use crate::ring;
use crate::FINGER_COUNT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerState {
    /// Never built.
    Inactive,
    /// Build in progress; some slots still unfilled.
    Init,
    /// All `FINGER_COUNT` slots are filled.
    Active,
}

/// A peer's finger table. Rebuilding discards the previous table outright
/// (`begin_build` simply replaces it) rather than freeing it piecemeal,
/// sidestepping the ownership ambiguity noted in SPEC_FULL.md §9: slots own
/// their `PeerHandle`s by value, so the old table's handles are dropped, not
/// leaked or re-pointed.
pub struct FingerTable {
    state: FingerState,
    /// `starts[i] == ring::finger_start(self_id, i)`, precomputed at build
    /// time so that matching an incoming RPLY against a slot looks the value
    /// up rather than recomputing `2^i` (and risks rederiving it
    /// inconsistently) each time.
    starts: [u16; FINGER_COUNT],
    slots: [Option<PeerHandle>; FINGER_COUNT],
    filled: usize,
}

impl FingerTable {
    /// A table that has never been built.
    pub fn inactive() -> Self {
        Self {
            state: FingerState::Inactive,
            starts: [0; FINGER_COUNT],
            slots: std::array::from_fn(|_| None),
            filled: 0,
        }
    }

    /// Start a fresh build for `self_id`. Replaces whatever table existed
    /// before.
    pub fn begin_build(self_id: u16) -> Self {
        let mut starts = [0u16; FINGER_COUNT];
        for (i, start) in starts.iter_mut().enumerate() {
            *start = ring::finger_start(self_id, i);
        }

        Self {
            state: FingerState::Init,
            starts,
            slots: std::array::from_fn(|_| None),
            filled: 0,
        }
    }

    pub fn state(&self) -> FingerState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == FingerState::Active
    }

    /// The starts this table was built for; `None` while `Inactive`.
    pub fn starts(&self) -> Option<&[u16; FINGER_COUNT]> {
        (self.state != FingerState::Inactive).then_some(&self.starts)
    }

    pub fn slot(&self, i: usize) -> Option<&PeerHandle> {
        self.slots[i].as_ref()
    }

    /// Place `peer` into the first empty slot whose start equals `hash_id`.
    /// Returns `true` if a slot was filled, transitioning to `Active` once
    /// all 16 are (§4.3 steps 4-5). A no-op (and `false`) outside `Init`.
    pub fn place(&mut self, hash_id: u16, peer: PeerHandle) -> bool {
        if self.state != FingerState::Init {
            return false;
        }

        let Some(i) = (0..FINGER_COUNT).find(|&i| self.starts[i] == hash_id && self.slots[i].is_none())
        else {
            return false;
        };

        self.slots[i] = Some(peer);
        self.filled += 1;

        if self.filled == FINGER_COUNT {
            self.state = FingerState::Active;
        }

        true
    }

    /// The finger with the largest index whose start lies strictly between
    /// `self_id` and `target` going clockwise, i.e. the closest known
    /// predecessor of `target` reachable via a single finger hop. Ring
    /// distance is used rather than raw `u16` comparison to avoid the
    /// wraparound bug noted in SPEC_FULL.md §9. Returns `None` if the table
    /// is not `Active` or no finger qualifies (target coincides with
    /// `self_id`); callers fall back to successor forwarding in that case.
    pub fn closest_preceding(&self, self_id: u16, target: u16) -> Option<&PeerHandle> {
        if !self.is_active() {
            return None;
        }

        let target_dist = ring::forward_distance(self_id, target) as u32;
        let best = (0..FINGER_COUNT)
            .filter(|&i| (1u32 << i) < target_dist)
            .next_back()?;

        self.slots[best].as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn handle(id: u16) -> PeerHandle {
        PeerHandle::new(id, Ipv4Addr::new(127, 0, 0, 1), 5000 + id)
    }

    #[test]
    fn inactive_table_has_no_starts_and_no_slots() {
        let t = FingerTable::inactive();
        assert_eq!(t.state(), FingerState::Inactive);
        assert!(t.starts().is_none());
        assert!(t.slot(0).is_none());
    }

    #[test]
    fn building_fills_slots_in_order_and_activates() {
        let mut t = FingerTable::begin_build(100);
        assert_eq!(t.state(), FingerState::Init);

        let starts = *t.starts().unwrap();
        for (i, &start) in starts.iter().enumerate() {
            assert!(t.place(start, handle(i as u16)));
        }

        assert_eq!(t.state(), FingerState::Active);
        for i in 0..FINGER_COUNT {
            assert!(t.slot(i).is_some());
        }
    }

    #[test]
    fn place_ignores_unmatched_hash_id() {
        let mut t = FingerTable::begin_build(100);
        assert!(!t.place(0xBEEF, handle(1)));
    }

    #[test]
    fn rebuild_discards_previous_slots() {
        let mut t = FingerTable::begin_build(100);
        let starts = *t.starts().unwrap();
        t.place(starts[0], handle(9));
        assert!(t.slot(0).is_some());

        let t = FingerTable::begin_build(100);
        assert!(t.slot(0).is_none());
        assert_eq!(t.state(), FingerState::Init);
    }

    #[test]
    fn closest_preceding_picks_largest_qualifying_finger() {
        let mut t = FingerTable::begin_build(0);
        let starts = *t.starts().unwrap();
        for (i, &start) in starts.iter().enumerate() {
            t.place(start, handle(i as u16));
        }

        // starts are 1, 2, 4, ..., 32768 for self_id 0. Target 50 should
        // pick the finger at start 32 (index 5), the largest power of two
        // below 50.
        let picked = t.closest_preceding(0, 50).unwrap();
        assert_eq!(picked.node_id, 5);
    }

    #[test]
    fn closest_preceding_is_none_when_not_active() {
        let t = FingerTable::begin_build(100);
        assert!(t.closest_preceding(100, 200).is_none());
    }
}
