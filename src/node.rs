// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The mutable state of a single ring member: who it is, who its ring
//! neighbors are, and its local store, pending-lookup table, and finger
//! table. SPEC_FULL.md §9 notes the source keeps this kind of state in a set
//! of globals; here it is one value threaded through the dispatcher and
//! server loop by `&mut` reference instead.

use crate::finger::FingerTable;
use crate::peer::PeerHandle;
use crate::pending::PendingTable;
use crate::store::Store;

pub struct Node {
    pub me: PeerHandle,
    pub predecessor: Option<PeerHandle>,
    pub successor: Option<PeerHandle>,
    pub fingers: FingerTable,
    pub pending: PendingTable,
    pub store: Store,
}

impl Node {
    /// A freshly started peer that has not yet joined any ring beyond
    /// itself: no predecessor, no successor, an inactive finger table.
    pub fn solitary(me: PeerHandle) -> Self {
        Self {
            me,
            predecessor: None,
            successor: None,
            fingers: FingerTable::inactive(),
            pending: PendingTable::new(),
            store: Store::new(),
        }
    }

    pub fn id(&self) -> u16 {
        self.me.node_id
    }

    /// True iff `x` falls in this peer's owned arc given its current
    /// predecessor. Per §4.4: with no predecessor and a successor, this is
    /// false (the peer hasn't learned its arc yet); with neither
    /// predecessor nor successor the peer is alone and owns everything.
    pub fn is_responsible_for(&self, x: u16) -> bool {
        match (&self.predecessor, &self.successor) {
            (None, None) => true,
            (None, Some(_)) => false,
            (Some(pred), _) => crate::ring::responsible(pred.node_id, self.id(), x),
        }
    }

    /// Adopt `candidate` as predecessor if there is none yet, or if it is a
    /// tighter fit than the current one. Returns whether it was adopted.
    /// Shared by JOIN and STAB, which apply the identical rule (§4.7).
    pub fn maybe_adopt_predecessor(&mut self, candidate: &PeerHandle) -> bool {
        let adopt = match &self.predecessor {
            None => true,
            Some(pred) => crate::ring::responsible(pred.node_id, self.id(), candidate.node_id),
        };
        if adopt {
            self.predecessor = Some(candidate.clone());
        }
        adopt
    }

    /// Adopt `candidate` as successor if there is none yet, or if it is a
    /// tighter fit than the current one. Returns whether it was adopted.
    /// This is NTFY's rule (§4.7); STAB's successor update is simpler
    /// (adopt only if unset) and is handled inline by its caller.
    pub fn maybe_adopt_successor(&mut self, candidate: &PeerHandle) -> bool {
        let adopt = match &self.successor {
            None => true,
            Some(succ) => crate::ring::responsible(self.id(), succ.node_id, candidate.node_id),
        };
        if adopt {
            self.successor = Some(candidate.clone());
        }
        adopt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn handle(id: u16) -> PeerHandle {
        PeerHandle::new(id, Ipv4Addr::new(127, 0, 0, 1), 6000)
    }

    #[test]
    fn solitary_node_owns_the_whole_ring() {
        let node = Node::solitary(handle(42));
        assert!(node.is_responsible_for(0));
        assert!(node.is_responsible_for(65535));
        assert!(node.is_responsible_for(42));
    }

    #[test]
    fn predecessor_narrows_the_owned_arc() {
        let mut node = Node::solitary(handle(100));
        node.predecessor = Some(handle(50));
        assert!(node.is_responsible_for(75));
        assert!(!node.is_responsible_for(25));
    }
}
