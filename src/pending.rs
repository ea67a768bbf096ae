// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The table of client requests parked while a lookup for their key is in
//! flight (SPEC_FULL.md §3, §4.2).

use std::collections::HashMap;
use std::net::TcpStream;

use crate::packet::Packet;

/// One client request waiting on a lookup reply: its socket (so the eventual
/// reply can be proxied back to it) and the original packet it sent (so that
/// proxy can be replayed once the responsible peer is known).
pub type PendingEntry = (TcpStream, Packet);

/// `hash_id -> [PendingEntry]`, in insertion order. The table owns the
/// sockets and packets it holds; entries are only released by `clear`.
#[derive(Default)]
pub struct PendingTable {
    buckets: HashMap<u16, Vec<PendingEntry>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a client request under `hash_id`.
    pub fn add(&mut self, hash_id: u16, socket: TcpStream, packet: Packet) {
        self.buckets.entry(hash_id).or_default().push((socket, packet));
    }

    /// Peek at the entries parked under `hash_id`, without releasing them.
    pub fn get(&self, hash_id: u16) -> Option<&[PendingEntry]> {
        self.buckets.get(&hash_id).map(Vec::as_slice)
    }

    /// Remove and return every entry parked under `hash_id`, in insertion
    /// order. The bucket no longer exists afterward.
    pub fn clear(&mut self, hash_id: u16) -> Vec<PendingEntry> {
        self.buckets.remove(&hash_id).unwrap_or_default()
    }

    #[cfg(test)]
    fn bucket_len(&self, hash_id: u16) -> usize {
        self.buckets.get(&hash_id).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_socket() -> TcpStream {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let _ = listener.accept().unwrap();
        client
    }

    #[test]
    fn multiple_entries_same_hash_id_preserve_order() {
        let mut table = PendingTable::new();
        table.add(42, dummy_socket(), Packet::Get { key: b"a".to_vec() });
        table.add(42, dummy_socket(), Packet::Get { key: b"b".to_vec() });

        assert_eq!(table.bucket_len(42), 2);
        let drained = table.clear(42);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].1, Packet::Get { key: b"a".to_vec() });
        assert_eq!(drained[1].1, Packet::Get { key: b"b".to_vec() });
        assert_eq!(table.bucket_len(42), 0);
    }

    #[test]
    fn distinct_hash_ids_are_independent() {
        let mut table = PendingTable::new();
        table.add(1, dummy_socket(), Packet::Get { key: b"x".to_vec() });
        table.add(2, dummy_socket(), Packet::Get { key: b"y".to_vec() });

        assert_eq!(table.clear(1).len(), 1);
        assert_eq!(table.bucket_len(2), 1);
    }
}
