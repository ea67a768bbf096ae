// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Remote-peer descriptors and the short-lived connections used to reach them.

use std::net::{Ipv4Addr, TcpStream};

use log::warn;

use crate::packet::{self, Packet, PeerInfo};
use crate::Error;

/// An immutable, value-type handle to a remote peer. Carries no connection of
/// its own; `connect` opens a fresh one for the duration of a single
/// exchange, matching the "transient, lazily-opened" connection of
/// SPEC_FULL.md §3. Multiple handles may name the same remote; none of them
/// own it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerHandle {
    pub node_id: u16,
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerHandle {
    pub fn new(node_id: u16, ip: Ipv4Addr, port: u16) -> Self {
        Self { node_id, ip, port }
    }

    pub fn from_info(info: PeerInfo) -> Self {
        Self { node_id: info.node_id, ip: info.ip, port: info.port }
    }

    pub fn to_info(&self) -> PeerInfo {
        PeerInfo { node_id: self.node_id, ip: self.ip, port: self.port }
    }

    fn connect(&self) -> Result<TcpStream, Error> {
        TcpStream::connect((self.ip, self.port)).map_err(|_| Error::PeerUnreachable {
            host: self.ip.to_string(),
            port: self.port,
        })
    }
}

/// Open a connection to `target`, write `packet`, and close the connection
/// without waiting for a reply. Used for fire-and-forget control traffic
/// (LKUP forwarding, JOIN/STAB/NTFY/FACK sends).
///
/// On failure to connect, logs and returns the error; callers decide what
/// that means for whatever triggered the forward (§7: for LKUP forwarding the
/// pending client is simply left dangling).
pub fn forward(target: &PeerHandle, packet: &Packet) -> Result<(), Error> {
    let mut stream = target.connect().inspect_err(|_| {
        warn!("failed to connect to peer {}:{} to forward a packet", target.ip, target.port);
    })?;
    packet::write_packet(&mut stream, packet)
}

/// Open a connection to `target`, write `packet`, and block for exactly one
/// complete reply, returning its raw bytes unparsed (§4.6: proxying pipes the
/// response through verbatim).
pub fn exchange_raw(target: &PeerHandle, packet: &Packet) -> Result<Vec<u8>, Error> {
    let mut stream = target.connect().inspect_err(|_| {
        warn!(
            "could not connect to peer {}:{} to proxy a request",
            target.ip, target.port
        );
    })?;
    packet::write_packet(&mut stream, packet)?;
    packet::read_raw_packet(&mut stream)
}

/// Like [`exchange_raw`], but decodes the reply. Used where the caller needs
/// to interpret the response (e.g. reading a JOIN's own built-in
/// acknowledgement is not needed, but nothing in this protocol currently
/// calls for it besides tests) — kept alongside `exchange_raw` as the
/// decoding counterpart for callers and tests that want a [`Packet`] rather
/// than bytes.
pub fn exchange(target: &PeerHandle, packet: &Packet) -> Result<Packet, Error> {
    let mut stream = target.connect().inspect_err(|_| {
        warn!("could not connect to peer {}:{} to exchange a packet", target.ip, target.port);
    })?;
    packet::write_packet(&mut stream, packet)?;
    packet::read_packet(&mut stream)
}
