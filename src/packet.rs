// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The wire packet and its in-memory representation.
//!
//! The source this protocol is modeled on uses one flat record with a flag
//! byte and several optional fields whose validity depends on those flags.
//! Here that's restated as a sum type with one variant per message kind, each
//! carrying only the fields that are meaningful for it (SPEC_FULL.md §9,
//! "Packet as tagged union"). [`Header`] is the thin, always-present framing
//! prefix used to figure out how many more bytes a partial read still needs;
//! [`Packet`] is the fully decoded message.
//!
//! Note that, like the source protocol, the wire format alone cannot always
//! tell a request from a reply (a GET request and a GET-miss reply are both
//! just `flags=GET` with a key and no value). Direction is a property of
//! *who is reading*, not of the bytes; the dispatcher and tests build the
//! right variant for the role they're playing.

use std::io::{Read, Write};
use std::net::Ipv4Addr;

use log::trace;

use crate::{Error, ProtocolError};

/// Bits of the packet's single flag byte.
pub mod flags {
    /// Set on every control (peer-to-peer) packet; clear on client data packets.
    pub const CTRL: u8 = 0x80;
    /// Meaningful only on data packets: the request succeeded / the key existed.
    pub const ACK: u8 = 0x40;

    // Data sub-flags (CTRL clear).
    pub const GET: u8 = 0x01;
    pub const SET: u8 = 0x02;
    pub const DEL: u8 = 0x04;

    // Control sub-flags (CTRL set). Distinct namespace from the data
    // sub-flags above since the two are never read without first checking
    // CTRL.
    pub const LKUP: u8 = 0x01;
    pub const RPLY: u8 = 0x02;
    pub const JOIN: u8 = 0x04;
    pub const NTFY: u8 = 0x08;
    pub const STAB: u8 = 0x10;
    pub const FNGR: u8 = 0x20;
    pub const FACK: u8 = 0x40;
}

/// Size of the fixed framing prefix, in bytes: flags(1) + key_len(2) +
/// value_len(4) + node_id(2) + node_ip(4) + node_port(2) + hash_id(2).
pub const HEADER_LEN: usize = 1 + 2 + 4 + 2 + 4 + 2 + 2;

/// A peer's wire-level identity, as carried in a packet's `node_*` fields.
/// Distinct from [`crate::peer::PeerHandle`], which additionally knows how to
/// open a connection; this is just the bytes that were on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerInfo {
    pub node_id: u16,
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerInfo {
    pub const ZERO: PeerInfo = PeerInfo {
        node_id: 0,
        ip: Ipv4Addr::UNSPECIFIED,
        port: 0,
    };

    pub fn socket_addr(&self) -> std::net::SocketAddrV4 {
        std::net::SocketAddrV4::new(self.ip, self.port)
    }
}

/// The fixed-size framing prefix of a packet, parsed before the variable-length
/// key/value are known to be fully available.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub flags: u8,
    pub key_len: u16,
    pub value_len: u32,
    pub node_id: u16,
    pub node_ip: Ipv4Addr,
    pub node_port: u16,
    pub hash_id: u16,
}

impl Header {
    /// How many more bytes (key + value) follow this header for a complete packet.
    pub fn body_len(&self) -> usize {
        self.key_len as usize + self.value_len as usize
    }

    pub fn parse(buf: &[u8; HEADER_LEN]) -> Self {
        let flags = buf[0];
        let key_len = u16::from_be_bytes([buf[1], buf[2]]);
        let value_len = u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]);
        let node_id = u16::from_be_bytes([buf[7], buf[8]]);
        let node_ip = Ipv4Addr::new(buf[9], buf[10], buf[11], buf[12]);
        let node_port = u16::from_be_bytes([buf[13], buf[14]]);
        let hash_id = u16::from_be_bytes([buf[15], buf[16]]);

        Self {
            flags,
            key_len,
            value_len,
            node_id,
            node_ip,
            node_port,
            hash_id,
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.push(self.flags);
        out.extend_from_slice(&self.key_len.to_be_bytes());
        out.extend_from_slice(&self.value_len.to_be_bytes());
        out.extend_from_slice(&self.node_id.to_be_bytes());
        out.extend_from_slice(&self.node_ip.octets());
        out.extend_from_slice(&self.node_port.to_be_bytes());
        out.extend_from_slice(&self.hash_id.to_be_bytes());
    }
}

/// A fully decoded packet. One variant per message kind; see SPEC_FULL.md §3
/// and §6 for the field semantics of each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Get { key: Vec<u8> },
    Set { key: Vec<u8>, value: Vec<u8> },
    Del { key: Vec<u8> },
    GetAck { key: Vec<u8>, value: Vec<u8> },
    SetAck,
    DelAck,
    /// Catch-all for a data flag combination outside GET/SET/DEL (§4.5):
    /// accepted as a request and, when replying, echoed with `ACK` set and a
    /// sentinel key/value.
    Other { flags: u8, key: Vec<u8>, value: Vec<u8> },

    Lookup { hash_id: u16, origin: PeerInfo },
    Reply { hash_id: u16, peer: PeerInfo },
    Join { node: PeerInfo },
    Notify { node: PeerInfo },
    Stabilize { node: PeerInfo },
    Finger { node: PeerInfo },
    FingerAck,
}

const SENTINEL_KEY: &[u8] = b"Rick Astley";
const SENTINEL_VALUE: &[u8] = b"Never Gonna Give You Up!\n";

impl Packet {
    /// Build the sentinel reply to an unrecognized data flag (§4.5).
    pub fn other_ack(request_flags: u8) -> Self {
        Packet::Other {
            flags: (request_flags & !flags::ACK) | flags::ACK,
            key: SENTINEL_KEY.to_vec(),
            value: SENTINEL_VALUE.to_vec(),
        }
    }

    /// Encode this packet to its wire representation.
    pub fn encode(&self) -> Vec<u8> {
        let (flags, key, value, node, hash_id): (u8, &[u8], &[u8], PeerInfo, u16) = match self {
            Packet::Get { key } => (flags::GET, key, &[] as &[u8], PeerInfo::ZERO, 0),
            Packet::Set { key, value } => (flags::SET, key, value, PeerInfo::ZERO, 0),
            Packet::Del { key } => (flags::DEL, key, &[], PeerInfo::ZERO, 0),
            Packet::GetAck { key, value } => (flags::GET | flags::ACK, key, value, PeerInfo::ZERO, 0),
            Packet::SetAck => (flags::SET | flags::ACK, &[], &[], PeerInfo::ZERO, 0),
            Packet::DelAck => (flags::DEL | flags::ACK, &[], &[], PeerInfo::ZERO, 0),
            Packet::Other { flags, key, value } => (*flags, key, value, PeerInfo::ZERO, 0),

            Packet::Lookup { hash_id, origin } => (flags::CTRL | flags::LKUP, &[], &[], *origin, *hash_id),
            Packet::Reply { hash_id, peer } => (flags::CTRL | flags::RPLY, &[], &[], *peer, *hash_id),
            Packet::Join { node } => (flags::CTRL | flags::JOIN, &[], &[], *node, 0),
            Packet::Notify { node } => (flags::CTRL | flags::NTFY, &[], &[], *node, 0),
            Packet::Stabilize { node } => (flags::CTRL | flags::STAB, &[], &[], *node, 0),
            Packet::Finger { node } => (flags::CTRL | flags::FNGR, &[], &[], *node, 0),
            Packet::FingerAck => (flags::CTRL | flags::FACK, &[], &[], PeerInfo::ZERO, 0),
        };

        let header = Header {
            flags,
            key_len: key.len() as u16,
            value_len: value.len() as u32,
            node_id: node.node_id,
            node_ip: node.ip,
            node_port: node.port,
            hash_id,
        };

        let mut out = Vec::with_capacity(HEADER_LEN + key.len() + value.len());
        header.write(&mut out);
        out.extend_from_slice(key);
        out.extend_from_slice(value);
        out
    }

    /// Decode a complete packet (header and body both present) from `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < HEADER_LEN {
            return Err(ProtocolError::ShortHeader);
        }

        let mut header_bytes = [0u8; HEADER_LEN];
        header_bytes.copy_from_slice(&buf[..HEADER_LEN]);
        let header = Header::parse(&header_bytes);

        let body = &buf[HEADER_LEN..];
        if body.len() < header.body_len() {
            return Err(ProtocolError::TruncatedField);
        }

        let key = body[..header.key_len as usize].to_vec();
        let value = body[header.key_len as usize..header.body_len()].to_vec();

        let node = PeerInfo {
            node_id: header.node_id,
            ip: header.node_ip,
            port: header.node_port,
        };

        if header.flags & flags::CTRL != 0 {
            let sub = header.flags & !flags::CTRL;
            return Ok(match sub {
                flags::LKUP => Packet::Lookup { hash_id: header.hash_id, origin: node },
                flags::RPLY => Packet::Reply { hash_id: header.hash_id, peer: node },
                flags::JOIN => Packet::Join { node },
                flags::NTFY => Packet::Notify { node },
                flags::STAB => Packet::Stabilize { node },
                flags::FNGR => Packet::Finger { node },
                flags::FACK => Packet::FingerAck,
                _ => return Err(ProtocolError::UnknownFlags(header.flags)),
            });
        }

        let sub = header.flags & !flags::ACK;
        let ack = header.flags & flags::ACK != 0;
        Ok(match (sub, ack) {
            (flags::GET, true) => Packet::GetAck { key, value },
            (flags::GET, false) => Packet::Get { key },
            (flags::SET, true) => Packet::SetAck,
            (flags::SET, false) => Packet::Set { key, value },
            (flags::DEL, true) => Packet::DelAck,
            (flags::DEL, false) => Packet::Del { key },
            _ => Packet::Other { flags: header.flags, key, value },
        })
    }
}

/// Read exactly one complete packet from a blocking stream: the fixed header,
/// then however many key/value bytes it announces. Used by the synchronous
/// forward/proxy paths and by tests, mirroring the teacher crate's
/// record-mark-then-`read_exact` idiom.
pub fn read_packet<R: Read>(stream: &mut R) -> Result<Packet, Error> {
    let mut header_bytes = [0u8; HEADER_LEN];
    stream.read_exact(&mut header_bytes)?;
    let header = Header::parse(&header_bytes);
    trace!("got header: flags={:#04x} body_len={}", header.flags, header.body_len());

    let mut body = vec![0u8; header.body_len()];
    stream.read_exact(&mut body)?;

    let mut full = Vec::with_capacity(HEADER_LEN + body.len());
    full.extend_from_slice(&header_bytes);
    full.extend_from_slice(&body);

    Ok(Packet::decode(&full)?)
}

/// Write a complete packet to a blocking stream.
pub fn write_packet<W: Write>(stream: &mut W, packet: &Packet) -> Result<(), Error> {
    stream.write_all(&packet.encode())?;
    Ok(())
}

/// Read one complete packet's raw bytes (header + body) without decoding it.
/// Used by the synchronous proxy path, which relays a reply to a client
/// verbatim rather than re-encoding a reconstructed packet (§4.6).
pub fn read_raw_packet<R: Read>(stream: &mut R) -> Result<Vec<u8>, Error> {
    let mut header_bytes = [0u8; HEADER_LEN];
    stream.read_exact(&mut header_bytes)?;
    let header = Header::parse(&header_bytes);
    trace!("got raw header: flags={:#04x} body_len={}", header.flags, header.body_len());

    let mut body = vec![0u8; header.body_len()];
    stream.read_exact(&mut body)?;

    let mut full = Vec::with_capacity(HEADER_LEN + body.len());
    full.extend_from_slice(&header_bytes);
    full.extend_from_slice(&body);
    Ok(full)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_request_round_trips() {
        let p = Packet::Get { key: b"hello".to_vec() };
        let bytes = p.encode();
        assert_eq!(Packet::decode(&bytes).unwrap(), p);
    }

    #[test]
    fn get_ack_carries_value() {
        let p = Packet::GetAck { key: b"k".to_vec(), value: b"v".to_vec() };
        let bytes = p.encode();
        assert_eq!(bytes[0], flags::GET | flags::ACK);
        assert_eq!(Packet::decode(&bytes).unwrap(), p);
    }

    #[test]
    fn set_ack_has_no_payload() {
        let bytes = Packet::SetAck.encode();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(Packet::decode(&bytes).unwrap(), Packet::SetAck);
    }

    #[test]
    fn lookup_carries_origin_and_hash() {
        let origin = PeerInfo { node_id: 7, ip: Ipv4Addr::new(10, 0, 0, 1), port: 9000 };
        let p = Packet::Lookup { hash_id: 1234, origin };
        let bytes = p.encode();
        assert_eq!(bytes[0], flags::CTRL | flags::LKUP);
        assert_eq!(Packet::decode(&bytes).unwrap(), p);
    }

    #[test]
    fn other_ack_echoes_sentinel() {
        let reply = Packet::other_ack(0x08);
        let Packet::Other { flags, key, value } = &reply else {
            panic!("expected Other");
        };
        assert_eq!(*flags, 0x08 | flags::ACK);
        assert_eq!(key, SENTINEL_KEY);
        assert_eq!(value, SENTINEL_VALUE);
    }

    #[test]
    fn short_buffer_is_a_protocol_error() {
        assert!(matches!(Packet::decode(&[0u8; 3]), Err(ProtocolError::ShortHeader)));
    }

    #[test]
    fn truncated_key_is_a_protocol_error() {
        let mut bytes = Packet::Get { key: b"hello".to_vec() }.encode();
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(Packet::decode(&bytes), Err(ProtocolError::TruncatedField)));
    }
}
