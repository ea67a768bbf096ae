// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Core of a Chord DHT peer: ring membership, request routing, and the
//! packet-handling state machine that ties them together.

pub mod dispatch;
pub mod finger;
pub mod node;
pub mod packet;
pub mod peer;
pub mod pending;
pub mod ring;
pub mod server;
pub mod session;
pub mod store;

use std::fmt;

/// Size of the identifier space: 2^16 positions on the ring.
pub const ID_BITS: u32 = 16;

/// Number of finger-table slots.
pub const FINGER_COUNT: usize = ID_BITS as usize;

/// The errors that can arise while framing, routing, or forwarding a packet.
#[derive(Debug)]
pub enum Error {
    /// Errors returned by I/O failures on a socket.
    Io(std::io::Error),

    /// Framing or field-length sanity failed while decoding a packet.
    Protocol(ProtocolError),

    /// An outbound connect or send to a peer failed. Distinct from a generic
    /// `Io` failure because §7 gives it its own recovery policy: abandon the
    /// operation rather than propagate.
    PeerUnreachable { host: String, port: u16 },
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::PeerUnreachable { host, port } => {
                write!(f, "peer unreachable: {host}:{port}")
            }
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

impl From<nix::errno::Errno> for Error {
    fn from(e: nix::errno::Errno) -> Self {
        Self::Io(std::io::Error::from_raw_os_error(e as i32))
    }
}

/// Malformed-packet sub-kinds, surfaced separately from generic I/O errors so
/// callers can decide whether to close a session quietly or log loudly.
#[derive(Debug)]
pub enum ProtocolError {
    /// Not enough bytes to even read the fixed header.
    ShortHeader,

    /// A length-prefixed field claims a length beyond what follows it.
    TruncatedField,

    /// The flag byte does not encode a recognized combination.
    UnknownFlags(u8),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortHeader => write!(f, "packet shorter than the fixed header"),
            Self::TruncatedField => write!(f, "length-prefixed field runs past the buffer"),
            Self::UnknownFlags(b) => write!(f, "unrecognized flag byte: {b:#04x}"),
        }
    }
}

/// Result returned by dispatch callbacks to tell the server loop what to do
/// with the client session that delivered the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    /// The session answered synchronously (or failed); close it.
    CloseClient,
    /// The session is now parked in the pending-request table; keep it open.
    Keep,
}
