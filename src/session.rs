// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Per-connection buffering: accumulate bytes off a non-blocking socket
//! until exactly one packet is framed (§3 "Client session", §4.8).

use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpStream};

use log::trace;

use crate::packet::{Header, Packet, HEADER_LEN};
use crate::{Error, ProtocolError};

/// A claimed body length beyond this is treated as malformed rather than
/// buffered indefinitely; no legitimate GET/SET/DEL/control packet in this
/// protocol approaches it.
const MAX_BODY_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No header bytes buffered yet (or none complete).
    Idle,
    /// The header is parsed; accumulating the body.
    HeaderReceived,
    /// The peer closed the connection, or sent something malformed; the
    /// server loop should drop this session.
    Remove,
}

pub struct ClientSession {
    pub socket: TcpStream,
    pub address: SocketAddr,
    state: SessionState,
    header_buffer: Vec<u8>,
    payload_buffer: Vec<u8>,
    partial_packet: Option<Header>,
}

impl ClientSession {
    pub fn new(socket: TcpStream, address: SocketAddr) -> Self {
        Self {
            socket,
            address,
            state: SessionState::Idle,
            header_buffer: Vec::with_capacity(HEADER_LEN),
            payload_buffer: Vec::new(),
            partial_packet: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mark_for_removal(&mut self) {
        self.state = SessionState::Remove;
    }

    /// Perform one non-blocking read and feed whatever arrived into the
    /// framing buffers. Returns the packet once a complete one has been
    /// framed; `Ok(None)` means "need more bytes, try again later".
    pub fn read_ready(&mut self) -> Result<Option<Packet>, Error> {
        let mut buf = [0u8; 4096];
        let n = match self.socket.read(&mut buf) {
            Ok(0) => {
                self.state = SessionState::Remove;
                return Ok(None);
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        self.feed(&buf[..n])
    }

    fn feed(&mut self, mut bytes: &[u8]) -> Result<Option<Packet>, Error> {
        loop {
            match self.state {
                SessionState::Idle => {
                    let need = HEADER_LEN - self.header_buffer.len();
                    let take = need.min(bytes.len());
                    self.header_buffer.extend_from_slice(&bytes[..take]);
                    bytes = &bytes[take..];

                    if self.header_buffer.len() < HEADER_LEN {
                        return Ok(None);
                    }

                    let mut header_bytes = [0u8; HEADER_LEN];
                    header_bytes.copy_from_slice(&self.header_buffer);
                    let header = Header::parse(&header_bytes);
                    if header.body_len() > MAX_BODY_LEN {
                        self.state = SessionState::Remove;
                        return Err(Error::Protocol(ProtocolError::TruncatedField));
                    }
                    trace!("got header from {}: flags={:#04x} body_len={}", self.address, header.flags, header.body_len());
                    self.payload_buffer.reserve(header.body_len());
                    self.partial_packet = Some(header);
                    self.state = SessionState::HeaderReceived;
                }
                SessionState::HeaderReceived => {
                    let header = self
                        .partial_packet
                        .as_ref()
                        .expect("HeaderReceived implies a parsed header");
                    let need = header.body_len() - self.payload_buffer.len();
                    let take = need.min(bytes.len());
                    self.payload_buffer.extend_from_slice(&bytes[..take]);
                    bytes = &bytes[take..];

                    if self.payload_buffer.len() < header.body_len() {
                        return Ok(None);
                    }

                    let mut full = Vec::with_capacity(HEADER_LEN + self.payload_buffer.len());
                    full.extend_from_slice(&self.header_buffer);
                    full.extend_from_slice(&self.payload_buffer);
                    let packet = Packet::decode(&full)?;
                    trace!("framed a complete packet from {} ({} bytes)", self.address, full.len());

                    self.header_buffer.clear();
                    self.payload_buffer.clear();
                    self.partial_packet = None;
                    self.state = SessionState::Idle;
                    return Ok(Some(packet));
                }
                SessionState::Remove => return Ok(None),
            }
        }
    }
}
