// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The single-threaded event loop: poll the listener and every open client
//! session, feed readable bytes into sessions, and dispatch whatever packet
//! falls out (§4.8). There is no per-client thread and no timer thread; a
//! poll timeout doubles as the stabilization tick (§4.9).

use std::net::TcpListener;
use std::os::fd::AsFd;
use std::time::Duration;

use log::{trace, warn};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::dispatch;
use crate::node::Node;
use crate::session::{ClientSession, SessionState};
use crate::{CallbackStatus, Error};

/// How long to wait for activity before treating the tick as idle and
/// sending a self-initiated STAB to the successor.
const POLL_TIMEOUT: Duration = Duration::from_secs(2);

pub fn run(listener: TcpListener, node: &mut Node) -> Result<(), Error> {
    listener.set_nonblocking(true)?;
    let mut sessions: Vec<ClientSession> = Vec::new();

    loop {
        let mut fds: Vec<PollFd> = Vec::with_capacity(sessions.len() + 1);
        fds.push(PollFd::new(listener.as_fd(), PollFlags::POLLIN));
        for session in &sessions {
            fds.push(PollFd::new(session.socket.as_fd(), PollFlags::POLLIN));
        }

        let timeout = PollTimeout::try_from(POLL_TIMEOUT).unwrap_or(PollTimeout::MAX);
        let ready = poll(&mut fds, timeout)?;

        if ready == 0 {
            dispatch::stabilize_tick(node);
            continue;
        }

        if is_readable(&fds[0]) {
            accept_all(&listener, &mut sessions);
        }

        // Reverse order so `swap_remove` never disturbs an index not yet visited.
        for i in (0..sessions.len()).rev() {
            if !is_readable(&fds[i + 1]) {
                continue;
            }

            let mut already_removed = false;

            match sessions[i].read_ready() {
                Ok(Some(packet)) => {
                    let session = sessions.swap_remove(i);
                    already_removed = true;
                    // §4.8: the callback status governs session teardown. A
                    // session that owned its socket has already handed it off
                    // to `handle_packet`; the status tells us where it ended
                    // up, not whether to remove it from this pool again.
                    match dispatch::handle_packet(node, session.socket, packet) {
                        CallbackStatus::CloseClient => {
                            trace!("session closed after a synchronous reply");
                        }
                        CallbackStatus::Keep => {
                            trace!("session parked in the pending-request table");
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("client session {} errored: {e}", sessions[i].address);
                    sessions[i].mark_for_removal();
                }
            }

            if !already_removed && sessions[i].state() == SessionState::Remove {
                sessions.swap_remove(i);
            }
        }
    }
}

fn is_readable(fd: &PollFd) -> bool {
    fd.revents().is_some_and(|r| r.contains(PollFlags::POLLIN))
}

fn accept_all(listener: &TcpListener, sessions: &mut Vec<ClientSession>) {
    loop {
        match listener.accept() {
            Ok((socket, address)) => {
                if let Err(e) = socket.set_nonblocking(true) {
                    warn!("failed to set a client socket non-blocking: {e}");
                    continue;
                }
                sessions.push(ClientSession::new(socket, address));
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) => {
                warn!("accept failed: {e}");
                break;
            }
        }
    }
}
