// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! CLI entry point. Argument parsing is hand-rolled rather than built on
//! `clap`: the grammar is arity-polymorphic positional arguments (§6), not
//! the named-flag style `clap::Parser` is meant for (see DESIGN.md).

use std::net::{Ipv4Addr, TcpListener};

use log::{error, info, warn};

use chord_peer::node::Node;
use chord_peer::packet::Packet;
use chord_peer::peer::{self, PeerHandle};
use chord_peer::server;

struct Config {
    ip: Ipv4Addr,
    port: u16,
    id: u16,
    entry: Option<(Ipv4Addr, u16)>,
}

const USAGE: &str = "usage:\n\
    peer <ip> <port>\n\
    peer <ip> <port> <id>\n\
    peer <ip> <port> <entry_ip> <entry_port>\n\
    peer <ip> <port> <id> <entry_ip> <entry_port>";

fn parse_args(args: &[String]) -> Result<Config, String> {
    let ip = |s: &str| s.parse::<Ipv4Addr>().map_err(|e| format!("invalid ip {s:?}: {e}"));
    let port = |s: &str| s.parse::<u16>().map_err(|e| format!("invalid port {s:?}: {e}"));
    let id = |s: &str| s.parse::<u16>().map_err(|e| format!("invalid id {s:?}: {e}"));

    match args {
        [self_ip, self_port] => Ok(Config {
            ip: ip(self_ip)?,
            port: port(self_port)?,
            id: 0,
            entry: None,
        }),
        [self_ip, self_port, self_id] => Ok(Config {
            ip: ip(self_ip)?,
            port: port(self_port)?,
            id: id(self_id)?,
            entry: None,
        }),
        [self_ip, self_port, entry_ip, entry_port] => Ok(Config {
            ip: ip(self_ip)?,
            port: port(self_port)?,
            id: 0,
            entry: Some((ip(entry_ip)?, port(entry_port)?)),
        }),
        [self_ip, self_port, self_id, entry_ip, entry_port] => Ok(Config {
            ip: ip(self_ip)?,
            port: port(self_port)?,
            id: id(self_id)?,
            entry: Some((ip(entry_ip)?, port(entry_port)?)),
        }),
        _ => Err(format!("wrong number of arguments ({})\n{USAGE}", args.len())),
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match parse_args(&args) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let me = PeerHandle::new(config.id, config.ip, config.port);
    let mut node = Node::solitary(me.clone());

    let listener = match TcpListener::bind((config.ip, config.port)) {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind {}:{}: {e}", config.ip, config.port);
            std::process::exit(1);
        }
    };

    if let Some((entry_ip, entry_port)) = config.entry {
        // node_id 0 is a placeholder: we only need the entry peer's address
        // to route this one packet to it, not its identity.
        let entry = PeerHandle::new(0, entry_ip, entry_port);
        let join = Packet::Join { node: me.to_info() };
        if let Err(e) = peer::forward(&entry, &join) {
            warn!("failed to join via entry peer {entry_ip}:{entry_port}: {e}");
        }
    }

    info!("peer {} listening on {}:{}", config.id, config.ip, config.port);
    if let Err(e) = server::run(listener, &mut node) {
        error!("server loop exited with error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn two_args_means_solitary_id_zero() {
        let c = parse_args(&args(&["127.0.0.1", "5000"])).unwrap();
        assert_eq!(c.id, 0);
        assert!(c.entry.is_none());
    }

    #[test]
    fn three_args_means_solitary_explicit_id() {
        let c = parse_args(&args(&["127.0.0.1", "5000", "42"])).unwrap();
        assert_eq!(c.id, 42);
        assert!(c.entry.is_none());
    }

    #[test]
    fn four_args_means_join_with_id_zero() {
        let c = parse_args(&args(&["127.0.0.1", "5000", "127.0.0.1", "5001"])).unwrap();
        assert_eq!(c.id, 0);
        assert_eq!(c.entry, Some((Ipv4Addr::new(127, 0, 0, 1), 5001)));
    }

    #[test]
    fn five_args_means_join_with_explicit_id() {
        let c = parse_args(&args(&["127.0.0.1", "5000", "42", "127.0.0.1", "5001"])).unwrap();
        assert_eq!(c.id, 42);
        assert_eq!(c.entry, Some((Ipv4Addr::new(127, 0, 0, 1), 5001)));
    }

    #[test]
    fn wrong_arity_is_rejected() {
        assert!(parse_args(&args(&["only-one"])).is_err());
        assert!(parse_args(&args(&["a", "b", "c", "d", "e", "f"])).is_err());
    }
}
