// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Black-box scenarios driven over real sockets against a running server
//! loop, the way the teacher crate's `rpcbind.rs` integration test drives a
//! real listener with `wait_for_server` + `thread::spawn` rather than
//! calling handlers directly.

use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use chord_peer::node::Node;
use chord_peer::packet::{self, Packet, PeerInfo};
use chord_peer::peer::PeerHandle;
use chord_peer::server;

fn v4_parts(addr: SocketAddr) -> (Ipv4Addr, u16) {
    match addr {
        SocketAddr::V4(v4) => (*v4.ip(), v4.port()),
        SocketAddr::V6(_) => unreachable!("tests only bind loopback v4"),
    }
}

fn wait_for_server(addr: SocketAddr) {
    for _ in 0..200 {
        if TcpStream::connect(addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("server at {addr} never became ready");
}

/// Start a peer with the given id on an ephemeral loopback port, running
/// its server loop on a detached background thread. Returns its info.
fn start_peer(id: u16) -> PeerInfo {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (ip, port) = v4_parts(addr);

    let me = PeerHandle::new(id, ip, port);
    let mut node = Node::solitary(me);

    std::thread::spawn(move || {
        server::run(listener, &mut node).expect("server loop");
    });

    wait_for_server(addr);
    PeerInfo { node_id: id, ip, port }
}

fn send(target: &PeerInfo, packet: &Packet) -> Packet {
    let mut stream = TcpStream::connect(target.socket_addr()).unwrap();
    packet::write_packet(&mut stream, packet).unwrap();
    packet::read_packet(&mut stream).unwrap()
}

fn fire_and_forget(target: &PeerInfo, packet: &Packet) {
    let mut stream = TcpStream::connect(target.socket_addr()).unwrap();
    packet::write_packet(&mut stream, packet).unwrap();
}

#[test]
fn solitary_peer_set_then_get() {
    let a = start_peer(100);

    let set_reply = send(&a, &Packet::Set { key: b"x".to_vec(), value: b"1".to_vec() });
    assert_eq!(set_reply, Packet::SetAck);

    let get_reply = send(&a, &Packet::Get { key: b"x".to_vec() });
    assert_eq!(get_reply, Packet::GetAck { key: b"x".to_vec(), value: b"1".to_vec() });
}

#[test]
fn delete_then_get_reports_a_miss() {
    let a = start_peer(100);

    assert_eq!(send(&a, &Packet::Set { key: b"k".to_vec(), value: b"v".to_vec() }), Packet::SetAck);
    assert_eq!(send(&a, &Packet::Del { key: b"k".to_vec() }), Packet::DelAck);
    assert_eq!(send(&a, &Packet::Get { key: b"k".to_vec() }), Packet::Get { key: b"k".to_vec() });
}

/// Bootstraps a 3-peer ring (ids 10, 100, 200) using the real JOIN/NTFY/STAB
/// handlers over the wire, then exercises a GET whose key hashes into the
/// arc owned by the peer reached only via a LKUP/RPLY hop (scenario 3).
#[test]
fn three_peer_lookup_chain_resolves_through_a_finger_free_hop() {
    let p10 = start_peer(10);
    let p100 = start_peer(100);
    let p200 = start_peer(200);

    // p100 joins via p10: p10 adopts it as pred (and succ, since both were
    // unset), then NTFYs p100, which adopts p10 as its own successor.
    fire_and_forget(&p10, &Packet::Join { node: p100 });
    std::thread::sleep(Duration::from_millis(400));

    // p10 stabilizes its successor (p100) directly: sets p100.pred = p10.
    fire_and_forget(&p100, &Packet::Stabilize { node: p10 });
    std::thread::sleep(Duration::from_millis(100));

    // p200 joins via p10: 200 is the tighter predecessor of 10 once 100 is
    // already its predecessor (ring order 10 -> 100 -> 200 -> wraps to 10),
    // so p10 replaces its predecessor with p200 and NTFYs it.
    fire_and_forget(&p10, &Packet::Join { node: p200 });
    std::thread::sleep(Duration::from_millis(400));

    // p100 stabilizes p200 directly: sets p200.pred = p100.
    fire_and_forget(&p200, &Packet::Stabilize { node: p100 });
    std::thread::sleep(Duration::from_millis(100));

    // p100 stabilizes its stale successor p10; p10 replies NTFY(pred=p200)
    // both to this connection and, independently, straight to the real
    // p100 server, which adopts p200 as its successor.
    fire_and_forget(&p10, &Packet::Stabilize { node: p100 });
    std::thread::sleep(Duration::from_millis(100));

    // Ring is now: p10 pred=p200 succ=p100; p100 pred=p10 succ=p200;
    // p200 pred=p100 succ=p10.

    // Find a key hashing into (100, 200], owned by p200 but reachable from
    // p10 only via p100 (neither p10 nor its successor p100 own it).
    let key = (0u32..)
        .map(|i| i.to_be_bytes().to_vec())
        .find(|k| {
            let h = chord_peer::ring::hash_key(k);
            chord_peer::ring::responsible(100, 200, h) && !chord_peer::ring::responsible(10, 100, h)
        })
        .unwrap();

    let miss = send(&p10, &Packet::Get { key: key.clone() });
    assert_eq!(miss, Packet::Get { key });
}
