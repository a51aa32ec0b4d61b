// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use des_gateway::{forward, GatewayReceiver, GatewaySender, PayloadHook, ReceiverConfig, SenderConfig};
use std::io::Write;
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpStream, UdpSocket};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::Duration;

fn no_repeat_receiver() -> (GatewayReceiver, std::sync::mpsc::Receiver<Vec<u8>>) {
    let (tx, rx) = channel();
    let tx = std::sync::Mutex::new(tx);
    let hook: PayloadHook = Arc::new(move |payload: &[u8]| {
        let _ = tx.lock().unwrap().send(payload.to_vec());
    });
    let mut config = ReceiverConfig::new(Ipv4Addr::new(239, 255, 90, 9), 21009, 0);
    config.listen = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
    config.no_repeat = true;
    let receiver = GatewayReceiver::start_with_hook(config, Some(hook)).unwrap();
    (receiver, rx)
}

#[test]
fn segmented_writes_arrive_as_one_payload() {
    let (mut receiver, rx) = no_repeat_receiver();

    let mut stream = TcpStream::connect(receiver.local_addr()).unwrap();
    stream.set_nodelay(true).unwrap();
    for chunk in [&b"<probe>"[..], b"<id>x</id>", b"</probe>"] {
        stream.write_all(chunk).unwrap();
        stream.flush().unwrap();
        std::thread::sleep(Duration::from_millis(30));
    }
    stream.shutdown(Shutdown::Write).unwrap();

    let payload = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(payload, b"<probe><id>x</id></probe>");

    receiver.shutdown();
    let stats = receiver.stats().snapshot();
    assert_eq!(stats.received, 1);
    assert_eq!(stats.relayed, 0);
}

#[test]
fn forward_preserves_payload_bytes() {
    let (mut receiver, rx) = no_repeat_receiver();
    let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();

    forward(&payload, receiver.local_addr(), Duration::from_secs(2)).unwrap();
    forward(b"second", receiver.local_addr(), Duration::from_secs(2)).unwrap();

    let mut got = vec![
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
    ];
    got.sort_by_key(Vec::len);
    assert_eq!(got[0], b"second");
    assert_eq!(got[1], payload);

    receiver.shutdown();
}

/// Needs a multicast-capable, non-loopback interface.
#[test]
#[ignore]
fn relays_between_groups() {
    let group_a = Ipv4Addr::new(239, 255, 90, 21);
    let group_b = Ipv4Addr::new(239, 255, 90, 22);
    let (port_a, port_b) = (21021, 21022);

    let iface = des::net::resolve_interface(None).unwrap();
    let listener_b = des::net::MulticastSocket::join(group_b, port_b, iface, true).unwrap();

    let mut receiver = GatewayReceiver::start(ReceiverConfig::new(group_b, port_b, 0)).unwrap();
    let receiver_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, receiver.local_addr().port()));
    // Own-host datagrams must be relayed here, the injector shares the host.
    let mut config = SenderConfig::new(group_a, port_a, receiver_addr);
    config.allow_loopback = true;
    let mut sender = GatewaySender::start(config).unwrap();

    let (tx, rx) = channel();
    let running = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let listener_running = Arc::clone(&running);
    let listener_thread = std::thread::spawn(move || {
        listener_b
            .recv_loop(&listener_running, |data, _| {
                let _ = tx.send(data.to_vec());
            })
            .unwrap();
    });

    let injector = UdpSocket::bind((iface, 0)).unwrap();
    injector.set_multicast_loop_v4(true).unwrap();
    injector.send_to(b"<probe/>", (group_a, port_a)).unwrap();

    let relayed = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(relayed, b"<probe/>");

    running.store(false, std::sync::atomic::Ordering::Release);
    listener_thread.join().unwrap();
    sender.shutdown();
    receiver.shutdown();
}

/// Needs a multicast-capable, non-loopback interface.
#[test]
#[ignore]
fn own_host_datagrams_are_not_relayed() {
    let group = Ipv4Addr::new(239, 255, 90, 23);
    let port = 21023;
    let (mut receiver, rx) = no_repeat_receiver();
    let receiver_addr = receiver.local_addr();

    let iface = des::net::resolve_interface(None).unwrap();
    let mut sender = GatewaySender::start(SenderConfig::new(group, port, receiver_addr)).unwrap();

    let injector = UdpSocket::bind((iface, 0)).unwrap();
    injector.set_multicast_loop_v4(true).unwrap();
    injector.send_to(b"<probe/>", (group, port)).unwrap();

    assert!(rx.recv_timeout(Duration::from_secs(1)).is_err());
    sender.shutdown();
    assert!(sender.stats().snapshot().looped_back >= 1);
    receiver.shutdown();
}
