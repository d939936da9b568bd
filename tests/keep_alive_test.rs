// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Keep-alive timer interactions on both sides.

mod common;

use std::time::Duration;

use common::sent_packet;
use fenhe::{
    v5, Connection, ConnectionConfig, EncodePacket, Event, MqttError, PacketVariant,
    ProtocolVersion, Role, TimerKind, TimerOp,
};

#[test]
fn test_server_keep_alive_timeout() {
    let mut connection = Connection::new(Role::Server, ProtocolVersion::Undetermined);
    connection.notify_handshaked();

    let mut connect = v5::ConnectPacket::new("kaclient").unwrap();
    connect.set_keep_alive(10);
    let mut buf = Vec::new();
    connect.encode(&mut buf).unwrap();
    let events = connection.recv(&buf);

    // The watchdog is armed at 1.5 times the keep alive interval.
    assert!(events.iter().any(|e| matches!(
        e,
        Event::Timer {
            op: TimerOp::Reset,
            kind: TimerKind::PingreqRecv,
            duration: Some(d),
        } if *d == Duration::from_secs(15)
    )));

    // Silence until the timer fires: disconnect the peer.
    let events = connection.notify_timer_fired(TimerKind::PingreqRecv);
    match sent_packet(&events, 0, ProtocolVersion::V5_0) {
        PacketVariant::DisconnectV5(p) => {
            assert_eq!(p.reason_code(), v5::ReasonCode::KeepAliveTimeout);
        }
        other => panic!("expected disconnect on the wire, got {other:?}"),
    }
    assert!(events.iter().any(|e| matches!(e, Event::Close)));
}

#[test]
fn test_client_pingreq_on_timer() {
    let mut config = ConnectionConfig::new(Role::Client, ProtocolVersion::V5_0);
    config.set_pingresp_recv_timeout(Some(Duration::from_secs(5)));
    let mut connection = Connection::with_config(config);
    connection.notify_handshaked();

    let mut connect = v5::ConnectPacket::new("pinger").unwrap();
    connect.set_keep_alive(30);
    let events = connection.send(connect.into()).unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::Timer {
            op: TimerOp::Reset,
            kind: TimerKind::PingreqSend,
            duration: Some(d),
        } if *d == Duration::from_secs(30)
    )));

    let connack = v5::ConnectAckPacket::new(false, v5::ReasonCode::Success);
    let mut buf = Vec::new();
    connack.encode(&mut buf).unwrap();
    connection.recv(&buf);

    // The send timer fires: a ping request goes out and the response
    // watchdog starts.
    let events = connection.notify_timer_fired(TimerKind::PingreqSend);
    assert!(matches!(
        sent_packet(&events, 0, ProtocolVersion::V5_0),
        PacketVariant::PingRequestV5(..)
    ));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::Timer {
            op: TimerOp::Reset,
            kind: TimerKind::PingrespRecv,
            ..
        }
    )));

    // The response cancels the watchdog.
    let pingresp = v5::PingResponsePacket::new();
    let mut buf = Vec::new();
    pingresp.encode(&mut buf).unwrap();
    let events = connection.recv(&buf);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::Timer {
            op: TimerOp::Cancel,
            kind: TimerKind::PingrespRecv,
            ..
        }
    )));
}

#[test]
fn test_pingresp_timeout_closes() {
    let mut config = ConnectionConfig::new(Role::Client, ProtocolVersion::V5_0);
    config.set_pingresp_recv_timeout(Some(Duration::from_secs(5)));
    let mut connection = Connection::with_config(config);
    connection.notify_handshaked();
    connection
        .send(v5::ConnectPacket::new("pinger").unwrap().into())
        .unwrap();
    let connack = v5::ConnectAckPacket::new(false, v5::ReasonCode::Success);
    let mut buf = Vec::new();
    connack.encode(&mut buf).unwrap();
    connection.recv(&buf);

    connection.notify_timer_fired(TimerKind::PingreqSend);
    let events = connection.notify_timer_fired(TimerKind::PingrespRecv);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Error(MqttError::PingrespRecvTimeout))));
    assert!(events.iter().any(|e| matches!(e, Event::Close)));
}

#[test]
fn test_server_auto_ping_response() {
    let mut config = ConnectionConfig::new(Role::Server, ProtocolVersion::Undetermined);
    config.set_auto_ping_response(true);
    let mut connection = Connection::with_config(config);
    connection.notify_handshaked();

    let connect = v5::ConnectPacket::new("pinger").unwrap();
    let mut buf = Vec::new();
    connect.encode(&mut buf).unwrap();
    connection.recv(&buf);
    let connack = v5::ConnectAckPacket::new(false, v5::ReasonCode::Success);
    connection.send(connack.into()).unwrap();

    let pingreq = v5::PingRequestPacket::new();
    let mut buf = Vec::new();
    pingreq.encode(&mut buf).unwrap();
    let events = connection.recv(&buf);
    assert!(matches!(
        sent_packet(&events, 0, ProtocolVersion::V5_0),
        PacketVariant::PingResponseV5(..)
    ));
}
