// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Malformed input and role violations.

mod common;

use common::{connected_client_v5, count_events};
use fenhe::{
    v5, Connection, EncodePacket, Event, MqttError, PacketId, ProtocolVersion, Role,
};

#[test]
fn test_malformed_remaining_length_closes() {
    let mut connection = connected_client_v5(|_config| {});

    // Five continuation bytes in the remaining length field.
    let events = connection.recv(&[0x30, 0xff, 0xff, 0xff, 0xff, 0xff]);

    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Error(MqttError::PacketTooLarge))));
    assert!(events.iter().any(|e| matches!(e, Event::Close)));
    // No partial packet reaches the host.
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::PacketReceived(..))),
        0
    );
}

#[test]
fn test_client_rejects_connect_from_peer() {
    let mut connection = connected_client_v5(|_config| {});

    // A client must never receive CONNECT.
    let connect = v5::ConnectPacket::new("rogue").unwrap();
    let mut buf = Vec::new();
    connect.encode(&mut buf).unwrap();
    let events = connection.recv(&buf);

    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Error(MqttError::ProtocolError))));
    assert!(events.iter().any(|e| matches!(e, Event::Close)));
}

#[test]
fn test_client_may_not_send_connack() {
    let mut connection = connected_client_v5(|_config| {});
    let connack = v5::ConnectAckPacket::new(false, v5::ReasonCode::Success);
    assert_eq!(
        connection.send(connack.into()),
        Err(MqttError::ProtocolError)
    );
}

#[test]
fn test_version_mismatch_rejected() {
    let mut connection = connected_client_v5(|_config| {});
    let packet = fenhe::v3::PublishPacket::new("t", fenhe::QoS::AtMostOnce, b"x").unwrap();
    assert_eq!(
        connection.send(packet.into()),
        Err(MqttError::ProtocolError)
    );
}

#[test]
fn test_unknown_ack_id_is_violation() {
    let mut connection = connected_client_v5(|_config| {});
    let puback = v5::PublishAckPacket::new(PacketId::new(77));
    let mut buf = Vec::new();
    puback.encode(&mut buf).unwrap();
    let events = connection.recv(&buf);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Error(MqttError::ProtocolError))));
    assert!(events.iter().any(|e| matches!(e, Event::Close)));
}

#[test]
fn test_oversized_outbound_rejected() {
    let mut connection = fenhe::Connection::with_config(fenhe::ConnectionConfig::new(
        Role::Client,
        ProtocolVersion::V5_0,
    ));
    connection.notify_handshaked();
    connection
        .send(v5::ConnectPacket::new("small").unwrap().into())
        .unwrap();

    // The server only accepts tiny packets.
    let mut connack = v5::ConnectAckPacket::new(false, v5::ReasonCode::Success);
    connack
        .properties_mut()
        .push(v5::Property::MaximumPacketSize(fenhe::U32Data::new(16)));
    let mut buf = Vec::new();
    connack.encode(&mut buf).unwrap();
    connection.recv(&buf);

    let publish =
        v5::PublishPacket::new("big/topic/name", fenhe::QoS::AtMostOnce, &[0_u8; 64]).unwrap();
    assert_eq!(
        connection.send(publish.into()),
        Err(MqttError::PacketTooLarge)
    );
}

#[test]
fn test_send_before_handshake_rejected() {
    let mut connection = Connection::new(Role::Client, ProtocolVersion::V5_0);
    let connect = v5::ConnectPacket::new("early").unwrap();
    assert_eq!(
        connection.send(connect.into()),
        Err(MqttError::ProtocolError)
    );
}

#[test]
fn test_disconnect_recv_closes() {
    let mut connection = connected_client_v5(|_config| {});
    let disconnect = v5::DisconnectPacket::new();
    let mut buf = Vec::new();
    disconnect.encode(&mut buf).unwrap();
    let events = connection.recv(&buf);
    assert!(matches!(
        events.last(),
        Some(Event::Close)
    ));
    assert_eq!(
        connection.status(),
        fenhe::ConnectionStatus::Disconnecting
    );
}

#[test]
fn test_disconnect_send_closes_after_delay() {
    use std::time::Duration;
    let mut config = fenhe::ConnectionConfig::new(Role::Client, ProtocolVersion::V5_0);
    config.set_close_delay_after_disconnect_sent(Duration::from_secs(1));
    let mut connection = Connection::with_config(config);
    connection.notify_handshaked();
    connection
        .send(v5::ConnectPacket::new("bye").unwrap().into())
        .unwrap();
    let connack = v5::ConnectAckPacket::new(false, v5::ReasonCode::Success);
    let mut buf = Vec::new();
    connack.encode(&mut buf).unwrap();
    connection.recv(&buf);

    let events = connection
        .send(v5::DisconnectPacket::new().into())
        .unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::Timer {
            op: fenhe::TimerOp::Reset,
            kind: fenhe::TimerKind::CloseByDisconnect,
            duration: Some(d),
        } if *d == Duration::from_secs(1)
    )));
    assert!(!events.iter().any(|e| matches!(e, Event::Close)));

    let events = connection.notify_timer_fired(fenhe::TimerKind::CloseByDisconnect);
    assert!(events.iter().any(|e| matches!(e, Event::Close)));
}
