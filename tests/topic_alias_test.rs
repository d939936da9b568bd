// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Topic alias auto-mapping on the send side and validation on the
//! receive side.

mod common;

use common::{connected_client_v5_with_connack_props, sent_packet};
use fenhe::{v5, EncodePacket, Event, MqttError, PacketVariant, ProtocolVersion, QoS, U16Data};

fn connack_props_alias_maximum(maximum: u16) -> v5::Properties {
    let mut props = v5::Properties::new();
    props.push(v5::Property::TopicAliasMaximum(U16Data::new(maximum)));
    props
}

fn send_qos0(connection: &mut fenhe::Connection, topic: &str) -> Vec<Event> {
    let publish = v5::PublishPacket::new(topic, QoS::AtMostOnce, b"m").unwrap();
    connection.send(publish.into()).unwrap()
}

fn wire_publish(events: &[Event]) -> v5::PublishPacket {
    match sent_packet(events, 0, ProtocolVersion::V5_0) {
        PacketVariant::PublishV5(p) => p,
        other => panic!("expected publish on the wire, got {other:?}"),
    }
}

#[test]
fn test_auto_map_assigns_and_reuses_aliases() {
    let mut connection = connected_client_v5_with_connack_props(
        |config| {
            config.set_auto_map_topic_alias_send(true);
        },
        connack_props_alias_maximum(3),
    );

    // First send of "a" installs alias 1, keeping the topic on the wire.
    let events = send_qos0(&mut connection, "a");
    let packet = wire_publish(&events);
    assert_eq!(packet.topic(), "a");
    assert_eq!(packet.topic_alias(), Some(1));

    // Second send of "a" travels as alias only.
    let events = send_qos0(&mut connection, "a");
    let packet = wire_publish(&events);
    assert_eq!(packet.topic(), "");
    assert_eq!(packet.topic_alias(), Some(1));

    let events = send_qos0(&mut connection, "b");
    let packet = wire_publish(&events);
    assert_eq!(packet.topic_alias(), Some(2));

    let events = send_qos0(&mut connection, "c");
    let packet = wire_publish(&events);
    assert_eq!(packet.topic_alias(), Some(3));

    // Table full: "d" evicts the least recently used mapping, alias 1,
    // and installs itself with the topic on the wire.
    let events = send_qos0(&mut connection, "d");
    let packet = wire_publish(&events);
    assert_eq!(packet.topic(), "d");
    assert_eq!(packet.topic_alias(), Some(1));
}

#[test]
fn test_explicit_alias_out_of_range_rejected() {
    let mut connection = connected_client_v5_with_connack_props(
        |_config| {},
        connack_props_alias_maximum(3),
    );

    let mut publish = v5::PublishPacket::new("x", QoS::AtMostOnce, b"m").unwrap();
    publish.set_topic_alias(4);
    assert_eq!(
        connection.send(publish.into()),
        Err(MqttError::TopicAliasInvalid)
    );
}

#[test]
fn test_recv_alias_resolution() {
    // Advertise alias support in our CONNECT, then feed aliased publishes.
    let mut config = fenhe::ConnectionConfig::new(fenhe::Role::Client, ProtocolVersion::V5_0);
    config.set_auto_pub_response(true);
    let mut connection = fenhe::Connection::with_config(config);
    connection.notify_handshaked();

    let mut connect = v5::ConnectPacket::new("alias").unwrap();
    connect
        .properties_mut()
        .push(v5::Property::TopicAliasMaximum(U16Data::new(4)));
    connection.send(connect.into()).unwrap();

    let connack = v5::ConnectAckPacket::new(false, v5::ReasonCode::Success);
    let mut buf = Vec::new();
    connack.encode(&mut buf).unwrap();
    connection.recv(&buf);

    // Install the mapping alias 2 -> "room/1".
    let mut publish = v5::PublishPacket::new("room/1", QoS::AtMostOnce, b"on").unwrap();
    publish.set_topic_alias(2);
    let mut buf = Vec::new();
    publish.encode(&mut buf).unwrap();
    let events = connection.recv(&buf);
    assert!(matches!(&events[0], Event::PacketReceived(..)));

    // Resolve through the mapping.
    let mut publish = v5::PublishPacket::new("", QoS::AtMostOnce, b"off").unwrap();
    publish.set_topic_alias(2);
    let mut buf = Vec::new();
    publish.encode(&mut buf).unwrap();
    let events = connection.recv(&buf);
    match &events[0] {
        Event::PacketReceived(PacketVariant::PublishV5(p)) => {
            assert_eq!(p.topic(), "room/1");
        }
        other => panic!("expected resolved publish, got {other:?}"),
    }
}

#[test]
fn test_recv_alias_out_of_range_closes() {
    let mut connection = fenhe::Connection::new(fenhe::Role::Client, ProtocolVersion::V5_0);
    connection.notify_handshaked();

    let mut connect = v5::ConnectPacket::new("alias").unwrap();
    connect
        .properties_mut()
        .push(v5::Property::TopicAliasMaximum(U16Data::new(2)));
    connection.send(connect.into()).unwrap();

    let connack = v5::ConnectAckPacket::new(false, v5::ReasonCode::Success);
    let mut buf = Vec::new();
    connack.encode(&mut buf).unwrap();
    connection.recv(&buf);

    let mut publish = v5::PublishPacket::new("room/1", QoS::AtMostOnce, b"on").unwrap();
    publish.set_topic_alias(3);
    let mut buf = Vec::new();
    publish.encode(&mut buf).unwrap();
    let events = connection.recv(&buf);

    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Error(MqttError::TopicAliasInvalid))));
    assert!(events.iter().any(|e| matches!(e, Event::Close)));
}
