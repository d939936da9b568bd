// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Store-and-forward retransmission across sessions.

mod common;

use common::{count_events, sent_packet};
use fenhe::{
    v5, Connection, EncodePacket, Event, PacketId, PacketVariant, ProtocolVersion, QoS, Role,
    StorePacket, U32Data,
};

fn handshake_with_session_present(connection: &mut Connection) -> Vec<Event> {
    connection.notify_handshaked();
    let mut connect = v5::ConnectPacket::new("resume").unwrap();
    connect
        .properties_mut()
        .push(v5::Property::SessionExpiryInterval(U32Data::new(3600)));
    connection.send(connect.into()).unwrap();

    let connack = v5::ConnectAckPacket::new(true, v5::ReasonCode::Success);
    let mut buf = Vec::new();
    connack.encode(&mut buf).unwrap();
    connection.recv(&buf)
}

#[test]
fn test_restored_pubrel_replayed_on_resume() {
    let mut connection = Connection::new(Role::Client, ProtocolVersion::V5_0);
    let pubrel = v5::PublishReleasePacket::new(PacketId::new(3));
    connection
        .restore_packets(vec![StorePacket::PubrelV5(pubrel)])
        .unwrap();

    // The restored id is taken: it cannot be handed out again.
    assert!(!connection.register_packet_id(PacketId::new(3)));

    let events = handshake_with_session_present(&mut connection);
    // PacketReceived(CONNACK) first, then the replayed release packet.
    assert!(matches!(
        &events[0],
        Event::PacketReceived(PacketVariant::ConnectAckV5(..))
    ));
    match sent_packet(&events, 1, ProtocolVersion::V5_0) {
        PacketVariant::PublishReleaseV5(p) => assert_eq!(p.packet_id(), PacketId::new(3)),
        other => panic!("expected pubrel replay, got {other:?}"),
    }

    let pubcomp = v5::PublishCompletePacket::new(PacketId::new(3));
    let mut buf = Vec::new();
    pubcomp.encode(&mut buf).unwrap();
    let events = connection.recv(&buf);
    assert!(matches!(
        &events[0],
        Event::PacketReceived(PacketVariant::PublishCompleteV5(..))
    ));
    assert!(matches!(
        &events[1],
        Event::PacketIdReleased(id) if *id == PacketId::new(3)
    ));
    assert!(connection.get_stored_packets().is_empty());
}

#[test]
fn test_restored_publish_replayed_with_dup() {
    let mut connection = Connection::new(Role::Client, ProtocolVersion::V5_0);
    let mut publish = v5::PublishPacket::new("will/live", QoS::AtLeastOnce, b"again").unwrap();
    publish.set_packet_id(PacketId::new(11));
    connection
        .restore_packets(vec![StorePacket::PublishV5(publish)])
        .unwrap();

    let events = handshake_with_session_present(&mut connection);
    match sent_packet(&events, 1, ProtocolVersion::V5_0) {
        PacketVariant::PublishV5(p) => {
            assert_eq!(p.packet_id(), PacketId::new(11));
            assert!(p.dup());
        }
        other => panic!("expected publish replay, got {other:?}"),
    }
}

#[test]
fn test_session_absent_clears_store() {
    let mut connection = Connection::new(Role::Client, ProtocolVersion::V5_0);
    let mut publish = v5::PublishPacket::new("will/live", QoS::AtLeastOnce, b"again").unwrap();
    publish.set_packet_id(PacketId::new(11));
    connection
        .restore_packets(vec![StorePacket::PublishV5(publish)])
        .unwrap();

    connection.notify_handshaked();
    connection
        .send(v5::ConnectPacket::new("fresh").unwrap().into())
        .unwrap();
    // The server kept no session: stored packets and ids are dropped.
    let connack = v5::ConnectAckPacket::new(false, v5::ReasonCode::Success);
    let mut buf = Vec::new();
    connack.encode(&mut buf).unwrap();
    let events = connection.recv(&buf);

    assert_eq!(
        count_events(&events, |e| matches!(e, Event::Send { .. })),
        0
    );
    assert!(events.iter().any(
        |e| matches!(e, Event::PacketIdReleased(id) if *id == PacketId::new(11))
    ));
    assert!(connection.get_stored_packets().is_empty());
    assert!(connection.register_packet_id(PacketId::new(11)));
}

#[test]
fn test_qos2_handled_pids_round_trip() {
    let mut connection = Connection::new(Role::Client, ProtocolVersion::V5_0);
    let mut pids = std::collections::BTreeSet::new();
    pids.insert(PacketId::new(5));
    pids.insert(PacketId::new(6));
    connection.restore_qos2_publish_handled_pids(pids.clone());
    assert_eq!(connection.get_qos2_publish_handled_pids(), pids);
}

#[test]
fn test_store_survives_transport_loss() {
    let mut connection = Connection::new(Role::Client, ProtocolVersion::V5_0);
    handshake_with_session_present(&mut connection);

    assert!(connection.register_packet_id(PacketId::new(9)));
    let mut publish = v5::PublishPacket::new("state", QoS::AtLeastOnce, b"x").unwrap();
    publish.set_packet_id(PacketId::new(9));
    connection.send(publish.into()).unwrap();

    // Transport drops; the persistent session keeps the in-flight publish.
    connection.notify_closed();
    assert_eq!(connection.get_stored_packets().len(), 1);

    // Second call must be a no-op.
    let events = connection.notify_closed();
    assert!(events.is_empty());

    // Resuming replays it with the DUP flag set.
    let events = handshake_with_session_present(&mut connection);
    match sent_packet(&events, 1, ProtocolVersion::V5_0) {
        PacketVariant::PublishV5(p) => {
            assert_eq!(p.packet_id(), PacketId::new(9));
            assert!(p.dup());
        }
        other => panic!("expected publish replay, got {other:?}"),
    }
}
