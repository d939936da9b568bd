// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! End-to-end `QoS` 1 and `QoS` 2 flows on a v5 client connection.

mod common;

use common::{connected_client_v5, count_events, sent_packet};
use fenhe::{
    v5, EncodePacket, Event, MqttError, PacketId, PacketVariant, ProtocolVersion, QoS,
};

#[test]
fn test_qos1_round_trip() {
    let mut connection = connected_client_v5(|_config| {});

    let packet_id = connection.acquire_unique_packet_id().unwrap();
    assert_eq!(packet_id, PacketId::new(1));

    let mut publish = v5::PublishPacket::new("t/1", QoS::AtLeastOnce, b"hi").unwrap();
    publish.set_packet_id(packet_id);
    let events = connection.send(publish.into()).unwrap();
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::Send { .. })),
        1
    );
    match sent_packet(&events, 0, ProtocolVersion::V5_0) {
        PacketVariant::PublishV5(p) => {
            assert_eq!(p.topic(), "t/1");
            assert!(!p.dup());
        }
        other => panic!("expected publish on the wire, got {other:?}"),
    }
    assert_eq!(connection.get_stored_packets().len(), 1);

    // Peer acknowledges; the flow ends and the id comes back.
    let puback = v5::PublishAckPacket::new(packet_id);
    let mut buf = Vec::new();
    puback.encode(&mut buf).unwrap();
    let events = connection.recv(&buf);

    assert!(matches!(
        &events[0],
        Event::PacketReceived(PacketVariant::PublishAckV5(p)) if p.packet_id() == packet_id
    ));
    assert!(matches!(
        &events[1],
        Event::PacketIdReleased(id) if *id == packet_id
    ));
    assert!(connection.get_stored_packets().is_empty());
    assert_eq!(
        connection.get_receive_maximum_vacancy_for_send(),
        Some(u16::MAX)
    );
}

#[test]
fn test_qos2_full_flow() {
    let mut connection = connected_client_v5(|config| {
        config.set_auto_pub_response(true);
    });

    assert!(connection.register_packet_id(PacketId::new(7)));
    let mut publish = v5::PublishPacket::new("t/2", QoS::ExactOnce, b"data").unwrap();
    publish.set_packet_id(PacketId::new(7));
    let events = connection.send(publish.into()).unwrap();
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::Send { .. })),
        1
    );
    assert_eq!(connection.get_stored_packets().len(), 1);

    // PUBREC swaps the stored publish for a release packet and, with auto
    // responses on, emits it.
    let pubrec = v5::PublishReceivedPacket::new(PacketId::new(7));
    let mut buf = Vec::new();
    pubrec.encode(&mut buf).unwrap();
    let events = connection.recv(&buf);
    match sent_packet(&events, 0, ProtocolVersion::V5_0) {
        PacketVariant::PublishReleaseV5(p) => assert_eq!(p.packet_id(), PacketId::new(7)),
        other => panic!("expected pubrel on the wire, got {other:?}"),
    }
    let stored = connection.get_stored_packets();
    assert_eq!(stored.len(), 1);
    assert!(matches!(stored[0], fenhe::StorePacket::PubrelV5(..)));

    // PUBCOMP finishes the exchange.
    let pubcomp = v5::PublishCompletePacket::new(PacketId::new(7));
    let mut buf = Vec::new();
    pubcomp.encode(&mut buf).unwrap();
    let events = connection.recv(&buf);
    assert!(matches!(
        &events[0],
        Event::PacketReceived(PacketVariant::PublishCompleteV5(..))
    ));
    assert!(matches!(
        &events[1],
        Event::PacketIdReleased(id) if *id == PacketId::new(7)
    ));
    assert!(connection.get_stored_packets().is_empty());
}

#[test]
fn test_pubrec_error_ends_flow_without_pubrel() {
    let mut connection = connected_client_v5(|config| {
        config.set_auto_pub_response(true);
    });

    assert!(connection.register_packet_id(PacketId::new(4)));
    let mut publish = v5::PublishPacket::new("t/3", QoS::ExactOnce, b"x").unwrap();
    publish.set_packet_id(PacketId::new(4));
    connection.send(publish.into()).unwrap();

    let pubrec =
        v5::PublishReceivedPacket::with_reason(PacketId::new(4), v5::ReasonCode::QuotaExceeded);
    let mut buf = Vec::new();
    pubrec.encode(&mut buf).unwrap();
    let events = connection.recv(&buf);

    // No release packet follows an error-coded PUBREC; the id is freed and
    // the store entry dropped.
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::Send { .. })),
        0
    );
    assert!(matches!(
        &events[1],
        Event::PacketIdReleased(id) if *id == PacketId::new(4)
    ));
    assert!(connection.get_stored_packets().is_empty());
}

#[test]
fn test_dup_rejected_on_first_send() {
    let mut connection = connected_client_v5(|_config| {});
    assert!(connection.register_packet_id(PacketId::new(2)));
    let mut publish = v5::PublishPacket::new("t", QoS::AtLeastOnce, b"x").unwrap();
    publish.set_packet_id(PacketId::new(2));
    publish.set_dup(true).unwrap();
    assert_eq!(
        connection.send(publish.into()),
        Err(MqttError::ProtocolError)
    );
}

#[test]
fn test_unregistered_packet_id_rejected() {
    let mut connection = connected_client_v5(|_config| {});
    let mut publish = v5::PublishPacket::new("t", QoS::AtLeastOnce, b"x").unwrap();
    publish.set_packet_id(PacketId::new(99));
    assert_eq!(
        connection.send(publish.into()),
        Err(MqttError::PacketIdentifierConflict)
    );
}

#[test]
fn test_duplicate_qos2_publish_suppressed() {
    let mut connection = connected_client_v5(|config| {
        config.set_auto_pub_response(true);
    });

    let mut publish = v5::PublishPacket::new("in/t", QoS::ExactOnce, b"m").unwrap();
    publish.set_packet_id(PacketId::new(21));
    let mut buf = Vec::new();
    publish.encode(&mut buf).unwrap();

    let events = connection.recv(&buf);
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::PacketReceived(..))),
        1
    );
    assert!(connection.is_publish_processing(PacketId::new(21)));

    // Redelivery with the same id: acknowledged again, delivered never.
    let mut dup_publish = v5::PublishPacket::new("in/t", QoS::ExactOnce, b"m").unwrap();
    dup_publish.set_packet_id(PacketId::new(21));
    dup_publish.set_dup(true).unwrap();
    let mut buf = Vec::new();
    dup_publish.encode(&mut buf).unwrap();
    let events = connection.recv(&buf);
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::PacketReceived(..))),
        0
    );
    match sent_packet(&events, 0, ProtocolVersion::V5_0) {
        PacketVariant::PublishReceivedV5(p) => {
            assert_eq!(p.packet_id(), PacketId::new(21));
            assert_eq!(p.reason_code(), v5::ReasonCode::Success);
        }
        other => panic!("expected pubrec on the wire, got {other:?}"),
    }

    // PUBREL completes the inbound flow.
    let pubrel = v5::PublishReleasePacket::new(PacketId::new(21));
    let mut buf = Vec::new();
    pubrel.encode(&mut buf).unwrap();
    let events = connection.recv(&buf);
    match sent_packet(&events, 0, ProtocolVersion::V5_0) {
        PacketVariant::PublishCompleteV5(p) => assert_eq!(p.packet_id(), PacketId::new(21)),
        other => panic!("expected pubcomp on the wire, got {other:?}"),
    }
    assert!(!connection.is_publish_processing(PacketId::new(21)));
}
