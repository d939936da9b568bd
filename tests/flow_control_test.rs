// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Receive-maximum flow control of outbound publishes.

mod common;

use common::{connected_client_v5_with_connack_props, count_events};
use fenhe::{v5, EncodePacket, Event, MqttError, PacketId, QoS, U16Data};

fn connack_props_receive_maximum(maximum: u16) -> v5::Properties {
    let mut props = v5::Properties::new();
    props.push(v5::Property::ReceiveMaximum(U16Data::new(maximum)));
    props
}

fn publish_with_id(connection: &mut fenhe::Connection, id: u16) -> Result<Vec<Event>, MqttError> {
    assert!(connection.register_packet_id(PacketId::new(id)));
    let mut publish = v5::PublishPacket::new("flow/t", QoS::AtLeastOnce, b"p").unwrap();
    publish.set_packet_id(PacketId::new(id));
    connection.send(publish.into())
}

#[test]
fn test_flow_capped_send_rejected() {
    let mut connection = connected_client_v5_with_connack_props(
        |_config| {},
        connack_props_receive_maximum(2),
    );

    publish_with_id(&mut connection, 1).unwrap();
    publish_with_id(&mut connection, 2).unwrap();
    assert_eq!(connection.get_receive_maximum_vacancy_for_send(), Some(0));

    let result = publish_with_id(&mut connection, 3);
    assert_eq!(result, Err(MqttError::ReceiveMaximumExceeded));
}

#[test]
fn test_offline_publish_queues_and_drains() {
    let mut connection = connected_client_v5_with_connack_props(
        |config| {
            config.set_offline_publish(true);
        },
        connack_props_receive_maximum(1),
    );

    publish_with_id(&mut connection, 1).unwrap();

    // Quota exhausted: the next publish is parked, not sent.
    let result = publish_with_id(&mut connection, 2);
    assert_eq!(result, Err(MqttError::PacketEnqueued));
    assert_eq!(connection.get_stored_packets().len(), 1);

    // The acknowledgement frees one slot and the queue drains into it.
    let puback = v5::PublishAckPacket::new(PacketId::new(1));
    let mut buf = Vec::new();
    puback.encode(&mut buf).unwrap();
    let events = connection.recv(&buf);

    assert_eq!(
        count_events(&events, |e| matches!(e, Event::Send { .. })),
        1
    );
    assert_eq!(connection.get_receive_maximum_vacancy_for_send(), Some(0));
    assert_eq!(connection.get_stored_packets().len(), 1);
    assert_eq!(
        connection.get_stored_packets()[0].packet_id(),
        PacketId::new(2)
    );
}

#[test]
fn test_qos0_never_queued() {
    let mut connection = connected_client_v5_with_connack_props(
        |config| {
            config.set_offline_publish(true);
        },
        connack_props_receive_maximum(1),
    );

    publish_with_id(&mut connection, 1).unwrap();

    // QoS 0 has no acknowledgement and therefore no flow control.
    let publish = v5::PublishPacket::new("flow/t", QoS::AtMostOnce, b"p").unwrap();
    let events = connection.send(publish.into()).unwrap();
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::Send { .. })),
        1
    );
}
