// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

// Each test binary compiles this module separately and uses only a subset.
#![allow(dead_code)]

use fenhe::{
    v5, ByteArray, Connection, ConnectionConfig, EncodePacket, Event, PacketVariant,
    ProtocolVersion, Role,
};

/// Concatenate the chunks of the first `Send` event at or after `start`.
pub fn sent_bytes(events: &[Event], start: usize) -> Vec<u8> {
    for event in &events[start..] {
        if let Event::Send { chunks, .. } = event {
            let mut buf = Vec::new();
            for chunk in chunks {
                buf.extend_from_slice(chunk);
            }
            return buf;
        }
    }
    panic!("no Send event found in {events:?}");
}

/// Decode the first `Send` event at or after `start` as a packet.
pub fn sent_packet(events: &[Event], start: usize, version: ProtocolVersion) -> PacketVariant {
    let buf = sent_bytes(events, start);
    let mut ba = ByteArray::new(&buf);
    PacketVariant::decode(&mut ba, version).expect("sent packet must decode")
}

/// Drive a v5 client through handshake and CONNACK into Connected state.
pub fn connected_client_v5(configure: impl FnOnce(&mut ConnectionConfig)) -> Connection {
    connected_client_v5_with_connack_props(configure, v5::Properties::new())
}

/// Like [`connected_client_v5`], with explicit CONNACK properties from
/// the server.
pub fn connected_client_v5_with_connack_props(
    configure: impl FnOnce(&mut ConnectionConfig),
    connack_props: v5::Properties,
) -> Connection {
    let mut config = ConnectionConfig::new(Role::Client, ProtocolVersion::V5_0);
    configure(&mut config);
    let mut connection = Connection::with_config(config);
    connection.notify_handshaked();

    let connect = v5::ConnectPacket::new("testclient").unwrap();
    connection
        .send(connect.into())
        .expect("connect must be sendable");

    let mut connack = v5::ConnectAckPacket::new(false, v5::ReasonCode::Success);
    *connack.properties_mut() = connack_props;
    let mut buf = Vec::new();
    connack.encode(&mut buf).unwrap();
    connection.recv(&buf);
    connection
}

/// Count events matching a predicate.
pub fn count_events(events: &[Event], pred: impl Fn(&Event) -> bool) -> usize {
    events.iter().filter(|event| pred(event)).count()
}
