// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Sans-I/O protocol engine for MQTT v3.1.1 and v5.0 endpoints.
//!
//! This crate contains the protocol logic of an MQTT endpoint, client or
//! server side, with no sockets, timers or runtime of its own. The host
//! feeds transport bytes into a [`Connection`] and carries out the
//! [`Event`] list each call returns: write these chunks, arm this timer,
//! deliver this packet, close the transport.
//!
//! The wire codec ([`v3`], [`v5`]) is usable on its own: every control
//! packet is a struct with [`DecodePacket`] and [`EncodePacket`] impls, and
//! for each decodable packet value `p`, decoding its encoding yields `p`
//! again.

mod base;
mod binary_data;
mod bool_data;
mod byte_array;
mod connect_flags;
mod connection;
mod error;
mod header;
mod packet;
mod payload;
mod protocol_version;
mod string_data;
mod string_pair_data;
mod topic;
mod u16_data;
mod u32_data;
pub mod utils;
pub mod v3;
pub mod v5;
mod var_int;

pub use base::{DecodePacket, EncodePacket, Packet, PacketId, QoS, Role, PROTOCOL_NAME};
pub use binary_data::BinaryData;
pub use bool_data::BoolData;
pub use byte_array::ByteArray;
pub use connect_flags::ConnectFlags;
pub use connection::{
    AcquireWait, Connection, ConnectionConfig, ConnectionStatus, Event, FrameAssembler,
    FrameError, IdValue, PacketIdManager, ResponsePacketType, SendStore, StorePacket,
    TimerKind, TimerOp, TopicAliasRecv, TopicAliasSend, PACKET_SIZE_NO_LIMIT,
};
pub use error::{DecodeError, EncodeError, MqttError};
pub use header::{FixedHeader, PacketType};
pub use packet::{sniff_connect_version, PacketVariant};
pub use payload::Payload;
pub use protocol_version::ProtocolVersion;
pub use string_data::StringData;
pub use string_pair_data::StringPairData;
pub use topic::{validate_pub_topic, validate_sub_topic, PubTopic, SubTopic};
pub use u16_data::U16Data;
pub use u32_data::U32Data;
pub use var_int::{VarInt, VarIntError, MAX_VAR_INT};
