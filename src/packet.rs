// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use bytes::Bytes;
use std::convert::TryFrom;

use crate::base::PROTOCOL_NAME;
use crate::var_int::VarIntError;
use crate::{
    v3, v5, ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, Packet, PacketId,
    PacketType, ProtocolVersion, QoS, StringData,
};

/// A control packet of either protocol version.
///
/// This is the currency of the connection engine: `send()` consumes one
/// variant, `Event::PacketReceived` delivers one. The packet universe is
/// closed, so each (version, type) pair is a separate variant.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, PartialEq)]
pub enum PacketVariant {
    ConnectV3(v3::ConnectPacket),
    ConnectAckV3(v3::ConnectAckPacket),
    PublishV3(v3::PublishPacket),
    PublishAckV3(v3::PublishAckPacket),
    PublishReceivedV3(v3::PublishReceivedPacket),
    PublishReleaseV3(v3::PublishReleasePacket),
    PublishCompleteV3(v3::PublishCompletePacket),
    SubscribeV3(v3::SubscribePacket),
    SubscribeAckV3(v3::SubscribeAckPacket),
    UnsubscribeV3(v3::UnsubscribePacket),
    UnsubscribeAckV3(v3::UnsubscribeAckPacket),
    PingRequestV3(v3::PingRequestPacket),
    PingResponseV3(v3::PingResponsePacket),
    DisconnectV3(v3::DisconnectPacket),

    ConnectV5(v5::ConnectPacket),
    ConnectAckV5(v5::ConnectAckPacket),
    PublishV5(v5::PublishPacket),
    PublishAckV5(v5::PublishAckPacket),
    PublishReceivedV5(v5::PublishReceivedPacket),
    PublishReleaseV5(v5::PublishReleasePacket),
    PublishCompleteV5(v5::PublishCompletePacket),
    SubscribeV5(v5::SubscribePacket),
    SubscribeAckV5(v5::SubscribeAckPacket),
    UnsubscribeV5(v5::UnsubscribePacket),
    UnsubscribeAckV5(v5::UnsubscribeAckPacket),
    PingRequestV5(v5::PingRequestPacket),
    PingResponseV5(v5::PingResponsePacket),
    DisconnectV5(v5::DisconnectPacket),
    AuthV5(v5::AuthPacket),
}

macro_rules! impl_packet_from {
    ($variant:ident, $packet:ty) => {
        impl From<$packet> for PacketVariant {
            fn from(packet: $packet) -> Self {
                Self::$variant(packet)
            }
        }
    };
}

impl_packet_from!(ConnectV3, v3::ConnectPacket);
impl_packet_from!(ConnectAckV3, v3::ConnectAckPacket);
impl_packet_from!(PublishV3, v3::PublishPacket);
impl_packet_from!(PublishAckV3, v3::PublishAckPacket);
impl_packet_from!(PublishReceivedV3, v3::PublishReceivedPacket);
impl_packet_from!(PublishReleaseV3, v3::PublishReleasePacket);
impl_packet_from!(PublishCompleteV3, v3::PublishCompletePacket);
impl_packet_from!(SubscribeV3, v3::SubscribePacket);
impl_packet_from!(SubscribeAckV3, v3::SubscribeAckPacket);
impl_packet_from!(UnsubscribeV3, v3::UnsubscribePacket);
impl_packet_from!(UnsubscribeAckV3, v3::UnsubscribeAckPacket);
impl_packet_from!(PingRequestV3, v3::PingRequestPacket);
impl_packet_from!(PingResponseV3, v3::PingResponsePacket);
impl_packet_from!(DisconnectV3, v3::DisconnectPacket);
impl_packet_from!(ConnectV5, v5::ConnectPacket);
impl_packet_from!(ConnectAckV5, v5::ConnectAckPacket);
impl_packet_from!(PublishV5, v5::PublishPacket);
impl_packet_from!(PublishAckV5, v5::PublishAckPacket);
impl_packet_from!(PublishReceivedV5, v5::PublishReceivedPacket);
impl_packet_from!(PublishReleaseV5, v5::PublishReleasePacket);
impl_packet_from!(PublishCompleteV5, v5::PublishCompletePacket);
impl_packet_from!(SubscribeV5, v5::SubscribePacket);
impl_packet_from!(SubscribeAckV5, v5::SubscribeAckPacket);
impl_packet_from!(UnsubscribeV5, v5::UnsubscribePacket);
impl_packet_from!(UnsubscribeAckV5, v5::UnsubscribeAckPacket);
impl_packet_from!(PingRequestV5, v5::PingRequestPacket);
impl_packet_from!(PingResponseV5, v5::PingResponsePacket);
impl_packet_from!(DisconnectV5, v5::DisconnectPacket);
impl_packet_from!(AuthV5, v5::AuthPacket);

macro_rules! for_each_packet {
    ($self:expr, $packet:ident => $body:expr) => {
        match $self {
            PacketVariant::ConnectV3($packet) => $body,
            PacketVariant::ConnectAckV3($packet) => $body,
            PacketVariant::PublishV3($packet) => $body,
            PacketVariant::PublishAckV3($packet) => $body,
            PacketVariant::PublishReceivedV3($packet) => $body,
            PacketVariant::PublishReleaseV3($packet) => $body,
            PacketVariant::PublishCompleteV3($packet) => $body,
            PacketVariant::SubscribeV3($packet) => $body,
            PacketVariant::SubscribeAckV3($packet) => $body,
            PacketVariant::UnsubscribeV3($packet) => $body,
            PacketVariant::UnsubscribeAckV3($packet) => $body,
            PacketVariant::PingRequestV3($packet) => $body,
            PacketVariant::PingResponseV3($packet) => $body,
            PacketVariant::DisconnectV3($packet) => $body,
            PacketVariant::ConnectV5($packet) => $body,
            PacketVariant::ConnectAckV5($packet) => $body,
            PacketVariant::PublishV5($packet) => $body,
            PacketVariant::PublishAckV5($packet) => $body,
            PacketVariant::PublishReceivedV5($packet) => $body,
            PacketVariant::PublishReleaseV5($packet) => $body,
            PacketVariant::PublishCompleteV5($packet) => $body,
            PacketVariant::SubscribeV5($packet) => $body,
            PacketVariant::SubscribeAckV5($packet) => $body,
            PacketVariant::UnsubscribeV5($packet) => $body,
            PacketVariant::UnsubscribeAckV5($packet) => $body,
            PacketVariant::PingRequestV5($packet) => $body,
            PacketVariant::PingResponseV5($packet) => $body,
            PacketVariant::DisconnectV5($packet) => $body,
            PacketVariant::AuthV5($packet) => $body,
        }
    };
}

impl PacketVariant {
    /// Get type of the inner packet.
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        for_each_packet!(self, packet => packet.packet_type())
    }

    /// Get protocol version of the inner packet.
    #[must_use]
    pub const fn protocol_version(&self) -> ProtocolVersion {
        match self {
            Self::ConnectV3(..)
            | Self::ConnectAckV3(..)
            | Self::PublishV3(..)
            | Self::PublishAckV3(..)
            | Self::PublishReceivedV3(..)
            | Self::PublishReleaseV3(..)
            | Self::PublishCompleteV3(..)
            | Self::SubscribeV3(..)
            | Self::SubscribeAckV3(..)
            | Self::UnsubscribeV3(..)
            | Self::UnsubscribeAckV3(..)
            | Self::PingRequestV3(..)
            | Self::PingResponseV3(..)
            | Self::DisconnectV3(..) => ProtocolVersion::V3_1_1,
            _ => ProtocolVersion::V5_0,
        }
    }

    /// Get total encoded byte length of the inner packet.
    ///
    /// # Errors
    ///
    /// Returns error if packet size exceeds the wire-format limit.
    pub fn bytes(&self) -> Result<usize, VarIntError> {
        for_each_packet!(self, packet => packet.bytes())
    }

    /// Get packet identifier carried by the inner packet, if any.
    ///
    /// Publish packets with `QoS` 0 carry no identifier.
    #[must_use]
    pub fn packet_id(&self) -> Option<PacketId> {
        match self {
            Self::PublishV3(p) => (p.qos() != QoS::AtMostOnce).then(|| p.packet_id()),
            Self::PublishV5(p) => (p.qos() != QoS::AtMostOnce).then(|| p.packet_id()),
            Self::PublishAckV3(p) => Some(p.packet_id()),
            Self::PublishAckV5(p) => Some(p.packet_id()),
            Self::PublishReceivedV3(p) => Some(p.packet_id()),
            Self::PublishReceivedV5(p) => Some(p.packet_id()),
            Self::PublishReleaseV3(p) => Some(p.packet_id()),
            Self::PublishReleaseV5(p) => Some(p.packet_id()),
            Self::PublishCompleteV3(p) => Some(p.packet_id()),
            Self::PublishCompleteV5(p) => Some(p.packet_id()),
            Self::SubscribeV3(p) => Some(p.packet_id()),
            Self::SubscribeV5(p) => Some(p.packet_id()),
            Self::SubscribeAckV3(p) => Some(p.packet_id()),
            Self::SubscribeAckV5(p) => Some(p.packet_id()),
            Self::UnsubscribeV3(p) => Some(p.packet_id()),
            Self::UnsubscribeV5(p) => Some(p.packet_id()),
            Self::UnsubscribeAckV3(p) => Some(p.packet_id()),
            Self::UnsubscribeAckV5(p) => Some(p.packet_id()),
            _ => None,
        }
    }

    /// Encode the inner packet into byte chunks suitable for gathered
    /// writes. Publish payload chunks are shared, not copied.
    ///
    /// # Errors
    ///
    /// Returns error if packet data is invalid.
    pub fn to_chunks(&self) -> Result<Vec<Bytes>, EncodeError> {
        match self {
            Self::PublishV3(p) => p.encode_chunks(),
            Self::PublishV5(p) => p.encode_chunks(),
            _ => {
                let mut buf = Vec::new();
                for_each_packet!(self, packet => packet.encode(&mut buf).map(drop))?;
                Ok(vec![Bytes::from(buf)])
            }
        }
    }

    /// Decode one framed packet with known protocol `version`.
    ///
    /// # Errors
    ///
    /// Returns error if the frame is malformed, or the packet type is not
    /// valid in `version`.
    pub fn decode(ba: &mut ByteArray, version: ProtocolVersion) -> Result<Self, DecodeError> {
        let first_byte = ba.read_byte()?;
        ba.reset_offset();
        let packet_type = PacketType::try_from(first_byte)?;

        match version {
            ProtocolVersion::V3_1_1 => Self::decode_v3(ba, packet_type),
            ProtocolVersion::V5_0 => Self::decode_v5(ba, packet_type),
            ProtocolVersion::Undetermined => Err(DecodeError::InvalidProtocolLevel),
        }
    }

    fn decode_v3(ba: &mut ByteArray, packet_type: PacketType) -> Result<Self, DecodeError> {
        match packet_type {
            PacketType::Connect => Ok(v3::ConnectPacket::decode(ba)?.into()),
            PacketType::ConnectAck => Ok(v3::ConnectAckPacket::decode(ba)?.into()),
            PacketType::Publish { .. } => Ok(v3::PublishPacket::decode(ba)?.into()),
            PacketType::PublishAck => Ok(v3::PublishAckPacket::decode(ba)?.into()),
            PacketType::PublishReceived => Ok(v3::PublishReceivedPacket::decode(ba)?.into()),
            PacketType::PublishRelease => Ok(v3::PublishReleasePacket::decode(ba)?.into()),
            PacketType::PublishComplete => Ok(v3::PublishCompletePacket::decode(ba)?.into()),
            PacketType::Subscribe => Ok(v3::SubscribePacket::decode(ba)?.into()),
            PacketType::SubscribeAck => Ok(v3::SubscribeAckPacket::decode(ba)?.into()),
            PacketType::Unsubscribe => Ok(v3::UnsubscribePacket::decode(ba)?.into()),
            PacketType::UnsubscribeAck => Ok(v3::UnsubscribeAckPacket::decode(ba)?.into()),
            PacketType::PingRequest => Ok(v3::PingRequestPacket::decode(ba)?.into()),
            PacketType::PingResponse => Ok(v3::PingResponsePacket::decode(ba)?.into()),
            PacketType::Disconnect => Ok(v3::DisconnectPacket::decode(ba)?.into()),
            // The Auth packet is only available in MQTT 5.0.
            PacketType::Auth => Err(DecodeError::InvalidPacketType),
        }
    }

    fn decode_v5(ba: &mut ByteArray, packet_type: PacketType) -> Result<Self, DecodeError> {
        match packet_type {
            PacketType::Connect => Ok(v5::ConnectPacket::decode(ba)?.into()),
            PacketType::ConnectAck => Ok(v5::ConnectAckPacket::decode(ba)?.into()),
            PacketType::Publish { .. } => Ok(v5::PublishPacket::decode(ba)?.into()),
            PacketType::PublishAck => Ok(v5::PublishAckPacket::decode(ba)?.into()),
            PacketType::PublishReceived => Ok(v5::PublishReceivedPacket::decode(ba)?.into()),
            PacketType::PublishRelease => Ok(v5::PublishReleasePacket::decode(ba)?.into()),
            PacketType::PublishComplete => Ok(v5::PublishCompletePacket::decode(ba)?.into()),
            PacketType::Subscribe => Ok(v5::SubscribePacket::decode(ba)?.into()),
            PacketType::SubscribeAck => Ok(v5::SubscribeAckPacket::decode(ba)?.into()),
            PacketType::Unsubscribe => Ok(v5::UnsubscribePacket::decode(ba)?.into()),
            PacketType::UnsubscribeAck => Ok(v5::UnsubscribeAckPacket::decode(ba)?.into()),
            PacketType::PingRequest => Ok(v5::PingRequestPacket::decode(ba)?.into()),
            PacketType::PingResponse => Ok(v5::PingResponsePacket::decode(ba)?.into()),
            PacketType::Disconnect => Ok(v5::DisconnectPacket::decode(ba)?.into()),
            PacketType::Auth => Ok(v5::AuthPacket::decode(ba)?.into()),
        }
    }
}

/// Read the protocol level byte out of a framed CONNECT packet without
/// consuming the frame.
///
/// A server endpoint learns the session version this way before running the
/// full packet decoder.
///
/// # Errors
///
/// Returns error if the frame is not a well-formed CONNECT prefix.
pub fn sniff_connect_version(frame: &[u8]) -> Result<ProtocolVersion, DecodeError> {
    let mut ba = ByteArray::new(frame);
    let fixed_header = crate::FixedHeader::decode(&mut ba)?;
    if fixed_header.packet_type() != PacketType::Connect {
        return Err(DecodeError::InvalidPacketType);
    }
    let protocol_name = StringData::decode(&mut ba)?;
    if protocol_name.as_ref() != PROTOCOL_NAME {
        return Err(DecodeError::InvalidProtocolName);
    }
    ProtocolVersion::try_from(ba.read_byte()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_dispatch() {
        let mut buf = Vec::new();
        let packet = v3::PublishAckPacket::new(PacketId::new(5));
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = PacketVariant::decode(&mut ba, ProtocolVersion::V3_1_1).unwrap();
        assert_eq!(decoded, PacketVariant::PublishAckV3(packet));
        assert_eq!(decoded.packet_id(), Some(PacketId::new(5)));
    }

    #[test]
    fn test_decode_rejects_auth_in_v3() {
        let mut buf = Vec::new();
        v5::AuthPacket::new().encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            PacketVariant::decode(&mut ba, ProtocolVersion::V3_1_1),
            Err(DecodeError::InvalidPacketType)
        );
    }

    #[test]
    fn test_sniff_connect_version() {
        let mut buf = Vec::new();
        let packet = v5::ConnectPacket::new("c1").unwrap();
        packet.encode(&mut buf).unwrap();
        assert_eq!(
            sniff_connect_version(&buf).unwrap(),
            ProtocolVersion::V5_0
        );
    }
}
