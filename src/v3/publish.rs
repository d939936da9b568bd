// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::var_int::VarIntError;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType, Payload, PubTopic, QoS,
};

/// `PublishPacket` is used to transport application messages from the Client
/// to the Server, or from the Server to the Client.
///
/// Basic structure of packet:
///
/// ```txt
///  7                     0
/// +-----------------------+
/// | Fixed header          |
/// |                       |
/// +-----------------------+
/// | Topic name length     |
/// |                       |
/// +-----------------------+
/// | Topic name ...        |
/// +-----------------------+
/// | Packet Identifier     |
/// |                       |
/// +-----------------------+
/// | Msg payload ...       |
/// +-----------------------+
/// ```
///
/// Note that `packet_id` only appears in `QoS` 1 and `QoS` 2 packets.
///
/// Response of `PublishPacket`:
/// * `QoS` 0, no response
/// * `QoS` 1, `PublishAckPacket`
/// * `QoS` 2, `PublishReceivedPacket`
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishPacket {
    /// If dup field is false, it indicates that this is the first occasion
    /// the packet is sent. If it is true, this packet might be re-delivery of
    /// an earlier attempt.
    ///
    /// The DUP flag MUST be set to 0 for all `QoS` 0 messages [MQTT-3.3.1-2].
    dup: bool,

    /// `qos` field indicates the level of assurance for delivery of the packet.
    qos: QoS,

    /// If `retain` flag is true in the packet the Client sent to the Server,
    /// the packet is stored on the server so that it can be delivered to
    /// future subscribers of its topic.
    retain: bool,

    /// `topic` name must not contain wildcard characters.
    topic: PubTopic,

    /// `packet_id` field is only present if `QoS` is 1 or 2.
    packet_id: PacketId,

    /// Application message carried in payload, kept as shared byte chunks.
    msg: Payload,
}

impl PublishPacket {
    /// Create a new publish packet, copying `msg` into the payload.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is invalid.
    pub fn new(topic: &str, qos: QoS, msg: &[u8]) -> Result<Self, EncodeError> {
        let topic = PubTopic::new(topic)?;
        if topic.is_empty() {
            return Err(EncodeError::InvalidTopicName);
        }
        Ok(Self {
            qos,
            dup: false,
            retain: false,
            topic,
            packet_id: PacketId::new(0),
            msg: Payload::from_slice(msg),
        })
    }

    /// Create a new publish packet around a shared payload chunk,
    /// without copying it.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is invalid.
    pub fn with_payload(topic: &str, qos: QoS, msg: Payload) -> Result<Self, EncodeError> {
        let topic = PubTopic::new(topic)?;
        if topic.is_empty() {
            return Err(EncodeError::InvalidTopicName);
        }
        Ok(Self {
            qos,
            dup: false,
            retain: false,
            topic,
            packet_id: PacketId::new(0),
            msg,
        })
    }

    /// Update `retain` flag.
    pub fn set_retain(&mut self, retain: bool) -> &mut Self {
        self.retain = retain;
        self
    }

    /// Get current `retain` flag.
    #[must_use]
    pub const fn retain(&self) -> bool {
        self.retain
    }

    /// Update `dup` flag.
    ///
    /// # Errors
    ///
    /// Returns error if `dup` is set in `QoS` 0 packet.
    pub fn set_dup(&mut self, dup: bool) -> Result<&mut Self, EncodeError> {
        // The DUP flag MUST be set to 0 for all QoS 0 messages [MQTT-3.3.1-2].
        if dup && self.qos == QoS::AtMostOnce {
            return Err(EncodeError::InvalidPacketType);
        }
        self.dup = dup;
        Ok(self)
    }

    /// Get current `dup` flag.
    #[must_use]
    pub const fn dup(&self) -> bool {
        self.dup
    }

    /// Update `QoS` value.
    pub fn set_qos(&mut self, qos: QoS) -> &mut Self {
        if qos == QoS::AtMostOnce {
            self.packet_id = PacketId::new(0);
            self.dup = false;
        }
        self.qos = qos;
        self
    }

    /// Get current `QoS`.
    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    /// Update packet id.
    ///
    /// The Packet Identifier field is only present in PUBLISH Packets where
    /// the `QoS` level is 1 or 2.
    pub fn set_packet_id(&mut self, packet_id: PacketId) -> &mut Self {
        self.packet_id = packet_id;
        self
    }

    /// Get current packet id.
    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    /// Update topic.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is invalid.
    pub fn set_topic(&mut self, topic: &str) -> Result<&mut Self, EncodeError> {
        self.topic = PubTopic::new(topic)?;
        Ok(self)
    }

    /// Get current topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.topic.as_ref()
    }

    /// Get a reference to the message payload.
    #[must_use]
    pub const fn message(&self) -> &Payload {
        &self.msg
    }

    /// Append a shared chunk to the message payload without copying.
    pub fn append_chunk(&mut self, chunk: Bytes) {
        self.msg.push_chunk(chunk);
    }

    fn get_fixed_header(&self) -> Result<FixedHeader, VarIntError> {
        let mut remaining_length = self.topic.bytes() + self.msg.len();
        if self.qos != QoS::AtMostOnce {
            remaining_length += PacketId::bytes();
        }

        let packet_type = PacketType::Publish {
            dup: self.dup,
            retain: self.retain,
            qos: self.qos,
        };
        FixedHeader::new(packet_type, remaining_length)
    }

    /// Encode this packet into chunks suitable for gathered writes.
    ///
    /// The first chunk holds fixed header, topic and packet id; payload
    /// chunks follow, shared instead of copied.
    ///
    /// # Errors
    ///
    /// Returns error if packet data is invalid.
    pub fn encode_chunks(&self) -> Result<Vec<Bytes>, EncodeError> {
        let mut header = Vec::new();
        let fixed_header = self.get_fixed_header()?;
        fixed_header.encode(&mut header)?;
        self.topic.encode(&mut header)?;
        if self.qos != QoS::AtMostOnce {
            self.packet_id.encode(&mut header)?;
        }

        let mut chunks = Vec::with_capacity(1 + self.msg.chunks().len());
        chunks.push(Bytes::from(header));
        chunks.extend(self.msg.chunks().iter().cloned());
        Ok(chunks)
    }
}

impl DecodePacket for PublishPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;

        let (dup, qos, retain) =
            if let PacketType::Publish { dup, qos, retain } = fixed_header.packet_type() {
                (dup, qos, retain)
            } else {
                return Err(DecodeError::InvalidPacketType);
            };

        // The DUP flag MUST be set to 0 for all QoS 0 messages [MQTT-3.3.1-2].
        if dup && qos == QoS::AtMostOnce {
            return Err(DecodeError::InvalidPacketFlags);
        }

        let topic = PubTopic::decode(ba)?;
        // The Topic Name MUST be present as the first field in the PUBLISH
        // Packet Variable header [MQTT-3.3.2-1]. There is no topic alias
        // mechanism before v5, so an empty topic name is malformed.
        if topic.is_empty() {
            return Err(DecodeError::InvalidTopicName);
        }

        // The Packet Identifier field is only present in PUBLISH Packets
        // where the QoS level is 1 or 2.
        let packet_id = if qos == QoS::AtMostOnce {
            PacketId::new(0)
        } else {
            let packet_id = PacketId::decode(ba)?;
            // SUBSCRIBE, UNSUBSCRIBE, and PUBLISH (in cases where QoS > 0)
            // Control Packets MUST contain a non-zero 16-bit Packet
            // Identifier [MQTT-2.3.1-1].
            if packet_id.value() == 0 {
                return Err(DecodeError::InvalidPacketId);
            }
            packet_id
        };

        // It is valid for a PUBLISH Packet to contain a zero length payload.
        if fixed_header.remaining_length() < topic.bytes() {
            return Err(DecodeError::InvalidRemainingLength);
        }
        let mut msg_len = fixed_header.remaining_length() - topic.bytes();
        if qos != QoS::AtMostOnce {
            if msg_len < PacketId::bytes() {
                return Err(DecodeError::InvalidRemainingLength);
            }
            msg_len -= PacketId::bytes();
        }

        let msg = Payload::from_bytes(ba.read_bytes_shared(msg_len)?);
        Ok(Self {
            dup,
            qos,
            retain,
            topic,
            packet_id,
            msg,
        })
    }
}

impl EncodePacket for PublishPacket {
    fn encode(&self, v: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = v.len();
        for chunk in self.encode_chunks()? {
            v.extend_from_slice(&chunk);
        }
        Ok(v.len() - old_len)
    }
}

impl Packet for PublishPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish {
            dup: self.dup,
            retain: self.retain,
            qos: self.qos,
        }
    }

    fn bytes(&self) -> Result<usize, VarIntError> {
        let fixed_header = self.get_fixed_header()?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_qos0() {
        let packet = PublishPacket::new("hello/world", QoS::AtMostOnce, b"data").unwrap();
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.message().to_vec(), b"data");
    }

    #[test]
    fn test_round_trip_qos1() {
        let mut packet = PublishPacket::new("hello/world", QoS::AtLeastOnce, b"data").unwrap();
        packet.set_packet_id(PacketId::new(17));
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded.packet_id(), PacketId::new(17));
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_decode_rejects_dup_on_qos0() {
        // 0x38 = publish, dup=1, qos=0.
        let buf = [0x38, 0x07, 0x00, 0x01, b't', b'd', b'a', b't', b'a'];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            PublishPacket::decode(&mut ba),
            Err(DecodeError::InvalidPacketFlags)
        );
    }

    #[test]
    fn test_decode_rejects_zero_packet_id() {
        // qos=1 with packet id 0.
        let buf = [0x32, 0x05, 0x00, 0x01, b't', 0x00, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            PublishPacket::decode(&mut ba),
            Err(DecodeError::InvalidPacketId)
        );
    }
}
