// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::property::check_property_type_list;
use super::{Properties, Property, PropertyType};
use crate::var_int::VarIntError;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType, Payload, PubTopic, QoS, U16Data,
};

/// Properties available in publish packets.
pub const PUBLISH_PROPERTIES: &[PropertyType] = &[
    // A Server MUST send the Payload Format Indicator unaltered to all
    // subscribers receiving the Application Message [MQTT-3.3.2-4].
    PropertyType::PayloadFormatIndicator,
    PropertyType::MessageExpiryInterval,
    PropertyType::TopicAlias,
    PropertyType::ResponseTopic,
    PropertyType::CorrelationData,
    PropertyType::UserProperty,
    // A PUBLISH packet sent from a Client to a Server MUST NOT contain a
    // Subscription Identifier [MQTT-3.3.4-6]. Multiple Subscription
    // Identifiers will be included if the publication is the result of a
    // match to more than one subscription [MQTT-3.3.4-4].
    PropertyType::SubscriptionIdentifier,
    PropertyType::ContentType,
];

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
/// | Properties ...        |
/// +-----------------------+
/// | Msg payload ...       |
/// +-----------------------+
/// ```
///
/// Note that `packet_id` only appears in `QoS` 1 and `QoS` 2 packets, and
/// that the topic name may be empty when a topic alias property is carried
/// instead.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishPacket {
    /// The DUP flag MUST be set to 1 by the Client or Server when it
    /// attempts to re-deliver a PUBLISH packet [MQTT-3.3.1-1], and MUST be
    /// set to 0 for all `QoS` 0 messages [MQTT-3.3.1-2].
    dup: bool,

    /// This field indicates the level of assurance for delivery of the
    /// application message.
    qos: QoS,

    /// If the RETAIN flag is set to 1 in a PUBLISH packet sent by a Client
    /// to a Server, the Server MUST replace any existing retained message
    /// for this topic with the Application Message [MQTT-3.3.1-5].
    retain: bool,

    /// To reduce the size of the PUBLISH packet the sender can use a Topic
    /// Alias; it is a Protocol Error if the Topic Name is zero length and
    /// there is no Topic Alias.
    topic: PubTopic,

    /// The Packet Identifier field is only present in PUBLISH packets where
    /// the `QoS` level is 1 or 2.
    packet_id: PacketId,

    properties: Properties,

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
        Ok(Self {
            qos,
            dup: false,
            retain: false,
            topic,
            packet_id: PacketId::new(0),
            properties: Properties::new(),
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
        Ok(Self {
            qos,
            dup: false,
            retain: false,
            topic,
            packet_id: PacketId::new(0),
            properties: Properties::new(),
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
    pub fn set_packet_id(&mut self, packet_id: PacketId) -> &mut Self {
        self.packet_id = packet_id;
        self
    }

    /// Get current packet id.
    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    /// Update topic. An empty topic is allowed when a topic alias property
    /// is attached.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is invalid.
    pub fn set_topic(&mut self, topic: &str) -> Result<&mut Self, EncodeError> {
        self.topic = if topic.is_empty() {
            PubTopic::empty()
        } else {
            PubTopic::new(topic)?
        };
        Ok(self)
    }

    /// Get current topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.topic.as_ref()
    }

    /// Get topic alias property value, if present.
    #[must_use]
    pub fn topic_alias(&self) -> Option<u16> {
        self.properties.topic_alias()
    }

    /// Replace the topic alias property with `alias`.
    pub fn set_topic_alias(&mut self, alias: u16) -> &mut Self {
        self.properties.remove(PropertyType::TopicAlias);
        self.properties
            .push(Property::TopicAlias(U16Data::new(alias)));
        self
    }

    /// Get a mutable reference to property list.
    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    /// Get a reference to property list.
    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
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
        let mut remaining_length =
            self.topic.bytes() + self.properties.bytes() + self.msg.len();
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
    /// The first chunk holds fixed header, topic, packet id and properties;
    /// payload chunks follow, shared instead of copied.
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
        self.properties.encode(&mut header)?;

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

        let variable_header_start = ba.offset();
        let topic = PubTopic::decode(ba)?;

        let packet_id = if qos == QoS::AtMostOnce {
            PacketId::new(0)
        } else {
            let packet_id = PacketId::decode(ba)?;
            if packet_id.value() == 0 {
                return Err(DecodeError::InvalidPacketId);
            }
            packet_id
        };

        let properties = Properties::decode(ba)?;
        if let Err(property_type) = check_property_type_list(properties.props(), PUBLISH_PROPERTIES)
        {
            log::error!(
                "v5/PublishPacket: property type {property_type:?} cannot be used in properties!"
            );
            return Err(DecodeError::InvalidPropertyType);
        }

        // It is valid for a PUBLISH packet to contain a zero length payload.
        let header_bytes = ba.offset() - variable_header_start;
        if fixed_header.remaining_length() < header_bytes {
            return Err(DecodeError::InvalidRemainingLength);
        }
        let msg_len = fixed_header.remaining_length() - header_bytes;

        let msg = Payload::from_bytes(ba.read_bytes_shared(msg_len)?);
        Ok(Self {
            dup,
            qos,
            retain,
            topic,
            packet_id,
            properties,
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
    fn test_round_trip() {
        let mut packet = PublishPacket::new("sensor/1", QoS::AtLeastOnce, b"21.5").unwrap();
        packet.set_packet_id(PacketId::new(3));
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.message().to_vec(), b"21.5");
    }

    #[test]
    fn test_round_trip_with_alias() {
        let mut packet = PublishPacket::new("", QoS::AtMostOnce, b"x").unwrap();
        packet.set_topic_alias(2);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded.topic_alias(), Some(2));
        assert!(decoded.topic().is_empty());
    }

    #[test]
    fn test_encode_chunks_shares_payload() {
        let payload = Payload::from_bytes(Bytes::from_static(b"shared-data"));
        let packet = PublishPacket::with_payload("t", QoS::AtMostOnce, payload).unwrap();
        let chunks = packet.encode_chunks().unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].as_ref(), b"shared-data");
    }
}
