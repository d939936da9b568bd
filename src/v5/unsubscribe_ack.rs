// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use super::property::check_property_type_list;
use super::{Properties, PropertyType, ReasonCode};
use crate::var_int::VarIntError;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType,
};

/// Reason codes available in unsubscribe ack packet, one per topic filter of
/// the unsubscribe request, in the same order.
pub const UNSUBSCRIBE_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::NoSubscriptionExisted,
    ReasonCode::UnspecifiedError,
    ReasonCode::ImplementationSpecificError,
    ReasonCode::NotAuthorized,
    ReasonCode::TopicFilterInvalid,
    ReasonCode::PacketIdentifierInUse,
];

/// Properties available in unsubscribe ack packet.
pub const UNSUBSCRIBE_ACK_PROPERTIES: &[PropertyType] = &[
    PropertyType::ReasonString,
    PropertyType::UserProperty,
];

/// `UnsubscribeAckPacket` is sent by the Server to the Client to confirm
/// receipt of an `UnsubscribePacket`.
///
/// Basic structure of the packet:
/// ```txt
///  7                     0
/// +-----------------------+
/// | Fixed header          |
/// |                       |
/// +-----------------------+
/// | Packet id             |
/// |                       |
/// +-----------------------+
/// | Properties ...        |
/// +-----------------------+
/// | Reason code 0         |
/// +-----------------------+
/// | ...                   |
/// +-----------------------+
/// ```
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsubscribeAckPacket {
    packet_id: PacketId,
    properties: Properties,
    reasons: Vec<ReasonCode>,
}

impl UnsubscribeAckPacket {
    /// Create a new unsubscribe ack packet with a single reason code.
    #[must_use]
    pub fn new(packet_id: PacketId, reason: ReasonCode) -> Self {
        Self {
            packet_id,
            properties: Properties::new(),
            reasons: vec![reason],
        }
    }

    /// Create a new unsubscribe ack packet with a list of reason codes.
    #[must_use]
    pub fn with_reasons(packet_id: PacketId, reasons: Vec<ReasonCode>) -> Self {
        Self {
            packet_id,
            properties: Properties::new(),
            reasons,
        }
    }

    /// Get current packet id.
    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
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

    /// Get a reference to the reason code list.
    #[must_use]
    pub fn reasons(&self) -> &[ReasonCode] {
        &self.reasons
    }
}

impl EncodePacket for UnsubscribeAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let remaining_length = PacketId::bytes()
            + self.properties.bytes()
            + ReasonCode::bytes() * self.reasons.len();
        let fixed_header = FixedHeader::new(PacketType::UnsubscribeAck, remaining_length)?;
        fixed_header.encode(buf)?;
        self.packet_id.encode(buf)?;
        self.properties.encode(buf)?;
        for reason in &self.reasons {
            reason.encode(buf)?;
        }

        Ok(buf.len() - old_len)
    }
}

impl DecodePacket for UnsubscribeAckPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::UnsubscribeAck {
            return Err(DecodeError::InvalidPacketType);
        }

        let start_offset = ba.offset();
        let packet_id = PacketId::decode(ba)?;

        let properties = Properties::decode(ba)?;
        if let Err(property_type) =
            check_property_type_list(properties.props(), UNSUBSCRIBE_ACK_PROPERTIES)
        {
            log::error!(
                "v5/UnsubscribeAckPacket: property type {property_type:?} cannot be used in properties!"
            );
            return Err(DecodeError::InvalidPropertyType);
        }

        let header_bytes = ba.offset() - start_offset;
        if fixed_header.remaining_length() <= header_bytes {
            return Err(DecodeError::InvalidRemainingLength);
        }
        let reason_count = fixed_header.remaining_length() - header_bytes;
        let mut reasons = Vec::with_capacity(reason_count);
        for _ in 0..reason_count {
            let reason = ReasonCode::decode(ba)?;
            if !UNSUBSCRIBE_REASONS.contains(&reason) {
                log::error!("v5/UnsubscribeAckPacket: Invalid reason code: {reason:?}");
                return Err(DecodeError::InvalidReasonCode);
            }
            reasons.push(reason);
        }

        Ok(Self {
            packet_id,
            properties,
            reasons,
        })
    }
}

impl Packet for UnsubscribeAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::UnsubscribeAck
    }

    fn bytes(&self) -> Result<usize, VarIntError> {
        let remaining_length = PacketId::bytes()
            + self.properties.bytes()
            + ReasonCode::bytes() * self.reasons.len();
        let fixed_header = FixedHeader::new(PacketType::UnsubscribeAck, remaining_length)?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let packet = UnsubscribeAckPacket::new(PacketId::new(13), ReasonCode::Success);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf, &[0xb0, 0x04, 0x00, 0x0d, 0x00, 0x00]);

        let mut ba = ByteArray::new(&buf);
        let decoded = UnsubscribeAckPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
    }
}
