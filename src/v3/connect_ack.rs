// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::var_int::VarIntError;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketType,
};

/// Return code of a connect acknowledgement.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    /// Connection accepted.
    #[default]
    Accepted = 0,

    /// The Server does not support the level of the MQTT protocol requested
    /// by the Client.
    UnacceptedProtocol = 1,

    /// The Client identifier is correct UTF-8 but not allowed by the Server.
    IdentifierRejected = 2,

    /// The Network Connection has been made but the MQTT service is unavailable.
    ServerUnavailable = 3,

    /// The data in the user name or password is malformed.
    MalformedUsernamePassword = 4,

    /// The Client is not authorized to connect.
    Unauthorized = 5,
}

impl ConnectReturnCode {
    /// Get byte length used in packet.
    #[must_use]
    #[inline]
    pub const fn bytes() -> usize {
        1
    }
}

impl TryFrom<u8> for ConnectReturnCode {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Accepted),
            1 => Ok(Self::UnacceptedProtocol),
            2 => Ok(Self::IdentifierRejected),
            3 => Ok(Self::ServerUnavailable),
            4 => Ok(Self::MalformedUsernamePassword),
            5 => Ok(Self::Unauthorized),
            // Values 6-255 are reserved [MQTT-3.2.2.3].
            _ => Err(DecodeError::InvalidReasonCode),
        }
    }
}

/// `ConnectAckPacket` is the packet sent by the Server in response to a
/// `ConnectPacket` received from a Client.
///
/// The first packet sent from the Server to the Client MUST be a CONNACK
/// packet [MQTT-3.2.0-1].
///
/// Basic structure of the packet:
/// ```txt
///  7                     0
/// +-----------------------+
/// | Fixed header          |
/// |                       |
/// +-----------------------+
/// | Ack flags             |
/// +-----------------------+
/// | Return code           |
/// +-----------------------+
/// ```
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnectAckPacket {
    /// If the Server accepts a connection with CleanSession set to 1, the
    /// Server MUST set Session Present to 0 in the CONNACK packet
    /// [MQTT-3.2.2-1].
    ///
    /// If the Server accepts a connection with CleanSession set to 0, the
    /// value set in Session Present depends on whether the Server already has
    /// stored Session State for the supplied client ID.
    session_present: bool,

    return_code: ConnectReturnCode,
}

impl ConnectAckPacket {
    /// Create a new connect ack packet.
    #[must_use]
    pub fn new(session_present: bool, return_code: ConnectReturnCode) -> Self {
        // If a server sends a CONNACK packet containing a non-zero return
        // code it MUST set Session Present to 0 [MQTT-3.2.2-4].
        let session_present = session_present && return_code == ConnectReturnCode::Accepted;
        Self {
            session_present,
            return_code,
        }
    }

    /// Get current session-present flag.
    #[must_use]
    pub const fn session_present(&self) -> bool {
        self.session_present
    }

    /// Get current return code.
    #[must_use]
    pub const fn return_code(&self) -> ConnectReturnCode {
        self.return_code
    }
}

impl EncodePacket for ConnectAckPacket {
    fn encode(&self, v: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = v.len();
        let fixed_header = FixedHeader::new(
            PacketType::ConnectAck,
            1 + ConnectReturnCode::bytes(),
        )?;
        fixed_header.encode(v)?;

        let ack_flags = u8::from(self.session_present);
        v.push(ack_flags);
        v.push(self.return_code as u8);

        Ok(v.len() - old_len)
    }
}

impl DecodePacket for ConnectAckPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::ConnectAck {
            return Err(DecodeError::InvalidPacketType);
        }

        let ack_flags = ba.read_byte()?;
        // Bits 7-1 are reserved and MUST be set to 0 [MQTT-3.2.2-1].
        if ack_flags & 0b1111_1110 != 0b0000_0000 {
            return Err(DecodeError::InvalidPacketFlags);
        }
        let session_present = ack_flags & 0b0000_0001 == 0b0000_0001;
        let return_code = ConnectReturnCode::try_from(ba.read_byte()?)?;

        Ok(Self {
            session_present,
            return_code,
        })
    }
}

impl Packet for ConnectAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::ConnectAck
    }

    fn bytes(&self) -> Result<usize, VarIntError> {
        Ok(2 + 1 + ConnectReturnCode::bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let packet = ConnectAckPacket::new(true, ConnectReturnCode::Accepted);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf, &[0x20, 0x02, 0x01, 0x00]);

        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectAckPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_session_present_cleared_on_failure() {
        let packet = ConnectAckPacket::new(true, ConnectReturnCode::ServerUnavailable);
        assert!(!packet.session_present());
    }
}
