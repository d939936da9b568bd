// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use byteorder::{BigEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

use crate::var_int::VarIntError;
use crate::{ByteArray, DecodeError, EncodeError, PacketType};

/// Protocol name is fixed in specification.
pub const PROTOCOL_NAME: &str = "MQTT";

/// Common surface of every control packet struct.
pub trait Packet: Send + fmt::Debug {
    /// Get type of this packet.
    fn packet_type(&self) -> PacketType;

    /// Get total byte length in packet, fixed header included.
    ///
    /// # Errors
    ///
    /// Returns error if packet size exceeds the wire-format limit.
    fn bytes(&self) -> Result<usize, VarIntError>;
}

/// Parse object from a byte stream cursor.
pub trait DecodePacket: Sized {
    /// Decode object from byte array.
    ///
    /// # Errors
    ///
    /// Returns error if byte array is exhausted or data is malformed.
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError>;
}

/// Serialize object to a byte buffer.
pub trait EncodePacket {
    /// Encode object into byte buffer, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns error if object contains invalid data.
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError>;
}

/// Which side of the connection this endpoint plays.
///
/// The role decides which packet types may be sent and received;
/// illegal combinations are rejected at `send()` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Connecting endpoint, sends CONNECT.
    Client,

    /// Accepting endpoint, sends CONNACK.
    Server,

    /// Both directions allowed, for broker-to-broker links and tests.
    Any,
}

impl Role {
    /// Returns true if this role covers the client direction.
    #[must_use]
    #[inline]
    pub const fn is_client(self) -> bool {
        matches!(self, Self::Client | Self::Any)
    }

    /// Returns true if this role covers the server direction.
    #[must_use]
    #[inline]
    pub const fn is_server(self) -> bool {
        matches!(self, Self::Server | Self::Any)
    }
}

/// Quality of service level of publish messages.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QoS {
    /// At most once delivery.
    #[default]
    AtMostOnce = 0,

    /// At least once delivery.
    AtLeastOnce = 1,

    /// Exactly once delivery.
    ExactOnce = 2,
}

impl QoS {
    /// Get byte length used in packet.
    #[must_use]
    #[inline]
    pub const fn bytes() -> usize {
        1
    }
}

impl TryFrom<u8> for QoS {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactOnce),
            _ => Err(DecodeError::InvalidQoS),
        }
    }
}

impl DecodePacket for QoS {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let byte = ba.read_byte()?;
        Self::try_from(byte)
    }
}

impl EncodePacket for QoS {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(*self as u8);
        Ok(Self::bytes())
    }
}

/// Packet identifier of `QoS` 1/2 publish flows and of subscribe requests.
///
/// Non-zero in every packet that carries it; each time a Client sends a new
/// SUBSCRIBE, UNSUBSCRIBE, or PUBLISH (where `QoS` > 0) MQTT Control Packet
/// it MUST assign it a non-zero Packet Identifier that is currently
/// unused [MQTT-2.2.1-3].
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PacketId(u16);

impl PacketId {
    /// Create a new packet id object.
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Get inner u16 value.
    #[must_use]
    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Get byte length used in packet.
    #[must_use]
    #[inline]
    pub const fn bytes() -> usize {
        2
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for PacketId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl DecodePacket for PacketId {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let value = ba.read_u16()?;
        Ok(Self(value))
    }
}

impl EncodePacket for PacketId {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.write_u16::<BigEndian>(self.0)?;
        Ok(Self::bytes())
    }
}
