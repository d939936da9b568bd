// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

use crate::{DecodeError, EncodeError, EncodePacket};

/// Protocol version of a connection.
///
/// A client endpoint fixes its version at construction; a server endpoint
/// starts as `Undetermined` and learns the version from the first CONNECT
/// packet it receives.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// Version is not known yet.
    #[default]
    Undetermined,

    /// MQTT 3.1.1, protocol level byte 4.
    V3_1_1,

    /// MQTT 5.0, protocol level byte 5.
    V5_0,
}

impl ProtocolVersion {
    /// Get byte length used in packet.
    #[must_use]
    #[inline]
    pub const fn bytes() -> usize {
        1
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Undetermined => write!(f, "undetermined"),
            Self::V3_1_1 => write!(f, "v3.1.1"),
            Self::V5_0 => write!(f, "v5.0"),
        }
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            4 => Ok(Self::V3_1_1),
            5 => Ok(Self::V5_0),
            _ => Err(DecodeError::InvalidProtocolLevel),
        }
    }
}

impl EncodePacket for ProtocolVersion {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let byte = match self {
            Self::Undetermined => return Err(EncodeError::InvalidData),
            Self::V3_1_1 => 4,
            Self::V5_0 => 5,
        };
        buf.push(byte);
        Ok(Self::bytes())
    }
}
