// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::{Deserialize, Serialize};

use crate::{ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket};

/// `BoolData` represents a one byte value of either 0 or 1.
///
/// Any other value on the wire is a Protocol Error.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoolData(bool);

impl BoolData {
    /// Create a new `BoolData`.
    #[must_use]
    pub const fn new(value: bool) -> Self {
        Self(value)
    }

    /// Get inner bool value.
    #[must_use]
    pub const fn value(&self) -> bool {
        self.0
    }

    /// Get byte length in packet.
    #[must_use]
    #[inline]
    pub const fn bytes() -> usize {
        1
    }
}

impl From<bool> for BoolData {
    fn from(value: bool) -> Self {
        Self(value)
    }
}

impl DecodePacket for BoolData {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        match ba.read_byte()? {
            0x00 => Ok(Self(false)),
            0x01 => Ok(Self(true)),
            _ => Err(DecodeError::InvalidPropertyValue),
        }
    }
}

impl EncodePacket for BoolData {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(u8::from(self.0));
        Ok(Self::bytes())
    }
}
