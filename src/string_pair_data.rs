// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, StringData};

/// A UTF-8 String Pair consists of two UTF-8 Encoded Strings.
///
/// This data type is used to hold name-value pairs. The first string serves
/// as the name, and the second string contains the value.
///
/// ```text
/// +-------------------+
/// | Name Length       |
/// |                   |
/// +-------------------+
/// | Name ...          |
/// +-------------------+
/// | Value Length      |
/// |                   |
/// +-------------------+
/// | Value ...         |
/// +-------------------+
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StringPairData {
    name: StringData,
    value: StringData,
}

impl StringPairData {
    /// Create a new string pair.
    ///
    /// # Errors
    ///
    /// Returns error if `name` or `value` is an invalid MQTT string.
    pub fn from(name: &str, value: &str) -> Result<Self, EncodeError> {
        let name = StringData::from(name)?;
        let value = StringData::from(value)?;
        Ok(Self { name, value })
    }

    /// Get name part of the pair.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// Get value part of the pair.
    #[must_use]
    pub fn value(&self) -> &str {
        self.value.as_ref()
    }

    /// Get byte length in packet.
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.name.bytes() + self.value.bytes()
    }
}

impl fmt::Display for StringPairData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.name, self.value)
    }
}

impl DecodePacket for StringPairData {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let name = StringData::decode(ba)?;
        let value = StringData::decode(ba)?;
        Ok(Self { name, value })
    }
}

impl EncodePacket for StringPairData {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let name_bytes = self.name.encode(buf)?;
        let value_bytes = self.value.encode(buf)?;
        Ok(name_bytes + value_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let pair = StringPairData::from("region", "cn-north").unwrap();
        let mut buf = Vec::new();
        pair.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = StringPairData::decode(&mut ba).unwrap();
        assert_eq!(decoded, pair);
        assert_eq!(decoded.bytes(), buf.len());
    }
}
