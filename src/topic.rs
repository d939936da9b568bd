// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::validate_utf8_string;
use crate::{ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, StringData};

/// Topic name used in publish packets.
///
/// The Topic Name in a PUBLISH packet MUST NOT contain wildcard
/// characters [MQTT-3.3.2-2].
///
/// An empty topic name is accepted on the wire because a v5 PUBLISH may
/// replace the topic with a topic alias; resolving the alias is the
/// receiver's duty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PubTopic(String);

impl PubTopic {
    /// Create a new topic name from string slice.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` contains wildcard characters or forbidden
    /// code points.
    pub fn new(topic: &str) -> Result<Self, EncodeError> {
        validate_pub_topic(topic).map_err(|_err| EncodeError::InvalidTopicName)?;
        Ok(Self(topic.to_string()))
    }

    /// Create an empty topic name, to be substituted by a topic alias.
    #[must_use]
    pub const fn empty() -> Self {
        Self(String::new())
    }

    /// Get byte length in packet.
    #[must_use]
    pub fn bytes(&self) -> usize {
        2 + self.0.len()
    }

    /// Returns true if topic name is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PubTopic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PubTopic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl DecodePacket for PubTopic {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let s = StringData::decode(ba)?;
        validate_pub_topic(s.as_ref())?;
        Ok(Self(s.as_ref().to_string()))
    }
}

impl EncodePacket for PubTopic {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let data = StringData::from(&self.0)?;
        data.encode(buf)
    }
}

/// Topic filter used in subscribe packets.
///
/// A filter may contain the multi-level wildcard `#` as its last level and
/// the single-level wildcard `+` at any level.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubTopic(String);

impl SubTopic {
    /// Create a new topic filter from string slice.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` violates wildcard placement rules.
    pub fn new(topic: &str) -> Result<Self, EncodeError> {
        validate_sub_topic(topic).map_err(|_err| EncodeError::InvalidTopicName)?;
        Ok(Self(topic.to_string()))
    }

    /// Get byte length in packet.
    #[must_use]
    pub fn bytes(&self) -> usize {
        2 + self.0.len()
    }

    /// Returns true if topic filter matches `topic_name`, applying the
    /// wildcard rules of the protocol.
    #[must_use]
    pub fn is_match(&self, topic_name: &str) -> bool {
        // Topics starting with `$` match only literal filters.
        if topic_name.starts_with('$') && (self.0.starts_with('+') || self.0.starts_with('#')) {
            return false;
        }

        let mut filter_parts = self.0.split('/');
        let mut name_parts = topic_name.split('/');
        loop {
            match (filter_parts.next(), name_parts.next()) {
                (None, None) => return true,
                (Some("#"), _) => return true,
                (Some("+"), Some(_)) => {}
                (Some(filter_part), Some(name_part)) => {
                    if filter_part != name_part {
                        return false;
                    }
                }
                (Some(_), None) | (None, Some(_)) => return false,
            }
        }
    }
}

impl fmt::Display for SubTopic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SubTopic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl DecodePacket for SubTopic {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let s = StringData::decode(ba)?;
        validate_sub_topic(s.as_ref())?;
        Ok(Self(s.as_ref().to_string()))
    }
}

impl EncodePacket for SubTopic {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let data = StringData::from(&self.0)?;
        data.encode(buf)
    }
}

/// Check that `topic` is a valid publish topic name.
///
/// # Errors
///
/// Returns error if `topic` contains wildcard characters or forbidden
/// code points.
pub fn validate_pub_topic(topic: &str) -> Result<(), DecodeError> {
    validate_utf8_string(topic).map_err(|_err| DecodeError::InvalidString)?;
    if topic.contains(['#', '+']) {
        return Err(DecodeError::InvalidTopicName);
    }
    Ok(())
}

/// Check that `topic` is a valid subscribe topic filter.
///
/// All Topic Names and Topic Filters MUST be at least one character
/// long [MQTT-4.7.3-1].
///
/// The multi-level wildcard character MUST be specified either on its own or
/// following a topic level separator. In either case it MUST be the last
/// character specified in the Topic Filter [MQTT-4.7.1-2].
///
/// The single-level wildcard MUST occupy an entire level of the
/// filter [MQTT-4.7.1-3].
///
/// # Errors
///
/// Returns error if `topic` violates these rules.
pub fn validate_sub_topic(topic: &str) -> Result<(), DecodeError> {
    validate_utf8_string(topic).map_err(|_err| DecodeError::InvalidString)?;
    if topic.is_empty() {
        return Err(DecodeError::InvalidTopicFilter);
    }

    let parts: Vec<&str> = topic.split('/').collect();
    let last_index = parts.len() - 1;
    for (index, part) in parts.iter().enumerate() {
        if part.contains('#') {
            if *part != "#" || index != last_index {
                return Err(DecodeError::InvalidTopicFilter);
            }
        } else if part.contains('+') && *part != "+" {
            return Err(DecodeError::InvalidTopicFilter);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pub_topic() {
        assert!(validate_pub_topic("sensor/1/temperature").is_ok());
        assert!(validate_pub_topic("sensor/+/temperature").is_err());
        assert!(validate_pub_topic("sensor/#").is_err());
    }

    #[test]
    fn test_validate_sub_topic() {
        assert!(validate_sub_topic("sensor/1/temperature").is_ok());
        assert!(validate_sub_topic("sensor/+/temperature").is_ok());
        assert!(validate_sub_topic("sensor/#").is_ok());
        assert!(validate_sub_topic("#").is_ok());
        assert!(validate_sub_topic("sensor/#/temperature").is_err());
        assert!(validate_sub_topic("sensor/temp+").is_err());
        assert!(validate_sub_topic("").is_err());
    }

    #[test]
    fn test_sub_topic_match() {
        let filter = SubTopic::new("sensor/+/temperature").unwrap();
        assert!(filter.is_match("sensor/1/temperature"));
        assert!(!filter.is_match("sensor/1/humidity"));
        assert!(!filter.is_match("sensor/temperature"));

        let filter = SubTopic::new("sensor/#").unwrap();
        assert!(filter.is_match("sensor/1/temperature"));
        assert!(filter.is_match("sensor"));

        let filter = SubTopic::new("#").unwrap();
        assert!(!filter.is_match("$SYS/uptime"));
    }
}
