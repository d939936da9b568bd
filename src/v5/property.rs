// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

use crate::utils::validate_client_id;
use crate::{
    BinaryData, BoolData, ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket,
    PubTopic, QoS, StringData, StringPairData, U16Data, U32Data, VarInt,
};

/// Properties which are allowed to appear multiple times in one packet.
///
/// The User Property is allowed to appear multiple times to represent
/// multiple name, value pairs. The Subscription Identifier may appear
/// multiple times only in a PUBLISH packet, when the publication is the
/// result of a match to more than one subscription.
pub const MULTIPLE_PROPERTIES: &[PropertyType] = &[
    PropertyType::UserProperty,
    PropertyType::SubscriptionIdentifier,
];

/// Check that `properties` only contains types from the `types` allow-list
/// and that non-repeatable properties appear at most once.
///
/// # Errors
///
/// Returns the offending property type.
pub fn check_property_type_list(
    properties: &[Property],
    types: &[PropertyType],
) -> Result<(), PropertyType> {
    if properties.is_empty() {
        return Ok(());
    }

    for property in properties {
        if !types.contains(&property.property_type()) {
            return Err(property.property_type());
        }
    }

    for property_type in types {
        let count = properties
            .iter()
            .filter(|p| p.property_type() == *property_type)
            .count();
        if count > 1 && !MULTIPLE_PROPERTIES.contains(property_type) {
            return Err(*property_type);
        }
    }

    Ok(())
}

/// Check that the Subscription Identifier appears at most once.
///
/// Repetition of the Subscription Identifier is valid only in PUBLISH
/// packets; every other location allowing it must call this check.
///
/// # Errors
///
/// Returns the offending property type.
pub fn check_multiple_subscription_identifiers(
    properties: &[Property],
) -> Result<(), PropertyType> {
    let count = properties
        .iter()
        .filter(|p| p.property_type() == PropertyType::SubscriptionIdentifier)
        .count();
    if count > 1 {
        return Err(PropertyType::SubscriptionIdentifier);
    }
    Ok(())
}

/// Property identifier on the wire.
#[allow(clippy::module_name_repetitions)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    PayloadFormatIndicator = 0x01,
    MessageExpiryInterval = 0x02,
    ContentType = 0x03,
    ResponseTopic = 0x08,
    CorrelationData = 0x09,
    SubscriptionIdentifier = 0x0b,
    SessionExpiryInterval = 0x11,
    AssignedClientIdentifier = 0x12,
    ServerKeepAlive = 0x13,
    AuthenticationMethod = 0x15,
    AuthenticationData = 0x16,
    RequestProblemInformation = 0x17,
    WillDelayInterval = 0x18,
    RequestResponseInformation = 0x19,
    ResponseInformation = 0x1a,
    ServerReference = 0x1c,
    ReasonString = 0x1f,
    ReceiveMaximum = 0x21,
    TopicAliasMaximum = 0x22,
    TopicAlias = 0x23,
    MaximumQoS = 0x24,
    RetainAvailable = 0x25,
    UserProperty = 0x26,
    MaximumPacketSize = 0x27,
    WildcardSubscriptionAvailable = 0x28,
    SubscriptionIdentifierAvailable = 0x29,
    SharedSubscriptionAvailable = 0x2a,
}

impl PropertyType {
    /// Get byte length used in packet.
    #[must_use]
    #[inline]
    pub const fn bytes() -> usize {
        1
    }
}

impl TryFrom<u8> for PropertyType {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0x01 => Ok(Self::PayloadFormatIndicator),
            0x02 => Ok(Self::MessageExpiryInterval),
            0x03 => Ok(Self::ContentType),
            0x08 => Ok(Self::ResponseTopic),
            0x09 => Ok(Self::CorrelationData),
            0x0b => Ok(Self::SubscriptionIdentifier),
            0x11 => Ok(Self::SessionExpiryInterval),
            0x12 => Ok(Self::AssignedClientIdentifier),
            0x13 => Ok(Self::ServerKeepAlive),
            0x15 => Ok(Self::AuthenticationMethod),
            0x16 => Ok(Self::AuthenticationData),
            0x17 => Ok(Self::RequestProblemInformation),
            0x18 => Ok(Self::WillDelayInterval),
            0x19 => Ok(Self::RequestResponseInformation),
            0x1a => Ok(Self::ResponseInformation),
            0x1c => Ok(Self::ServerReference),
            0x1f => Ok(Self::ReasonString),
            0x21 => Ok(Self::ReceiveMaximum),
            0x22 => Ok(Self::TopicAliasMaximum),
            0x23 => Ok(Self::TopicAlias),
            0x24 => Ok(Self::MaximumQoS),
            0x25 => Ok(Self::RetainAvailable),
            0x26 => Ok(Self::UserProperty),
            0x27 => Ok(Self::MaximumPacketSize),
            0x28 => Ok(Self::WildcardSubscriptionAvailable),
            0x29 => Ok(Self::SubscriptionIdentifierAvailable),
            0x2a => Ok(Self::SharedSubscriptionAvailable),
            _ => Err(DecodeError::InvalidPropertyType),
        }
    }
}

/// Typed property value.
///
/// Wire order of properties within a packet is significant and preserved;
/// the property list is therefore kept as a plain vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Property {
    /// Byte. Used in PUBLISH, Will Properties.
    ///
    /// A value of 1 indicates that the payload is UTF-8 Encoded Character
    /// Data. It is a Protocol Error to include the Payload Format Indicator
    /// more than once.
    PayloadFormatIndicator(BoolData),

    /// Four Byte Integer. Used in PUBLISH, Will Properties.
    ///
    /// If present, the value is the lifetime of the message in seconds.
    MessageExpiryInterval(U32Data),

    /// UTF-8 Encoded String. Used in PUBLISH, Will Properties.
    ///
    /// The value of the Content Type is defined by the sending and
    /// receiving application.
    ContentType(StringData),

    /// UTF-8 Encoded String. Used in PUBLISH, Will Properties.
    ///
    /// Used as the Topic Name for a response message. The presence of a
    /// Response Topic identifies the message as a request.
    ResponseTopic(PubTopic),

    /// Binary Data. Used in PUBLISH, Will Properties.
    ///
    /// Used by the sender of the request message to identify which request
    /// the response message is for when it is received.
    CorrelationData(BinaryData),

    /// Variable Byte Integer. Used in PUBLISH, SUBSCRIBE.
    ///
    /// The Subscription Identifier can have the value of 1 to 268,435,455.
    /// It is a Protocol Error if the Subscription Identifier has a value
    /// of 0. Multiple Subscription Identifiers will be included in a PUBLISH
    /// packet if the publication is the result of a match to more than one
    /// subscription.
    SubscriptionIdentifier(VarInt),

    /// Four Byte Integer. Used in CONNECT, CONNACK, DISCONNECT.
    ///
    /// Session Expiry Interval in seconds. If absent the value 0 is used:
    /// the Session ends when the Network Connection is closed. A value of
    /// 0xFFFFFFFF means the Session does not expire.
    ///
    /// The Client and Server MUST store the Session State after the Network
    /// Connection is closed if the Session Expiry Interval is greater
    /// than 0 [MQTT-3.1.2-23].
    SessionExpiryInterval(U32Data),

    /// UTF-8 Encoded String. Used in CONNACK.
    ///
    /// The Client Identifier which was assigned by the Server because a zero
    /// length Client Identifier was found in the CONNECT packet.
    AssignedClientIdentifier(StringData),

    /// Two Byte Integer. Used in CONNACK.
    ///
    /// If the Server sends a Server Keep Alive on the CONNACK packet, the
    /// Client MUST use this value instead of the Keep Alive value the Client
    /// sent on CONNECT [MQTT-3.2.2-21].
    ServerKeepAlive(U16Data),

    /// UTF-8 Encoded String. Used in CONNECT, CONNACK, AUTH.
    ///
    /// Name of the authentication method used for extended authentication.
    /// If absent, extended authentication is not performed.
    AuthenticationMethod(StringData),

    /// Binary Data. Used in CONNECT, CONNACK, AUTH.
    ///
    /// The contents of this data are defined by the authentication method.
    AuthenticationData(BinaryData),

    /// Byte. Used in CONNECT.
    ///
    /// The Client uses this value to indicate whether the Reason String or
    /// User Properties are sent in the case of failures.
    RequestProblemInformation(BoolData),

    /// Four Byte Integer. Used in Will Properties.
    ///
    /// The Server delays publishing the Client's Will Message until the Will
    /// Delay Interval has passed or the Session ends, whichever happens
    /// first.
    WillDelayInterval(U32Data),

    /// Byte. Used in CONNECT.
    ///
    /// The Client uses this value to request the Server to return Response
    /// Information in the CONNACK. A value of 0 indicates that the Server
    /// MUST NOT return Response Information [MQTT-3.1.2-28].
    RequestResponseInformation(BoolData),

    /// UTF-8 Encoded String. Used in CONNACK.
    ///
    /// Used as the basis for creating a Response Topic.
    ResponseInformation(StringData),

    /// UTF-8 Encoded String. Used in CONNACK, DISCONNECT.
    ///
    /// Can be used by the Client to identify another Server to use, together
    /// with reason code 0x9C (Use another server) or 0x9D (Server moved).
    ServerReference(StringData),

    /// UTF-8 Encoded String. Used in CONNACK, PUBACK, PUBREC, PUBREL,
    /// PUBCOMP, SUBACK, UNSUBACK, DISCONNECT, AUTH.
    ///
    /// A human readable string designed for diagnostics which SHOULD NOT be
    /// parsed by the receiver.
    ReasonString(StringData),

    /// Two Byte Integer. Used in CONNECT, CONNACK.
    ///
    /// The largest number of `QoS` 1 and `QoS` 2 publications the sender is
    /// willing to process concurrently. It is a Protocol Error to include
    /// the Receive Maximum value more than once or for it to have the
    /// value 0. If absent its value defaults to 65,535.
    ReceiveMaximum(U16Data),

    /// Two Byte Integer. Used in CONNECT, CONNACK.
    ///
    /// The highest value that the sender will accept as a Topic Alias sent
    /// by the peer. If absent, the default value is 0, and the peer MUST NOT
    /// send any Topic Aliases [MQTT-3.1.2-27].
    TopicAliasMaximum(U16Data),

    /// Two Byte Integer. Used in PUBLISH.
    ///
    /// An integer value used to identify the Topic instead of using the
    /// Topic Name. A Topic Alias of 0 is not permitted [MQTT-3.3.2-8], and
    /// a sender MUST NOT use an alias greater than the maximum the receiver
    /// advertised [MQTT-3.3.2-9].
    TopicAlias(U16Data),

    /// Byte. Used in CONNACK.
    ///
    /// If a Server does not support `QoS` 1 or `QoS` 2 PUBLISH packets it
    /// MUST send a Maximum QoS in the CONNACK packet specifying the highest
    /// `QoS` it supports [MQTT-3.2.2-9].
    MaximumQoS(QoS),

    /// Byte. Used in CONNACK.
    ///
    /// Declares whether the Server supports retained messages. If not
    /// present, retained messages are supported.
    RetainAvailable(BoolData),

    /// UTF-8 String Pair. Used in every packet which carries properties.
    ///
    /// The User Property is allowed to appear multiple times to represent
    /// multiple name, value pairs. The same name is allowed to appear more
    /// than once. The receiver MUST maintain the order of User
    /// Properties [MQTT-3.1.3-10].
    UserProperty(StringPairData),

    /// Four Byte Integer. Used in CONNECT, CONNACK.
    ///
    /// The Maximum Packet Size the sender is willing to accept. It is a
    /// Protocol Error to include the Maximum Packet Size more than once, or
    /// for the value to be set to zero.
    MaximumPacketSize(U32Data),

    /// Byte. Used in CONNACK.
    ///
    /// Declares whether the Server supports Wildcard Subscriptions. If not
    /// present, they are supported.
    WildcardSubscriptionAvailable(BoolData),

    /// Byte. Used in CONNACK.
    ///
    /// Declares whether the Server supports Subscription Identifiers. If
    /// not present, they are supported.
    SubscriptionIdentifierAvailable(BoolData),

    /// Byte. Used in CONNACK.
    ///
    /// Declares whether the Server supports Shared Subscriptions. If not
    /// present, they are supported.
    SharedSubscriptionAvailable(BoolData),
}

impl Property {
    /// Get type of the property.
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        match self {
            Self::PayloadFormatIndicator(_) => PropertyType::PayloadFormatIndicator,
            Self::MessageExpiryInterval(_) => PropertyType::MessageExpiryInterval,
            Self::ContentType(_) => PropertyType::ContentType,
            Self::ResponseTopic(_) => PropertyType::ResponseTopic,
            Self::CorrelationData(_) => PropertyType::CorrelationData,
            Self::SubscriptionIdentifier(_) => PropertyType::SubscriptionIdentifier,
            Self::SessionExpiryInterval(_) => PropertyType::SessionExpiryInterval,
            Self::AssignedClientIdentifier(_) => PropertyType::AssignedClientIdentifier,
            Self::ServerKeepAlive(_) => PropertyType::ServerKeepAlive,
            Self::AuthenticationMethod(_) => PropertyType::AuthenticationMethod,
            Self::AuthenticationData(_) => PropertyType::AuthenticationData,
            Self::RequestProblemInformation(_) => PropertyType::RequestProblemInformation,
            Self::WillDelayInterval(_) => PropertyType::WillDelayInterval,
            Self::RequestResponseInformation(_) => PropertyType::RequestResponseInformation,
            Self::ResponseInformation(_) => PropertyType::ResponseInformation,
            Self::ServerReference(_) => PropertyType::ServerReference,
            Self::ReasonString(_) => PropertyType::ReasonString,
            Self::ReceiveMaximum(_) => PropertyType::ReceiveMaximum,
            Self::TopicAliasMaximum(_) => PropertyType::TopicAliasMaximum,
            Self::TopicAlias(_) => PropertyType::TopicAlias,
            Self::MaximumQoS(_) => PropertyType::MaximumQoS,
            Self::RetainAvailable(_) => PropertyType::RetainAvailable,
            Self::UserProperty(_) => PropertyType::UserProperty,
            Self::MaximumPacketSize(_) => PropertyType::MaximumPacketSize,
            Self::WildcardSubscriptionAvailable(_) => PropertyType::WildcardSubscriptionAvailable,
            Self::SubscriptionIdentifierAvailable(_) => {
                PropertyType::SubscriptionIdentifierAvailable
            }
            Self::SharedSubscriptionAvailable(_) => PropertyType::SharedSubscriptionAvailable,
        }
    }

    /// Get byte length used in packets.
    #[allow(clippy::match_same_arms)]
    #[must_use]
    pub fn bytes(&self) -> usize {
        let value_bytes = match self {
            Self::AssignedClientIdentifier(value) => value.bytes(),
            Self::AuthenticationData(value) => value.bytes(),
            Self::AuthenticationMethod(value) => value.bytes(),
            Self::ContentType(value) => value.bytes(),
            Self::CorrelationData(value) => value.bytes(),
            Self::MaximumPacketSize(..) => U32Data::bytes(),
            Self::MaximumQoS(..) => QoS::bytes(),
            Self::MessageExpiryInterval(..) => U32Data::bytes(),
            Self::PayloadFormatIndicator(..) => BoolData::bytes(),
            Self::ReasonString(value) => value.bytes(),
            Self::ReceiveMaximum(..) => U16Data::bytes(),
            Self::RequestProblemInformation(..) => BoolData::bytes(),
            Self::RequestResponseInformation(..) => BoolData::bytes(),
            Self::ResponseInformation(value) => value.bytes(),
            Self::ResponseTopic(value) => value.bytes(),
            Self::RetainAvailable(..) => BoolData::bytes(),
            Self::ServerKeepAlive(..) => U16Data::bytes(),
            Self::ServerReference(value) => value.bytes(),
            Self::SessionExpiryInterval(..) => U32Data::bytes(),
            Self::SharedSubscriptionAvailable(..) => BoolData::bytes(),
            Self::SubscriptionIdentifier(value) => value.bytes(),
            Self::SubscriptionIdentifierAvailable(..) => BoolData::bytes(),
            Self::TopicAlias(..) => U16Data::bytes(),
            Self::TopicAliasMaximum(..) => U16Data::bytes(),
            Self::UserProperty(value) => value.bytes(),
            Self::WildcardSubscriptionAvailable(..) => BoolData::bytes(),
            Self::WillDelayInterval(..) => U32Data::bytes(),
        };

        PropertyType::bytes() + value_bytes
    }
}

impl Property {
    /// The peer uses this value to limit the number of `QoS` 1 and `QoS` 2
    /// publications that it is willing to process concurrently.
    #[must_use]
    pub const fn default_receive_maximum() -> u16 {
        u16::MAX
    }

    #[must_use]
    pub const fn default_topic_alias_maximum() -> u16 {
        0
    }

    #[must_use]
    pub const fn default_session_expiry_interval() -> u32 {
        0
    }

    #[must_use]
    pub const fn default_request_response_information() -> bool {
        false
    }

    #[must_use]
    pub const fn default_request_problem_information() -> bool {
        true
    }

    #[must_use]
    pub const fn default_will_delay_interval() -> u32 {
        0
    }
}

impl DecodePacket for Property {
    #[allow(clippy::too_many_lines)]
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let property_type_byte = ba.read_byte()?;
        let property_type = PropertyType::try_from(property_type_byte)?;
        match property_type {
            PropertyType::PayloadFormatIndicator => {
                let on = BoolData::decode(ba)?;
                Ok(Self::PayloadFormatIndicator(on))
            }
            PropertyType::MessageExpiryInterval => {
                let interval = U32Data::decode(ba)?;
                Ok(Self::MessageExpiryInterval(interval))
            }
            PropertyType::ContentType => {
                let content_type = StringData::decode(ba)?;
                Ok(Self::ContentType(content_type))
            }
            PropertyType::ResponseTopic => {
                let topic = PubTopic::decode(ba)?;
                Ok(Self::ResponseTopic(topic))
            }
            PropertyType::CorrelationData => {
                let data = BinaryData::decode(ba)?;
                Ok(Self::CorrelationData(data))
            }
            PropertyType::SubscriptionIdentifier => {
                let id = VarInt::decode(ba)?;
                if id.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::SubscriptionIdentifier(id))
            }
            PropertyType::SessionExpiryInterval => {
                let interval = U32Data::decode(ba)?;
                Ok(Self::SessionExpiryInterval(interval))
            }
            PropertyType::AssignedClientIdentifier => {
                let client_id = StringData::decode(ba)?;
                validate_client_id(client_id.as_ref())?;
                Ok(Self::AssignedClientIdentifier(client_id))
            }
            PropertyType::ServerKeepAlive => {
                let keep_alive = U16Data::decode(ba)?;
                Ok(Self::ServerKeepAlive(keep_alive))
            }
            PropertyType::AuthenticationMethod => {
                let method = StringData::decode(ba)?;
                Ok(Self::AuthenticationMethod(method))
            }
            PropertyType::AuthenticationData => {
                let data = BinaryData::decode(ba)?;
                Ok(Self::AuthenticationData(data))
            }
            PropertyType::RequestProblemInformation => {
                let on = BoolData::decode(ba)?;
                Ok(Self::RequestProblemInformation(on))
            }
            PropertyType::WillDelayInterval => {
                let interval = U32Data::decode(ba)?;
                Ok(Self::WillDelayInterval(interval))
            }
            PropertyType::RequestResponseInformation => {
                let on = BoolData::decode(ba)?;
                Ok(Self::RequestResponseInformation(on))
            }
            PropertyType::ResponseInformation => {
                let info = StringData::decode(ba)?;
                Ok(Self::ResponseInformation(info))
            }
            PropertyType::ServerReference => {
                let reference = StringData::decode(ba)?;
                Ok(Self::ServerReference(reference))
            }
            PropertyType::ReasonString => {
                let reason = StringData::decode(ba)?;
                Ok(Self::ReasonString(reason))
            }
            PropertyType::ReceiveMaximum => {
                let max = U16Data::decode(ba)?;
                // It is a Protocol Error for the Receive Maximum to have
                // the value 0.
                if max.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::ReceiveMaximum(max))
            }
            PropertyType::TopicAliasMaximum => {
                let max = U16Data::decode(ba)?;
                Ok(Self::TopicAliasMaximum(max))
            }
            PropertyType::TopicAlias => {
                let alias = U16Data::decode(ba)?;
                Ok(Self::TopicAlias(alias))
            }
            PropertyType::MaximumQoS => {
                let qos = QoS::decode(ba)?;
                // A value other than 0 or 1 is a Protocol Error.
                if qos == QoS::ExactOnce {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::MaximumQoS(qos))
            }
            PropertyType::RetainAvailable => {
                let available = BoolData::decode(ba)?;
                Ok(Self::RetainAvailable(available))
            }
            PropertyType::UserProperty => {
                let pair = StringPairData::decode(ba)?;
                Ok(Self::UserProperty(pair))
            }
            PropertyType::MaximumPacketSize => {
                let max = U32Data::decode(ba)?;
                // It is a Protocol Error for the value to be set to zero.
                if max.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::MaximumPacketSize(max))
            }
            PropertyType::WildcardSubscriptionAvailable => {
                let available = BoolData::decode(ba)?;
                Ok(Self::WildcardSubscriptionAvailable(available))
            }
            PropertyType::SubscriptionIdentifierAvailable => {
                let available = BoolData::decode(ba)?;
                Ok(Self::SubscriptionIdentifierAvailable(available))
            }
            PropertyType::SharedSubscriptionAvailable => {
                let available = BoolData::decode(ba)?;
                Ok(Self::SharedSubscriptionAvailable(available))
            }
        }
    }
}

impl EncodePacket for Property {
    #[allow(clippy::match_same_arms)]
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let property_type_byte = self.property_type() as u8;
        buf.push(property_type_byte);
        let value_bytes = match self {
            Self::AssignedClientIdentifier(client_id) => client_id.encode(buf)?,
            Self::AuthenticationData(data) => data.encode(buf)?,
            Self::AuthenticationMethod(method) => method.encode(buf)?,
            Self::ContentType(content_type) => content_type.encode(buf)?,
            Self::CorrelationData(data) => data.encode(buf)?,
            Self::MaximumPacketSize(max) => max.encode(buf)?,
            Self::MaximumQoS(qos) => qos.encode(buf)?,
            Self::MessageExpiryInterval(interval) => interval.encode(buf)?,
            Self::PayloadFormatIndicator(on) => on.encode(buf)?,
            Self::ReasonString(reason) => reason.encode(buf)?,
            Self::ReceiveMaximum(max) => max.encode(buf)?,
            Self::RequestProblemInformation(on) => on.encode(buf)?,
            Self::RequestResponseInformation(on) => on.encode(buf)?,
            Self::ResponseInformation(info) => info.encode(buf)?,
            Self::ResponseTopic(topic) => topic.encode(buf)?,
            Self::RetainAvailable(available) => available.encode(buf)?,
            Self::ServerKeepAlive(keep_alive) => keep_alive.encode(buf)?,
            Self::ServerReference(reference) => reference.encode(buf)?,
            Self::SessionExpiryInterval(interval) => interval.encode(buf)?,
            Self::SharedSubscriptionAvailable(available) => available.encode(buf)?,
            Self::SubscriptionIdentifier(id) => id.encode(buf)?,
            Self::SubscriptionIdentifierAvailable(available) => available.encode(buf)?,
            Self::TopicAlias(alias) => alias.encode(buf)?,
            Self::TopicAliasMaximum(value) => value.encode(buf)?,
            Self::UserProperty(pair) => pair.encode(buf)?,
            Self::WildcardSubscriptionAvailable(available) => available.encode(buf)?,
            Self::WillDelayInterval(interval) => interval.encode(buf)?,
        };
        Ok(PropertyType::bytes() + value_bytes)
    }
}

/// Ordered property list of one packet.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties(Vec<Property>);

impl AsRef<[Property]> for Properties {
    fn as_ref(&self) -> &[Property] {
        self.0.as_ref()
    }
}

impl Properties {
    /// Create an empty property list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Get byte length of property list in packet, length prefix included.
    #[must_use]
    pub fn bytes(&self) -> usize {
        let value_bytes = self.0.iter().map(Property::bytes).sum::<usize>();
        // The prefix is the byte length of all properties, not their count.
        let len = VarInt::from(value_bytes).unwrap_or_default();
        len.bytes() + value_bytes
    }

    /// Get number of properties in list.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether property list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get a reference to property list.
    #[must_use]
    pub fn props(&self) -> &[Property] {
        &self.0
    }

    /// Clear property list.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Push a property to the back of the list.
    pub fn push(&mut self, v: Property) {
        self.0.push(v);
    }

    /// Remove every property of type `property_type` from the list.
    pub fn remove(&mut self, property_type: PropertyType) {
        self.0.retain(|p| p.property_type() != property_type);
    }

    /// Find the first property of type `property_type`.
    #[must_use]
    pub fn find(&self, property_type: PropertyType) -> Option<&Property> {
        self.0.iter().find(|p| p.property_type() == property_type)
    }

    /// Get topic alias value, if present.
    #[must_use]
    pub fn topic_alias(&self) -> Option<u16> {
        match self.find(PropertyType::TopicAlias) {
            Some(Property::TopicAlias(alias)) => Some(alias.value()),
            _ => None,
        }
    }

    /// Get topic alias maximum value, if present.
    #[must_use]
    pub fn topic_alias_maximum(&self) -> Option<u16> {
        match self.find(PropertyType::TopicAliasMaximum) {
            Some(Property::TopicAliasMaximum(max)) => Some(max.value()),
            _ => None,
        }
    }

    /// Get receive maximum value, if present.
    #[must_use]
    pub fn receive_maximum(&self) -> Option<u16> {
        match self.find(PropertyType::ReceiveMaximum) {
            Some(Property::ReceiveMaximum(max)) => Some(max.value()),
            _ => None,
        }
    }

    /// Get maximum packet size value, if present.
    #[must_use]
    pub fn maximum_packet_size(&self) -> Option<u32> {
        match self.find(PropertyType::MaximumPacketSize) {
            Some(Property::MaximumPacketSize(max)) => Some(max.value()),
            _ => None,
        }
    }

    /// Get session expiry interval value, if present.
    #[must_use]
    pub fn session_expiry_interval(&self) -> Option<u32> {
        match self.find(PropertyType::SessionExpiryInterval) {
            Some(Property::SessionExpiryInterval(interval)) => Some(interval.value()),
            _ => None,
        }
    }

    /// Get server keep alive value, if present.
    #[must_use]
    pub fn server_keep_alive(&self) -> Option<u16> {
        match self.find(PropertyType::ServerKeepAlive) {
            Some(Property::ServerKeepAlive(keep_alive)) => Some(keep_alive.value()),
            _ => None,
        }
    }

    /// Get payload format indicator value, if present.
    #[must_use]
    pub fn payload_format_indicator(&self) -> Option<bool> {
        match self.find(PropertyType::PayloadFormatIndicator) {
            Some(Property::PayloadFormatIndicator(on)) => Some(on.value()),
            _ => None,
        }
    }
}

impl DecodePacket for Properties {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let property_length = VarInt::decode(ba)?;
        let mut remaining_length = property_length.value();
        if remaining_length > ba.remaining_bytes() {
            return Err(DecodeError::InvalidRemainingLength);
        }
        let mut properties = Vec::new();
        while remaining_length > 0 {
            let property = Property::decode(ba)?;
            if property.bytes() > remaining_length {
                return Err(DecodeError::InvalidRemainingLength);
            }
            remaining_length -= property.bytes();
            properties.push(property);
        }

        Ok(Self(properties))
    }
}

impl EncodePacket for Properties {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let value_bytes = self.0.iter().map(Property::bytes).sum::<usize>();
        let len = VarInt::from(value_bytes)?;
        let mut bytes_written = len.bytes();
        len.encode(buf)?;
        for property in &self.0 {
            bytes_written += property.encode(buf)?;
        }

        Ok(bytes_written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_preserves_order() {
        let mut props = Properties::new();
        props.push(Property::UserProperty(
            StringPairData::from("k1", "v1").unwrap(),
        ));
        props.push(Property::TopicAlias(U16Data::new(3)));
        props.push(Property::UserProperty(
            StringPairData::from("k2", "v2").unwrap(),
        ));

        let mut buf = Vec::new();
        props.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = Properties::decode(&mut ba).unwrap();
        assert_eq!(decoded, props);
        assert_eq!(decoded.bytes(), buf.len());
    }

    #[test]
    fn test_decode_rejects_unknown_id() {
        // Property length 3, unknown id 0x7f.
        let buf = [0x03, 0x7f, 0x00, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            Properties::decode(&mut ba),
            Err(DecodeError::InvalidPropertyType)
        );
    }

    #[test]
    fn test_check_property_type_list() {
        let mut props = Properties::new();
        props.push(Property::TopicAlias(U16Data::new(3)));
        props.push(Property::TopicAlias(U16Data::new(4)));
        assert_eq!(
            check_property_type_list(props.props(), &[PropertyType::TopicAlias]),
            Err(PropertyType::TopicAlias)
        );

        let mut props = Properties::new();
        props.push(Property::UserProperty(
            StringPairData::from("a", "b").unwrap(),
        ));
        props.push(Property::UserProperty(
            StringPairData::from("a", "c").unwrap(),
        ));
        assert!(check_property_type_list(props.props(), &[PropertyType::UserProperty]).is_ok());

        let props = [Property::ReceiveMaximum(U16Data::new(12))];
        assert_eq!(
            check_property_type_list(&props, &[PropertyType::UserProperty]),
            Err(PropertyType::ReceiveMaximum)
        );
    }

    #[test]
    fn test_typed_accessors() {
        let mut props = Properties::new();
        props.push(Property::ReceiveMaximum(U16Data::new(10)));
        props.push(Property::MaximumPacketSize(U32Data::new(2048)));
        assert_eq!(props.receive_maximum(), Some(10));
        assert_eq!(props.maximum_packet_size(), Some(2048));
        assert_eq!(props.topic_alias(), None);
    }
}
