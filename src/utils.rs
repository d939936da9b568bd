// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringError {
    /// Length of string exceeds 65535 bytes.
    TooLong,

    /// Bytes are not well-formed UTF-8, or contain U+0000 or code points
    /// in the surrogate range.
    InvalidChar,
}

impl From<StringError> for DecodeError {
    fn from(_e: StringError) -> Self {
        Self::InvalidString
    }
}

/// Check that `s` is valid as an MQTT UTF-8 Encoded String.
///
/// The character data in a UTF-8 Encoded String MUST be well-formed UTF-8
/// as defined by the Unicode specification and restated in RFC 3629.
/// In particular, the character data MUST NOT include encodings of code points
/// between U+D800 and U+DFFF [MQTT-1.5.4-1].
///
/// A UTF-8 Encoded String MUST NOT include an encoding of the null character
/// U+0000 [MQTT-1.5.4-2].
///
/// # Errors
///
/// Returns error if `s` is too long or contains forbidden code points.
pub fn validate_utf8_string(s: &str) -> Result<(), StringError> {
    if s.len() > u16::MAX as usize {
        return Err(StringError::TooLong);
    }
    // Rust strings cannot contain surrogate code points, so only U+0000
    // needs an explicit check here.
    if s.chars().any(|c| c == '\u{0000}') {
        return Err(StringError::InvalidChar);
    }
    Ok(())
}

/// Convert raw bytes into an MQTT UTF-8 Encoded String.
///
/// # Errors
///
/// Returns error if bytes are ill-formed UTF-8 or contain forbidden
/// code points.
pub fn to_utf8_string(bytes: &[u8]) -> Result<String, StringError> {
    let s = String::from_utf8(bytes.to_vec()).map_err(|_err| StringError::InvalidChar)?;
    validate_utf8_string(&s)?;
    Ok(s)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientIdError {
    /// Larger than 23 chars.
    TooLong,

    /// Can only contain 0-9a-zA-Z.
    InvalidChars,
}

impl From<ClientIdError> for DecodeError {
    fn from(_e: ClientIdError) -> Self {
        Self::InvalidClientId
    }
}

/// Check that `client_id` is acceptable.
///
/// The Server MUST allow ClientIds which are between 1 and 23 UTF-8 encoded
/// bytes in length, and that contain only the characters
/// "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ"
/// [MQTT-3.1.3-5].
///
/// A zero length id is accepted here; rejecting it (or assigning a random
/// replacement) is a server policy decision.
///
/// # Errors
///
/// Returns error if `client_id` is too long or contains other characters.
pub fn validate_client_id(client_id: &str) -> Result<(), ClientIdError> {
    if client_id.len() > 23 {
        return Err(ClientIdError::TooLong);
    }
    if !client_id.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(ClientIdError::InvalidChars);
    }
    Ok(())
}

/// Generate a random client id for hosts which do not care about
/// session continuity.
#[must_use]
pub fn random_client_id() -> String {
    let rand_part: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("fenhe{rand_part}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_utf8_string() {
        assert!(validate_utf8_string("").is_ok());
        assert!(validate_utf8_string("topic/sub").is_ok());
        assert!(validate_utf8_string("nul\u{0000}char").is_err());
    }

    #[test]
    fn test_validate_client_id() {
        assert!(validate_client_id("").is_ok());
        assert!(validate_client_id("client01").is_ok());
        assert!(validate_client_id("0123456789012345678901234").is_err());
        assert!(validate_client_id("client/01").is_err());
    }

    #[test]
    fn test_random_client_id() {
        let id = random_client_id();
        assert!(validate_client_id(&id).is_ok());
    }
}
