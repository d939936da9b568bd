// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use bytes::Bytes;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use std::fmt;

/// Application message payload of a publish packet.
///
/// The payload is kept as a sequence of reference-counted byte chunks.
/// A payload decoded from the wire holds a single chunk sharing memory with
/// the receive buffer; a payload built by the host may scatter over several
/// chunks which are written out back to back without being copied together.
#[derive(Clone, Debug, Default)]
pub struct Payload(Vec<Bytes>);

impl Payload {
    /// Create an empty payload.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Create a payload by copying a byte slice into a single chunk.
    #[must_use]
    pub fn from_slice(data: &[u8]) -> Self {
        if data.is_empty() {
            Self::new()
        } else {
            Self(vec![Bytes::copy_from_slice(data)])
        }
    }

    /// Create a payload from a shared chunk without copying.
    #[must_use]
    pub fn from_bytes(chunk: Bytes) -> Self {
        if chunk.is_empty() {
            Self::new()
        } else {
            Self(vec![chunk])
        }
    }

    /// Append a shared chunk without copying.
    pub fn push_chunk(&mut self, chunk: Bytes) {
        if !chunk.is_empty() {
            self.0.push(chunk);
        }
    }

    /// Get total byte length across all chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.iter().map(Bytes::len).sum()
    }

    /// Returns true if payload has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get payload chunks for gathered writes.
    #[must_use]
    pub fn chunks(&self) -> &[Bytes] {
        &self.0
    }

    /// Collect all chunks into one contiguous buffer.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.len());
        for chunk in &self.0 {
            buf.extend_from_slice(chunk);
        }
        buf
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "payload({} bytes)", self.len())
    }
}

impl From<&[u8]> for Payload {
    fn from(data: &[u8]) -> Self {
        Self::from_slice(data)
    }
}

impl From<Bytes> for Payload {
    fn from(chunk: Bytes) -> Self {
        Self::from_bytes(chunk)
    }
}

/// Payloads compare by content; chunk boundaries are not observable.
impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let flat_self: Vec<u8> = self.0.iter().flat_map(|c| c.iter().copied()).collect();
        let flat_other: Vec<u8> = other.0.iter().flat_map(|c| c.iter().copied()).collect();
        flat_self == flat_other
    }
}

impl Eq for Payload {}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.to_vec())
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let data = Vec::<u8>::deserialize(deserializer)?;
        Ok(Self::from_bytes(Bytes::from(data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunked_equality() {
        let mut scattered = Payload::new();
        scattered.push_chunk(Bytes::from_static(b"hel"));
        scattered.push_chunk(Bytes::from_static(b"lo"));
        let flat = Payload::from_slice(b"hello");
        assert_eq!(scattered, flat);
        assert_eq!(scattered.len(), 5);
    }

    #[test]
    fn test_empty_chunks_skipped() {
        let mut payload = Payload::new();
        payload.push_chunk(Bytes::new());
        assert!(payload.is_empty());
    }
}
