// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;

use crate::utils;
use crate::DecodeError;

/// Read cursor over a framed packet buffer.
///
/// When constructed from a [`Bytes`] frame, payload slices are handed out as
/// reference-counted sub-slices of the frame, so publish payloads share
/// memory with the receive buffer instead of being copied.
pub struct ByteArray<'a> {
    offset: usize,
    data: &'a [u8],
    shared: Option<&'a Bytes>,
}

impl<'a> ByteArray<'a> {
    /// Create a new `ByteArray` object based on byte slice.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            offset: 0,
            data,
            shared: None,
        }
    }

    /// Create a new `ByteArray` over a shared frame buffer.
    ///
    /// Slices returned from [`Self::read_bytes_shared`] are zero-copy views
    /// into `data`.
    #[must_use]
    pub fn from_bytes(data: &'a Bytes) -> Self {
        Self {
            offset: 0,
            data: data.as_ref(),
            shared: Some(data),
        }
    }

    /// Get length of inner byte slice.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if byte array is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get remaining length of bytes available to read.
    #[must_use]
    pub const fn remaining_bytes(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Read one byte from slice.
    ///
    /// # Errors
    ///
    /// Returns error if the array has no more bytes.
    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        self.offset += 1;
        if self.offset > self.data.len() {
            Err(DecodeError::OutOfRange)
        } else {
            Ok(self.data[self.offset - 1])
        }
    }

    /// Read a u16 value from slice.
    ///
    /// # Errors
    ///
    /// Returns error if the array has less than 2 bytes left.
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(BigEndian::read_u16(self.read_bytes(2)?))
    }

    /// Read a u32 value from slice.
    ///
    /// # Errors
    ///
    /// Returns error if the array has less than 4 bytes left.
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(BigEndian::read_u32(self.read_bytes(4)?))
    }

    /// Read an UTF-8 string with `len` bytes from slice.
    ///
    /// # Errors
    ///
    /// Returns error if the array has no `len` bytes left or bytes are not
    /// a well-formed MQTT string.
    pub fn read_string(&mut self, len: usize) -> Result<String, DecodeError> {
        let bytes = self.read_bytes(len)?;
        utils::to_utf8_string(bytes).map_err(|_err| DecodeError::InvalidString)
    }

    /// Read a byte array with `len` bytes from slice.
    ///
    /// # Errors
    ///
    /// Returns error if the array has no `len` bytes left.
    pub fn read_bytes(&mut self, len: usize) -> Result<&[u8], DecodeError> {
        self.offset += len;
        if self.offset > self.data.len() {
            Err(DecodeError::OutOfRange)
        } else {
            Ok(&self.data[self.offset - len..self.offset])
        }
    }

    /// Read a byte array with `len` bytes, sharing ownership with the frame
    /// buffer when one is attached.
    ///
    /// # Errors
    ///
    /// Returns error if the array has no `len` bytes left.
    pub fn read_bytes_shared(&mut self, len: usize) -> Result<Bytes, DecodeError> {
        let start = self.offset;
        let shared = self.shared;
        let slice = self.read_bytes(len)?;
        match shared {
            Some(frame) => Ok(frame.slice(start..start + len)),
            None => Ok(Bytes::copy_from_slice(slice)),
        }
    }

    /// Reset offset value to 0.
    pub fn reset_offset(&mut self) {
        self.offset = 0;
    }

    /// Get current offset.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_values() {
        let buf = [0x01, 0x00, 0x10, 0x00, 0x00, 0x01, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(ba.read_byte().unwrap(), 0x01);
        assert_eq!(ba.read_u16().unwrap(), 16);
        assert_eq!(ba.read_u32().unwrap(), 256);
        assert_eq!(ba.remaining_bytes(), 0);
        assert!(ba.read_byte().is_err());
    }

    #[test]
    fn test_shared_slice() {
        let frame = Bytes::from_static(b"\x00\x02hi");
        let mut ba = ByteArray::from_bytes(&frame);
        let len = ba.read_u16().unwrap() as usize;
        let payload = ba.read_bytes_shared(len).unwrap();
        assert_eq!(payload.as_ref(), b"hi");
    }
}
