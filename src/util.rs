//! # MQTT Serialization Utilities
//!
//! Cursor types for writing and reading MQTT primitives: single bytes, big-endian
//! `u16`s, length-prefixed UTF-8 strings and the variable-byte "remaining length"
//! integer used in every fixed header.

use crate::error::{CodecError, MqttError, ProtocolError};

/// Largest value representable by a four byte variable-length integer.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Returns the total length of the first complete frame in `buf`.
///
/// `Ok(None)` means more bytes are needed before the frame can be decoded.
pub fn frame_length(buf: &[u8]) -> Result<Option<usize>, CodecError> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let mut multiplier = 1;
    let mut remaining = 0;
    for (i, byte) in buf[1..].iter().enumerate() {
        if i >= 4 {
            return Err(ProtocolError::MalformedPacket.into());
        }
        remaining += (byte & 0x7F) as usize * multiplier;
        if byte & 0x80 == 0 {
            let total = 1 + (i + 1) + remaining;
            return Ok(if buf.len() >= total { Some(total) } else { None });
        }
        multiplier *= 128;
    }
    Ok(None)
}

/// A bounds-checked writer over a caller-provided packet buffer.
pub struct PacketWriter<'b> {
    buf: &'b mut [u8],
    pos: usize,
}

impl<'b> PacketWriter<'b> {
    pub fn new(buf: &'b mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn put_u8(&mut self, value: u8) -> Result<(), CodecError> {
        *self.buf.get_mut(self.pos).ok_or(MqttError::BufferTooSmall)? = value;
        self.pos += 1;
        Ok(())
    }

    pub fn put_u16(&mut self, value: u16) -> Result<(), CodecError> {
        self.put_bytes(&value.to_be_bytes())
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let end = self.pos + bytes.len();
        self.buf
            .get_mut(self.pos..end)
            .ok_or(MqttError::BufferTooSmall)?
            .copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    /// Writes a string prefixed with its 2-byte length.
    pub fn put_str(&mut self, s: &str) -> Result<(), CodecError> {
        let len = u16::try_from(s.len()).map_err(|_| ProtocolError::PayloadTooLarge)?;
        self.put_u16(len)?;
        self.put_bytes(s.as_bytes())
    }

    /// Writes a fixed header: packet type/flags byte and remaining length.
    pub fn put_header(&mut self, first: u8, remaining: usize) -> Result<(), CodecError> {
        if remaining > MAX_REMAINING_LENGTH {
            return Err(ProtocolError::PayloadTooLarge.into());
        }
        self.put_u8(first)?;
        let mut value = remaining;
        loop {
            let mut byte = (value % 128) as u8;
            value /= 128;
            if value > 0 {
                byte |= 0x80;
            }
            self.put_u8(byte)?;
            if value == 0 {
                return Ok(());
            }
        }
    }
}

/// A cursor over a received frame. Every read fails with `MalformedPacket`
/// instead of panicking when the frame is truncated.
pub struct PacketReader<'b> {
    buf: &'b [u8],
    pos: usize,
}

impl<'b> PacketReader<'b> {
    pub fn new(buf: &'b [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Skips the fixed header and returns its first byte.
    pub fn header(&mut self) -> Result<u8, CodecError> {
        let first = self.u8()?;
        let mut shift = 0;
        loop {
            let byte = self.u8()?;
            shift += 1;
            if byte & 0x80 == 0 {
                return Ok(first);
            }
            if shift >= 4 {
                return Err(ProtocolError::MalformedPacket.into());
            }
        }
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or(ProtocolError::MalformedPacket)?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn u16(&mut self) -> Result<u16, CodecError> {
        let bytes = self.bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'b [u8], CodecError> {
        let end = self.pos + len;
        let slice = self
            .buf
            .get(self.pos..end)
            .ok_or(ProtocolError::MalformedPacket)?;
        self.pos = end;
        Ok(slice)
    }

    pub fn str(&mut self) -> Result<&'b str, CodecError> {
        let len = self.u16()? as usize;
        core::str::from_utf8(self.bytes(len)?)
            .map_err(|_| ProtocolError::InvalidUtf8String.into())
    }

    /// Everything after the cursor.
    pub fn rest(&mut self) -> &'b [u8] {
        let rest = &self.buf[self.pos.min(self.buf.len())..];
        self.pos = self.buf.len();
        rest
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_length_waits_for_complete_frame() {
        assert_eq!(frame_length(&[0x30]).unwrap(), None);
        assert_eq!(frame_length(&[0x30, 0x03, 0x00]).unwrap(), None);
        assert_eq!(frame_length(&[0x30, 0x02, 0x00, 0x00, 0xFF]).unwrap(), Some(4));
    }

    #[test]
    fn frame_length_handles_multi_byte_lengths() {
        let mut frame = [0u8; 3 + 200];
        frame[0] = 0x30;
        frame[1] = 0xC8;
        frame[2] = 0x01;
        assert_eq!(frame_length(&frame[..100]).unwrap(), None);
        assert_eq!(frame_length(&frame).unwrap(), Some(203));
    }

    #[test]
    fn frame_length_rejects_five_byte_length() {
        let frame = [0x30, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        assert_eq!(
            frame_length(&frame),
            Err(MqttError::Protocol(ProtocolError::MalformedPacket))
        );
    }

    #[test]
    fn header_encodes_remaining_length() {
        let mut buf = [0u8; 8];
        let mut w = PacketWriter::new(&mut buf);
        w.put_header(0x30, 321).unwrap();
        assert_eq!(w.position(), 3);
        assert_eq!(&buf[..3], &[0x30, 0xC1, 0x02]);
    }

    #[test]
    fn writer_reports_small_buffer() {
        let mut buf = [0u8; 3];
        let mut w = PacketWriter::new(&mut buf);
        assert_eq!(w.put_str("abc"), Err(MqttError::BufferTooSmall));
    }

    #[test]
    fn reader_rejects_truncated_string() {
        let mut r = PacketReader::new(&[0x00, 0x05, b'a']);
        assert_eq!(
            r.str(),
            Err(MqttError::Protocol(ProtocolError::MalformedPacket))
        );
    }
}
