//! Typed little-endian payload serialization.
//!
//! Payloads are flat concatenations of primitive fields whose schema is known
//! to the caller (the device layer), not to the core. The reader tolerates a
//! payload that ends exactly at a field boundary: fields past the end decode
//! as their zero value. A field that starts inside the payload but does not
//! fit is an error.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{ProtocolError, Result};

/// Builder for outbound payloads.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn push_i8(&mut self, v: i8) {
        self.buf.push(v as u8);
    }

    pub fn push_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn push_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn push_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn push_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn push_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn push_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Booleans occupy one byte on the wire.
    pub fn push_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    /// Append a fixed-length byte array field.
    pub fn push_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish and return the payload bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor that decodes payload fields in declared order.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes left to decode.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Take the next `needed` bytes. `None` marks an absent trailing field.
    fn take(&mut self, needed: usize) -> Result<Option<&'a [u8]>> {
        let got = self.remaining();
        if got == 0 {
            return Ok(None);
        }
        if got < needed {
            return Err(ProtocolError::PayloadExhausted { needed, got }.into());
        }
        let chunk = &self.buf[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(Some(chunk))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?.map_or(0, |c| c[0]))
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.take(2)?.map_or(0, LittleEndian::read_u16))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.take(2)?.map_or(0, LittleEndian::read_i16))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.take(4)?.map_or(0, LittleEndian::read_u32))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.take(4)?.map_or(0, LittleEndian::read_i32))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(self.take(8)?.map_or(0, LittleEndian::read_u64))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.take(8)?.map_or(0, LittleEndian::read_i64))
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a fixed-length byte array field.
    pub fn read_bytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        if let Some(chunk) = self.take(N)? {
            out.copy_from_slice(chunk);
        }
        Ok(out)
    }
}
