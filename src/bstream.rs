//! Bit stream primitives for the block codec.
//!
//! Bits are packed MSB-first within each byte. The writer keeps its
//! trailing partial byte zero-filled, so flushing mid-byte yields exactly
//! the zero padding the block format requires.

use bytes::{BufMut, BytesMut};
use std::borrow::Cow;
use std::io;

/// A stream of bits for writing.
pub struct BitStreamWriter {
    stream: BytesMut,
    len_bits: usize,
}

impl Default for BitStreamWriter {
    fn default() -> Self {
        Self {
            stream: BytesMut::new(),
            len_bits: 0,
        }
    }
}

impl BitStreamWriter {
    /// Creates a new BitStreamWriter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new BitStreamWriter with specified byte capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stream: BytesMut::with_capacity(capacity),
            len_bits: 0,
        }
    }

    /// Writes a single bit.
    pub fn write_bit(&mut self, bit: bool) {
        self.write_bits(bit as u64, 1);
    }

    /// Writes the low `nbits` of `value`, most significant bit first.
    /// Bits of `value` above `nbits` are ignored.
    pub fn write_bits(&mut self, value: u64, nbits: u8) {
        assert!(nbits <= 64, "nbits must be <= 64");
        if nbits == 0 {
            return;
        }

        // Align the field's most significant bit at the top of the word;
        // this also discards anything above the field width.
        let mut val = value.wrapping_shl(64 - nbits as u32);
        let mut left = nbits;

        while left > 0 {
            let offset = (self.len_bits % 8) as u8;
            if offset == 0 {
                self.stream.put_u8(0);
            }
            let take = (8 - offset).min(left);
            let chunk = (val >> (64 - take as u32)) as u8;

            let last = self.stream.len() - 1;
            self.stream[last] |= chunk << (8 - offset - take);

            val = val.wrapping_shl(take as u32);
            self.len_bits += take as usize;
            left -= take;
        }
    }

    /// Returns the total number of bits written.
    pub fn len_bits(&self) -> usize {
        self.len_bits
    }

    /// Returns the bytes written so far, the last one zero-padded.
    pub fn bytes(&self) -> &[u8] {
        &self.stream
    }

    /// Consumes the writer and returns the padded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.stream.to_vec()
    }
}

/// A stream of bits for reading.
///
/// Exhaustion is reported as [`io::ErrorKind::UnexpectedEof`], distinct
/// from any other error kind.
pub struct BitStreamReader<'a> {
    stream: Cow<'a, [u8]>,
    /// Current bit position from the start of the stream.
    pos: usize,
}

impl<'a> BitStreamReader<'a> {
    /// Creates a new BitStreamReader that owns its bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            stream: Cow::Owned(bytes),
            pos: 0,
        }
    }

    /// Creates a new BitStreamReader borrowing an existing byte slice.
    pub fn from_slice(bytes: &'a [u8]) -> Self {
        Self {
            stream: Cow::Borrowed(bytes),
            pos: 0,
        }
    }

    /// Reads a single bit.
    pub fn read_bit(&mut self) -> io::Result<bool> {
        if self.pos >= self.stream.len() * 8 {
            return Err(eof());
        }
        let bit = (self.stream[self.pos / 8] >> (7 - (self.pos % 8) as u8)) & 1;
        self.pos += 1;
        Ok(bit == 1)
    }

    /// Reads `nbits` bits as a right-aligned u64.
    pub fn read_bits(&mut self, nbits: u8) -> io::Result<u64> {
        assert!(nbits <= 64, "nbits must be <= 64");
        if nbits == 0 {
            return Ok(0);
        }
        if self.pos + nbits as usize > self.stream.len() * 8 {
            return Err(eof());
        }

        let mut out = 0u64;
        let mut left = nbits;
        while left > 0 {
            let offset = (self.pos % 8) as u8;
            let take = (8 - offset).min(left);
            let chunk = (self.stream[self.pos / 8] << offset) >> (8 - take);

            out = (out << take) | chunk as u64;
            self.pos += take as usize;
            left -= take;
        }
        Ok(out)
    }
}

fn eof() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected end of bit stream")
}
