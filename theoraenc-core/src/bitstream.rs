//! Bitstream reading and writing utilities.
//!
//! Theora packs every header and frame field most-significant-bit first.
//! [`BitWriter`] is the sink used by the encoder; [`BitReader`] reads the same
//! layout back and is used to inspect emitted headers.

use crate::error::{BitstreamError, Result};

/// A bitstream reader for MSB-first packed data.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// Create a new bit reader from a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// Get the total number of bits in the stream.
    pub fn total_bits(&self) -> usize {
        self.data.len() * 8
    }

    /// Get the current bit position in the stream.
    pub fn position(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// Get the number of remaining bits.
    pub fn remaining_bits(&self) -> usize {
        self.total_bits().saturating_sub(self.position())
    }

    /// Check if we've reached the end of the stream.
    pub fn is_eof(&self) -> bool {
        self.byte_pos >= self.data.len()
    }

    /// Check if the stream is byte-aligned.
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_pos == 0
    }

    /// Skip to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        if self.bit_pos != 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// Read a single bit.
    pub fn read_bit(&mut self) -> Result<bool> {
        if self.byte_pos >= self.data.len() {
            return Err(BitstreamError::UnexpectedEnd.into());
        }

        let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(bit != 0)
    }

    /// Read up to 32 bits as an unsigned integer.
    pub fn read_bits(&mut self, n: u8) -> Result<u32> {
        if n > 32 {
            return Err(BitstreamError::InvalidWidth(n).into());
        }
        self.read_bits_u64(n).map(|v| v as u32)
    }

    /// Read up to 64 bits as an unsigned integer.
    pub fn read_bits_u64(&mut self, n: u8) -> Result<u64> {
        if n == 0 {
            return Ok(0);
        }
        if n > 64 {
            return Err(BitstreamError::InvalidWidth(n).into());
        }
        if self.remaining_bits() < n as usize {
            return Err(BitstreamError::UnexpectedEnd.into());
        }

        let mut value: u64 = 0;
        for _ in 0..n {
            value = (value << 1) | (self.read_bit()? as u64);
        }

        Ok(value)
    }

    /// Read an unsigned 8-bit value.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_bits(8).map(|v| v as u8)
    }

    /// Read an unsigned 32-bit value (big-endian bit order).
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_bits(32)
    }

    /// Skip a number of bits.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if self.remaining_bits() < n {
            return Err(BitstreamError::UnexpectedEnd.into());
        }

        let new_pos = self.position() + n;
        self.byte_pos = new_pos / 8;
        self.bit_pos = (new_pos % 8) as u8;

        Ok(())
    }

    /// Peek at the next n bits without consuming them.
    pub fn peek_bits(&self, n: u8) -> Result<u32> {
        let mut clone = self.clone();
        clone.read_bits(n)
    }
}

/// An MSB-first bit sink.
///
/// Partial bytes are zero-padded; [`BitWriter::bytes_written`] counts them.
#[derive(Debug, Clone)]
pub struct BitWriter {
    data: Vec<u8>,
    bit_pos: u8,
}

impl BitWriter {
    /// Create a new bit writer.
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            bit_pos: 0,
        }
    }

    /// Create a new bit writer with capacity.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(bytes),
            bit_pos: 0,
        }
    }

    /// Discard everything written so far, keeping the allocation.
    pub fn reset(&mut self) {
        self.data.clear();
        self.bit_pos = 0;
    }

    /// Get the current bit position.
    pub fn position(&self) -> usize {
        self.data.len() * 8 - (8 - self.bit_pos as usize) % 8
    }

    /// Number of bytes produced so far, counting a trailing partial byte.
    pub fn bytes_written(&self) -> usize {
        self.data.len()
    }

    /// Check if the writer is byte-aligned.
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_pos == 0
    }

    /// Write a single bit.
    pub fn write_bit(&mut self, bit: bool) -> Result<()> {
        if self.bit_pos == 0 {
            self.data.push(0);
        }

        if bit {
            let idx = self.data.len() - 1;
            self.data[idx] |= 1 << (7 - self.bit_pos);
        }

        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
        }
        Ok(())
    }

    /// Write the low `n` bits of `value`, most significant first (n ≤ 32).
    pub fn write_bits(&mut self, value: u32, n: u8) -> Result<()> {
        if n > 32 {
            return Err(BitstreamError::InvalidWidth(n).into());
        }
        self.write_bits_u64(value as u64, n)
    }

    /// Write the low `n` bits of `value`, most significant first (n ≤ 64).
    pub fn write_bits_u64(&mut self, value: u64, n: u8) -> Result<()> {
        if n > 64 {
            return Err(BitstreamError::InvalidWidth(n).into());
        }
        if self.bit_pos == 0 && n % 8 == 0 {
            for shift in (0..n / 8).rev() {
                self.data.push((value >> (shift * 8)) as u8);
            }
            return Ok(());
        }
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1 != 0)?;
        }
        Ok(())
    }

    /// Write a signed value in `n`-bit two's complement.
    pub fn write_signed_bits(&mut self, value: i32, n: u8) -> Result<()> {
        let mask = if n >= 32 { u32::MAX } else { (1u32 << n) - 1 };
        self.write_bits(value as u32 & mask, n)
    }

    /// Append raw bytes, 8 bits each.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.bit_pos == 0 {
            self.data.extend_from_slice(bytes);
            return Ok(());
        }
        for &b in bytes {
            self.write_bits(b as u32, 8)?;
        }
        Ok(())
    }

    /// Align to byte boundary by writing zero bits.
    pub fn align_to_byte(&mut self) -> Result<()> {
        while self.bit_pos != 0 {
            self.write_bit(false)?;
        }
        Ok(())
    }

    /// Get the written data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Take the written data, consuming the writer.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}
