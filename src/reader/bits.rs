//! LSB-first bit reader for KWZ layer bitstreams
//!
//! Bits are pulled from 16-bit little-endian words. A fresh reader is created
//! at the start of every layer since layer streams are byte aligned.

use crate::error::{FlipnoteError, Result};

/// Bit reader over a borrowed slice starting at a layer's first byte
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bits: u32,
    available: u32,
}

impl<'a> BitReader<'a> {
    /// Largest width accepted by [`BitReader::read_bits`]
    pub const MAX_BITS: u32 = 16;

    /// Create a reader with an empty bit buffer
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            pos: 0,
            bits: 0,
            available: 0,
        }
    }

    /// Discard buffered bits and restart at byte `offset` of the slice
    pub fn reset(&mut self, offset: usize) {
        self.pos = offset;
        self.bits = 0;
        self.available = 0;
    }

    /// Bytes consumed so far (always a multiple of two)
    pub fn bytes_consumed(&self) -> usize {
        self.pos
    }

    fn pull_word(&mut self) -> Result<()> {
        let word = self
            .data
            .get(self.pos..self.pos + 2)
            .map(|w| u16::from_le_bytes([w[0], w[1]]))
            .ok_or_else(|| {
                FlipnoteError::MalformedContainer(format!(
                    "layer bitstream ends at byte {} of {}",
                    self.pos,
                    self.data.len()
                ))
            })?;
        self.bits |= (word as u32) << self.available;
        self.available += 16;
        self.pos += 2;
        Ok(())
    }

    /// Read `n` bits (1..=16), least significant first
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n == 0 || n > Self::MAX_BITS {
            return Err(FlipnoteError::UnsupportedBitWidth { bits: n });
        }
        if self.available < n {
            self.pull_word()?;
        }
        let value = self.bits & ((1u32 << n) - 1);
        self.bits >>= n;
        self.available -= n;
        Ok(value)
    }
}
