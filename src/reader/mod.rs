//! Byte and bit readers over an in-memory Flipnote buffer
//!
//! [`ByteReader`] is a seekable cursor used by both container parsers. Each
//! read is a small `nom` parser run against the remaining input; failures are
//! reported as [`FlipnoteError::MalformedContainer`] carrying the offset.
//! [`BitReader`] is the LSB-first reader used by KWZ tile streams.

pub mod bits;

pub use bits::BitReader;

use crate::error::{FlipnoteError, Result};
use nom::bytes::complete::take;
use nom::number::complete as number;
use nom::number::Endianness;
use nom::IResult;

type ParseResult<'a, T> = IResult<&'a [u8], T, nom::error::Error<&'a [u8]>>;

/// Byte order for multi-byte reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// Least significant byte first (the default for both formats)
    Little,
    /// Most significant byte first (PPM line masks)
    Big,
}

impl From<Endian> for Endianness {
    fn from(endian: Endian) -> Self {
        match endian {
            Endian::Little => Endianness::Little,
            Endian::Big => Endianness::Big,
        }
    }
}

/// Origin for [`ByteReader::seek`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    /// Absolute offset from the start of the buffer
    Begin,
    /// Relative to the current position
    Current,
    /// Relative to the end of the buffer
    End,
}

/// Seekable little-endian cursor over a borrowed byte buffer
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader positioned at offset 0
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    /// The whole underlying buffer
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Buffer length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for an empty buffer
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current cursor position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor. Seeking to exactly the end of the buffer is allowed.
    pub fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<()> {
        let base = match origin {
            SeekOrigin::Begin => 0i64,
            SeekOrigin::Current => self.pos as i64,
            SeekOrigin::End => self.data.len() as i64,
        };
        let target = base
            .checked_add(offset)
            .filter(|t| (0..=self.data.len() as i64).contains(t))
            .ok_or_else(|| {
                FlipnoteError::MalformedContainer(format!(
                    "seek to {base}{offset:+} outside buffer of {} bytes",
                    self.data.len()
                ))
            })?;
        self.pos = target as usize;
        Ok(())
    }

    /// Absolute seek
    pub fn seek_to(&mut self, pos: usize) -> Result<()> {
        self.seek(pos as i64, SeekOrigin::Begin)
    }

    fn run<T>(
        &mut self,
        width: usize,
        parser: impl FnOnce(&'a [u8]) -> ParseResult<'a, T>,
    ) -> Result<T> {
        let input = self.data.get(self.pos..).unwrap_or(&[]);
        match parser(input) {
            Ok((rest, value)) => {
                self.pos = self.data.len() - rest.len();
                Ok(value)
            }
            Err(_) => Err(FlipnoteError::MalformedContainer(format!(
                "read of {width} bytes at offset 0x{:X} exceeds file length {}",
                self.pos,
                self.data.len()
            ))),
        }
    }

    /// Read one unsigned byte
    pub fn read_u8(&mut self) -> Result<u8> {
        self.run(1, number::u8::<_, nom::error::Error<&'a [u8]>>)
    }

    /// Read one signed byte
    pub fn read_i8(&mut self) -> Result<i8> {
        self.run(1, number::i8::<_, nom::error::Error<&'a [u8]>>)
    }

    /// Read an unsigned 16-bit integer
    pub fn read_u16(&mut self, endian: Endian) -> Result<u16> {
        self.run(2, number::u16::<_, nom::error::Error<&'a [u8]>>(endian.into()))
    }

    /// Read a signed 16-bit integer
    pub fn read_i16(&mut self, endian: Endian) -> Result<i16> {
        self.run(2, number::i16::<_, nom::error::Error<&'a [u8]>>(endian.into()))
    }

    /// Read an unsigned 32-bit integer
    pub fn read_u32(&mut self, endian: Endian) -> Result<u32> {
        self.run(4, number::u32::<_, nom::error::Error<&'a [u8]>>(endian.into()))
    }

    /// Read a signed 32-bit integer
    pub fn read_i32(&mut self, endian: Endian) -> Result<i32> {
        self.run(4, number::i32::<_, nom::error::Error<&'a [u8]>>(endian.into()))
    }

    /// Little-endian `u16`
    pub fn read_u16_le(&mut self) -> Result<u16> {
        self.read_u16(Endian::Little)
    }

    /// Little-endian `u32`
    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.read_u32(Endian::Little)
    }

    /// Borrow the next `n` bytes without copying
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.run(n, take(n))
    }

    /// Fixed-width ASCII field, truncated at the first NUL
    pub fn read_fixed_ascii(&mut self, n: usize) -> Result<String> {
        let bytes = self.read_bytes(n)?;
        Ok(bytes
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect())
    }

    /// Fixed-width UTF-16LE field of `n` code units, truncated at the first zero unit
    pub fn read_fixed_utf16(&mut self, n: usize) -> Result<String> {
        let bytes = self.read_bytes(n * 2)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|&unit| unit != 0)
            .collect();
        Ok(String::from_utf16_lossy(&units))
    }

    /// Upper-case hex string of the next `n` bytes, optionally byte-reversed
    pub fn read_hex(&mut self, n: usize, reverse: bool) -> Result<String> {
        let bytes = self.read_bytes(n)?;
        let hex = |b: &u8| format!("{b:02X}");
        Ok(if reverse {
            bytes.iter().rev().map(hex).collect()
        } else {
            bytes.iter().map(hex).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_advance_cursor() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u8().unwrap(), 0x01);
        assert_eq!(reader.read_u16_le().unwrap(), 0x0302);
        assert_eq!(reader.read_u32(Endian::Big).unwrap(), 0x0405_0607);
        assert_eq!(reader.position(), 7);
    }

    #[test]
    fn test_out_of_bounds_is_error_and_keeps_position() {
        let data = [0xAA, 0xBB, 0xCC];
        let mut reader = ByteReader::new(&data);
        reader.seek_to(1).unwrap();
        let err = reader.read_u32_le().unwrap_err();
        assert!(matches!(err, FlipnoteError::MalformedContainer(_)));
        assert_eq!(reader.position(), 1);
    }

    #[test]
    fn test_seek_origins() {
        let data = [0u8; 16];
        let mut reader = ByteReader::new(&data);
        reader.seek(-4, SeekOrigin::End).unwrap();
        assert_eq!(reader.position(), 12);
        reader.seek(2, SeekOrigin::Current).unwrap();
        assert_eq!(reader.position(), 14);
        reader.seek(16, SeekOrigin::Begin).unwrap();
        assert!(reader.seek(1, SeekOrigin::Current).is_err());
        assert!(reader.seek(-1, SeekOrigin::Begin).is_err());
    }

    #[test]
    fn test_signed_reads() {
        let data = [0xFF, 0xFE, 0xFF];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_i8().unwrap(), -1);
        assert_eq!(reader.read_i16(Endian::Little).unwrap(), -2);
    }

    #[test]
    fn test_fixed_strings_stop_at_nul() {
        let mut data = b"KFH\0junk".to_vec();
        data.extend_from_slice(&[b'h', 0, b'i', 0, 0, 0, b'x', 0]);
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_fixed_ascii(8).unwrap(), "KFH");
        assert_eq!(reader.read_fixed_utf16(4).unwrap(), "hi");
        assert_eq!(reader.position(), data.len());
    }

    #[test]
    fn test_read_bytes_is_a_view() {
        let data = [1u8, 2, 3, 4];
        let mut reader = ByteReader::new(&data);
        let view = reader.read_bytes(3).unwrap();
        assert_eq!(view.as_ptr(), data.as_ptr());
        assert_eq!(view, &[1, 2, 3]);
    }

    #[test]
    fn test_read_hex_reversed() {
        let data = [0x12, 0xAB, 0x0C];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_hex(3, true).unwrap(), "0CAB12");
        reader.seek_to(0).unwrap();
        assert_eq!(reader.read_hex(3, false).unwrap(), "12AB0C");
    }
}
