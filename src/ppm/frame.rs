//! PPM frame codec
//!
//! A frame starts with a header byte: bit 7 marks a keyframe, bits 5-6 mean a
//! translation vector (two `i8`) follows, bits 0-4 pick the paper and pen
//! colours. Then come 48 bytes of line types per layer (2 bits per line,
//! low bits first) and the line data for layer 1 followed by layer 2.

use super::{PpmDecoder, PPM_HEIGHT, PPM_WIDTH};
use crate::error::Result;
use crate::reader::{ByteReader, Endian};

const LINE_ENCODING_SIZE: usize = PPM_HEIGHT / 4;

/// How a single 256-pixel line is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineType {
    /// Nothing stored, the line is empty
    Skip,
    /// 32-bit chunk mask followed by the set chunks
    Coded,
    /// Like `Coded`, but the line starts filled with ink
    InvertedCoded,
    /// 32 raw chunk bytes
    Raw,
}

impl LineType {
    fn from_encoding(encoding: &[u8], line: usize) -> Self {
        match (encoding[line >> 2] >> ((line & 0x3) * 2)) & 0x3 {
            0 => LineType::Skip,
            1 => LineType::Coded,
            2 => LineType::InvertedCoded,
            _ => LineType::Raw,
        }
    }
}

/// Unpack an 8-pixel chunk, least significant bit leftmost
fn unpack_chunk(chunk: u8, pixels: &mut [u8]) {
    for (bit, pixel) in pixels.iter_mut().enumerate() {
        *pixel = (chunk >> bit) & 0x1;
    }
}

/// Decode one layer's lines into `buffer`, which must start zeroed
pub(crate) fn decode_layer(
    reader: &mut ByteReader<'_>,
    encoding: &[u8],
    buffer: &mut [u8],
) -> Result<()> {
    for (y, line) in buffer.chunks_exact_mut(PPM_WIDTH).enumerate() {
        match LineType::from_encoding(encoding, y) {
            LineType::Skip => {}
            kind @ (LineType::Coded | LineType::InvertedCoded) => {
                if kind == LineType::InvertedCoded {
                    line.fill(1);
                }
                let mut mask = reader.read_u32(Endian::Big)?;
                let mut x = 0;
                while mask != 0 {
                    if mask & 0x8000_0000 != 0 {
                        let chunk = reader.read_u8()?;
                        unpack_chunk(chunk, &mut line[x..x + 8]);
                    }
                    x += 8;
                    mask <<= 1;
                }
            }
            LineType::Raw => {
                let chunks = reader.read_bytes(PPM_WIDTH / 8)?;
                for (&chunk, pixels) in chunks.iter().zip(line.chunks_exact_mut(8)) {
                    unpack_chunk(chunk, pixels);
                }
            }
        }
    }
    Ok(())
}

/// XOR `current` with `previous` shifted by `(dx, dy)`.
///
/// Pixels whose source falls outside the frame keep their decoded value.
pub(crate) fn apply_diff(current: &mut [u8], previous: &[u8], dx: i32, dy: i32) {
    if dx == 0 && dy == 0 {
        current
            .iter_mut()
            .zip(previous)
            .for_each(|(dst, &src)| *dst ^= src);
        return;
    }
    let (width, height) = (PPM_WIDTH as i32, PPM_HEIGHT as i32);
    for y in 0..height {
        let src_y = y - dy;
        if !(0..height).contains(&src_y) {
            continue;
        }
        for x in 0..width {
            let src_x = x - dx;
            if !(0..width).contains(&src_x) {
                continue;
            }
            current[(y * width + x) as usize] ^= previous[(src_y * width + src_x) as usize];
        }
    }
}

impl<'a> PpmDecoder<'a> {
    fn is_keyframe(&mut self, index: usize) -> Result<bool> {
        Ok(self.frame_header(index)? & 0x80 != 0)
    }

    /// Bring the layer buffers to frame `index`, decoding the diff frames
    /// between the nearest usable base and `index` in order
    pub(super) fn decode_frame_chain(&mut self, index: usize) -> Result<()> {
        if self.last_decoded == Some(index) {
            return Ok(());
        }
        let mut start = index;
        while start > 0 && self.last_decoded != Some(start - 1) && !self.is_keyframe(start)? {
            start -= 1;
        }
        if start != index {
            tracing::trace!(start, index, "decoding PPM diff chain");
        }
        for frame in start..=index {
            self.decode_single_frame(frame)?;
        }
        Ok(())
    }

    fn decode_single_frame(&mut self, index: usize) -> Result<()> {
        self.reader.seek_to(self.frame_offsets[index])?;
        let header = self.reader.read_u8()?;
        // frame 0 has nothing to diff against
        let is_keyframe = header & 0x80 != 0 || index == 0;
        let (dx, dy) = if (header >> 5) & 0x3 != 0 {
            (
                self.reader.read_i8()? as i32,
                self.reader.read_i8()? as i32,
            )
        } else {
            (0, 0)
        };
        let encodings = [
            self.reader.read_bytes(LINE_ENCODING_SIZE)?,
            self.reader.read_bytes(LINE_ENCODING_SIZE)?,
        ];

        // previous buffers now hold frame index - 1
        std::mem::swap(&mut self.layer_buffers, &mut self.prev_layer_buffers);

        for (buffer, encoding) in self.layer_buffers.iter_mut().zip(encodings) {
            buffer.fill(0);
            decode_layer(&mut self.reader, encoding, buffer)?;
        }

        if !is_keyframe {
            for (current, previous) in self
                .layer_buffers
                .iter_mut()
                .zip(self.prev_layer_buffers.iter())
            {
                apply_diff(current, previous, dx, dy);
            }
        }

        self.last_decoded = Some(index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoding_with(line: usize, kind: u8) -> Vec<u8> {
        let mut encoding = vec![0u8; LINE_ENCODING_SIZE];
        encoding[line >> 2] |= kind << ((line & 0x3) * 2);
        encoding
    }

    #[test]
    fn test_line_type_from_encoding() {
        let encoding = [0b1110_0100u8; LINE_ENCODING_SIZE];
        assert_eq!(LineType::from_encoding(&encoding, 0), LineType::Skip);
        assert_eq!(LineType::from_encoding(&encoding, 1), LineType::Coded);
        assert_eq!(LineType::from_encoding(&encoding, 2), LineType::InvertedCoded);
        assert_eq!(LineType::from_encoding(&encoding, 3), LineType::Raw);
    }

    #[test]
    fn test_coded_line_reads_set_chunks() {
        // chunks 0 and 2 present
        let data = [0xA0, 0x00, 0x00, 0x00, 0b0000_0101, 0xFF];
        let mut reader = ByteReader::new(&data);
        let mut buffer = vec![0u8; PPM_WIDTH * PPM_HEIGHT];
        decode_layer(&mut reader, &encoding_with(0, 1), &mut buffer).unwrap();

        assert_eq!(&buffer[0..8], &[1, 0, 1, 0, 0, 0, 0, 0]);
        assert!(buffer[8..16].iter().all(|&p| p == 0));
        assert!(buffer[16..24].iter().all(|&p| p == 1));
        assert!(buffer[24..].iter().all(|&p| p == 0));
        assert_eq!(reader.position(), data.len());
    }

    #[test]
    fn test_inverted_line_starts_filled() {
        let data = [0x80, 0x00, 0x00, 0x00, 0x00];
        let mut reader = ByteReader::new(&data);
        let mut buffer = vec![0u8; PPM_WIDTH * PPM_HEIGHT];
        decode_layer(&mut reader, &encoding_with(5, 2), &mut buffer).unwrap();

        let line = &buffer[5 * PPM_WIDTH..6 * PPM_WIDTH];
        assert!(line[0..8].iter().all(|&p| p == 0));
        assert!(line[8..].iter().all(|&p| p == 1));
    }

    #[test]
    fn test_raw_line() {
        let mut data = vec![0u8; 32];
        data[31] = 0x80;
        let mut reader = ByteReader::new(&data);
        let mut buffer = vec![0u8; PPM_WIDTH * PPM_HEIGHT];
        decode_layer(&mut reader, &encoding_with(191, 3), &mut buffer).unwrap();

        assert_eq!(buffer[PPM_WIDTH * PPM_HEIGHT - 1], 1);
        assert_eq!(buffer.iter().filter(|&&p| p == 1).count(), 1);
    }

    #[test]
    fn test_truncated_line_errors() {
        let data = [0x80, 0x00];
        let mut reader = ByteReader::new(&data);
        let mut buffer = vec![0u8; PPM_WIDTH * PPM_HEIGHT];
        assert!(decode_layer(&mut reader, &encoding_with(0, 1), &mut buffer).is_err());
    }

    #[test]
    fn test_diff_without_translation_is_xor() {
        let mut current = vec![1u8, 0, 1, 0];
        current.resize(PPM_WIDTH * PPM_HEIGHT, 0);
        let mut previous = vec![1u8, 1, 0, 0];
        previous.resize(PPM_WIDTH * PPM_HEIGHT, 0);
        apply_diff(&mut current, &previous, 0, 0);
        assert_eq!(&current[0..4], &[0, 1, 1, 0]);
    }

    #[test]
    fn test_diff_with_translation_shifts_source() {
        let mut previous = vec![0u8; PPM_WIDTH * PPM_HEIGHT];
        previous[0] = 1;
        previous[PPM_WIDTH * PPM_HEIGHT - 1] = 1;
        let mut current = vec![0u8; PPM_WIDTH * PPM_HEIGHT];
        apply_diff(&mut current, &previous, 3, 2);

        assert_eq!(current[2 * PPM_WIDTH + 3], 1);
        // the bottom-right source pixel is shifted out of the frame
        assert_eq!(current.iter().filter(|&&p| p == 1).count(), 1);
    }

    #[test]
    fn test_diff_negative_translation() {
        let mut previous = vec![0u8; PPM_WIDTH * PPM_HEIGHT];
        previous[PPM_WIDTH + 1] = 1;
        let mut current = vec![0u8; PPM_WIDTH * PPM_HEIGHT];
        current[PPM_WIDTH * PPM_HEIGHT - 1] = 1;
        apply_diff(&mut current, &previous, -1, -1);

        assert_eq!(current[0], 1);
        // no source for the last pixel, decoded value stays
        assert_eq!(current[PPM_WIDTH * PPM_HEIGHT - 1], 1);
    }
}
