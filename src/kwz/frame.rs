//! KWZ frame decoding
//!
//! Each layer is a bitstream of 8x8 tiles visited in raster order inside
//! 128x128 super-tiles. A 3-bit code selects how the tile's eight lines are
//! built from the line tables; code 5 leaves the next tiles untouched.

use super::tables::{Line, LineTables, KWZ_LINE_TABLE_SIZE};
use super::{KwzDecoder, KWZ_HEIGHT, KWZ_NUM_LAYERS, KWZ_WIDTH};
use crate::error::{FlipnoteError, Result};
use crate::format::LayerMask;
use crate::reader::BitReader;

/// Byte length of a layer that is identical to the previous frame
pub const KWZ_UNCHANGED_LAYER_SIZE: usize = 38;

const SUPERTILE_SIZE: usize = 128;
const TILE_SIZE: usize = 8;

/// Row sequences for tile type 7, `true` selecting line `b`
const ALTERNATION_PATTERNS: [[bool; 8]; 4] = [
    [false, true, false, true, false, true, false, true],
    [false, false, true, false, false, true, false, false],
    [false, true, false, false, true, false, false, true],
    [false, true, true, false, true, true, false, true],
];

/// Counters describing the work done by [`KwzDecoder`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Layers run through the tile decoder
    pub layers_decoded: usize,
    /// Layers skipped because their data marks them unchanged
    pub layers_unchanged: usize,
    /// Layers skipped because the caller did not ask for them
    pub layers_masked: usize,
}

fn full_line(table: &[Line], index: u32) -> Result<Line> {
    table.get(index as usize).copied().ok_or_else(|| {
        FlipnoteError::MalformedContainer(format!(
            "line index {index} outside table of {KWZ_LINE_TABLE_SIZE}"
        ))
    })
}

fn write_tile(buffer: &mut [u8], x: usize, y: usize, rows: &[Line; 8]) {
    for (row, line) in rows.iter().enumerate() {
        let at = (y + row) * KWZ_WIDTH + x;
        buffer[at..at + TILE_SIZE].copy_from_slice(line);
    }
}

/// Read one tile's lines, or `None` for a skip run of `skip` further tiles
fn read_tile(
    bits: &mut BitReader<'_>,
    tables: &LineTables,
    skip: &mut u32,
) -> Result<Option<[Line; 8]>> {
    let code = bits.read_bits(3)?;
    let rows = match code {
        0 => [tables.common[bits.read_bits(5)? as usize]; 8],
        1 => [full_line(&tables.full, bits.read_bits(13)?)?; 8],
        2 => {
            let index = bits.read_bits(5)? as usize;
            let (a, b) = (tables.common[index], tables.common_shifted[index]);
            [a, b, a, b, a, b, a, b]
        }
        3 => {
            let index = bits.read_bits(13)?;
            let (a, b) = (
                full_line(&tables.full, index)?,
                full_line(&tables.full_shifted, index)?,
            );
            [a, b, a, b, a, b, a, b]
        }
        4 => {
            let mask = bits.read_bits(8)?;
            let mut rows = [[0u8; 8]; 8];
            for (row, line) in rows.iter_mut().enumerate() {
                *line = if mask & (1 << row) != 0 {
                    tables.common[bits.read_bits(5)? as usize]
                } else {
                    full_line(&tables.full, bits.read_bits(13)?)?
                };
            }
            rows
        }
        5 => {
            *skip = bits.read_bits(5)?;
            return Ok(None);
        }
        7 => {
            let mut pattern = bits.read_bits(2)? as usize;
            let use_common = bits.read_bits(1)? == 1;
            let (a, b) = if use_common {
                pattern = (pattern + 1) % 4;
                (
                    tables.common[bits.read_bits(5)? as usize],
                    tables.common[bits.read_bits(5)? as usize],
                )
            } else {
                (
                    full_line(&tables.full, bits.read_bits(13)?)?,
                    full_line(&tables.full, bits.read_bits(13)?)?,
                )
            };
            ALTERNATION_PATTERNS[pattern].map(|pick_b| if pick_b { b } else { a })
        }
        code => return Err(FlipnoteError::UnsupportedTileCode { code }),
    };
    Ok(Some(rows))
}

/// Decode one layer bitstream into a 320x240 buffer.
///
/// Tiles covered by a skip run keep their current contents.
pub fn decode_layer_tiles(bits: &mut BitReader<'_>, buffer: &mut [u8]) -> Result<()> {
    let tables = LineTables::get();
    let mut skip = 0u32;

    for super_y in (0..KWZ_HEIGHT).step_by(SUPERTILE_SIZE) {
        for super_x in (0..KWZ_WIDTH).step_by(SUPERTILE_SIZE) {
            for tile_y in (0..SUPERTILE_SIZE).step_by(TILE_SIZE) {
                let y = super_y + tile_y;
                if y >= KWZ_HEIGHT {
                    break;
                }
                for tile_x in (0..SUPERTILE_SIZE).step_by(TILE_SIZE) {
                    let x = super_x + tile_x;
                    if x >= KWZ_WIDTH {
                        break;
                    }
                    if skip > 0 {
                        skip -= 1;
                        continue;
                    }
                    if let Some(rows) = read_tile(bits, tables, &mut skip)? {
                        write_tile(buffer, x, y, &rows);
                    }
                }
            }
        }
    }
    Ok(())
}

impl<'a> KwzDecoder<'a> {
    /// Decode frame `index`, restricted to the layers in `wanted`.
    ///
    /// Layers outside `wanted` keep whatever the buffers held before.
    pub fn decode_frame_layers(&mut self, index: usize, wanted: LayerMask) -> Result<&[Vec<u8>]> {
        self.check_frame(index)?;
        if let Err(err) = self.decode_frame_chain(index, wanted) {
            self.last_decoded = None;
            return Err(err);
        }
        Ok(&self.layer_buffers)
    }

    fn decode_frame_chain(&mut self, index: usize, wanted: LayerMask) -> Result<()> {
        if self.last_decoded == Some(index) && self.last_mask.contains(wanted) {
            return Ok(());
        }

        // walk back until a frame whose predecessor is already decoded for
        // every layer it diffs against, or until no wanted layer depends on
        // its predecessor
        let mut chain = vec![(index, wanted)];
        let (mut frame, mut mask, mut prefetch) = (index, wanted, false);
        while frame > 0 {
            let diffing = self.frame_entry(frame)?.diffing_layers();
            if prefetch {
                mask &= diffing;
            }
            if mask.is_empty() {
                break;
            }
            if self.last_decoded == Some(frame - 1) && self.last_mask.contains(mask & diffing) {
                break;
            }
            frame -= 1;
            chain.push((frame, mask));
            prefetch = true;
        }
        if chain.len() > 1 {
            tracing::debug!(index, depth = chain.len(), "decoding KWZ diff chain");
        }

        for &(frame, mask) in chain.iter().rev() {
            self.decode_single_frame(frame, mask)?;
        }
        Ok(())
    }

    fn decode_single_frame(&mut self, index: usize, mask: LayerMask) -> Result<()> {
        let entry = self.frame_entry(index)?;
        let data = self.reader.data();
        let mut layer_offset = self.frame_data_offsets[index];

        for layer in 0..KWZ_NUM_LAYERS {
            let size = entry.layer_sizes[layer] as usize;
            let start = layer_offset;
            layer_offset += size;

            if size == KWZ_UNCHANGED_LAYER_SIZE {
                tracing::trace!(frame = index, layer, "layer unchanged");
                self.stats.layers_unchanged += 1;
                continue;
            }
            if !mask.has_layer(layer) {
                tracing::trace!(frame = index, layer, "layer not requested");
                self.stats.layers_masked += 1;
                continue;
            }

            let stream = data.get(start..).ok_or_else(|| {
                FlipnoteError::MalformedContainer(format!(
                    "frame {index} layer {layer} starts past end of file"
                ))
            })?;
            let mut bits = BitReader::new(stream);
            decode_layer_tiles(&mut bits, &mut self.layer_buffers[layer])?;
            self.stats.layers_decoded += 1;
        }

        self.last_decoded = Some(index);
        self.last_mask = mask;
        Ok(())
    }
}
