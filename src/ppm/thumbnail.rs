//! PPM thumbnail: 64x48 pixels, 4 bits each, stored as 8x8 tiles
//! row by row with the low nibble holding the left pixel.

use super::PpmDecoder;
use crate::error::Result;
use crate::format::Rgba;

/// Thumbnail width in pixels
pub const PPM_THUMB_WIDTH: usize = 64;
/// Thumbnail height in pixels
pub const PPM_THUMB_HEIGHT: usize = 48;
/// Offset of the thumbnail bitmap
pub const PPM_THUMB_OFFSET: usize = 0x00A0;
const PPM_THUMB_SIZE: usize = PPM_THUMB_WIDTH * PPM_THUMB_HEIGHT / 2;

/// Fixed 16-colour thumbnail palette
pub const PPM_THUMB_PALETTE: [Rgba; 16] = [
    Rgba::rgb(0xFF, 0xFF, 0xFF),
    Rgba::rgb(0x52, 0x52, 0x52),
    Rgba::rgb(0xFF, 0xFF, 0xFF),
    Rgba::rgb(0x9C, 0x9C, 0x9C),
    Rgba::rgb(0xFF, 0x48, 0x44),
    Rgba::rgb(0xC8, 0x51, 0x4F),
    Rgba::rgb(0xFF, 0xAD, 0xAC),
    Rgba::rgb(0x00, 0xFF, 0x00),
    Rgba::rgb(0x48, 0x40, 0xFF),
    Rgba::rgb(0x51, 0x4F, 0xB8),
    Rgba::rgb(0xAD, 0xAB, 0xFF),
    Rgba::rgb(0x00, 0xFF, 0x00),
    Rgba::rgb(0xB6, 0x57, 0xB7),
    Rgba::rgb(0x00, 0xFF, 0x00),
    Rgba::rgb(0x00, 0xFF, 0x00),
    Rgba::rgb(0x00, 0xFF, 0x00),
];

/// Untile a raw thumbnail into row-major palette indices
pub fn untile_thumbnail(raw: &[u8]) -> Vec<u8> {
    let mut pixels = vec![0u8; PPM_THUMB_WIDTH * PPM_THUMB_HEIGHT];
    let mut bytes = raw.iter();
    for tile_y in (0..PPM_THUMB_HEIGHT).step_by(8) {
        for tile_x in (0..PPM_THUMB_WIDTH).step_by(8) {
            for y in 0..8 {
                for x in (0..8).step_by(2) {
                    let byte = bytes.next().copied().unwrap_or(0);
                    let at = (tile_y + y) * PPM_THUMB_WIDTH + tile_x + x;
                    pixels[at] = byte & 0x0F;
                    pixels[at + 1] = byte >> 4;
                }
            }
        }
    }
    pixels
}

impl<'a> PpmDecoder<'a> {
    /// Thumbnail as palette indices into [`PPM_THUMB_PALETTE`]
    pub fn thumbnail_pixels(&mut self) -> Result<Vec<u8>> {
        self.reader.seek_to(PPM_THUMB_OFFSET)?;
        let raw = self.reader.read_bytes(PPM_THUMB_SIZE)?;
        Ok(untile_thumbnail(raw))
    }

    /// Thumbnail as RGBA pixels
    pub fn thumbnail_rgba(&mut self) -> Result<Vec<Rgba>> {
        Ok(self
            .thumbnail_pixels()?
            .into_iter()
            .map(|i| PPM_THUMB_PALETTE[i as usize])
            .collect())
    }
}
