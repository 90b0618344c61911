//! Precomputed 8-pixel line tables for KWZ tiles
//!
//! Every line of a KWZ tile is one of the 3^8 possible 8-pixel rows of
//! 3-valued pixels. Tiles reference them through a 13-bit index into the
//! full table or a 5-bit index into a 32-entry table of frequent lines.

use std::sync::OnceLock;

/// One 8-pixel line
pub type Line = [u8; 8];

/// Number of entries in the full table
pub const KWZ_LINE_TABLE_SIZE: usize = 6561;

/// Full-table indices of the 32 frequent lines
pub const KWZ_COMMON_LINE_INDICES: [u16; 32] = [
    0x0000, 0x0CD0, 0x19A0, 0x02D9, 0x088B, 0x0051, 0x00F3, 0x0009, 0x001B, 0x0001, 0x0003,
    0x05B2, 0x1116, 0x00A2, 0x01E6, 0x0012, 0x0036, 0x0002, 0x0006, 0x0B64, 0x08DC, 0x0144,
    0x00FC, 0x0024, 0x001C, 0x0004, 0x0334, 0x099C, 0x0668, 0x1338, 0x1004, 0x166C,
];

/// Immutable line tables shared by every KWZ decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTables {
    /// All 3^8 lines
    pub full: Vec<Line>,
    /// `full` rotated left by one pixel
    pub full_shifted: Vec<Line>,
    /// Frequent lines
    pub common: [Line; 32],
    /// Frequent lines, rotated
    pub common_shifted: [Line; 32],
}

static LINE_TABLES: OnceLock<LineTables> = OnceLock::new();

impl LineTables {
    /// Build the tables from scratch
    pub fn generate() -> Self {
        let mut full = Vec::with_capacity(KWZ_LINE_TABLE_SIZE);
        let mut full_shifted = Vec::with_capacity(KWZ_LINE_TABLE_SIZE);
        for a in 0..3u8 {
            for b in 0..3u8 {
                for c in 0..3u8 {
                    for d in 0..3u8 {
                        for e in 0..3u8 {
                            for f in 0..3u8 {
                                for g in 0..3u8 {
                                    for h in 0..3u8 {
                                        full.push([b, a, d, c, f, e, h, g]);
                                        full_shifted.push([a, d, c, f, e, h, g, b]);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        let common = KWZ_COMMON_LINE_INDICES.map(|i| full[i as usize]);
        let common_shifted = KWZ_COMMON_LINE_INDICES.map(|i| full_shifted[i as usize]);

        LineTables {
            full,
            full_shifted,
            common,
            common_shifted,
        }
    }

    /// Process-wide tables, built on first use
    pub fn get() -> &'static LineTables {
        LINE_TABLES.get_or_init(LineTables::generate)
    }
}
