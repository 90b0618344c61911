//! Flipnote Studio ID formatting and region lookup

use serde::Serialize;

/// Console region an FSID was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Region {
    /// Japan
    Japan,
    /// The Americas
    Americas,
    /// Europe and Oceania
    Europe,
    /// Not derivable from the ID
    #[default]
    Unknown,
}

/// Length of a PPM FSID in hex characters
pub const PPM_FSID_LEN: usize = 16;

/// Region encoded in the first digit of a PPM-style FSID
pub fn ppm_fsid_region(fsid: &str) -> Region {
    if fsid.len() != PPM_FSID_LEN || !fsid.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Region::Unknown;
    }
    match fsid.as_bytes()[0] {
        b'0' | b'1' => Region::Japan,
        b'5' => Region::Americas,
        b'9' => Region::Europe,
        _ => Region::Unknown,
    }
}

/// Format a 10-byte KWZ FSID.
///
/// Native 3DS IDs print as `XXXX-XXXX-XXXX-XXXXXX`. Notes converted from
/// the DSi Library store a PPM ID, printed byte-reversed like PPM files.
pub fn format_kwz_fsid(bytes: &[u8], dsi_library_note: bool) -> String {
    if dsi_library_note {
        let hex: String = bytes.iter().rev().map(|b| format!("{b:02X}")).collect();
        return hex.get(2..2 + PPM_FSID_LEN).unwrap_or_default().to_string();
    }
    let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
    match (hex.get(0..4), hex.get(4..8), hex.get(8..12), hex.get(12..18)) {
        (Some(a), Some(b), Some(c), Some(d)) => format!("{a}-{b}-{c}-{d}"),
        _ => hex,
    }
}

/// Region for a KWZ FSID; only DSi Library (PPM-style) IDs carry one
pub fn kwz_fsid_region(fsid: &str, dsi_library_note: bool) -> Region {
    if dsi_library_note {
        ppm_fsid_region(fsid)
    } else {
        Region::Unknown
    }
}
