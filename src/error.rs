//! Error handling for Flipnote decoding.

use crate::format::AudioTrack;
use thiserror::Error;

/// Convenient result alias for Flipnote parsing and decoding.
pub type Result<T> = std::result::Result<T, FlipnoteError>;

/// Errors that may occur while parsing or decoding a Flipnote.
///
/// Every error is fatal for the operation that raised it: no partially
/// decoded frame or audio track is handed back to the caller.
#[derive(Debug, Error)]
pub enum FlipnoteError {
    /// Buffer does not start with a recognised PPM or KWZ magic.
    #[error("unrecognised flipnote format")]
    UnknownFormat,

    /// Structural problem with the container: missing mandatory section,
    /// too many sections, or an offset pointing outside the file.
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// Frame, layer or track index outside its valid range.
    #[error("{what} index {index} out of range (0..{len})")]
    OutOfRange {
        /// What kind of index was rejected.
        what: &'static str,
        /// The rejected index.
        index: usize,
        /// Number of valid entries.
        len: usize,
    },

    /// KWZ tile type that never appears in valid streams.
    #[error("unsupported KWZ tile code {code}")]
    UnsupportedTileCode {
        /// The 3-bit tile type that was read.
        code: u32,
    },

    /// Bit reader asked for more than 16 bits in one read.
    #[error("unsupported bit read width {bits} (max 16)")]
    UnsupportedBitWidth {
        /// Requested width.
        bits: u32,
    },

    /// Audio operation on an absent or empty track.
    #[error("audio track {0:?} is not present")]
    MissingTrack(AudioTrack),

    /// Public key material could not be parsed.
    #[error("signature key error: {0}")]
    SignatureKeyError(String),
}

impl FlipnoteError {
    pub(crate) fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        FlipnoteError::OutOfRange { what, index, len }
    }
}

impl From<String> for FlipnoteError {
    fn from(msg: String) -> Self {
        FlipnoteError::MalformedContainer(msg)
    }
}

impl From<&str> for FlipnoteError {
    fn from(msg: &str) -> Self {
        FlipnoteError::MalformedContainer(msg.to_string())
    }
}

/// Check `index < len`, producing [`FlipnoteError::OutOfRange`] otherwise.
pub(crate) fn check_index(what: &'static str, index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        Err(FlipnoteError::out_of_range(what, index, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_index_bounds() {
        assert!(check_index("frame", 0, 1).is_ok());
        let err = check_index("frame", 3, 3).unwrap_err();
        assert_eq!(err.to_string(), "frame index 3 out of range (0..3)");
    }

    #[test]
    fn test_string_conversion_is_malformed_container() {
        let err: FlipnoteError = "bad offset".into();
        assert!(matches!(err, FlipnoteError::MalformedContainer(ref m) if m == "bad offset"));
    }
}
