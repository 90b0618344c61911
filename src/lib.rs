//! Flipnote Studio animation decoder
//!
//! Decodes the two animation formats written by Nintendo's Flipnote Studio
//! applications from a byte buffer already held in memory:
//! - PPM (Flipnote Studio, DSiWare): 256x192, 2 layers, 4-bit IMA ADPCM audio
//! - KWZ (Flipnote Studio 3D): 320x240, 3 layers, adaptive 2/4-bit ADPCM audio
//!
//! # Features
//! - Frame decoding with diff-frame chasing and memoization
//! - Metadata records (author chain, timestamps, lock/loop flags)
//! - Per-track and master-mixed PCM with format-specific resampling
//! - DSi Library initial ADPCM state recovery for converted KWZ notes
//! - RSASSA-PKCS1-v1_5 signature verification with the built-in format keys
//!   or an injected verifier
//!
//! # Crate feature flags
//! - `wav` (default): WAV export in the `flipnote` CLI (enables optional `hound` dep)
//!
//! # Quick start
//! ```no_run
//! use flipnote::{Flipnote, FlipnoteDecoder, KwzSettings};
//!
//! let data = std::fs::read("note.ppm").unwrap();
//! let mut note = Flipnote::open(&data, KwzSettings::default()).unwrap();
//! let decoder = note.as_decoder_mut();
//! println!("{} frames at {} fps", decoder.frame_count(), decoder.framerate());
//! let pixels = decoder.frame_pixels(0).unwrap();
//! let audio = decoder.audio_master_pcm(32_768).unwrap();
//! # let _ = (pixels, audio);
//! ```

#![warn(missing_docs)]

pub mod audio; // ADPCM codecs, resampling and mixing
pub mod decoder; // Format-independent decoder trait
pub mod error;
pub mod format; // Shared types and format detection
pub mod fsid;
pub mod kwz; // Flipnote Studio 3D
pub mod ppm; // Flipnote Studio
pub mod reader; // Byte and bit cursors
pub mod signature;

pub use decoder::FlipnoteDecoder;
pub use error::{FlipnoteError, Result};
pub use format::{
    AudioTrack, Author, AuthorChain, CameraFlags, FlipnoteFormat, FlipnoteMeta, ImageRect,
    LayerMask, NoteTimestamp, Rgba, SoundEffectFlags,
};
pub use fsid::Region;
pub use kwz::{DecodeStats, KwzDecoder, KwzKind, KwzSettings};
pub use ppm::PpmDecoder;
pub use signature::{
    RsaPkcs1Verifier, SignatureHash, SignatureVerifier, KWZ_PUBLIC_KEY_PEM, PPM_PUBLIC_KEY_PEM,
};

/// A decoder for either format, chosen by the buffer's magic bytes
#[derive(Debug)]
pub enum Flipnote<'a> {
    /// Flipnote Studio note
    Ppm(PpmDecoder<'a>),
    /// Flipnote Studio 3D note
    Kwz(KwzDecoder<'a>),
}

impl<'a> Flipnote<'a> {
    /// Detect the format and open the matching decoder.
    ///
    /// `settings` only applies to KWZ files.
    pub fn open(data: &'a [u8], settings: KwzSettings) -> Result<Self> {
        match FlipnoteFormat::detect(data) {
            Some(FlipnoteFormat::Ppm) => Ok(Flipnote::Ppm(PpmDecoder::new(data)?)),
            Some(FlipnoteFormat::Kwz) => Ok(Flipnote::Kwz(KwzDecoder::new(data, settings)?)),
            None => Err(FlipnoteError::UnknownFormat),
        }
    }

    /// Borrow as the common decoder interface
    pub fn as_decoder(&self) -> &dyn FlipnoteDecoder {
        match self {
            Flipnote::Ppm(decoder) => decoder,
            Flipnote::Kwz(decoder) => decoder,
        }
    }

    /// Mutably borrow as the common decoder interface
    pub fn as_decoder_mut(&mut self) -> &mut dyn FlipnoteDecoder {
        match self {
            Flipnote::Ppm(decoder) => decoder,
            Flipnote::Kwz(decoder) => decoder,
        }
    }

    /// Container format
    pub fn format(&self) -> FlipnoteFormat {
        self.as_decoder().format()
    }
}
