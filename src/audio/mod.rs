//! Audio decoding and mixing
//!
//! - [`adpcm`]: PPM and KWZ ADPCM track decoders
//! - [`pcm`]: sample-rate conversion, clamped mixing and level analysis

pub mod adpcm;
pub mod pcm;

pub use adpcm::{decode_kwz_adpcm, decode_ppm_adpcm, guess_kwz_initial_step_index, AdpcmState};
pub use pcm::{clip_ratio, mix_into, resample, rms, MasterAudio, ResampleMode};

/// Default output rate used by the master mix helpers and the CLI
pub const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 32_768;
