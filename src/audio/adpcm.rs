//! ADPCM decoders for Flipnote audio tracks
//!
//! Both formats use IMA-style ADPCM with the standard step table:
//! - PPM: fixed 4-bit samples, low nibble first, 16-bit predictor.
//! - KWZ: each sample is 2 or 4 bits wide depending on the current step index
//!   and bit position, with a 12-bit predictor scaled up to 16 bits.
//!
//! DSi Library conversions lost the initial BGM decoder state, so
//! [`guess_kwz_initial_step_index`] recovers it by picking the starting step
//! index that yields the quietest output.

use crate::audio::pcm;

/// IMA ADPCM step sizes
pub const ADPCM_STEP_TABLE: [i32; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408,
    449, 494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630,
    9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767,
];

/// Step index adjustment for 4-bit samples
pub const ADPCM_INDEX_TABLE_4BIT: [i32; 16] = [-1, -1, -1, -1, 2, 4, 6, 8, -1, -1, -1, -1, 2, 4, 6, 8];

/// Step index adjustment for 2-bit samples (KWZ)
pub const ADPCM_INDEX_TABLE_2BIT: [i32; 4] = [-1, 2, -1, 2];

/// Highest PPM step index
pub const PPM_MAX_STEP_INDEX: i32 = 88;

/// Highest KWZ step index; KWZ only uses the first 80 step sizes
pub const KWZ_MAX_STEP_INDEX: i32 = 79;

/// Below this step index KWZ always reads 2-bit samples
pub const KWZ_4BIT_THRESHOLD: i32 = 18;

/// KWZ predictor range before scaling to 16 bits
pub const KWZ_PREDICTOR_MIN: i32 = -2048;
/// KWZ predictor range before scaling to 16 bits
pub const KWZ_PREDICTOR_MAX: i32 = 2047;

/// Number of initial step indices tried when recovering DSi Library BGM state
pub const KWZ_GUESS_STEP_INDICES: u8 = 41;

/// Decoder state carried between samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdpcmState {
    /// Running sample prediction
    pub predictor: i32,
    /// Index into [`ADPCM_STEP_TABLE`]
    pub step_index: i32,
}

impl AdpcmState {
    /// State with the given predictor and step index
    pub fn new(predictor: i32, step_index: i32) -> Self {
        AdpcmState {
            predictor,
            step_index,
        }
    }
}

#[inline]
fn diff_4bit(sample: u8, step: i32) -> i32 {
    let mut diff = step >> 3;
    if sample & 1 != 0 {
        diff += step >> 2;
    }
    if sample & 2 != 0 {
        diff += step >> 1;
    }
    if sample & 4 != 0 {
        diff += step;
    }
    if sample & 8 != 0 {
        -diff
    } else {
        diff
    }
}

#[inline]
fn diff_2bit(sample: u8, step: i32) -> i32 {
    let mut diff = step >> 3;
    if sample & 1 != 0 {
        diff += step;
    }
    if sample & 2 != 0 {
        -diff
    } else {
        diff
    }
}

/// Decode a PPM track: two 4-bit samples per byte, low nibble first
pub fn decode_ppm_adpcm(src: &[u8]) -> Vec<i16> {
    let mut dst = Vec::with_capacity(src.len() * 2);
    let mut state = AdpcmState::default();

    for &byte in src {
        for sample in [byte & 0x0F, byte >> 4] {
            let step = ADPCM_STEP_TABLE[state.step_index as usize];
            state.predictor = (state.predictor + diff_4bit(sample, step))
                .clamp(i16::MIN as i32, i16::MAX as i32);
            state.step_index = (state.step_index + ADPCM_INDEX_TABLE_4BIT[sample as usize])
                .clamp(0, PPM_MAX_STEP_INDEX);
            dst.push(state.predictor as i16);
        }
    }

    dst
}

/// Decode a KWZ track starting from `initial` state.
///
/// The initial state is clamped into the valid KWZ ranges first.
pub fn decode_kwz_adpcm(src: &[u8], initial: AdpcmState) -> Vec<i16> {
    // at most four samples per byte (all 2-bit)
    let mut dst = Vec::with_capacity(src.len() * 4);
    let mut predictor = initial.predictor.clamp(KWZ_PREDICTOR_MIN, KWZ_PREDICTOR_MAX);
    let mut step_index = initial.step_index.clamp(0, KWZ_MAX_STEP_INDEX);

    for &byte in src {
        let mut bits = byte;
        let mut bit_pos = 0;
        while bit_pos < 8 {
            let step = ADPCM_STEP_TABLE[step_index as usize];
            if step_index < KWZ_4BIT_THRESHOLD || bit_pos > 4 {
                let sample = bits & 0x3;
                predictor += diff_2bit(sample, step);
                step_index += ADPCM_INDEX_TABLE_2BIT[sample as usize];
                bits >>= 2;
                bit_pos += 2;
            } else {
                let sample = bits & 0xF;
                predictor += diff_4bit(sample, step);
                step_index += ADPCM_INDEX_TABLE_4BIT[sample as usize];
                bits >>= 4;
                bit_pos += 4;
            }
            step_index = step_index.clamp(0, KWZ_MAX_STEP_INDEX);
            predictor = predictor.clamp(KWZ_PREDICTOR_MIN, KWZ_PREDICTOR_MAX);
            dst.push((predictor * 16) as i16);
        }
    }

    dst
}

/// Recover the initial BGM step index of a DSi Library note.
///
/// Every candidate in `0..41` is decoded with `predictor`; the one giving the
/// lowest RMS amplitude wins, the first candidate winning ties.
pub fn guess_kwz_initial_step_index(src: &[u8], predictor: i32) -> u8 {
    let mut best_index = 0u8;
    let mut best_rms = f64::INFINITY;
    for step_index in 0..KWZ_GUESS_STEP_INDICES {
        let pcm = decode_kwz_adpcm(src, AdpcmState::new(predictor, step_index as i32));
        let rms = pcm::rms(&pcm);
        if rms < best_rms {
            best_rms = rms;
            best_index = step_index;
        }
    }
    tracing::debug!(step_index = best_index, rms = best_rms, "guessed initial BGM state");
    best_index
}
