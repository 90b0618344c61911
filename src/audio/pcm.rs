//! 16-bit PCM utilities: resampling, additive mixing and level analysis

use serde::Serialize;

/// Interpolation used when converting between sample rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResampleMode {
    /// Pick the source sample at `floor(n * src / dst)`
    NearestNeighbor,
    /// Blend the two surrounding source samples by the fractional position
    Linear,
}

/// Output length for a conversion: `ceil(len / src_freq * dst_freq)`
pub fn resampled_len(len: usize, src_freq: f64, dst_freq: f64) -> usize {
    (len as f64 * dst_freq / src_freq).ceil() as usize
}

/// Convert `src` from `src_freq` to `dst_freq`. Reads past the end are silence.
pub fn resample(src: &[i16], src_freq: f64, dst_freq: f64, mode: ResampleMode) -> Vec<i16> {
    match mode {
        ResampleMode::NearestNeighbor => resample_nearest(src, src_freq, dst_freq),
        ResampleMode::Linear => resample_linear(src, src_freq, dst_freq),
    }
}

/// Nearest-neighbour conversion; identity when the rates match
pub fn resample_nearest(src: &[i16], src_freq: f64, dst_freq: f64) -> Vec<i16> {
    if src_freq == dst_freq {
        return src.to_vec();
    }
    let step = src_freq / dst_freq;
    (0..resampled_len(src.len(), src_freq, dst_freq))
        .map(|n| {
            let idx = (n as f64 * step).floor() as usize;
            src.get(idx).copied().unwrap_or(0)
        })
        .collect()
}

/// Linear-interpolating conversion
pub fn resample_linear(src: &[i16], src_freq: f64, dst_freq: f64) -> Vec<i16> {
    let step = src_freq / dst_freq;
    (0..resampled_len(src.len(), src_freq, dst_freq))
        .map(|n| {
            let pos = n as f64 * step;
            let idx = pos.floor() as usize;
            let frac = pos - idx as f64;
            let a = src.get(idx).copied().unwrap_or(0) as f64;
            let b = src.get(idx + 1).copied().unwrap_or(0) as f64;
            let value = a + (b - a) * frac;
            value.clamp(i16::MIN as f64, i16::MAX as f64) as i16
        })
        .collect()
}

/// Add `src` into `dst` starting at `offset`, clamping every sum to 16 bits.
///
/// Samples of `src` that would land past the end of `dst` are dropped.
pub fn mix_into(dst: &mut [i16], src: &[i16], offset: usize) {
    let Some(window) = dst.get_mut(offset..) else {
        return;
    };
    for (out, &sample) in window.iter_mut().zip(src) {
        *out = (*out as i32 + sample as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
    }
}

/// Fraction of samples sitting on either 16-bit clamp bound
pub fn clip_ratio(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let clipped = samples
        .iter()
        .filter(|&&s| s == i16::MIN || s == i16::MAX)
        .count();
    clipped as f64 / samples.len() as f64
}

/// Root-mean-square amplitude
pub fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt()
}

/// Mixed output of every audio track in a note
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasterAudio {
    /// Mono 16-bit samples
    #[serde(skip)]
    pub samples: Vec<i16>,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Fraction of samples that hit a clamp bound; high values hint at
    /// corrupted audio (for example a wrong initial ADPCM state)
    pub clip_ratio: f64,
}
