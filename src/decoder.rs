//! Format-independent decoder interface
//!
//! [`FlipnoteDecoder`] is implemented by the PPM and KWZ decoders. Required
//! methods cover what differs between the containers; provided methods build
//! composited frames, resampled tracks, the master mix and signature checks
//! on top of them.

use crate::audio::pcm::{self, MasterAudio, ResampleMode};
use crate::error::{check_index, Result};
use crate::format::{
    AudioTrack, CameraFlags, FlipnoteFormat, FlipnoteMeta, ImageRect, Rgba, SoundEffectFlags,
};
use crate::signature::{RsaPkcs1Verifier, SignatureVerifier};

/// Clip ratio above which the master mix is reported as suspicious
pub const CLIP_RATIO_WARN_THRESHOLD: f64 = 0.01;

/// Decoding operations shared by PPM and KWZ notes.
///
/// Frame decoding mutates buffers owned by the decoder, so every decoding
/// method takes `&mut self`; share a decoder between threads only behind a
/// lock, or give each thread its own instance.
pub trait FlipnoteDecoder {
    /// Container format
    fn format(&self) -> FlipnoteFormat;

    /// Full frame width in pixels
    fn width(&self) -> usize;

    /// Full frame height in pixels
    fn height(&self) -> usize;

    /// Layers per frame
    fn num_layers(&self) -> usize;

    /// Ink colours available to each layer
    fn colors_per_layer(&self) -> usize;

    /// Visible part of the frame
    fn image_rect(&self) -> ImageRect {
        ImageRect {
            x: 0,
            y: 0,
            width: self.width(),
            height: self.height(),
        }
    }

    /// Decoded metadata
    fn meta(&self) -> &FlipnoteMeta;

    /// Number of frames
    fn frame_count(&self) -> usize {
        self.meta().frame_count
    }

    /// Playback framerate in frames per second
    fn framerate(&self) -> f64;

    /// Framerate the BGM was recorded at
    fn bgm_framerate(&self) -> f64;

    /// Playback length in seconds
    fn duration(&self) -> f64 {
        self.frame_count() as f64 / self.framerate()
    }

    /// Native sample rate of the audio tracks
    fn sample_rate(&self) -> u32;

    /// Interpolation used when tracks are converted to another rate
    fn resample_mode(&self) -> ResampleMode;

    /// Whether BGM is mixed at half amplitude into the master track
    fn halves_bgm_in_master_mix(&self) -> bool;

    /// Global palette the frame palette indices point into
    fn global_palette(&self) -> &'static [Rgba];

    /// Decode frame `index` and borrow its layer buffers.
    ///
    /// Buffers hold palette-relative values (0 = transparent, 1..=2 = ink)
    /// and are overwritten by the next decode; copy them to keep them.
    fn decode_frame(&mut self, index: usize) -> Result<&[Vec<u8>]>;

    /// Decode frame `index` and borrow a single layer
    fn decode_frame_layer(&mut self, index: usize, layer: usize) -> Result<&[u8]> {
        check_index("layer", layer, self.num_layers())?;
        let layers = self.decode_frame(index)?;
        Ok(&layers[layer])
    }

    /// Palette indices for a frame: paper first, then each layer's inks
    fn frame_palette_indices(&mut self, index: usize) -> Result<Vec<u8>>;

    /// RGBA colours for [`FlipnoteDecoder::frame_palette_indices`]
    fn frame_palette(&mut self, index: usize) -> Result<Vec<Rgba>> {
        let palette = self.global_palette();
        let transparent = Rgba([0, 0, 0, 0]);
        Ok(self
            .frame_palette_indices(index)?
            .into_iter()
            .map(|i| palette.get(i as usize).copied().unwrap_or(transparent))
            .collect())
    }

    /// Layer indices in drawing order, bottom first
    fn layer_order(&mut self, index: usize) -> Result<Vec<usize>>;

    /// Per-layer 3D depth
    fn layer_depths(&mut self, index: usize) -> Result<Vec<u8>>;

    /// Layers containing a camera photo
    fn camera_flags(&mut self, index: usize) -> Result<CameraFlags>;

    /// FSID of the author who drew the frame
    fn frame_author(&mut self, index: usize) -> Result<String>;

    /// Sound effects starting on a frame
    fn sound_effect_flags(&mut self, index: usize) -> Result<SoundEffectFlags>;

    /// Sound effect flags for every frame
    fn all_sound_effect_flags(&mut self) -> Result<Vec<SoundEffectFlags>> {
        (0..self.frame_count())
            .map(|i| self.sound_effect_flags(i))
            .collect()
    }

    /// True when the track exists and has a non-zero length
    fn has_audio_track(&self, track: AudioTrack) -> bool;

    /// Decode a track to PCM at [`FlipnoteDecoder::sample_rate`]
    fn decode_audio_track(&mut self, track: AudioTrack) -> Result<Vec<i16>>;

    /// Decode a track and convert it to `dst_freq`.
    ///
    /// BGM recorded at a different frame speed is first sped up or slowed
    /// down to match the playback framerate.
    fn audio_track_pcm(&mut self, track: AudioTrack, dst_freq: u32) -> Result<Vec<i16>> {
        let src = self.decode_audio_track(track)?;
        let mut src_freq = self.sample_rate() as f64;
        if track == AudioTrack::Bgm {
            src_freq *= (1.0 / self.bgm_framerate()) / (1.0 / self.framerate());
        }
        Ok(pcm::resample(
            &src,
            src_freq,
            dst_freq as f64,
            self.resample_mode(),
        ))
    }

    /// Mix BGM and every triggered sound effect into one track at `dst_freq`
    fn audio_master_pcm(&mut self, dst_freq: u32) -> Result<MasterAudio> {
        let len = (self.duration() * dst_freq as f64).ceil() as usize;
        let mut master = vec![0i16; len];

        if self.has_audio_track(AudioTrack::Bgm) {
            let mut bgm = self.audio_track_pcm(AudioTrack::Bgm, dst_freq)?;
            if self.halves_bgm_in_master_mix() {
                bgm.iter_mut().for_each(|s| *s >>= 1);
            }
            pcm::mix_into(&mut master, &bgm, 0);
        }

        let mut effects = Vec::new();
        for track in &AudioTrack::ALL[1..] {
            if self.has_audio_track(*track) {
                if let Some(flag) = track.effect_flag() {
                    effects.push((flag, self.audio_track_pcm(*track, dst_freq)?));
                }
            }
        }

        if !effects.is_empty() {
            let samples_per_frame = dst_freq as f64 / self.framerate();
            for (frame, flags) in self.all_sound_effect_flags()?.into_iter().enumerate() {
                let offset = (frame as f64 * samples_per_frame).ceil() as usize;
                for (flag, samples) in &effects {
                    if flags.contains(*flag) {
                        pcm::mix_into(&mut master, samples, offset);
                    }
                }
            }
        }

        let clip_ratio = pcm::clip_ratio(&master);
        if clip_ratio > CLIP_RATIO_WARN_THRESHOLD {
            tracing::warn!(clip_ratio, "master audio clips heavily, audio may be corrupt");
        }

        Ok(MasterAudio {
            samples: master,
            sample_rate: dst_freq,
            clip_ratio,
        })
    }

    /// Composite the visible layers of a frame into global palette indices
    /// covering [`FlipnoteDecoder::image_rect`]
    fn frame_pixels(&mut self, index: usize) -> Result<Vec<u8>> {
        let palette = self.frame_palette_indices(index)?;
        let order = self.layer_order(index)?;
        let rect = self.image_rect();
        let width = self.width();
        let colors = self.colors_per_layer();
        let visibility = self.meta().layer_visibility;
        let paper = palette[0];

        let mut pixels = vec![paper; rect.width * rect.height];
        let layers = self.decode_frame(index)?;
        for layer in order {
            if !visibility.get(layer).copied().unwrap_or(true) {
                continue;
            }
            let buffer = &layers[layer];
            for y in 0..rect.height {
                let src_row = (rect.y + y) * width + rect.x;
                let dst_row = y * rect.width;
                for x in 0..rect.width {
                    let value = buffer[src_row + x] as usize;
                    if value != 0 {
                        let slot = 1 + layer * colors + (value - 1);
                        pixels[dst_row + x] = palette.get(slot).copied().unwrap_or(paper);
                    }
                }
            }
        }
        Ok(pixels)
    }

    /// Bytes covered by the signature
    fn signed_body(&self) -> Result<&[u8]>;

    /// Signature bytes following the signed body
    fn signature(&self) -> Result<&[u8]>;

    /// Check the embedded signature with `verifier`. A mismatch, or a file
    /// too short to hold a signature, is `Ok(false)`.
    fn verify(&self, verifier: &dyn SignatureVerifier) -> Result<bool> {
        let (body, signature) = match (self.signed_body(), self.signature()) {
            (Ok(body), Ok(signature)) => (body, signature),
            (Err(err), _) | (_, Err(err)) => {
                tracing::debug!(%err, "no signature to verify");
                return Ok(false);
            }
        };
        verifier.verify(body, signature)
    }

    /// Check the embedded signature against Nintendo's key for this format
    fn verify_signature(&self) -> Result<bool> {
        let verifier = RsaPkcs1Verifier::builtin(self.format())?;
        self.verify(&verifier)
    }
}
