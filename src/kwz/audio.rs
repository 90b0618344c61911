//! Initial ADPCM state for KWZ tracks
//!
//! KWZ tracks normally start from predictor 0 and step index 0. DSi Library
//! conversions start the BGM from an unknown state, which can be given
//! explicitly or recovered with [`guess_kwz_initial_step_index`].

use super::KwzSettings;
use crate::audio::adpcm::{guess_kwz_initial_step_index, AdpcmState};
use crate::format::AudioTrack;

/// Pick the decoder state for `track` from the settings, guessing the BGM
/// step index when asked to and no explicit value is set
pub fn initial_state(settings: &KwzSettings, track: AudioTrack, src: &[u8]) -> AdpcmState {
    match track.effect_slot() {
        None => {
            let predictor = settings.initial_bgm_predictor.unwrap_or(0);
            let step_index = match settings.initial_bgm_step_index {
                Some(step_index) => step_index,
                None if settings.guess_initial_bgm_state => {
                    guess_kwz_initial_step_index(src, predictor)
                }
                None => 0,
            };
            AdpcmState::new(predictor, step_index as i32)
        }
        Some(slot) => {
            let predictor = settings
                .initial_se_predictors
                .map(|predictors| predictors[slot])
                .unwrap_or(0);
            let step_index = settings
                .initial_se_step_indices
                .map(|indices| indices[slot])
                .unwrap_or(0);
            AdpcmState::new(predictor, step_index as i32)
        }
    }
}
