//! Signal processing stages
//!
//! Every stage takes a `SampleBuffer` and returns a new one; none of them
//! touch the filesystem except the loop overlay, which decodes its asset.
//! Shared STFT machinery lives in `spectral`.

pub mod denoise;
pub mod mixer;
pub mod spectral;
pub mod stretch;
pub mod tempo;

pub use denoise::{reduce, NoiseProfile, NOISE_PROFILE_SECS};
pub use mixer::{
    mix_weighted, overlay, tile_to_length, LoopOverlay, SkipReason, MIX_HEADROOM_PEAK,
};
pub use spectral::{Stft, FFT_SIZE, HOP_SIZE};
pub use stretch::{stretch_ratio, stretch_to_bpm, time_stretch};
pub use tempo::{estimate_bpm, onset_strength, OnsetEnvelope, MAX_BPM, MIN_BPM};
