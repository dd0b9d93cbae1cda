//! Tempo-matched percussion loop overlay.
//!
//! The loop is decoded at the track's sample rate, stretched so one cycle
//! lines up with the track tempo, tiled to the track length and blended in
//! after both signals are peak-normalized. The blend is renormalized to
//! `MIX_HEADROOM_PEAK` to leave headroom for export.
//!
//! Percussion is an enhancement: a missing loop asset yields
//! [`LoopOverlay::Skipped`] with the track untouched instead of an error.

use std::fmt;
use std::path::Path;

use log::debug;

use crate::dsp::stretch::time_stretch;
use crate::dsp::tempo::estimate_bpm;
use crate::engine::buffer::normalize_peak;
use crate::engine::io::decode_at_rate;
use crate::engine::SampleBuffer;
use crate::error::Result;

/// Peak amplitude of the mixed output.
pub const MIX_HEADROOM_PEAK: f32 = 0.9;

/// Why the overlay left the track as it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No file at the configured loop path
    AssetMissing,
    /// The loop file decoded to zero samples
    EmptyLoop,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AssetMissing => f.write_str("drum loop asset not found"),
            SkipReason::EmptyLoop => f.write_str("drum loop is empty"),
        }
    }
}

/// Outcome of [`overlay`].
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOverlay {
    /// Track with the loop blended in
    Mixed(SampleBuffer),
    /// Track returned unchanged
    Skipped {
        buffer: SampleBuffer,
        reason: SkipReason,
    },
}

impl LoopOverlay {
    pub fn into_buffer(self) -> SampleBuffer {
        match self {
            LoopOverlay::Mixed(buffer) | LoopOverlay::Skipped { buffer, .. } => buffer,
        }
    }

    pub fn is_mixed(&self) -> bool {
        matches!(self, LoopOverlay::Mixed(_))
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            LoopOverlay::Mixed(_) => None,
            LoopOverlay::Skipped { reason, .. } => Some(*reason),
        }
    }
}

/// Blend the loop at `loop_path` into `buffer`.
///
/// `target_bpm` is the track's tempo; when it is known (> 0) the loop is
/// stretched by `target_bpm / loop_bpm`, or left as is if the loop's own
/// tempo cannot be detected. `mix` is the loop's weight in the blend.
///
/// # Errors
/// A loop file that exists but cannot be decoded is a decode error.
pub fn overlay(
    buffer: &SampleBuffer,
    target_bpm: Option<f64>,
    mix: f32,
    loop_path: &Path,
) -> Result<LoopOverlay> {
    if !loop_path.is_file() {
        return Ok(LoopOverlay::Skipped {
            buffer: buffer.clone(),
            reason: SkipReason::AssetMissing,
        });
    }

    let drum = decode_at_rate(loop_path, buffer.sample_rate())?;
    if drum.is_empty() {
        return Ok(LoopOverlay::Skipped {
            buffer: buffer.clone(),
            reason: SkipReason::EmptyLoop,
        });
    }

    let drum = match target_bpm.filter(|t| t.is_finite() && *t > 0.0) {
        Some(target) => {
            let loop_bpm = estimate_bpm(&drum);
            let rate = loop_stretch_rate(loop_bpm, target);
            debug!(
                "Drum loop {:.2} BPM -> {:.2} BPM (rate {:.4})",
                loop_bpm, target, rate
            );
            time_stretch(&drum, rate)
        }
        None => drum,
    };

    let tiled = tile_to_length(drum.samples(), buffer.len());
    let mixed = mix_weighted(buffer.samples(), &tiled, mix);
    Ok(LoopOverlay::Mixed(buffer.with_samples(mixed)))
}

/// Stretch rate aligning a loop to `target_bpm`; 1.0 when the loop tempo
/// is unknown.
pub fn loop_stretch_rate(loop_bpm: f64, target_bpm: f64) -> f64 {
    if loop_bpm > 0.0 && loop_bpm.is_finite() {
        target_bpm / loop_bpm
    } else {
        1.0
    }
}

/// Repeat `pattern` end to end and truncate to exactly `length` samples.
/// An empty pattern tiles to silence.
pub fn tile_to_length(pattern: &[f32], length: usize) -> Vec<f32> {
    if pattern.is_empty() {
        return vec![0.0; length];
    }
    pattern.iter().copied().cycle().take(length).collect()
}

/// `(1 - mix) * track + mix * drums` over peak-normalized inputs, scaled to
/// `MIX_HEADROOM_PEAK`. Both slices must have the same length.
pub fn mix_weighted(track: &[f32], drums: &[f32], mix: f32) -> Vec<f32> {
    debug_assert_eq!(track.len(), drums.len());

    let mut track_norm = track.to_vec();
    normalize_peak(&mut track_norm, 1.0);
    let mut drums_norm = drums.to_vec();
    normalize_peak(&mut drums_norm, 1.0);

    let mut mixed: Vec<f32> = track_norm
        .iter()
        .zip(drums_norm.iter())
        .map(|(&t, &d)| (1.0 - mix) * t + mix * d)
        .collect();
    normalize_peak(&mut mixed, MIX_HEADROOM_PEAK);
    mixed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::peak;
    use crate::engine::io::write_wav;
    use tempfile::TempDir;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| (i as f32 * 0.37).sin()).collect()
    }

    #[test]
    fn test_tile_shorter_loop() {
        let tiled = tile_to_length(&[1.0, 2.0, 3.0], 8);
        assert_eq!(tiled, vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0, 2.0]);
    }

    #[test]
    fn test_tile_longer_loop() {
        let tiled = tile_to_length(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(tiled, vec![1.0, 2.0]);
    }

    #[test]
    fn test_tile_empty_pattern() {
        assert_eq!(tile_to_length(&[], 4), vec![0.0; 4]);
        assert!(tile_to_length(&[1.0], 0).is_empty());
    }

    #[test]
    fn test_mix_peak_bound() {
        let track = ramp(1000);
        let drums: Vec<f32> = ramp(1000).iter().map(|s| s * 7.0).collect();
        for mix in [0.0, 0.25, 0.4, 0.5, 0.75, 1.0] {
            let mixed = mix_weighted(&track, &drums, mix);
            assert!(peak(&mixed) <= MIX_HEADROOM_PEAK + 1e-6);
        }
    }

    #[test]
    fn test_mix_silence_is_safe() {
        let silent = vec![0.0f32; 256];
        let mixed = mix_weighted(&silent, &silent, 0.4);
        assert!(mixed.iter().all(|s| *s == 0.0));

        let mixed = mix_weighted(&ramp(256), &silent, 0.4);
        assert!(mixed.iter().all(|s| s.is_finite()));
        assert!((peak(&mixed) - MIX_HEADROOM_PEAK).abs() < 1e-6);
    }

    #[test]
    fn test_zero_mix_is_scaled_track() {
        let track: Vec<f32> = ramp(500).iter().map(|s| s * 0.3).collect();
        let drums = ramp(500).iter().rev().copied().collect::<Vec<_>>();
        let mixed = mix_weighted(&track, &drums, 0.0);
        let scale = MIX_HEADROOM_PEAK / peak(&track);
        for (m, t) in mixed.iter().zip(&track) {
            assert!((m - t * scale).abs() < 1e-5);
        }
    }

    #[test]
    fn test_loop_stretch_rate() {
        assert_eq!(loop_stretch_rate(120.0, 90.0), 0.75);
        assert_eq!(loop_stretch_rate(0.0, 90.0), 1.0);
        assert_eq!(loop_stretch_rate(f64::NAN, 90.0), 1.0);
    }

    #[test]
    fn test_missing_asset_skips() {
        let buffer = SampleBuffer::new(ramp(4096), 44100);
        let missing = Path::new("/nonexistent/loop.wav");
        let outcome = overlay(&buffer, Some(120.0), 0.4, missing).unwrap();
        assert_eq!(outcome.skip_reason(), Some(SkipReason::AssetMissing));
        assert!(!outcome.is_mixed());
        assert_eq!(outcome.into_buffer(), buffer);
    }

    #[test]
    fn test_overlay_matches_track_length() {
        let dir = TempDir::new().unwrap();
        let loop_path = dir.path().join("loop.wav");
        write_wav(&SampleBuffer::new(ramp(3000), 22050), &loop_path, 32).unwrap();

        let track = SampleBuffer::new(ramp(10_000), 44100);
        let outcome = overlay(&track, None, 0.5, &loop_path).unwrap();
        assert!(outcome.is_mixed());
        let mixed = outcome.into_buffer();
        assert_eq!(mixed.len(), track.len());
        assert_eq!(mixed.sample_rate(), 44100);
        assert!(mixed.peak() <= MIX_HEADROOM_PEAK + 1e-6);
    }

    #[test]
    fn test_silent_loop_with_target_tempo() {
        let dir = TempDir::new().unwrap();
        let loop_path = dir.path().join("silent.wav");
        write_wav(&SampleBuffer::silent(44100, 44100), &loop_path, 32).unwrap();

        let track = SampleBuffer::new(ramp(20_000), 44100);
        let mixed = overlay(&track, Some(128.0), 0.4, &loop_path)
            .unwrap()
            .into_buffer();
        assert_eq!(mixed.len(), track.len());
        assert!(mixed.is_finite());
    }

    #[test]
    fn test_empty_loop_skips() {
        let dir = TempDir::new().unwrap();
        let loop_path = dir.path().join("empty.wav");
        write_wav(&SampleBuffer::new(vec![], 44100), &loop_path, 32).unwrap();

        let track = SampleBuffer::new(ramp(1000), 44100);
        let outcome = overlay(&track, Some(120.0), 0.4, &loop_path).unwrap();
        assert_eq!(outcome.skip_reason(), Some(SkipReason::EmptyLoop));
    }

    #[test]
    fn test_corrupt_loop_is_error() {
        let dir = TempDir::new().unwrap();
        let loop_path = dir.path().join("broken.wav");
        std::fs::write(&loop_path, b"not a wav").unwrap();

        let track = SampleBuffer::new(ramp(1000), 44100);
        let err = overlay(&track, None, 0.4, &loop_path).unwrap_err();
        assert!(err.is_decode_error());
    }
}
