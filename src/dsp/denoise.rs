//! Non-stationary spectral gating.
//!
//! A noise profile (per-bin mean and spread of the dB spectrum) is learned
//! from the first half second of the track. Each bin then carries a noise
//! floor that starts at the profile mean and is re-estimated frame by frame
//! with a one-pole follower, capped a fixed distance above the profile so
//! sustained notes are not absorbed into the floor. Bins above
//! `floor + N_STD_THRESHOLD * sigma` pass; the binary mask is smoothed over
//! neighbouring bins and frames and scaled by `strength`.

use log::debug;

use crate::dsp::spectral::{magnitude_db, Frame, Stft, FFT_SIZE, HOP_SIZE};
use crate::engine::SampleBuffer;

/// Length of the leading segment used as the noise reference.
pub const NOISE_PROFILE_SECS: f64 = 0.5;

/// Standard deviations above the floor a bin must reach to count as signal.
const N_STD_THRESHOLD: f32 = 1.5;

/// Time constant of the floor follower (seconds).
const FLOOR_TIME_CONSTANT_SECS: f32 = 1.0;

/// How far the re-estimated floor may drift above the learned profile (dB).
const MAX_FLOOR_RISE_DB: f32 = 12.0;

/// Mask smoothing half-widths.
const FREQ_SMOOTH_BINS: usize = 2;
const TIME_SMOOTH_FRAMES: usize = 1;

/// Per-bin statistics of the noise reference in dB.
#[derive(Debug, Clone)]
pub struct NoiseProfile {
    pub mean_db: Vec<f32>,
    pub std_db: Vec<f32>,
}

impl NoiseProfile {
    /// Learn a profile from a noise-only clip (any non-empty length).
    pub fn learn(stft: &Stft, clip: &[f32]) -> Self {
        let num_bins = stft.num_bins();
        let mut frames = stft.analyze_valid(clip);
        if frames.is_empty() {
            frames = stft.analyze(clip);
        }
        if frames.is_empty() {
            return Self {
                mean_db: vec![magnitude_db(Default::default()); num_bins],
                std_db: vec![0.0; num_bins],
            };
        }

        let count = frames.len() as f32;
        let mut mean_db = vec![0.0f32; num_bins];
        for frame in &frames {
            for (m, &c) in mean_db.iter_mut().zip(frame.iter()) {
                *m += magnitude_db(c);
            }
        }
        mean_db.iter_mut().for_each(|m| *m /= count);

        let mut std_db = vec![0.0f32; num_bins];
        for frame in &frames {
            for ((s, &m), &c) in std_db.iter_mut().zip(mean_db.iter()).zip(frame.iter()) {
                let d = magnitude_db(c) - m;
                *s += d * d;
            }
        }
        std_db.iter_mut().for_each(|s| *s = (*s / count).sqrt());

        Self { mean_db, std_db }
    }

    pub fn num_bins(&self) -> usize {
        self.mean_db.len()
    }
}

/// Leading noise reference: the first 0.5 s, at least one sample, never
/// longer than the buffer.
pub fn noise_clip(buffer: &SampleBuffer) -> &[f32] {
    let wanted = ((NOISE_PROFILE_SECS * buffer.sample_rate() as f64) as usize).max(1);
    &buffer.samples()[..wanted.min(buffer.len())]
}

/// Suppress noise consistent with the leading profile.
///
/// `strength` is the fraction of gated energy removed: 0 leaves the signal
/// untouched, 1 removes gated bins completely. Values outside [0, 1] are
/// clamped by the gain computation. Output has the input's length and
/// sample rate; buffers shorter than one analysis frame come back unchanged.
pub fn reduce(buffer: &SampleBuffer, strength: f32) -> SampleBuffer {
    if buffer.len() < FFT_SIZE || buffer.sample_rate() == 0 {
        debug!(
            "Denoise skipped: {} samples is shorter than one {}-sample frame",
            buffer.len(),
            FFT_SIZE
        );
        return buffer.clone();
    }

    let stft = Stft::new(FFT_SIZE, HOP_SIZE);
    let profile = NoiseProfile::learn(&stft, noise_clip(buffer));
    let mut frames = stft.analyze(buffer.samples());

    let mask = smooth_mask(&gate_mask(&frames, &profile, buffer.sample_rate(), HOP_SIZE));
    for (frame, mask_row) in frames.iter_mut().zip(mask.iter()) {
        for (bin, &m) in frame.iter_mut().zip(mask_row.iter()) {
            *bin *= gate_gain(m, strength);
        }
    }

    let output = stft.synthesize(&frames, buffer.len());
    debug!(
        "Denoised {} samples at strength {:.2}",
        buffer.len(),
        strength
    );
    buffer.with_samples(output)
}

/// Gain for a bin given its (smoothed) mask value.
#[inline]
fn gate_gain(mask: f32, strength: f32) -> f32 {
    (1.0 - strength * (1.0 - mask)).clamp(0.0, 1.0)
}

/// Binary signal/noise decision per frame and bin (1.0 = signal).
fn gate_mask(
    frames: &[Frame],
    profile: &NoiseProfile,
    sample_rate: u32,
    hop: usize,
) -> Vec<Vec<f32>> {
    let hop_secs = hop as f32 / sample_rate as f32;
    let coeff = 1.0 - (-hop_secs / FLOOR_TIME_CONSTANT_SECS).exp();
    let mut floor = profile.mean_db.clone();

    frames
        .iter()
        .map(|frame| {
            frame
                .iter()
                .enumerate()
                .map(|(bin, &c)| {
                    let db = magnitude_db(c);
                    let ceiling = profile.mean_db[bin] + MAX_FLOOR_RISE_DB;
                    floor[bin] = (floor[bin] + coeff * (db - floor[bin])).min(ceiling);
                    let threshold = floor[bin] + N_STD_THRESHOLD * profile.std_db[bin];
                    if db > threshold {
                        1.0
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}

/// Box-average the mask over ±FREQ_SMOOTH_BINS and ±TIME_SMOOTH_FRAMES.
fn smooth_mask(mask: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let along_freq: Vec<Vec<f32>> = mask
        .iter()
        .map(|row| box_average(row, FREQ_SMOOTH_BINS))
        .collect();

    let num_frames = along_freq.len();
    let num_bins = along_freq.first().map(|r| r.len()).unwrap_or(0);
    let mut smoothed = vec![vec![0.0f32; num_bins]; num_frames];
    let mut column = vec![0.0f32; num_frames];
    for bin in 0..num_bins {
        for (slot, row) in column.iter_mut().zip(along_freq.iter()) {
            *slot = row[bin];
        }
        for (row, value) in smoothed.iter_mut().zip(box_average(&column, TIME_SMOOTH_FRAMES)) {
            row[bin] = value;
        }
    }
    smoothed
}

/// Centred moving average; the window shrinks at the edges.
fn box_average(values: &[f32], half_width: usize) -> Vec<f32> {
    let mut prefix = Vec::with_capacity(values.len() + 1);
    prefix.push(0.0f32);
    for &v in values {
        prefix.push(prefix[prefix.len() - 1] + v);
    }
    (0..values.len())
        .map(|i| {
            let start = i.saturating_sub(half_width);
            let end = (i + half_width + 1).min(values.len());
            (prefix[end] - prefix[start]) / (end - start) as f32
        })
        .collect()
}
