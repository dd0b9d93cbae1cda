//! Short-time Fourier transform shared by the tempo, denoise and stretch
//! stages.
//!
//! Frames hold the non-negative half of the spectrum (`fft_size / 2 + 1`
//! bins). Synthesis mirrors the negative frequencies, overlap-adds with the
//! same Hann window and divides by the summed squared window, so analysis
//! followed by synthesis reconstructs the input.

use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Zero-valued complex number, used for FFT buffer initialization.
pub const COMPLEX_ZERO: Complex<f32> = Complex::new(0.0, 0.0);

/// Analysis frame length used across the pipeline.
pub const FFT_SIZE: usize = 2048;

/// Hop between analysis frames (75% overlap).
pub const HOP_SIZE: usize = 512;

/// Minimum window sum (as a fraction of max) to prevent amplification
/// in low-overlap regions during overlap-add normalization.
const WINDOW_SUM_FLOOR_RATIO: f32 = 0.1;

/// Absolute floor for window sum normalization to prevent division by zero.
const WINDOW_SUM_EPSILON: f32 = 1e-6;

/// One analysis frame: `fft_size / 2 + 1` complex bins.
pub type Frame = Vec<Complex<f32>>;

/// Generates a Hann window.
pub fn hann_window(size: usize) -> Vec<f32> {
    match size {
        0 => return vec![],
        1 => return vec![1.0],
        _ => {}
    }
    let n = size as f64;
    (0..size)
        .map(|i| {
            let x = (2.0 * PI * i as f64) / (n - 1.0);
            (0.5 * (1.0 - x.cos())) as f32
        })
        .collect()
}

/// Forward/inverse STFT with cached FFT plans.
pub struct Stft {
    fft_size: usize,
    hop_size: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl Stft {
    pub fn new(fft_size: usize, hop_size: usize) -> Self {
        assert!(fft_size >= 2 && hop_size > 0 && hop_size <= fft_size);
        let mut planner = FftPlanner::new();
        Self {
            fft_size,
            hop_size,
            window: hann_window(fft_size),
            forward: planner.plan_fft_forward(fft_size),
            inverse: planner.plan_fft_inverse(fft_size),
        }
    }

    #[inline]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    #[inline]
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Centred analysis: frame `t` is centred on sample `t * hop`, with zero
    /// padding of `fft_size / 2` on both ends. Yields `1 + len / hop` frames
    /// for any non-empty input.
    pub fn analyze(&self, samples: &[f32]) -> Vec<Frame> {
        if samples.is_empty() {
            return vec![];
        }
        let pad = self.fft_size / 2;
        let mut padded = vec![0.0f32; samples.len() + 2 * pad];
        padded[pad..pad + samples.len()].copy_from_slice(samples);
        self.analyze_valid(&padded)
    }

    /// Analysis over frames lying fully inside `samples` (no padding).
    /// Returns no frames when the input is shorter than one FFT.
    pub fn analyze_valid(&self, samples: &[f32]) -> Vec<Frame> {
        if samples.len() < self.fft_size {
            return vec![];
        }
        let num_frames = (samples.len() - self.fft_size) / self.hop_size + 1;
        let num_bins = self.num_bins();
        let mut buffer = vec![COMPLEX_ZERO; self.fft_size];
        let mut frames = Vec::with_capacity(num_frames);

        for frame_idx in 0..num_frames {
            let start = frame_idx * self.hop_size;
            let input = &samples[start..start + self.fft_size];
            for (slot, (&s, &w)) in buffer.iter_mut().zip(input.iter().zip(self.window.iter())) {
                *slot = Complex::new(s * w, 0.0);
            }
            self.forward.process(&mut buffer);
            frames.push(buffer[..num_bins].to_vec());
        }

        frames
    }

    /// Inverse of [`Stft::analyze`]: overlap-add synthesis trimmed (or
    /// zero-padded) to exactly `length` samples.
    pub fn synthesize(&self, frames: &[Frame], length: usize) -> Vec<f32> {
        if frames.is_empty() || length == 0 {
            return vec![0.0; length];
        }

        let num_bins = self.num_bins();
        let full_len = self.fft_size + self.hop_size * (frames.len() - 1);
        let mut output = vec![0.0f32; full_len];
        let mut window_sum = vec![0.0f32; full_len];
        let mut buffer = vec![COMPLEX_ZERO; self.fft_size];
        let norm = 1.0 / self.fft_size as f32;

        for (frame_idx, frame) in frames.iter().enumerate() {
            buffer[..num_bins].copy_from_slice(&frame[..num_bins]);
            for bin in 1..num_bins - 1 {
                buffer[self.fft_size - bin] = frame[bin].conj();
            }
            self.inverse.process(&mut buffer);

            let start = frame_idx * self.hop_size;
            for (i, &w) in self.window.iter().enumerate() {
                output[start + i] += buffer[i].re * norm * w;
                window_sum[start + i] += w * w;
            }
        }

        normalize_by_window_sum(&mut output, &window_sum);

        let pad = self.fft_size / 2;
        let mut trimmed: Vec<f32> = output.into_iter().skip(pad).take(length).collect();
        trimmed.resize(length, 0.0);
        trimmed
    }
}

/// Normalizes output by window sum, clamping to prevent amplification in
/// low-overlap regions.
fn normalize_by_window_sum(output: &mut [f32], window_sum: &[f32]) {
    let max_window_sum = window_sum.iter().cloned().fold(0.0f32, f32::max);
    let min_window_sum = (max_window_sum * WINDOW_SUM_FLOOR_RATIO).max(WINDOW_SUM_EPSILON);
    for (sample, &ws) in output.iter_mut().zip(window_sum.iter()) {
        *sample /= ws.max(min_window_sum);
    }
}

/// Magnitude in dB with a floor, so silent bins stay finite.
#[inline]
pub fn magnitude_db(c: Complex<f32>) -> f32 {
    20.0 * c.norm().max(1e-6).log10()
}
