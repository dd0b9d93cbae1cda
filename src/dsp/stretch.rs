//! Pitch-preserving time stretch to a target tempo.
//!
//! Phase vocoder over centred STFT frames: analysis frames are read at a
//! fractional step of `rate`, magnitudes are interpolated between the two
//! neighbouring frames, and phases are accumulated from the measured
//! per-bin frequency deviation. Synthesis reuses the analysis hop, so the
//! output has exactly `round(len / rate)` samples.

use std::f32::consts::PI;

use log::debug;
use rustfft::num_complex::Complex;

use crate::dsp::spectral::{Frame, Stft, COMPLEX_ZERO, FFT_SIZE, HOP_SIZE};
use crate::engine::SampleBuffer;

const TWO_PI: f32 = 2.0 * PI;

/// Playback-rate factor that moves `current_bpm` to `target_bpm`.
///
/// `None` when the target is absent or non-positive, or the current tempo
/// is unknown (≤ 0).
pub fn stretch_ratio(current_bpm: f64, target_bpm: Option<f64>) -> Option<f64> {
    let target = target_bpm.filter(|t| t.is_finite() && *t > 0.0)?;
    if !(current_bpm.is_finite() && current_bpm > 0.0) {
        return None;
    }
    Some(target / current_bpm)
}

/// Time-stretch `buffer` from `current_bpm` to `target_bpm`.
///
/// Returns the input unchanged when no ratio can be computed.
pub fn stretch_to_bpm(
    buffer: &SampleBuffer,
    current_bpm: f64,
    target_bpm: Option<f64>,
) -> SampleBuffer {
    match stretch_ratio(current_bpm, target_bpm) {
        Some(rate) => {
            debug!(
                "Stretching {:.2} BPM -> {:.2} BPM (rate {:.4})",
                current_bpm,
                target_bpm.unwrap_or_default(),
                rate
            );
            time_stretch(buffer, rate)
        }
        None => buffer.clone(),
    }
}

/// Speed the buffer up by `rate` (> 1 shortens, < 1 lengthens) without
/// changing pitch. Non-positive or unit rates return a copy of the input.
pub fn time_stretch(buffer: &SampleBuffer, rate: f64) -> SampleBuffer {
    if buffer.is_empty() || !(rate.is_finite() && rate > 0.0) || (rate - 1.0).abs() < 1e-9 {
        return buffer.clone();
    }

    let output_len = (buffer.len() as f64 / rate).round() as usize;
    let stft = Stft::new(FFT_SIZE, HOP_SIZE);
    let frames = stft.analyze(buffer.samples());
    let stretched = phase_vocoder(&frames, rate, stft.fft_size(), stft.hop_size());

    buffer.with_samples(stft.synthesize(&stretched, output_len))
}

/// Resample STFT frames in time by `rate`, keeping per-bin frequencies.
fn phase_vocoder(frames: &[Frame], rate: f64, fft_size: usize, hop: usize) -> Vec<Frame> {
    let Some(first) = frames.first() else {
        return vec![];
    };
    let num_bins = first.len();
    let expected_advance: Vec<f32> = (0..num_bins)
        .map(|bin| TWO_PI * bin as f32 * hop as f32 / fft_size as f32)
        .collect();

    let mut phase_accum: Vec<f32> = first.iter().map(|c| c.arg()).collect();
    let silent: Frame = vec![COMPLEX_ZERO; num_bins];

    let last = frames.len() - 1;
    let num_out = (frames.len() as f64 / rate).ceil() as usize;
    let mut output = Vec::with_capacity(num_out);

    for step in 0..num_out {
        // ceil() in f64 can overshoot by one step, so the read head is clamped
        let position = step as f64 * rate;
        let idx = (position.floor() as usize).min(last);
        let alpha = ((position - idx as f64) as f32).min(1.0);
        let left = &frames[idx];
        let right = frames.get(idx + 1).unwrap_or(&silent);

        let mut frame = Vec::with_capacity(num_bins);
        for bin in 0..num_bins {
            let (l, r) = (left[bin], right[bin]);
            let magnitude = (1.0 - alpha) * l.norm() + alpha * r.norm();
            frame.push(Complex::from_polar(magnitude, phase_accum[bin]));

            let deviation = wrap_phase(r.arg() - l.arg() - expected_advance[bin]);
            phase_accum[bin] += expected_advance[bin] + deviation;
        }
        output.push(frame);
    }

    output
}

/// Wraps a phase value to [-PI, PI] using efficient modulo arithmetic.
#[inline]
fn wrap_phase(phase: f32) -> f32 {
    let p = phase + PI;
    p - (p / TWO_PI).floor() * TWO_PI - PI
}
