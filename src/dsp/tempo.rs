//! Tempo estimation from an onset-strength envelope.
//!
//! The envelope is log-compressed spectral flux. Its autocorrelation is
//! searched over the 30-300 BPM lag range, weighted by a log-normal prior
//! centred on 120 BPM to settle octave ambiguity, and the winning lag is
//! refined by parabolic interpolation. Silent, too-short or aperiodic input
//! yields `0.0` ("tempo unknown").

use crate::dsp::spectral::{Stft, FFT_SIZE, HOP_SIZE};
use crate::engine::SampleBuffer;

/// Slowest tempo considered.
pub const MIN_BPM: f64 = 30.0;
/// Fastest tempo considered.
pub const MAX_BPM: f64 = 300.0;

/// Centre of the tempo prior.
const PRIOR_CENTER_BPM: f64 = 120.0;
/// Standard deviation of the tempo prior, in octaves.
const PRIOR_STD_OCTAVES: f64 = 1.0;

/// Gain applied before log compression of magnitudes.
const LOG_COMPRESSION_GAIN: f32 = 10.0;

/// Best normalized autocorrelation below which the envelope is treated as
/// having no beat.
const MIN_PERIODICITY: f64 = 0.1;

/// Envelope energy below which the input counts as silent.
const SILENCE_ENERGY: f64 = 1e-10;

/// Onset strength per analysis frame.
#[derive(Debug, Clone)]
pub struct OnsetEnvelope {
    pub strength: Vec<f32>,
    pub hop_size: usize,
    pub sample_rate: u32,
}

impl OnsetEnvelope {
    /// Envelope frames per second.
    #[inline]
    pub fn frame_rate(&self) -> f64 {
        self.sample_rate as f64 / self.hop_size as f64
    }

    #[inline]
    fn lag_to_bpm(&self, lag: f64) -> f64 {
        60.0 * self.frame_rate() / lag
    }
}

/// Computes the onset-strength envelope of a mono signal.
///
/// Each value is the summed positive change in log-compressed magnitude
/// from the previous frame. Inputs shorter than one FFT produce an empty
/// envelope.
pub fn onset_strength(samples: &[f32], sample_rate: u32) -> OnsetEnvelope {
    let stft = Stft::new(FFT_SIZE, HOP_SIZE);
    let frames = stft.analyze_valid(samples);

    let mut strength = Vec::with_capacity(frames.len());
    let mut prev: Option<Vec<f32>> = None;

    for frame in &frames {
        let log_mag: Vec<f32> = frame
            .iter()
            .map(|c| (1.0 + LOG_COMPRESSION_GAIN * c.norm()).ln())
            .collect();

        let flux = match &prev {
            Some(prev) => log_mag
                .iter()
                .zip(prev.iter())
                .map(|(&m, &p)| (m - p).max(0.0))
                .sum(),
            None => 0.0,
        };
        strength.push(flux);
        prev = Some(log_mag);
    }

    OnsetEnvelope {
        strength,
        hop_size: HOP_SIZE,
        sample_rate,
    }
}

/// Estimates the global tempo of a buffer in BPM, `0.0` when unknown.
pub fn estimate_bpm(buffer: &SampleBuffer) -> f64 {
    if buffer.sample_rate() == 0 {
        return 0.0;
    }
    tempo_from_envelope(&onset_strength(buffer.samples(), buffer.sample_rate()))
}

/// Picks the dominant beat period of an onset envelope.
pub fn tempo_from_envelope(envelope: &OnsetEnvelope) -> f64 {
    let n = envelope.strength.len();
    if n < 3 {
        return 0.0;
    }

    let mean = envelope.strength.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let centered: Vec<f64> = envelope
        .strength
        .iter()
        .map(|&v| v as f64 - mean)
        .collect();

    let energy: f64 = centered.iter().map(|v| v * v).sum();
    if energy < SILENCE_ENERGY {
        return 0.0;
    }

    let frame_rate = envelope.frame_rate();
    let min_lag = ((60.0 * frame_rate / MAX_BPM).floor() as usize).max(1);
    let max_lag = ((60.0 * frame_rate / MIN_BPM).ceil() as usize).min(n - 2);
    if min_lag >= max_lag {
        return 0.0;
    }

    let acf: Vec<f64> = (0..=max_lag + 1)
        .map(|lag| autocorrelation(&centered, lag) / energy)
        .collect();

    let mut best_lag = 0;
    let mut best_score = f64::NEG_INFINITY;
    for lag in min_lag..=max_lag {
        let score = acf[lag] * tempo_prior(envelope.lag_to_bpm(lag as f64));
        if score > best_score {
            best_score = score;
            best_lag = lag;
        }
    }

    if acf[best_lag] < MIN_PERIODICITY {
        return 0.0;
    }

    let offset = parabolic_offset(acf[best_lag - 1], acf[best_lag], acf[best_lag + 1]);
    let refined = best_lag as f64 + offset;
    envelope.lag_to_bpm(refined)
}

#[inline]
fn autocorrelation(x: &[f64], lag: usize) -> f64 {
    x.iter().zip(&x[lag..]).map(|(a, b)| a * b).sum()
}

/// Log-normal weight favouring tempi near `PRIOR_CENTER_BPM`.
#[inline]
fn tempo_prior(bpm: f64) -> f64 {
    let octaves = (bpm / PRIOR_CENTER_BPM).log2() / PRIOR_STD_OCTAVES;
    (-0.5 * octaves * octaves).exp()
}

/// Vertex offset of the parabola through three equally spaced points,
/// clamped to half a step.
#[inline]
fn parabolic_offset(left: f64, center: f64, right: f64) -> f64 {
    let denom = left - 2.0 * center + right;
    if denom.abs() < 1e-12 {
        return 0.0;
    }
    (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
}
