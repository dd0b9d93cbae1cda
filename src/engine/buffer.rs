//! Sample Buffer
//!
//! Mono 32-bit float sample storage paired with its sample rate. Every
//! pipeline stage consumes and produces a `SampleBuffer`; the sample rate of
//! a buffer is fixed for its lifetime.

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Peak absolute sample value. Returns 0.0 for an empty slice.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
}

/// Scale samples so their peak absolute value equals `target`.
///
/// Silence stays silent: a zero peak divides by 1.0 instead.
pub fn normalize_peak(samples: &mut [f32], target: f32) {
    let max = peak(samples);
    let divisor = if max > 0.0 { max } else { 1.0 };
    let gain = target / divisor;
    for sample in samples.iter_mut() {
        *sample *= gain;
    }
}

// ============================================================================
// Sample Buffer
// ============================================================================

/// Mono audio buffer
///
/// # Example
/// ```
/// use tracklab::engine::SampleBuffer;
///
/// let buffer = SampleBuffer::silent(44100, 44100);
/// assert_eq!(buffer.len(), 44100);
/// assert!((buffer.duration_secs() - 1.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Wrap existing samples
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Create a buffer of `num_samples` zeros
    pub fn silent(num_samples: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; num_samples], sample_rate)
    }

    /// Copy samples from a slice
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Self {
        Self::new(samples.to_vec(), sample_rate)
    }

    /// New buffer at this buffer's sample rate
    pub fn with_samples(&self, samples: Vec<f32>) -> Self {
        Self::new(samples, self.sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds (sample count / sample rate)
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Peak absolute amplitude (linear)
    pub fn peak(&self) -> f32 {
        peak(&self.samples)
    }

    /// RMS level (linear). Returns 0.0 for empty buffers.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_squares: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_squares / self.samples.len() as f64).sqrt() as f32
    }

    /// RMS level in dB
    pub fn rms_db(&self) -> f32 {
        linear_to_db(self.rms())
    }

    /// True when no sample is NaN or infinite
    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(|s| s.is_finite())
    }

    /// Copy of this buffer scaled to the given peak amplitude
    pub fn normalized_to_peak(&self, target: f32) -> Self {
        let mut samples = self.samples.clone();
        normalize_peak(&mut samples, target);
        self.with_samples(samples)
    }
}
