//! Processing pipeline
//!
//! Fixed stage order for one track:
//!
//! 1. decode (native rate, mono)
//! 2. estimate base tempo
//! 3. denoise at `noise_reduction_strength`
//! 4. stretch to `target_bpm` if one is given
//! 5. overlay the drum loop if `add_drums` is set
//! 6. encode to `export_format`
//!
//! Errors from any stage propagate unmodified; a failed run leaves no
//! output file and produces no `ProcessingResult`. The pipeline keeps no
//! state between runs, so independent runs may execute concurrently.

use std::path::Path;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::dsp::{denoise, mixer, stretch, tempo};
use crate::engine::io::{decode, encode};
use crate::engine::{ExportFormat, SampleBuffer};
use crate::error::{Result, TracklabError};

/// Caller-supplied parameters for one run
///
/// Missing JSON fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessParams {
    /// Fraction of estimated noise to remove (0-1)
    pub noise_reduction_strength: f32,
    /// Overlay the percussion loop
    pub add_drums: bool,
    /// Blend weight of the loop (0-1)
    pub drum_mix: f32,
    /// Tempo to stretch to; `None` keeps the track's own tempo
    pub target_bpm: Option<f64>,
    pub export_format: ExportFormat,
}

impl Default for ProcessParams {
    fn default() -> Self {
        Self {
            noise_reduction_strength: 0.6,
            add_drums: true,
            drum_mix: 0.4,
            target_bpm: None,
            export_format: ExportFormat::Mp3,
        }
    }
}

impl ProcessParams {
    pub fn with_strength(mut self, strength: f32) -> Self {
        self.noise_reduction_strength = strength;
        self
    }

    pub fn with_drums(mut self, add_drums: bool) -> Self {
        self.add_drums = add_drums;
        self
    }

    pub fn with_drum_mix(mut self, mix: f32) -> Self {
        self.drum_mix = mix;
        self
    }

    pub fn with_target_bpm(mut self, bpm: Option<f64>) -> Self {
        self.target_bpm = bpm;
        self
    }

    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.export_format = format;
        self
    }

    /// Target tempo if it is usable; zero, negative and non-finite values
    /// count as absent.
    pub fn effective_target(&self) -> Option<f64> {
        self.target_bpm.filter(|t| t.is_finite() && *t > 0.0)
    }

    /// Reject values outside their conventional ranges.
    ///
    /// The pipeline itself tolerates any values; this is for callers that
    /// want to refuse bad input up front.
    pub fn validate(&self) -> Result<()> {
        let strength = self.noise_reduction_strength;
        if !(0.0..=1.0).contains(&strength) {
            return Err(invalid("noise_reduction_strength", strength, "0.0 to 1.0"));
        }
        if !(0.0..=1.0).contains(&self.drum_mix) {
            return Err(invalid("drum_mix", self.drum_mix, "0.0 to 1.0"));
        }
        if let Some(bpm) = self.target_bpm {
            if !(bpm.is_finite() && bpm > 0.0) {
                return Err(invalid("target_bpm", bpm, "a positive tempo"));
            }
        }
        Ok(())
    }
}

fn invalid(param: &str, value: impl ToString, expected: &str) -> TracklabError {
    TracklabError::InvalidParameter {
        param: param.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

/// Metadata returned for a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub duration_seconds: f64,
    /// Effective tempo after any stretch
    pub bpm: f64,
    pub sample_rate: u32,
}

impl ProcessingResult {
    fn describe(buffer: &SampleBuffer, bpm: f64) -> Self {
        Self {
            duration_seconds: buffer.duration_secs(),
            bpm,
            sample_rate: buffer.sample_rate(),
        }
    }
}

/// In-memory output of [`Pipeline::process`]
#[derive(Debug, Clone)]
pub struct Processed {
    pub buffer: SampleBuffer,
    /// Tempo detected on the decoded input (0.0 when unknown)
    pub base_bpm: f64,
    /// Target tempo if one was given, otherwise `base_bpm`
    pub bpm: f64,
    pub drums_mixed: bool,
}

/// Stage sequencer bound to deployment settings
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the buffer stages: tempo, denoise, stretch, loop overlay
    pub fn process(&self, buffer: SampleBuffer, params: &ProcessParams) -> Result<Processed> {
        let base_bpm = tempo::estimate_bpm(&buffer);
        debug!("Base tempo: {:.2} BPM", base_bpm);

        let denoised = denoise::reduce(&buffer, params.noise_reduction_strength);

        let target = params.effective_target();
        if let Some(t) = target.filter(|_| base_bpm <= 0.0) {
            warn!("Tempo unknown, skipping stretch to {:.2} BPM", t);
        }
        let stretched = stretch::stretch_to_bpm(&denoised, base_bpm, target);
        debug!("Stretch: {} -> {} samples", denoised.len(), stretched.len());

        let bpm = target.unwrap_or(base_bpm);

        let (buffer, drums_mixed) = if params.add_drums {
            let outcome = mixer::overlay(
                &stretched,
                Some(bpm),
                params.drum_mix,
                &self.config.drum_loop_path,
            )?;
            if let Some(reason) = outcome.skip_reason() {
                warn!(
                    "Skipping drum overlay ({}): {}",
                    reason,
                    self.config.drum_loop_path.display()
                );
            }
            let mixed = outcome.is_mixed();
            (outcome.into_buffer(), mixed)
        } else {
            (stretched, false)
        };

        Ok(Processed {
            buffer,
            base_bpm,
            bpm,
            drums_mixed,
        })
    }

    /// Decode `input`, process it and write the result to `output`
    ///
    /// # Errors
    /// Decode errors for `input`, decode errors for a corrupt drum loop,
    /// and encode errors for `output`. No output file exists after a
    /// failed run.
    pub fn run(
        &self,
        input: &Path,
        output: &Path,
        params: &ProcessParams,
    ) -> Result<ProcessingResult> {
        info!("Processing {} -> {}", input.display(), output.display());

        let decoded = decode(input)?;
        let processed = self.process(decoded, params)?;
        encode(
            &processed.buffer,
            output,
            params.export_format,
            &self.config.encoder,
        )?;

        let result = ProcessingResult::describe(&processed.buffer, processed.bpm);
        info!(
            "Wrote {} ({:.2}s @ {} Hz, {:.2} BPM, drums: {})",
            output.display(),
            result.duration_seconds,
            result.sample_rate,
            result.bpm,
            processed.drums_mixed
        );
        Ok(result)
    }
}

/// Run the pipeline with the default configuration
pub fn run(input: &Path, output: &Path, params: &ProcessParams) -> Result<ProcessingResult> {
    Pipeline::default().run(input, output, params)
}
