//! Tracklab - Batch Audio Processing Pipeline
//!
//! Takes one uploaded track through a fixed sequence of stages:
//! 1. Decode to a mono buffer at the native sample rate
//! 2. Estimate the base tempo
//! 3. Spectral-gate noise learned from the first half second
//! 4. Time-stretch to a target tempo (pitch preserved)
//! 5. Overlay a tempo-matched percussion loop
//! 6. Export as WAV or MP3
//!
//! # Architecture
//!
//! - `engine`: sample buffers and file I/O
//! - `dsp`: the buffer-to-buffer stages, each testable on its own
//! - `pipeline`: stage ordering and the run entry point
//! - `config`: deployment settings (loop asset, MP3 encoder)

pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod pipeline;

pub use config::{EncoderConfig, PipelineConfig};
pub use engine::{ExportFormat, SampleBuffer};
pub use error::{Result, TracklabError};
pub use pipeline::{run, Pipeline, ProcessParams, Processed, ProcessingResult};
