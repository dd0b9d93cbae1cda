//! Pipeline configuration
//!
//! Deployment-level settings that are not part of a single job's
//! parameters: where the bundled drum loop lives and which external program
//! produces MP3 files. Settings load from a JSON file, and environment
//! variables override individual fields.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TracklabError};

/// File name of the bundled percussion loop (120 BPM)
pub const DRUM_LOOP_FILE: &str = "drum_loop_120bpm.wav";

/// Copy of the loop in the source checkout
const SOURCE_DRUM_LOOP: &str =
    concat!(env!("CARGO_MANIFEST_DIR"), "/assets/drum_loop_120bpm.wav");

/// Default MP3 encoder program
pub const DEFAULT_ENCODER: &str = "ffmpeg";

/// Constant bitrate for MP3 export in kbps
pub const DEFAULT_MP3_BITRATE_KBPS: u32 = 192;

/// Environment override for the drum loop path
pub const ENV_DRUM_LOOP: &str = "TRACKLAB_DRUM_LOOP";

/// Environment override for the encoder program
pub const ENV_MP3_ENCODER: &str = "TRACKLAB_MP3_ENCODER";

/// External MP3 encoder settings
///
/// The program must accept ffmpeg-style arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub program: String,
    pub bitrate_kbps: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_ENCODER.to_string(),
            bitrate_kbps: DEFAULT_MP3_BITRATE_KBPS,
        }
    }
}

/// Settings shared by every pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Percussion loop mixed in when `add_drums` is set
    pub drum_loop_path: PathBuf,
    pub encoder: EncoderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            drum_loop_path: default_drum_loop(),
            encoder: EncoderConfig::default(),
        }
    }
}

/// Where the bundled loop is looked up when nothing overrides it
///
/// An installed binary uses `assets/` beside the executable; a binary run
/// from the checkout falls back to the source tree copy. Deployments that
/// ship neither should set `TRACKLAB_DRUM_LOOP`.
pub fn default_drum_loop() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| installed_drum_loop(&exe))
        .unwrap_or_else(|| PathBuf::from(SOURCE_DRUM_LOOP))
}

fn installed_drum_loop(exe: &Path) -> Option<PathBuf> {
    let path = exe.parent()?.join("assets").join(DRUM_LOOP_FILE);
    path.is_file().then_some(path)
}

impl PipelineConfig {
    /// Load from a JSON file; absent fields keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| TracklabError::Config {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TRACKLAB_DRUM_LOOP` / `TRACKLAB_MP3_ENCODER` if set
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(path) = env::var_os(ENV_DRUM_LOOP).filter(|v| !v.is_empty()) {
            self.drum_loop_path = PathBuf::from(path);
        }
        if let Ok(program) = env::var(ENV_MP3_ENCODER) {
            if !program.trim().is_empty() {
                self.encoder.program = program;
            }
        }
        self
    }

    pub fn with_drum_loop(mut self, path: impl Into<PathBuf>) -> Self {
        self.drum_loop_path = path.into();
        self
    }

    pub fn with_encoder(mut self, encoder: EncoderConfig) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.encoder.program.trim().is_empty() {
            return Err(TracklabError::Config {
                reason: "encoder program must not be empty".to_string(),
            });
        }
        if self.encoder.bitrate_kbps == 0 {
            return Err(TracklabError::Config {
                reason: "encoder bitrate must be positive".to_string(),
            });
        }
        Ok(())
    }
}
