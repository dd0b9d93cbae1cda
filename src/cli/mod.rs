//! CLI Module
//!
//! Command-line interface for the Tracklab pipeline.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::engine::ExportFormat;
use crate::pipeline::ProcessParams;

/// Tracklab - denoise, retime and export audio tracks
#[derive(Parser, Debug)]
#[command(name = "tracklab")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process a single track
    #[command(name = "process")]
    Process {
        /// Input audio file
        input: PathBuf,

        /// Output file (default: <input stem>_processed.<ext> next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: ProcessOptions,
    },

    /// Print duration, sample rate, peak and tempo of a file
    #[command(name = "analyze")]
    Analyze {
        /// Input audio file
        input: PathBuf,
    },

    /// Process every audio file under a directory
    #[command(name = "batch")]
    Batch {
        /// Directory to scan (recursively)
        input_dir: PathBuf,

        /// Directory for processed files
        output_dir: PathBuf,

        #[command(flatten)]
        options: ProcessOptions,
    },
}

/// Options shared by `process` and `batch`
#[derive(Args, Debug, Clone)]
pub struct ProcessOptions {
    /// Noise reduction strength (0.0 - 1.0)
    #[arg(long, default_value_t = 0.6)]
    pub strength: f32,

    /// Skip the drum loop overlay
    #[arg(long)]
    pub no_drums: bool,

    /// Drum loop blend weight (0.0 - 1.0)
    #[arg(long, default_value_t = 0.4)]
    pub drum_mix: f32,

    /// Stretch to this tempo
    #[arg(long)]
    pub target_bpm: Option<f64>,

    /// Export format (mp3 or wav)
    #[arg(short, long, default_value = "mp3")]
    pub format: ExportFormat,

    /// Drum loop file (overrides config and environment)
    #[arg(long = "loop")]
    pub loop_path: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl ProcessOptions {
    pub fn params(&self) -> ProcessParams {
        ProcessParams::default()
            .with_strength(self.strength)
            .with_drums(!self.no_drums)
            .with_drum_mix(self.drum_mix)
            .with_target_bpm(self.target_bpm)
            .with_format(self.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_process_args() {
        let cli = Cli::parse_from([
            "tracklab",
            "process",
            "song.mp3",
            "--target-bpm",
            "90",
            "--no-drums",
            "-f",
            "WAV",
        ]);
        match cli.command {
            Commands::Process { input, output, options } => {
                assert_eq!(input, PathBuf::from("song.mp3"));
                assert!(output.is_none());
                let params = options.params();
                assert_eq!(params.target_bpm, Some(90.0));
                assert!(!params.add_drums);
                assert_eq!(params.export_format, ExportFormat::Wav);
                assert_eq!(params.noise_reduction_strength, 0.6);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["tracklab", "process", "a.wav", "-f", "ogg"]).is_err());
    }
}
