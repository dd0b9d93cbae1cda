//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use log::{error, info};
use serde_json::json;
use walkdir::WalkDir;

use crate::cli::ProcessOptions;
use crate::config::PipelineConfig;
use crate::dsp::tempo::estimate_bpm;
use crate::engine::io::decode;
use crate::engine::ExportFormat;
use crate::pipeline::Pipeline;

/// File extensions picked up by `batch`
const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "ogg"];

/// Process one file and print its result as JSON.
pub fn process(
    input: &Path,
    output: Option<&Path>,
    options: &ProcessOptions,
) -> anyhow::Result<()> {
    let params = options.params();
    params.validate()?;
    let pipeline = build_pipeline(options)?;

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(input, None, params.export_format));

    let result = pipeline
        .run(input, &output, &params)
        .with_context(|| format!("failed to process {}", input.display()))?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Print basic facts about a file.
pub fn analyze(input: &Path) -> anyhow::Result<()> {
    info!("Analyzing: {}", input.display());

    let buffer = decode(input).with_context(|| format!("cannot read {}", input.display()))?;
    let report = json!({
        "path": input.display().to_string(),
        "duration_seconds": buffer.duration_secs(),
        "sample_rate": buffer.sample_rate(),
        "samples": buffer.len(),
        "peak": buffer.peak(),
        "rms_db": buffer.rms_db(),
        "bpm": estimate_bpm(&buffer),
    });

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Process every audio file under `input_dir` into `output_dir`.
///
/// Each file is an independent run; failures are reported and the batch
/// carries on. Returns an error if any file failed.
pub fn batch(
    input_dir: &Path,
    output_dir: &Path,
    options: &ProcessOptions,
) -> anyhow::Result<()> {
    let params = options.params();
    params.validate()?;
    let pipeline = build_pipeline(options)?;

    if !input_dir.is_dir() {
        bail!("{} is not a directory", input_dir.display());
    }
    fs::create_dir_all(output_dir)
        .with_context(|| format!("cannot create {}", output_dir.display()))?;

    let inputs = collect_audio_files(input_dir);
    info!("Found {} audio files in {}", inputs.len(), input_dir.display());

    let mut failed = 0usize;
    for input in &inputs {
        let output = batch_output(input, input_dir, output_dir, params.export_format);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        match pipeline.run(input, &output, &params) {
            Ok(result) => {
                println!(
                    "{}",
                    json!({ "input": input.display().to_string(), "result": result })
                );
            }
            Err(e) => {
                failed += 1;
                error!("{}: {} [{}]", input.display(), e, e.error_code());
                for suggestion in e.recovery_suggestions() {
                    info!("  hint: {}", suggestion);
                }
            }
        }
    }

    println!("Processed {} of {} files", inputs.len() - failed, inputs.len());
    if failed > 0 {
        bail!("{} of {} files failed", failed, inputs.len());
    }
    Ok(())
}

/// Config file (if any), then environment, then the `--loop` flag.
fn build_pipeline(options: &ProcessOptions) -> anyhow::Result<Pipeline> {
    let mut config = match &options.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("invalid config {}", path.display()))?,
        None => PipelineConfig::default(),
    }
    .with_env_overrides();

    if let Some(loop_path) = &options.loop_path {
        config = config.with_drum_loop(loop_path);
    }
    Ok(Pipeline::new(config))
}

/// `<dir>/<stem>_processed.<ext>`, with `dir` defaulting to the input's own.
fn default_output(input: &Path, dir: Option<&Path>, format: ExportFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "track".to_string());
    let name = format!("{}_processed.{}", stem, format.extension());
    match dir.or_else(|| input.parent()) {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// Output path for a batch input, mirroring its subdirectory under `output_dir`
fn batch_output(
    input: &Path,
    input_dir: &Path,
    output_dir: &Path,
    format: ExportFormat,
) -> PathBuf {
    let relative_dir = input
        .parent()
        .and_then(|dir| dir.strip_prefix(input_dir).ok())
        .unwrap_or_else(|| Path::new(""));
    default_output(input, Some(&output_dir.join(relative_dir)), format)
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.iter().any(|a| e.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

fn collect_audio_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_audio_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}
