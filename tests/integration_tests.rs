//! Integration Tests
//!
//! End-to-end runs of the Tracklab pipeline over synthetic tracks.

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use tracklab::config::{EncoderConfig, PipelineConfig};
use tracklab::dsp::MIX_HEADROOM_PEAK;
use tracklab::engine::io::{decode, encode, write_wav};
use tracklab::engine::{generate_test_tone, ExportFormat, SampleBuffer};
use tracklab::{Pipeline, ProcessParams, TracklabError};

/// Click train at `bpm` over a quiet 200 Hz bed
fn click_track(bpm: f64, sample_rate: u32, duration_secs: f64) -> SampleBuffer {
    let num_samples = (sample_rate as f64 * duration_secs) as usize;
    let beat_interval = 60.0 * sample_rate as f64 / bpm;
    let mut samples: Vec<f32> = (0..num_samples)
        .map(|i| 0.2 * (2.0 * std::f32::consts::PI * 200.0 * i as f32 / sample_rate as f32).sin())
        .collect();

    let mut beat = 0.0;
    while (beat as usize) < num_samples {
        let pos = beat as usize;
        for j in 0..10.min(num_samples - pos) {
            samples[pos + j] += if j < 5 { 0.9 } else { -0.4 };
        }
        beat += beat_interval;
    }
    SampleBuffer::new(samples, sample_rate)
}

fn pipeline_with_loop(loop_path: &Path) -> Pipeline {
    Pipeline::new(PipelineConfig::default().with_drum_loop(loop_path))
}

fn leftover_intermediates(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp.wav"))
        .collect()
}

// === Scenario A: plain tone, no target, no drums ===

#[test]
fn test_sine_without_target_or_drums() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("sine.wav");
    let output = dir.path().join("sine_out.wav");
    write_wav(&generate_test_tone(440.0, 10.0, 44100), &input, 16).unwrap();

    let params = ProcessParams::default()
        .with_drums(false)
        .with_format(ExportFormat::Wav);
    let result = pipeline_with_loop(&dir.path().join("none.wav"))
        .run(&input, &output, &params)
        .unwrap();

    assert!((result.duration_seconds - 10.0).abs() < 1e-3);
    assert_eq!(result.sample_rate, 44100);
    assert!(result.bpm.is_finite());
    assert!(result.bpm >= 0.0);

    let written = decode(&output).unwrap();
    assert_eq!(written.len(), 441_000);
    assert!(written.is_finite());
}

// === Scenario B: 120 BPM click track retargeted to 90 ===

#[test]
fn test_click_track_retargeted() {
    let track = click_track(120.0, 44100, 8.0);
    let input_len = track.len() as f64;

    let params = ProcessParams::default()
        .with_drums(false)
        .with_target_bpm(Some(90.0));
    let processed = pipeline_with_loop(Path::new("/nonexistent/loop.wav"))
        .process(track, &params)
        .unwrap();

    assert!(
        (processed.base_bpm - 120.0).abs() < 3.0,
        "base tempo {}",
        processed.base_bpm
    );
    assert_eq!(processed.bpm, 90.0);

    let expected = input_len * 120.0 / 90.0;
    let error = (processed.buffer.len() as f64 - expected).abs() / expected;
    assert!(error < 0.03, "length {} vs ~{}", processed.buffer.len(), expected);
}

// === Scenario C: drums enabled at zero weight ===

#[test]
fn test_zero_drum_mix_keeps_track() {
    let dir = TempDir::new().unwrap();
    let loop_path = dir.path().join("loop.wav");
    write_wav(&click_track(120.0, 44100, 2.0), &loop_path, 16).unwrap();

    let track = generate_test_tone(330.0, 3.0, 44100);
    let pipeline = pipeline_with_loop(&loop_path);

    let alone = pipeline
        .process(track.clone(), &ProcessParams::default().with_drums(false))
        .unwrap();
    let with_drums = pipeline
        .process(
            track,
            &ProcessParams::default().with_drums(true).with_drum_mix(0.0),
        )
        .unwrap();

    assert!(with_drums.drums_mixed);
    let expected = alone.buffer.normalized_to_peak(MIX_HEADROOM_PEAK);
    assert_eq!(with_drums.buffer.len(), expected.len());
    for (a, b) in with_drums.buffer.samples().iter().zip(expected.samples()) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn test_drum_overlay_with_target_tempo() {
    let dir = TempDir::new().unwrap();
    let loop_path = dir.path().join("loop.wav");
    write_wav(&click_track(120.0, 22050, 2.0), &loop_path, 16).unwrap();

    let track = click_track(100.0, 44100, 6.0);
    let params = ProcessParams::default().with_target_bpm(Some(110.0));
    let processed = pipeline_with_loop(&loop_path).process(track, &params).unwrap();

    assert!(processed.drums_mixed);
    assert_eq!(processed.bpm, 110.0);
    assert!(processed.buffer.peak() <= MIX_HEADROOM_PEAK + 1e-6);
    assert!(processed.buffer.is_finite());
}

// === Scenario D: WAV vs MP3 export of the same buffer ===

#[test]
fn test_wav_export_is_exact() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.wav");
    let processed = pipeline_with_loop(Path::new("/nonexistent/loop.wav"))
        .process(
            generate_test_tone(523.25, 2.0, 48000),
            &ProcessParams::default(),
        )
        .unwrap();

    encode(
        &processed.buffer,
        &output,
        ExportFormat::Wav,
        &EncoderConfig::default(),
    )
    .unwrap();

    let decoded = decode(&output).unwrap();
    assert_eq!(decoded.sample_rate(), 48000);
    assert_eq!(decoded.samples(), processed.buffer.samples());
}

#[test]
fn test_mp3_export_leaves_no_intermediate() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.mp3");
    let buffer = generate_test_tone(440.0, 1.0, 44100).normalized_to_peak(0.9);

    // ffmpeg may or may not be installed; both outcomes must clean up
    match encode(&buffer, &output, ExportFormat::Mp3, &EncoderConfig::default()) {
        Ok(()) => {
            assert!(output.exists());
            assert!(fs::metadata(&output).unwrap().len() > 0);
        }
        Err(e) => {
            assert!(e.is_encode_error());
            assert!(!output.exists());
        }
    }
    assert!(leftover_intermediates(dir.path()).is_empty());
}

#[test]
fn test_mp3_missing_encoder_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.wav");
    let output = dir.path().join("out.mp3");
    write_wav(&generate_test_tone(440.0, 1.0, 22050), &input, 16).unwrap();

    let encoder = EncoderConfig {
        program: "tracklab-no-such-encoder".to_string(),
        ..EncoderConfig::default()
    };
    let pipeline = Pipeline::new(
        PipelineConfig::default()
            .with_drum_loop(dir.path().join("none.wav"))
            .with_encoder(encoder),
    );

    let err = pipeline
        .run(&input, &output, &ProcessParams::default())
        .unwrap_err();
    assert!(matches!(err, TracklabError::EncoderUnavailable { .. }));
    assert_eq!(err.error_code(), "ENCODER_UNAVAILABLE");
    assert!(!output.exists());
    assert!(leftover_intermediates(dir.path()).is_empty());
}

// === Inputs in other containers ===

#[test]
fn test_stereo_24bit_input() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("stereo.wav");
    let output = dir.path().join("stereo_out.wav");

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 32000,
        bits_per_sample: 24,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&input, spec).unwrap();
    for i in 0..32000 {
        let s = ((i as f32 * 0.05).sin() * 4_000_000.0) as i32;
        writer.write_sample(s).unwrap();
        writer.write_sample(-s / 2).unwrap();
    }
    writer.finalize().unwrap();

    let params = ProcessParams::default()
        .with_drums(false)
        .with_format(ExportFormat::Wav);
    let result = pipeline_with_loop(&dir.path().join("none.wav"))
        .run(&input, &output, &params)
        .unwrap();

    assert_eq!(result.sample_rate, 32000);
    assert!((result.duration_seconds - 1.0).abs() < 1e-6);
}

#[test]
fn test_corrupt_input_is_decode_error() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("upload.mp3");
    let output = dir.path().join("out.wav");
    fs::write(&input, vec![0x42u8; 4096]).unwrap();

    let err = tracklab::run(
        &input,
        &output,
        &ProcessParams::default().with_format(ExportFormat::Wav),
    )
    .unwrap_err();
    assert!(err.is_decode_error());
    assert!(!output.exists());
}

#[test]
fn test_bundled_loop_is_mixed_by_default() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.wav");
    let output = dir.path().join("out.wav");
    write_wav(&click_track(128.0, 44100, 4.0), &input, 16).unwrap();

    let params = ProcessParams::default().with_format(ExportFormat::Wav);
    let result = tracklab::run(&input, &output, &params).unwrap();

    assert_eq!(result.sample_rate, 44100);
    assert!((result.duration_seconds - 4.0).abs() < 1e-3);
    let written = decode(&output).unwrap();
    assert!(written.peak() <= MIX_HEADROOM_PEAK + 1e-6);
    assert!(written.peak() > 0.5);
}
