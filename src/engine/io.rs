//! Audio file I/O for Tracklab
//!
//! Decoding keeps the file's native sample rate and downmixes to mono. WAV
//! files are read with hound; every other container (MP3, FLAC, OGG, ...)
//! goes through symphonia's probe, as do WAV encodings hound cannot read.
//! Rate conversion uses rubato. Export writes WAV directly or hands a
//! temporary WAV to the external MP3 encoder (see `engine::encoder`).

use std::fmt;
use std::fs::{self, File};
use std::path::Path;
use std::str::FromStr;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::debug;
use rubato::{
    calculate_cutoff, Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};
use serde::{Deserialize, Serialize};
use symphonia::core::audio::SampleBuffer as InterleavedSamples;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::config::EncoderConfig;
use crate::engine::buffer::SampleBuffer;
use crate::engine::encoder;
use crate::error::{Result, TracklabError};

/// Bit depth of exported WAV files (32-bit float keeps samples exact)
pub const WAV_EXPORT_BIT_DEPTH: u16 = 32;

/// Sinc kernel length of the loop resampler
const RESAMPLE_SINC_LEN: usize = 128;
/// Input frames fed to the resampler per call
const RESAMPLE_CHUNK: usize = 1024;

/// Output container for a processed track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// MP3 at a constant bitrate via the external encoder
    #[default]
    #[serde(alias = "MP3")]
    Mp3,
    /// Uncompressed PCM WAV
    #[serde(alias = "WAV")]
    Wav,
}

impl ExportFormat {
    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Mp3 => "mp3",
            ExportFormat::Wav => "wav",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = TracklabError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(ExportFormat::Mp3),
            "wav" => Ok(ExportFormat::Wav),
            other => Err(TracklabError::InvalidParameter {
                param: "export_format".to_string(),
                value: other.to_string(),
                expected: "mp3 or wav".to_string(),
            }),
        }
    }
}

/// Decode an audio file to a mono buffer at its native sample rate
///
/// # Errors
/// * `FileNotFound` - If the file does not exist
/// * `Decode` - If the container or codec data cannot be read
/// * `UnsupportedFormat` - If the codec or bit depth is not supported
pub fn decode(path: &Path) -> Result<SampleBuffer> {
    if !path.exists() {
        return Err(TracklabError::FileNotFound {
            path: path.display().to_string(),
            source: None,
        });
    }

    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);

    let buffer = if is_wav {
        match WavReader::open(path) {
            Ok(reader) => decode_wav(reader)?,
            // A-law, mu-law and ADPCM are left to symphonia
            Err(hound::Error::Unsupported) => {
                debug!("{}: WAV encoding not handled by hound", path.display());
                decode_with_symphonia(path)?
            }
            Err(e) => {
                return Err(TracklabError::decode(
                    format!("failed to open WAV file: {}", e),
                    e,
                ))
            }
        }
    } else {
        decode_with_symphonia(path)?
    };

    debug!(
        "Decoded {}: {} samples @ {} Hz",
        path.display(),
        buffer.len(),
        buffer.sample_rate()
    );
    Ok(buffer)
}

/// Decode an audio file and resample it to `sample_rate`
///
/// The result has `round(len * sample_rate / native_rate)` samples.
pub fn decode_at_rate(path: &Path, sample_rate: u32) -> Result<SampleBuffer> {
    let buffer = decode(path)?;
    if buffer.sample_rate() == sample_rate {
        return Ok(buffer);
    }
    let resampled = resample(buffer.samples(), buffer.sample_rate(), sample_rate)?;
    Ok(SampleBuffer::new(resampled, sample_rate))
}

/// Export a buffer to `path` in the given format
///
/// A partially written output is removed before the error propagates, so a
/// failed export never leaves a file behind.
pub fn encode(
    buffer: &SampleBuffer,
    path: &Path,
    format: ExportFormat,
    encoder_config: &EncoderConfig,
) -> Result<()> {
    let result = match format {
        ExportFormat::Wav => write_wav(buffer, path, WAV_EXPORT_BIT_DEPTH),
        ExportFormat::Mp3 => encoder::encode_mp3(buffer, path, encoder_config),
    };

    if result.is_err() && path.exists() {
        let _ = fs::remove_file(path);
    }
    result
}

/// Write a mono WAV file at the buffer's sample rate
///
/// Supported bit depths: 16, 24 (integer PCM) and 32 (float).
pub fn write_wav(buffer: &SampleBuffer, path: &Path, bit_depth: u16) -> Result<()> {
    let sample_format = match bit_depth {
        16 | 24 => SampleFormat::Int,
        32 => SampleFormat::Float,
        _ => {
            return Err(TracklabError::UnsupportedFormat {
                format: format!("{}-bit audio (only 16, 24, 32 supported)", bit_depth),
            });
        }
    };

    let spec = WavSpec {
        channels: 1,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: bit_depth,
        sample_format,
    };

    let mut writer = WavWriter::create(path, spec)
        .map_err(|e| TracklabError::encode(format!("cannot create {}", path.display()), e))?;

    for &sample in buffer.samples() {
        let written = match bit_depth {
            16 => writer.write_sample((sample * 32767.0).clamp(-32768.0, 32767.0) as i16),
            // 24-bit stored as i32 in hound
            24 => writer.write_sample((sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32),
            _ => writer.write_sample(sample),
        };
        written.map_err(|e| TracklabError::encode("failed to write sample", e))?;
    }

    writer
        .finalize()
        .map_err(|e| TracklabError::encode("failed to finalize WAV file", e))?;

    Ok(())
}

/// Generate a mono sine wave, handy for exercising the pipeline
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> SampleBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    let samples = (0..num_samples)
        .map(|i| (angular_freq * i as f32).sin())
        .collect();
    SampleBuffer::new(samples, sample_rate)
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn decode_wav<R: std::io::Read>(reader: WavReader<R>) -> Result<SampleBuffer> {
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(TracklabError::UnsupportedFormat {
            format: "WAV file with zero channels".to_string(),
        });
    }

    let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    Ok(SampleBuffer::new(
        downmix(&interleaved, channels),
        spec.sample_rate,
    ))
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let read_err = |e: hound::Error| TracklabError::decode(format!("failed to read samples: {}", e), e);

    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(read_err),
        SampleFormat::Int => {
            let scale = match bits_per_sample {
                8 => 128.0,
                16 => 32768.0,
                24 => 8388608.0,
                32 => 2147483648.0,
                _ => {
                    return Err(TracklabError::UnsupportedFormat {
                        format: format!("{}-bit integer audio", bits_per_sample),
                    })
                }
            };
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(read_err)
        }
    }
}

fn decode_with_symphonia(path: &Path) -> Result<SampleBuffer> {
    let file = File::open(path).map_err(|e| TracklabError::FileNotFound {
        path: path.display().to_string(),
        source: Some(e),
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| TracklabError::decode(format!("unrecognised container: {}", e), e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| TracklabError::UnsupportedFormat {
            format: "no decodable audio track".to_string(),
        })?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| TracklabError::UnsupportedFormat {
            format: format!("codec not supported: {}", e),
        })?;

    let mut mono = Vec::new();
    let mut scratch: Option<InterleavedSamples<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(TracklabError::decode("error reading packet", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Corrupt frames are skipped, the rest of the stream is still usable
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(TracklabError::decode("decoder failure", e)),
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        let channels = spec.channels.count().max(1);

        let needs_alloc = scratch
            .as_ref()
            .map(|s| s.capacity() < decoded.capacity() * channels)
            .unwrap_or(true);
        if needs_alloc {
            scratch = Some(InterleavedSamples::<f32>::new(decoded.capacity() as u64, spec));
        }
        if let Some(buf) = scratch.as_mut() {
            buf.copy_interleaved_ref(decoded);
            mono.extend(downmix(buf.samples(), channels));
        }
    }

    let sample_rate = sample_rate.ok_or_else(|| TracklabError::Decode {
        reason: "unknown sample rate".to_string(),
        source: None,
    })?;

    Ok(SampleBuffer::new(mono, sample_rate))
}

/// Windowed-sinc rate conversion of a mono signal with rubato
///
/// The resampler's output delay is trimmed off the front so the result
/// stays aligned with the input.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let expected = (samples.len() as f64 * ratio).round() as usize;

    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len: RESAMPLE_SINC_LEN,
        f_cutoff: calculate_cutoff(RESAMPLE_SINC_LEN, window),
        interpolation: SincInterpolationType::Quadratic,
        oversampling_factor: 256,
        window,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.1, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| TracklabError::decode("cannot build resampler", e))?;

    let delay = resampler.output_delay();
    let mut wave_out = vec![vec![0.0f32; resampler.output_frames_max()]];
    let mut out = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);
    let mut remaining = samples;

    while remaining.len() >= resampler.input_frames_next() {
        let wave_in = [remaining];
        let (used, produced) = resampler
            .process_into_buffer(&wave_in[..], &mut wave_out[..], None)
            .map_err(|e| TracklabError::decode("resampling failed", e))?;
        remaining = &remaining[used..];
        out.extend_from_slice(&wave_out[0][..produced]);
    }

    let wave_in = [remaining];
    let (_, produced) = resampler
        .process_partial_into_buffer(Some(&wave_in[..]), &mut wave_out[..], None)
        .map_err(|e| TracklabError::decode("resampling failed", e))?;
    out.extend_from_slice(&wave_out[0][..produced]);

    // Flush the delay line with silence
    while out.len() < expected + delay {
        let (_, produced) = resampler
            .process_partial_into_buffer(None::<&[&[f32]]>, &mut wave_out[..], None)
            .map_err(|e| TracklabError::decode("resampling failed", e))?;
        if produced == 0 {
            break;
        }
        out.extend_from_slice(&wave_out[0][..produced]);
    }

    out.drain(..delay.min(out.len()));
    out.resize(expected, 0.0);
    Ok(out)
}

/// Average interleaved channels down to mono
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
