//! MP3 export through an external encoder
//!
//! The buffer is first written to a lossless intermediate WAV next to the
//! output, the encoder process converts it, and the intermediate is removed.
//! The intermediate is owned by `Intermediate`, whose `Drop` deletes the
//! file, so it never outlives the `encode_mp3` call.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, warn};
use uuid::Uuid;

use crate::config::EncoderConfig;
use crate::engine::buffer::SampleBuffer;
use crate::engine::io::{write_wav, WAV_EXPORT_BIT_DEPTH};
use crate::error::{Result, TracklabError};

/// Temporary WAV file scoped to one encode call
struct Intermediate {
    path: PathBuf,
}

impl Intermediate {
    /// Run-unique path derived from the output path
    fn for_output(output: &Path) -> Self {
        let stem = output
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("export");
        let name = format!("{}.{}.tmp.wav", stem, Uuid::new_v4().simple());
        Self {
            path: output.with_file_name(name),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Intermediate {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed intermediate {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove intermediate {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Encode a buffer to MP3 at the configured constant bitrate
///
/// # Errors
/// * `EncoderUnavailable` - If the encoder program cannot be launched
/// * `Encode` - If writing the intermediate fails or the encoder exits non-zero
pub fn encode_mp3(buffer: &SampleBuffer, output: &Path, config: &EncoderConfig) -> Result<()> {
    let intermediate = Intermediate::for_output(output);
    write_wav(buffer, intermediate.path(), WAV_EXPORT_BIT_DEPTH)?;

    let bitrate = format!("{}k", config.bitrate_kbps);
    debug!(
        "Encoding {} -> {} with {} at {}",
        intermediate.path().display(),
        output.display(),
        config.program,
        bitrate
    );

    let result = Command::new(&config.program)
        .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y", "-i"])
        .arg(intermediate.path())
        .args(["-codec:a", "libmp3lame", "-b:a", &bitrate, "-f", "mp3"])
        .arg(output)
        .output()
        .map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                TracklabError::EncoderUnavailable {
                    program: config.program.clone(),
                    source,
                }
            } else {
                TracklabError::encode(format!("failed to launch {}", config.program), source)
            }
        })?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(TracklabError::Encode {
            reason: format!(
                "{} exited with {}: {}",
                config.program,
                result.status,
                stderr.trim()
            ),
            source: None,
        });
    }

    Ok(())
}
