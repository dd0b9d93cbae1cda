//! Audio Engine Module
//!
//! Buffer type and file I/O:
//! - Mono sample buffers
//! - Decoding (WAV, MP3 and other symphonia containers)
//! - Export to WAV or MP3 through an external encoder

pub mod buffer;
pub mod encoder;
pub mod io;

pub use buffer::SampleBuffer;
pub use io::{
    decode, decode_at_rate, encode, generate_test_tone, write_wav, ExportFormat,
    WAV_EXPORT_BIT_DEPTH,
};
