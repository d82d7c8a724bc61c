//! WAV output for reconstructed audio.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to write WAV {path}: {source}")]
pub struct AudioWriteError {
    pub path: PathBuf,
    pub source: hound::Error,
}

/// Write mono samples as 16-bit PCM.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), AudioWriteError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sample_rate.max(1),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let wrap = |source| AudioWriteError {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(wrap)?;
    for &sample in samples {
        let clamped = if sample.is_finite() {
            sample.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        writer
            .write_sample((clamped * i16::MAX as f32) as i16)
            .map_err(wrap)?;
    }
    writer.finalize().map_err(wrap)?;
    Ok(())
}
