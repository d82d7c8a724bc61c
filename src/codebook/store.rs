//! Codebook persistence at fixed decimal precision.
//!
//! Full `f64` precision is kept in memory throughout the build; rounding
//! happens only at the serialization boundary, which shrinks the artifact
//! and keeps distance comparisons reproducible across save/load cycles.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{BandLayout, Centroid, Codebook, DimensionMismatchError};
use crate::audio::RateFamily;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read codebook {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write codebook {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse codebook {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("codebook {path} has unsupported format version {version}")]
    UnsupportedVersion { path: PathBuf, version: u32 },
    #[error("codebook {path} was built for unsupported sample rate {rate}")]
    UnsupportedRate { path: PathBuf, rate: u32 },
    #[error(transparent)]
    Dimension(#[from] DimensionMismatchError),
}

#[derive(Serialize, Deserialize)]
struct CodebookFile {
    format_version: u32,
    sample_rate: u32,
    bands: Vec<Vec<Vec<f64>>>,
}

/// Persist a codebook, rounding every value to `digits` decimals.
pub fn save_codebook(codebook: &Codebook, path: &Path, digits: u32) -> Result<(), StoreError> {
    let file = CodebookFile {
        format_version: FORMAT_VERSION,
        sample_rate: codebook.sample_rate(),
        bands: (0..codebook.band_count())
            .map(|band| {
                codebook
                    .band(band)
                    .iter()
                    .map(|centroid| {
                        centroid
                            .values
                            .iter()
                            .map(|&v| round_to_digits(v, digits))
                            .collect()
                    })
                    .collect()
            })
            .collect(),
    };
    let data = serde_json::to_vec(&file).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, data).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a codebook, deriving the expected layout from its recorded
/// sample rate. Used by the tools; library callers with their own layout
/// expectations go through [`load_codebook`].
pub fn load_codebook_auto(path: &Path) -> Result<Codebook, StoreError> {
    let codebook = read_codebook(path)?;
    codebook.validate_layout(&codebook.layout())?;
    Ok(codebook)
}

/// Load a codebook and validate it against the caller's expected layout.
pub fn load_codebook(path: &Path, expected: &BandLayout) -> Result<Codebook, StoreError> {
    let codebook = read_codebook(path)?;
    codebook.validate_layout(expected)?;
    Ok(codebook)
}

fn read_codebook(path: &Path) -> Result<Codebook, StoreError> {
    let data = fs::read(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: CodebookFile = serde_json::from_slice(&data).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    if file.format_version != FORMAT_VERSION {
        return Err(StoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            version: file.format_version,
        });
    }
    let family =
        RateFamily::detect(file.sample_rate).ok_or_else(|| StoreError::UnsupportedRate {
            path: path.to_path_buf(),
            rate: file.sample_rate,
        })?;
    let bands = file
        .bands
        .into_iter()
        .map(|centroids| {
            centroids
                .into_iter()
                .map(|values| Centroid { values })
                .collect()
        })
        .collect();
    Ok(Codebook::new(family, bands))
}

pub(crate) fn round_to_digits(value: f64, digits: u32) -> f64 {
    let scale = 10_f64.powi(digits.min(15) as i32);
    (value * scale).round() / scale
}
