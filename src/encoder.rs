//! Nearest-centroid tokenization of spectral frames.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::warn;

use crate::audio::RateFamily;
use crate::codebook::{BandLayout, Codebook, DimensionMismatchError};
use crate::dataset::CorpusScanner;
use crate::features;
use crate::spectral::{Frame, PhaseTransform};

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("band {band}: codebook has no centroids")]
    EmptyBand { band: usize },
    #[error(transparent)]
    Dimension(#[from] DimensionMismatchError),
}

/// Read-only tokenizer over a codebook's derived KeyVectors.
///
/// Safe to share across threads; encoding is embarrassingly parallel
/// across frames.
pub struct Encoder {
    layout: BandLayout,
    keys: Vec<Vec<Vec<f64>>>,
}

impl Encoder {
    /// Encoder using the codebook's own band layout.
    pub fn new(codebook: &Codebook) -> Self {
        let layout = codebook.layout();
        Self::with_layout(codebook, layout)
    }

    /// Encoder matching incoming audio of `layout`; any disagreement with
    /// the codebook surfaces as a dimension error on the first lookup.
    pub fn with_layout(codebook: &Codebook, layout: BandLayout) -> Self {
        let keys = (0..codebook.band_count())
            .map(|band| {
                codebook
                    .band(band)
                    .iter()
                    .map(|centroid| features::centroid_key_vector(&centroid.values))
                    .collect()
            })
            .collect();
        Self { layout, keys }
    }

    pub fn band_count(&self) -> usize {
        self.layout.band_count()
    }

    /// One token per band: the lowest-index centroid at minimum squared
    /// Euclidean KeyVector distance.
    pub fn encode_frame(&self, frame: &Frame) -> Result<Vec<u32>, EncodeError> {
        let mut tokens = Vec::with_capacity(self.layout.band_count());
        for band in 0..self.layout.band_count() {
            let centroids = self
                .keys
                .get(band)
                .filter(|keys| !keys.is_empty())
                .ok_or(EncodeError::EmptyBand { band })?;
            let (lo, hi) = self.layout.range(band);
            let key = features::band_key_vector(frame, lo, hi);
            let mut best = 0usize;
            let mut best_dist = f64::MAX;
            for (index, centroid_key) in centroids.iter().enumerate() {
                if centroid_key.len() != key.len() {
                    return Err(DimensionMismatchError {
                        band,
                        expected: key.len(),
                        actual: centroid_key.len(),
                    }
                    .into());
                }
                let dist = features::squared_distance(&key, centroid_key);
                // Strict comparison keeps the first-seen minimum on ties.
                if dist < best_dist {
                    best_dist = dist;
                    best = index;
                }
            }
            tokens.push(best as u32);
        }
        Ok(tokens)
    }

    /// Tokens of a frame sequence, band-major within each frame.
    pub fn encode_frames(&self, frames: &[Frame]) -> Result<Vec<u32>, EncodeError> {
        let mut tokens = Vec::with_capacity(frames.len() * self.layout.band_count());
        for frame in frames {
            tokens.extend(self.encode_frame(frame)?);
        }
        Ok(tokens)
    }
}

/// Encode every readable corpus file, producing the auxiliary
/// file-name → token-sequence map for downstream training use.
pub fn encode_corpus(
    files: &[PathBuf],
    encoder: &Encoder,
    family: RateFamily,
    transform: &PhaseTransform,
    workers: usize,
    cancel: &AtomicBool,
) -> BTreeMap<String, Vec<u32>> {
    let output: Mutex<BTreeMap<String, Vec<u32>>> = Mutex::new(BTreeMap::new());
    let scanner = CorpusScanner {
        files,
        family,
        transform,
        workers,
        cancel,
    };
    scanner.run(&|_, path, frames| {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        match encoder.encode_frames(frames) {
            Ok(tokens) => {
                let mut guard = output.lock().unwrap_or_else(PoisonError::into_inner);
                guard.insert(name, tokens);
            }
            Err(err) => warn!(file = %path.display(), "encoding failed: {err}"),
        }
    });
    output.into_inner().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Error)]
pub enum TokenMapError {
    #[error("failed to write token map {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize token map: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persist the corpus token map as JSON.
pub fn save_token_map(
    map: &BTreeMap<String, Vec<u32>>,
    path: &Path,
) -> Result<(), TokenMapError> {
    let data = serde_json::to_vec_pretty(map)?;
    std::fs::write(path, data).map_err(|source| TokenMapError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codebook::Centroid;

    fn codebook_with_levels(family: RateFamily, levels: &[f64]) -> Codebook {
        let layout = BandLayout::for_family(family);
        let bands = (0..layout.band_count())
            .map(|band| {
                levels
                    .iter()
                    .map(|&level| Centroid {
                        values: vec![level; layout.value_len(band)],
                    })
                    .collect()
            })
            .collect();
        Codebook::new(family, bands)
    }

    fn constant_frame(family: RateFamily, level: f64) -> Frame {
        Frame {
            bins: vec![[level, level, level]; family.num_bins()],
        }
    }

    #[test]
    fn encode_picks_the_nearest_centroid_per_band() {
        let family = RateFamily::Hz48000;
        let codebook = codebook_with_levels(family, &[-4.0, 0.0, 4.0]);
        let encoder = Encoder::new(&codebook);
        let tokens = encoder.encode_frame(&constant_frame(family, 0.1)).unwrap();
        assert_eq!(tokens, vec![1; 8]);
        let tokens = encoder.encode_frame(&constant_frame(family, 3.9)).unwrap();
        assert_eq!(tokens, vec![2; 8]);
    }

    #[test]
    fn ties_break_to_the_lowest_index() {
        let family = RateFamily::Hz48000;
        let codebook = codebook_with_levels(family, &[1.0, 1.0, 1.0]);
        let encoder = Encoder::new(&codebook);
        let tokens = encoder.encode_frame(&constant_frame(family, 2.5)).unwrap();
        assert_eq!(tokens, vec![0; 8]);
    }

    #[test]
    fn empty_band_is_an_error() {
        let family = RateFamily::Hz48000;
        let layout = BandLayout::for_family(family);
        let mut bands: Vec<Vec<Centroid>> = (0..layout.band_count())
            .map(|band| {
                vec![Centroid {
                    values: vec![0.0; layout.value_len(band)],
                }]
            })
            .collect();
        bands[3].clear();
        let codebook = Codebook::new(family, bands);
        let encoder = Encoder::new(&codebook);
        let err = encoder.encode_frame(&constant_frame(family, 0.0)).unwrap_err();
        assert!(matches!(err, EncodeError::EmptyBand { band: 3 }));
    }

    #[test]
    fn layout_mismatch_fails_on_the_first_lookup() {
        // Codebook built for 38-bin first bands, encoder configured for
        // the 41-bin layout.
        let built_family = RateFamily::Hz48000;
        let codebook = codebook_with_levels(built_family, &[0.0, 1.0]);
        let foreign = BandLayout::for_family(RateFamily::Hz44100);
        let encoder = Encoder::with_layout(&codebook, foreign);
        let frame = constant_frame(RateFamily::Hz44100, 0.0);
        let err = encoder.encode_frame(&frame).unwrap_err();
        match err {
            EncodeError::Dimension(err) => {
                assert_eq!(err.band, 0);
                assert_eq!(err.expected, 2 * 41);
                assert_eq!(err.actual, 2 * 38);
            }
            other => panic!("expected dimension mismatch, got {other}"),
        }
    }

    #[test]
    fn frame_sequence_tokens_are_band_major() {
        let family = RateFamily::Hz48000;
        let codebook = codebook_with_levels(family, &[-4.0, 0.0, 4.0]);
        let encoder = Encoder::new(&codebook);
        let frames = vec![
            constant_frame(family, -3.9),
            constant_frame(family, 3.9),
        ];
        let tokens = encoder.encode_frames(&frames).unwrap();
        assert_eq!(tokens.len(), 16);
        assert!(tokens[..8].iter().all(|&t| t == 0));
        assert!(tokens[8..].iter().all(|&t| t == 2));
    }
}
