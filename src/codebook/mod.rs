//! Per-band centroid codebook and its band layout.

pub mod store;

use thiserror::Error;

use crate::audio::RateFamily;

pub use store::{StoreError, load_codebook, load_codebook_auto, save_codebook};

/// Centroid/data dimensions disagree; the codebook and the caller's band
/// layout are incompatible and there is no safe recovery.
#[derive(Debug, Error)]
#[error("band {band}: expected {expected} values, found {actual}")]
pub struct DimensionMismatchError {
    pub band: usize,
    pub expected: usize,
    pub actual: usize,
}

/// Fixed partition of a frame's bins into contiguous bands.
///
/// Boundaries are fixed per canonical sample rate and must be identical
/// between codebook build time and encode/decode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandLayout {
    boundaries: Vec<usize>,
}

impl BandLayout {
    /// The codec's standard 8-band layout for a rate family.
    pub fn for_family(family: RateFamily) -> Self {
        let boundaries = match family {
            RateFamily::Hz48000 => vec![0, 38, 88, 134, 184, 234, 367, 501, 768],
            RateFamily::Hz44100 => vec![0, 41, 95, 145, 200, 254, 400, 545, 836],
        };
        Self { boundaries }
    }

    pub fn band_count(&self) -> usize {
        self.boundaries.len().saturating_sub(1)
    }

    /// Bin range `[lo, hi)` of one band.
    pub fn range(&self, band: usize) -> (usize, usize) {
        (self.boundaries[band], self.boundaries[band + 1])
    }

    /// Total bins the layout spans; must match the transform's bin count.
    pub fn num_bins(&self) -> usize {
        self.boundaries.last().copied().unwrap_or(0)
    }

    /// KeyVector length of one band: two values per bin.
    pub fn key_len(&self, band: usize) -> usize {
        let (lo, hi) = self.range(band);
        2 * (hi - lo)
    }

    /// Stored centroid length of one band: three values per bin.
    pub fn value_len(&self, band: usize) -> usize {
        let (lo, hi) = self.range(band);
        3 * (hi - lo)
    }
}

/// One codebook entry: the full-precision triples of the real observed
/// frame nearest the final cluster mean (the medoid, not the mean itself).
#[derive(Debug, Clone, PartialEq)]
pub struct Centroid {
    pub values: Vec<f64>,
}

/// The complete per-band centroid set. Built once per corpus and rate
/// family; read-only afterwards, freely shared across encoder/decoder
/// calls.
#[derive(Debug, Clone)]
pub struct Codebook {
    family: RateFamily,
    bands: Vec<Vec<Centroid>>,
}

impl Codebook {
    pub fn new(family: RateFamily, bands: Vec<Vec<Centroid>>) -> Self {
        Self { family, bands }
    }

    pub fn family(&self) -> RateFamily {
        self.family
    }

    pub fn sample_rate(&self) -> u32 {
        self.family.canonical_rate()
    }

    pub fn layout(&self) -> BandLayout {
        BandLayout::for_family(self.family)
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn band(&self, band: usize) -> &[Centroid] {
        &self.bands[band]
    }

    /// Check every centroid against the caller's expected layout.
    pub fn validate_layout(&self, layout: &BandLayout) -> Result<(), DimensionMismatchError> {
        if self.bands.len() != layout.band_count() {
            return Err(DimensionMismatchError {
                band: 0,
                expected: layout.band_count(),
                actual: self.bands.len(),
            });
        }
        for (band, centroids) in self.bands.iter().enumerate() {
            let expected = layout.value_len(band);
            for centroid in centroids {
                if centroid.values.len() != expected {
                    return Err(DimensionMismatchError {
                        band,
                        expected,
                        actual: centroid.values.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_layouts_have_eight_bands_covering_all_bins() {
        for family in [RateFamily::Hz48000, RateFamily::Hz44100] {
            let layout = BandLayout::for_family(family);
            assert_eq!(layout.band_count(), 8);
            assert_eq!(layout.num_bins(), family.num_bins());
            let mut covered = 0;
            for band in 0..layout.band_count() {
                let (lo, hi) = layout.range(band);
                assert_eq!(lo, covered);
                assert!(hi > lo);
                covered = hi;
            }
            assert_eq!(covered, family.num_bins());
        }
    }

    #[test]
    fn key_and_value_lengths_follow_bin_ranges() {
        let layout = BandLayout::for_family(RateFamily::Hz48000);
        assert_eq!(layout.key_len(0), 2 * 38);
        assert_eq!(layout.value_len(0), 3 * 38);
        assert_eq!(layout.key_len(7), 2 * (768 - 501));
    }

    #[test]
    fn validate_layout_accepts_matching_centroids() {
        let layout = BandLayout::for_family(RateFamily::Hz48000);
        let bands = (0..layout.band_count())
            .map(|band| {
                vec![Centroid {
                    values: vec![0.0; layout.value_len(band)],
                }]
            })
            .collect();
        let codebook = Codebook::new(RateFamily::Hz48000, bands);
        assert!(codebook.validate_layout(&layout).is_ok());
    }

    #[test]
    fn validate_layout_rejects_foreign_band_widths() {
        let built = BandLayout::for_family(RateFamily::Hz48000);
        let bands = (0..built.band_count())
            .map(|band| {
                vec![Centroid {
                    values: vec![0.0; built.value_len(band)],
                }]
            })
            .collect();
        let codebook = Codebook::new(RateFamily::Hz48000, bands);

        let foreign = BandLayout::for_family(RateFamily::Hz44100);
        let err = codebook.validate_layout(&foreign).unwrap_err();
        assert_eq!(err.band, 0);
        assert_eq!(err.expected, 3 * 41);
        assert_eq!(err.actual, 3 * 38);
    }
}
