//! Sample-rate normalization via integer zero-insertion upsampling.
//!
//! Irregular corpus rates are rationalized to the canonical rate of their
//! family before the spectral transform runs. Zero-insertion is cheap and
//! lossy: it mirrors spectral images above the original rate, which is
//! acceptable because only the low bands carry codec-relevant energy.

use thiserror::Error;

/// Canonical sample-rate family a source file belongs to.
///
/// Band layouts and spectral bin counts are fixed per family and must match
/// between codebook build time and encode/decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateFamily {
    /// 8000/16000/48000 Hz sources, normalized to 48000 Hz.
    Hz48000,
    /// 11025/22050/44100 Hz sources, normalized to 44100 Hz.
    Hz44100,
}

impl RateFamily {
    /// Resolve the family for a detected sample rate, if supported.
    pub fn detect(rate: u32) -> Option<Self> {
        match rate {
            8_000 | 16_000 | 48_000 => Some(RateFamily::Hz48000),
            11_025 | 22_050 | 44_100 => Some(RateFamily::Hz44100),
            _ => None,
        }
    }

    /// The rate every member of this family is upsampled to.
    pub fn canonical_rate(self) -> u32 {
        match self {
            RateFamily::Hz48000 => 48_000,
            RateFamily::Hz44100 => 44_100,
        }
    }

    /// Spectral bins retained per frame for this family.
    pub fn num_bins(self) -> usize {
        match self {
            RateFamily::Hz48000 => 768,
            RateFamily::Hz44100 => 836,
        }
    }
}

#[derive(Debug, Error)]
pub enum RateError {
    /// The detected rate belongs to no supported family. Fatal for the
    /// file, never for the batch.
    #[error("unsupported sample rate {rate} Hz")]
    Unsupported { rate: u32 },
}

/// Mono samples upsampled to their family's canonical rate.
#[derive(Debug)]
pub struct NormalizedAudio {
    pub samples: Vec<f32>,
    pub family: RateFamily,
}

/// Zeros inserted after every real sample for a supported rate.
pub fn zero_insertion_count(rate: u32) -> Result<usize, RateError> {
    let family = RateFamily::detect(rate).ok_or(RateError::Unsupported { rate })?;
    Ok((family.canonical_rate() / rate) as usize - 1)
}

/// Upsample to the canonical rate of the detected family.
pub fn normalize_rate(samples: &[f32], rate: u32) -> Result<NormalizedAudio, RateError> {
    let family = RateFamily::detect(rate).ok_or(RateError::Unsupported { rate })?;
    let zeros = zero_insertion_count(rate)?;
    Ok(NormalizedAudio {
        samples: zero_stuff(samples, zeros),
        family,
    })
}

/// Insert `zeros` zero-valued samples after every input sample.
pub fn zero_stuff(samples: &[f32], zeros: usize) -> Vec<f32> {
    if zeros == 0 {
        return samples.to_vec();
    }
    let mut out = Vec::with_capacity(samples.len() * (zeros + 1));
    for &sample in samples {
        out.push(sample);
        out.extend(std::iter::repeat_n(0.0, zeros));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_cover_supported_rates() {
        for rate in [8_000, 16_000, 48_000] {
            assert_eq!(RateFamily::detect(rate), Some(RateFamily::Hz48000));
        }
        for rate in [11_025, 22_050, 44_100] {
            assert_eq!(RateFamily::detect(rate), Some(RateFamily::Hz44100));
        }
        assert_eq!(RateFamily::detect(96_000), None);
    }

    #[test]
    fn zero_counts_match_rate_ratio() {
        assert_eq!(zero_insertion_count(8_000).unwrap(), 5);
        assert_eq!(zero_insertion_count(16_000).unwrap(), 2);
        assert_eq!(zero_insertion_count(48_000).unwrap(), 0);
        assert_eq!(zero_insertion_count(11_025).unwrap(), 3);
        assert_eq!(zero_insertion_count(22_050).unwrap(), 1);
        assert_eq!(zero_insertion_count(44_100).unwrap(), 0);
    }

    #[test]
    fn unsupported_rate_is_rejected() {
        let err = normalize_rate(&[0.0], 32_000).unwrap_err();
        assert!(matches!(err, RateError::Unsupported { rate: 32_000 }));
    }

    #[test]
    fn zero_stuffing_inserts_exactly_n_zeros_between_samples() {
        let input = vec![1.0_f32, 2.0, 3.0];
        let out = zero_stuff(&input, 2);
        assert_eq!(out.len(), input.len() * 3);
        assert_eq!(out, vec![1.0, 0.0, 0.0, 2.0, 0.0, 0.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn normalize_preserves_length_ratio() {
        let input = vec![0.5_f32; 100];
        let normalized = normalize_rate(&input, 8_000).unwrap();
        assert_eq!(normalized.family, RateFamily::Hz48000);
        assert_eq!(normalized.samples.len(), input.len() * 6);
        for (i, &sample) in normalized.samples.iter().enumerate() {
            if i % 6 == 0 {
                assert_eq!(sample, 0.5);
            } else {
                assert_eq!(sample, 0.0);
            }
        }
    }
}
