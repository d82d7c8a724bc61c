//! Token-sequence decoding back into spectral frames.

use thiserror::Error;

use crate::codebook::Codebook;
use crate::spectral::Frame;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("token stream length {len} is not a multiple of the band count {bands}")]
    LengthNotMultipleOfBands { len: usize, bands: usize },
    #[error("band {band}: token {token} out of range for codebook of {size} centroids")]
    TokenOutOfRange {
        band: usize,
        token: u32,
        size: usize,
    },
}

/// Rebuild spectral frames from a token sequence.
///
/// Every token is range-checked against its band's codebook before any
/// lookup happens, so a bad sequence produces no partial output.
pub fn decode_tokens(codebook: &Codebook, tokens: &[u32]) -> Result<Vec<Frame>, DecodeError> {
    let bands = codebook.band_count();
    if bands == 0 {
        return match tokens.first() {
            None => Ok(Vec::new()),
            Some(&token) => Err(DecodeError::TokenOutOfRange {
                band: 0,
                token,
                size: 0,
            }),
        };
    }
    if tokens.len() % bands != 0 {
        return Err(DecodeError::LengthNotMultipleOfBands {
            len: tokens.len(),
            bands,
        });
    }
    for (index, &token) in tokens.iter().enumerate() {
        let band = index % bands;
        let size = codebook.band(band).len();
        if token as usize >= size {
            return Err(DecodeError::TokenOutOfRange { band, token, size });
        }
    }

    let layout = codebook.layout();
    let mut frames = Vec::with_capacity(tokens.len() / bands);
    for group in tokens.chunks_exact(bands) {
        let mut bins = Vec::with_capacity(layout.num_bins());
        for (band, &token) in group.iter().enumerate() {
            let centroid = &codebook.band(band)[token as usize];
            for triple in centroid.values.chunks_exact(3) {
                bins.push([triple[0], triple[1], triple[2]]);
            }
        }
        frames.push(Frame { bins });
    }
    Ok(frames)
}
