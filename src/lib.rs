//! Spectral codebook audio codec.
//!
//! Builds a discrete per-band codebook from an audio corpus with two-level
//! (chunked + master) k-means, encodes audio into short integer token
//! sequences via nearest-centroid search, and reconstructs spectral frames
//! from tokens for inverse synthesis.

/// Audio loading, sample-rate normalization, and WAV output.
pub mod audio;
/// Hierarchical clustering engine and codebook building.
pub mod cluster;
/// Per-band centroid codebook and its persistence.
pub mod codebook;
/// Parallel corpus scanning and dataset assembly.
pub mod dataset;
/// Token-sequence decoding back into spectral frames.
pub mod decoder;
/// Nearest-centroid tokenization.
pub mod encoder;
/// KeyVector projection of spectral frames.
pub mod features;
/// Tracing subscriber setup.
pub mod logging;
/// Short-time phase transform between samples and frames.
pub mod spectral;

pub use audio::{AudioLoadError, RateError, RateFamily};
pub use cluster::{BuildConfig, BuildError, ClusterParams, build_codebook};
pub use codebook::{BandLayout, Centroid, Codebook, DimensionMismatchError, StoreError};
pub use dataset::InsufficientDataError;
pub use decoder::{DecodeError, decode_tokens};
pub use encoder::{EncodeError, Encoder, encode_corpus};
pub use spectral::{Frame, PhaseTransform};
