//! Audio loading, sample-rate normalization, and WAV output.

pub mod decode;
pub mod normalize;
mod wav;

pub use decode::{AudioLoadError, DecodedAudio, load_audio};
pub use normalize::{NormalizedAudio, RateError, RateFamily, normalize_rate};
pub use wav::{AudioWriteError, write_wav};
