//! KeyVector projection of spectral frames.
//!
//! A KeyVector is the distance-only view of one band of a frame: per bin
//! `(a, b, c)` it carries the energy-like pair
//! `sqrt(exp2(b)^2 + exp2(c)^2)` and `sqrt(exp2(a)^2 + exp2(b)^2)`, which
//! is robust to the transform's phase convention. The same projection
//! applied to stored centroid triples yields the centroid's matching key.

use crate::spectral::Frame;

/// KeyVector of one band of a frame; length `2 * (hi - lo)` when the frame
/// covers the full range.
pub fn band_key_vector(frame: &Frame, lo: usize, hi: usize) -> Vec<f64> {
    let mut key = Vec::with_capacity(2 * hi.saturating_sub(lo));
    for &[a, b, c] in frame.band(lo, hi) {
        let (val1, val2) = key_pair(a, b, c);
        key.push(val1);
        key.push(val2);
    }
    key
}

/// KeyVector-equivalent of a centroid's flat triple sequence.
pub fn centroid_key_vector(values: &[f64]) -> Vec<f64> {
    let mut key = Vec::with_capacity(values.len() / 3 * 2);
    for triple in values.chunks_exact(3) {
        let (val1, val2) = key_pair(triple[0], triple[1], triple[2]);
        key.push(val1);
        key.push(val2);
    }
    key
}

fn key_pair(a: f64, b: f64, c: f64) -> (f64, f64) {
    let ea = a.exp2();
    let eb = b.exp2();
    let ec = c.exp2();
    ((eb * eb + ec * ec).sqrt(), (ea * ea + eb * eb).sqrt())
}

/// Squared Euclidean distance between two equal-length vectors.
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

/// Log-energy of a key vector, for silence discarding.
pub fn log_energy(key: &[f64]) -> f64 {
    let energy: f64 = key.iter().map(|v| v * v).sum();
    (energy + 1e-10).ln()
}
