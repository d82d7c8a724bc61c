//! Dataset building: bounded parallel corpus scans producing per-band
//! KeyVector collections.
//!
//! Workers pull file indices from a shared cursor, run the full
//! decode → normalize → transform pipeline, and append one batch per file
//! to a mutex-guarded accumulator. Per-file failures are logged and the
//! file is skipped; they never abort the scan.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{debug, warn};

use crate::audio::{self, RateFamily};
use crate::codebook::BandLayout;
use crate::features;
use crate::spectral::{Frame, PhaseTransform};

/// A chunk produced no usable frames at all. Chunks that are merely
/// smaller than the cluster count are repaired by cyclic duplication
/// instead.
#[derive(Debug, Error)]
#[error("no usable frames were collected for clustering")]
pub struct InsufficientDataError;

#[derive(Debug, Clone)]
pub struct DatasetOptions {
    pub workers: usize,
    /// Frames whose key log-energy falls below this are discarded.
    pub silence_threshold: Option<f64>,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            silence_threshold: None,
        }
    }
}

/// One worker per core, leaving a core for the caller.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1).max(1))
        .unwrap_or(1)
}

/// Round-robin partition of the corpus into `chunks` file lists; bounds
/// peak dataset memory to roughly `corpus_size / chunks`.
pub fn chunk_files(files: &[PathBuf], chunks: usize) -> Vec<Vec<PathBuf>> {
    let chunks = chunks.max(1);
    let mut out: Vec<Vec<PathBuf>> = vec![Vec::new(); chunks];
    for (index, file) in files.iter().enumerate() {
        out[index % chunks].push(file.clone());
    }
    out
}

/// Parallel scan driving a visitor over every readable file's frames.
pub(crate) struct CorpusScanner<'a> {
    pub files: &'a [PathBuf],
    pub family: RateFamily,
    pub transform: &'a PhaseTransform,
    pub workers: usize,
    pub cancel: &'a AtomicBool,
}

impl CorpusScanner<'_> {
    pub(crate) fn run(&self, visit: &(dyn Fn(usize, &Path, &[Frame]) + Sync)) {
        if self.files.is_empty() {
            return;
        }
        let cursor = AtomicUsize::new(0);
        let processed = AtomicU64::new(0);
        let workers = self.workers.clamp(1, self.files.len());
        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        if self.cancel.load(Ordering::Relaxed) {
                            break;
                        }
                        let index = cursor.fetch_add(1, Ordering::Relaxed);
                        if index >= self.files.len() {
                            break;
                        }
                        let path = &self.files[index];
                        match load_frames(path, self.family, self.transform) {
                            Ok(frames) => visit(index, path, &frames),
                            Err(reason) => {
                                warn!(file = %path.display(), "skipping file: {reason}");
                            }
                        }
                        let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                        debug!("corpus scan {done}/{}", self.files.len());
                    }
                });
            }
        });
    }
}

fn load_frames(
    path: &Path,
    family: RateFamily,
    transform: &PhaseTransform,
) -> Result<Vec<Frame>, String> {
    let decoded = audio::load_audio(path).map_err(|err| err.reason)?;
    let normalized =
        audio::normalize_rate(&decoded.samples, decoded.sample_rate).map_err(|err| err.to_string())?;
    if normalized.family != family {
        return Err(format!(
            "rate family mismatch: file normalizes to {} Hz, build expects {} Hz",
            normalized.family.canonical_rate(),
            family.canonical_rate()
        ));
    }
    Ok(transform.to_spectral(&normalized.samples))
}

/// Collect the KeyVectors of one band across every non-discarded frame of
/// the given files.
pub fn collect_band_vectors(
    files: &[PathBuf],
    family: RateFamily,
    transform: &PhaseTransform,
    layout: &BandLayout,
    band: usize,
    options: &DatasetOptions,
    cancel: &AtomicBool,
) -> Vec<Vec<f64>> {
    let (lo, hi) = layout.range(band);
    let accumulator: Mutex<Vec<Vec<f64>>> = Mutex::new(Vec::new());
    let discarded = AtomicU64::new(0);
    let scanner = CorpusScanner {
        files,
        family,
        transform,
        workers: options.workers,
        cancel,
    };
    scanner.run(&|_, _, frames| {
        let mut batch = Vec::with_capacity(frames.len());
        for frame in frames {
            let key = features::band_key_vector(frame, lo, hi);
            if let Some(threshold) = options.silence_threshold {
                if features::log_energy(&key) < threshold {
                    discarded.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            }
            batch.push(key);
        }
        // One lock acquisition per file, not per frame.
        let mut guard = accumulator
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.extend(batch);
    });
    let skipped = discarded.load(Ordering::Relaxed);
    if skipped > 0 {
        debug!("band {band}: discarded {skipped} silent frames");
    }
    accumulator
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Grow a degenerate dataset to at least `minimum` entries by shuffling
/// and cyclically duplicating it. A safety valve for tiny chunks, not a
/// quality optimization.
pub fn ensure_minimum<R: Rng + ?Sized>(
    vectors: &mut Vec<Vec<f64>>,
    minimum: usize,
    rng: &mut R,
) -> Result<(), InsufficientDataError> {
    if vectors.is_empty() {
        return Err(InsufficientDataError);
    }
    if vectors.len() >= minimum {
        return Ok(());
    }
    vectors.shuffle(rng);
    let original = vectors.len();
    let mut index = 0usize;
    while vectors.len() < minimum {
        vectors.push(vectors[index % original].clone());
        index += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f32::consts::PI;
    use tempfile::tempdir;

    #[test]
    fn chunking_is_round_robin() {
        let files: Vec<PathBuf> = (0..5).map(|i| PathBuf::from(format!("{i}.wav"))).collect();
        let chunks = chunk_files(&files, 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], vec![files[0].clone(), files[2].clone(), files[4].clone()]);
        assert_eq!(chunks[1], vec![files[1].clone(), files[3].clone()]);
    }

    #[test]
    fn chunking_tolerates_more_chunks_than_files() {
        let files = vec![PathBuf::from("only.wav")];
        let chunks = chunk_files(&files, 4);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks.iter().filter(|chunk| chunk.is_empty()).count(), 3);
    }

    #[test]
    fn ensure_minimum_duplicates_cyclically() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut vectors = vec![vec![1.0], vec![2.0], vec![3.0]];
        ensure_minimum(&mut vectors, 8, &mut rng).unwrap();
        assert_eq!(vectors.len(), 8);
        // Every entry is one of the originals, each duplicated at most
        // once more than the others.
        let mut counts = [0usize; 3];
        for vector in &vectors {
            counts[vector[0] as usize - 1] += 1;
        }
        assert_eq!(counts.iter().sum::<usize>(), 8);
        assert!(counts.iter().all(|&c| (2..=3).contains(&c)));
    }

    #[test]
    fn ensure_minimum_rejects_an_empty_dataset() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut vectors: Vec<Vec<f64>> = Vec::new();
        assert!(ensure_minimum(&mut vectors, 4, &mut rng).is_err());
    }

    fn write_sine_wav(path: &Path, rate: u32, seconds: f32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let total = (rate as f32 * seconds) as usize;
        for i in 0..total {
            let sample = (2.0 * PI * 440.0 * i as f32 / rate as f32).sin() * 0.4;
            writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn scan_collects_vectors_and_skips_unreadable_files() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.wav");
        write_sine_wav(&good, 48_000, 0.1);
        let files = vec![good, dir.path().join("missing.wav")];

        let family = RateFamily::Hz48000;
        let transform = PhaseTransform::for_family(family);
        let layout = BandLayout::for_family(family);
        let cancel = AtomicBool::new(false);
        let options = DatasetOptions {
            workers: 2,
            silence_threshold: None,
        };
        let vectors =
            collect_band_vectors(&files, family, &transform, &layout, 0, &options, &cancel);
        assert!(!vectors.is_empty());
        for vector in &vectors {
            assert_eq!(vector.len(), layout.key_len(0));
        }
    }

    #[test]
    fn cancelled_scan_collects_nothing() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.wav");
        write_sine_wav(&good, 48_000, 0.1);

        let family = RateFamily::Hz48000;
        let transform = PhaseTransform::for_family(family);
        let layout = BandLayout::for_family(family);
        let cancel = AtomicBool::new(true);
        let options = DatasetOptions {
            workers: 1,
            silence_threshold: None,
        };
        let vectors =
            collect_band_vectors(&[good], family, &transform, &layout, 0, &options, &cancel);
        assert!(vectors.is_empty());
    }
}
