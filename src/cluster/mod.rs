//! Hierarchical codebook building.
//!
//! Each band runs independently through `ChunkClustering` (bounded k-means
//! per corpus chunk, centers pooled) and `MasterClustering` (re-clustering
//! the pooled centers down to the codebook size), followed by a medoid
//! refinement pass that replaces every cluster mean with the nearest real
//! observed frame. Chunk-level failures are skipped; master-level failures
//! are fatal for the band.

pub mod kmeans;
pub mod params;
pub mod progress;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use kmeans::{Cluster, IterationUpdate, KmeansError, PartitionOptions, partition};
pub use params::{ClusterParams, adapt};
pub use progress::ConvergenceProgress;

use crate::audio::RateFamily;
use crate::codebook::{BandLayout, Centroid, Codebook};
use crate::dataset::{self, CorpusScanner, DatasetOptions};
use crate::features;
use crate::spectral::PhaseTransform;

#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Quality knob feeding parameter adaptation (1 = smallest codebook).
    pub quality: u32,
    pub workers: usize,
    /// Frames below this key log-energy are discarded before clustering.
    pub silence_threshold: Option<f64>,
    /// Explicit chunk/cluster counts; adaptation runs when unset.
    pub params: Option<ClusterParams>,
    pub convergence_threshold: f64,
    pub max_iterations: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            quality: 1,
            workers: dataset::default_worker_count(),
            silence_threshold: None,
            params: None,
            convergence_threshold: 0.05,
            max_iterations: 64,
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("build cancelled")]
    Cancelled,
    #[error("band {band}: no chunk contributed any cluster centers")]
    EmptyMasterPool { band: usize },
    #[error("band {band}: master clustering failed: {source}")]
    MasterClustering { band: usize, source: KmeansError },
}

/// Build the full per-band codebook for a corpus.
pub fn build_codebook(
    files: &[PathBuf],
    family: RateFamily,
    config: &BuildConfig,
    cancel: &AtomicBool,
) -> Result<Codebook, BuildError> {
    let layout = BandLayout::for_family(family);
    let transform = PhaseTransform::for_family(family);
    let params = config
        .params
        .unwrap_or_else(|| params::adapt(files.len(), config.quality));
    info!(
        "building codebook: {} files, {} bands, chunks={} kmeanz={} masterkmeanz={}",
        files.len(),
        layout.band_count(),
        params.chunks,
        params.kmeanz,
        params.masterkmeanz
    );

    let chunked = dataset::chunk_files(files, params.chunks);
    let dataset_options = DatasetOptions {
        workers: config.workers,
        silence_threshold: config.silence_threshold,
    };
    let solver_options = PartitionOptions {
        threshold: config.convergence_threshold,
        max_iterations: config.max_iterations,
        threads: config.workers,
    };

    let mut rng = rand::rng();
    let mut bands = Vec::with_capacity(layout.band_count());
    for band in 0..layout.band_count() {
        let pool = cluster_chunks(
            family,
            &transform,
            &layout,
            band,
            &chunked,
            &params,
            &dataset_options,
            &solver_options,
            cancel,
            &mut rng,
        )?;
        let clusters = cluster_master(band, pool, &params, &solver_options, &mut rng)?;
        let centers: Vec<Vec<f64>> = clusters.into_iter().map(|c| c.center).collect();

        let centroids = refine_medoids(
            files,
            family,
            &transform,
            &layout,
            band,
            &centers,
            &dataset_options,
            cancel,
        );
        if cancel.load(Ordering::Relaxed) {
            return Err(BuildError::Cancelled);
        }
        info!("band {band}: {} centroids", centroids.len());
        bands.push(centroids);
    }
    Ok(Codebook::new(family, bands))
}

#[allow(clippy::too_many_arguments)]
fn cluster_chunks(
    family: RateFamily,
    transform: &PhaseTransform,
    layout: &BandLayout,
    band: usize,
    chunked: &[Vec<PathBuf>],
    params: &ClusterParams,
    dataset_options: &DatasetOptions,
    solver_options: &PartitionOptions,
    cancel: &AtomicBool,
    rng: &mut impl rand::Rng,
) -> Result<Vec<Vec<f64>>, BuildError> {
    let mut pool: Vec<Vec<f64>> = Vec::new();
    for (chunk_index, chunk) in chunked.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            return Err(BuildError::Cancelled);
        }
        let mut vectors = dataset::collect_band_vectors(
            chunk,
            family,
            transform,
            layout,
            band,
            dataset_options,
            cancel,
        );
        if let Err(err) = dataset::ensure_minimum(&mut vectors, params.kmeanz, rng) {
            warn!("band {band} chunk {chunk_index}: {err}; skipping chunk");
            continue;
        }
        vectors.shuffle(rng);
        let mut bar = ConvergenceProgress::new(solver_options.threshold);
        match partition(&vectors, params.kmeanz, solver_options, |update| {
            let percent = bar.observe(update.movement);
            debug!(
                "band {band} chunk {chunk_index} iteration {}: movement {:.5} ({percent:.0}%)",
                update.iteration, update.movement
            );
        }) {
            Ok(clusters) => pool.extend(clusters.into_iter().map(|c| c.center)),
            Err(err) => {
                warn!("band {band} chunk {chunk_index}: clustering failed: {err}; skipping chunk");
            }
        }
    }
    Ok(pool)
}

fn cluster_master(
    band: usize,
    mut pool: Vec<Vec<f64>>,
    params: &ClusterParams,
    solver_options: &PartitionOptions,
    rng: &mut impl rand::Rng,
) -> Result<Vec<Cluster>, BuildError> {
    if pool.is_empty() {
        return Err(BuildError::EmptyMasterPool { band });
    }
    pool.shuffle(rng);
    let mut bar = ConvergenceProgress::new(solver_options.threshold);
    let mut clusters = partition(&pool, params.masterkmeanz, solver_options, |update| {
        let percent = bar.observe(update.movement);
        debug!(
            "band {band} master iteration {}: movement {:.5} ({percent:.0}%)",
            update.iteration, update.movement
        );
    })
    .map_err(|source| BuildError::MasterClustering { band, source })?;
    // Largest clusters first keeps the persisted ordering reproducible.
    clusters.sort_by(|a, b| b.members.len().cmp(&a.members.len()));
    Ok(clusters)
}

/// For each final center, the nearest frame seen so far.
#[derive(Clone)]
struct BestMatch {
    distance: f64,
    values: Option<Vec<f64>>,
}

/// Re-scan the corpus once and snap every cluster center to the real
/// observed frame nearest it. Mean centroids can land outside the space
/// of real audio; the medoid preserves naturalness.
#[allow(clippy::too_many_arguments)]
fn refine_medoids(
    files: &[PathBuf],
    family: RateFamily,
    transform: &PhaseTransform,
    layout: &BandLayout,
    band: usize,
    centers: &[Vec<f64>],
    options: &DatasetOptions,
    cancel: &AtomicBool,
) -> Vec<Centroid> {
    let (lo, hi) = layout.range(band);
    let best: Mutex<Vec<BestMatch>> = Mutex::new(vec![
        BestMatch {
            distance: f64::MAX,
            values: None,
        };
        centers.len()
    ]);

    let scanner = CorpusScanner {
        files,
        family,
        transform,
        workers: options.workers,
        cancel,
    };
    scanner.run(&|_, _, frames| {
        let mut keys = Vec::with_capacity(frames.len());
        for frame in frames {
            let key = features::band_key_vector(frame, lo, hi);
            if let Some(threshold) = options.silence_threshold {
                if features::log_energy(&key) < threshold {
                    continue;
                }
            }
            keys.push((key, frame));
        }
        let locals = best_frame_per_center(keys.iter().map(|(key, _)| key.as_slice()), centers);

        // One lock acquisition per file.
        let mut guard = best.lock().unwrap_or_else(PoisonError::into_inner);
        for (slot, local) in guard.iter_mut().zip(locals) {
            if let Some((frame_index, distance)) = local {
                if distance < slot.distance {
                    slot.distance = distance;
                    let (_, frame) = &keys[frame_index];
                    slot.values = Some(frame.band(lo, hi).iter().flatten().copied().collect());
                }
            }
        }
    });

    best.into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .into_iter()
        .enumerate()
        .filter_map(|(index, slot)| match slot.values {
            Some(values) => Some(Centroid { values }),
            None => {
                warn!("band {band}: cluster {index} matched no corpus frame; dropping it");
                None
            }
        })
        .collect()
}

/// For every center, the position and squared distance of the nearest key
/// in this batch. Considering every center per key (not only the key's
/// own nearest) guarantees each cluster ends up with a medoid.
fn best_frame_per_center<'a>(
    keys: impl Iterator<Item = &'a [f64]>,
    centers: &[Vec<f64>],
) -> Vec<Option<(usize, f64)>> {
    let mut best: Vec<Option<(usize, f64)>> = vec![None; centers.len()];
    for (index, key) in keys.enumerate() {
        for (slot, center) in best.iter_mut().zip(centers) {
            let distance = features::squared_distance(key, center);
            if slot.is_none_or(|(_, seen)| distance < seen) {
                *slot = Some((index, distance));
            }
        }
    }
    best
}
