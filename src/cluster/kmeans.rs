//! Lloyd-iteration k-means solver.
//!
//! The assignment step fans out over a bounded pool of scoped threads;
//! the caller observes convergence through a per-iteration movement
//! callback and a centroid-movement threshold.

use rand::seq::SliceRandom;
use thiserror::Error;

use crate::features::squared_distance;

#[derive(Debug, Error)]
pub enum KmeansError {
    #[error("cannot partition an empty dataset")]
    EmptyDataset,
    #[error("cluster count must be at least 1")]
    ZeroClusters,
    #[error("observations have inconsistent dimensions: {first} vs {other}")]
    RaggedDataset { first: usize, other: usize },
}

/// One resulting cluster: its mean and the observation indices assigned
/// to it under the final centers.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub center: Vec<f64>,
    pub members: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct PartitionOptions {
    /// Total centroid movement below which the iteration stops.
    pub threshold: f64,
    pub max_iterations: usize,
    /// Worker threads for the assignment step; a single linear knob.
    pub threads: usize,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self {
            threshold: 0.05,
            max_iterations: 64,
            threads: 1,
        }
    }
}

/// Movement report passed to the iteration callback.
#[derive(Debug, Clone, Copy)]
pub struct IterationUpdate {
    pub iteration: usize,
    pub movement: f64,
}

/// Partition observations into at most `k` clusters.
///
/// Returns fewer than `k` clusters only when the dataset itself holds
/// fewer observations.
pub fn partition(
    observations: &[Vec<f64>],
    k: usize,
    options: &PartitionOptions,
    mut on_iteration: impl FnMut(IterationUpdate),
) -> Result<Vec<Cluster>, KmeansError> {
    if observations.is_empty() {
        return Err(KmeansError::EmptyDataset);
    }
    if k == 0 {
        return Err(KmeansError::ZeroClusters);
    }
    let dim = observations[0].len();
    for other in observations {
        if other.len() != dim {
            return Err(KmeansError::RaggedDataset {
                first: dim,
                other: other.len(),
            });
        }
    }

    let k = k.min(observations.len());
    let mut centers = seed_centers(observations, k);
    let mut assignments = vec![0usize; observations.len()];
    let threads = options.threads.clamp(1, observations.len());

    for iteration in 1..=options.max_iterations.max(1) {
        let (sums, counts) = assign_step(observations, &centers, &mut assignments, threads);
        let movement = update_centers(&mut centers, &sums, &counts);
        on_iteration(IterationUpdate {
            iteration,
            movement,
        });
        if movement <= options.threshold {
            break;
        }
    }

    // One more assignment pass so members reflect the final centers.
    assign_step(observations, &centers, &mut assignments, threads);

    let mut clusters: Vec<Cluster> = centers
        .into_iter()
        .map(|center| Cluster {
            center,
            members: Vec::new(),
        })
        .collect();
    for (index, &cluster) in assignments.iter().enumerate() {
        clusters[cluster].members.push(index);
    }
    Ok(clusters)
}

fn seed_centers(observations: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
    let mut indices: Vec<usize> = (0..observations.len()).collect();
    indices.shuffle(&mut rand::rng());
    indices
        .into_iter()
        .take(k)
        .map(|i| observations[i].clone())
        .collect()
}

type Partials = (Vec<Vec<f64>>, Vec<usize>);

fn assign_step(
    observations: &[Vec<f64>],
    centers: &[Vec<f64>],
    assignments: &mut [usize],
    threads: usize,
) -> Partials {
    let dim = centers.first().map(|c| c.len()).unwrap_or(0);
    let chunk_len = observations.len().div_ceil(threads);
    let mut partials: Vec<Partials> = Vec::with_capacity(threads);

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(threads);
        for (chunk, slots) in observations
            .chunks(chunk_len)
            .zip(assignments.chunks_mut(chunk_len))
        {
            handles.push(scope.spawn(move || {
                let mut sums = vec![vec![0.0_f64; dim]; centers.len()];
                let mut counts = vec![0usize; centers.len()];
                for (observation, slot) in chunk.iter().zip(slots.iter_mut()) {
                    let nearest = nearest_center(observation, centers);
                    *slot = nearest;
                    counts[nearest] += 1;
                    for (acc, value) in sums[nearest].iter_mut().zip(observation) {
                        *acc += value;
                    }
                }
                (sums, counts)
            }));
        }
        for handle in handles {
            match handle.join() {
                Ok(partial) => partials.push(partial),
                Err(payload) => std::panic::resume_unwind(payload),
            }
        }
    });

    let mut sums = vec![vec![0.0_f64; dim]; centers.len()];
    let mut counts = vec![0usize; centers.len()];
    for (partial_sums, partial_counts) in partials {
        for (total, partial) in sums.iter_mut().zip(partial_sums) {
            for (acc, value) in total.iter_mut().zip(partial) {
                *acc += value;
            }
        }
        for (total, partial) in counts.iter_mut().zip(partial_counts) {
            *total += partial;
        }
    }
    (sums, counts)
}

fn nearest_center(observation: &[f64], centers: &[Vec<f64>]) -> usize {
    let mut best = 0usize;
    let mut best_dist = f64::MAX;
    for (index, center) in centers.iter().enumerate() {
        let dist = squared_distance(observation, center);
        if dist < best_dist {
            best_dist = dist;
            best = index;
        }
    }
    best
}

/// Move each center to the mean of its assignments; centers that lost
/// every member stay where they are. Returns the summed Euclidean
/// movement.
fn update_centers(centers: &mut [Vec<f64>], sums: &[Vec<f64>], counts: &[usize]) -> f64 {
    let mut movement = 0.0_f64;
    for ((center, sum), &count) in centers.iter_mut().zip(sums).zip(counts) {
        if count == 0 {
            continue;
        }
        let mut moved = 0.0_f64;
        for (value, total) in center.iter_mut().zip(sum) {
            let next = total / count as f64;
            let diff = next - *value;
            moved += diff * diff;
            *value = next;
        }
        movement += moved.sqrt();
    }
    movement
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(center: (f64, f64), count: usize) -> Vec<Vec<f64>> {
        (0..count)
            .map(|i| {
                let jitter = (i as f64 / count as f64 - 0.5) * 0.02;
                vec![center.0 + jitter, center.1 - jitter]
            })
            .collect()
    }

    #[test]
    fn empty_dataset_is_an_error() {
        let err = partition(&[], 4, &PartitionOptions::default(), |_| {}).unwrap_err();
        assert!(matches!(err, KmeansError::EmptyDataset));
    }

    #[test]
    fn zero_clusters_is_an_error() {
        let err = partition(&[vec![1.0]], 0, &PartitionOptions::default(), |_| {}).unwrap_err();
        assert!(matches!(err, KmeansError::ZeroClusters));
    }

    #[test]
    fn ragged_observations_are_rejected() {
        let data = vec![vec![1.0, 2.0], vec![3.0]];
        let err = partition(&data, 1, &PartitionOptions::default(), |_| {}).unwrap_err();
        assert!(matches!(
            err,
            KmeansError::RaggedDataset { first: 2, other: 1 }
        ));
    }

    #[test]
    fn recovers_two_separated_blobs() {
        let mut data = blob((0.0, 0.0), 50);
        data.extend(blob((100.0, 100.0), 50));
        let options = PartitionOptions {
            threshold: 1e-9,
            max_iterations: 64,
            threads: 3,
        };
        let mut iterations = 0usize;
        let clusters = partition(&data, 2, &options, |update| {
            iterations = update.iteration;
            assert!(update.movement.is_finite());
        })
        .unwrap();

        assert!(iterations >= 1);
        assert_eq!(clusters.len(), 2);
        let mut sizes: Vec<usize> = clusters.iter().map(|c| c.members.len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![50, 50]);
        let mut origins: Vec<f64> = clusters.iter().map(|c| c.center[0]).collect();
        origins.sort_by(|a, b| a.total_cmp(b));
        assert!(origins[0].abs() < 0.5);
        assert!((origins[1] - 100.0).abs() < 0.5);
    }

    #[test]
    fn cluster_count_is_clamped_to_dataset_size() {
        let data = vec![vec![0.0], vec![1.0], vec![2.0]];
        let clusters = partition(&data, 10, &PartitionOptions::default(), |_| {}).unwrap();
        assert_eq!(clusters.len(), 3);
        let total: usize = clusters.iter().map(|c| c.members.len()).sum();
        assert_eq!(total, 3);
    }
}
