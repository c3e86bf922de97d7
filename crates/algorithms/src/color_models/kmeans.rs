//! K-means clustering of reference samples
//!
//! Used to seed the Gaussian mixture. Initial centroids are chosen by
//! farthest-point traversal starting from the first sample, so the result
//! depends only on the samples and their order.

use crate::maybe_rayon::*;
use ndarray::ArrayView2;

/// Parameters for K-means clustering
#[derive(Debug, Clone)]
pub(crate) struct KmeansParams {
    /// Number of clusters
    pub k: usize,
    /// Maximum Lloyd iterations (default: 100)
    pub max_iterations: usize,
}

impl Default for KmeansParams {
    fn default() -> Self {
        Self {
            k: 2,
            max_iterations: 100,
        }
    }
}

/// Cluster the rows of a pixels x bands table.
///
/// Returns the cluster label of every sample. Iteration stops as soon as
/// the centroids no longer change. Requires `1 <= k <= samples`.
pub(crate) fn kmeans_labels(samples: ArrayView2<'_, f64>, params: &KmeansParams) -> Vec<usize> {
    let points: Vec<Vec<f64>> = samples.rows().into_iter().map(|r| r.to_vec()).collect();
    let dims = samples.ncols();
    let k = params.k;

    let mut centroids = initialize_centroids(&points, k);
    let mut labels = vec![0usize; points.len()];

    for _iter in 0..params.max_iterations {
        // Assignment step
        labels.par_iter_mut().enumerate().for_each(|(i, label)| {
            *label = nearest(&points[i], &centroids);
        });

        // Update step
        let mut sums = vec![vec![0.0; dims]; k];
        let mut counts = vec![0usize; k];
        for (point, &label) in points.iter().zip(&labels) {
            for (s, &v) in sums[label].iter_mut().zip(point) {
                *s += v;
            }
            counts[label] += 1;
        }

        let new_centroids: Vec<Vec<f64>> = sums
            .into_iter()
            .zip(&counts)
            .zip(&centroids)
            .map(|((sum, &count), old)| {
                if count == 0 {
                    old.clone() // keep empty cluster centroid
                } else {
                    sum.into_iter().map(|s| s / count as f64).collect()
                }
            })
            .collect();

        if new_centroids == centroids {
            break;
        }
        centroids = new_centroids;
    }

    labels
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Index of the closest centroid, the first one on ties
fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (k, c) in centroids.iter().enumerate() {
        let dist = squared_distance(point, c);
        if dist < best_dist {
            best_dist = dist;
            best = k;
        }
    }
    best
}

/// Farthest-point traversal: start at the first sample, then repeatedly add
/// the sample farthest from every centroid chosen so far.
fn initialize_centroids(points: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
    let mut centroids = vec![points[0].clone()];
    while centroids.len() < k {
        let mut far = 0;
        let mut far_dist = f64::NEG_INFINITY;
        for (i, p) in points.iter().enumerate() {
            let d = centroids
                .iter()
                .map(|c| squared_distance(p, c))
                .fold(f64::INFINITY, f64::min);
            if d > far_dist {
                far_dist = d;
                far = i;
            }
        }
        centroids.push(points[far].clone());
    }
    centroids
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_two_groups() {
        let samples = array![[0.0, 0.0], [1.0, 0.0], [50.0, 50.0], [0.0, 1.0], [51.0, 50.0]];
        let labels = kmeans_labels(samples.view(), &KmeansParams { k: 2, ..Default::default() });
        assert_eq!(labels, vec![0, 0, 1, 0, 1]);
    }

    #[test]
    fn test_single_cluster() {
        let samples = array![[1.0], [2.0], [3.0]];
        let labels = kmeans_labels(samples.view(), &KmeansParams { k: 1, ..Default::default() });
        assert_eq!(labels, vec![0, 0, 0]);
    }

    #[test]
    fn test_farthest_point_seeding() {
        let points = vec![vec![0.0], vec![1.0], vec![10.0], vec![4.0]];
        let c = initialize_centroids(&points, 3);
        assert_eq!(c, vec![vec![0.0], vec![10.0], vec![4.0]]);
    }
}
