//! Internal clustering-quality metrics.
//!
//! No ground truth exists for "songs that sound alike", so clusterings are
//! scored on geometry alone.
//!
//! # Metrics Overview
//!
//! | Metric | Field | Range | Best |
//! |--------|-------|-------|------|
//! | [`silhouette`] | `cohesion_separation` | [-1, 1] | higher |
//! | [`davies_bouldin`] | `compactness` | [0, ∞) | lower |
//! | [`calinski_harabasz`] | `variance_ratio` | [0, ∞) | higher |
//!
//! All three are only defined for `2 <= k <= n - 1` distinct labels; outside
//! that range they return [`Error::DegenerateClustering`] and the
//! [`Evaluator`] returns a sentinel with every score `None`.
//!
//! Noise (`-1`) is treated as one more label. A DBSCAN run with a large noise
//! set is scored as if the noise were a (very loose) cluster.
//!
//! # Conventions
//!
//! - Silhouette of a point in a singleton cluster is 0.
//! - Davies–Bouldin treats two clusters with identical centroids as infinitely
//!   far apart (they contribute 0 to each other's worst ratio).
//! - Calinski–Harabasz is 1.0 when within-cluster dispersion is 0.
//!
//! # References
//!
//! - Rousseeuw (1987). "Silhouettes: a graphical aid"
//! - Davies & Bouldin (1979). "A Cluster Separation Measure"
//! - Caliński & Harabasz (1974). "A dendrite method for cluster analysis"

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::cluster::{squared_distance, Label};
use crate::error::{Error, Result};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Scores for one labelling. `None` means the metric is undefined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Silhouette coefficient.
    pub cohesion_separation: Option<f64>,
    /// Davies–Bouldin index.
    pub compactness: Option<f64>,
    /// Calinski–Harabasz index.
    pub variance_ratio: Option<f64>,
    /// Why the scores are missing, when they are.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Evaluation {
    /// All-`None` result with an explanation.
    pub fn unscored(note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            ..Self::default()
        }
    }

    /// True when a silhouette score is present.
    pub fn is_scored(&self) -> bool {
        self.cohesion_separation.is_some()
    }
}

/// Scores labellings on a bounded, reproducible subsample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluator {
    /// Rows above this count are subsampled (without replacement).
    pub sample_size: usize,
    /// Seed for the subsample.
    pub seed: u64,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            sample_size: 10_000,
            seed: 42,
        }
    }
}

impl Evaluator {
    /// Create an evaluator.
    pub fn new(sample_size: usize, seed: u64) -> Self {
        Self { sample_size, seed }
    }

    /// Score `labels` against `data`.
    ///
    /// The same subsample feeds all three metrics. Degenerate labellings are
    /// not errors: they produce an unscored [`Evaluation`].
    pub fn evaluate(&self, data: ArrayView2<'_, f64>, labels: &[Label]) -> Result<Evaluation> {
        if data.nrows() != labels.len() {
            return Err(Error::DimensionMismatch {
                expected: data.nrows(),
                found: labels.len(),
            });
        }
        if labels.is_empty() {
            return Err(Error::EmptyInput);
        }

        let k = dense_labels(labels).1;
        if k < 2 {
            return Ok(Evaluation::unscored("single cluster"));
        }

        let sample;
        let sample_labels;
        let (data, labels) = if data.nrows() > self.sample_size {
            let idx = sample_indices(data.nrows(), self.sample_size, self.seed);
            sample = data.select(Axis(0), &idx);
            sample_labels = idx.iter().map(|&i| labels[i]).collect::<Vec<_>>();
            (sample.view(), sample_labels.as_slice())
        } else {
            (data.view(), labels)
        };

        let (dense, k) = dense_labels(labels);
        let n = labels.len();
        if k < 2 {
            return Ok(Evaluation::unscored("single cluster in evaluation sample"));
        }
        if k >= n {
            return Ok(Evaluation::unscored("every point is its own cluster"));
        }

        Ok(Evaluation {
            cohesion_separation: Some(silhouette_dense(data, &dense, k)),
            compactness: Some(davies_bouldin_dense(data, &dense, k)),
            variance_ratio: Some(calinski_harabasz_dense(data, &dense, k)),
            note: None,
        })
    }
}

/// Sorted fixed-seed sample of `size` distinct indices from `0..n`.
pub(crate) fn sample_indices(n: usize, size: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut idx = rand::seq::index::sample(&mut rng, n, size.min(n)).into_vec();
    idx.sort_unstable();
    idx
}

/// Map arbitrary labels onto `0..k`; returns the mapping and `k`.
fn dense_labels(labels: &[Label]) -> (Vec<usize>, usize) {
    let mut ids: BTreeMap<Label, usize> = BTreeMap::new();
    for &l in labels {
        let next = ids.len();
        let _ = ids.entry(l).or_insert(next);
    }
    let dense = labels.iter().map(|l| ids[l]).collect();
    (dense, ids.len())
}

fn validate(data: ArrayView2<'_, f64>, labels: &[Label]) -> Result<(Vec<usize>, usize)> {
    if data.nrows() != labels.len() {
        return Err(Error::DimensionMismatch {
            expected: data.nrows(),
            found: labels.len(),
        });
    }
    if labels.is_empty() {
        return Err(Error::EmptyInput);
    }
    let (dense, k) = dense_labels(labels);
    if k < 2 || k >= labels.len() {
        return Err(Error::DegenerateClustering { n_clusters: k });
    }
    Ok((dense, k))
}

fn centroids(data: ArrayView2<'_, f64>, dense: &[usize], k: usize) -> (Array2<f64>, Vec<usize>) {
    let mut sums = Array2::zeros((k, data.ncols()));
    let mut counts = vec![0usize; k];
    for (row, &c) in data.rows().into_iter().zip(dense) {
        let mut s = sums.row_mut(c);
        s += &row;
        counts[c] += 1;
    }
    for (c, &count) in counts.iter().enumerate() {
        if count > 0 {
            sums.row_mut(c).mapv_inplace(|v| v / count as f64);
        }
    }
    (sums, counts)
}

/// Mean silhouette coefficient.
///
/// ```text
/// s(i) = (b(i) - a(i)) / max(a(i), b(i))
/// ```
///
/// where a(i) is the mean distance to the rest of i's cluster and b(i) the
/// smallest mean distance to another cluster.
pub fn silhouette(data: ArrayView2<'_, f64>, labels: &[Label]) -> Result<f64> {
    let (dense, k) = validate(data, labels)?;
    Ok(silhouette_dense(data, &dense, k))
}

fn silhouette_dense(data: ArrayView2<'_, f64>, dense: &[usize], k: usize) -> f64 {
    let n = dense.len();
    let mut counts = vec![0usize; k];
    for &c in dense {
        counts[c] += 1;
    }

    let score = |i: usize| -> f64 {
        let own = dense[i];
        if counts[own] <= 1 {
            return 0.0;
        }
        let mut sums = vec![0.0_f64; k];
        let row = data.row(i);
        for j in 0..n {
            if j != i {
                sums[dense[j]] += squared_distance(row, data.row(j)).sqrt();
            }
        }
        let a = sums[own] / (counts[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own && counts[c] > 0)
            .map(|c| sums[c] / counts[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        if denom > 0.0 {
            (b - a) / denom
        } else {
            0.0
        }
    };

    #[cfg(feature = "parallel")]
    let total: f64 = (0..n).into_par_iter().map(score).sum();

    #[cfg(not(feature = "parallel"))]
    let total: f64 = (0..n).map(score).sum();

    total / n as f64
}

/// Davies–Bouldin index.
///
/// ```text
/// DB = (1/k) Σᵢ maxⱼ≠ᵢ (Sᵢ + Sⱼ) / d(cᵢ, cⱼ)
/// ```
///
/// Sᵢ is the mean distance of cluster i's points to its centroid.
pub fn davies_bouldin(data: ArrayView2<'_, f64>, labels: &[Label]) -> Result<f64> {
    let (dense, k) = validate(data, labels)?;
    Ok(davies_bouldin_dense(data, &dense, k))
}

fn davies_bouldin_dense(data: ArrayView2<'_, f64>, dense: &[usize], k: usize) -> f64 {
    let (centers, counts) = centroids(data, dense, k);

    let mut scatter = vec![0.0_f64; k];
    for (row, &c) in data.rows().into_iter().zip(dense) {
        scatter[c] += squared_distance(row, centers.row(c)).sqrt();
    }
    for (s, &count) in scatter.iter_mut().zip(&counts) {
        *s /= count.max(1) as f64;
    }

    let mut separation = Array2::<f64>::zeros((k, k));
    for i in 0..k {
        for j in (i + 1)..k {
            let d = squared_distance(centers.row(i), centers.row(j)).sqrt();
            separation[[i, j]] = d;
            separation[[j, i]] = d;
        }
    }

    if scatter.iter().all(|&s| s.abs() < 1e-12) || separation.iter().all(|&d| d.abs() < 1e-12) {
        return 0.0;
    }

    let worst: Array1<f64> = Array1::from_iter((0..k).map(|i| {
        (0..k)
            .filter(|&j| j != i && separation[[i, j]] > 0.0)
            .map(|j| (scatter[i] + scatter[j]) / separation[[i, j]])
            .fold(0.0_f64, f64::max)
    }));

    worst.mean().unwrap_or(0.0)
}

/// Calinski–Harabasz index (variance ratio criterion).
///
/// ```text
/// CH = [B / (k - 1)] / [W / (n - k)]
/// ```
///
/// B is between-cluster dispersion, W within-cluster dispersion.
pub fn calinski_harabasz(data: ArrayView2<'_, f64>, labels: &[Label]) -> Result<f64> {
    let (dense, k) = validate(data, labels)?;
    Ok(calinski_harabasz_dense(data, &dense, k))
}

fn calinski_harabasz_dense(data: ArrayView2<'_, f64>, dense: &[usize], k: usize) -> f64 {
    let n = dense.len();
    let (centers, counts) = centroids(data, dense, k);
    let overall = match data.mean_axis(Axis(0)) {
        Some(m) => m,
        None => return 0.0,
    };

    let between: f64 = (0..k)
        .map(|c| counts[c] as f64 * squared_distance(centers.row(c), overall.view()))
        .sum();
    let within: f64 = data
        .rows()
        .into_iter()
        .zip(dense)
        .map(|(row, &c)| squared_distance(row, centers.row(c)))
        .sum();

    if within == 0.0 {
        1.0
    } else {
        between * (n - k) as f64 / (within * (k - 1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::NOISE;
    use ndarray::array;

    fn blobs() -> (Array2<f64>, Vec<Label>) {
        (
            array![[0.0, 0.0], [0.0, 1.0], [10.0, 0.0], [10.0, 1.0]],
            vec![0, 0, 1, 1],
        )
    }

    #[test]
    fn test_silhouette_known_value() {
        let (data, labels) = blobs();
        // a = 1, b = (10 + sqrt(101)) / 2
        let b = (10.0 + 101.0_f64.sqrt()) / 2.0;
        let expected = (b - 1.0) / b;
        assert!((silhouette(data.view(), &labels).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_silhouette_singleton_scores_zero() {
        let data = array![[0.0], [0.1], [5.0]];
        let labels = vec![0, 0, 1];
        let s0 = {
            let a = 0.1;
            let b = 5.0;
            (b - a) / b
        };
        let s1 = {
            let a = 0.1;
            let b = 4.9;
            (b - a) / b
        };
        let expected = (s0 + s1 + 0.0) / 3.0;
        assert!((silhouette(data.view(), &labels).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_davies_bouldin_known_value() {
        let (data, labels) = blobs();
        // S = 0.5 for both, centroid distance 10.
        assert!((davies_bouldin(data.view(), &labels).unwrap() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_davies_bouldin_coincident_centroids() {
        let data = array![[-1.0], [1.0], [-2.0], [2.0]];
        let labels = vec![0, 0, 1, 1];
        assert_eq!(davies_bouldin(data.view(), &labels).unwrap(), 0.0);
    }

    #[test]
    fn test_calinski_harabasz_known_value() {
        let (data, labels) = blobs();
        // B = 4 * 25 = 100, W = 4 * 0.25 = 1, n - k = 2, k - 1 = 1.
        assert!((calinski_harabasz(data.view(), &labels).unwrap() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_calinski_harabasz_zero_dispersion() {
        let data = array![[0.0], [0.0], [3.0], [3.0]];
        assert_eq!(calinski_harabasz(data.view(), &[0, 0, 1, 1]).unwrap(), 1.0);
    }

    #[test]
    fn test_metrics_share_one_subsample() {
        let n = 300;
        let data = Array2::from_shape_fn((n, 2), |(i, j)| {
            let c = (i % 3) as f64 * 6.0;
            c + ((i * 7 + j * 13) % 17) as f64 * 0.1
        });
        let labels: Vec<Label> = (0..n).map(|i| (i % 3) as Label).collect();
        let evaluator = Evaluator::new(50, 9);

        let eval = evaluator.evaluate(data.view(), &labels).unwrap();

        let idx = sample_indices(n, 50, 9);
        let rows = data.select(Axis(0), &idx);
        let picked: Vec<Label> = idx.iter().map(|&i| labels[i]).collect();
        let close = |a: Option<f64>, b: f64| (a.unwrap() - b).abs() < 1e-9;
        assert!(close(eval.cohesion_separation, silhouette(rows.view(), &picked).unwrap()));
        assert!(close(eval.compactness, davies_bouldin(rows.view(), &picked).unwrap()));
        assert!(close(eval.variance_ratio, calinski_harabasz(rows.view(), &picked).unwrap()));

        // A different seed draws different rows.
        let other = Evaluator::new(50, 10).evaluate(data.view(), &labels).unwrap();
        assert_ne!(other.variance_ratio, eval.variance_ratio);
    }

    #[test]
    fn test_degenerate_labellings() {
        let (data, _) = blobs();
        assert!(matches!(
            silhouette(data.view(), &[0, 0, 0, 0]),
            Err(Error::DegenerateClustering { n_clusters: 1 })
        ));
        assert!(matches!(
            silhouette(data.view(), &[0, 1, 2, 3]),
            Err(Error::DegenerateClustering { n_clusters: 4 })
        ));

        let eval = Evaluator::default().evaluate(data.view(), &[NOISE; 4]).unwrap();
        assert!(!eval.is_scored());
        assert_eq!(eval.compactness, None);
        assert_eq!(eval.variance_ratio, None);
        assert!(eval.note.is_some());
    }

    #[test]
    fn test_noise_is_an_ordinary_label() {
        let (data, _) = blobs();
        let with_noise = Evaluator::default()
            .evaluate(data.view(), &[NOISE, NOISE, 4, 4])
            .unwrap();
        let plain = Evaluator::default().evaluate(data.view(), &[0, 0, 1, 1]).unwrap();
        assert_eq!(with_noise, plain);
    }

    #[test]
    fn test_evaluator_length_mismatch() {
        let (data, _) = blobs();
        assert_eq!(
            Evaluator::default().evaluate(data.view(), &[0, 1]),
            Err(Error::DimensionMismatch { expected: 4, found: 2 })
        );
    }

    #[test]
    fn test_evaluator_subsample_reproducible() {
        let data = Array2::from_shape_fn((200, 2), |(i, j)| {
            let base = if i < 100 { 0.0 } else { 20.0 };
            base + ((i * 13 + j * 7) % 10) as f64 * 0.1
        });
        let labels: Vec<Label> = (0..200).map(|i| if i < 100 { 0 } else { 1 }).collect();
        let eval = Evaluator::new(50, 7);
        let a = eval.evaluate(data.view(), &labels).unwrap();
        let b = eval.evaluate(data.view(), &labels).unwrap();
        assert_eq!(a, b);
        assert!(a.cohesion_separation.unwrap() > 0.9);
    }

    #[test]
    fn test_sample_indices_distinct_sorted() {
        let idx = sample_indices(1000, 100, 42);
        assert_eq!(idx.len(), 100);
        assert!(idx.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(idx, sample_indices(1000, 100, 42));
    }
}
