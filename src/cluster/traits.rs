//! Clustering traits.

use crate::error::Result;
use ndarray::{ArrayView1, ArrayView2};

/// Cluster label. Opaque; only equality is meaningful.
pub type Label = i32;

/// Label reserved for density-based noise points.
pub const NOISE: Label = -1;

/// Trait for hard clustering algorithms.
pub trait Clustering {
    /// Fit the model to data and return cluster assignments.
    ///
    /// Returns one label per input row. Only density-based algorithms emit
    /// [`NOISE`].
    fn fit_predict(&self, data: ArrayView2<'_, f64>) -> Result<Vec<Label>>;

    /// Get the number of clusters (0 if discovered during fit).
    fn n_clusters(&self) -> usize;
}

/// Trait for soft clustering algorithms that return probabilities.
pub trait SoftClustering: Clustering {
    /// Fit and return soft cluster assignments (probabilities).
    ///
    /// Returns a matrix where entry \[i\]\[k\] is the probability that
    /// point i belongs to cluster k.
    fn fit_predict_proba(&self, data: ArrayView2<'_, f64>) -> Result<Vec<Vec<f64>>>;
}

/// Number of distinct labels other than [`NOISE`].
pub fn count_clusters(labels: &[Label]) -> usize {
    let mut seen: Vec<Label> = labels.iter().copied().filter(|&l| l != NOISE).collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

/// Squared Euclidean distance.
#[inline]
pub(crate) fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Cosine similarity; 0.0 when either vector has (near) zero norm.
pub fn cosine_similarity(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-12 {
        0.0
    } else {
        dot / denom
    }
}
