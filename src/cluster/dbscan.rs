//! DBSCAN: Density-Based Spatial Clustering of Applications with Noise.
//!
//! # The Algorithm (Ester et al., 1996)
//!
//! Groups points by neighborhood density. Unlike k-means, it discovers the
//! number of clusters itself and marks outliers as [`NOISE`].
//!
//! - **eps (ε)**: Maximum distance between two points to be neighbors.
//! - **min_samples**: Neighbors within ε (the point itself included) for a
//!   point to be "core".
//! - **Border point**: Within ε of a core point but not core itself.
//! - **Noise point**: Neither core nor border; labelled `-1`.
//!
//! ## Complexity
//!
//! O(n²) distance evaluations (no spatial index). Sweeps run it on a bounded
//! tuning sample.

use super::traits::{cosine_similarity, squared_distance, Clustering, Label, NOISE};
use crate::error::{Error, Result};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Distance used for neighborhood queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbscanMetric {
    /// Straight-line distance.
    Euclidean,
    /// `1 - cos(a, b)`; zero vectors are at distance 1 from everything.
    Cosine,
}

impl DbscanMetric {
    /// Config / params spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            DbscanMetric::Euclidean => "euclidean",
            DbscanMetric::Cosine => "cosine",
        }
    }

    /// Parse the config / params spelling.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "euclidean" => Ok(DbscanMetric::Euclidean),
            "cosine" => Ok(DbscanMetric::Cosine),
            other => Err(Error::InvalidParameter {
                name: "metric",
                message: format!("unknown metric '{other}'"),
            }),
        }
    }

    fn distance(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        match self {
            DbscanMetric::Euclidean => squared_distance(a, b).sqrt(),
            DbscanMetric::Cosine => 1.0 - cosine_similarity(a, b),
        }
    }
}

/// DBSCAN clustering algorithm.
#[derive(Debug, Clone)]
pub struct Dbscan {
    /// Maximum distance for neighborhood.
    eps: f64,
    /// Minimum points (self included) for core point classification.
    min_samples: usize,
    /// Neighborhood distance.
    metric: DbscanMetric,
}

impl Dbscan {
    /// Create a new DBSCAN clusterer with Euclidean distance.
    ///
    /// `min_samples` counts the point itself, as in scikit-learn.
    pub fn new(eps: f64, min_samples: usize) -> Self {
        Self {
            eps,
            min_samples,
            metric: DbscanMetric::Euclidean,
        }
    }

    /// Set the neighborhood distance.
    pub fn with_metric(mut self, metric: DbscanMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Find all neighbors within eps (excluding the point itself).
    fn region_query(&self, data: ArrayView2<'_, f64>, point_idx: usize) -> Vec<usize> {
        let point = data.row(point_idx);
        (0..data.nrows())
            .filter(|&idx| idx != point_idx && self.metric.distance(point, data.row(idx)) <= self.eps)
            .collect()
    }

    /// Expand cluster from a core point.
    fn expand_cluster(
        &self,
        data: ArrayView2<'_, f64>,
        point_idx: usize,
        neighbors: Vec<usize>,
        labels: &mut [Label],
        cluster_id: Label,
        visited: &mut [bool],
    ) {
        labels[point_idx] = cluster_id;

        // Iterative expansion; avoids deep recursion on long chains.
        let mut to_process = neighbors;

        while let Some(neighbor_idx) = to_process.pop() {
            // Noise reached from a core point becomes a border point.
            if labels[neighbor_idx] == NOISE {
                labels[neighbor_idx] = cluster_id;
            }
            if visited[neighbor_idx] {
                continue;
            }
            visited[neighbor_idx] = true;

            let neighbor_neighbors = self.region_query(data, neighbor_idx);
            if neighbor_neighbors.len() + 1 >= self.min_samples {
                to_process.extend(neighbor_neighbors.into_iter().filter(|&nn| !visited[nn]));
            }
        }
    }
}

impl Default for Dbscan {
    fn default() -> Self {
        Self::new(0.5, 5)
    }
}

impl Clustering for Dbscan {
    fn fit_predict(&self, data: ArrayView2<'_, f64>) -> Result<Vec<Label>> {
        let n = data.nrows();
        if n == 0 {
            return Err(Error::EmptyInput);
        }

        if self.eps.is_nan() || self.eps <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "eps",
                message: "must be positive".into(),
            });
        }

        if self.min_samples == 0 {
            return Err(Error::InvalidParameter {
                name: "min_samples",
                message: "must be at least 1".into(),
            });
        }

        let mut labels = vec![NOISE; n];
        let mut visited = vec![false; n];
        let mut cluster_id: Label = 0;

        for point_idx in 0..n {
            if visited[point_idx] {
                continue;
            }
            visited[point_idx] = true;

            let neighbors = self.region_query(data, point_idx);

            if neighbors.len() + 1 < self.min_samples {
                // Not core; may still become a border point later.
                continue;
            }

            self.expand_cluster(data, point_idx, neighbors, &mut labels, cluster_id, &mut visited);
            cluster_id += 1;
        }

        log::trace!(
            "dbscan eps={} min_samples={} -> {} clusters, {} noise",
            self.eps,
            self.min_samples,
            cluster_id,
            labels.iter().filter(|&&l| l == NOISE).count()
        );

        Ok(labels)
    }

    /// DBSCAN discovers clusters dynamically, so this returns 0.
    fn n_clusters(&self) -> usize {
        0
    }
}
