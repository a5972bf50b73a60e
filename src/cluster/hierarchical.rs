//! Hierarchical (agglomerative) clustering.
//!
//! Bottom-up clustering that repeatedly merges the closest pair of clusters.
//! The merge sequence is cut after `n - k` merges to produce k flat clusters.
//!
//! # Linkage Methods
//!
//! | Linkage | Formula | Effect |
//! |---------|---------|--------|
//! | Single | min(d(a,b)) for a∈A, b∈B | Chaining; elongated clusters |
//! | Complete | max(d(a,b)) | Compact, spherical clusters |
//! | Average | mean(d(a,b)) | Balanced compromise |
//! | Ward | Δ variance | Minimizes within-cluster variance |
//!
//! Memory is O(n²) for the condensed distance matrix, so sweeps run this on
//! the bounded tuning sample.

use std::collections::HashMap;

use super::traits::{squared_distance, Clustering, Label};
use crate::error::{Error, Result};
use kodama::{linkage as kodama_linkage, Method as KodamaMethod};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Linkage method for hierarchical clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Single linkage: minimum distance between clusters.
    Single,
    /// Complete linkage: maximum distance between clusters.
    Complete,
    /// Average linkage: mean distance between clusters.
    Average,
    /// Ward's method: minimize within-cluster variance.
    Ward,
}

impl Linkage {
    /// Config / params spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Linkage::Single => "single",
            Linkage::Complete => "complete",
            Linkage::Average => "average",
            Linkage::Ward => "ward",
        }
    }

    /// Parse the config / params spelling.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "single" => Ok(Linkage::Single),
            "complete" => Ok(Linkage::Complete),
            "average" => Ok(Linkage::Average),
            "ward" => Ok(Linkage::Ward),
            other => Err(Error::InvalidParameter {
                name: "linkage",
                message: format!("unknown linkage '{other}'"),
            }),
        }
    }
}

/// Hierarchical (agglomerative) clustering.
#[derive(Debug, Clone)]
pub struct HierarchicalClustering {
    /// Number of clusters to produce.
    n_clusters: usize,
    /// Linkage method.
    linkage: Linkage,
}

impl HierarchicalClustering {
    /// Create a new hierarchical clusterer (Ward linkage).
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            linkage: Linkage::Ward,
        }
    }

    /// Set linkage method.
    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    /// Apply the first `n - k` merges and label each leaf by its root.
    ///
    /// Labels are numbered in order of first appearance.
    fn cut(steps: &[kodama::Step<f64>], n: usize, k: usize) -> Vec<Label> {
        let mut parent: Vec<usize> = (0..(2 * n)).collect();
        for (i, step) in steps.iter().take(n - k).enumerate() {
            let merged = n + i;
            parent[step.cluster1] = merged;
            parent[step.cluster2] = merged;
        }

        let mut renumber: HashMap<usize, Label> = HashMap::with_capacity(k);
        (0..n)
            .map(|leaf| {
                let mut node = leaf;
                while parent[node] != node {
                    node = parent[node];
                }
                let next = renumber.len() as Label;
                *renumber.entry(node).or_insert(next)
            })
            .collect()
    }
}

impl Clustering for HierarchicalClustering {
    fn fit_predict(&self, data: ArrayView2<'_, f64>) -> Result<Vec<Label>> {
        let n = data.nrows();
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        if self.n_clusters == 0 {
            return Err(Error::InvalidParameter {
                name: "n_clusters",
                message: "must be > 0".into(),
            });
        }
        if self.n_clusters > n {
            return Err(Error::InvalidClusterCount {
                requested: self.n_clusters,
                n_items: n,
            });
        }
        if n == 1 {
            return Ok(vec![0]);
        }

        // Condensed dissimilarity matrix (upper triangle, row-major), N-choose-2 long.
        let mut condensed = Vec::with_capacity((n * (n - 1)) / 2);
        for row in 0..(n - 1) {
            for col in (row + 1)..n {
                condensed.push(squared_distance(data.row(row), data.row(col)).sqrt());
            }
        }

        let method = match self.linkage {
            Linkage::Single => KodamaMethod::Single,
            Linkage::Complete => KodamaMethod::Complete,
            Linkage::Average => KodamaMethod::Average,
            Linkage::Ward => KodamaMethod::Ward,
        };

        // kodama labels leaves 0..n-1 and gives merge i the id n+i.
        let dend = kodama_linkage(&mut condensed, n, method);

        Ok(Self::cut(dend.steps(), n, self.n_clusters))
    }

    fn n_clusters(&self) -> usize {
        self.n_clusters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::count_clusters;
    use ndarray::array;

    #[test]
    fn test_hierarchical_basic() {
        let data = array![[0.0, 0.0], [0.1, 0.1], [10.0, 10.0], [10.1, 10.1]];

        for linkage in [Linkage::Single, Linkage::Complete, Linkage::Average, Linkage::Ward] {
            let labels = HierarchicalClustering::new(2)
                .with_linkage(linkage)
                .fit_predict(data.view())
                .unwrap();

            assert_eq!(labels[0], labels[1], "{linkage:?}");
            assert_eq!(labels[2], labels[3], "{linkage:?}");
            assert_ne!(labels[0], labels[2], "{linkage:?}");
        }
    }

    #[test]
    fn test_hierarchical_exact_k_and_first_appearance_order() {
        let data = array![[0.0], [1.0], [10.0], [11.0], [30.0]];
        let labels = HierarchicalClustering::new(3).fit_predict(data.view()).unwrap();
        assert_eq!(count_clusters(&labels), 3);
        assert_eq!(labels, vec![0, 0, 1, 1, 2]);
    }

    #[test]
    fn test_hierarchical_k_equals_n() {
        let data = array![[0.0], [1.0], [2.0]];
        let labels = HierarchicalClustering::new(3).fit_predict(data.view()).unwrap();
        assert_eq!(labels, vec![0, 1, 2]);
    }

    #[test]
    fn test_hierarchical_invalid_k() {
        let data = array![[0.0], [1.0]];
        assert!(HierarchicalClustering::new(0).fit_predict(data.view()).is_err());
        assert!(HierarchicalClustering::new(3).fit_predict(data.view()).is_err());
    }

    #[test]
    fn test_linkage_parse() {
        assert_eq!(Linkage::parse("ward").unwrap(), Linkage::Ward);
        assert!(Linkage::parse("centroid").is_err());
    }
}
