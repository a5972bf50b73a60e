//! Spectral clustering via normalized-affinity eigenvectors.
//!
//! Spectral clustering works by:
//! 1. Build similarity graph from points
//! 2. Compute the symmetric Laplacian `L_sym = I - D^{-1/2} A D^{-1/2}`
//! 3. Take its k smallest eigenvectors, keeping the trivial one
//! 4. Run k-means on the row-normalized embedding (Ng–Jordan–Weiss)
//!
//! The kernel, the kNN graph and the embedding come from `lapl`.
//!
//! # Trade-offs
//!
//! | Aspect | Spectral | K-means |
//! |--------|----------|---------|
//! | Shape | Any | Convex |
//! | Complexity | O(n³) eigendecomp | O(nkd × iter) |
//! | Memory | O(n²) similarity | O(nd) |
//! | Scalability | < 10k points | Millions |
//!
//! Sweeps cap the sample fed to this algorithm for that reason.
//!
//! # References
//!
//! - Ng, Jordan, Weiss (2001). "On Spectral Clustering"
//! - von Luxburg (2007). "A Tutorial on Spectral Clustering"

use super::kmeans::Kmeans;
use super::traits::{squared_distance, Clustering, Label};
use crate::error::{Error, Result};
use lapl::{gaussian_similarity, knn_graph, spectral_embedding, SpectralEmbeddingConfig};
use ndarray::{Array2, ArrayView2};

/// Degree below which a node counts as isolated.
const MIN_DEGREE: f64 = 1e-12;

/// How the affinity graph is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Affinity {
    /// Gaussian kernel `exp(-gamma * ||x - y||²)`.
    Rbf {
        /// Kernel width; larger means more local.
        gamma: f64,
    },
    /// Symmetrised k-nearest-neighbour connectivity.
    Knn {
        /// Neighbours per point (excluding itself).
        n_neighbors: usize,
    },
}

/// Spectral clustering configuration and runner.
#[derive(Debug, Clone)]
pub struct SpectralClustering {
    /// Number of clusters
    k: usize,
    /// Affinity graph
    affinity: Affinity,
    /// K-means restarts on the embedding
    n_init: usize,
    /// Seed for the embedding k-means
    seed: u64,
}

impl SpectralClustering {
    /// Create new spectral clustering with k clusters (RBF, gamma = 1).
    pub fn new(k: usize) -> Self {
        Self {
            k,
            affinity: Affinity::Rbf { gamma: 1.0 },
            n_init: 10,
            seed: 42,
        }
    }

    /// Set affinity.
    pub fn with_affinity(mut self, affinity: Affinity) -> Self {
        self.affinity = affinity;
        self
    }

    /// Set k-means restarts on the embedding.
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }

    /// Set seed for the embedding k-means.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn build_affinity(&self, points: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let n = points.nrows();
        let mut affinity = match self.affinity {
            Affinity::Rbf { gamma } => {
                if gamma.is_nan() || gamma <= 0.0 {
                    return Err(Error::InvalidParameter {
                        name: "gamma",
                        message: "must be positive".into(),
                    });
                }
                // exp(-d² / 2σ²) == exp(-gamma * d²)
                let sigma = (1.0 / (2.0 * gamma)).sqrt();
                gaussian_similarity(&points.to_owned(), sigma)
            }
            Affinity::Knn { n_neighbors } => {
                if n_neighbors == 0 {
                    return Err(Error::InvalidParameter {
                        name: "n_neighbors",
                        message: "must be > 0".into(),
                    });
                }
                let mut distances = Array2::zeros((n, n));
                for i in 0..n {
                    for j in (i + 1)..n {
                        let d = squared_distance(points.row(i), points.row(j)).sqrt();
                        distances[[i, j]] = d;
                        distances[[j, i]] = d;
                    }
                }
                let graph = knn_graph(&distances, n_neighbors.min(n - 1));
                // 0.5 * (A + Aᵀ)
                (&graph + &graph.t()) * 0.5
            }
        };

        // An isolated node gets a unit self-loop so its degree stays positive.
        for i in 0..n {
            if affinity.row(i).sum() < MIN_DEGREE {
                affinity[[i, i]] = 1.0;
            }
        }
        Ok(affinity)
    }

    /// Row-normalized bottom-k eigenvectors of the symmetric Laplacian.
    fn embed(&self, affinity: &Array2<f64>) -> Result<Array2<f64>> {
        let mut cfg = SpectralEmbeddingConfig::default();
        cfg.skip_first = false;
        let mut embedding = spectral_embedding(affinity, self.k, &cfg)
            .map_err(|e| Error::Decomposition(format!("spectral embedding: {e}")))?;

        for mut row in embedding.rows_mut() {
            let norm = row.dot(&row).sqrt();
            if norm > 1e-12 {
                row.mapv_inplace(|v| v / norm);
            }
        }

        Ok(embedding)
    }
}

impl Clustering for SpectralClustering {
    fn fit_predict(&self, data: ArrayView2<'_, f64>) -> Result<Vec<Label>> {
        let n = data.nrows();
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        if self.k == 0 {
            return Err(Error::InvalidParameter {
                name: "k",
                message: "must be > 0".into(),
            });
        }
        if n < self.k {
            return Err(Error::InvalidClusterCount {
                requested: self.k,
                n_items: n,
            });
        }
        if n == 1 {
            return Ok(vec![0]);
        }

        let affinity = self.build_affinity(data)?;
        let embedding = self.embed(&affinity)?;

        Kmeans::new(self.k)
            .with_n_init(self.n_init)
            .with_seed(self.seed)
            .fit_predict(embedding.view())
    }

    fn n_clusters(&self) -> usize {
        self.k
    }
}
