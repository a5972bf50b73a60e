//! K-means clustering.
//!
//! Partitions data into k clusters by minimizing **within-cluster sum of squares**
//! (WCSS, "inertia"):
//!
//! ```text
//! WCSS = Σₖ Σᵢ∈Cₖ ||xᵢ - μₖ||²
//! ```
//!
//! # Lloyd's Algorithm
//!
//! 1. Initialize k centroids via k-means++
//! 2. **Assign**: Each point → nearest centroid
//! 3. **Update**: Each centroid → mean of assigned points
//! 4. Repeat until the total centroid shift drops below `tol`
//!
//! Lloyd only finds a local minimum, so [`Kmeans::with_n_init`] runs several
//! seeded restarts and keeps the lowest-inertia result.
//!
//! ## K-means++ Initialization
//!
//! 1. Choose first centroid uniformly at random
//! 2. Choose next centroid with probability proportional to D(x)²
//!    (squared distance to nearest existing centroid)

use super::traits::{squared_distance, Clustering, Label};
use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// K-means clustering algorithm.
#[derive(Debug, Clone)]
pub struct Kmeans {
    /// Number of clusters.
    k: usize,
    /// Maximum iterations per run.
    max_iter: usize,
    /// Convergence tolerance on total squared centroid shift.
    tol: f64,
    /// Random seed.
    seed: Option<u64>,
    /// Independent restarts.
    n_init: usize,
}

/// Result of a k-means fit.
#[derive(Debug, Clone)]
pub struct KmeansFit {
    /// Cluster index per row, in `0..k`.
    pub labels: Vec<usize>,
    /// Final centroids, k × d.
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares.
    pub inertia: f64,
}

impl Kmeans {
    /// Create a new K-means clusterer.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iter: 300,
            tol: 1e-4,
            seed: None,
            n_init: 1,
        }
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set convergence tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the number of restarts (at least 1).
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }

    /// Fit and return labels, centroids and inertia.
    pub fn fit(&self, data: ArrayView2<'_, f64>) -> Result<KmeansFit> {
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
        if self.k > n {
            return Err(Error::InvalidClusterCount {
                requested: self.k,
                n_items: n,
            });
        }

        let mut rng: Box<dyn RngCore> = match self.seed {
            Some(s) => Box::new(StdRng::seed_from_u64(s)),
            None => Box::new(rand::rng()),
        };

        let mut best: Option<KmeansFit> = None;
        for _ in 0..self.n_init {
            let fit = self.run_once(data, &mut rng);
            match &best {
                Some(b) if b.inertia <= fit.inertia => {}
                _ => best = Some(fit),
            }
        }

        best.ok_or(Error::EmptyInput)
    }

    fn run_once(&self, data: ArrayView2<'_, f64>, rng: &mut impl Rng) -> KmeansFit {
        let n = data.nrows();
        let d = data.ncols();

        let mut centroids = self.init_centroids(data, rng);
        let mut labels = vec![0usize; n];

        for _iter in 0..self.max_iter {
            Self::assign(data, &centroids, &mut labels);

            // Update step
            let mut new_centroids = Array2::zeros((self.k, d));
            let mut counts = vec![0usize; self.k];

            for (i, &k) in labels.iter().enumerate() {
                let mut row = new_centroids.row_mut(k);
                row += &data.row(i);
                counts[k] += 1;
            }

            for (k, &count) in counts.iter().enumerate() {
                if count > 0 {
                    new_centroids.row_mut(k).mapv_inplace(|v| v / count as f64);
                } else {
                    // Empty cluster: reinitialize randomly
                    let idx = rng.random_range(0..n);
                    new_centroids.row_mut(k).assign(&data.row(idx));
                }
            }

            let shift: f64 = centroids
                .iter()
                .zip(new_centroids.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum();

            centroids = new_centroids;

            if shift < self.tol {
                break;
            }
        }

        // Labels consistent with the final centroids.
        Self::assign(data, &centroids, &mut labels);
        let inertia = labels
            .iter()
            .enumerate()
            .map(|(i, &k)| squared_distance(data.row(i), centroids.row(k)))
            .sum();

        KmeansFit {
            labels,
            centroids,
            inertia,
        }
    }

    /// Initialize centroids using k-means++ algorithm.
    fn init_centroids(&self, data: ArrayView2<'_, f64>, rng: &mut impl Rng) -> Array2<f64> {
        let n = data.nrows();
        let d = data.ncols();
        let mut centroids = Array2::zeros((self.k, d));

        let first = rng.random_range(0..n);
        centroids.row_mut(0).assign(&data.row(first));

        let mut min_dist: Vec<f64> = (0..n)
            .map(|j| squared_distance(data.row(j), centroids.row(0)))
            .collect();

        for i in 1..self.k {
            // Sample proportional to squared distance
            let total: f64 = min_dist.iter().sum();
            let selected = if total <= 0.0 {
                rng.random_range(0..n)
            } else {
                let threshold = rng.random::<f64>() * total;
                let mut cumsum = 0.0;
                let mut selected = n - 1;
                for (j, &dist) in min_dist.iter().enumerate() {
                    cumsum += dist;
                    if cumsum >= threshold {
                        selected = j;
                        break;
                    }
                }
                selected
            };

            centroids.row_mut(i).assign(&data.row(selected));
            for (j, slot) in min_dist.iter_mut().enumerate() {
                let dist = squared_distance(data.row(j), centroids.row(i));
                if dist < *slot {
                    *slot = dist;
                }
            }
        }

        centroids
    }

    fn nearest(point: ArrayView1<'_, f64>, centroids: &Array2<f64>) -> usize {
        let mut best_cluster = 0;
        let mut best_dist = f64::MAX;
        for (k, centroid) in centroids.rows().into_iter().enumerate() {
            let dist = squared_distance(point, centroid);
            if dist < best_dist {
                best_dist = dist;
                best_cluster = k;
            }
        }
        best_cluster
    }

    fn assign(data: ArrayView2<'_, f64>, centroids: &Array2<f64>, labels: &mut [usize]) {
        #[cfg(feature = "parallel")]
        {
            labels.par_iter_mut().enumerate().for_each(|(i, label)| {
                *label = Self::nearest(data.row(i), centroids);
            });
        }

        #[cfg(not(feature = "parallel"))]
        {
            for (i, label) in labels.iter_mut().enumerate() {
                *label = Self::nearest(data.row(i), centroids);
            }
        }
    }
}

impl Clustering for Kmeans {
    fn fit_predict(&self, data: ArrayView2<'_, f64>) -> Result<Vec<Label>> {
        let fit = self.fit(data)?;
        Ok(fit.labels.into_iter().map(|l| l as Label).collect())
    }

    fn n_clusters(&self) -> usize {
        self.k
    }
}
