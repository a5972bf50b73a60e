//! The five clustering families and their grids.
//!
//! Grids are plain serde structs so they can live in the TOML config.
//! DBSCAN is the exception to exhaustive grids: its space is sampled with
//! seeded random draws, so the "grid" is a fixed list of `n_trials` draws.

use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use super::{param_f64, param_text, param_usize, ParamValue, Params, Tunable};
use crate::cluster::{
    Affinity, Clustering, CovarianceType, Dbscan, DbscanMetric, Gmm, HierarchicalClustering,
    Kmeans, Label, Linkage, SpectralClustering,
};
use crate::error::{Error, Result};

fn params<const N: usize>(entries: [(&str, ParamValue); N]) -> Params {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn check_range(name: &'static str, min: usize, max: usize) -> Result<()> {
    if min == 0 || min > max {
        return Err(Error::InvalidParameter {
            name,
            message: format!("range {min}..={max} is empty or starts at 0"),
        });
    }
    Ok(())
}

fn check_fit_size(name: &'static str, size: usize) -> Result<()> {
    if size < 2 {
        return Err(Error::InvalidParameter {
            name,
            message: format!("must be at least 2, got {size}"),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// K-means
// ---------------------------------------------------------------------------

/// K-means sweep settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KmeansGrid {
    /// Smallest k tried.
    pub k_min: usize,
    /// Largest k tried (inclusive).
    pub k_max: usize,
    /// Restarts per fit.
    pub n_init: usize,
    /// Lloyd iterations per restart.
    pub max_iter: usize,
}

impl Default for KmeansGrid {
    fn default() -> Self {
        Self {
            k_min: 3,
            k_max: 20,
            n_init: 10,
            max_iter: 300,
        }
    }
}

impl KmeansGrid {
    /// Reject empty ranges.
    pub fn validate(&self) -> Result<()> {
        check_range("kmeans.k", self.k_min, self.k_max)
    }
}

/// K-means over a range of k.
#[derive(Debug, Clone)]
pub struct KmeansFamily {
    grid: KmeansGrid,
    seed: u64,
}

impl KmeansFamily {
    /// Create the family.
    pub fn new(grid: KmeansGrid, seed: u64) -> Self {
        Self { grid, seed }
    }
}

impl Tunable for KmeansFamily {
    fn name(&self) -> &str {
        "kmeans"
    }

    fn supported_param_grid(&self) -> Vec<Params> {
        (self.grid.k_min..=self.grid.k_max)
            .map(|k| params([("n_clusters", k.into())]))
            .collect()
    }

    fn fit_predict(&self, data: ArrayView2<'_, f64>, params: &Params) -> Result<Vec<Label>> {
        Kmeans::new(param_usize(params, "n_clusters")?)
            .with_n_init(self.grid.n_init)
            .with_max_iter(self.grid.max_iter)
            .with_seed(self.seed)
            .fit_predict(data)
    }
}

// ---------------------------------------------------------------------------
// DBSCAN
// ---------------------------------------------------------------------------

/// DBSCAN randomized-search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbscanGrid {
    /// Number of random draws.
    pub n_trials: usize,
    /// Lower bound for eps (inclusive).
    pub eps_min: f64,
    /// Upper bound for eps (exclusive).
    pub eps_max: f64,
    /// Lower bound for min_samples (inclusive).
    pub min_samples_min: usize,
    /// Upper bound for min_samples (exclusive).
    pub min_samples_max: usize,
    /// Metrics drawn from.
    pub metrics: Vec<DbscanMetric>,
}

impl Default for DbscanGrid {
    fn default() -> Self {
        Self {
            n_trials: 50,
            eps_min: 0.3,
            eps_max: 1.2,
            min_samples_min: 3,
            min_samples_max: 15,
            metrics: vec![DbscanMetric::Euclidean, DbscanMetric::Cosine],
        }
    }
}

impl DbscanGrid {
    /// Reject empty or non-positive ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.eps_min > 0.0 && self.eps_min < self.eps_max && self.eps_max.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "dbscan.eps",
                message: format!("need 0 < eps_min < eps_max, got {}..{}", self.eps_min, self.eps_max),
            });
        }
        if self.min_samples_min == 0 || self.min_samples_min >= self.min_samples_max {
            return Err(Error::InvalidParameter {
                name: "dbscan.min_samples",
                message: format!(
                    "need 0 < min < max, got {}..{}",
                    self.min_samples_min, self.min_samples_max
                ),
            });
        }
        if self.metrics.is_empty() {
            return Err(Error::InvalidParameter {
                name: "dbscan.metrics",
                message: "at least one metric is required".into(),
            });
        }
        Ok(())
    }
}

/// DBSCAN over seeded random draws of eps, min_samples and metric.
#[derive(Debug, Clone)]
pub struct DbscanFamily {
    grid: DbscanGrid,
    seed: u64,
}

impl DbscanFamily {
    /// Create the family.
    pub fn new(grid: DbscanGrid, seed: u64) -> Self {
        Self { grid, seed }
    }
}

impl Tunable for DbscanFamily {
    fn name(&self) -> &str {
        "dbscan"
    }

    fn supported_param_grid(&self) -> Vec<Params> {
        if let Err(e) = self.grid.validate() {
            log::warn!("dbscan grid is unusable: {e}");
            return Vec::new();
        }
        let eps_dist = match Uniform::new(self.grid.eps_min, self.grid.eps_max) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("dbscan eps range is unusable: {e}");
                return Vec::new();
            }
        };

        let mut rng = StdRng::seed_from_u64(self.seed);
        (0..self.grid.n_trials)
            .map(|_| {
                let eps = eps_dist.sample(&mut rng);
                let min_samples =
                    rng.random_range(self.grid.min_samples_min..self.grid.min_samples_max);
                let metric = self.grid.metrics[rng.random_range(0..self.grid.metrics.len())];
                params([
                    ("eps", eps.into()),
                    ("min_samples", min_samples.into()),
                    ("metric", metric.as_str().into()),
                ])
            })
            .collect()
    }

    fn fit_predict(&self, data: ArrayView2<'_, f64>, params: &Params) -> Result<Vec<Label>> {
        Dbscan::new(param_f64(params, "eps")?, param_usize(params, "min_samples")?)
            .with_metric(DbscanMetric::parse(param_text(params, "metric")?)?)
            .fit_predict(data)
    }
}

// ---------------------------------------------------------------------------
// Hierarchical
// ---------------------------------------------------------------------------

/// Agglomerative sweep settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchicalGrid {
    /// Smallest k tried.
    pub k_min: usize,
    /// Largest k tried (inclusive).
    pub k_max: usize,
    /// Linkages tried for every k.
    pub linkages: Vec<Linkage>,
    /// Rows fit in the final fit; the condensed distance matrix is n².
    pub final_fit_size: usize,
}

impl Default for HierarchicalGrid {
    fn default() -> Self {
        Self {
            k_min: 2,
            k_max: 10,
            linkages: vec![Linkage::Ward, Linkage::Complete, Linkage::Average, Linkage::Single],
            final_fit_size: 10_000,
        }
    }
}

impl HierarchicalGrid {
    /// Reject empty ranges.
    pub fn validate(&self) -> Result<()> {
        check_range("hierarchical.k", self.k_min, self.k_max)?;
        if self.linkages.is_empty() {
            return Err(Error::InvalidParameter {
                name: "hierarchical.linkages",
                message: "at least one linkage is required".into(),
            });
        }
        check_fit_size("hierarchical.final_fit_size", self.final_fit_size)
    }
}

/// Agglomerative clustering over k × linkage.
#[derive(Debug, Clone)]
pub struct HierarchicalFamily {
    grid: HierarchicalGrid,
}

impl HierarchicalFamily {
    /// Create the family.
    pub fn new(grid: HierarchicalGrid) -> Self {
        Self { grid }
    }
}

impl Tunable for HierarchicalFamily {
    fn name(&self) -> &str {
        "hierarchical"
    }

    fn supported_param_grid(&self) -> Vec<Params> {
        let mut grid = Vec::new();
        for k in self.grid.k_min..=self.grid.k_max {
            for linkage in &self.grid.linkages {
                grid.push(params([
                    ("n_clusters", k.into()),
                    ("linkage", linkage.as_str().into()),
                ]));
            }
        }
        grid
    }

    fn fit_predict(&self, data: ArrayView2<'_, f64>, params: &Params) -> Result<Vec<Label>> {
        HierarchicalClustering::new(param_usize(params, "n_clusters")?)
            .with_linkage(Linkage::parse(param_text(params, "linkage")?)?)
            .fit_predict(data)
    }

    fn final_fit_size(&self) -> Option<usize> {
        Some(self.grid.final_fit_size)
    }
}

// ---------------------------------------------------------------------------
// GMM
// ---------------------------------------------------------------------------

/// Gaussian-mixture sweep settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmmGrid {
    /// Smallest component count tried.
    pub k_min: usize,
    /// Largest component count tried (inclusive).
    pub k_max: usize,
    /// Covariance structures tried for every k.
    pub covariance_types: Vec<CovarianceType>,
    /// EM restarts per fit.
    pub n_init: usize,
}

impl Default for GmmGrid {
    fn default() -> Self {
        Self {
            k_min: 2,
            k_max: 10,
            covariance_types: vec![CovarianceType::Diag, CovarianceType::Spherical],
            n_init: 2,
        }
    }
}

impl GmmGrid {
    /// Reject empty ranges.
    pub fn validate(&self) -> Result<()> {
        check_range("gmm.k", self.k_min, self.k_max)?;
        if self.covariance_types.is_empty() {
            return Err(Error::InvalidParameter {
                name: "gmm.covariance_types",
                message: "at least one covariance type is required".into(),
            });
        }
        Ok(())
    }
}

/// Gaussian mixtures over k × covariance type.
#[derive(Debug, Clone)]
pub struct GmmFamily {
    grid: GmmGrid,
    seed: u64,
}

impl GmmFamily {
    /// Create the family.
    pub fn new(grid: GmmGrid, seed: u64) -> Self {
        Self { grid, seed }
    }
}

impl Tunable for GmmFamily {
    fn name(&self) -> &str {
        "gmm"
    }

    fn supported_param_grid(&self) -> Vec<Params> {
        let mut grid = Vec::new();
        for k in self.grid.k_min..=self.grid.k_max {
            for cov in &self.grid.covariance_types {
                grid.push(params([
                    ("n_components", k.into()),
                    ("covariance_type", cov.as_str().into()),
                ]));
            }
        }
        grid
    }

    fn fit_predict(&self, data: ArrayView2<'_, f64>, params: &Params) -> Result<Vec<Label>> {
        Gmm::new()
            .with_n_components(param_usize(params, "n_components")?)
            .with_covariance(CovarianceType::parse(param_text(params, "covariance_type")?)?)
            .with_n_init(self.grid.n_init)
            .with_seed(self.seed)
            .fit_predict(data)
    }
}

// ---------------------------------------------------------------------------
// Spectral
// ---------------------------------------------------------------------------

/// Spectral sweep settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralGrid {
    /// Smallest k tried.
    pub k_min: usize,
    /// Largest k tried (inclusive).
    pub k_max: usize,
    /// RBF kernel widths.
    pub gammas: Vec<f64>,
    /// kNN neighbour counts.
    pub n_neighbors: Vec<usize>,
    /// Tuning-sample cap; the affinity matrix is n².
    pub sample_size: usize,
    /// Rows fit in the final fit.
    pub final_fit_size: usize,
}

impl Default for SpectralGrid {
    fn default() -> Self {
        Self {
            k_min: 3,
            k_max: 10,
            gammas: vec![0.5, 1.0],
            n_neighbors: vec![10, 15],
            sample_size: 6000,
            final_fit_size: 10_000,
        }
    }
}

impl SpectralGrid {
    /// Reject empty ranges and non-positive kernel parameters.
    pub fn validate(&self) -> Result<()> {
        check_range("spectral.k", self.k_min, self.k_max)?;
        if self.gammas.is_empty() && self.n_neighbors.is_empty() {
            return Err(Error::InvalidParameter {
                name: "spectral",
                message: "need at least one gamma or n_neighbors value".into(),
            });
        }
        if self.gammas.iter().any(|&g| g.is_nan() || g <= 0.0) {
            return Err(Error::InvalidParameter {
                name: "spectral.gammas",
                message: "every gamma must be positive".into(),
            });
        }
        if self.n_neighbors.contains(&0) {
            return Err(Error::InvalidParameter {
                name: "spectral.n_neighbors",
                message: "every n_neighbors must be > 0".into(),
            });
        }
        check_fit_size("spectral.final_fit_size", self.final_fit_size)
    }
}

/// Spectral clustering over k × (kNN neighbours ∪ RBF gammas).
#[derive(Debug, Clone)]
pub struct SpectralFamily {
    grid: SpectralGrid,
    seed: u64,
}

impl SpectralFamily {
    /// Create the family.
    pub fn new(grid: SpectralGrid, seed: u64) -> Self {
        Self { grid, seed }
    }
}

impl Tunable for SpectralFamily {
    fn name(&self) -> &str {
        "spectral"
    }

    fn supported_param_grid(&self) -> Vec<Params> {
        let mut grid = Vec::new();
        for k in self.grid.k_min..=self.grid.k_max {
            for &n_neighbors in &self.grid.n_neighbors {
                grid.push(params([
                    ("n_clusters", k.into()),
                    ("affinity", "nearest_neighbors".into()),
                    ("n_neighbors", n_neighbors.into()),
                ]));
            }
            for &gamma in &self.grid.gammas {
                grid.push(params([
                    ("n_clusters", k.into()),
                    ("affinity", "rbf".into()),
                    ("gamma", gamma.into()),
                ]));
            }
        }
        grid
    }

    fn fit_predict(&self, data: ArrayView2<'_, f64>, params: &Params) -> Result<Vec<Label>> {
        let affinity = match param_text(params, "affinity")? {
            "rbf" => Affinity::Rbf {
                gamma: param_f64(params, "gamma")?,
            },
            "nearest_neighbors" => Affinity::Knn {
                n_neighbors: param_usize(params, "n_neighbors")?,
            },
            other => {
                return Err(Error::InvalidParameter {
                    name: "affinity",
                    message: format!("unknown affinity '{other}'"),
                })
            }
        };
        SpectralClustering::new(param_usize(params, "n_clusters")?)
            .with_affinity(affinity)
            .with_seed(self.seed)
            .fit_predict(data)
    }

    fn sample_size(&self) -> Option<usize> {
        Some(self.grid.sample_size)
    }

    fn final_fit_size(&self) -> Option<usize> {
        Some(self.grid.final_fit_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::count_clusters;
    use ndarray::Array2;

    fn three_blobs() -> Array2<f64> {
        Array2::from_shape_fn((30, 2), |(i, j)| {
            let center = (i / 10) as f64 * 10.0;
            center + ((i * 7 + j * 3) % 5) as f64 * 0.1
        })
    }

    #[test]
    fn test_grid_sizes() {
        assert_eq!(KmeansFamily::new(KmeansGrid::default(), 42).supported_param_grid().len(), 18);
        assert_eq!(HierarchicalFamily::new(HierarchicalGrid::default()).supported_param_grid().len(), 36);
        assert_eq!(GmmFamily::new(GmmGrid::default(), 42).supported_param_grid().len(), 18);
        assert_eq!(SpectralFamily::new(SpectralGrid::default(), 42).supported_param_grid().len(), 32);
        assert_eq!(DbscanFamily::new(DbscanGrid::default(), 42).supported_param_grid().len(), 50);
    }

    #[test]
    fn test_dbscan_draws_are_seeded_and_in_range() {
        let family = DbscanFamily::new(DbscanGrid::default(), 42);
        let a = family.supported_param_grid();
        assert_eq!(a, family.supported_param_grid());

        for p in &a {
            let eps = param_f64(p, "eps").unwrap();
            let ms = param_usize(p, "min_samples").unwrap();
            assert!((0.3..1.2).contains(&eps));
            assert!((3..15).contains(&ms));
            assert!(DbscanMetric::parse(param_text(p, "metric").unwrap()).is_ok());
        }

        let other = DbscanFamily::new(DbscanGrid::default(), 7).supported_param_grid();
        assert_ne!(a, other);
    }

    #[test]
    fn test_invalid_dbscan_grid_yields_no_trials() {
        let grid = DbscanGrid {
            eps_min: 1.0,
            eps_max: 0.5,
            ..DbscanGrid::default()
        };
        assert!(grid.validate().is_err());
        assert!(DbscanFamily::new(grid, 1).supported_param_grid().is_empty());
    }

    #[test]
    fn test_every_family_fits_its_own_grid_entries() {
        let data = three_blobs();
        let families: Vec<Box<dyn Tunable>> = vec![
            Box::new(KmeansFamily::new(KmeansGrid { k_min: 3, k_max: 3, ..KmeansGrid::default() }, 1)),
            Box::new(HierarchicalFamily::new(HierarchicalGrid {
                k_min: 3,
                k_max: 3,
                ..HierarchicalGrid::default()
            })),
            Box::new(GmmFamily::new(GmmGrid { k_min: 3, k_max: 3, ..GmmGrid::default() }, 1)),
            Box::new(SpectralFamily::new(
                SpectralGrid {
                    k_min: 3,
                    k_max: 3,
                    n_neighbors: vec![5],
                    gammas: vec![1.0],
                    ..SpectralGrid::default()
                },
                1,
            )),
        ];

        for family in &families {
            for params in family.supported_param_grid() {
                let labels = family.fit_predict(data.view(), &params).unwrap();
                assert_eq!(labels.len(), 30, "{}", family.name());
                assert_eq!(count_clusters(&labels), 3, "{} {:?}", family.name(), params);
            }
        }
    }

    #[test]
    fn test_dbscan_family_fit() {
        let family = DbscanFamily::new(DbscanGrid::default(), 1);
        let p = params([
            ("eps", ParamValue::Float(1.0)),
            ("min_samples", 3usize.into()),
            ("metric", "euclidean".into()),
        ]);
        let labels = family.fit_predict(three_blobs().view(), &p).unwrap();
        assert_eq!(count_clusters(&labels), 3);
    }

    #[test]
    fn test_bad_params_are_errors() {
        let family = SpectralFamily::new(SpectralGrid::default(), 1);
        let p = params([("n_clusters", 3usize.into()), ("affinity", "precomputed".into())]);
        assert!(family.fit_predict(three_blobs().view(), &p).is_err());

        let family = GmmFamily::new(GmmGrid::default(), 1);
        let p = params([("n_components", 3usize.into()), ("covariance_type", "full".into())]);
        assert!(family.fit_predict(three_blobs().view(), &p).is_err());
    }

    #[test]
    fn test_grid_validation() {
        assert!(KmeansGrid { k_min: 0, ..KmeansGrid::default() }.validate().is_err());
        assert!(GmmGrid { k_min: 5, k_max: 4, ..GmmGrid::default() }.validate().is_err());
        assert!(SpectralGrid { gammas: vec![-1.0], ..SpectralGrid::default() }.validate().is_err());
        assert!(HierarchicalGrid { linkages: vec![], ..HierarchicalGrid::default() }.validate().is_err());
        assert!(DbscanGrid::default().validate().is_ok());
    }
}
