//! Gaussian Mixture Model clustering.
//!
//! GMM provides **soft clustering** with probabilistic assignments; hard
//! labels are the argmax responsibility.
//!
//! # The Probabilistic Model
//!
//! ```text
//! P(x) = Σₖ πₖ × N(x | μₖ, Σₖ)
//! ```
//!
//! Σₖ is restricted to a diagonal matrix ([`CovarianceType::Diag`]) or a
//! scaled identity ([`CovarianceType::Spherical`]).
//!
//! # The EM Algorithm
//!
//! **E-step**: responsibilities
//! ```text
//! γₙₖ = πₖ × N(xₙ | μₖ, Σₖ) / Σⱼ πⱼ × N(xₙ | μⱼ, Σⱼ)
//! ```
//!
//! **M-step**: weighted means, variances and mixing weights.
//!
//! Iteration stops when the mean log-likelihood improves by less than `tol`.
//! EM converges to local maxima, so `n_init` seeded restarts are run and the
//! highest-likelihood one is kept.
//!
//! # Failure Modes
//!
//! - **Singular covariance**: small clusters collapse; `reg_covar` floors variances
//! - **Wrong K**: too many components overfit; too few underfit

use super::traits::{Clustering, Label, SoftClustering};
use crate::error::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::prelude::*;
use serde::{Deserialize, Serialize};

/// Covariance structure of each component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CovarianceType {
    /// One variance per component and feature.
    Diag,
    /// One variance per component, shared by all features.
    Spherical,
}

impl CovarianceType {
    /// Config / params spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            CovarianceType::Diag => "diag",
            CovarianceType::Spherical => "spherical",
        }
    }

    /// Parse the config / params spelling.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "diag" => Ok(CovarianceType::Diag),
            "spherical" => Ok(CovarianceType::Spherical),
            "full" | "tied" => Err(Error::InvalidParameter {
                name: "covariance_type",
                message: format!("'{s}' covariance is not supported (use diag or spherical)"),
            }),
            other => Err(Error::InvalidParameter {
                name: "covariance_type",
                message: format!("unknown covariance type '{other}'"),
            }),
        }
    }
}

/// Gaussian Mixture Model clustering.
#[derive(Debug, Clone)]
pub struct Gmm {
    /// Number of components (clusters).
    n_components: usize,
    /// Maximum EM iterations.
    max_iter: usize,
    /// Convergence tolerance on mean log-likelihood.
    tol: f64,
    /// Random seed.
    seed: Option<u64>,
    /// Regularization for covariance.
    reg_covar: f64,
    /// Covariance structure.
    covariance: CovarianceType,
    /// Independent restarts.
    n_init: usize,
}

struct EmRun {
    resp: Array2<f64>,
    log_likelihood: f64,
}

impl Gmm {
    /// Create a new GMM with 8 diagonal components.
    pub fn new() -> Self {
        Self {
            n_components: 8,
            max_iter: 100,
            tol: 1e-3,
            seed: None,
            reg_covar: 1e-6,
            covariance: CovarianceType::Diag,
            n_init: 1,
        }
    }

    /// Set number of components.
    pub fn with_n_components(mut self, n: usize) -> Self {
        self.n_components = n;
        self
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

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set covariance structure.
    pub fn with_covariance(mut self, covariance: CovarianceType) -> Self {
        self.covariance = covariance;
        self
    }

    /// Set the number of restarts (at least 1).
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }

    /// Compute log-likelihood of a point under a diagonal Gaussian.
    fn log_gaussian(
        point: ArrayView1<'_, f64>,
        mean: ArrayView1<'_, f64>,
        var: ArrayView1<'_, f64>,
    ) -> f64 {
        let d = point.len() as f64;
        let mut log_prob = -0.5 * d * (2.0 * std::f64::consts::PI).ln();

        for i in 0..point.len() {
            let diff = point[i] - mean[i];
            log_prob -= 0.5 * var[i].ln();
            log_prob -= 0.5 * diff * diff / var[i];
        }

        log_prob
    }

    /// Log-sum-exp for numerical stability.
    fn logsumexp(values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NEG_INFINITY;
        }
        let max_val = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if max_val.is_infinite() {
            return max_val;
        }
        max_val
            + values
                .iter()
                .map(|&v| (v - max_val).exp())
                .sum::<f64>()
                .ln()
    }

    /// Fill `resp` and return the mean log-likelihood.
    fn e_step(
        data: ArrayView2<'_, f64>,
        means: &Array2<f64>,
        variances: &Array2<f64>,
        weights: &Array1<f64>,
        resp: &mut Array2<f64>,
    ) -> f64 {
        let n = data.nrows();
        let k = weights.len();
        let mut log_probs = vec![0.0; k];
        let mut total = 0.0;

        for i in 0..n {
            let point = data.row(i);
            for c in 0..k {
                log_probs[c] = weights[c].max(f64::MIN_POSITIVE).ln()
                    + Self::log_gaussian(point, means.row(c), variances.row(c));
            }

            let log_sum = Self::logsumexp(&log_probs);
            total += log_sum;

            for c in 0..k {
                resp[[i, c]] = (log_probs[c] - log_sum).exp();
            }
        }

        total / n as f64
    }

    fn run_once(&self, data: ArrayView2<'_, f64>, k: usize, rng: &mut impl Rng) -> EmRun {
        let n = data.nrows();
        let d = data.ncols();

        // Means: k distinct rows
        let mut means = Array2::zeros((k, d));
        for (c, idx) in rand::seq::index::sample(rng, n, k).into_iter().enumerate() {
            means.row_mut(c).assign(&data.row(idx));
        }

        // Variances: start from the data variance
        let data_var = data.var_axis(Axis(0), 0.0).mapv(|v| v.max(self.reg_covar));
        let mut variances = Array2::zeros((k, d));
        for mut row in variances.rows_mut() {
            row.assign(&data_var);
        }
        if self.covariance == CovarianceType::Spherical {
            Self::make_spherical(&mut variances);
        }

        let mut weights = Array1::from_elem(k, 1.0 / k as f64);
        let mut resp = Array2::zeros((n, k));
        let mut log_likelihood = f64::NEG_INFINITY;

        for _iter in 0..self.max_iter {
            let current = Self::e_step(data, &means, &variances, &weights, &mut resp);
            let converged = (current - log_likelihood).abs() < self.tol;
            log_likelihood = current;
            if converged {
                break;
            }

            // M-step
            let resp_sum: Vec<f64> = (0..k).map(|c| resp.column(c).sum()).collect();
            let total: f64 = resp_sum.iter().sum();

            for c in 0..k {
                weights[c] = resp_sum[c] / total;
            }

            let mut new_means = Array2::zeros((k, d));
            for c in 0..k {
                if resp_sum[c] > 1e-10 {
                    for i in 0..n {
                        for j in 0..d {
                            new_means[[c, j]] += resp[[i, c]] * data[[i, j]];
                        }
                    }
                    for j in 0..d {
                        new_means[[c, j]] /= resp_sum[c];
                    }
                } else {
                    new_means.row_mut(c).assign(&means.row(c));
                }
            }

            let mut new_variances = Array2::from_elem((k, d), self.reg_covar);
            for c in 0..k {
                if resp_sum[c] > 1e-10 {
                    for i in 0..n {
                        for j in 0..d {
                            let diff = data[[i, j]] - new_means[[c, j]];
                            new_variances[[c, j]] += resp[[i, c]] * diff * diff;
                        }
                    }
                    for j in 0..d {
                        new_variances[[c, j]] /= resp_sum[c];
                        new_variances[[c, j]] = new_variances[[c, j]].max(self.reg_covar);
                    }
                } else {
                    new_variances.row_mut(c).assign(&variances.row(c));
                }
            }
            if self.covariance == CovarianceType::Spherical {
                Self::make_spherical(&mut new_variances);
            }

            means = new_means;
            variances = new_variances;
        }

        EmRun {
            resp,
            log_likelihood,
        }
    }

    fn make_spherical(variances: &mut Array2<f64>) {
        for mut row in variances.rows_mut() {
            let mean = row.mean().unwrap_or(1.0);
            row.fill(mean);
        }
    }

    fn fit_best(&self, data: ArrayView2<'_, f64>) -> Result<EmRun> {
        let n = data.nrows();
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        let k = self.n_components;
        if k == 0 {
            return Err(Error::InvalidParameter {
                name: "n_components",
                message: "must be > 0".into(),
            });
        }
        if k > n {
            return Err(Error::InvalidClusterCount {
                requested: k,
                n_items: n,
            });
        }

        let mut rng: Box<dyn RngCore> = match self.seed {
            Some(s) => Box::new(StdRng::seed_from_u64(s)),
            None => Box::new(rand::rng()),
        };

        let mut best: Option<EmRun> = None;
        for _ in 0..self.n_init {
            let run = self.run_once(data, k, &mut rng);
            match &best {
                Some(b) if b.log_likelihood >= run.log_likelihood => {}
                _ => best = Some(run),
            }
        }
        best.ok_or(Error::EmptyInput)
    }
}

impl Default for Gmm {
    fn default() -> Self {
        Self::new()
    }
}

impl Clustering for Gmm {
    fn fit_predict(&self, data: ArrayView2<'_, f64>) -> Result<Vec<Label>> {
        let run = self.fit_best(data)?;

        // Hard assignment: argmax
        Ok(run
            .resp
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(i, _)| i as Label)
                    .unwrap_or(0)
            })
            .collect())
    }

    fn n_clusters(&self) -> usize {
        self.n_components
    }
}

impl SoftClustering for Gmm {
    fn fit_predict_proba(&self, data: ArrayView2<'_, f64>) -> Result<Vec<Vec<f64>>> {
        let run = self.fit_best(data)?;
        Ok(run.resp.rows().into_iter().map(|row| row.to_vec()).collect())
    }
}
