//! Principal component analysis with a retained-variance target.
//!
//! Components come from the eigendecomposition of the sample covariance
//! (n − 1 denominator), sorted by descending eigenvalue. The number kept is
//! the smallest `k` whose cumulative explained-variance ratio reaches the
//! threshold.
//!
//! Eigenvectors are only defined up to sign, so each component is flipped to
//! make its largest-magnitude loading positive. Refitting the same data gives
//! the same projection.

use faer::Mat;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fitted PCA projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pca {
    mean: Vec<f64>,
    /// k rows of d loadings.
    components: Vec<Vec<f64>>,
    explained_variance: Vec<f64>,
    explained_variance_ratio: Vec<f64>,
}

impl Pca {
    /// Fit on `data`, keeping enough components to explain
    /// `variance_threshold` of the total variance.
    pub fn fit(data: ArrayView2<'_, f64>, variance_threshold: f64) -> Result<Self> {
        if variance_threshold.is_nan() || variance_threshold <= 0.0 || variance_threshold > 1.0 {
            return Err(Error::InvalidParameter {
                name: "variance_threshold",
                message: format!("must be in (0, 1], got {variance_threshold}"),
            });
        }
        let n = data.nrows();
        let d = data.ncols();
        if n == 0 || d == 0 {
            return Err(Error::EmptyInput);
        }
        if n < 2 {
            return Err(Error::InvalidParameter {
                name: "data",
                message: "PCA needs at least two rows".into(),
            });
        }

        let mean = data.mean_axis(Axis(0)).ok_or(Error::EmptyInput)?;
        let centered = &data - &mean;
        let cov = centered.t().dot(&centered) / (n as f64 - 1.0);

        let cov_mat = Mat::<f64>::from_fn(d, d, |i, j| cov[[i, j]]);
        let evd = cov_mat
            .self_adjoint_eigen(faer::Side::Lower)
            .map_err(|e| Error::Decomposition(format!("{e:?}")))?;
        let u = evd.U();
        let s = evd.S().column_vector();

        let mut order: Vec<usize> = (0..d).collect();
        order.sort_by(|&a, &b| s[b].partial_cmp(&s[a]).unwrap_or(std::cmp::Ordering::Equal));

        // Round-off can push null eigenvalues slightly negative.
        let eigenvalues: Vec<f64> = order.iter().map(|&j| s[j].max(0.0)).collect();
        let total: f64 = eigenvalues.iter().sum();
        let ratios: Vec<f64> = if total > 0.0 {
            eigenvalues.iter().map(|&v| v / total).collect()
        } else {
            vec![0.0; d]
        };

        let k = if total > 0.0 {
            let mut cumulative = 0.0;
            let mut keep = d;
            for (i, &r) in ratios.iter().enumerate() {
                cumulative += r;
                if cumulative >= variance_threshold - 1e-12 {
                    keep = i + 1;
                    break;
                }
            }
            keep
        } else {
            // Constant data: every direction explains nothing.
            1
        };

        let components: Vec<Vec<f64>> = order
            .iter()
            .take(k)
            .map(|&col| {
                let mut v: Vec<f64> = (0..d).map(|i| u[(i, col)]).collect();
                let pivot = v
                    .iter()
                    .copied()
                    .fold(0.0_f64, |best, x| if x.abs() > best.abs() { x } else { best });
                if pivot < 0.0 {
                    v.iter_mut().for_each(|x| *x = -*x);
                }
                v
            })
            .collect();

        log::debug!(
            "pca kept {k}/{d} components ({:.3} of variance)",
            ratios.iter().take(k).sum::<f64>()
        );

        Ok(Self {
            mean: mean.to_vec(),
            components,
            explained_variance: eigenvalues.into_iter().take(k).collect(),
            explained_variance_ratio: ratios.into_iter().take(k).collect(),
        })
    }

    /// Number of input features.
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Number of retained components.
    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    /// Component loadings, one row per retained component.
    pub fn components(&self) -> &[Vec<f64>] {
        &self.components
    }

    /// Variance along each retained component.
    pub fn explained_variance(&self) -> &[f64] {
        &self.explained_variance
    }

    /// Share of total variance along each retained component.
    pub fn explained_variance_ratio(&self) -> &[f64] {
        &self.explained_variance_ratio
    }

    /// Project a matrix onto the retained components.
    pub fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.check_width(data.ncols())?;
        let mut out = Array2::zeros((data.nrows(), self.n_components()));
        for (i, row) in data.rows().into_iter().enumerate() {
            out.row_mut(i).assign(&self.project(row));
        }
        Ok(out)
    }

    /// Project one row.
    pub fn transform_row(&self, row: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        self.check_width(row.len())?;
        Ok(self.project(row))
    }

    fn project(&self, row: ArrayView1<'_, f64>) -> Array1<f64> {
        Array1::from_iter(self.components.iter().map(|c| {
            c.iter()
                .zip(row.iter().zip(self.mean.iter()))
                .map(|(w, (x, m))| w * (x - m))
                .sum::<f64>()
        }))
    }

    fn check_width(&self, found: usize) -> Result<()> {
        if found != self.n_features() {
            return Err(Error::DimensionMismatch {
                expected: self.n_features(),
                found,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Points on the line y = 2x plus a little noise on a third axis.
    fn nearly_one_dimensional() -> Array2<f64> {
        Array2::from_shape_fn((20, 3), |(i, j)| {
            let t = i as f64;
            match j {
                0 => t,
                1 => 2.0 * t,
                _ => if i % 2 == 0 { 0.01 } else { -0.01 },
            }
        })
    }

    #[test]
    fn test_pca_keeps_dominant_direction() {
        let data = nearly_one_dimensional();
        let pca = Pca::fit(data.view(), 0.9).unwrap();
        assert_eq!(pca.n_components(), 1);
        assert!(pca.explained_variance_ratio()[0] > 0.99);

        // Loading is ±(1, 2, 0)/√5, sign fixed positive.
        let c = &pca.components()[0];
        let inv = 1.0 / 5.0_f64.sqrt();
        assert!((c[0] - inv).abs() < 1e-6);
        assert!((c[1] - 2.0 * inv).abs() < 1e-6);
    }

    #[test]
    fn test_pca_full_threshold_keeps_everything_needed() {
        let data = array![[1.0, 0.0], [-1.0, 0.0], [0.0, 1.0], [0.0, -1.0]];
        let pca = Pca::fit(data.view(), 1.0).unwrap();
        assert_eq!(pca.n_components(), 2);
        let total: f64 = pca.explained_variance_ratio().iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pca_deterministic() {
        let data = nearly_one_dimensional();
        assert_eq!(Pca::fit(data.view(), 0.95).unwrap(), Pca::fit(data.view(), 0.95).unwrap());
    }

    #[test]
    fn test_pca_row_matches_matrix() {
        let data = nearly_one_dimensional();
        let pca = Pca::fit(data.view(), 0.999).unwrap();
        let projected = pca.transform(data.view()).unwrap();
        let row = pca.transform_row(data.row(3)).unwrap();
        for (a, b) in row.iter().zip(projected.row(3).iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_pca_invalid_threshold() {
        let data = nearly_one_dimensional();
        assert!(Pca::fit(data.view(), 0.0).is_err());
        assert!(Pca::fit(data.view(), 1.5).is_err());
        assert!(Pca::fit(data.view(), f64::NAN).is_err());
    }

    #[test]
    fn test_pca_needs_two_rows() {
        let data = array![[1.0, 2.0]];
        assert!(Pca::fit(data.view(), 0.9).is_err());
    }
}
