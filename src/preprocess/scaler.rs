//! Per-feature standardization.
//!
//! `z = (x - mean) / scale`, where `scale` is the population standard
//! deviation (ddof = 0). Constant features get `scale = 1.0` so they map to 0
//! instead of NaN.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fitted standard scaler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    var: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Learn mean and variance of each column.
    pub fn fit(data: ArrayView2<'_, f64>) -> Result<Self> {
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(Error::EmptyInput);
        }

        let mean = data.mean_axis(Axis(0)).ok_or(Error::EmptyInput)?.to_vec();
        let var = data.var_axis(Axis(0), 0.0).to_vec();
        let scale = var
            .iter()
            .map(|&v| {
                let s = v.sqrt();
                if s > f64::EPSILON * 10.0 {
                    s
                } else {
                    1.0
                }
            })
            .collect();

        Ok(Self { mean, var, scale })
    }

    /// Number of input features.
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Column means.
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Column population variances.
    pub fn variance(&self) -> &[f64] {
        &self.var
    }

    /// Column divisors.
    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// Standardize a matrix.
    pub fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.check_width(data.ncols())?;
        let mut out = data.to_owned();
        for mut row in out.rows_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = (*v - self.mean[j]) / self.scale[j];
            }
        }
        Ok(out)
    }

    /// Standardize one row.
    pub fn transform_row(&self, row: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        self.check_width(row.len())?;
        Ok(Array1::from_iter(
            row.iter()
                .enumerate()
                .map(|(j, &v)| (v - self.mean[j]) / self.scale[j]),
        ))
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
