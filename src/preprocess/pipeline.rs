//! Fitted scale-then-reduce pipeline.
//!
//! A [`Pipeline`] is fit once on the training catalog and reused unchanged for
//! every inference call. It carries the exact feature-name list it was fit
//! with, plus a SHA-256 fingerprint of that list, so a pipeline can never be
//! silently applied to columns in a different order.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::pca::Pca;
use super::scaler::StandardScaler;
use crate::catalog::{feature_matrix, Track};
use crate::error::{Error, Result};

/// Separator used when hashing feature names; cannot appear in a sane name.
const NAME_SEPARATOR: u8 = 0x1f;

/// Preprocessing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Apply PCA after scaling.
    pub use_reduction: bool,
    /// Cumulative explained-variance target for PCA, in (0, 1].
    pub variance_threshold: f64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            use_reduction: true,
            variance_threshold: 0.9,
        }
    }
}

/// Hex SHA-256 of an ordered feature-name list.
pub fn feature_fingerprint(names: &[String]) -> String {
    let mut hasher = Sha256::new();
    for name in names {
        hasher.update(name.as_bytes());
        hasher.update([NAME_SEPARATOR]);
    }
    format!("{:x}", hasher.finalize())
}

/// Standard scaler plus optional PCA, bound to a feature-name list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    feature_names: Vec<String>,
    fingerprint: String,
    scaler: StandardScaler,
    pca: Option<Pca>,
}

impl Pipeline {
    /// Fit on tracks. Every track must have every feature.
    pub fn fit(tracks: &[Track], feature_names: &[String], config: &PreprocessConfig) -> Result<Self> {
        let raw = feature_matrix(tracks, feature_names)?;
        Self::fit_matrix(raw.view(), feature_names, config)
    }

    /// Fit on a raw matrix whose columns follow `feature_names`.
    pub fn fit_matrix(
        raw: ArrayView2<'_, f64>,
        feature_names: &[String],
        config: &PreprocessConfig,
    ) -> Result<Self> {
        Self::fit_transform(raw, feature_names, config).map(|(pipeline, _)| pipeline)
    }

    /// Fit and return the transformed training matrix.
    pub fn fit_transform(
        raw: ArrayView2<'_, f64>,
        feature_names: &[String],
        config: &PreprocessConfig,
    ) -> Result<(Self, Array2<f64>)> {
        if feature_names.is_empty() || raw.nrows() == 0 {
            return Err(Error::EmptyInput);
        }
        if raw.ncols() != feature_names.len() {
            return Err(Error::DimensionMismatch {
                expected: feature_names.len(),
                found: raw.ncols(),
            });
        }
        for (i, name) in feature_names.iter().enumerate() {
            if feature_names[..i].contains(name) {
                return Err(Error::InvalidParameter {
                    name: "features",
                    message: format!("feature '{name}' listed twice"),
                });
            }
        }
        if raw.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "data",
                message: "non-finite value in training matrix".into(),
            });
        }

        let scaler = StandardScaler::fit(raw)?;
        let scaled = scaler.transform(raw)?;

        let (pca, out) = if config.use_reduction {
            let pca = Pca::fit(scaled.view(), config.variance_threshold)?;
            let reduced = pca.transform(scaled.view())?;
            (Some(pca), reduced)
        } else {
            (None, scaled)
        };

        log::info!(
            "fitted pipeline on {} rows: {} features -> {} dims{}",
            raw.nrows(),
            feature_names.len(),
            out.ncols(),
            if pca.is_some() { " (pca)" } else { "" }
        );

        let pipeline = Self {
            feature_names: feature_names.to_vec(),
            fingerprint: feature_fingerprint(feature_names),
            scaler,
            pca,
        };
        Ok((pipeline, out))
    }

    /// Feature names, in column order.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Fingerprint of [`Self::feature_names`].
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Width of raw input rows.
    pub fn input_dim(&self) -> usize {
        self.feature_names.len()
    }

    /// Width of transformed rows.
    pub fn output_dim(&self) -> usize {
        match &self.pca {
            Some(pca) => pca.n_components(),
            None => self.scaler.n_features(),
        }
    }

    /// Fitted scaler.
    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    /// Fitted PCA, if reduction is on.
    pub fn pca(&self) -> Option<&Pca> {
        self.pca.as_ref()
    }

    /// Check `names` is exactly the fit-time list, in order.
    pub fn verify_features(&self, names: &[String]) -> Result<()> {
        if names != self.feature_names.as_slice() {
            return Err(Error::TransformMismatch {
                expected: self.feature_names.join(","),
                found: names.join(","),
            });
        }
        Ok(())
    }

    /// Check the stored fingerprint still matches the stored names and the
    /// component shapes agree with each other.
    pub fn verify_integrity(&self) -> Result<()> {
        let actual = feature_fingerprint(&self.feature_names);
        if actual != self.fingerprint {
            return Err(Error::TransformMismatch {
                expected: self.fingerprint.clone(),
                found: actual,
            });
        }
        if self.scaler.n_features() != self.feature_names.len() {
            return Err(Error::DimensionMismatch {
                expected: self.feature_names.len(),
                found: self.scaler.n_features(),
            });
        }
        if let Some(pca) = &self.pca {
            if pca.n_features() != self.feature_names.len() {
                return Err(Error::DimensionMismatch {
                    expected: self.feature_names.len(),
                    found: pca.n_features(),
                });
            }
        }
        Ok(())
    }

    /// Transform a raw matrix whose columns follow [`Self::feature_names`].
    pub fn transform_matrix(&self, raw: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let scaled = self.scaler.transform(raw)?;
        match &self.pca {
            Some(pca) => pca.transform(scaled.view()),
            None => Ok(scaled),
        }
    }

    /// Transform one raw row.
    pub fn transform_row(&self, raw: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        let scaled = self.scaler.transform_row(raw)?;
        match &self.pca {
            Some(pca) => pca.transform_row(scaled.view()),
            None => Ok(scaled),
        }
    }

    /// Transform a track. Missing values become 0.0 in raw feature space.
    pub fn transform_track(&self, track: &Track) -> Result<Array1<f64>> {
        self.transform_row(self.raw_row(track).view())
    }

    /// Transform several tracks, zero-filling missing values.
    pub fn transform_tracks(&self, tracks: &[Track]) -> Result<Array2<f64>> {
        let mut raw = Array2::zeros((tracks.len(), self.input_dim()));
        for (i, track) in tracks.iter().enumerate() {
            raw.row_mut(i).assign(&self.raw_row(track));
        }
        self.transform_matrix(raw.view())
    }

    fn raw_row(&self, track: &Track) -> Array1<f64> {
        Array1::from_iter(
            self.feature_names
                .iter()
                .map(|name| track.feature(name).unwrap_or(0.0)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        ["energy", "valence", "tempo"].iter().map(|s| s.to_string()).collect()
    }

    fn tracks() -> Vec<Track> {
        (0..12)
            .map(|i| {
                let t = i as f64;
                Track::new(format!("t{i}"))
                    .with_feature("energy", t / 12.0)
                    .with_feature("valence", 1.0 - t / 12.0 + (i % 3) as f64 * 0.05)
                    .with_feature("tempo", 90.0 + 3.0 * t)
            })
            .collect()
    }

    #[test]
    fn test_fit_then_transform_reproduces_training_rows() {
        for use_reduction in [false, true] {
            let config = PreprocessConfig {
                use_reduction,
                variance_threshold: 0.95,
            };
            let raw = feature_matrix(&tracks(), &names()).unwrap();
            let (pipeline, fitted) = Pipeline::fit_transform(raw.view(), &names(), &config).unwrap();

            let again = pipeline.transform_tracks(&tracks()).unwrap();
            assert_eq!(again.dim(), fitted.dim());
            for (a, b) in again.iter().zip(fitted.iter()) {
                assert!((a - b).abs() < 1e-9);
            }

            let single = pipeline.transform_track(&tracks()[5]).unwrap();
            for (a, b) in single.iter().zip(fitted.row(5).iter()) {
                assert!((a - b).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_output_dim() {
        let no_pca = PreprocessConfig {
            use_reduction: false,
            ..PreprocessConfig::default()
        };
        let pipeline = Pipeline::fit(&tracks(), &names(), &no_pca).unwrap();
        assert_eq!(pipeline.output_dim(), 3);

        let pca = Pipeline::fit(&tracks(), &names(), &PreprocessConfig::default()).unwrap();
        assert!(pca.output_dim() >= 1 && pca.output_dim() <= 3);
    }

    #[test]
    fn test_missing_value_at_fit_time() {
        let mut data = tracks();
        data[4] = Track::new("t4").with_feature("energy", 0.2).with_feature("tempo", 100.0);
        let err = Pipeline::fit(&data, &names(), &PreprocessConfig::default()).unwrap_err();
        assert_eq!(
            err,
            Error::MissingValue {
                track_id: "t4".into(),
                feature: "valence".into()
            }
        );
    }

    #[test]
    fn test_missing_value_at_inference_is_zero_filled() {
        let pipeline = Pipeline::fit(&tracks(), &names(), &PreprocessConfig::default()).unwrap();
        let partial = Track::new("q").with_feature("energy", 0.0).with_feature("tempo", 0.0);
        let zeros = Track::new("z")
            .with_feature("energy", 0.0)
            .with_feature("valence", 0.0)
            .with_feature("tempo", 0.0);
        assert_eq!(
            pipeline.transform_track(&partial).unwrap(),
            pipeline.transform_track(&zeros).unwrap()
        );
    }

    #[test]
    fn test_verify_features_detects_reorder() {
        let pipeline = Pipeline::fit(&tracks(), &names(), &PreprocessConfig::default()).unwrap();
        assert!(pipeline.verify_features(&names()).is_ok());

        let mut swapped = names();
        swapped.swap(0, 1);
        assert!(matches!(
            pipeline.verify_features(&swapped),
            Err(Error::TransformMismatch { .. })
        ));
    }

    #[test]
    fn test_fingerprint_depends_on_order() {
        let a = feature_fingerprint(&names());
        let mut swapped = names();
        swapped.swap(1, 2);
        assert_ne!(a, feature_fingerprint(&swapped));
        assert_eq!(a.len(), 64);
        // "ab","c" and "a","bc" must not collide.
        assert_ne!(
            feature_fingerprint(&["ab".to_string(), "c".to_string()]),
            feature_fingerprint(&["a".to_string(), "bc".to_string()])
        );
    }

    #[test]
    fn test_duplicate_feature_names_rejected() {
        let dup: Vec<String> = vec!["energy".into(), "energy".into()];
        let raw = ndarray::array![[1.0, 1.0], [2.0, 2.0]];
        assert!(Pipeline::fit_matrix(raw.view(), &dup, &PreprocessConfig::default()).is_err());
    }
}
