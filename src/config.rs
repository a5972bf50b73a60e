//! TOML configuration.
//!
//! Every section and field has a default, so an empty file (or no file) is a
//! valid configuration.
//!
//! ```toml
//! features = ["danceability", "energy", "valence", "tempo"]
//!
//! [preprocess]
//! variance_threshold = 0.95
//!
//! [kmeans]
//! k_min = 4
//! k_max = 12
//!
//! [dbscan]
//! metrics = ["cosine"]
//!
//! [recommend]
//! missing_features = "fill_zero"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::preprocess::PreprocessConfig;
use crate::recommend::RecommendConfig;
use crate::tuning::{DbscanGrid, GmmGrid, HierarchicalGrid, KmeansGrid, SpectralGrid, TuningConfig};

/// Audio features used when no list is configured.
pub const DEFAULT_FEATURES: [&str; 10] = [
    "danceability",
    "energy",
    "loudness",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
    "tempo",
    "duration_ms",
];

/// Full configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feature names, in pipeline column order.
    pub features: Vec<String>,
    /// Scaling and reduction.
    pub preprocess: PreprocessConfig,
    /// Sweep sampling.
    pub tuning: TuningConfig,
    /// K-means grid.
    pub kmeans: KmeansGrid,
    /// DBSCAN random search.
    pub dbscan: DbscanGrid,
    /// Agglomerative grid.
    pub hierarchical: HierarchicalGrid,
    /// Gaussian-mixture grid.
    pub gmm: GmmGrid,
    /// Spectral grid.
    pub spectral: SpectralGrid,
    /// Serving.
    pub recommend: RecommendConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            features: DEFAULT_FEATURES.iter().map(|s| s.to_string()).collect(),
            preprocess: PreprocessConfig::default(),
            tuning: TuningConfig::default(),
            kmeans: KmeansGrid::default(),
            dbscan: DbscanGrid::default(),
            hierarchical: HierarchicalGrid::default(),
            gmm: GmmGrid::default(),
            spectral: SpectralGrid::default(),
            recommend: RecommendConfig::default(),
        }
    }
}

impl Config {
    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Like [`Self::load`], but a missing or broken file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to load {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.features.is_empty() {
            return Err(Error::Config("features must not be empty".into()));
        }
        for (i, name) in self.features.iter().enumerate() {
            if self.features[..i].contains(name) {
                return Err(Error::Config(format!("feature '{name}' listed twice")));
            }
        }

        let t = self.preprocess.variance_threshold;
        if self.preprocess.use_reduction && !(t > 0.0 && t <= 1.0) {
            return Err(Error::Config(format!(
                "preprocess.variance_threshold must be in (0, 1], got {t}"
            )));
        }
        if self.tuning.sample_size < 2 || self.tuning.evaluation_sample_size < 2 {
            return Err(Error::Config("tuning sample sizes must be at least 2".into()));
        }
        if self.spectral.sample_size < 2 {
            return Err(Error::Config("spectral.sample_size must be at least 2".into()));
        }

        let grids = [
            self.kmeans.validate(),
            self.dbscan.validate(),
            self.hierarchical.validate(),
            self.gmm.validate(),
            self.spectral.validate(),
        ];
        for check in grids {
            check.map_err(|e| Error::Config(e.to_string()))?;
        }
        Ok(())
    }
}
