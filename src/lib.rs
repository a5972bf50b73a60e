//! # cadence
//!
//! Audio-feature clustering and similar-track recommendation.
//!
//! Training turns a [`Catalog`] of tracks into a fitted [`Pipeline`]
//! (standardisation plus optional PCA) and one label assignment per
//! clustering family, each tuned by an internal-metric sweep. Serving loads
//! both and answers "tracks like this one" through a [`Recommender`].
//!
//! ```
//! use cadence::{train, Catalog, Config, RecommendConfig, Recommender, Track};
//! use cadence::tuning::KmeansGrid;
//!
//! let tracks = (0..30)
//!     .map(|i| {
//!         let c = (i / 10) as f64;
//!         Track::new(format!("t{i}"))
//!             .with_feature("energy", c + (i % 3) as f64 * 0.01)
//!             .with_feature("tempo", 100.0 + 25.0 * c)
//!     })
//!     .collect();
//! let mut catalog = Catalog::new(tracks)?;
//!
//! let config = Config {
//!     features: vec!["energy".into(), "tempo".into()],
//!     kmeans: KmeansGrid { k_min: 2, k_max: 4, ..KmeansGrid::default() },
//!     ..Config::default()
//! };
//! let report = train(&mut catalog, &config)?;
//!
//! let rec = Recommender::new(report.pipeline, catalog, RecommendConfig::default())?;
//! let similar = rec.recommend("t4", "kmeans", 3, "cluster_knn")?;
//! assert_eq!(similar.len(), 3);
//! # Ok::<(), cadence::Error>(())
//! ```
//!
//! Features:
//! - `parallel` (default): rayon for sweeps, k-means assignment, silhouette
//!   and kNN scoring.

pub mod artifact;
pub mod catalog;
pub mod cluster;
pub mod config;
/// Error types used across `cadence`.
pub mod error;
pub mod evaluation;
pub mod preprocess;
pub mod recommend;
pub mod training;
pub mod tuning;


pub use catalog::{Catalog, Track};
pub use cluster::{Clustering, Label, SoftClustering, NOISE};
pub use config::Config;
pub use error::{Error, Result};
pub use evaluation::{Evaluation, Evaluator};
pub use preprocess::{Pipeline, PreprocessConfig};
pub use recommend::{
    MissingFeaturePolicy, Mode, RecommendConfig, Recommendation, Recommender,
};
pub use training::{train, FamilyReport, TrainingReport};
pub use tuning::{ParamValue, Params, Sweep, Trial, Tunable};
