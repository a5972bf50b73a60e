//! Similar-track recommendation.
//!
//! A [`Recommender`] owns a fitted [`Pipeline`] and a labelled [`Catalog`].
//! Every track is projected once, at construction; requests only read.
//!
//! # Modes
//!
//! | Mode | Candidates | Ranking | Score |
//! |------|-----------|---------|-------|
//! | `cluster` | query's cluster | seeded random sample | [`CLUSTER_MODE_SCORE`] |
//! | `knn` | whole catalog | cosine similarity | cosine |
//! | `cluster_knn` | query's cluster | cosine similarity | cosine |
//!
//! `cluster_knn` falls back to `knn` when the query's cluster has no other
//! member. A query labelled [`NOISE`] is treated as a singleton cluster.
//!
//! # Example
//!
//! ```rust
//! use cadence::catalog::{Catalog, Track};
//! use cadence::preprocess::{Pipeline, PreprocessConfig};
//! use cadence::recommend::{Mode, RecommendConfig, Recommender};
//!
//! let names = vec!["energy".to_string(), "valence".to_string()];
//! let tracks: Vec<Track> = (0..6)
//!     .map(|i| {
//!         Track::new(format!("t{i}"))
//!             .with_feature("energy", i as f64)
//!             .with_feature("valence", (i % 2) as f64)
//!     })
//!     .collect();
//! let config = PreprocessConfig { use_reduction: false, ..PreprocessConfig::default() };
//! let pipeline = Pipeline::fit(&tracks, &names, &config).unwrap();
//! let mut catalog = Catalog::new(tracks).unwrap();
//! catalog.set_assignment("kmeans", vec![0, 0, 0, 1, 1, 1]).unwrap();
//!
//! let rec = Recommender::new(pipeline, catalog, RecommendConfig::default()).unwrap();
//! let out = rec.recommend_with("t0", "kmeans", 2, Mode::ClusterKnn).unwrap();
//! assert_eq!(out.len(), 2);
//! assert!(out.iter().all(|r| r.track_id == "t1" || r.track_id == "t2"));
//! ```

use std::fmt;
use std::path::Path;

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::artifact;
use crate::catalog::Catalog;
use crate::cluster::{cosine_similarity, NOISE};
use crate::error::{Error, Result};
use crate::preprocess::Pipeline;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Score given to every `cluster`-mode result.
///
/// Cluster mode does not rank, so this is a placeholder and is not comparable
/// with cosine scores from the other modes.
pub const CLUSTER_MODE_SCORE: f64 = 1.0;

/// Recommendation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Random members of the query's cluster.
    Cluster,
    /// Nearest neighbours over the whole catalog.
    Knn,
    /// Nearest neighbours within the query's cluster.
    ClusterKnn,
}

impl Mode {
    /// Wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Cluster => "cluster",
            Mode::Knn => "knn",
            Mode::ClusterKnn => "cluster_knn",
        }
    }

    /// Parse the wire spelling; anything else is [`Error::UnsupportedMode`].
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "cluster" => Ok(Mode::Cluster),
            "knn" => Ok(Mode::Knn),
            "cluster_knn" => Ok(Mode::ClusterKnn),
            other => Err(Error::UnsupportedMode(other.to_string())),
        }
    }

    fn uses_clusters(&self) -> bool {
        !matches!(self, Mode::Knn)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when the query track has missing features in a similarity mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFeaturePolicy {
    /// Log and return no recommendations.
    #[default]
    Empty,
    /// Use the zero-filled projection anyway.
    FillZero,
    /// Fail with [`Error::MissingFeatures`].
    Reject,
}

/// Serving settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendConfig {
    /// Seed for `cluster`-mode sampling.
    pub seed: u64,
    /// Missing-feature handling for `knn` and `cluster_knn`.
    pub missing_features: MissingFeaturePolicy,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            missing_features: MissingFeaturePolicy::Empty,
        }
    }
}

/// One recommended track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Recommended track id.
    pub track_id: String,
    /// Cosine similarity, or [`CLUSTER_MODE_SCORE`] in `cluster` mode.
    pub score: f64,
}

/// Read-only recommendation context.
#[derive(Debug, Clone)]
pub struct Recommender {
    pipeline: Pipeline,
    catalog: Catalog,
    projections: Array2<f64>,
    complete: Vec<bool>,
    config: RecommendConfig,
}

impl Recommender {
    /// Project every catalog track and build the context.
    ///
    /// Tracks with missing values are projected with zeros in their place.
    pub fn new(pipeline: Pipeline, catalog: Catalog, config: RecommendConfig) -> Result<Self> {
        let projections = pipeline.transform_tracks(catalog.tracks())?;
        let names = pipeline.feature_names();
        let complete: Vec<bool> = catalog.tracks().iter().map(|t| t.has_features(names)).collect();

        let incomplete = complete.iter().filter(|&&c| !c).count();
        if incomplete > 0 {
            log::warn!("{incomplete} of {} tracks have missing features", catalog.len());
        }
        log::info!(
            "recommender ready: {} tracks, {} dims, assignments [{}]",
            catalog.len(),
            projections.ncols(),
            catalog.assignment_names().collect::<Vec<_>>().join(", ")
        );

        Ok(Self {
            pipeline,
            catalog,
            projections,
            complete,
            config,
        })
    }

    /// Load a saved pipeline and catalog, checking the pipeline against
    /// `config.features`.
    pub fn load(
        pipeline_path: impl AsRef<Path>,
        catalog_path: impl AsRef<Path>,
        config: &crate::config::Config,
    ) -> Result<Self> {
        let pipeline = artifact::load_pipeline(pipeline_path, &config.features)?;
        let catalog = artifact::load_catalog(catalog_path)?;
        Self::new(pipeline, catalog, config.recommend.clone())
    }

    /// Fitted pipeline.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Labelled catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Recommend up to `count` tracks similar to `song_id`.
    ///
    /// Errors, checked in this order: [`Error::NotFound`] for an unknown id,
    /// [`Error::UnsupportedMode`] for an unknown mode, and
    /// [`Error::UnknownAssignment`] when a cluster mode names an assignment the
    /// catalog lacks.
    ///
    /// A query labelled [`NOISE`] has no cluster peers: `cluster` mode returns
    /// nothing for it and `cluster_knn` ranks the whole catalog. Other noise
    /// tracks are not treated as a shared cluster.
    pub fn recommend(
        &self,
        song_id: &str,
        assignment: &str,
        count: usize,
        mode: &str,
    ) -> Result<Vec<Recommendation>> {
        let query = self.locate(song_id)?;
        let mode = Mode::parse(mode)?;
        self.recommend_at(query, assignment, count, mode)
    }

    /// [`Self::recommend`] with an already-parsed mode.
    pub fn recommend_with(
        &self,
        song_id: &str,
        assignment: &str,
        count: usize,
        mode: Mode,
    ) -> Result<Vec<Recommendation>> {
        let query = self.locate(song_id)?;
        self.recommend_at(query, assignment, count, mode)
    }

    fn locate(&self, song_id: &str) -> Result<usize> {
        self.catalog.position(song_id).ok_or_else(|| Error::NotFound {
            track_id: song_id.to_string(),
        })
    }

    fn recommend_at(
        &self,
        query: usize,
        assignment: &str,
        count: usize,
        mode: Mode,
    ) -> Result<Vec<Recommendation>> {
        let members = if mode.uses_clusters() {
            self.cluster_members(query, assignment)?
        } else {
            Vec::new()
        };

        match mode {
            Mode::Cluster => Ok(self.sample_cluster(query, &members, count)),
            Mode::Knn => self.rank(query, 0..self.catalog.len(), count),
            Mode::ClusterKnn => {
                if members.len() <= 1 {
                    log::info!(
                        "track {} is alone in its '{assignment}' cluster; using knn",
                        self.catalog.tracks()[query].id
                    );
                    self.rank(query, 0..self.catalog.len(), count)
                } else {
                    self.rank(query, members.into_iter(), count)
                }
            }
        }
    }

    /// Positions sharing the query's label (query included).
    fn cluster_members(&self, query: usize, assignment: &str) -> Result<Vec<usize>> {
        let labels = self
            .catalog
            .assignment(assignment)
            .ok_or_else(|| Error::UnknownAssignment(assignment.to_string()))?;
        let label = labels[query];
        if label == NOISE {
            return Ok(vec![query]);
        }
        self.catalog.cluster_members(assignment, label)
    }

    fn sample_cluster(&self, query: usize, members: &[usize], count: usize) -> Vec<Recommendation> {
        let candidates: Vec<usize> = members.iter().copied().filter(|&i| i != query).collect();
        let take = count.min(candidates.len());
        if take == 0 {
            return Vec::new();
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        rand::seq::index::sample(&mut rng, candidates.len(), take)
            .into_iter()
            .map(|i| Recommendation {
                track_id: self.catalog.tracks()[candidates[i]].id.clone(),
                score: CLUSTER_MODE_SCORE,
            })
            .collect()
    }

    /// Top `count` candidates by cosine similarity to the query.
    fn rank(
        &self,
        query: usize,
        candidates: impl Iterator<Item = usize>,
        count: usize,
    ) -> Result<Vec<Recommendation>> {
        if !self.complete[query] {
            let id = &self.catalog.tracks()[query].id;
            match self.config.missing_features {
                MissingFeaturePolicy::Empty => {
                    log::warn!("track {id} has missing features; returning no recommendations");
                    return Ok(Vec::new());
                }
                MissingFeaturePolicy::Reject => {
                    return Err(Error::MissingFeatures {
                        track_id: id.clone(),
                    });
                }
                MissingFeaturePolicy::FillZero => {
                    log::debug!("track {id} has missing features; using zero-filled projection");
                }
            }
        }

        let candidates: Vec<usize> = candidates.filter(|&i| i != query).collect();
        let target = self.projections.row(query);
        let similarity = |i: usize| (i, cosine_similarity(target, self.projections.row(i)));

        #[cfg(feature = "parallel")]
        let mut scored: Vec<(usize, f64)> = candidates.into_par_iter().map(similarity).collect();

        #[cfg(not(feature = "parallel"))]
        let mut scored: Vec<(usize, f64)> = candidates.into_iter().map(similarity).collect();

        // Stable: equal scores keep catalog order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(count);

        Ok(scored
            .into_iter()
            .map(|(i, score)| Recommendation {
                track_id: self.catalog.tracks()[i].id.clone(),
                score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Track;
    use crate::preprocess::PreprocessConfig;

    fn names() -> Vec<String> {
        vec!["x".to_string(), "y".to_string()]
    }

    fn recommender(policy: MissingFeaturePolicy) -> Recommender {
        let mut tracks: Vec<Track> = (0..8)
            .map(|i| {
                let angle = i as f64 * 0.3;
                Track::new(format!("t{i}"))
                    .with_feature("x", angle.cos() * (1.0 + i as f64))
                    .with_feature("y", angle.sin() * (1.0 + i as f64))
            })
            .collect();
        tracks.push(Track::new("gap").with_feature("x", 1.0));

        let config = PreprocessConfig {
            use_reduction: false,
            ..PreprocessConfig::default()
        };
        let pipeline = Pipeline::fit(&tracks[..8], &names(), &config).unwrap();
        let mut catalog = Catalog::new(tracks).unwrap();
        catalog
            .set_assignment("kmeans", vec![0, 0, 0, 0, 1, 1, 1, NOISE, 1])
            .unwrap();
        Recommender::new(
            pipeline,
            catalog,
            RecommendConfig {
                seed: 3,
                missing_features: policy,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(Mode::parse("cluster_knn").unwrap(), Mode::ClusterKnn);
        assert_eq!(Mode::parse("bogus"), Err(Error::UnsupportedMode("bogus".into())));
        assert_eq!(Mode::Knn.to_string(), "knn");
    }

    #[test]
    fn test_error_order() {
        let rec = recommender(MissingFeaturePolicy::Empty);
        // Unknown id wins over bad mode and bad assignment.
        assert!(matches!(
            rec.recommend("nope", "missing", 3, "bogus"),
            Err(Error::NotFound { .. })
        ));
        // Bad mode wins over bad assignment.
        assert!(matches!(
            rec.recommend("t0", "missing", 3, "bogus"),
            Err(Error::UnsupportedMode(_))
        ));
        assert!(matches!(
            rec.recommend("t0", "missing", 3, "cluster"),
            Err(Error::UnknownAssignment(_))
        ));
        // knn ignores the assignment name.
        assert!(rec.recommend("t0", "missing", 3, "knn").is_ok());
    }

    #[test]
    fn test_cluster_knn_stays_in_cluster() {
        let rec = recommender(MissingFeaturePolicy::Empty);
        let out = rec.recommend("t1", "kmeans", 10, "cluster_knn").unwrap();
        let ids: Vec<&str> = out.iter().map(|r| r.track_id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(|id| ["t0", "t2", "t3"].contains(id)));
        assert!(out.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_noise_query_falls_back_to_knn() {
        let rec = recommender(MissingFeaturePolicy::Empty);
        let a = rec.recommend("t7", "kmeans", 4, "cluster_knn").unwrap();
        let b = rec.recommend("t7", "kmeans", 4, "knn").unwrap();
        assert_eq!(a, b);
        assert!(rec.recommend("t7", "kmeans", 4, "cluster").unwrap().is_empty());
    }

    #[test]
    fn test_missing_feature_policies() {
        let empty = recommender(MissingFeaturePolicy::Empty);
        assert!(empty.recommend("gap", "kmeans", 3, "knn").unwrap().is_empty());
        // Cluster mode needs no features.
        assert_eq!(empty.recommend("gap", "kmeans", 2, "cluster").unwrap().len(), 2);

        let reject = recommender(MissingFeaturePolicy::Reject);
        assert_eq!(
            reject.recommend("gap", "kmeans", 3, "cluster_knn"),
            Err(Error::MissingFeatures {
                track_id: "gap".into()
            })
        );

        let fill = recommender(MissingFeaturePolicy::FillZero);
        assert_eq!(fill.recommend("gap", "kmeans", 3, "knn").unwrap().len(), 3);
    }

    #[test]
    fn test_zero_count() {
        let rec = recommender(MissingFeaturePolicy::Empty);
        for mode in ["cluster", "knn", "cluster_knn"] {
            assert!(rec.recommend("t0", "kmeans", 0, mode).unwrap().is_empty());
        }
    }

    #[test]
    fn test_recommender_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Recommender>();
    }
}
