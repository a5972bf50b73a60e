//! Batch training: catalog in, labelled catalog and pipeline out.
//!
//! 1. Fit the [`Pipeline`] on the full raw feature matrix
//! 2. Sweep every family on a bounded sample
//! 3. Refit each family's best parameters on the full matrix
//! 4. Store the labels in the catalog under the family name
//!
//! Families with a [`Tunable::final_fit_size`] cap refit on a seeded sample
//! when the matrix is larger; the other rows go to the nearest fitted
//! centroid. A family with no scorable trial, or whose final fit fails, is
//! reported and has any earlier assignment removed from the catalog.

use ndarray::{Array1, ArrayView2, Axis};
use serde::Serialize;

use crate::catalog::Catalog;
use crate::cluster::{count_clusters, squared_distance, Label, NOISE};
use crate::config::Config;
use crate::error::Result;
use crate::evaluation::sample_indices;
use crate::preprocess::Pipeline;
use crate::tuning::{
    describe_params, select_best, DbscanFamily, GmmFamily, HierarchicalFamily, KmeansFamily,
    Params, SpectralFamily, Sweep, Trial, Tunable,
};

/// Sweep results for one family.
#[derive(Debug, Clone, Serialize)]
pub struct FamilyReport {
    /// Family name (also the assignment key).
    pub algorithm: String,
    /// Every trial, in grid order.
    pub trials: Vec<Trial>,
    /// Highest-silhouette trial, if any scored.
    pub best: Option<Trial>,
    /// Labels from the final fit, one per catalog row.
    #[serde(skip)]
    pub labels: Option<Vec<Label>>,
}

/// Output of [`train`].
#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// Pipeline fit on the whole catalog.
    pub pipeline: Pipeline,
    /// One report per family, in sweep order.
    pub families: Vec<FamilyReport>,
}

impl TrainingReport {
    /// Report for a family.
    pub fn family(&self, algorithm: &str) -> Option<&FamilyReport> {
        self.families.iter().find(|f| f.algorithm == algorithm)
    }
}

/// The five families configured from `config`, in sweep order.
pub fn families(config: &Config) -> Vec<Box<dyn Tunable>> {
    let seed = config.tuning.seed;
    vec![
        Box::new(KmeansFamily::new(config.kmeans.clone(), seed)),
        Box::new(DbscanFamily::new(config.dbscan.clone(), seed)),
        Box::new(HierarchicalFamily::new(config.hierarchical.clone())),
        Box::new(GmmFamily::new(config.gmm.clone(), seed)),
        Box::new(SpectralFamily::new(config.spectral.clone(), seed)),
    ]
}

/// Train every configured family and label `catalog`.
pub fn train(catalog: &mut Catalog, config: &Config) -> Result<TrainingReport> {
    let families = families(config);
    train_families(catalog, config, &families)
}

/// Train the given families and label `catalog`.
pub fn train_families(
    catalog: &mut Catalog,
    config: &Config,
    families: &[Box<dyn Tunable>],
) -> Result<TrainingReport> {
    config.validate()?;
    let raw = catalog.feature_matrix(&config.features)?;
    let (pipeline, matrix) = Pipeline::fit_transform(raw.view(), &config.features, &config.preprocess)?;

    let sweep = Sweep::from_config(&config.tuning);
    let mut reports = Vec::with_capacity(families.len());

    for family in families {
        let report = run_family(&sweep, family.as_ref(), matrix.view());
        match &report.labels {
            Some(labels) => catalog.set_assignment(family.name(), labels.clone())?,
            None => {
                if catalog.remove_assignment(family.name()).is_some() {
                    log::warn!("{}: dropped stale assignment", family.name());
                }
            }
        }
        reports.push(report);
    }

    Ok(TrainingReport {
        pipeline,
        families: reports,
    })
}

fn run_family(sweep: &Sweep, family: &dyn Tunable, matrix: ArrayView2<'_, f64>) -> FamilyReport {
    let name = family.name().to_string();
    let trials = sweep.run(family, matrix);
    let best = select_best(&trials).cloned();

    let labels = match &best {
        None => {
            log::warn!("{name}: no trial produced a valid clustering");
            None
        }
        Some(trial) => {
            log::info!(
                "{name}: best [{}] silhouette {:.4}",
                describe_params(&trial.params),
                trial.scores.cohesion_separation.unwrap_or(f64::NAN)
            );
            match final_fit(family, matrix, &trial.params, sweep.seed()) {
                Ok(labels) => {
                    log::info!(
                        "{name}: final fit on {} rows -> {} clusters",
                        labels.len(),
                        count_clusters(&labels)
                    );
                    Some(labels)
                }
                Err(e) => {
                    log::warn!("{name}: final fit failed: {e}");
                    None
                }
            }
        }
    };

    FamilyReport {
        algorithm: name,
        trials,
        best,
        labels,
    }
}

/// Fit `params` on the whole matrix, or on a seeded sample when the family
/// caps its final fit.
fn final_fit(
    family: &dyn Tunable,
    matrix: ArrayView2<'_, f64>,
    params: &Params,
    seed: u64,
) -> Result<Vec<Label>> {
    let n = matrix.nrows();
    match family.final_fit_size() {
        Some(cap) if n > cap => {
            log::info!(
                "{}: final fit on a {cap}-row sample of {n}; remaining rows go to the nearest centroid",
                family.name()
            );
            let idx = sample_indices(n, cap, seed);
            let sample = matrix.select(Axis(0), &idx);
            let sample_labels = family.fit_predict(sample.view(), params)?;
            Ok(extend_labels(matrix, &idx, &sample_labels))
        }
        _ => family.fit_predict(matrix, params),
    }
}

/// Labels for every row of `matrix`, given labels for the rows at `idx`.
///
/// Unsampled rows take the label of the nearest non-noise centroid, or
/// [`NOISE`] when the sample has no clusters.
fn extend_labels(matrix: ArrayView2<'_, f64>, idx: &[usize], sample_labels: &[Label]) -> Vec<Label> {
    let mut labels = vec![NOISE; matrix.nrows()];
    let mut fitted = vec![false; matrix.nrows()];
    let mut sums: Vec<(Label, Array1<f64>, usize)> = Vec::new();

    for (&row, &label) in idx.iter().zip(sample_labels) {
        labels[row] = label;
        fitted[row] = true;
        if label == NOISE {
            continue;
        }
        match sums.iter_mut().find(|(l, _, _)| *l == label) {
            Some((_, sum, count)) => {
                *sum += &matrix.row(row);
                *count += 1;
            }
            None => sums.push((label, matrix.row(row).to_owned(), 1)),
        }
    }

    let centroids: Vec<(Label, Array1<f64>)> = sums
        .into_iter()
        .map(|(label, sum, count)| (label, sum / count as f64))
        .collect();
    if centroids.is_empty() {
        return labels;
    }

    for (row, label) in labels.iter_mut().enumerate() {
        if fitted[row] {
            continue;
        }
        let point = matrix.row(row);
        let mut best = (centroids[0].0, f64::INFINITY);
        for (l, c) in &centroids {
            let d = squared_distance(point, c.view());
            if d < best.1 {
                best = (*l, d);
            }
        }
        *label = best.0;
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Track;
    use crate::cluster::DbscanMetric;
    use crate::recommend::{RecommendConfig, Recommender};
    use crate::tuning::{DbscanGrid, GmmGrid, HierarchicalGrid, KmeansGrid, SpectralGrid};

    fn catalog() -> Catalog {
        let tracks = (0..60)
            .map(|i| {
                let c = (i / 20) as f64;
                let jitter = ((i * 13) % 7) as f64 * 0.02;
                Track::new(format!("s{i}"))
                    .with_feature("energy", c * 3.0 + jitter)
                    .with_feature("valence", 1.0 - c + jitter)
                    .with_feature("tempo", 90.0 + c * 30.0 - jitter * 5.0)
            })
            .collect();
        Catalog::new(tracks).unwrap()
    }

    fn small_config() -> Config {
        Config {
            features: vec!["energy".into(), "valence".into(), "tempo".into()],
            kmeans: KmeansGrid {
                k_min: 2,
                k_max: 4,
                n_init: 3,
                ..KmeansGrid::default()
            },
            dbscan: DbscanGrid {
                n_trials: 6,
                metrics: vec![DbscanMetric::Euclidean],
                ..DbscanGrid::default()
            },
            hierarchical: HierarchicalGrid {
                k_min: 2,
                k_max: 4,
                ..HierarchicalGrid::default()
            },
            gmm: GmmGrid {
                k_min: 2,
                k_max: 3,
                ..GmmGrid::default()
            },
            spectral: SpectralGrid {
                k_min: 2,
                k_max: 3,
                n_neighbors: vec![5],
                gammas: vec![1.0],
                ..SpectralGrid::default()
            },
            ..Config::default()
        }
    }

    #[test]
    fn test_train_labels_catalog() {
        let mut catalog = catalog();
        let report = train(&mut catalog, &small_config()).unwrap();

        assert_eq!(report.families.len(), 5);
        let kmeans = report.family("kmeans").unwrap();
        assert_eq!(kmeans.trials.len(), 3);
        let best = kmeans.best.as_ref().unwrap();
        assert_eq!(best.params["n_clusters"].to_string(), "3");

        let labels = catalog.assignment("kmeans").unwrap();
        assert_eq!(labels.len(), 60);
        assert_eq!(count_clusters(labels), 3);
        assert!(labels[..20].iter().all(|&l| l == labels[0]));

        assert!(catalog.assignment("hierarchical").is_some());
    }

    #[test]
    fn test_trained_catalog_serves_recommendations() {
        let mut catalog = catalog();
        let report = train(&mut catalog, &small_config()).unwrap();
        let rec = Recommender::new(report.pipeline, catalog, RecommendConfig::default()).unwrap();

        let out = rec.recommend("s3", "kmeans", 5, "cluster_knn").unwrap();
        assert_eq!(out.len(), 5);
        for r in &out {
            let idx: usize = r.track_id[1..].parse().unwrap();
            assert!(idx < 20);
        }
    }

    #[test]
    fn test_family_without_valid_trial_leaves_no_assignment() {
        let mut catalog = catalog();
        let mut config = small_config();
        // No neighbourhood holds 50 points: every point is noise.
        config.dbscan.eps_min = 1e-6;
        config.dbscan.eps_max = 2e-6;
        config.dbscan.min_samples_min = 50;
        config.dbscan.min_samples_max = 55;
        let families: Vec<Box<dyn Tunable>> =
            vec![Box::new(DbscanFamily::new(config.dbscan.clone(), 1))];

        let report = train_families(&mut catalog, &config, &families).unwrap();
        assert!(report.families[0].best.is_none());
        assert!(catalog.assignment("dbscan").is_none());
    }

    #[test]
    fn test_retraining_drops_stale_assignment() {
        let mut catalog = catalog();
        catalog.set_assignment("dbscan", vec![0; 60]).unwrap();
        let mut config = small_config();
        config.dbscan.eps_min = 1e-6;
        config.dbscan.eps_max = 2e-6;
        config.dbscan.min_samples_min = 50;
        config.dbscan.min_samples_max = 55;
        let families: Vec<Box<dyn Tunable>> =
            vec![Box::new(DbscanFamily::new(config.dbscan.clone(), 1))];

        let report = train_families(&mut catalog, &config, &families).unwrap();
        assert!(report.families[0].labels.is_none());
        assert!(catalog.assignment("dbscan").is_none());
    }

    #[test]
    fn test_capped_final_fit_labels_every_row() {
        let mut catalog = catalog();
        let config = small_config();
        let grid = HierarchicalGrid {
            k_min: 3,
            k_max: 3,
            linkages: vec![crate::cluster::Linkage::Ward],
            final_fit_size: 24,
        };
        let families: Vec<Box<dyn Tunable>> = vec![Box::new(HierarchicalFamily::new(grid))];

        let report = train_families(&mut catalog, &config, &families).unwrap();
        let labels = report.families[0].labels.as_ref().unwrap();
        assert_eq!(labels.len(), 60);
        assert_eq!(count_clusters(labels), 3);
        for block in labels.chunks(20) {
            assert!(block.iter().all(|&l| l == block[0]));
        }
        assert_eq!(catalog.assignment("hierarchical"), Some(labels.as_slice()));
    }

    #[test]
    fn test_extend_labels_nearest_centroid() {
        let matrix = ndarray::array![[0.0], [0.1], [10.0], [10.1], [5.2]];
        let labels = extend_labels(matrix.view(), &[0, 2], &[4, 7]);
        assert_eq!(labels, vec![4, 4, 7, 7, 7]);

        let noise = extend_labels(matrix.view(), &[0, 2], &[NOISE, NOISE]);
        assert!(noise.iter().all(|&l| l == NOISE));
    }

    #[test]
    fn test_missing_values_fail_training() {
        let mut tracks: Vec<Track> = catalog().tracks().to_vec();
        tracks[0] = Track::new("s0").with_feature("energy", 0.0);
        let mut catalog = Catalog::new(tracks).unwrap();
        assert!(train(&mut catalog, &small_config()).is_err());
    }
}
