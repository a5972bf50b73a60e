//! Hyperparameter sweeps over clustering families.
//!
//! Each algorithm family implements [`Tunable`]: it enumerates its parameter
//! grid and can fit one parameter set. A single [`Sweep`] driver runs any
//! family:
//!
//! 1. Draw a fixed-seed tuning sample when the matrix is large
//! 2. Fit every parameter set on the sample (in parallel with `parallel`)
//! 3. Score each labelling with the shared [`Evaluator`]
//! 4. Return one [`Trial`] per grid entry, in grid order
//!
//! A trial that fails (fit error, one cluster, all noise) is kept with empty
//! scores and a note; it never aborts the sweep. [`select_best`] then picks the
//! highest silhouette.

mod families;

use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::cluster::{count_clusters, Label};
use crate::error::{Error, Result};
use crate::evaluation::{sample_indices, Evaluation, Evaluator};

pub use families::{
    DbscanFamily, DbscanGrid, GmmFamily, GmmGrid, HierarchicalFamily, HierarchicalGrid,
    KmeansFamily, KmeansGrid, SpectralFamily, SpectralGrid,
};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// One hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integer parameter (cluster counts, neighbour counts).
    Int(i64),
    /// Real parameter (eps, gamma).
    Float(f64),
    /// Categorical parameter (linkage, metric).
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v:.4}"),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

/// Named parameters for one trial, ordered by name.
pub type Params = BTreeMap<String, ParamValue>;

/// Render params as `a=1, b=x` for logs.
pub fn describe_params(params: &Params) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn missing(name: &'static str) -> Error {
    Error::InvalidParameter {
        name,
        message: "missing from params".into(),
    }
}

pub(crate) fn param_usize(params: &Params, name: &'static str) -> Result<usize> {
    match params.get(name) {
        Some(ParamValue::Int(v)) if *v >= 0 => Ok(*v as usize),
        Some(other) => Err(Error::InvalidParameter {
            name,
            message: format!("expected a non-negative integer, got {other}"),
        }),
        None => Err(missing(name)),
    }
}

pub(crate) fn param_f64(params: &Params, name: &'static str) -> Result<f64> {
    match params.get(name) {
        Some(ParamValue::Float(v)) => Ok(*v),
        Some(ParamValue::Int(v)) => Ok(*v as f64),
        Some(other) => Err(Error::InvalidParameter {
            name,
            message: format!("expected a number, got {other}"),
        }),
        None => Err(missing(name)),
    }
}

pub(crate) fn param_text<'a>(params: &'a Params, name: &'static str) -> Result<&'a str> {
    match params.get(name) {
        Some(ParamValue::Text(v)) => Ok(v),
        Some(other) => Err(Error::InvalidParameter {
            name,
            message: format!("expected text, got {other}"),
        }),
        None => Err(missing(name)),
    }
}

/// A clustering family that can be swept.
pub trait Tunable: Send + Sync {
    /// Algorithm name, used as the catalog assignment key.
    fn name(&self) -> &str;

    /// Every parameter set this family will try, in a fixed order.
    fn supported_param_grid(&self) -> Vec<Params>;

    /// Fit one parameter set and return labels.
    fn fit_predict(&self, data: ArrayView2<'_, f64>, params: &Params) -> Result<Vec<Label>>;

    /// Tighter tuning-sample cap for expensive families.
    fn sample_size(&self) -> Option<usize> {
        None
    }

    /// Row cap for the final fit of families whose memory grows with n².
    ///
    /// Larger matrices are fit on a seeded sample and the remaining rows take
    /// the label of their nearest fitted centroid.
    fn final_fit_size(&self) -> Option<usize> {
        None
    }
}

/// Outcome of one parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// Family name.
    pub algorithm: String,
    /// Parameters tried.
    pub params: Params,
    /// Quality scores (all `None` on failure).
    pub scores: Evaluation,
    /// Failure reason, if the trial could not be scored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Trial {
    fn failed(algorithm: &str, params: Params, note: String) -> Self {
        Self {
            algorithm: algorithm.to_string(),
            params,
            scores: Evaluation::unscored(note.clone()),
            note: Some(note),
        }
    }
}

/// Sweep settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Rows used for fitting during a sweep.
    pub sample_size: usize,
    /// Rows used for scoring each trial.
    pub evaluation_sample_size: usize,
    /// Seed for every sample drawn during tuning.
    pub seed: u64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            sample_size: 10_000,
            evaluation_sample_size: 10_000,
            seed: 42,
        }
    }
}

/// Runs a [`Tunable`] family over its grid.
#[derive(Debug, Clone)]
pub struct Sweep {
    sample_size: usize,
    seed: u64,
    evaluator: Evaluator,
}

impl Sweep {
    /// Create a sweep.
    pub fn new(sample_size: usize, seed: u64, evaluator: Evaluator) -> Self {
        Self {
            sample_size,
            seed,
            evaluator,
        }
    }

    /// Build from config.
    pub fn from_config(config: &TuningConfig) -> Self {
        Self::new(
            config.sample_size,
            config.seed,
            Evaluator::new(config.evaluation_sample_size, config.seed),
        )
    }

    /// Seed for tuning and final-fit samples.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Evaluator used for trials.
    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Run every parameter set of `family` and return trials in grid order.
    pub fn run(&self, family: &dyn Tunable, data: ArrayView2<'_, f64>) -> Vec<Trial> {
        let limit = family
            .sample_size()
            .map_or(self.sample_size, |cap| cap.min(self.sample_size));

        let sample: Option<Array2<f64>> = (data.nrows() > limit).then(|| {
            let idx = sample_indices(data.nrows(), limit, self.seed);
            data.select(Axis(0), &idx)
        });
        let tuning = match &sample {
            Some(s) => s.view(),
            None => data.view(),
        };

        let grid = family.supported_param_grid();
        log::info!(
            "sweeping {} over {} parameter sets on {} of {} rows",
            family.name(),
            grid.len(),
            tuning.nrows(),
            data.nrows()
        );

        #[cfg(feature = "parallel")]
        let trials: Vec<Trial> = grid
            .into_par_iter()
            .map(|params| self.trial(family, tuning, params))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let trials: Vec<Trial> = grid
            .into_iter()
            .map(|params| self.trial(family, tuning, params))
            .collect();

        let scored = trials.iter().filter(|t| t.scores.is_scored()).count();
        log::info!("{}: {scored}/{} trials scored", family.name(), trials.len());
        trials
    }

    fn trial(&self, family: &dyn Tunable, data: ArrayView2<'_, f64>, params: Params) -> Trial {
        let name = family.name();
        let labels = match family.fit_predict(data, &params) {
            Ok(labels) => labels,
            Err(e) => {
                log::warn!("{name} [{}] failed: {e}", describe_params(&params));
                return Trial::failed(name, params, format!("fit failed: {e}"));
            }
        };

        let n_clusters = count_clusters(&labels);
        if n_clusters < 2 {
            log::debug!("{name} [{}] -> {n_clusters} cluster(s)", describe_params(&params));
            return Trial::failed(name, params, "single cluster or all noise".into());
        }

        match self.evaluator.evaluate(data, &labels) {
            Ok(scores) => {
                log::debug!(
                    "{name} [{}] -> {n_clusters} clusters, silhouette {:?}",
                    describe_params(&params),
                    scores.cohesion_separation
                );
                let note = scores.note.clone();
                Trial {
                    algorithm: name.to_string(),
                    params,
                    scores,
                    note,
                }
            }
            Err(e) => {
                log::warn!("{name} [{}] evaluation failed: {e}", describe_params(&params));
                Trial::failed(name, params, format!("evaluation failed: {e}"))
            }
        }
    }
}

/// Trial with the highest silhouette; the first one wins ties.
pub fn select_best(trials: &[Trial]) -> Option<&Trial> {
    let mut best: Option<(&Trial, f64)> = None;
    for trial in trials {
        let Some(score) = trial.scores.cohesion_separation else {
            continue;
        };
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if top >= score => {}
            _ => best = Some((trial, score)),
        }
    }
    best.map(|(trial, _)| trial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::NOISE;
    use ndarray::Array2;

    /// Grid of cluster counts; k = 1 yields a degenerate labelling and k = 99
    /// fails to fit.
    struct Bands;

    impl Tunable for Bands {
        fn name(&self) -> &str {
            "bands"
        }

        fn supported_param_grid(&self) -> Vec<Params> {
            [1usize, 2, 3, 99]
                .iter()
                .map(|&k| Params::from([("k".to_string(), ParamValue::from(k))]))
                .collect()
        }

        fn fit_predict(&self, data: ArrayView2<'_, f64>, params: &Params) -> Result<Vec<Label>> {
            let k = param_usize(params, "k")?;
            if k > data.nrows() {
                return Err(Error::InvalidClusterCount {
                    requested: k,
                    n_items: data.nrows(),
                });
            }
            Ok((0..data.nrows()).map(|i| (i * k / data.nrows()) as Label).collect())
        }
    }

    fn line(n: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, 1), |(i, _)| i as f64)
    }

    #[test]
    fn test_sweep_keeps_grid_order_and_failures() {
        let sweep = Sweep::new(1000, 42, Evaluator::default());
        let trials = sweep.run(&Bands, line(30).view());

        let ks: Vec<String> = trials.iter().map(|t| t.params["k"].to_string()).collect();
        assert_eq!(ks, vec!["1", "2", "3", "99"]);

        assert!(!trials[0].scores.is_scored());
        assert!(trials[0].note.is_some());
        assert!(trials[1].scores.is_scored());
        assert!(trials[2].scores.is_scored());
        assert!(!trials[3].scores.is_scored());
        assert!(trials[3].note.as_deref().unwrap().contains("fit failed"));
    }

    #[test]
    fn test_sweep_samples_large_inputs() {
        let sweep = Sweep::new(20, 42, Evaluator::default());
        let a = sweep.run(&Bands, line(100).view());
        let b = sweep.run(&Bands, line(100).view());
        assert_eq!(a, b);
        // 99 clusters cannot be fit on a 20-row sample.
        assert!(!a[3].scores.is_scored());
    }

    #[test]
    fn test_select_best_first_wins_ties() {
        let mk = |k: usize, s: Option<f64>| Trial {
            algorithm: "x".into(),
            params: Params::from([("k".to_string(), ParamValue::from(k))]),
            scores: Evaluation {
                cohesion_separation: s,
                ..Evaluation::default()
            },
            note: None,
        };
        let trials = vec![mk(1, None), mk(2, Some(0.4)), mk(3, Some(0.7)), mk(4, Some(0.7))];
        let best = select_best(&trials).unwrap();
        assert_eq!(best.params["k"], ParamValue::Int(3));

        assert!(select_best(&[mk(1, None)]).is_none());
        assert!(select_best(&[]).is_none());
    }

    #[test]
    fn test_all_noise_trial_is_unscored() {
        struct AllNoise;
        impl Tunable for AllNoise {
            fn name(&self) -> &str {
                "noise"
            }
            fn supported_param_grid(&self) -> Vec<Params> {
                vec![Params::new()]
            }
            fn fit_predict(&self, data: ArrayView2<'_, f64>, _: &Params) -> Result<Vec<Label>> {
                Ok(vec![NOISE; data.nrows()])
            }
        }

        let trials = Sweep::new(100, 1, Evaluator::default()).run(&AllNoise, line(10).view());
        assert_eq!(trials.len(), 1);
        assert!(!trials[0].scores.is_scored());
    }

    #[test]
    fn test_param_accessors() {
        let params = Params::from([
            ("k".to_string(), ParamValue::from(4usize)),
            ("eps".to_string(), ParamValue::from(0.5)),
            ("metric".to_string(), ParamValue::from("cosine")),
        ]);
        assert_eq!(param_usize(&params, "k").unwrap(), 4);
        assert_eq!(param_f64(&params, "eps").unwrap(), 0.5);
        assert_eq!(param_text(&params, "metric").unwrap(), "cosine");
        assert!(param_usize(&params, "metric").is_err());
        assert!(param_text(&params, "missing").is_err());
    }

    #[test]
    fn test_params_serialize_untagged() {
        let params = Params::from([
            ("k".to_string(), ParamValue::from(4usize)),
            ("linkage".to_string(), ParamValue::from("ward")),
        ]);
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"{"k":4,"linkage":"ward"}"#);
        let back: Params = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }
}
