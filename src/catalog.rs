//! Track records and per-algorithm cluster assignments.
//!
//! A [`Catalog`] is the labelled dataset the recommender serves from: tracks in
//! a fixed order, an id index, and one label column per clustering algorithm.
//! Label columns are independent of each other; each is aligned with track
//! order.

use std::collections::{BTreeMap, HashMap};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::cluster::Label;
use crate::error::{Error, Result};

/// A single song and its raw audio features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Performing artists.
    #[serde(default)]
    pub artists: Vec<String>,
    /// Raw numeric features by name. `None` (or a non-finite value) is missing.
    #[serde(default)]
    pub features: BTreeMap<String, Option<f64>>,
    /// Preview clip URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    /// Album artwork URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork_url: Option<String>,
}

impl Track {
    /// Create a track with no metadata and no features.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            artists: Vec::new(),
            features: BTreeMap::new(),
            preview_url: None,
            artwork_url: None,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the artist list.
    pub fn with_artists<I, S>(mut self, artists: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.artists = artists.into_iter().map(Into::into).collect();
        self
    }

    /// Set one feature value.
    pub fn with_feature(mut self, name: impl Into<String>, value: f64) -> Self {
        let _ = self.features.insert(name.into(), Some(value));
        self
    }

    /// Record a feature as present-but-null.
    pub fn with_missing_feature(mut self, name: impl Into<String>) -> Self {
        let _ = self.features.insert(name.into(), None);
        self
    }

    /// Finite value of a feature, if any.
    pub fn feature(&self, name: &str) -> Option<f64> {
        self.features
            .get(name)
            .copied()
            .flatten()
            .filter(|v| v.is_finite())
    }

    /// Whether every named feature has a finite value.
    pub fn has_features(&self, names: &[String]) -> bool {
        names.iter().all(|n| self.feature(n).is_some())
    }

    /// First feature in `names` without a finite value.
    pub fn first_missing<'a>(&self, names: &'a [String]) -> Option<&'a str> {
        names
            .iter()
            .find(|n| self.feature(n).is_none())
            .map(String::as_str)
    }
}

/// Ordered tracks plus named cluster assignments.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tracks: Vec<Track>,
    index: HashMap<String, usize>,
    assignments: BTreeMap<String, Vec<Label>>,
}

/// On-disk shape of a catalog; the id index is rebuilt on load.
#[derive(Serialize, Deserialize)]
struct CatalogRecord {
    tracks: Vec<Track>,
    #[serde(default)]
    assignments: BTreeMap<String, Vec<Label>>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate ids.
    pub fn new(tracks: Vec<Track>) -> Result<Self> {
        let mut index = HashMap::with_capacity(tracks.len());
        for (i, track) in tracks.iter().enumerate() {
            if index.insert(track.id.clone(), i).is_some() {
                return Err(Error::DuplicateTrack(track.id.clone()));
            }
        }
        Ok(Self {
            tracks,
            index,
            assignments: BTreeMap::new(),
        })
    }

    /// Number of tracks.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// True if there are no tracks.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// All tracks in catalog order.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Track at a position.
    pub fn track(&self, idx: usize) -> Option<&Track> {
        self.tracks.get(idx)
    }

    /// Position of a track id.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Track by id.
    pub fn get(&self, id: &str) -> Option<&Track> {
        self.position(id).map(|i| &self.tracks[i])
    }

    /// Store (or replace) the label column for an algorithm.
    pub fn set_assignment(&mut self, algorithm: impl Into<String>, labels: Vec<Label>) -> Result<()> {
        if labels.len() != self.tracks.len() {
            return Err(Error::DimensionMismatch {
                expected: self.tracks.len(),
                found: labels.len(),
            });
        }
        let _ = self.assignments.insert(algorithm.into(), labels);
        Ok(())
    }

    /// Drop the label column for an algorithm, returning it if present.
    pub fn remove_assignment(&mut self, algorithm: &str) -> Option<Vec<Label>> {
        self.assignments.remove(algorithm)
    }

    /// Label column for an algorithm.
    pub fn assignment(&self, algorithm: &str) -> Option<&[Label]> {
        self.assignments.get(algorithm).map(Vec::as_slice)
    }

    /// Names of stored assignments, sorted.
    pub fn assignment_names(&self) -> impl Iterator<Item = &str> {
        self.assignments.keys().map(String::as_str)
    }

    /// Positions of every track carrying `label` under `algorithm`.
    pub fn cluster_members(&self, algorithm: &str, label: Label) -> Result<Vec<usize>> {
        let labels = self
            .assignment(algorithm)
            .ok_or_else(|| Error::UnknownAssignment(algorithm.to_string()))?;
        Ok(labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == label)
            .map(|(i, _)| i)
            .collect())
    }

    /// Raw feature matrix in catalog order, columns in `names` order.
    ///
    /// Any missing value is an error: this is the fit-time view.
    pub fn feature_matrix(&self, names: &[String]) -> Result<Array2<f64>> {
        feature_matrix(&self.tracks, names)
    }
}

/// Raw feature matrix for `tracks`, columns in `names` order.
///
/// Fails with [`Error::MissingValue`] on the first gap.
pub fn feature_matrix(tracks: &[Track], names: &[String]) -> Result<Array2<f64>> {
    if tracks.is_empty() || names.is_empty() {
        return Err(Error::EmptyInput);
    }
    let mut out = Array2::zeros((tracks.len(), names.len()));
    for (i, track) in tracks.iter().enumerate() {
        for (j, name) in names.iter().enumerate() {
            out[[i, j]] = track.feature(name).ok_or_else(|| Error::MissingValue {
                track_id: track.id.clone(),
                feature: name.clone(),
            })?;
        }
    }
    Ok(out)
}

impl Serialize for Catalog {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        CatalogRecord {
            tracks: self.tracks.clone(),
            assignments: self.assignments.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Catalog {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let record = CatalogRecord::deserialize(deserializer)?;
        let mut catalog = Catalog::new(record.tracks).map_err(serde::de::Error::custom)?;
        for (name, labels) in record.assignments {
            catalog
                .set_assignment(name, labels)
                .map_err(serde::de::Error::custom)?;
        }
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn small() -> Catalog {
        Catalog::new(vec![
            Track::new("a").with_feature("energy", 0.5).with_feature("valence", 0.1),
            Track::new("b").with_feature("energy", 0.7).with_feature("valence", 0.3),
            Track::new("c").with_feature("energy", 0.9).with_missing_feature("valence"),
        ])
        .unwrap()
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = Catalog::new(vec![Track::new("x"), Track::new("x")]);
        assert_eq!(result.unwrap_err(), Error::DuplicateTrack("x".into()));
    }

    #[test]
    fn test_feature_matrix_order_follows_names() {
        let cat = small();
        let err = cat.feature_matrix(&names(&["valence"])).unwrap_err();
        assert_eq!(
            err,
            Error::MissingValue {
                track_id: "c".into(),
                feature: "valence".into()
            }
        );

        let m = cat.feature_matrix(&names(&["energy"])).unwrap();
        assert_eq!(m.shape(), &[3, 1]);
        assert_eq!(m[[2, 0]], 0.9);
    }

    #[test]
    fn test_nan_counts_as_missing() {
        let t = Track::new("n").with_feature("energy", f64::NAN);
        assert!(t.feature("energy").is_none());
        assert_eq!(t.first_missing(&names(&["energy"])), Some("energy"));
    }

    #[test]
    fn test_assignment_length_checked() {
        let mut cat = small();
        assert!(cat.set_assignment("kmeans", vec![0, 1]).is_err());
        cat.set_assignment("kmeans", vec![0, 1, 0]).unwrap();
        assert_eq!(cat.cluster_members("kmeans", 0).unwrap(), vec![0, 2]);
        assert!(matches!(
            cat.cluster_members("gmm", 0),
            Err(Error::UnknownAssignment(_))
        ));
    }

    #[test]
    fn test_remove_assignment() {
        let mut cat = small();
        cat.set_assignment("gmm", vec![1, 1, 0]).unwrap();
        assert_eq!(cat.remove_assignment("gmm"), Some(vec![1, 1, 0]));
        assert!(cat.assignment("gmm").is_none());
        assert_eq!(cat.remove_assignment("gmm"), None);
    }

    #[test]
    fn test_json_roundtrip_rebuilds_index() {
        let mut cat = small();
        cat.set_assignment("dbscan", vec![-1, 0, 0]).unwrap();
        let json = serde_json::to_string(&cat).unwrap();
        let back: Catalog = serde_json::from_str(&json).unwrap();
        assert_eq!(back.position("b"), Some(1));
        assert_eq!(back.assignment("dbscan"), Some(&[-1, 0, 0][..]));
        assert!(back.get("c").unwrap().feature("valence").is_none());
    }
}
