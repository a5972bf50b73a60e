//! Clustering algorithms for grouping tracks by audio features.
//!
//! Every algorithm takes an `n × d` matrix of preprocessed feature vectors and
//! returns one [`Label`] per row.
//!
//! ## Hard vs Soft Clustering
//!
//! **Hard clustering** assigns each track to exactly one cluster. **Soft
//! clustering** gives a probability distribution over clusters; [`Gmm`] is the
//! only soft algorithm here, and its hard labels are the argmax.
//!
//! ## Algorithms
//!
//! | Algorithm | Chooses k? | Noise? | Notes |
//! |-----------|-----------|--------|-------|
//! | [`Kmeans`] | no | no | k-means++ init, seeded restarts |
//! | [`Dbscan`] | yes | yes (`-1`) | Euclidean or cosine neighbourhoods |
//! | [`HierarchicalClustering`] | no | no | Ward / complete / average / single |
//! | [`Gmm`] | no | no | EM, diagonal or spherical covariance |
//! | [`SpectralClustering`] | no | no | RBF or kNN affinity, k-means on embedding |
//!
//! Labels are opaque: only equality between labels is meaningful, and
//! [`NOISE`] is reserved for points a density-based algorithm leaves unassigned.
//!
//! ## Usage
//!
//! ```rust
//! use cadence::cluster::{Clustering, Gmm, Kmeans, SoftClustering};
//! use ndarray::array;
//!
//! let data = array![[0.0, 0.0], [0.1, 0.1], [10.0, 10.0], [10.1, 10.1]];
//!
//! let labels = Kmeans::new(2).with_seed(42).fit_predict(data.view()).unwrap();
//! assert_eq!(labels[0], labels[1]);
//! assert_ne!(labels[0], labels[2]);
//!
//! let probs = Gmm::new()
//!     .with_n_components(2)
//!     .with_seed(42)
//!     .fit_predict_proba(data.view())
//!     .unwrap();
//! assert_eq!(probs.len(), 4);
//! ```

mod dbscan;
mod gmm;
mod hierarchical;
mod kmeans;
mod spectral;
mod traits;

pub use dbscan::{Dbscan, DbscanMetric};
pub use gmm::{CovarianceType, Gmm};
pub use hierarchical::{HierarchicalClustering, Linkage};
pub use kmeans::{Kmeans, KmeansFit};
pub use spectral::{Affinity, SpectralClustering};
pub use traits::{count_clusters, cosine_similarity, Clustering, Label, SoftClustering, NOISE};

pub(crate) use traits::squared_distance;
