use core::fmt;

/// Result alias for `cadence`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by preprocessing, clustering, tuning and recommendation.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Input was empty.
    EmptyInput,

    /// Matrix dimension mismatch.
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Invalid number of clusters requested.
    InvalidClusterCount {
        /// Requested count.
        requested: usize,
        /// Number of items.
        n_items: usize,
    },

    /// Invalid parameter value.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: String,
    },

    /// A feature value was absent where a complete row is required (fit time).
    MissingValue {
        /// Track whose row is incomplete.
        track_id: String,
        /// Feature that is missing.
        feature: String,
    },

    /// Two tracks share one identifier.
    DuplicateTrack(String),

    /// A labelling collapsed (single cluster, all noise).
    DegenerateClustering {
        /// Distinct non-noise clusters found.
        n_clusters: usize,
    },

    /// The requested track is not in the catalog.
    NotFound {
        /// Requested identifier.
        track_id: String,
    },

    /// Recommendation mode outside `cluster`, `knn`, `cluster_knn`.
    UnsupportedMode(String),

    /// No cluster assignment is stored under this algorithm name.
    UnknownAssignment(String),

    /// The query track has missing feature values.
    MissingFeatures {
        /// Query identifier.
        track_id: String,
    },

    /// Feature-name list differs from the one the pipeline was fit with.
    TransformMismatch {
        /// What the pipeline carries.
        expected: String,
        /// What was supplied.
        found: String,
    },

    /// Eigendecomposition failed.
    Decomposition(String),

    /// Configuration could not be parsed or is inconsistent.
    Config(String),

    /// Filesystem failure.
    Io(String),

    /// JSON encode/decode failure.
    Serialization(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyInput => write!(f, "empty input provided"),
            Error::DimensionMismatch { expected, found } => {
                write!(f, "dimension mismatch: expected {expected}, found {found}")
            }
            Error::InvalidClusterCount { requested, n_items } => {
                write!(f, "cannot create {requested} clusters from {n_items} items")
            }
            Error::InvalidParameter { name, message } => {
                write!(f, "invalid parameter '{name}': {message}")
            }
            Error::MissingValue { track_id, feature } => {
                write!(f, "track {track_id} has no value for feature '{feature}'")
            }
            Error::DuplicateTrack(id) => write!(f, "duplicate track id {id}"),
            Error::DegenerateClustering { n_clusters } => {
                write!(f, "degenerate clustering: {n_clusters} non-noise cluster(s)")
            }
            Error::NotFound { track_id } => write!(f, "song id {track_id} not found"),
            Error::UnsupportedMode(mode) => write!(f, "unsupported recommendation mode '{mode}'"),
            Error::UnknownAssignment(name) => write!(f, "no cluster assignment named '{name}'"),
            Error::MissingFeatures { track_id } => {
                write!(f, "track {track_id} has missing feature values")
            }
            Error::TransformMismatch { expected, found } => {
                write!(f, "feature list mismatch: pipeline has {expected}, got {found}")
            }
            Error::Decomposition(msg) => write!(f, "eigendecomposition failed: {msg}"),
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::Io(msg) => write!(f, "io error: {msg}"),
            Error::Serialization(msg) => write!(f, "serialization error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
