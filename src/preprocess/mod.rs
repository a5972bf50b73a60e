//! Feature preprocessing: standard scaling and optional PCA.
//!
//! Audio features live on very different scales (tempo in BPM, loudness in
//! dB, most others in [0, 1]), so every clustering and similarity computation
//! runs on standardized, optionally variance-reduced vectors produced by a
//! [`Pipeline`].

mod pca;
mod pipeline;
mod scaler;

pub use pca::Pca;
pub use pipeline::{feature_fingerprint, Pipeline, PreprocessConfig};
pub use scaler::StandardScaler;
