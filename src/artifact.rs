//! JSON artifacts: the fitted pipeline and the labelled catalog.
//!
//! Training writes both; serving loads both once and builds a
//! [`crate::recommend::Recommender`]. Loading a pipeline checks its stored
//! fingerprint and that its feature list is the one the caller expects.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::preprocess::Pipeline;

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::Io(format!("{}: {e}", parent.display())))?;
    }
    let file = File::create(path).map_err(|e| Error::Io(format!("{}: {e}", path.display())))?;
    Ok(BufWriter::new(file))
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|e| Error::Io(format!("{}: {e}", path.display())))?;
    Ok(BufReader::new(file))
}

/// Write a pipeline as pretty JSON.
pub fn save_pipeline(pipeline: &Pipeline, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut writer = create(path)?;
    serde_json::to_writer_pretty(&mut writer, pipeline)?;
    writer.flush()?;
    log::info!("saved pipeline ({} features) to {}", pipeline.input_dim(), path.display());
    Ok(())
}

/// Read a pipeline and check it against `expected_features`.
pub fn load_pipeline(path: impl AsRef<Path>, expected_features: &[String]) -> Result<Pipeline> {
    let path = path.as_ref();
    let pipeline: Pipeline = serde_json::from_reader(open(path)?)?;
    pipeline.verify_integrity()?;
    pipeline.verify_features(expected_features)?;
    log::info!("loaded pipeline from {}", path.display());
    Ok(pipeline)
}

/// Write a catalog (tracks and assignments) as JSON.
pub fn save_catalog(catalog: &Catalog, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut writer = create(path)?;
    serde_json::to_writer(&mut writer, catalog)?;
    writer.flush()?;
    log::info!("saved catalog ({} tracks) to {}", catalog.len(), path.display());
    Ok(())
}

/// Read a catalog.
pub fn load_catalog(path: impl AsRef<Path>) -> Result<Catalog> {
    let path = path.as_ref();
    let catalog: Catalog = serde_json::from_reader(open(path)?)?;
    log::info!("loaded catalog ({} tracks) from {}", catalog.len(), path.display());
    Ok(catalog)
}
