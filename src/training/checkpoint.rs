//! Persisting trained models and group histories.
//!
//! Models are stored with `bincode`; group histories as JSON so they can be
//! inspected or plotted outside Rust.

use crate::core::Result;
use crate::gnn::DgaNetwork;
use crate::training::groups::GroupHistory;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

pub fn save_model(model: &DgaNetwork, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut writer, model)?;
    writer.flush()?;
    info!(path = %path.display(), parameters = model.parameter_count(), "model saved");
    Ok(())
}

/// Load a model saved by [`save_model`]. Weights whose dimensions disagree
/// with the stored shape are rejected.
pub fn load_model(path: &Path) -> Result<DgaNetwork> {
    let reader = BufReader::new(File::open(path)?);
    let model: DgaNetwork = bincode::deserialize_from(reader)?;
    model.check_shape()?;
    Ok(model)
}

pub fn save_history(history: &GroupHistory, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, history)?;
    writer.flush()?;
    info!(path = %path.display(), snapshots = history.len(), "group history saved");
    Ok(())
}

pub fn load_history(path: &Path) -> Result<GroupHistory> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
