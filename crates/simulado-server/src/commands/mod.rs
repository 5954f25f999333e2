//! Subcommand implementations.

pub mod init;
pub mod recompute;
pub mod seed;
pub mod serve;
pub mod stats;
pub mod validate;

use std::path::PathBuf;

use anyhow::Result;

use simulado_core::SimuladoEngine;
use simulado_storage::{create_storage, load_config_from, SimuladoConfig};

/// Load the config and build an engine over its storage backend.
pub fn open_engine(config_path: Option<PathBuf>) -> Result<(SimuladoConfig, SimuladoEngine)> {
    let config = load_config_from(config_path.as_deref())?;
    let storage = create_storage(&config.storage)?;
    tracing::debug!(storage = storage.backend(), "storage ready");
    let engine = SimuladoEngine::new(storage, config.selection.clone());
    Ok((config, engine))
}
