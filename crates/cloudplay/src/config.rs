//! Loading [`WorkerConfig`] from TOML.

use std::path::Path;

use cloudplay_room::WorkerConfig;

use crate::CloudplayError;

/// Reads and parses the worker config at `path`.
pub fn load_config(path: impl AsRef<Path>) -> Result<WorkerConfig, CloudplayError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| CloudplayError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&text)?;
    tracing::info!(path = %path.display(), cores = config.emulator.cores.len(), "config loaded");
    Ok(config)
}

/// Parses a worker config document. Missing sections take their defaults.
pub fn parse_config(text: &str) -> Result<WorkerConfig, CloudplayError> {
    Ok(toml::from_str(text)?)
}
