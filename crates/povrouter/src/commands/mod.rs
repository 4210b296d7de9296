//! Command handlers, one module per subcommand.

pub mod config_cmd;
pub mod serve;
pub mod sources;

use std::path::PathBuf;

use povrouter_config::{Config, config_path, load_config};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file in effect: `--config` / `POVROUTER_CONFIG`, else the platform default.
pub fn resolve_config_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config_path)
}

/// Load the layered config along with the path it was read from.
pub fn load(global: &GlobalOpts) -> Result<(PathBuf, Config), CliError> {
    let path = resolve_config_path(global);
    let config = load_config(&path)?;
    tracing::debug!(path = %path.display(), "configuration loaded");
    Ok((path, config))
}
