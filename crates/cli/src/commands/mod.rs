//! CLI command implementations.

pub mod init;
pub mod mint_token;
pub mod serve;
pub mod usage;

use std::path::Path;
use tollgate_config::TollgateConfig;

/// Load the config file if it exists, otherwise fall back to defaults.
/// Environment overrides apply either way.
pub(crate) fn load_config(path: &Path) -> Result<TollgateConfig, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(TollgateConfig::load_from(path)?)
    } else {
        let mut config = TollgateConfig::default();
        config.apply_env_overrides();
        Ok(config)
    }
}
