use std::path::PathBuf;

use crate::error::AuthError;

use super::sources::{default_layers, ConfigLayers};
use super::types::AuthConfig;

/// Find the runtime config file, highest precedence first.
///
/// Precedence:
/// 1. `--config` CLI flag
/// 2. `CONSOLE_AUTH_CONFIG` env var
/// 3. `./config/console-auth.json` (project-level)
/// 4. `~/.console-auth/config.json` (home-level)
pub fn discover_config_file(cli_config: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = cli_config {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
        tracing::warn!("Config file {} does not exist, ignoring", p.display());
    }

    if let Ok(env_path) = std::env::var("CONSOLE_AUTH_CONFIG") {
        let p = PathBuf::from(&env_path);
        if p.exists() {
            return Some(p);
        }
    }

    let project_config = PathBuf::from("./config/console-auth.json");
    if project_config.exists() {
        return Some(project_config);
    }

    let home_config = dirs::home_dir()?.join(".console-auth").join("config.json");
    home_config.exists().then_some(home_config)
}

/// Build the layer stack for this process.
pub fn load_layers(cli_config: Option<&str>) -> Result<ConfigLayers, AuthError> {
    default_layers(discover_config_file(cli_config))
}

/// Resolve the configuration snapshot for this process.
pub fn load_config(cli_config: Option<&str>) -> Result<AuthConfig, AuthError> {
    Ok(load_layers(cli_config)?.snapshot())
}
