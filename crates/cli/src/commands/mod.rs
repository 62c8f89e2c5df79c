pub mod config_cmd;
pub mod run;
pub mod tools;

use std::path::PathBuf;

use loopwright_config::AppConfig;

/// Load config from the override path when given, otherwise the default
/// location (with env overrides).
pub fn load_config(path: Option<PathBuf>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_from(&path)?,
        None => AppConfig::load()?,
    };
    Ok(config)
}
