use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::models::AppConfig;

const CONFIG_FILE: &str = "gateway_config.json";
const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG";
const PORT_ENV: &str = "PORT";
const DB_PATH_ENV: &str = "GATEWAY_DB_PATH";

/// Load application config: file first, then environment overrides
pub fn load_app_config() -> AppResult<AppConfig> {
    let config_path = std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

    let mut config = load_config_file(&config_path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Read a config file. A missing file yields defaults.
pub fn load_config_file(config_path: &Path) -> AppResult<AppConfig> {
    if !config_path.exists() {
        return Ok(AppConfig::new());
    }

    let content = fs::read_to_string(config_path)
        .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

    serde_json::from_str(&content)
        .map_err(|e| AppError::Config(format!("Failed to parse config file: {}", e)))
}

/// Apply `PORT` and `GATEWAY_DB_PATH`. Empty values count as unset.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> AppResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(port) = non_empty(PORT_ENV) {
        config.port = port
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid {} '{}': {}", PORT_ENV, port, e)))?;
    }

    if let Some(path) = non_empty(DB_PATH_ENV) {
        config.database.path = PathBuf::from(path);
    }

    Ok(())
}

/// Save application config
pub fn save_app_config(config: &AppConfig, config_path: &Path) -> AppResult<()> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| AppError::Config(format!("Failed to serialize config: {}", e)))?;

    fs::write(config_path, content)?;
    Ok(())
}
