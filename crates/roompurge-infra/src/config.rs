//! Service configuration loader.
//!
//! Reads `config.toml` from the data directory (`~/.roompurge/` by default)
//! and deserializes it into [`ServiceConfig`]. Falls back to defaults when
//! the file is missing or malformed.

use std::path::{Path, PathBuf};

use roompurge_types::config::ServiceConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "ROOMPURGE_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `ROOMPURGE_DATA_DIR` environment variable
/// 2. `~/.roompurge`
/// 3. `.roompurge` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".roompurge");
    }

    PathBuf::from(".roompurge")
}

/// Load service configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`ServiceConfig::default()`].
/// - Unreadable or unparseable file: logs a warning, returns the default.
pub async fn load_service_config(data_dir: &Path) -> ServiceConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return ServiceConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return ServiceConfig::default();
        }
    };

    match toml::from_str::<ServiceConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            ServiceConfig::default()
        }
    }
}
