//! Locating and loading the desk configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use roofdesk_core::DeskConfig;
use tracing::{debug, info};

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV: &str = "ROOFDESK_CONFIG";

/// Path of the configuration file.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV).map_or_else(
        || app_dir(dirs::config_dir()).join("config.json"),
        PathBuf::from,
    )
}

/// Default database file.
pub fn default_database_path() -> PathBuf {
    app_dir(dirs::data_dir()).join("roofdesk.db")
}

fn app_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join("roofdesk")
}

/// Loads the configuration, filling in the default database location.
///
/// A missing file yields defaults.
pub fn load() -> Result<DeskConfig> {
    let path = config_path();
    let mut config = DeskConfig::load(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    debug!(path = %path.display(), "Configuration loaded");

    if config.database_path.is_none() {
        let database = default_database_path();
        if let Some(dir) = database.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        info!(path = %database.display(), "Using default database");
        config.database_path = Some(database);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_dir_falls_back_to_cwd() {
        assert_eq!(app_dir(None), PathBuf::from("./roofdesk"));
        assert_eq!(
            app_dir(Some(PathBuf::from("/etc"))),
            PathBuf::from("/etc/roofdesk")
        );
    }

    #[test]
    fn test_default_database_file_name() {
        assert!(default_database_path().ends_with("roofdesk/roofdesk.db"));
    }
}
