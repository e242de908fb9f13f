//! Where the bridge keeps its settings file and log.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Settings file name, also used to detect a local config folder
pub const SETTINGS_FILE: &str = "sdapi-bridge.json";
/// Default log file name for `--log` without a path
pub const LOG_FILE: &str = "sdapi-bridge.log";

const APP_DIR: &str = "sdapi-bridge";
const ENV_CONFIG_DIR: &str = "SDAPI_BRIDGE_CONFIG_DIR";

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var (SDAPI_BRIDGE_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(ENV_CONFIG_DIR).ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Get path to a configuration file
///
/// Priority:
/// 1. CLI --config-dir argument
/// 2. SDAPI_BRIDGE_CONFIG_DIR environment variable
/// 3. Local folder IF a bridge file exists there (sdapi-bridge.json, sdapi-bridge.log)
/// 4. Platform-specific config directory from dirs-next (default)
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    get_config_dir(config).join(name)
}

/// Same priority as [`config_file`], falling back to the platform data directory.
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    get_data_dir(config).join(name)
}

/// Ensure that configuration and data directories exist
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = get_config_dir(config);
    let data_dir = get_data_dir(config);

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    if data_dir != config_dir {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }
    Ok(())
}

fn has_local_files(dir: &Path) -> bool {
    [SETTINGS_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

fn resolve_dir(config: &PathConfig, cwd: Option<PathBuf>, platform: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    if let Some(cwd) = cwd.filter(|d| has_local_files(d)) {
        return cwd;
    }
    platform.map_or_else(|| PathBuf::from("."), |dir| dir.join(APP_DIR))
}

fn get_config_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, std::env::current_dir().ok(), dirs_next::config_dir())
}

fn get_data_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, std::env::current_dir().ok(), dirs_next::data_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_with_custom_dir() {
        let config = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };
        assert_eq!(config_file(SETTINGS_FILE, &config), PathBuf::from("/custom/sdapi-bridge.json"));
        assert_eq!(data_file(LOG_FILE, &config), PathBuf::from("/custom/sdapi-bridge.log"));
    }

    #[test]
    fn test_cli_dir_wins_over_env() {
        let config = PathConfig::from_env_and_cli(Some(PathBuf::from("/from-cli")));
        assert_eq!(config.config_dir, Some(PathBuf::from("/from-cli")));
    }

    #[test]
    fn test_local_folder_used_only_with_bridge_files() {
        let cwd = tempfile::tempdir().unwrap();
        let platform = PathBuf::from("/platform");
        let none = PathConfig::default();

        assert_eq!(
            resolve_dir(&none, Some(cwd.path().to_path_buf()), Some(platform.clone())),
            platform.join(APP_DIR)
        );

        std::fs::write(cwd.path().join(SETTINGS_FILE), "{}").unwrap();
        assert_eq!(
            resolve_dir(&none, Some(cwd.path().to_path_buf()), Some(platform)),
            cwd.path()
        );
    }

    #[test]
    fn test_fallback_to_current_dir() {
        assert_eq!(resolve_dir(&PathConfig::default(), None, None), PathBuf::from("."));
    }

    #[test]
    fn test_ensure_dirs_creates_custom_dir() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("nested").join("cfg");
        let config = PathConfig { config_dir: Some(dir.clone()) };
        ensure_dirs(&config).unwrap();
        assert!(dir.is_dir());
    }
}
