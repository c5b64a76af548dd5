//! Where `ames.json` and `ames.log` live.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment override for the config directory
pub const CONFIG_DIR_ENV: &str = "AMES_CONFIG_DIR";
/// Settings file name
pub const SETTINGS_FILE: &str = "ames.json";
/// Log file name used by `--log` without a path
pub const LOG_FILE: &str = "ames.log";

const APP_DIR: &str = "ames";

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var (AMES_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Path to a configuration file.
///
/// Priority:
/// 1. CLI --config-dir argument
/// 2. AMES_CONFIG_DIR environment variable
/// 3. Current folder IF `ames.json` or `ames.log` exist there
/// 4. Platform config directory from dirs-next (`~/.config/ames` on Linux)
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::config_dir()).join(name)
}

/// Path to a data file (logs). Same priority as [`config_file`], ending in
/// the platform data directory (`~/.local/share/ames` on Linux).
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::data_dir()).join(name)
}

/// Create the config and data directories if missing
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = resolve_dir(config, dirs_next::config_dir());
    let data_dir = resolve_dir(config, dirs_next::data_dir());

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    }
    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }
    Ok(())
}

fn has_local_config_files(dir: &Path) -> bool {
    [SETTINGS_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

fn resolve_dir(config: &PathConfig, platform: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    if let Ok(current_dir) = std::env::current_dir()
        && has_local_config_files(&current_dir)
    {
        return current_dir;
    }

    platform
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_dir_wins() {
        let config = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };
        assert_eq!(config_file("ames.json", &config), PathBuf::from("/custom/ames.json"));
        assert_eq!(data_file("ames.log", &config), PathBuf::from("/custom/ames.log"));
    }

    #[test]
    fn test_cli_dir_beats_env() {
        let config = PathConfig::from_env_and_cli(Some(PathBuf::from("/from/cli")));
        assert_eq!(config.config_dir, Some(PathBuf::from("/from/cli")));
    }

    #[test]
    fn test_platform_fallback_names_app() {
        let dir = resolve_dir(&PathConfig::default(), Some(PathBuf::from("/platform")));
        // Either the platform dir or a cwd that happens to hold ames files
        assert!(dir == PathBuf::from("/platform/ames") || has_local_config_files(&dir));
    }

    #[test]
    fn test_local_files_detected() {
        let dir = std::env::temp_dir().join(format!("ames_cfg_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        assert!(!has_local_config_files(&dir));
        std::fs::write(dir.join(LOG_FILE), "").unwrap();
        assert!(has_local_config_files(&dir));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_ensure_dirs_creates_custom_dir() {
        let dir = std::env::temp_dir().join(format!("ames_cfg_{}", uuid::Uuid::new_v4()));
        let config = PathConfig {
            config_dir: Some(dir.join("nested")),
        };
        ensure_dirs(&config).unwrap();
        assert!(dir.join("nested").is_dir());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
