//! Application Configuration
//!
//! User settings and tuning knobs stored in TOML format. Defaults match
//! the timing and Steam identifiers the game is known to work with.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Game identity settings
    pub game: GameConfig,
    /// Session timing settings
    pub session: SessionConfig,
    /// Download tool settings
    pub download: DownloadConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            session: SessionConfig::default(),
            download: DownloadConfig::default(),
        }
    }
}

/// Which game and Steam depot this manager operates on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Executable name, used for install validation and exit polling
    pub exe_name: String,
    /// Steam app id
    pub app_id: String,
    /// Steam depot id holding the game files
    pub depot_id: String,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            exe_name: "Trailmakers.exe".to_string(),
            app_id: "585420".to_string(),
            depot_id: "585421".to_string(),
        }
    }
}

/// Timing for launch monitoring and file settling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds between process table polls while the game runs
    pub poll_interval_secs: u64,
    /// Seconds to wait after launch before the first poll
    pub initial_poll_delay_secs: u64,
    /// Consecutive not-found samples required to declare the game closed
    pub exit_debounce_samples: u32,
    /// Seconds to wait after exit detection before touching save files
    pub settle_delay_secs: u64,
    /// Seconds to wait before restore copies, for file handles to release
    pub restore_settle_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            initial_poll_delay_secs: 3,
            exit_debounce_samples: 3,
            settle_delay_secs: 2,
            restore_settle_secs: 1,
        }
    }
}

/// Settings for the external depot download tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Path to the DepotDownloader executable; when unset, the name is
    /// resolved next to our own binary and then via PATH
    pub depot_downloader_path: Option<PathBuf>,
    /// Parallel chunk downloads passed to the tool
    pub max_downloads: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            depot_downloader_path: None,
            max_downloads: 26,
        }
    }
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "trailvault", "Trailvault")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert_eq!(config.game.exe_name, "Trailmakers.exe");
        assert_eq!(config.game.app_id, "585420");
        assert_eq!(config.game.depot_id, "585421");

        assert_eq!(config.session.poll_interval_secs, 2);
        assert_eq!(config.session.initial_poll_delay_secs, 3);
        assert_eq!(config.session.exit_debounce_samples, 3);
        assert_eq!(config.session.settle_delay_secs, 2);
        assert_eq!(config.session.restore_settle_secs, 1);

        assert!(config.download.depot_downloader_path.is_none());
        assert_eq!(config.download.max_downloads, 26);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AppConfig::default();

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.game.exe_name, parsed.game.exe_name);
        assert_eq!(
            config.session.exit_debounce_samples,
            parsed.session.exit_debounce_samples
        );
        assert_eq!(config.download.max_downloads, parsed.download.max_downloads);
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = AppConfig::default();
        config.session.poll_interval_secs = 5;

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(loaded.session.poll_interval_secs, 5);
        assert_eq!(loaded.game.app_id, config.game.app_id);
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
