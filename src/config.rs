//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\mediashelf\config.toml
//! - macOS: ~/Library/Application Support/mediashelf/config.toml
//! - Linux: ~/.config/mediashelf/config.toml
//!
//! Settings are loaded at startup; loading never fails - a missing or
//! unparseable file falls back to defaults with a logged warning.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::model::MediaKind;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Library root directories, one per media kind
    pub library: LibraryConfig,

    /// Synchronization behavior
    pub sync: SyncConfig,

    /// Database location
    pub database: DatabaseConfig,
}

/// Library root directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Root directory for audiobooks
    pub audiobooks: PathBuf,

    /// Root directory for music albums
    pub music: PathBuf,

    /// Root directory for sleep-sound sets
    pub sleep: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        let base = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mediashelf");
        Self {
            audiobooks: base.join("audiobooks"),
            music: base.join("music"),
            sleep: base.join("sleep"),
        }
    }
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period after the last file system event before a sync
    /// triggers, in seconds
    pub debounce_secs: u64,

    /// Warm-up delay before the startup sync pass, in seconds
    pub startup_delay_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_secs: 5,
            startup_delay_secs: 3,
        }
    }
}

/// Database settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file path; defaults to the db module's default name in
    /// the working directory when unset
    pub path: Option<PathBuf>,
}

impl Config {
    /// The configured (root, kind) pairs, in fixed kind order.
    pub fn roots(&self) -> Vec<(PathBuf, MediaKind)> {
        vec![
            (self.library.audiobooks.clone(), MediaKind::Audiobook),
            (self.library.music.clone(), MediaKind::Music),
            (self.library.sleep.clone(), MediaKind::Sleep),
        ]
    }

    /// The root directory for one media kind.
    pub fn root_for(&self, kind: MediaKind) -> &Path {
        match kind {
            MediaKind::Audiobook => &self.library.audiobooks,
            MediaKind::Music => &self.library.music,
            MediaKind::Sleep => &self.library.sleep,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mediashelf"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to disk
///
/// Creates the config directory if it doesn't exist. Writes atomically
/// (temp file, then rename).
pub fn save(config: &Config) -> crate::error::Result<()> {
    use crate::error::Error;

    let dir = config_dir().ok_or_else(|| Error::config("could not determine config directory"))?;
    let path = dir.join("config.toml");

    std::fs::create_dir_all(&dir)?;

    let contents =
        toml::to_string_pretty(config).map_err(|e| Error::config(format!("serialize: {e}")))?;

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents)?;
    std::fs::rename(&temp_path, &path)?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[library]"));
        assert!(toml.contains("[sync]"));
        assert!(toml.contains("[database]"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.library.music = PathBuf::from("/srv/media/music");
        config.sync.debounce_secs = 10;
        config.database.path = Some(PathBuf::from("/var/lib/mediashelf.db"));

        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        assert_eq!(parsed.library.music, PathBuf::from("/srv/media/music"));
        assert_eq!(parsed.sync.debounce_secs, 10);
        assert_eq!(
            parsed.database.path,
            Some(PathBuf::from("/var/lib/mediashelf.db"))
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[library]
music = "/music"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.library.music, PathBuf::from("/music"));
        // Other fields use defaults
        assert_eq!(config.sync.debounce_secs, 5);
        assert!(config.database.path.is_none());
    }

    #[test]
    fn test_roots_cover_all_kinds_in_order() {
        let config = Config::default();
        let kinds: Vec<MediaKind> = config.roots().into_iter().map(|(_, k)| k).collect();
        assert_eq!(
            kinds,
            vec![MediaKind::Audiobook, MediaKind::Music, MediaKind::Sleep]
        );
    }

    #[test]
    fn test_root_for_matches_roots() {
        let config = Config::default();
        for (path, kind) in config.roots() {
            assert_eq!(config.root_for(kind), path.as_path());
        }
    }
}
