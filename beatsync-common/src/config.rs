//! Configuration loading and config file resolution
//!
//! Bootstrap configuration comes from a TOML file resolved in this order:
//! 1. Explicit path (command-line `--config` or `BEATSYNC_CONFIG`)
//! 2. Per-user config file (`~/.config/beatsync/config.toml` on Linux)
//! 3. Built-in defaults
//!
//! A missing file is never fatal: a warning is logged and defaults are used.
//! A file that exists but does not parse is an error.

use crate::music::Tempo;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Directory name used under the platform config directory
pub const APP_DIR_NAME: &str = "beatsync";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "BEATSYNC_CONFIG";

/// Shortest poll cadence accepted
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// HTTP control API port
    pub port: u16,

    /// HTTP control API bind address
    pub bind_address: String,

    pub metronome: MetronomeConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

/// Metronome and tick output settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    /// Tempo at startup
    pub initial_bpm: u32,

    /// Tick sound file (None = synthesized click)
    pub tick_sound: Option<PathBuf>,

    /// Tick volume, 0.0-1.0
    pub volume: f32,

    /// Output device name (None = system default)
    pub audio_device: Option<String>,
}

/// Music service synchronization settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,

    /// Now-playing poll cadence in milliseconds
    pub poll_interval_ms: u64,

    pub api_base_url: String,

    pub request_timeout_ms: u64,

    /// Consecutive failures logged at warn level before quieting down
    pub failure_log_threshold: u32,

    /// Credentials JSON file (None = platform default)
    pub credentials_file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: 5750,
            bind_address: "127.0.0.1".to_string(),
            metronome: MetronomeConfig::default(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            initial_bpm: Tempo::DEFAULT.bpm(),
            tick_sound: None,
            volume: 0.8,
            audio_device: None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 500,
            api_base_url: "https://api.spotify.com/v1".to_string(),
            request_timeout_ms: 5000,
            failure_log_threshold: 3,
            credentials_file: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()
    }

    /// Resolve and load the config file, falling back to defaults.
    ///
    /// An explicitly named file that is missing is still only a warning.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let candidate = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
            .or_else(default_config_file);

        match candidate {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                warn!("Could not determine config directory, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Check ranges; out-of-range volume is clamped rather than rejected
    pub fn validate(mut self) -> Result<Self> {
        Tempo::new(self.metronome.initial_bpm)
            .map_err(|e| Error::Config(format!("metronome.initial_bpm: {}", e)))?;

        if self.sync.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            return Err(Error::Config(format!(
                "sync.poll_interval_ms must be at least {} (got {})",
                MIN_POLL_INTERVAL_MS, self.sync.poll_interval_ms
            )));
        }

        if !(0.0..=1.0).contains(&self.metronome.volume) {
            warn!(
                "metronome.volume {} outside 0.0-1.0, clamping",
                self.metronome.volume
            );
            self.metronome.volume = self.metronome.volume.clamp(0.0, 1.0);
        }

        Ok(self)
    }

    /// Initial tempo as a validated value
    pub fn initial_tempo(&self) -> Tempo {
        Tempo::new(self.metronome.initial_bpm).unwrap_or_default()
    }

    /// Credentials file, explicit or platform default
    pub fn credentials_path(&self) -> Option<PathBuf> {
        self.sync
            .credentials_file
            .clone()
            .or_else(|| config_dir().map(|d| d.join("credentials.json")))
    }

    /// Default tracing filter for this config's log level
    pub fn log_filter(&self) -> String {
        let level = &self.logging.level;
        format!(
            "beatsync_ap={},beatsync_common={},tower_http=info",
            level, level
        )
    }
}

/// Per-user beatsync config directory
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME))
}

/// Per-user config file location
pub fn default_config_file() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.port, 5750);
        assert_eq!(config.metronome.initial_bpm, 60);
        assert_eq!(config.sync.poll_interval_ms, 500);
        assert!(config.sync.enabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            port = 6000

            [sync]
            poll_interval_ms = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 6000);
        assert_eq!(config.sync.poll_interval_ms, 1000);
        assert_eq!(config.sync.failure_log_threshold, 3);
        assert_eq!(config.metronome.initial_bpm, 60);
    }

    #[test]
    fn test_validate_rejects_bad_tempo_and_poll() {
        let mut config = TomlConfig::default();
        config.metronome.initial_bpm = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = TomlConfig::default();
        config.sync.poll_interval_ms = 10;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_clamps_volume() {
        let mut config = TomlConfig::default();
        config.metronome.volume = 1.7;
        let config = config.validate().unwrap();
        assert_eq!(config.metronome.volume, 1.0);
    }

    #[test]
    fn test_log_filter_uses_level() {
        let mut config = TomlConfig::default();
        config.logging.level = "debug".to_string();
        assert!(config.log_filter().starts_with("beatsync_ap=debug"));
    }
}
