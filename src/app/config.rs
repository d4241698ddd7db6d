//! Configuration management
//!
//! TOML configuration persisted at `~/.deskbench/config.toml`, with
//! per-field validation and forward-compatible loading: sections or fields
//! missing from an older file fall back to their defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::record::Region;
use crate::replay::SinkCommands;

/// Harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Recording settings
    pub record: RecordConfig,
    /// Replay settings
    pub replay: ReplayConfig,
    /// Evaluation settings
    pub eval: EvalConfig,
    /// Storage settings
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            record: RecordConfig::default(),
            replay: ReplayConfig::default(),
            eval: EvalConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Recording configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    /// Target capture rate; also the mouse-move sampling rate
    pub fps: u32,
    /// Capacity of each input ring (must be a power of 2)
    pub ring_capacity: usize,
    /// Key combo that stops a recording
    pub stop_hotkey: Vec<String>,
    /// Screenshot command; must contain a `{path}` placeholder. Empty
    /// disables screen capture.
    pub capture_command: String,
    /// Screen rectangle to capture, in pixels
    pub region: Region,
    /// Shell command that minimizes the controlling window before capture.
    /// Empty disables window management.
    pub minimize_command: String,
    /// Shell command that restores the controlling window after capture
    pub restore_command: String,
    /// Force remote mode: window management off even when commands are set.
    /// Remote sessions are also auto-detected from the environment.
    pub remote: bool,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            fps: 10,
            ring_capacity: 4096,
            stop_hotkey: vec![
                "ctrl".to_string(),
                "shift".to_string(),
                "q".to_string(),
            ],
            capture_command: "scrot -o {path}".to_string(),
            region: Region::default(),
            minimize_command: String::new(),
            restore_command: String::new(),
            remote: false,
        }
    }
}

/// Replay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Log actions instead of injecting them
    pub dry_run: bool,
    /// Injection command templates
    pub commands: SinkCommands,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            commands: SinkCommands::default(),
        }
    }
}

/// Evaluation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Gate destructive reset steps behind interactive confirmation
    pub confirm_destructive: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            confirm_destructive: true,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding saved sessions, one subdirectory per task
    pub sessions_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sessions_dir: dirs::home_dir()
                .map(|h| h.join(".deskbench").join("sessions"))
                .unwrap_or_else(|| PathBuf::from("sessions")),
        }
    }
}

impl Config {
    /// Validate configuration values.
    pub fn validate(&self) -> crate::Result<()> {
        if self.record.fps == 0 || self.record.fps > 240 {
            return Err(crate::Error::Config(format!(
                "record.fps must be between 1 and 240, got {}",
                self.record.fps
            )));
        }

        let size = self.record.ring_capacity;
        if size == 0 || (size & (size - 1)) != 0 {
            return Err(crate::Error::Config(format!(
                "record.ring_capacity must be a power of 2, got {}",
                size
            )));
        }

        if !self.record.capture_command.is_empty()
            && !self.record.capture_command.contains("{path}")
        {
            return Err(crate::Error::Config(
                "record.capture_command must contain a {path} placeholder".to_string(),
            ));
        }

        if self.record.region.width == 0 || self.record.region.height == 0 {
            return Err(crate::Error::Config(format!(
                "record.region must have nonzero size, got {}x{}",
                self.record.region.width, self.record.region.height
            )));
        }

        if self.record.stop_hotkey.iter().any(String::is_empty) {
            return Err(crate::Error::Config(
                "record.stop_hotkey must not contain empty key names".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from a file.
    pub fn load(path: &PathBuf) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default path, falling back to defaults when the file
    /// does not exist.
    pub fn load_default() -> crate::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &PathBuf) -> crate::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save to the default path.
    pub fn save_default(&self) -> crate::Result<()> {
        self.save(&Self::default_path())
    }

    /// Default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".deskbench").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> crate::Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(format!("Failed to serialize config: {}", e)))
    }
}
