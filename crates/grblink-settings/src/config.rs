//! Configuration for grblink
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML file formats; the default file lives in the platform config
//! directory.
//!
//! Configuration is organized into sections:
//! - Connection (port, baud rate, loop timing)
//! - Streaming (pacing, progress, motion-off command)
//! - Framing (verification power, feed, corner delay)
//! - Jog (default step and feed)

use grblink_communication::{
    ConnectionConfig, FramingConfig, StreamingConfig, MOTION_OFF_COMMAND,
};
use grblink_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port; empty means it must be given on the command line
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Delay after opening the port before the loops start
    pub settle_delay_ms: u64,
    /// Interval between status queries
    pub poll_interval_ms: u64,
    /// Back-off after a failed status query
    pub poll_error_backoff_ms: u64,
    /// Transport read timeout
    pub read_timeout_ms: u64,
    /// Query status periodically while connected
    pub status_polling: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115200,
            settle_delay_ms: 1000,
            poll_interval_ms: 250,
            poll_error_backoff_ms: 1000,
            read_timeout_ms: 50,
            status_polling: true,
        }
    }
}

/// Streaming settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Fixed delay after each streamed command
    pub command_delay_ms: u64,
    /// Report progress every this many entries
    pub progress_interval: usize,
    /// Command that turns the laser/spindle off
    pub motion_off_command: String,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            command_delay_ms: 20,
            progress_interval: 10,
            motion_off_command: MOTION_OFF_COMMAND.to_string(),
        }
    }
}

/// Framing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingSettings {
    /// Laser/spindle power while tracing
    pub power: u32,
    /// Feed rate along the frame, mm/min
    pub feed_rate: f64,
    /// Pause at each corner
    pub corner_delay_ms: u64,
}

impl Default for FramingSettings {
    fn default() -> Self {
        Self {
            power: 10,
            feed_rate: 3000.0,
            corner_delay_ms: 250,
        }
    }
}

/// Jog defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JogSettings {
    /// Step distance in mm
    pub step_mm: f64,
    /// Feed rate in mm/min
    pub feed_rate: f64,
}

impl Default for JogSettings {
    fn default() -> Self {
        Self {
            step_mm: 1.0,
            feed_rate: 1000.0,
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Streaming settings
    pub streaming: StreamingSettings,
    /// Framing settings
    pub framing: FramingSettings,
    /// Jog defaults
    pub jog: JogSettings,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> Result<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        _ => Err(Error::other("Config file must be .json or .toml")),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file: `<config dir>/grblink/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("grblink").join("config.toml"))
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::other(format!("Failed to read config file: {}", e)))?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)
                .map_err(|e| Error::other(format!("Invalid JSON config: {}", e)))?,
            Format::Toml => toml::from_str(&content)
                .map_err(|e| Error::other(format!("Invalid TOML config: {}", e)))?,
        };

        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path`, or the default file if it exists, or defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Save config to file (JSON or TOML), creating parent directories
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)
                .map_err(|e| Error::other(format!("Failed to serialize config: {}", e)))?,
            Format::Toml => toml::to_string_pretty(self)
                .map_err(|e| Error::other(format!("Failed to serialize config: {}", e)))?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::other(format!("Failed to create config dir: {}", e)))?;
        }
        std::fs::write(path, content)
            .map_err(|e| Error::other(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.connection.baud_rate == 0 {
            return Err(Error::other("Baud rate must be > 0"));
        }
        if self.connection.poll_interval_ms == 0 {
            return Err(Error::other("Poll interval must be > 0"));
        }
        if self.connection.read_timeout_ms == 0 {
            return Err(Error::other("Read timeout must be > 0"));
        }

        if self.streaming.progress_interval == 0 {
            return Err(Error::other("Progress interval must be > 0"));
        }
        if self.streaming.motion_off_command.trim().is_empty() {
            return Err(Error::other("Motion-off command must not be empty"));
        }

        if !self.framing.feed_rate.is_finite() || self.framing.feed_rate <= 0.0 {
            return Err(Error::other("Framing feed rate must be > 0"));
        }
        if self.framing.corner_delay_ms == 0 {
            return Err(Error::other("Framing corner delay must be > 0"));
        }

        if !self.jog.feed_rate.is_finite() || self.jog.feed_rate <= 0.0 {
            return Err(Error::other("Jog feed rate must be > 0"));
        }
        if !self.jog.step_mm.is_finite() || self.jog.step_mm < 0.0 {
            return Err(Error::other("Jog step must be >= 0"));
        }

        Ok(())
    }

    /// Runtime settings for a `Connection`
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            settle_delay: Duration::from_millis(self.connection.settle_delay_ms),
            poll_interval: Duration::from_millis(self.connection.poll_interval_ms),
            poll_error_backoff: Duration::from_millis(self.connection.poll_error_backoff_ms),
            read_timeout_ms: self.connection.read_timeout_ms,
            status_polling: self.connection.status_polling,
            ..ConnectionConfig::default()
        }
    }

    /// Runtime settings for a `StreamingEngine`
    pub fn streaming_config(&self) -> StreamingConfig {
        StreamingConfig {
            command_delay: Duration::from_millis(self.streaming.command_delay_ms),
            progress_interval: self.streaming.progress_interval,
            motion_off_command: self.streaming.motion_off_command.clone(),
        }
    }

    /// Runtime settings for the framing loop
    pub fn framing_config(&self) -> FramingConfig {
        FramingConfig {
            power: self.framing.power,
            feed_rate: self.framing.feed_rate,
            corner_delay: Duration::from_millis(self.framing.corner_delay_ms),
        }
    }
}
