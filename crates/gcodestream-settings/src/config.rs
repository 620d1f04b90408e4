//! Configuration and settings management for GCodeStream
//!
//! Provides configuration file handling and validation.
//! Supports JSON and TOML file formats stored in platform-specific directories.
//!
//! Configuration is organized into logical sections:
//! - Connection settings (port, baud rate)
//! - Stream settings (firmware flavor, buffer capacity, timeouts)
//! - File processing settings (normalization, arc expansion, spooling)

use crate::error::SettingsError;
use gcodestream_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Firmware family the stream controller talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirmwareKind {
    /// GRBL and derivatives: byte-counting receive buffer
    #[default]
    Grbl,
    /// Smoothieware: one acknowledgement per command
    Smoothieware,
}

impl std::fmt::Display for FirmwareKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Grbl => write!(f, "grbl"),
            Self::Smoothieware => write!(f, "smoothieware"),
        }
    }
}

impl std::str::FromStr for FirmwareKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "grbl" => Ok(Self::Grbl),
            "smoothie" | "smoothieware" => Ok(Self::Smoothieware),
            other => Err(ConfigError::Unknown {
                kind: "firmware".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// When arcs are replaced by line segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcExpansionMode {
    /// Arcs are streamed as-is
    #[default]
    Never,
    /// Every arc is expanded (controllers without arc support)
    Always,
    /// Only arcs no longer than `arc_length_threshold` are expanded
    BelowThreshold,
}

/// Connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port name
    pub port: String,
    /// Baud rate for serial connections
    pub baud_rate: u32,
    /// Read timeout for the transport in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115_200,
            read_timeout_ms: 10,
        }
    }
}

/// Streaming settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Firmware flavor
    pub firmware: FirmwareKind,
    /// Receive buffer capacity: bytes for GRBL, commands for Smoothieware
    pub buffer_capacity: usize,
    /// Keep at most one command in flight
    pub single_step_mode: bool,
    /// Interval between status polls in milliseconds
    pub status_poll_interval_ms: u64,
    /// Upper bound when waiting for a single command's completion
    pub completion_timeout_ms: u64,
    /// Broadcast channel capacity for stream events
    pub event_buffer_size: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            firmware: FirmwareKind::Grbl,
            buffer_capacity: 128,
            single_step_mode: false,
            status_poll_interval_ms: 200,
            completion_timeout_ms: 10_000,
            event_buffer_size: 100,
        }
    }
}

/// File processing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileProcessingSettings {
    /// When arcs are expanded into line segments
    pub arc_expansion: ArcExpansionMode,
    /// Arc segment length in mm
    pub arc_segment_length: f64,
    /// Arcs up to this length (mm) are expanded in `below_threshold` mode
    pub arc_length_threshold: f64,
    /// Maximum line length in characters
    pub max_line_length: usize,
    /// Truncate numbers to this many decimals
    pub decimal_precision: Option<usize>,
    /// Strip comments from sent commands
    pub remove_comments: bool,
    /// Strip all whitespace from sent commands
    pub remove_whitespace: bool,
    /// Drop M30 program end commands
    pub strip_m30: bool,
    /// Jobs with more rows than this are spooled to disk
    pub spool_threshold_rows: usize,
    /// Abort loading on the first malformed line
    pub strict: bool,
}

impl Default for FileProcessingSettings {
    fn default() -> Self {
        Self {
            arc_expansion: ArcExpansionMode::Never,
            arc_segment_length: 0.5,
            arc_length_threshold: 2.0,
            max_line_length: 256,
            decimal_precision: None,
            remove_comments: true,
            remove_whitespace: false,
            strip_m30: false,
            spool_threshold_rows: 100_000,
            strict: false,
        }
    }
}

impl FileProcessingSettings {
    /// Check values that would make normalization impossible
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arc_expansion != ArcExpansionMode::Never
            && (self.arc_segment_length <= 0.0 || self.arc_segment_length.is_nan())
        {
            return Err(ConfigError::invalid(
                "file_processing.arc_segment_length",
                format!("must be > 0, got {}", self.arc_segment_length),
            ));
        }
        if self.arc_length_threshold < 0.0 || self.arc_length_threshold.is_nan() {
            return Err(ConfigError::invalid(
                "file_processing.arc_length_threshold",
                "must not be negative",
            ));
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::invalid(
                "file_processing.max_line_length",
                "must be > 0",
            ));
        }
        Ok(())
    }
}

impl StreamSettings {
    /// Check values that would make streaming impossible
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_capacity == 0 {
            return Err(ConfigError::invalid(
                "stream.buffer_capacity",
                "must be > 0",
            ));
        }
        if self.completion_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "stream.completion_timeout_ms",
                "must be > 0",
            ));
        }
        if self.event_buffer_size == 0 {
            return Err(ConfigError::invalid(
                "stream.event_buffer_size",
                "must be > 0",
            ));
        }
        Ok(())
    }
}

/// Complete application configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Stream settings
    pub stream: StreamSettings,
    /// File processing settings
    pub file_processing: FileProcessingSettings,
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config location: `<config dir>/gcodestream/config.toml`
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        dirs::config_dir()
            .map(|dir| dir.join("gcodestream").join("config.toml"))
            .ok_or_else(|| SettingsError::ConfigDirectory("no config directory".to_string()))
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content)?
        } else {
            return Err(SettingsError::UnsupportedFormat(path.display().to_string()));
        };

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        self.validate()?;

        let content = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::to_string_pretty(self)?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::to_string_pretty(self)?
        } else {
            return Err(SettingsError::UnsupportedFormat(path.display().to_string()));
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.baud_rate == 0 {
            return Err(ConfigError::invalid("connection.baud_rate", "must be > 0"));
        }
        self.stream.validate()?;
        self.file_processing.validate()
    }
}
