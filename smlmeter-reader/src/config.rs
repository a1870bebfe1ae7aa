//! Reader configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via SMLMETER_CONFIG or --config)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Reader configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transport configuration.
    pub transport: TransportConfig,
    /// Decoding configuration.
    pub decode: DecodeConfig,
    /// Output configuration.
    pub output: OutputConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var("SMLMETER_CONFIG") {
            Ok(path) => Self::load_from(path),
            Err(_) => Ok(Self::from_env()),
        }
    }

    /// Loads configuration from the given file, then applies environment
    /// variable overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        self.transport.apply_env_overrides();
        self.decode.apply_env_overrides();
        self.output.apply_env_overrides();
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.transport.validate()
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// How the device path is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Serial port, 8N1 at the configured baud rate.
    #[default]
    Serial,
    /// Plain file: a recorded capture, a FIFO or an already configured tty.
    File,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Device or capture file path.
    pub device: Option<PathBuf>,
    /// How the device is opened.
    pub mode: TransportMode,
    /// Serial baud rate.
    pub baud_rate: u32,
    /// Size of the scratch buffer for a single read.
    pub read_buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            device: None,
            mode: TransportMode::Serial,
            baud_rate: 9600,
            read_buffer_size: 512,
        }
    }
}

impl TransportConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(device) = std::env::var("SMLMETER_DEVICE") {
            if !device.is_empty() {
                self.device = Some(PathBuf::from(device));
            }
        }

        if let Ok(mode) = std::env::var("SMLMETER_TRANSPORT") {
            self.mode = match mode.to_lowercase().as_str() {
                "file" => TransportMode::File,
                _ => TransportMode::Serial,
            };
        }

        if let Ok(baud) = std::env::var("SMLMETER_BAUD_RATE") {
            if let Ok(n) = baud.parse() {
                self.baud_rate = n;
            }
        }

        if let Ok(size) = std::env::var("SMLMETER_READ_BUFFER") {
            if let Ok(n) = size.parse() {
                self.read_buffer_size = n;
            }
        }
    }

    /// Validates transport configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.is_none() {
            return Err(ConfigError::ValidationError(
                "no device configured".to_string(),
            ));
        }
        if self.mode == TransportMode::Serial && self.baud_rate == 0 {
            return Err(ConfigError::ValidationError(
                "baud_rate must be greater than zero".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "read_buffer_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// What to do when a frame contains an unrecognized TLV type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownTypePolicy {
    /// Stop reading and exit with an error.
    #[default]
    Abort,
    /// Report the frame and keep reading.
    SkipFrame,
}

/// Decoding configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Unknown TLV type handling.
    pub on_unknown_type: UnknownTypePolicy,
}

impl DecodeConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(policy) = std::env::var("SMLMETER_ON_UNKNOWN_TYPE") {
            self.on_unknown_type = match policy.to_lowercase().as_str() {
                "skip_frame" | "skip" => UnknownTypePolicy::SkipFrame,
                _ => UnknownTypePolicy::Abort,
            };
        }
    }
}

/// Output format of decoded frames and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Indented element tree.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format.
    pub format: OutputFormat,
}

impl OutputConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(format) = std::env::var("SMLMETER_OUTPUT") {
            self.format = match format.to_lowercase().as_str() {
                "json" => OutputFormat::Json,
                _ => OutputFormat::Text,
            };
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
