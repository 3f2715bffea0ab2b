//! # Config Loader
//!
//! Configuration loading for the streamer.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Fill in defaults (see [`sanitize`])
//! - Validate configuration legality
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("flushline.toml")).unwrap();
//! println!("Sink: {}", config.sink.name);
//! ```

mod parser;
mod sanitizer;
mod validator;

pub use contracts::StreamerConfig;
pub use parser::ConfigFormat;
pub use sanitizer::SYNCHRONOUS_QUEUE;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
/// Every returned config is sanitized and validated.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<StreamerConfig, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<StreamerConfig, ContractError> {
        let parsed = parser::parse(content, format)?;
        let config = sanitizer::sanitize(&parsed);
        validator::validate(&config)?;
        Ok(config)
    }

    /// Fill in defaults without validating; the input is left untouched
    pub fn sanitize(config: &StreamerConfig) -> StreamerConfig {
        sanitizer::sanitize(config)
    }

    /// Validate an already sanitized config
    pub fn validate(config: &StreamerConfig) -> Result<(), ContractError> {
        validator::validate(config)
    }

    /// Serialize StreamerConfig to TOML string
    pub fn to_toml(config: &StreamerConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize StreamerConfig to JSON string
    pub fn to_json(config: &StreamerConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }
}
