//! # Configuration
//!
//! Optional TOML file with three sections:
//!
//! ```toml
//! [layout]
//! column_width = 320
//! row_height = 160
//!
//! [output]
//! directory = "build"
//! pretty_json = true
//!
//! [logging]
//! format = "json"
//! ```
//!
//! Lookup order: `--config`, then `FABLE_CONFIG`, then `./fable.toml`.
//! A missing default file means defaults; a missing explicit file is an
//! error. Command line flags override whatever the file says.

use fable_core::FableError;
use fable_core::layout::LayoutConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "FABLE_CONFIG";

/// Config file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "fable.toml";

/// Environment variable selecting the log format.
pub const LOG_FORMAT_ENV: &str = "FABLE_LOG_FORMAT";

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = FableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(FableError::DeserializationError(format!(
                "Unknown log format '{}' (expected 'text' or 'json')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where compiled and decompiled files go when `-o` is not given.
    pub directory: Option<PathBuf>,
    pub pretty_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: None,
            pretty_json: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FableConfig {
    pub layout: LayoutConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl FableConfig {
    pub fn from_toml(text: &str) -> Result<Self, FableError> {
        toml::from_str(text)
            .map_err(|e| FableError::DeserializationError(format!("Invalid config: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self, FableError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            FableError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(FableError::IoError(format!(
                "Config file {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            FableError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Resolve and load the config file, falling back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, FableError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            return Self::from_file(local);
        }
        Ok(Self::default())
    }

    /// Log format: `FABLE_LOG_FORMAT` wins over the file.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(self.logging.format)
    }

    /// Output directory: the flag, then the file, then the working directory.
    #[must_use]
    pub fn output_dir(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.output.directory.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

// =============================================================================
// TESTS
// =============================================================================
