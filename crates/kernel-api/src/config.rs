//! Run configuration loading from TOML or JSON files.

use std::fs;
use std::path::Path;

use contracts::{ConfigError, RunConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML config {path}: {source}")]
    ParseToml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to parse JSON config {path}: {source}")]
    ParseJson {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported config format for {0} (expected .toml or .json)")]
    UnsupportedFormat(String),
    #[error("invalid config: {0}")]
    Invalid(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Some(Self::Toml),
            Some(ext) if ext.eq_ignore_ascii_case("json") => Some(Self::Json),
            _ => None,
        }
    }
}

/// Read, parse and validate a run configuration. Missing keys take their defaults.
pub fn load_run_config(path: impl AsRef<Path>) -> Result<RunConfig, ConfigLoadError> {
    let path = path.as_ref();
    let label = path.display().to_string();
    let format =
        ConfigFormat::from_path(path).ok_or_else(|| ConfigLoadError::UnsupportedFormat(label.clone()))?;
    let content = fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
        path: label.clone(),
        source,
    })?;
    parse_run_config(&content, format, &label)
}

pub fn parse_run_config(
    content: &str,
    format: ConfigFormat,
    label: &str,
) -> Result<RunConfig, ConfigLoadError> {
    let config: RunConfig = match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(|source| ConfigLoadError::ParseToml {
            path: label.to_string(),
            source,
        })?,
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|source| ConfigLoadError::ParseJson {
                path: label.to_string(),
                source,
            })?
        }
    };
    config.validate()?;
    Ok(config)
}

pub fn render_toml(config: &RunConfig) -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(config)
}
