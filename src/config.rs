use crate::ranking::validate_labels;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_BAND_SIZE: usize = 50;
pub const DEFAULT_LOG_FILTER: &str = "info";

pub fn default_section_labels() -> Vec<String> {
    ["A", "B", "C", "D", "E", "F", "G"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SectionsConfig {
    pub band_size: usize,
    pub labels: Vec<String>,
}

impl Default for SectionsConfig {
    fn default() -> Self {
        Self {
            band_size: DEFAULT_BAND_SIZE,
            labels: default_section_labels(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Daemon settings. Read once at startup from the file named by
/// `CAMPUSD_CONFIG`, then patched by `CAMPUSD_*` environment overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sections: SectionsConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = match std::env::var_os("CAMPUSD_CONFIG") {
            Some(p) => Self::from_file(Path::new(&p))?,
            None => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("CAMPUSD_BAND_SIZE") {
            self.sections.band_size =
                raw.trim().parse::<usize>().map_err(|e| ConfigError::Invalid {
                    key: "CAMPUSD_BAND_SIZE",
                    message: e.to_string(),
                })?;
        }
        if let Some(raw) = lookup("CAMPUSD_SECTION_LABELS") {
            self.sections.labels = parse_label_list(&raw);
        }
        if let Some(raw) = lookup("CAMPUSD_LOG") {
            if !raw.trim().is_empty() {
                self.logging.filter = raw.trim().to_string();
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sections.band_size == 0 {
            return Err(ConfigError::Invalid {
                key: "sections.band_size",
                message: "must be at least 1".to_string(),
            });
        }
        validate_labels(&self.sections.labels).map_err(|e| ConfigError::Invalid {
            key: "sections.labels",
            message: e.to_string(),
        })?;
        Ok(())
    }
}

pub fn parse_label_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
