use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::api::DEFAULT_API_URL;

pub const CONFIG_FILE_NAME: &str = ".taskmate.toml";

pub const KEYS: [&str; 7] = [
    "api_url",
    "request_timeout_secs",
    "notification_secs",
    "insight_backend",
    "ollama_base_url",
    "ollama_model",
    "log_level",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("unknown config key '{0}' (valid keys: {keys})", keys = KEYS.join(", "))]
    UnknownKey(String),

    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightBackend {
    #[default]
    Stub,
    Ollama,
}

impl FromStr for InsightBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stub" => Ok(InsightBackend::Stub),
            "ollama" => Ok(InsightBackend::Ollama),
            other => Err(format!("expected 'stub' or 'ollama', got '{}'", other)),
        }
    }
}

impl fmt::Display for InsightBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsightBackend::Stub => f.write_str("stub"),
            InsightBackend::Ollama => f.write_str("ollama"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub notification_secs: u64,
    pub insight_backend: InsightBackend,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: 10,
            notification_secs: 6,
            insight_backend: InsightBackend::Stub,
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "qwen2.5-coder:0.5b".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// `$TASKMATE_CONFIG`, else `~/.taskmate.toml`.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("TASKMATE_CONFIG") {
            return PathBuf::from(path);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_FILE_NAME)
    }

    /// Reads the file at `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config file at {}, using defaults", path.display());
                return Ok(Config::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = toml::to_string_pretty(self)?;
        fs::write(path, raw).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies environment overrides on top of file values.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let overrides = [
            ("TASKMATE_API_URL", "api_url"),
            ("TASKMATE_INSIGHT", "insight_backend"),
            ("OLLAMA_BASE_URL", "ollama_base_url"),
            ("OLLAMA_MODEL_NAME", "ollama_model"),
        ];
        for (var, key) in overrides {
            if let Some(value) = lookup(var) {
                if let Err(err) = self.set(key, &value) {
                    log::warn!("Ignoring {}: {}", var, err);
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Result<String, ConfigError> {
        let value = match key {
            "api_url" => self.api_url.clone(),
            "request_timeout_secs" => self.request_timeout_secs.to_string(),
            "notification_secs" => self.notification_secs.to_string(),
            "insight_backend" => self.insight_backend.to_string(),
            "ollama_base_url" => self.ollama_base_url.clone(),
            "ollama_model" => self.ollama_model.clone(),
            "log_level" => self.log_level.clone(),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        };
        Ok(value)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason,
        };
        match key {
            "api_url" => {
                url::Url::parse(value).map_err(|e| invalid(e.to_string()))?;
                self.api_url = value.to_string();
            }
            "request_timeout_secs" => self.request_timeout_secs = parse_secs(value).map_err(invalid)?,
            "notification_secs" => self.notification_secs = parse_secs(value).map_err(invalid)?,
            "insight_backend" => self.insight_backend = value.parse().map_err(invalid)?,
            "ollama_base_url" => {
                url::Url::parse(value).map_err(|e| invalid(e.to_string()))?;
                self.ollama_base_url = value.to_string();
            }
            "ollama_model" => self.ollama_model = value.to_string(),
            "log_level" => self.log_level = value.to_string(),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Puts `key` back to its default value.
    pub fn reset(&mut self, key: &str) -> Result<(), ConfigError> {
        let default = Config::default().get(key)?;
        self.set(key, &default)
    }

    pub fn entries(&self) -> Vec<(&'static str, String)> {
        KEYS.iter()
            .filter_map(|key| self.get(key).ok().map(|value| (*key, value)))
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn notification_duration(&self) -> Duration {
        Duration::from_secs(self.notification_secs)
    }
}

fn parse_secs(value: &str) -> Result<u64, String> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(secs) => Ok(secs),
        Err(e) => Err(e.to_string()),
    }
}
