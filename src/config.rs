//! Resolved settings for a pipeline run.
//!
//! A single optional TOML file is read; every section falls back to defaults.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::backend::BackendConfig;
use crate::error::ConfigurationError;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = ".aicommit.toml";

/// Environment variable overriding the backend timeout (seconds).
pub const TIMEOUT_ENV_VAR: &str = "AICOMMIT_TIMEOUT";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendSettings,
    pub collectors: Vec<CollectorSettings>,
    pub cache: CacheSettings,
    pub output: OutputSettings,
    pub formatter: FormatterSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            collectors: vec![CollectorSettings::new("diff")],
            cache: CacheSettings::default(),
            output: OutputSettings::default(),
            formatter: FormatterSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    #[serde(alias = "provider")]
    pub name: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_sec: u64,
    pub stream: bool,
    pub parameters: Map<String, Value>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            name: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
            timeout_sec: 20,
            stream: false,
            parameters: Map::new(),
        }
    }
}

impl BackendSettings {
    pub fn to_backend_config(&self) -> BackendConfig {
        BackendConfig {
            backend_id: self.name.clone(),
            model_name: self.model.clone(),
            credential: self.api_key.clone().filter(|k| !k.is_empty()),
            endpoint_override: self.base_url.clone().filter(|u| !u.is_empty()),
            timeout: Duration::from_secs(self.timeout_sec),
            extra_parameters: self.parameters.clone(),
        }
    }
}

/// One configured collector: registry key plus constructor options.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorSettings {
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl CollectorSettings {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            options: Map::new(),
        }
    }

    pub fn with_options(kind: impl Into<String>, options: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            options,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_sec: i64,
    pub directory: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_sec: 3600,
            directory: "~/.cache/aicommit".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub language: String,
    pub max_subject_len: usize,
    pub wrap_body_at: usize,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            max_subject_len: 72,
            wrap_body_at: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FormatterSettings {
    #[serde(alias = "template")]
    pub name: String,
}

impl Default for FormatterSettings {
    fn default() -> Self {
        Self {
            name: "conventional".to_string(),
        }
    }
}

impl Config {
    /// Parse a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigurationError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|source| ConfigurationError::ParseFailed {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Load `explicit` if given, else `.aicommit.toml` in `cwd` when present, else defaults.
    ///
    /// The `AICOMMIT_TIMEOUT` override is applied in every case.
    pub fn resolve(explicit: Option<&Path>, cwd: &Path) -> Result<Self, ConfigurationError> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => {
                let candidate: PathBuf = cwd.join(DEFAULT_CONFIG_FILE);
                if candidate.is_file() {
                    debug!("Using config file {}", candidate.display());
                    Self::load(&candidate)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides.
    ///
    /// Invalid values are logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        match env::var(TIMEOUT_ENV_VAR) {
            Ok(v) if !v.is_empty() => match v.parse::<u64>() {
                Ok(secs) => self.backend.timeout_sec = secs,
                Err(_) => {
                    warn!(
                        "Invalid {} value '{}', using {}s",
                        TIMEOUT_ENV_VAR, v, self.backend.timeout_sec
                    );
                }
            },
            _ => {}
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.backend.name.trim().is_empty() {
            return Err(ConfigurationError::MissingSetting("backend.name".into()));
        }
        if self.backend.model.trim().is_empty() {
            return Err(ConfigurationError::MissingSetting("backend.model".into()));
        }
        if self.backend.timeout_sec == 0 {
            return Err(ConfigurationError::InvalidSetting {
                setting: "backend.timeout_sec".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.output.max_subject_len == 0 {
            return Err(ConfigurationError::InvalidSetting {
                setting: "output.max_subject_len".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}
