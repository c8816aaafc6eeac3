//! Layered configuration loading.
//!
//! Layers apply in call order and later layers win. Files and presets are
//! merged key by key, so a file that only sets `server.http_addr` keeps
//! every other value from the layers below it. Environment overrides are
//! applied last, when [`ConfigLoader::load`] runs.

use std::env;
use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::{ConfigError, SluiceConfig};

/// Default environment prefix.
pub const DEFAULT_ENV_PREFIX: &str = "SLUICE";

/// Builds a [`SluiceConfig`] from defaults, presets, files, `.env` and the
/// environment.
///
/// Environment variables use `PREFIX__SECTION__KEY`, for example
/// `SLUICE__SERVER__HTTP_ADDR=0.0.0.0:9000`.
///
/// ```
/// use sluice_config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_development()
///     .with_string("[server]\nrequest_timeout_secs = 5", "toml")
///     .unwrap()
///     .load_from(vec![("SLUICE__SERVICE__NAME".to_string(), "users".to_string())])
///     .unwrap();
///
/// assert_eq!(config.server.http_addr, "127.0.0.1:8080");
/// assert_eq!(config.server.request_timeout_secs, 5);
/// assert_eq!(config.service.name, "users");
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    layered: Value,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Starts from [`SluiceConfig::default`] with the `SLUICE` prefix.
    #[must_use]
    pub fn new() -> Self {
        Self {
            layered: to_value(&SluiceConfig::default()),
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// Replaces everything loaded so far with the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.layered = to_value(&SluiceConfig::development());
        self
    }

    /// Replaces everything loaded so far with the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.layered = to_value(&SluiceConfig::production());
        self
    }

    /// Merges a `.toml` or `.json` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, has another
    /// extension or does not parse.
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;
        self.with_string(&content, format)
    }

    /// Merges a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Merges configuration text in `toml` or `json` format.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown format or unparsable content.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer: Value = match format.to_ascii_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        merge(&mut self.layered, layer);
        Ok(self)
    }

    /// Loads `.env` from the working directory into the process
    /// environment, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(err) if err.not_found() => Ok(self),
            Err(err) => Err(err.into()),
        }
    }

    /// Loads a specific env file into the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or cannot be parsed.
    pub fn with_dotenv_path<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        dotenvy::from_path(path.as_ref())?;
        Ok(self)
    }

    /// Changes the environment prefix.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = prefix.to_ascii_uppercase();
        self
    }

    /// Applies overrides from the process environment and validates.
    ///
    /// # Errors
    ///
    /// Returns an error if an override is malformed or the result is
    /// invalid.
    pub fn load(self) -> Result<SluiceConfig, ConfigError> {
        self.load_from(env::vars())
    }

    /// Applies overrides from `vars` instead of the process environment,
    /// then validates.
    ///
    /// # Errors
    ///
    /// Returns an error if an override is malformed or the result is
    /// invalid.
    pub fn load_from<I>(mut self, vars: I) -> Result<SluiceConfig, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let marker = format!("{}__", self.env_prefix);
        let mut overrides: Vec<(String, String)> = vars
            .into_iter()
            .filter(|(key, _)| key.starts_with(&marker))
            .collect();
        overrides.sort();
        for (key, value) in overrides {
            apply_override(&mut self.layered, &key, &key[marker.len()..], &value)?;
        }

        let config: SluiceConfig = serde_json::from_value(self.layered).map_err(ConfigError::Shape)?;
        config.validate()?;
        Ok(config)
    }
}

fn to_value(config: &SluiceConfig) -> Value {
    serde_json::to_value(config).unwrap_or_else(|_| Value::Object(Map::new()))
}

fn merge(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

/// Sets `SECTION__KEY` to `raw`, typed after the value it replaces.
fn apply_override(root: &mut Value, var: &str, path: &str, raw: &str) -> Result<(), ConfigError> {
    let mut target = root;
    for segment in path.split("__") {
        target = target
            .get_mut(segment.to_ascii_lowercase())
            .ok_or_else(|| ConfigError::env(var, "unknown configuration key"))?;
    }
    let replacement = match &*target {
        Value::Bool(_) => Value::Bool(
            parse_bool(raw).ok_or_else(|| ConfigError::env(var, "expected a boolean"))?,
        ),
        Value::Number(_) => Value::Number(
            raw.trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::env(var, "expected a non-negative integer"))?
                .into(),
        ),
        Value::Object(_) | Value::Array(_) => {
            return Err(ConfigError::env(var, "names a section, not a key"));
        }
        Value::String(_) | Value::Null => Value::String(raw.to_string()),
    };
    *target = replacement;
    Ok(())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
