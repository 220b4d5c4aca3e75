//! Runtime settings read from the environment (and `.env`, when present).

use std::path::PathBuf;
use std::time::Duration;

use crate::backoff::RetryPolicy;
use crate::credentials::STORAGE_KEY;
use crate::remote::chatgpt::{engine_for, DEFAULT_CHATGPT_MODEL, SUPPORTED_CHATGPT_MODELS};
use crate::remote::gemini::DEFAULT_API_BASE;

pub const DEFAULT_TEXT_MODEL: &str = "gemini-flash-lite-latest";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be one of {expected}, got '{value}'")]
    InvalidChoice {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{name} must be a positive number of seconds, got '{value}'")]
    InvalidTimeout { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Gemini,
    ChatGpt,
}

/// Model identifiers and retry policies used by the generation client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    pub text_model: String,
    pub image_model: String,
    pub text_retry: RetryPolicy,
    pub image_retry: RetryPolicy,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            text_retry: RetryPolicy::TEXT,
            image_retry: RetryPolicy::IMAGE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Seed for the credential store, `API_KEY`.
    pub api_key: Option<String>,
    pub backend: Backend,
    pub api_base: String,
    pub credential_file: PathBuf,
    pub timeout: Duration,
    pub generator: GeneratorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            backend: Backend::default(),
            api_base: DEFAULT_API_BASE.to_string(),
            credential_file: PathBuf::from(format!(".{STORAGE_KEY}")),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            generator: GeneratorConfig::default(),
        }
    }
}

impl Config {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from any variable source; unset variables keep their
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        config.api_key = lookup("API_KEY");

        if let Some(value) = lookup("STUDYGEN_BACKEND") {
            config.backend = match value.trim().to_ascii_lowercase().as_str() {
                "gemini" => Backend::Gemini,
                "chatgpt" => Backend::ChatGpt,
                _ => {
                    return Err(ConfigError::InvalidChoice {
                        name: "STUDYGEN_BACKEND",
                        expected: "gemini, chatgpt",
                        value,
                    })
                }
            };
        }
        match lookup("STUDYGEN_TEXT_MODEL") {
            Some(value) => config.generator.text_model = value,
            None if config.backend == Backend::ChatGpt => {
                config.generator.text_model = DEFAULT_CHATGPT_MODEL.to_string()
            }
            None => {}
        }
        if config.backend == Backend::ChatGpt && engine_for(&config.generator.text_model).is_none() {
            return Err(ConfigError::InvalidChoice {
                name: "STUDYGEN_TEXT_MODEL",
                expected: SUPPORTED_CHATGPT_MODELS,
                value: config.generator.text_model,
            });
        }
        if let Some(value) = lookup("STUDYGEN_IMAGE_MODEL") {
            config.generator.image_model = value;
        }
        if let Some(value) = lookup("STUDYGEN_API_BASE") {
            config.api_base = value;
        }
        if let Some(value) = lookup("STUDYGEN_CREDENTIAL_FILE") {
            config.credential_file = PathBuf::from(value);
        }
        if let Some(value) = lookup("STUDYGEN_TIMEOUT_SECS") {
            config.timeout = match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidTimeout {
                        name: "STUDYGEN_TIMEOUT_SECS",
                        value,
                    })
                }
            };
        }

        Ok(config)
    }
}
