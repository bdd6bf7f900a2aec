//! Typed configuration file + environment overrides, loaded by the CLI before it
//! builds an adapter. Genuinely external to the core per spec §1, but without it
//! `persuader-cli` has no way to pick a provider.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?} as TOML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no adapter configured for provider `{0}`")]
    UnknownProvider(String),
    #[error("environment variable `{0}` is required for provider `{1}` but is not set")]
    MissingEnv(String, String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersuaderConfig {
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default = "default_retries")]
    pub default_retries: u32,
    #[serde(default = "default_ttl_days")]
    pub session_ttl_days: u64,
    #[serde(default)]
    pub adapters: HashMap<String, AdapterConfig>,
}

fn default_provider() -> String {
    "dummy".to_string()
}

fn default_retries() -> u32 {
    3
}

fn default_ttl_days() -> u64 {
    30
}

/// One configured backend. `kind` selects which built-in [`persuader_core::provider`]
/// adapter to construct; real vendor wire protocols are out of scope (spec §1), so
/// `http` here means "generic OpenAI-compatible chat-completions shape", not any one
/// vendor's SDK.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterConfig {
    Http {
        base_url: String,
        #[serde(default)]
        api_key_env: Option<String>,
        default_model: String,
    },
    CliSession {
        #[serde(default = "default_cli_reply")]
        reply: String,
    },
    Dummy {
        #[serde(default)]
        responses: Vec<String>,
    },
}

fn default_cli_reply() -> String {
    "{}".to_string()
}

impl PersuaderConfig {
    /// Resolve the config path in priority order: explicit `--config`, then
    /// `PERSUADER_CONFIG`, then the platform config dir. A missing file at any of
    /// those is not an error — it falls back to a single `dummy` adapter so `--dry-run`
    /// and local testing work with zero setup.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("PERSUADER_CONFIG").map(PathBuf::from))
            .or_else(|| dirs::config_dir().map(|dir| dir.join("persuader").join("config.toml")));

        let Some(path) = path else {
            return Ok(Self::fallback());
        };
        if !path.exists() {
            return Ok(Self::fallback());
        }

        let raw = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
    }

    fn fallback() -> Self {
        let mut adapters = HashMap::new();
        adapters.insert("dummy".to_string(), AdapterConfig::Dummy { responses: Vec::new() });
        Self {
            default_provider: default_provider(),
            default_model: None,
            default_retries: default_retries(),
            session_ttl_days: default_ttl_days(),
            adapters,
        }
    }

    pub fn adapter_config(&self, provider: &str) -> Result<&AdapterConfig, ConfigError> {
        self.adapters
            .get(provider)
            .ok_or_else(|| ConfigError::UnknownProvider(provider.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_falls_back_to_dummy() {
        let config = PersuaderConfig::load(Some(Path::new("/nonexistent/path/config.toml"))).unwrap();
        assert_eq!(config.default_provider, "dummy");
        assert!(config.adapters.contains_key("dummy"));
    }

    #[test]
    fn parses_http_adapter_section() {
        let toml_text = r#"
            default_provider = "openai_compatible"

            [adapters.openai_compatible]
            kind = "http"
            base_url = "https://api.example.com/v1"
            api_key_env = "EXAMPLE_API_KEY"
            default_model = "example-large"
        "#;
        let config: PersuaderConfig = toml::from_str(toml_text).unwrap();
        match config.adapter_config("openai_compatible").unwrap() {
            AdapterConfig::Http { base_url, default_model, .. } => {
                assert_eq!(base_url, "https://api.example.com/v1");
                assert_eq!(default_model, "example-large");
            }
            other => panic!("expected Http adapter config, got {other:?}"),
        }
    }
}
