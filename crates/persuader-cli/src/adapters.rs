//! Builds a boxed [`Adapter`] from a resolved [`AdapterConfig`].

use persuader_core::provider::{Adapter, CliSessionAdapter, DummyAdapter, HttpAdapter};

use crate::config::{AdapterConfig, ConfigError};

pub fn build(provider: &str, config: &AdapterConfig) -> Result<Box<dyn Adapter>, ConfigError> {
    match config {
        AdapterConfig::Http { base_url, api_key_env, default_model } => {
            let api_key = match api_key_env {
                Some(var) => Some(
                    std::env::var(var)
                        .map_err(|_| ConfigError::MissingEnv(var.clone(), provider.to_string()))?,
                ),
                None => None,
            };
            Ok(Box::new(HttpAdapter::new(base_url.clone(), api_key, default_model.clone())))
        }
        AdapterConfig::CliSession { reply } => Ok(Box::new(CliSessionAdapter::new(reply.clone()))),
        AdapterConfig::Dummy { responses } => {
            let responses = if responses.is_empty() {
                vec!["{}".to_string()]
            } else {
                responses.clone()
            };
            Ok(Box::new(DummyAdapter::new(responses)))
        }
    }
}
