//! The narrow seam between the core orchestrator and any concrete LLM backend.

pub mod cli_session;
pub mod dummy;
pub mod http;

pub use cli_session::CliSessionAdapter;
pub use dummy::DummyAdapter;
pub use http::HttpAdapter;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl std::ops::Add for TokenUsage {
    type Output = TokenUsage;
    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = self.clone() + rhs;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub content: String,
    pub token_usage: TokenUsage,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub truncated: bool,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
    pub response_time_ms: u64,
    pub error: Option<String>,
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Auth,
    RateLimit,
    Timeout,
    ServerError,
    BadRequest,
    ModelNotFound,
    ContentPolicy,
    Transport,
    Unsupported,
    Unknown,
}

#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub retryable: bool,
    pub status: Option<u16>,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, retryable: bool, message: impl Into<String>) -> Self {
        Self {
            kind,
            retryable,
            status: None,
            message: message.into(),
            details: serde_json::Map::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unsupported, false, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ProviderErrorKind::Timeout,
            true,
            format!("request timed out after {after:?}"),
        )
    }
}

/// Options passed through to `send_prompt`/`create_session`, opaque to the core.
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub cancellation: Option<CancellationToken>,
    pub request_timeout: Option<Duration>,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The narrow seam every concrete LLM backend implements.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn supports_session(&self) -> bool;
    fn supported_models(&self) -> Vec<String>;

    async fn health(&self) -> HealthStatus;

    /// Fails with [`ProviderErrorKind::Unsupported`] if the adapter is stateless.
    async fn create_session(
        &self,
        context: &str,
        options: &ProviderOptions,
    ) -> Result<String, ProviderError>;

    async fn send_prompt(
        &self,
        provider_session_id: Option<&str>,
        prompt: &str,
        options: &ProviderOptions,
    ) -> Result<ProviderResponse, ProviderError>;

    /// No-op for stateless adapters.
    async fn destroy_session(&self, provider_session_id: &str) -> Result<(), ProviderError>;
}
