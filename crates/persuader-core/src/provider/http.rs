//! Stateless adapter for any OpenAI-compatible chat-completions endpoint.
//!
//! A REST completions endpoint has no native notion of a session: every call must
//! carry its own context. `create_session` always fails with
//! [`ProviderErrorKind::Unsupported`], and `send_prompt` logs a warning if the
//! orchestrator passes a `provider_session_id` anyway rather than silently ignoring it.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::{
    Adapter, HealthStatus, ProviderError, ProviderErrorKind, ProviderOptions, ProviderResponse,
    StopReason, TokenUsage,
};

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

pub struct HttpAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
}

impl HttpAdapter {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, default_model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            default_model: default_model.into(),
        }
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn classify_status(status: reqwest::StatusCode) -> (ProviderErrorKind, bool) {
        match status.as_u16() {
            401 | 403 => (ProviderErrorKind::Auth, false),
            404 => (ProviderErrorKind::ModelNotFound, false),
            408 => (ProviderErrorKind::Timeout, true),
            429 => (ProviderErrorKind::RateLimit, true),
            400 | 422 => (ProviderErrorKind::BadRequest, false),
            s if s >= 500 => (ProviderErrorKind::ServerError, true),
            _ => (ProviderErrorKind::Unknown, false),
        }
    }
}

#[async_trait]
impl Adapter for HttpAdapter {
    fn name(&self) -> &str {
        "http"
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn supports_session(&self) -> bool {
        false
    }

    fn supported_models(&self) -> Vec<String> {
        vec![self.default_model.clone()]
    }

    async fn health(&self) -> HealthStatus {
        let started = Instant::now();
        match self.client.get(&self.base_url).send().await {
            Ok(resp) => HealthStatus {
                healthy: resp.status().is_success() || resp.status().is_client_error(),
                checked_at: Utc::now(),
                response_time_ms: started.elapsed().as_millis() as u64,
                error: None,
                details: serde_json::Map::new(),
            },
            Err(err) => HealthStatus {
                healthy: false,
                checked_at: Utc::now(),
                response_time_ms: started.elapsed().as_millis() as u64,
                error: Some(err.to_string()),
                details: serde_json::Map::new(),
            },
        }
    }

    async fn create_session(
        &self,
        _context: &str,
        _options: &ProviderOptions,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::unsupported(
            "http adapter is stateless; it has no session concept",
        ))
    }

    async fn send_prompt(
        &self,
        provider_session_id: Option<&str>,
        prompt: &str,
        options: &ProviderOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        if provider_session_id.is_some() {
            tracing::warn!(
                "http adapter received a provider_session_id but has no session concept; ignoring it"
            );
        }

        let model = options.model.clone().unwrap_or_else(|| self.default_model.clone());
        let mut body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(temp) = options.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(top_p) = options.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let mut request = self.client.post(self.chat_completions_url()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(timeout) = options.request_timeout {
            request = request.timeout(timeout);
        } else {
            request = request.timeout(Duration::from_secs(60));
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                ProviderError::timeout(Duration::from_secs(60))
            } else {
                ProviderError::new(ProviderErrorKind::Transport, true, err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let (kind, retryable) = Self::classify_status(status);
            let body_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::new(
                kind,
                retryable,
                format!("provider returned {status}: {body_text}"),
            )
            .with_status(status.as_u16()));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::new(ProviderErrorKind::ServerError, true, err.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::new(ProviderErrorKind::ServerError, true, "provider returned no choices"))?;

        let usage = parsed.usage.unwrap_or_default();
        let stop_reason = match choice.finish_reason.as_deref() {
            Some("stop") => StopReason::EndTurn,
            Some("length") => StopReason::MaxTokens,
            Some("stop_sequence") => StopReason::StopSequence,
            _ => StopReason::Other,
        };

        Ok(ProviderResponse {
            content: choice.message.content,
            token_usage: TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
            metadata: serde_json::Map::new(),
            truncated: matches!(stop_reason, StopReason::MaxTokens),
            stop_reason,
        })
    }

    async fn destroy_session(&self, _provider_session_id: &str) -> Result<(), ProviderError> {
        Ok(())
    }
}
