//! Stateful adapter simulating a long-lived CLI/subprocess-style provider.
//!
//! Unlike [`HttpAdapter`](super::HttpAdapter), this backend class keeps its own
//! server-side conversation state, addressed by an opaque token it mints in
//! `create_session`. `send_prompt` without a live session id is a caller error, not
//! something this adapter can paper over — there is no context to send a prompt into.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{
    Adapter, HealthStatus, ProviderError, ProviderErrorKind, ProviderOptions, ProviderResponse,
    StopReason, TokenUsage,
};

struct SessionState {
    transcript: Vec<String>,
}

/// A stateful stub: `create_session` opens a transcript, every `send_prompt` against
/// that session id appends to it and returns the adapter's configured reply.
pub struct CliSessionAdapter {
    reply: String,
    sessions: Arc<Mutex<HashMap<String, SessionState>>>,
}

impl CliSessionAdapter {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn transcript_len(&self, provider_session_id: &str) -> Option<usize> {
        self.sessions
            .lock()
            .await
            .get(provider_session_id)
            .map(|s| s.transcript.len())
    }
}

#[async_trait]
impl Adapter for CliSessionAdapter {
    fn name(&self) -> &str {
        "cli_session"
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn supports_session(&self) -> bool {
        true
    }

    fn supported_models(&self) -> Vec<String> {
        vec!["cli-session-1".to_string()]
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            checked_at: Utc::now(),
            response_time_ms: 0,
            error: None,
            details: serde_json::Map::new(),
        }
    }

    async fn create_session(
        &self,
        context: &str,
        _options: &ProviderOptions,
    ) -> Result<String, ProviderError> {
        let id = format!("cli-sess-{}", uuid::Uuid::new_v4());
        self.sessions.lock().await.insert(
            id.clone(),
            SessionState {
                transcript: vec![context.to_string()],
            },
        );
        Ok(id)
    }

    async fn send_prompt(
        &self,
        provider_session_id: Option<&str>,
        prompt: &str,
        _options: &ProviderOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        let id = provider_session_id.ok_or_else(|| {
            ProviderError::new(
                ProviderErrorKind::Unsupported,
                false,
                "cli_session adapter requires an active session; call create_session first",
            )
        })?;

        let mut sessions = self.sessions.lock().await;
        let state = sessions.get_mut(id).ok_or_else(|| {
            ProviderError::new(
                ProviderErrorKind::Unknown,
                false,
                format!("unknown provider session id `{id}`"),
            )
        })?;
        state.transcript.push(prompt.to_string());
        let turn = state.transcript.len() as u64;

        Ok(ProviderResponse {
            content: self.reply.clone(),
            token_usage: TokenUsage {
                input_tokens: prompt.len() as u64 / 4,
                output_tokens: self.reply.len() as u64 / 4,
                total_tokens: (prompt.len() + self.reply.len()) as u64 / 4,
            },
            metadata: serde_json::Map::from_iter([(
                "turn".to_string(),
                serde_json::json!(turn),
            )]),
            truncated: false,
            stop_reason: StopReason::EndTurn,
        })
    }

    async fn destroy_session(&self, provider_session_id: &str) -> Result<(), ProviderError> {
        self.sessions.lock().await.remove(provider_session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_prompt_without_session_is_an_error() {
        let adapter = CliSessionAdapter::new("ok");
        let opts = ProviderOptions::default();
        let err = adapter.send_prompt(None, "hi", &opts).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn transcript_grows_across_calls_on_the_same_session() {
        let adapter = CliSessionAdapter::new("ok");
        let opts = ProviderOptions::default();
        let id = adapter.create_session("ctx", &opts).await.unwrap();
        adapter.send_prompt(Some(&id), "one", &opts).await.unwrap();
        adapter.send_prompt(Some(&id), "two", &opts).await.unwrap();
        assert_eq!(adapter.transcript_len(&id).await, Some(3));
    }
}
