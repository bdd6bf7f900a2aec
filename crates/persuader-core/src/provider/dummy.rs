//! In-memory, deterministic adapter used by every orchestrator test and doc example.
//!
//! A scriptable sequence of canned responses with no network I/O.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{
    Adapter, HealthStatus, ProviderError, ProviderErrorKind, ProviderOptions, ProviderResponse,
    StopReason, TokenUsage,
};

#[derive(Debug)]
struct Inner {
    responses: VecDeque<String>,
    sent_prompts: Vec<String>,
    sessions: std::collections::HashSet<String>,
}

/// A scriptable, stateful-capable stub provider.
///
/// Each `send_prompt` call pops the next queued response. Once the queue is empty the
/// last response is repeated so tests that over-call don't panic mid-assertion.
#[derive(Clone)]
pub struct DummyAdapter {
    inner: Arc<Mutex<Inner>>,
}

impl DummyAdapter {
    pub fn new(responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                responses: responses.into_iter().map(Into::into).collect(),
                sent_prompts: Vec::new(),
                sessions: std::collections::HashSet::new(),
            })),
        }
    }

    /// Every prompt sent to this adapter, in order — used to assert on retry-feedback
    /// content in integration tests.
    pub async fn sent_prompts(&self) -> Vec<String> {
        self.inner.lock().await.sent_prompts.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.inner.lock().await.sent_prompts.len()
    }
}

#[async_trait]
impl Adapter for DummyAdapter {
    fn name(&self) -> &str {
        "dummy"
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn supports_session(&self) -> bool {
        true
    }

    fn supported_models(&self) -> Vec<String> {
        vec!["dummy-1".to_string()]
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
        _context: &str,
        _options: &ProviderOptions,
    ) -> Result<String, ProviderError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.inner.lock().await.sessions.insert(id.clone());
        Ok(id)
    }

    async fn send_prompt(
        &self,
        provider_session_id: Option<&str>,
        prompt: &str,
        _options: &ProviderOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        if let Some(id) = provider_session_id {
            let inner = self.inner.lock().await;
            if !inner.sessions.contains(id) {
                drop(inner);
                return Err(ProviderError::new(
                    ProviderErrorKind::Unknown,
                    false,
                    format!("unknown provider session id `{id}`"),
                ));
            }
        }

        let mut inner = self.inner.lock().await;
        inner.sent_prompts.push(prompt.to_string());
        let content = inner
            .responses
            .pop_front()
            .unwrap_or_else(|| inner.sent_prompts.last().cloned().unwrap_or_default());
        // Repeat the last scripted response if the queue ran dry, rather than
        // consuming a sentinel forever.
        if inner.responses.is_empty() {
            inner.responses.push_back(content.clone());
        }

        Ok(ProviderResponse {
            content,
            token_usage: TokenUsage {
                input_tokens: prompt.len() as u64 / 4,
                output_tokens: 8,
                total_tokens: prompt.len() as u64 / 4 + 8,
            },
            metadata: serde_json::Map::new(),
            truncated: false,
            stop_reason: StopReason::EndTurn,
        })
    }

    async fn destroy_session(&self, provider_session_id: &str) -> Result<(), ProviderError> {
        self.inner.lock().await.sessions.remove(provider_session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repeats_last_response_once_queue_is_exhausted() {
        let adapter = DummyAdapter::new(["one"]);
        let opts = ProviderOptions::default();
        let first = adapter.send_prompt(None, "p1", &opts).await.unwrap();
        let second = adapter.send_prompt(None, "p2", &opts).await.unwrap();
        assert_eq!(first.content, "one");
        assert_eq!(second.content, "one");
    }

    #[tokio::test]
    async fn rejects_unknown_session_id() {
        let adapter = DummyAdapter::new(["hi"]);
        let opts = ProviderOptions::default();
        let err = adapter
            .send_prompt(Some("not-a-real-session"), "p", &opts)
            .await
            .unwrap_err();
        assert!(!err.retryable);
    }
}
