//! Session Manager: logical-session lifecycle, provider-id translation, metrics,
//! and success-feedback history.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, LazyLock};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::provider::{Adapter, ProviderOptions, TokenUsage};

/// Bound on success-feedback history retained per session (I4: monotonic, never reordered).
const MAX_SUCCESS_FEEDBACK: usize = 50;

/// Default TTL after which an inactive session is eligible for cleanup.
pub const DEFAULT_SESSION_TTL: StdDuration = StdDuration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderData {
    #[serde(default)]
    pub provider_session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub prompt_count: u64,
    #[serde(default)]
    pub total_tokens: TokenUsage,
    pub last_activity: DateTime<Utc>,
    pub active: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessFeedbackEntry {
    pub message: String,
    pub value: Value,
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub total_attempts: u64,
    pub successful_validations: u64,
    pub mean_attempts_to_success: f64,
    pub success_rate: f64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub total_execution_time_ms: u64,
    pub mean_execution_time_ms: f64,
    pub total_token_usage: TokenUsage,
    /// Tokens spent on success-reinforcement prompts (Open Question 2 in spec §9):
    /// the reinforcement call's response is discarded but its tokens are real spend,
    /// so they're counted here rather than folded silently into `total_token_usage`.
    pub reinforcement_tokens: TokenUsage,
    pub operations_with_retries: u64,
    pub max_attempts_for_one_operation: u32,
    /// Number of terminal (success or failure) calls this session has completed —
    /// the denominator for the execution-time and attempts-to-success means.
    #[serde(default)]
    calls: u64,
}

impl Metrics {
    fn record_terminal(&mut self, attempts: u32, success: bool, execution_time_ms: u64) {
        self.total_attempts += attempts as u64;
        self.calls += 1;
        self.total_execution_time_ms += execution_time_ms;
        self.mean_execution_time_ms = self.total_execution_time_ms as f64 / self.calls as f64;
        self.max_attempts_for_one_operation = self.max_attempts_for_one_operation.max(attempts);
        if attempts > 1 {
            self.operations_with_retries += 1;
        }
        if success {
            self.successful_validations += 1;
            self.last_success_at = Some(Utc::now());
            // Running mean of attempts-to-success, over successes only.
            let prior_successes = self.successful_validations - 1;
            self.mean_attempts_to_success = (self.mean_attempts_to_success * prior_successes as f64
                + attempts as f64)
                / self.successful_validations as f64;
        }
        self.success_rate = self.successful_validations as f64 / self.calls as f64;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub provider_data: ProviderData,
    pub metadata: SessionMetadata,
    #[serde(default)]
    pub success_feedback: VecDeque<SuccessFeedbackEntry>,
    #[serde(default)]
    pub metrics: Metrics,
    /// Unrecognized fields preserved verbatim for forward-compatible round-trips.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Session {
    fn new(id: String, context: String, provider: String, model: Option<String>, tags: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            context,
            provider_data: ProviderData::default(),
            metadata: SessionMetadata {
                provider,
                model,
                prompt_count: 0,
                total_tokens: TokenUsage::default(),
                last_activity: now,
                active: true,
                tags,
                created_at: now,
            },
            success_feedback: VecDeque::new(),
            metrics: Metrics::default(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Partial update applied to a session's metadata with merge semantics.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub active: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub model: Option<String>,
}

/// Filter applied by `list`.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub active: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub limit: Option<usize>,
}

/// Outcome of the ensure-session protocol.
#[derive(Debug, Clone)]
pub struct EnsuredSession {
    pub session_id: String,
    pub provider_session_id: Option<String>,
    /// `false` for the synthetic `stateless-<time>-<rand>` id used by providers that
    /// don't support sessions; such sessions are never persisted.
    pub persisted: bool,
    /// `true` if this call minted a brand-new provider session rather than resuming
    /// one that already existed — governs whether the first prompt carries `context`.
    pub is_new: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session `{0}` not found")]
    NotFound(String),
}

struct Store {
    sessions: HashMap<String, Arc<Mutex<Session>>>,
}

/// Owns every logical session. Reads take a coarse read lock over the index; mutations
/// on a single session serialize through that session's own lock, so concurrent calls
/// against different sessions never contend with each other (§5).
pub struct SessionManager {
    store: RwLock<Store>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self {
            store: RwLock::new(Store {
                sessions: HashMap::new(),
            }),
        }
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(
        &self,
        provider: impl Into<String>,
        context: impl Into<String>,
        model: Option<String>,
        tags: Vec<String>,
    ) -> Session {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Session::new(id.clone(), context.into(), provider.into(), model, tags);
        let mut store = self.store.write().await;
        store.sessions.insert(id, Arc::new(Mutex::new(session.clone())));
        session
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        let store = self.store.read().await;
        match store.sessions.get(id) {
            Some(cell) => Some(cell.lock().await.clone()),
            None => None,
        }
    }

    async fn cell(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        self.store.read().await.sessions.get(id).cloned()
    }

    pub async fn update(&self, id: &str, patch: SessionUpdate) -> Result<Session, SessionError> {
        let cell = self.cell(id).await.ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        let mut session = cell.lock().await;
        if let Some(active) = patch.active {
            session.metadata.active = active;
        }
        if let Some(tags) = patch.tags {
            session.metadata.tags = tags;
        }
        if let Some(model) = patch.model {
            session.metadata.model = Some(model);
        }
        session.metadata.last_activity = Utc::now();
        Ok(session.clone())
    }

    pub async fn delete(&self, id: &str) -> bool {
        let mut store = self.store.write().await;
        store.sessions.remove(id).is_some()
    }

    pub async fn list(&self, filter: &SessionFilter) -> Vec<Session> {
        let store = self.store.read().await;
        // Per-session locks are independent, so cloning every candidate out can run
        // concurrently instead of serializing on one session's slow lock behind another.
        let snapshots = futures::future::join_all(store.sessions.values().map(|cell| async { cell.lock().await.clone() })).await;
        drop(store);
        let mut matched = Vec::new();
        for session in snapshots {
            if let Some(provider) = &filter.provider {
                if &session.metadata.provider != provider {
                    continue;
                }
            }
            if let Some(model) = &filter.model {
                if session.metadata.model.as_ref() != Some(model) {
                    continue;
                }
            }
            if let Some(active) = filter.active {
                if session.metadata.active != active {
                    continue;
                }
            }
            if let Some(after) = filter.created_after {
                if session.metadata.created_at < after {
                    continue;
                }
            }
            if let Some(before) = filter.created_before {
                if session.metadata.created_at > before {
                    continue;
                }
            }
            if !filter.tags.is_empty() && !filter.tags.iter().all(|t| session.metadata.tags.contains(t)) {
                continue;
            }
            matched.push(session);
        }
        matched.sort_by_key(|s| std::cmp::Reverse(s.metadata.last_activity));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        matched
    }

    /// Best-effort destroys the provider-side session and removes sessions whose
    /// `last_activity` is older than `max_age`. Returns the number deleted.
    pub async fn cleanup(&self, max_age: StdDuration, adapter: Option<&dyn Adapter>) -> usize {
        let cutoff = Utc::now() - Duration::from_std(max_age).unwrap_or(Duration::zero());
        let expired: Vec<(String, Option<String>)> = {
            let store = self.store.read().await;
            let mut out = Vec::new();
            for (id, cell) in &store.sessions {
                let session = cell.lock().await;
                if session.metadata.last_activity < cutoff {
                    out.push((id.clone(), session.provider_data.provider_session_id.clone()));
                }
            }
            out
        };
        if let Some(adapter) = adapter {
            futures::future::join_all(expired.iter().filter_map(|(id, provider_id)| {
                provider_id.as_ref().map(|provider_id| async move {
                    if let Err(err) = adapter.destroy_session(provider_id).await {
                        tracing::debug!(session_id = %id, error = %err, "best-effort provider session teardown failed");
                    }
                })
            }))
            .await;
        }
        let mut store = self.store.write().await;
        for (id, _) in &expired {
            store.sessions.remove(id);
        }
        expired.len()
    }

    pub async fn add_success_feedback(&self, id: &str, entry: SuccessFeedbackEntry) -> Result<(), SessionError> {
        let cell = self.cell(id).await.ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        let mut session = cell.lock().await;
        session.success_feedback.push_back(entry);
        while session.success_feedback.len() > MAX_SUCCESS_FEEDBACK {
            session.success_feedback.pop_front();
        }
        Ok(())
    }

    pub async fn get_success_feedback(&self, id: &str, limit: usize) -> Vec<SuccessFeedbackEntry> {
        match self.cell(id).await {
            Some(cell) => {
                let session = cell.lock().await;
                session.success_feedback.iter().rev().take(limit).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    pub async fn metrics(&self, id: &str) -> Option<Metrics> {
        let cell = self.cell(id).await?;
        Some(cell.lock().await.metrics.clone())
    }

    /// Records a single adapter call against a session: bumps `prompt_count`, adds
    /// token usage, and refreshes `last_activity`.
    pub async fn record_prompt(&self, id: &str, usage: &TokenUsage) {
        if let Some(cell) = self.cell(id).await {
            let mut session = cell.lock().await;
            session.metadata.prompt_count += 1;
            session.metadata.total_tokens += usage.clone();
            session.metadata.last_activity = Utc::now();
        }
    }

    /// Records tokens spent on a discarded success-reinforcement prompt under the
    /// distinct `reinforcement_tokens` metric rather than `total_token_usage`.
    pub async fn record_reinforcement_tokens(&self, id: &str, usage: &TokenUsage) {
        if let Some(cell) = self.cell(id).await {
            let mut session = cell.lock().await;
            session.metrics.reinforcement_tokens += usage.clone();
        }
    }

    /// Applies the session-metric updates for a terminal transition (success or
    /// exhaustion) of one `persuade()` call.
    pub async fn record_terminal(&self, id: &str, attempts: u32, success: bool, execution_time_ms: u64) {
        if let Some(cell) = self.cell(id).await {
            let mut session = cell.lock().await;
            session.metrics.record_terminal(attempts, success, execution_time_ms);
            session.metadata.last_activity = Utc::now();
        }
    }

    /// The ensure-session protocol: resolve a caller-supplied logical id,
    /// fall back to the most-recently-active session for the provider, or mint one.
    pub async fn ensure_session(
        &self,
        provider: &str,
        context: &str,
        session_id: Option<&str>,
        adapter: &dyn Adapter,
        options: &ProviderOptions,
        reuse: bool,
    ) -> Result<EnsuredSession, crate::provider::ProviderError> {
        if let Some(id) = session_id {
            if let Some(session) = self.get(id).await {
                if session.metadata.provider == provider {
                    self.touch(id).await;
                    return Ok(EnsuredSession {
                        session_id: id.to_string(),
                        provider_session_id: session.provider_data.provider_session_id,
                        persisted: true,
                        is_new: false,
                    });
                }
            }
            // A supplied id that fails lookup is treated as absent, not an error.
        }

        if reuse && adapter.supports_session() {
            let filter = SessionFilter {
                provider: Some(provider.to_string()),
                active: Some(true),
                limit: Some(1),
                ..Default::default()
            };
            if let Some(existing) = self.list(&filter).await.into_iter().next() {
                self.touch(&existing.id).await;
                return Ok(EnsuredSession {
                    session_id: existing.id,
                    provider_session_id: existing.provider_data.provider_session_id,
                    persisted: true,
                    is_new: false,
                });
            }
        }

        if adapter.supports_session() {
            let provider_session_id = adapter.create_session(context, options).await?;
            let session = self.create(provider, context, options.model.clone(), Vec::new()).await;
            if let Some(cell) = self.cell(&session.id).await {
                cell.lock().await.provider_data.provider_session_id = Some(provider_session_id.clone());
            }
            return Ok(EnsuredSession {
                session_id: session.id,
                provider_session_id: Some(provider_session_id),
                persisted: true,
                is_new: true,
            });
        }

        Ok(EnsuredSession {
            session_id: format!("stateless-{}-{}", Utc::now().timestamp_millis(), uuid::Uuid::new_v4()),
            provider_session_id: None,
            persisted: false,
            is_new: true,
        })
    }

    async fn touch(&self, id: &str) {
        if let Some(cell) = self.cell(id).await {
            cell.lock().await.metadata.last_activity = Utc::now();
        }
    }
}

/// Process-wide default manager, lazily initialized on first use. Tests should
/// construct a private `SessionManager` instead of reaching for this.
pub static GLOBAL_SESSION_MANAGER: LazyLock<SessionManager> = LazyLock::new(SessionManager::default);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::DummyAdapter;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let manager = SessionManager::new();
        let session = manager.create("dummy", "be terse", None, vec![]).await;
        let fetched = manager.get(&session.id).await.unwrap();
        assert_eq!(fetched.id, session.id);
        assert_eq!(fetched.context, "be terse");
    }

    #[tokio::test]
    async fn record_terminal_keeps_successful_validations_leq_total_attempts() {
        let manager = SessionManager::new();
        let session = manager.create("dummy", "", None, vec![]).await;
        manager.record_terminal(&session.id, 3, true, 10).await;
        manager.record_terminal(&session.id, 1, false, 5).await;
        let metrics = manager.metrics(&session.id).await.unwrap();
        assert!(metrics.successful_validations <= metrics.total_attempts);
        assert_eq!(metrics.operations_with_retries, 1);
    }

    #[tokio::test]
    async fn ensure_session_creates_and_then_reuses() {
        let manager = SessionManager::new();
        let adapter = DummyAdapter::new(["ok"]);
        let opts = ProviderOptions::default();
        let first = manager
            .ensure_session("dummy", "ctx", None, &adapter, &opts, true)
            .await
            .unwrap();
        assert!(first.provider_session_id.is_some());

        let second = manager
            .ensure_session("dummy", "ctx", Some(&first.session_id), &adapter, &opts, true)
            .await
            .unwrap();
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.provider_session_id, first.provider_session_id);
    }

    #[tokio::test]
    async fn stateless_provider_gets_synthetic_unpersisted_id() {
        struct Stateless;
        #[async_trait::async_trait]
        impl Adapter for Stateless {
            fn name(&self) -> &str {
                "stateless"
            }
            fn version(&self) -> &str {
                "0"
            }
            fn supports_session(&self) -> bool {
                false
            }
            fn supported_models(&self) -> Vec<String> {
                vec![]
            }
            async fn health(&self) -> crate::provider::HealthStatus {
                crate::provider::HealthStatus {
                    healthy: true,
                    checked_at: Utc::now(),
                    response_time_ms: 0,
                    error: None,
                    details: serde_json::Map::new(),
                }
            }
            async fn create_session(
                &self,
                _: &str,
                _: &ProviderOptions,
            ) -> Result<String, crate::provider::ProviderError> {
                Err(crate::provider::ProviderError::unsupported("stateless"))
            }
            async fn send_prompt(
                &self,
                _: Option<&str>,
                _: &str,
                _: &ProviderOptions,
            ) -> Result<crate::provider::ProviderResponse, crate::provider::ProviderError> {
                unreachable!()
            }
            async fn destroy_session(&self, _: &str) -> Result<(), crate::provider::ProviderError> {
                Ok(())
            }
        }

        let manager = SessionManager::new();
        let adapter = Stateless;
        let opts = ProviderOptions::default();
        let ensured = manager
            .ensure_session("stateless", "", None, &adapter, &opts, true)
            .await
            .unwrap();
        assert!(!ensured.persisted);
        assert!(ensured.provider_session_id.is_none());
        assert!(ensured.session_id.starts_with("stateless-"));
    }
}
