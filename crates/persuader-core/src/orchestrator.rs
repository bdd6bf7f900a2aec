//! Retry Loop / Orchestrator — the single public operation driving an attempt cycle.

use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use serde_json::Value;

use crate::error::PersuaderError;
use crate::feedback::format_retry_feedback;
use crate::prompt::{PromptParts, compose};
use crate::provider::{Adapter, ProviderOptions, TokenUsage};
use crate::schema::{Schema, example};
use crate::session::{GLOBAL_SESSION_MANAGER, SessionManager, SuccessFeedbackEntry};
use crate::validator::{ValidationError, validate};

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);
const BACKOFF_FACTOR: u32 = 2;

#[derive(Debug, Clone)]
pub struct CallMetadata {
    pub execution_time_ms: u64,
    pub token_usage: TokenUsage,
    pub provider: String,
    pub model: Option<String>,
    pub attempts: u32,
    pub started_at: chrono::DateTime<Utc>,
    pub finished_at: chrono::DateTime<Utc>,
    pub session_id: String,
}

#[derive(Debug, Clone)]
pub struct PersuadeSuccess {
    pub value: Value,
    pub attempts: u32,
    pub session_id: String,
    pub metadata: CallMetadata,
}

#[derive(Debug)]
pub struct PersuadeFailure {
    pub error: PersuaderError,
    pub attempts: u32,
    pub session_id: String,
    pub metadata: CallMetadata,
}

/// Inputs to [`persuade`]. Construct with [`PersuadeOptions::new`] and the builder
/// methods; fields not set default to the values documented on each method.
pub struct PersuadeOptions<'a> {
    pub schema: &'a Schema,
    pub input: Value,
    pub adapter: &'a dyn Adapter,
    pub session_manager: Option<&'a SessionManager>,
    pub context: Option<String>,
    pub lens: Option<String>,
    pub session_id: Option<String>,
    pub retries: u32,
    pub model: Option<String>,
    pub example_output: Option<Value>,
    pub success_message: Option<String>,
    pub provider_options: ProviderOptions,
    pub reuse_session: bool,
}

impl<'a> PersuadeOptions<'a> {
    pub fn new(schema: &'a Schema, input: Value, adapter: &'a dyn Adapter) -> Self {
        Self {
            schema,
            input,
            adapter,
            session_manager: None,
            context: None,
            lens: None,
            session_id: None,
            retries: 3,
            model: None,
            example_output: None,
            success_message: None,
            provider_options: ProviderOptions::default(),
            reuse_session: true,
        }
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn lens(mut self, lens: impl Into<String>) -> Self {
        self.lens = Some(lens.into());
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn success_message(mut self, message: impl Into<String>) -> Self {
        self.success_message = Some(message.into());
        self
    }

    pub fn session_manager(mut self, manager: &'a SessionManager) -> Self {
        self.session_manager = Some(manager);
        self
    }
}

/// `persuade()` — drive the attempt cycle until the provider's output validates
/// against `schema`, or the retry budget is exhausted.
pub async fn persuade(options: PersuadeOptions<'_>) -> Result<PersuadeSuccess, PersuadeFailure> {
    let started_at = Utc::now();
    let start_instant = Instant::now();
    let manager = options.session_manager.unwrap_or(&GLOBAL_SESSION_MANAGER);
    let max_attempts = options.retries + 1;
    let provider_name = options.adapter.name().to_string();
    let context = options.context.clone().unwrap_or_default();

    // PRIMING: a caller-supplied example is validated before anything else touches
    // the adapter. A bad example is a programmer error, not something to retry past.
    if let Some(example_val) = &options.example_output {
        let serialized = serde_json::to_string(example_val).unwrap_or_default();
        if validate(options.schema, &serialized).is_err() {
            return Err(finish_failure(
                PersuaderError::Configuration(
                    "caller-supplied example_output does not satisfy the schema".to_string(),
                ),
                0,
                String::new(),
                &provider_name,
                options.model.clone(),
                started_at,
                start_instant,
                TokenUsage::default(),
            ));
        }
    }

    let ensured = match manager
        .ensure_session(
            &provider_name,
            &context,
            options.session_id.as_deref(),
            options.adapter,
            &options.provider_options,
            options.reuse_session,
        )
        .await
    {
        Ok(ensured) => ensured,
        Err(err) => {
            return Err(finish_failure(
                PersuaderError::Provider(err),
                0,
                options.session_id.clone().unwrap_or_default(),
                &provider_name,
                options.model.clone(),
                started_at,
                start_instant,
                TokenUsage::default(),
            ));
        }
    };

    let session_id = ensured.session_id.clone();
    // Only the first prompt against a brand-new session carries the durable context;
    // a reused session omits it on every attempt to save tokens.
    let first_attempt_includes_context = ensured.is_new && !context.is_empty();

    let example_value = options.example_output.clone().unwrap_or_else(|| example(options.schema));
    let mut last_error: Option<ValidationError> = None;
    let mut total_tokens = TokenUsage::default();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        if attempt > max_attempts {
            let error = last_error
                .take()
                .map(PersuaderError::Validation)
                .unwrap_or_else(|| PersuaderError::Configuration("exhausted retries with no recorded error".to_string()));
            manager.record_terminal(&session_id, attempt - 1, false, elapsed_ms(start_instant)).await;
            return Err(finish_failure(
                error,
                attempt - 1,
                session_id,
                &provider_name,
                options.model.clone(),
                started_at,
                start_instant,
                total_tokens,
            ));
        }

        if is_cancelled(&options.provider_options) {
            manager.record_terminal(&session_id, attempt - 1, false, elapsed_ms(start_instant)).await;
            return Err(finish_failure(
                PersuaderError::Cancelled,
                attempt - 1,
                session_id,
                &provider_name,
                options.model.clone(),
                started_at,
                start_instant,
                total_tokens,
            ));
        }

        let feedback = last_error
            .as_ref()
            .map(|err| format_retry_feedback(err, attempt, max_attempts));
        let parts = PromptParts {
            context: if attempt == 1 && first_attempt_includes_context {
                Some(context.as_str())
            } else {
                None
            },
            lens: options.lens.as_deref(),
            example: Some(&example_value),
            input: &options.input,
            feedback: feedback.as_deref(),
        };
        let prompt = compose(&parts);

        if is_cancelled(&options.provider_options) {
            manager.record_terminal(&session_id, attempt - 1, false, elapsed_ms(start_instant)).await;
            return Err(finish_failure(
                PersuaderError::Cancelled,
                attempt - 1,
                session_id,
                &provider_name,
                options.model.clone(),
                started_at,
                start_instant,
                total_tokens,
            ));
        }

        tracing::debug!(attempt, session_id = %session_id, "PROMPTING");
        let response = send_with_backoff(
            options.adapter,
            ensured.provider_session_id.as_deref(),
            &prompt,
            &options.provider_options,
            max_attempts - attempt,
        )
        .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                manager.record_terminal(&session_id, attempt, false, elapsed_ms(start_instant)).await;
                return Err(finish_failure(
                    PersuaderError::Provider(err),
                    attempt,
                    session_id,
                    &provider_name,
                    options.model.clone(),
                    started_at,
                    start_instant,
                    total_tokens,
                ));
            }
        };

        manager.record_prompt(&session_id, &response.token_usage).await;
        total_tokens += response.token_usage.clone();

        tracing::debug!(attempt, session_id = %session_id, "VALIDATING");
        match validate(options.schema, &response.content) {
            Ok(value) => {
                if attempt == 1 {
                    if let Some(success_message) = &options.success_message {
                        if options.adapter.supports_session() {
                            if let Ok(reinforcement) = options
                                .adapter
                                .send_prompt(ensured.provider_session_id.as_deref(), success_message, &options.provider_options)
                                .await
                            {
                                manager.record_reinforcement_tokens(&session_id, &reinforcement.token_usage).await;
                            }
                            let _ = manager
                                .add_success_feedback(
                                    &session_id,
                                    SuccessFeedbackEntry {
                                        message: success_message.clone(),
                                        value: value.clone(),
                                        attempt,
                                        timestamp: Utc::now(),
                                        metadata: None,
                                    },
                                )
                                .await;
                        }
                    }
                }
                manager.record_terminal(&session_id, attempt, true, elapsed_ms(start_instant)).await;
                return Ok(PersuadeSuccess {
                    value,
                    attempts: attempt,
                    session_id: session_id.clone(),
                    metadata: CallMetadata {
                        execution_time_ms: elapsed_ms(start_instant),
                        token_usage: total_tokens,
                        provider: provider_name,
                        model: options.model.clone(),
                        attempts: attempt,
                        started_at,
                        finished_at: Utc::now(),
                        session_id: session_id.clone(),
                    },
                });
            }
            Err(err) => {
                tracing::debug!(attempt, issues = err.issues.len(), "RETRYING after validation failure");
                last_error = Some(err);
            }
        }
    }
}

fn is_cancelled(options: &ProviderOptions) -> bool {
    options.cancellation.as_ref().map(|c| c.is_cancelled()).unwrap_or(false)
}

/// Sends one prompt, retrying transport-level failures (timeouts, 429s, 5xx) with
/// exponential backoff. `remaining_attempts` bounds how many extra tries are spent
/// here so a flaky adapter can't starve the caller's overall retry budget.
async fn send_with_backoff(
    adapter: &dyn Adapter,
    provider_session_id: Option<&str>,
    prompt: &str,
    options: &ProviderOptions,
    remaining_attempts: u32,
) -> Result<crate::provider::ProviderResponse, crate::provider::ProviderError> {
    let mut tried = 0u32;
    loop {
        match adapter.send_prompt(provider_session_id, prompt, options).await {
            Ok(response) => return Ok(response),
            Err(err) if err.retryable && tried < remaining_attempts => {
                tried += 1;
                tracing::debug!(tried, error = %err, "retrying transport-level provider error");
                sleep_backoff(tried).await;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn sleep_backoff(retry_index: u32) {
    let exponent = retry_index.saturating_sub(1).min(16);
    let base_ms = INITIAL_BACKOFF.as_millis() as u64 * (BACKOFF_FACTOR as u64).pow(exponent);
    let capped_ms = base_ms.min(MAX_BACKOFF.as_millis() as u64);
    let jitter = rand::thread_rng().gen_range(0.8..1.2);
    let delay_ms = (capped_ms as f64 * jitter) as u64;
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[allow(clippy::too_many_arguments)]
fn finish_failure(
    error: PersuaderError,
    attempts: u32,
    session_id: String,
    provider: &str,
    model: Option<String>,
    started_at: chrono::DateTime<Utc>,
    start_instant: Instant,
    token_usage: TokenUsage,
) -> PersuadeFailure {
    PersuadeFailure {
        error,
        attempts,
        session_id: session_id.clone(),
        metadata: CallMetadata {
            execution_time_ms: elapsed_ms(start_instant),
            token_usage,
            provider: provider.to_string(),
            model,
            attempts,
            started_at,
            finished_at: Utc::now(),
            session_id,
        },
    }
}

/// Options for [`init_session`] — create or reuse a session without schema
/// validation, optionally sending a single prompt whose raw reply is returned.
pub struct InitSessionOptions<'a> {
    pub context: String,
    pub initial_prompt: Option<String>,
    pub session_id: Option<String>,
    pub adapter: &'a dyn Adapter,
    pub session_manager: Option<&'a SessionManager>,
    pub model: Option<String>,
    pub provider_options: ProviderOptions,
}

pub struct InitSessionResult {
    pub session_id: String,
    pub response: Option<String>,
    pub metadata: CallMetadata,
}

pub async fn init_session(options: InitSessionOptions<'_>) -> Result<InitSessionResult, PersuaderError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();
    let manager = options.session_manager.unwrap_or(&GLOBAL_SESSION_MANAGER);
    let provider_name = options.adapter.name().to_string();

    let ensured = manager
        .ensure_session(
            &provider_name,
            &options.context,
            options.session_id.as_deref(),
            options.adapter,
            &options.provider_options,
            true,
        )
        .await?;

    let mut token_usage = TokenUsage::default();
    let response = match &options.initial_prompt {
        Some(prompt) => {
            let result = options
                .adapter
                .send_prompt(ensured.provider_session_id.as_deref(), prompt, &options.provider_options)
                .await?;
            manager.record_prompt(&ensured.session_id, &result.token_usage).await;
            token_usage += result.token_usage.clone();
            Some(result.content)
        }
        None => None,
    };

    Ok(InitSessionResult {
        session_id: ensured.session_id.clone(),
        response,
        metadata: CallMetadata {
            execution_time_ms: elapsed_ms(start_instant),
            token_usage,
            provider: provider_name,
            model: options.model,
            attempts: if options.initial_prompt.is_some() { 1 } else { 0 },
            started_at,
            finished_at: Utc::now(),
            session_id: ensured.session_id,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::DummyAdapter;
    use crate::schema::{FieldSchema, ObjectSchema, StringSchema};
    use indexmap::IndexMap;

    fn greeting_schema() -> Schema {
        let mut fields = IndexMap::new();
        fields.insert("reply".to_string(), FieldSchema::new(Schema::String(StringSchema::default())));
        Schema::Object(ObjectSchema { fields, strict: true })
    }

    #[tokio::test]
    async fn succeeds_on_first_valid_response() {
        let schema = greeting_schema();
        let adapter = DummyAdapter::new([r#"{"reply":"hi"}"#]);
        let options = PersuadeOptions::new(&schema, serde_json::json!({"q": "hello"}), &adapter);
        let result = persuade(options).await.unwrap();
        assert_eq!(result.attempts, 1);
        assert_eq!(result.value["reply"], "hi");
    }

    #[tokio::test]
    async fn retries_until_schema_is_satisfied() {
        let schema = greeting_schema();
        let adapter = DummyAdapter::new([
            "not json",
            r#"{"reply": 5}"#,
            r#"{"reply":"hi"}"#,
        ]);
        let options = PersuadeOptions::new(&schema, serde_json::json!({"q": "hello"}), &adapter).retries(3);
        let result = persuade(options).await.unwrap();
        assert_eq!(result.attempts, 3);
        let prompts = adapter.sent_prompts().await;
        assert!(prompts[1].contains("must be valid JSON"));
        assert!(prompts[2].contains("IMPORTANT") || prompts[2].contains("expected string"));
    }

    #[tokio::test]
    async fn surfaces_validation_failure_once_retries_exhausted() {
        let schema = greeting_schema();
        let adapter = DummyAdapter::new(["not json", "still not json"]);
        let options = PersuadeOptions::new(&schema, serde_json::json!({"q": "hello"}), &adapter).retries(1);
        let failure = persuade(options).await.unwrap_err();
        assert_eq!(failure.attempts, 2);
        assert_eq!(failure.error.class(), "validation");
    }

    #[tokio::test]
    async fn second_call_on_the_same_session_omits_context() {
        let schema = greeting_schema();
        let adapter = DummyAdapter::new([r#"{"reply":"hi"}"#, r#"{"reply":"again"}"#]);
        let manager = SessionManager::new();

        let first = PersuadeOptions::new(&schema, serde_json::json!({"q": "a"}), &adapter)
            .context("be terse")
            .session_manager(&manager);
        let first_result = persuade(first).await.unwrap();

        let second = PersuadeOptions::new(&schema, serde_json::json!({"q": "b"}), &adapter)
            .context("be terse")
            .session_id(first_result.session_id.clone())
            .session_manager(&manager);
        persuade(second).await.unwrap();

        let prompts = adapter.sent_prompts().await;
        assert!(prompts[0].contains("be terse"));
        assert!(!prompts[1].contains("be terse"));
    }

    #[tokio::test]
    async fn success_reinforcement_tokens_are_counted_separately() {
        let schema = greeting_schema();
        let adapter = DummyAdapter::new([r#"{"reply":"hi"}"#, "thanks, noted"]);
        let manager = SessionManager::new();

        let options = PersuadeOptions::new(&schema, serde_json::json!({"q": "hello"}), &adapter)
            .success_message("Great job, keep doing exactly that.")
            .session_manager(&manager);
        let result = persuade(options).await.unwrap();

        let metrics = manager.metrics(&result.session_id).await.unwrap();
        assert!(metrics.reinforcement_tokens.total_tokens > 0);
        assert_eq!(adapter.call_count().await, 2);

        let feedback = manager.get_success_feedback(&result.session_id, 10).await;
        assert_eq!(feedback.len(), 1);
        assert_eq!(feedback[0].attempt, 1);
    }
}
