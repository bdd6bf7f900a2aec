//! Top-level error taxonomy surfaced by `persuade()` and `init_session()`.
//!
//! A closed set of five kinds, separating the library's internal failure classes
//! from its consumer-facing error surface.

use crate::provider::ProviderError;
use crate::session::SessionError;
use crate::validator::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum PersuaderError {
    /// The retry budget was exhausted without a validating response. Carries the
    /// last attempt's [`ValidationError`] — issues and suggestions reflect it, not
    /// the full attempt history.
    #[error("validation failed after exhausting retries: {0}")]
    Validation(#[source] ValidationError),

    /// The adapter reported a non-retryable failure, or a retryable one survived
    /// the retry budget.
    #[error("provider error: {0}")]
    Provider(#[source] ProviderError),

    /// A programmer error: null/malformed schema, an unsupported combination of
    /// options, or a caller misuse the library refuses to silently paper over.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Session lookup/creation failed in a way that could not fall back to a new
    /// session (e.g. the provider itself rejected session creation).
    #[error("session error: {0}")]
    Session(#[source] SessionError),

    /// Cooperative cancellation observed at a suspension point. Terminal; no
    /// success feedback is appended.
    #[error("operation cancelled")]
    Cancelled,
}

impl PersuaderError {
    /// Whether retrying the same call, unmodified, has any chance of succeeding.
    /// Validation errors are never retryable at this level — they were already
    /// retried internally up to the configured budget before surfacing.
    pub fn is_retryable(&self) -> bool {
        match self {
            PersuaderError::Provider(err) => err.retryable,
            _ => false,
        }
    }

    pub fn class(&self) -> &'static str {
        match self {
            PersuaderError::Validation(_) => "validation",
            PersuaderError::Provider(_) => "provider",
            PersuaderError::Configuration(_) => "configuration",
            PersuaderError::Session(_) => "session",
            PersuaderError::Cancelled => "cancelled",
        }
    }
}

impl From<ProviderError> for PersuaderError {
    fn from(err: ProviderError) -> Self {
        PersuaderError::Provider(err)
    }
}

impl From<SessionError> for PersuaderError {
    fn from(err: SessionError) -> Self {
        PersuaderError::Session(err)
    }
}
