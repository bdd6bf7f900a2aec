//! Schema-driven orchestration for coercing messy LLM output into validated, typed data.
//!
//! You describe the shape you want as a [`Schema`] (declarative data, not a chainable
//! validator), hand it to [`persuade`] along with an [`Adapter`] for your LLM backend,
//! and the orchestrator does the rest: compose a prompt, call the provider, validate
//! the reply, and on failure generate corrective feedback and retry — escalating in
//! urgency — until the retry budget runs out.
//!
//! # The mental model
//!
//! | Layer | Concept | Key types |
//! |-------|---------|-----------|
//! | **Schema** | What a valid value looks like | [`Schema`], [`schema::FieldSchema`] |
//! | **Validator** | Checks a value, collects every issue at once | [`validator::validate`], [`issue::Issue`] |
//! | **Feedback** | Turns issues into a corrective retry prompt | [`feedback::format_retry_feedback`] |
//! | **Adapter** | The seam to a concrete LLM backend | [`Adapter`], [`provider::DummyAdapter`] |
//! | **Session Manager** | Conversational state and metrics across calls | [`SessionManager`] |
//! | **Orchestrator** | Drives the attempt cycle | [`persuade`], [`init_session`] |
//!
//! # Quick start
//!
//! ```no_run
//! use persuader_core::schema::{FieldSchema, ObjectSchema, Schema, StringSchema};
//! use persuader_core::provider::DummyAdapter;
//! use persuader_core::orchestrator::{persuade, PersuadeOptions};
//! use indexmap::IndexMap;
//!
//! # async fn example() {
//! let mut fields = IndexMap::new();
//! fields.insert("reply".to_string(), FieldSchema::new(Schema::String(StringSchema::default())));
//! let schema = Schema::Object(ObjectSchema { fields, strict: true });
//!
//! let adapter = DummyAdapter::new([r#"{"reply":"hi"}"#]);
//! let options = PersuadeOptions::new(&schema, serde_json::json!({"question": "hello"}), &adapter);
//! let result = persuade(options).await.unwrap();
//! assert_eq!(result.value["reply"], "hi");
//! # }
//! ```

pub mod error;
pub mod feedback;
pub mod issue;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod schema;
pub mod session;
pub mod validator;

pub use error::PersuaderError;
pub use orchestrator::{
    CallMetadata, InitSessionOptions, InitSessionResult, PersuadeFailure, PersuadeOptions,
    PersuadeSuccess, init_session, persuade,
};
pub use provider::Adapter;
pub use schema::Schema;
pub use session::{Session, SessionManager};
pub use validator::{ValidationError, validate};
