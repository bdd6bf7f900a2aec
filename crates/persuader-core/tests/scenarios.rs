use indexmap::IndexMap;
use persuader_core::orchestrator::{PersuadeOptions, persuade};
use persuader_core::provider::DummyAdapter;
use persuader_core::schema::{EnumSchema, FieldSchema, NumberSchema, ObjectSchema, Schema, StringSchema, example};
use persuader_core::session::SessionManager;
use persuader_core::validator::validate;

fn person_schema() -> Schema {
    let mut fields = IndexMap::new();
    fields.insert("name".to_string(), FieldSchema::new(Schema::String(StringSchema::default())));
    fields.insert(
        "age".to_string(),
        FieldSchema::new(Schema::Number(NumberSchema {
            min: Some(0.0),
            max: None,
            integer: true,
        })),
    );
    Schema::Object(ObjectSchema { fields, strict: true })
}

fn rating_schema() -> Schema {
    let mut fields = IndexMap::new();
    fields.insert(
        "rating".to_string(),
        FieldSchema::new(Schema::Enum(EnumSchema {
            options: vec!["good".into(), "bad".into(), "mixed".into()],
        })),
    );
    Schema::Object(ObjectSchema { fields, strict: true })
}

// S1 — First-try success.
#[tokio::test]
async fn s1_first_try_success() {
    let schema = person_schema();
    let adapter = DummyAdapter::new([r#"{"name":"Ada Lovelace","age":36}"#]);
    let options = PersuadeOptions::new(&schema, serde_json::json!({"text": "Parse: Ada Lovelace, 36"}), &adapter);
    let result = persuade(options).await.unwrap();
    assert_eq!(result.attempts, 1);
    assert_eq!(result.value["name"], "Ada Lovelace");
    assert_eq!(result.value["age"], 36);
}

// S2 — JSON parse recovery.
#[tokio::test]
async fn s2_json_parse_recovery() {
    let schema = person_schema();
    let adapter = DummyAdapter::new([
        r#"Here is the answer: {name:"Ada",age:36}"#,
        r#"{"name":"Ada","age":36}"#,
    ]);
    let options = PersuadeOptions::new(&schema, serde_json::json!({"text": "Parse: Ada, 36"}), &adapter);
    let result = persuade(options).await.unwrap();
    assert_eq!(result.attempts, 2);

    let prompts = adapter.sent_prompts().await;
    assert!(prompts[1].contains("must be valid JSON"));
    assert!(!prompts[1].contains("CRITICAL"));
}

// S3 — Enum "did you mean".
#[tokio::test]
async fn s3_enum_did_you_mean() {
    let schema = rating_schema();
    let adapter = DummyAdapter::new([r#"{"rating":"Good"}"#, r#"{"rating":"good"}"#]);
    let options = PersuadeOptions::new(&schema, serde_json::json!({"text": "rate it"}), &adapter);
    let result = persuade(options).await.unwrap();

    assert_eq!(result.attempts, 2);
    assert_eq!(result.value["rating"], "good");
    let prompts = adapter.sent_prompts().await;
    assert!(prompts[1].contains("Did you mean: good"));
}

// S4 — Exhausted retries.
#[tokio::test]
async fn s4_exhausted_retries() {
    let schema = person_schema();
    let adapter = DummyAdapter::new(["not json"]);
    let options = PersuadeOptions::new(&schema, serde_json::json!({"text": "Parse: Ada, 36"}), &adapter).retries(2);
    let failure = persuade(options).await.unwrap_err();

    assert_eq!(failure.attempts, 3);
    assert_eq!(failure.error.class(), "validation");

    let prompts = adapter.sent_prompts().await;
    assert_eq!(prompts.len(), 3);
    assert!(prompts[2].contains("CRITICAL"));
    assert!(prompts[2].contains("final attempt"));
}

// S5 — Example pre-validation aborts.
#[tokio::test]
async fn s5_bad_example_aborts_before_any_adapter_call() {
    let schema = person_schema();
    let adapter = DummyAdapter::new(["should never be sent"]);
    let mut options = PersuadeOptions::new(&schema, serde_json::json!({"text": "Parse: Ada, -1"}), &adapter);
    options.example_output = Some(serde_json::json!({"name": "Ada", "age": -1}));

    let failure = persuade(options).await.unwrap_err();
    assert_eq!(failure.error.class(), "configuration");
    assert_eq!(failure.attempts, 0);
    assert_eq!(adapter.call_count().await, 0);
}

// S6 — Session reuse across calls.
#[tokio::test]
async fn s6_session_reuse_across_calls() {
    let schema = person_schema();
    let adapter = DummyAdapter::new([
        r#"{"name":"Ada","age":36}"#,
        r#"{"name":"Grace","age":85}"#,
    ]);
    let manager = SessionManager::new();

    let first = PersuadeOptions::new(&schema, serde_json::json!({"text": "Ada, 36"}), &adapter)
        .context("Extract a person's name and age.")
        .session_manager(&manager);
    let first_result = persuade(first).await.unwrap();

    let second = PersuadeOptions::new(&schema, serde_json::json!({"text": "Grace, 85"}), &adapter)
        .context("Extract a person's name and age.")
        .session_id(first_result.session_id.clone())
        .session_manager(&manager);
    persuade(second).await.unwrap();

    let prompts = adapter.sent_prompts().await;
    assert!(prompts[0].contains("Extract a person's name and age."));
    assert!(!prompts[1].contains("Extract a person's name and age."));

    let metrics = manager.metrics(&first_result.session_id).await.unwrap();
    let session = manager.get(&first_result.session_id).await.unwrap();
    assert_eq!(session.metadata.prompt_count, prompts.len() as u64);
    assert_eq!(metrics.successful_validations, 2);
}

// Universal invariants.

#[tokio::test]
async fn p1_ok_result_value_always_validates() {
    let schema = person_schema();
    let adapter = DummyAdapter::new([r#"{"name":"Ada","age":36}"#]);
    let options = PersuadeOptions::new(&schema, serde_json::json!({}), &adapter);
    let result = persuade(options).await.unwrap();
    assert!(validate(&schema, &result.value.to_string()).is_ok());
}

#[tokio::test]
async fn p2_attempts_at_least_one_unless_configuration_error() {
    let schema = person_schema();
    let adapter = DummyAdapter::new([r#"{"name":"Ada","age":36}"#]);
    let options = PersuadeOptions::new(&schema, serde_json::json!({}), &adapter);
    let result = persuade(options).await.unwrap();
    assert!(result.attempts >= 1);

    let adapter2 = DummyAdapter::new(["unused"]);
    let mut bad_example_options = PersuadeOptions::new(&schema, serde_json::json!({}), &adapter2);
    bad_example_options.example_output = Some(serde_json::json!({"name": "Ada", "age": -1}));
    let failure = persuade(bad_example_options).await.unwrap_err();
    assert_eq!(failure.attempts, 0);
}

#[tokio::test]
async fn p3_successful_validations_never_exceed_total_attempts() {
    let schema = person_schema();
    let adapter = DummyAdapter::new(["not json", r#"{"name":"Ada","age":36}"#]);
    let manager = SessionManager::new();
    let options = PersuadeOptions::new(&schema, serde_json::json!({}), &adapter).session_manager(&manager);
    let result = persuade(options).await.unwrap();
    let metrics = manager.metrics(&result.session_id).await.unwrap();
    assert!(metrics.successful_validations <= metrics.total_attempts);
}

#[tokio::test]
async fn p5_stateless_provider_never_receives_a_session_id() {
    use async_trait::async_trait;
    use persuader_core::provider::{
        Adapter, HealthStatus, ProviderError, ProviderOptions, ProviderResponse, StopReason, TokenUsage,
    };

    struct AssertingStatelessAdapter;
    #[async_trait]
    impl Adapter for AssertingStatelessAdapter {
        fn name(&self) -> &str {
            "stateless-assert"
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
        async fn health(&self) -> HealthStatus {
            HealthStatus {
                healthy: true,
                checked_at: chrono::Utc::now(),
                response_time_ms: 0,
                error: None,
                details: serde_json::Map::new(),
            }
        }
        async fn create_session(&self, _: &str, _: &ProviderOptions) -> Result<String, ProviderError> {
            Err(ProviderError::unsupported("stateless"))
        }
        async fn send_prompt(
            &self,
            session_id: Option<&str>,
            _prompt: &str,
            _options: &ProviderOptions,
        ) -> Result<ProviderResponse, ProviderError> {
            assert!(session_id.is_none(), "I5: stateless adapter received a session id");
            Ok(ProviderResponse {
                content: r#"{"name":"Ada","age":36}"#.to_string(),
                token_usage: TokenUsage::default(),
                metadata: serde_json::Map::new(),
                truncated: false,
                stop_reason: StopReason::EndTurn,
            })
        }
        async fn destroy_session(&self, _: &str) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    let schema = person_schema();
    let adapter = AssertingStatelessAdapter;
    let options = PersuadeOptions::new(&schema, serde_json::json!({}), &adapter);
    persuade(options).await.unwrap();
}

#[tokio::test]
async fn p7_example_always_validates() {
    let schemas = vec![person_schema(), rating_schema()];
    for schema in schemas {
        let value = example(&schema);
        assert!(validate(&schema, &serde_json::to_string(&value).unwrap()).is_ok());
    }
}

#[tokio::test]
async fn p8_roundtrip_revalidates_to_the_same_value() {
    let schema = person_schema();
    let adapter = DummyAdapter::new([r#"{"name":"Ada","age":36}"#]);
    let options = PersuadeOptions::new(&schema, serde_json::json!({}), &adapter);
    let result = persuade(options).await.unwrap();
    let reserialized = result.value.to_string();
    let revalidated = validate(&schema, &reserialized).unwrap();
    assert_eq!(revalidated, result.value);
}
