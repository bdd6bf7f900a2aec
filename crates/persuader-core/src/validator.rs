//! JSON/Schema Validator — parses raw LLM text and validates it against a [`Schema`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::feedback::{build_structured_feedback, generate_suggestions};
use crate::issue::{Issue, IssueCode};
use crate::schema::{ArraySchema, EnumSchema, NumberSchema, ObjectSchema, PathSegment, Schema, StringSchema, UnionSchema, describe};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    JsonParse,
    SchemaMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredFeedback {
    pub summary: String,
    pub specific_issues: Vec<String>,
    pub correction_instructions: Vec<String>,
}

/// A grouped failure for one validation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
    pub issues: Vec<Issue>,
    pub raw_value: Option<Value>,
    pub raw_text: String,
    pub schema_description: String,
    pub suggestions: Vec<String>,
    /// Always `retry` for validation errors — exhaustion is governed by the attempt
    /// budget, not by this tag. Validation errors are always retryable within the
    /// configured budget.
    pub retry_strategy: RetryStrategy,
    pub structured_feedback: StructuredFeedback,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Retry,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Single entry point: parse `raw_text` as JSON and validate it against `schema`.
pub fn validate(schema: &Schema, raw_text: &str) -> Result<Value, ValidationError> {
    let trimmed = raw_text.trim();

    let parsed: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(err) => return Err(json_parse_error(trimmed, &err)),
    };

    let mut issues = Vec::new();
    check(schema, &parsed, &mut Vec::new(), &mut issues);

    if issues.is_empty() {
        return Ok(parsed);
    }

    Err(schema_error(schema, parsed, trimmed, issues))
}

fn json_parse_error(raw_text: &str, err: &serde_json::Error) -> ValidationError {
    let message = format!(
        "failed to parse response as JSON: {err} (line {}, column {})",
        err.line(),
        err.column()
    );
    ValidationError {
        kind: ValidationErrorKind::JsonParse,
        message: message.clone(),
        issues: Vec::new(),
        raw_value: None,
        raw_text: raw_text.to_string(),
        schema_description: String::new(),
        suggestions: vec![format!("Fix the JSON syntax error: {err}")],
        retry_strategy: RetryStrategy::Retry,
        structured_feedback: StructuredFeedback {
            summary: message,
            specific_issues: Vec::new(),
            correction_instructions: vec!["Return a single, syntactically valid JSON value.".to_string()],
        },
    }
}

fn schema_error(schema: &Schema, value: Value, raw_text: &str, issues: Vec<Issue>) -> ValidationError {
    let suggestions = generate_suggestions(&issues, schema);
    let structured_feedback = build_structured_feedback(&issues, schema);
    ValidationError {
        kind: ValidationErrorKind::SchemaMismatch,
        message: format!("{} validation issue(s) against schema", issues.len()),
        issues,
        raw_value: Some(value),
        raw_text: raw_text.to_string(),
        schema_description: describe(schema),
        suggestions,
        retry_strategy: RetryStrategy::Retry,
        structured_feedback,
    }
}

fn push(issues: &mut Vec<Issue>, path: &[PathSegment], code: IssueCode, expected: Option<&str>, received: Option<&str>, message: String) {
    issues.push(Issue {
        path: path.to_vec(),
        code,
        expected: expected.map(String::from),
        received: received.map(String::from),
        message,
        options: None,
    });
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check(schema: &Schema, value: &Value, path: &mut Vec<PathSegment>, issues: &mut Vec<Issue>) {
    match schema {
        Schema::Object(obj) => check_object(obj, value, path, issues),
        Schema::Array(arr) => check_array(arr, value, path, issues),
        Schema::String(s) => check_string(s, value, path, issues),
        Schema::Number(n) => check_number(n, value, path, issues),
        Schema::Boolean => {
            if !value.is_boolean() {
                push(
                    issues,
                    path,
                    IssueCode::InvalidType,
                    Some("boolean"),
                    Some(json_type_name(value)),
                    format!("expected boolean, got {}", json_type_name(value)),
                );
            }
        }
        Schema::Enum(e) => check_enum(e, value, path, issues),
        Schema::Union(u) => check_union(u, value, path, issues),
    }
}

fn check_object(obj: &ObjectSchema, value: &Value, path: &mut Vec<PathSegment>, issues: &mut Vec<Issue>) {
    let Some(map) = value.as_object() else {
        push(
            issues,
            path,
            IssueCode::InvalidType,
            Some("object"),
            Some(json_type_name(value)),
            format!("expected object, got {}", json_type_name(value)),
        );
        return;
    };

    for (name, field) in &obj.fields {
        match map.get(name) {
            Some(field_value) => {
                path.push(PathSegment::Key(name.clone()));
                check(&field.schema, field_value, path, issues);
                path.pop();
            }
            None if !field.optional => {
                path.push(PathSegment::Key(name.clone()));
                push(
                    issues,
                    path,
                    IssueCode::RequiredMissing,
                    None,
                    None,
                    format!("required field `{name}` is missing"),
                );
                path.pop();
            }
            None => {}
        }
    }

    if obj.strict {
        let extra: Vec<String> = map
            .keys()
            .filter(|k| !obj.fields.contains_key(*k))
            .cloned()
            .collect();
        if !extra.is_empty() {
            issues.push(Issue {
                path: path.to_vec(),
                code: IssueCode::UnrecognizedKeys,
                expected: None,
                received: None,
                message: format!("unrecognized key(s): {}", extra.join(", ")),
                options: Some(extra),
            });
        }
    }
}

fn check_array(arr: &ArraySchema, value: &Value, path: &mut Vec<PathSegment>, issues: &mut Vec<Issue>) {
    let Some(items) = value.as_array() else {
        push(
            issues,
            path,
            IssueCode::InvalidType,
            Some("array"),
            Some(json_type_name(value)),
            format!("expected array, got {}", json_type_name(value)),
        );
        return;
    };

    if let Some(min) = arr.min_length {
        if items.len() < min {
            push(
                issues,
                path,
                IssueCode::TooSmall,
                None,
                None,
                format!("array has {} item(s), minimum is {min}", items.len()),
            );
        }
    }
    if let Some(max) = arr.max_length {
        if items.len() > max {
            push(
                issues,
                path,
                IssueCode::TooBig,
                None,
                None,
                format!("array has {} item(s), maximum is {max}", items.len()),
            );
        }
    }

    for (i, item) in items.iter().enumerate() {
        path.push(PathSegment::Index(i));
        check(&arr.element, item, path, issues);
        path.pop();
    }
}

fn check_string(s: &StringSchema, value: &Value, path: &mut Vec<PathSegment>, issues: &mut Vec<Issue>) {
    let Some(text) = value.as_str() else {
        push(
            issues,
            path,
            IssueCode::InvalidType,
            Some("string"),
            Some(json_type_name(value)),
            format!("expected string, got {}", json_type_name(value)),
        );
        return;
    };

    if let Some(min) = s.min_length {
        if text.chars().count() < min {
            push(
                issues,
                path,
                IssueCode::TooSmall,
                None,
                None,
                format!("string has length {}, minimum is {min}", text.chars().count()),
            );
        }
    }
    if let Some(max) = s.max_length {
        if text.chars().count() > max {
            push(
                issues,
                path,
                IssueCode::TooBig,
                None,
                None,
                format!("string has length {}, maximum is {max}", text.chars().count()),
            );
        }
    }
    if let Some(format) = s.format {
        if !format.matches(text) {
            push(
                issues,
                path,
                IssueCode::InvalidFormat,
                Some(format.name()),
                Some(text),
                format!("does not match the `{}` format", format.name()),
            );
        }
    }
}

fn check_number(n: &NumberSchema, value: &Value, path: &mut Vec<PathSegment>, issues: &mut Vec<Issue>) {
    let Some(num) = value.as_f64() else {
        push(
            issues,
            path,
            IssueCode::InvalidType,
            Some("number"),
            Some(json_type_name(value)),
            format!("expected number, got {}", json_type_name(value)),
        );
        return;
    };

    if n.integer && num.fract() != 0.0 {
        push(
            issues,
            path,
            IssueCode::InvalidType,
            Some("integer"),
            Some("non-integer number"),
            format!("expected an integer, got {num}"),
        );
        return;
    }

    if let Some(min) = n.min {
        if num < min {
            push(issues, path, IssueCode::TooSmall, None, None, format!("{num} is below the minimum of {min}"));
        }
    }
    if let Some(max) = n.max {
        if num > max {
            push(issues, path, IssueCode::TooBig, None, None, format!("{num} is above the maximum of {max}"));
        }
    }
}

fn check_enum(e: &EnumSchema, value: &Value, path: &mut Vec<PathSegment>, issues: &mut Vec<Issue>) {
    let Some(text) = value.as_str() else {
        push(
            issues,
            path,
            IssueCode::InvalidType,
            Some("string"),
            Some(json_type_name(value)),
            format!("expected string, got {}", json_type_name(value)),
        );
        return;
    };

    if !e.options.iter().any(|opt| opt == text) {
        issues.push(Issue {
            path: path.to_vec(),
            code: IssueCode::InvalidEnum,
            expected: None,
            received: Some(text.to_string()),
            message: format!("`{text}` is not one of the allowed values"),
            options: Some(e.options.clone()),
        });
    }
}

fn check_union(u: &UnionSchema, value: &Value, path: &mut Vec<PathSegment>, issues: &mut Vec<Issue>) {
    match &u.discriminator {
        Some(discriminator) => {
            let Some(tag) = value.get(discriminator).and_then(Value::as_str) else {
                path.push(PathSegment::Key(discriminator.clone()));
                push(
                    issues,
                    path,
                    IssueCode::InvalidValue,
                    None,
                    None,
                    format!("discriminator field `{discriminator}` is missing or not a string"),
                );
                path.pop();
                return;
            };

            let variant = u.variants.iter().find(|variant| {
                matches!(variant, Schema::Object(obj)
                    if matches!(obj.fields.get(discriminator).map(|f| f.schema.as_ref()), Some(Schema::Enum(e)) if e.options.iter().any(|o| o == tag)))
            });

            match variant {
                Some(variant) => check(variant, value, path, issues),
                None => {
                    let valid_tags: Vec<String> = u
                        .variants
                        .iter()
                        .filter_map(|v| match v {
                            Schema::Object(obj) => match obj.fields.get(discriminator).map(|f| f.schema.as_ref()) {
                                Some(Schema::Enum(e)) => e.options.first().cloned(),
                                _ => None,
                            },
                            _ => None,
                        })
                        .collect();
                    path.push(PathSegment::Key(discriminator.clone()));
                    issues.push(Issue {
                        path: path.clone(),
                        code: IssueCode::InvalidValue,
                        expected: Some(valid_tags.join(", ")),
                        received: Some(tag.to_string()),
                        message: format!("`{tag}` does not match any known variant of `{discriminator}`"),
                        options: Some(valid_tags),
                    });
                    path.pop();
                }
            }
        }
        None => {
            let all_issues: Vec<Vec<Issue>> = u
                .variants
                .iter()
                .map(|variant| {
                    let mut variant_issues = Vec::new();
                    check(variant, value, &mut path.clone(), &mut variant_issues);
                    variant_issues
                })
                .collect();

            if all_issues.iter().any(Vec::is_empty) {
                return;
            }

            push(
                issues,
                path,
                IssueCode::InvalidUnion,
                None,
                None,
                "value does not match any union variant".to_string(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSchema, StringFormat};
    use indexmap::IndexMap;

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

    #[test]
    fn accepts_valid_value() {
        let value = validate(&person_schema(), r#"{"name":"Ada Lovelace","age":36}"#).unwrap();
        assert_eq!(value["name"], "Ada Lovelace");
    }

    #[test]
    fn rejects_malformed_json() {
        let err = validate(&person_schema(), "Here is the answer: {name:\"Ada\",age:36}").unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::JsonParse);
    }

    #[test]
    fn unrecognized_keys_are_reported_not_dropped() {
        let err = validate(&person_schema(), r#"{"name":"Ada","age":36,"extra":true}"#).unwrap_err();
        assert!(err.issues.iter().any(|i| i.code == IssueCode::UnrecognizedKeys));
    }

    #[test]
    fn non_integer_age_is_invalid_type() {
        let err = validate(&person_schema(), r#"{"name":"Ada","age":36.5}"#).unwrap_err();
        assert!(err.issues.iter().any(|i| i.code == IssueCode::InvalidType && i.expected.as_deref() == Some("integer")));
    }

    #[test]
    fn email_format_is_checked() {
        let mut fields = IndexMap::new();
        fields.insert(
            "email".to_string(),
            FieldSchema::new(Schema::String(StringSchema {
                format: Some(StringFormat::Email),
                ..Default::default()
            })),
        );
        let schema = Schema::Object(ObjectSchema { fields, strict: true });
        let err = validate(&schema, r#"{"email":"not-an-email"}"#).unwrap_err();
        assert!(err.issues.iter().any(|i| i.code == IssueCode::InvalidFormat));
    }

    #[test]
    fn collects_all_issues_without_early_exit() {
        let err = validate(&person_schema(), r#"{"age":-5,"extra":1}"#).unwrap_err();
        // missing name, negative age, unrecognized key: three independent issues.
        assert_eq!(err.issues.len(), 3);
    }
}
