//! Turns structural validation errors into corrective natural-language instructions.
//!
//! Every function here is a pure function of its arguments — no hidden state, no
//! global counters. The same `(ValidationError, attempt_number, max_attempts)` always
//! produces the same retry message, so tests can pin exact substrings.

use crate::issue::{IssueCode, classify};
use crate::schema::{Schema, describe};
use crate::validator::{ValidationError, ValidationErrorKind};

/// Per-issue human suggestions, plus three general reminders when any issue exists.
pub fn generate_suggestions(
    issues: &[crate::issue::Issue],
    schema: &Schema,
) -> Vec<String> {
    let mut suggestions: Vec<String> = issues
        .iter()
        .map(|issue| suggestion_for(issue, schema))
        .collect();

    if !issues.is_empty() {
        suggestions.push("Ensure all required fields are present.".to_string());
        suggestions.push("Check field names for typos.".to_string());
        suggestions.push("Verify the JSON structure matches the expected schema.".to_string());
    }
    suggestions
}

fn suggestion_for(issue: &crate::issue::Issue, schema: &Schema) -> String {
    let classified = classify(issue, schema);
    let path = issue.path_string();

    let mut message = match issue.code {
        IssueCode::RequiredMissing => format!("Field `{path}`: this field is required but missing."),
        IssueCode::InvalidType => format!(
            "Field `{path}`: expected {}, got {}.",
            issue.expected.as_deref().unwrap_or("a different type"),
            issue.received.as_deref().unwrap_or("an unexpected type"),
        ),
        IssueCode::TooSmall => format!(
            "Field `{path}`: value is too small (minimum {}).",
            classified
                .size_bounds
                .and_then(|(min, _)| min)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "a larger value".to_string())
        ),
        IssueCode::TooBig => format!(
            "Field `{path}`: value is too big (maximum {}).",
            classified
                .size_bounds
                .and_then(|(_, max)| max)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "a smaller value".to_string())
        ),
        IssueCode::InvalidEnum => format!(
            "Field `{path}`: must be one of [{}].",
            classified
                .allowed_options
                .as_ref()
                .map(|o| o.join(", "))
                .unwrap_or_default()
        ),
        IssueCode::InvalidFormat => format!("Field `{path}`: {}", issue.message),
        IssueCode::UnrecognizedKeys => format!(
            "Remove unrecognized key(s): {}.",
            issue.options.as_ref().map(|o| o.join(", ")).unwrap_or_default()
        ),
        IssueCode::InvalidUnion | IssueCode::InvalidValue => {
            format!("Field `{path}`: {}", issue.message)
        }
        IssueCode::Custom => issue.message.clone(),
    };

    if !classified.did_you_mean.is_empty() {
        message.push_str(&format!(" Did you mean: {}?", classified.did_you_mean.join(", ")));
    }
    message
}

/// Concise, directive corrections suitable for a numbered retry checklist.
pub fn generate_field_corrections(issues: &[crate::issue::Issue], schema: &Schema) -> Vec<String> {
    issues
        .iter()
        .map(|issue| {
            let classified = classify(issue, schema);
            let path = issue.path_string();
            match issue.code {
                IssueCode::RequiredMissing => format!("Field `{path}`: Add this required field."),
                IssueCode::InvalidType => format!(
                    "Field `{path}`: Change type to {}.",
                    issue.expected.as_deref().unwrap_or("the expected type")
                ),
                IssueCode::TooSmall => format!(
                    "Field `{path}`: Increase value to at least {}.",
                    classified
                        .size_bounds
                        .and_then(|(min, _)| min)
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "the minimum".to_string())
                ),
                IssueCode::TooBig => format!(
                    "Field `{path}`: Decrease value to at most {}.",
                    classified
                        .size_bounds
                        .and_then(|(_, max)| max)
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "the maximum".to_string())
                ),
                IssueCode::InvalidEnum => format!(
                    "Field `{path}`: Use exactly one of [{}].{}",
                    classified
                        .allowed_options
                        .as_ref()
                        .map(|o| o.join(", "))
                        .unwrap_or_default(),
                    if classified.did_you_mean.is_empty() {
                        String::new()
                    } else {
                        format!(" Did you mean: {}?", classified.did_you_mean.join(", "))
                    }
                ),
                IssueCode::InvalidFormat => format!("Field `{path}`: Fix the format ({}).", issue.message),
                IssueCode::UnrecognizedKeys => format!(
                    "Remove the key(s): {}.",
                    issue.options.as_ref().map(|o| o.join(", ")).unwrap_or_default()
                ),
                IssueCode::InvalidUnion | IssueCode::InvalidValue => {
                    format!("Field `{path}`: {}", issue.message)
                }
                IssueCode::Custom => issue.message.clone(),
            }
        })
        .collect()
}

fn urgency_prefix(attempt: u32) -> &'static str {
    match attempt {
        1 => "",
        2 => "IMPORTANT: ",
        _ => "CRITICAL: ",
    }
}

fn separator(attempt: u32) -> &'static str {
    if attempt >= 2 {
        "\n----------------------------------------\n"
    } else {
        ""
    }
}

/// `format_retry_feedback` — composes the message sent back to the LLM on retry.
pub fn format_retry_feedback(error: &ValidationError, attempt: u32, max_attempts: u32) -> String {
    let mut out = String::new();
    let prefix = urgency_prefix(attempt);

    match &error.kind {
        ValidationErrorKind::JsonParse => {
            out.push_str(separator(attempt));
            if attempt < 3 {
                out.push_str(&format!(
                    "{prefix}Your previous reply must be valid JSON: every opening delimiter \
                     ({{, [, \") needs a matching closing one, and the reply must parse as a \
                     single JSON value. Underlying parse error: {}\n",
                    error.message
                ));
            } else {
                out.push_str(&format!(
                    "{prefix}Your reply MUST start with `{{` and end with `}}`, with absolutely \
                     no text outside the JSON object (no prose, no markdown fences, no \
                     explanations). Underlying parse error: {}\n",
                    error.message
                ));
            }
        }
        ValidationErrorKind::SchemaMismatch => {
            out.push_str(separator(attempt));
            out.push_str(&format!(
                "{prefix}Schema Validation Failed (Attempt {attempt})\n"
            ));
            out.push_str("Issues found:\n");
            for issue in &error.issues {
                out.push_str(&format!("- [{:?}] {}: {}\n", issue.code, issue.path_string(), issue.message));
            }
            out.push_str("\nSpecific corrections:\n");
            for (i, correction) in error.structured_feedback.correction_instructions.iter().enumerate() {
                out.push_str(&format!("{}. {correction}\n", i + 1));
            }
            out.push_str("\nGeneral suggestions:\n");
            for suggestion in &error.suggestions {
                out.push_str(&format!("- {suggestion}\n"));
            }
            if attempt >= 2 {
                out.push_str("\nStructured guidance:\n");
                out.push_str(&format!("Summary: {}\n", error.structured_feedback.summary));
                out.push_str("Specific issues:\n");
                for issue in &error.structured_feedback.specific_issues {
                    out.push_str(&format!("- {issue}\n"));
                }
                out.push_str("Required corrections, in order:\n");
                for (i, correction) in error.structured_feedback.correction_instructions.iter().enumerate() {
                    out.push_str(&format!("{}. {correction}\n", i + 1));
                }
            }
        }
    }

    if attempt >= max_attempts {
        out.push_str("\nThis is the final attempt. Respond with a single valid JSON value that \
                       satisfies every requirement above, or the call will fail.\n");
    }

    out
}

/// Build the `structured_feedback` block attached to a [`ValidationError`].
pub fn build_structured_feedback(
    issues: &[crate::issue::Issue],
    schema: &Schema,
) -> crate::validator::StructuredFeedback {
    let specific_issues: Vec<String> = issues
        .iter()
        .map(|issue| format!("{}: {}", issue.path_string(), issue.message))
        .collect();
    let correction_instructions = generate_field_corrections(issues, schema);
    let summary = if issues.is_empty() {
        "No issues.".to_string()
    } else {
        format!(
            "{} issue(s) found against schema `{}`.",
            issues.len(),
            describe(schema)
        )
    };
    crate::validator::StructuredFeedback {
        summary,
        specific_issues,
        correction_instructions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EnumSchema};
    use crate::validator::validate;

    fn rating_schema() -> Schema {
        let mut fields = indexmap::IndexMap::new();
        fields.insert(
            "rating".to_string(),
            crate::schema::FieldSchema::new(Schema::Enum(EnumSchema {
                options: vec!["good".into(), "bad".into(), "mixed".into()],
            })),
        );
        Schema::Object(crate::schema::ObjectSchema {
            fields,
            strict: true,
        })
    }

    #[test]
    fn retry_feedback_escalates_with_attempt_number() {
        let schema = rating_schema();
        let err = validate(&schema, r#"{"rating":"Good"}"#).unwrap_err();

        let attempt1 = format_retry_feedback(&err, 1, 3);
        let attempt2 = format_retry_feedback(&err, 2, 3);
        let attempt3 = format_retry_feedback(&err, 3, 3);

        assert!(!attempt1.contains("IMPORTANT"));
        assert!(!attempt1.contains("CRITICAL"));
        assert!(attempt2.contains("IMPORTANT"));
        assert!(attempt3.contains("CRITICAL"));
        assert!(attempt3.contains("final attempt"));
        assert!(attempt3.len() > attempt2.len());
        assert!(attempt2.len() > attempt1.len());
    }

    #[test]
    fn enum_mismatch_feedback_contains_did_you_mean() {
        let schema = rating_schema();
        let err = validate(&schema, r#"{"rating":"Good"}"#).unwrap_err();
        let feedback = format_retry_feedback(&err, 2, 3);
        assert!(feedback.contains("Did you mean: good"));
    }

    #[test]
    fn json_parse_feedback_is_specialized() {
        let schema = rating_schema();
        let err = validate(&schema, "not json at all").unwrap_err();
        let feedback = format_retry_feedback(&err, 2, 3);
        assert!(feedback.contains("must be valid JSON"));
        assert!(!feedback.contains("CRITICAL"));

        let feedback3 = format_retry_feedback(&err, 3, 3);
        assert!(feedback3.contains("MUST start with"));
        assert!(feedback3.contains("CRITICAL"));
    }
}
