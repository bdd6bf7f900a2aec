//! Composes a single prompt string from ordered, optional parts.

use serde_json::Value;

/// Ordered, optional inputs to [`compose`]. Parts are joined with blank-line
/// separators; `None` parts are omitted entirely rather than leaving an empty header.
#[derive(Debug, Clone, Default)]
pub struct PromptParts<'a> {
    /// Durable system instruction. Omitted on non-first prompts in an active session
    /// to save tokens.
    pub context: Option<&'a str>,
    /// Per-call perspective modifier.
    pub lens: Option<&'a str>,
    /// Serialized example of valid output, auto-generated or caller-supplied.
    pub example: Option<&'a Value>,
    /// The input payload to be described in the prompt.
    pub input: &'a Value,
    /// Corrective feedback from a prior failed attempt, if any.
    pub feedback: Option<&'a str>,
}

pub fn compose(parts: &PromptParts<'_>) -> String {
    let mut sections: Vec<String> = Vec::new();

    if let Some(context) = parts.context {
        if !context.is_empty() {
            sections.push(context.to_string());
        }
    }
    if let Some(lens) = parts.lens {
        if !lens.is_empty() {
            sections.push(format!("Perspective: {lens}"));
        }
    }
    if let Some(example) = parts.example {
        sections.push(format!(
            "Example of a valid response:\n{}",
            serde_json::to_string_pretty(example).unwrap_or_default()
        ));
    }
    sections.push(format!(
        "Input:\n{}",
        serde_json::to_string_pretty(parts.input).unwrap_or_default()
    ));

    // Feedback is appended after the input, never replacing prior content.
    if let Some(feedback) = parts.feedback {
        if !feedback.is_empty() {
            sections.push(format!("Correction needed:\n{feedback}"));
        }
    }

    sections.join("\n\n")
}
