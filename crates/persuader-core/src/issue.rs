//! Validation issues and their priority classification.

use serde::{Deserialize, Serialize};

use crate::schema::{PathSegment, Priority, Schema, nearest_matches, path_to_string, schema_at};

/// A single validation failure at a field path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub path: Vec<PathSegment>,
    pub code: IssueCode,
    pub expected: Option<String>,
    pub received: Option<String>,
    pub message: String,
    pub options: Option<Vec<String>>,
}

impl Issue {
    pub fn path_string(&self) -> String {
        path_to_string(&self.path)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    InvalidType,
    TooSmall,
    TooBig,
    InvalidValue,
    InvalidEnum,
    InvalidFormat,
    UnrecognizedKeys,
    InvalidUnion,
    RequiredMissing,
    Custom,
}

/// An issue enriched with priority, the sub-schema it concerns, and suggestions.
#[derive(Debug, Clone)]
pub struct ClassifiedIssue {
    pub issue: Issue,
    pub priority: Priority,
    pub allowed_options: Option<Vec<String>>,
    pub size_bounds: Option<(Option<f64>, Option<f64>)>,
    pub did_you_mean: Vec<String>,
}

/// `classify` — attach priority, locate the sub-schema, extract bounds/options.
pub fn classify(issue: &Issue, schema: &Schema) -> ClassifiedIssue {
    let priority = match issue.code {
        IssueCode::InvalidType => Priority::Critical,
        IssueCode::UnrecognizedKeys | IssueCode::InvalidUnion => Priority::High,
        IssueCode::TooSmall | IssueCode::TooBig => Priority::Medium,
        _ => Priority::Low,
    };

    let sub_schema = schema_at(schema, &issue.path);

    let allowed_options = match (issue.code, sub_schema) {
        (IssueCode::InvalidEnum, Some(Schema::Enum(e))) => Some(e.options.clone()),
        (IssueCode::InvalidUnion | IssueCode::InvalidValue, Some(Schema::Union(u))) => {
            Some(u.variants.iter().map(crate::schema::describe).collect())
        }
        _ => issue.options.clone(),
    };

    let size_bounds = match sub_schema {
        Some(Schema::String(s)) => Some((
            s.min_length.map(|v| v as f64),
            s.max_length.map(|v| v as f64),
        )),
        Some(Schema::Array(a)) => Some((
            a.min_length.map(|v| v as f64),
            a.max_length.map(|v| v as f64),
        )),
        Some(Schema::Number(n)) => Some((n.min, n.max)),
        _ => None,
    };

    let did_you_mean = match (issue.code, &allowed_options, &issue.received) {
        (IssueCode::InvalidEnum, Some(options), Some(received)) => {
            nearest_matches(received, options)
        }
        _ => Vec::new(),
    };

    ClassifiedIssue {
        issue: issue.clone(),
        priority,
        allowed_options,
        size_bounds,
        did_you_mean,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EnumSchema;

    #[test]
    fn invalid_type_is_critical() {
        let issue = Issue {
            path: vec![],
            code: IssueCode::InvalidType,
            expected: Some("string".into()),
            received: Some("number".into()),
            message: "wrong type".into(),
            options: None,
        };
        let classified = classify(&issue, &Schema::Boolean);
        assert_eq!(classified.priority, Priority::Critical);
    }

    #[test]
    fn enum_mismatch_suggests_nearest_match() {
        let schema = Schema::Enum(EnumSchema {
            options: vec!["good".into(), "bad".into(), "mixed".into()],
        });
        let issue = Issue {
            path: vec![],
            code: IssueCode::InvalidEnum,
            expected: None,
            received: Some("Good".into()),
            message: "invalid enum value".into(),
            options: None,
        };
        let classified = classify(&issue, &schema);
        assert_eq!(classified.priority, Priority::Low);
        assert_eq!(classified.did_you_mean, vec!["good".to_string()]);
    }
}
