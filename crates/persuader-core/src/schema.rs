//! Schema as data, not code.
//!
//! A [`Schema`] is a declarative tree, not a chainable validator builder — this is
//! what makes introspection, example generation, and serialization possible without
//! runtime reflection. Every schema kind is finitely traversable and side-effect free.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A declarative description of the shape a value must have.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schema {
    Object(ObjectSchema),
    Array(ArraySchema),
    String(StringSchema),
    Number(NumberSchema),
    Boolean,
    Enum(EnumSchema),
    Union(UnionSchema),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub fields: IndexMap<String, FieldSchema>,
    /// Closed objects reject unknown keys (`unrecognized_keys`); open objects drop them silently.
    #[serde(default = "default_strict")]
    pub strict: bool,
}

fn default_strict() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub schema: Box<Schema>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

impl FieldSchema {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema: Box::new(schema),
            description: None,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArraySchema {
    pub element: Box<Schema>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StringFormat {
    Email,
    Url,
    Uuid,
}

impl StringFormat {
    pub fn name(&self) -> &'static str {
        match self {
            StringFormat::Email => "email",
            StringFormat::Url => "url",
            StringFormat::Uuid => "uuid",
        }
    }

    pub(crate) fn matches(&self, s: &str) -> bool {
        match self {
            StringFormat::Email => {
                let at = s.find('@');
                matches!(at, Some(pos) if pos > 0 && pos < s.len() - 1 && s[pos + 1..].contains('.'))
            }
            StringFormat::Url => s.starts_with("http://") || s.starts_with("https://"),
            StringFormat::Uuid => uuid::Uuid::parse_str(s).is_ok(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StringSchema {
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub format: Option<StringFormat>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NumberSchema {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub integer: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumSchema {
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnionSchema {
    pub variants: Vec<Schema>,
    /// Field name used to pick a variant. `None` means "try every variant".
    #[serde(default)]
    pub discriminator: Option<String>,
}

/// One segment of a field path: a map key or an array index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{k}"),
            PathSegment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

pub fn path_to_string(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return "<root>".to_string();
    }
    let mut out = String::new();
    for (i, seg) in path.iter().enumerate() {
        match seg {
            PathSegment::Key(k) => {
                if i > 0 {
                    out.push('.');
                }
                out.push_str(k);
            }
            PathSegment::Index(idx) => out.push_str(&format!("[{idx}]")),
        }
    }
    out
}

/// `describe` — a one-line human-readable description of a schema's shape.
pub fn describe(schema: &Schema) -> String {
    match schema {
        Schema::Object(obj) => {
            let names: Vec<&str> = obj.fields.keys().map(|s| s.as_str()).collect();
            format!("object with fields {{{}}}", names.join(", "))
        }
        Schema::Array(arr) => format!("array of {}", describe(&arr.element)),
        Schema::String(s) => match s.format {
            Some(fmt) => format!("string ({})", fmt.name()),
            None => "string".to_string(),
        },
        Schema::Number(n) => {
            if n.integer {
                "integer".to_string()
            } else {
                "number".to_string()
            }
        }
        Schema::Boolean => "boolean".to_string(),
        Schema::Enum(e) => format!("enum of {{{}}}", e.options.join(", ")),
        Schema::Union(u) => format!(
            "tagged union of {} variant(s){}",
            u.variants.len(),
            u.discriminator
                .as_ref()
                .map(|d| format!(" (discriminator `{d}`)"))
                .unwrap_or_default()
        ),
    }
}

/// `example` — a minimal value the schema accepts by construction.
///
/// Unknown/unsupported nesting degrades to `null` rather than failing: introspection
/// never fails.
pub fn example(schema: &Schema) -> Value {
    match schema {
        Schema::Object(obj) => {
            let mut map = serde_json::Map::new();
            for (name, field) in &obj.fields {
                if field.optional {
                    continue;
                }
                map.insert(name.clone(), example(&field.schema));
            }
            Value::Object(map)
        }
        Schema::Array(arr) => {
            let count = match arr.max_length {
                Some(max) => arr.min_length.unwrap_or(0).min(max),
                None => arr.min_length.unwrap_or(0),
            };
            let elem = example(&arr.element);
            Value::Array(std::iter::repeat(elem).take(count).collect())
        }
        Schema::String(s) => {
            let base = match s.format {
                Some(StringFormat::Email) => "user@example.com".to_string(),
                Some(StringFormat::Url) => "https://example.com".to_string(),
                Some(StringFormat::Uuid) => "00000000-0000-4000-8000-000000000000".to_string(),
                None => "example".to_string(),
            };
            let min = s.min_length.unwrap_or(0);
            if base.len() < min {
                Value::String(base.repeat(min / base.len().max(1) + 1)[..min].to_string())
            } else {
                Value::String(base)
            }
        }
        Schema::Number(n) => {
            let v = n.min.unwrap_or(0.0).max(n.min.unwrap_or(0.0));
            if n.integer {
                json!(v as i64)
            } else {
                json!(v)
            }
        }
        Schema::Boolean => Value::Bool(true),
        Schema::Enum(e) => e
            .options
            .first()
            .map(|s| Value::String(s.clone()))
            .unwrap_or(Value::Null),
        Schema::Union(u) => u
            .variants
            .first()
            .map(example)
            .unwrap_or(Value::Object(serde_json::Map::new())),
    }
}

/// Severity bucket assigned to a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

/// Resolve the sub-schema addressed by a field path; `None` if the path can't be
/// followed (e.g. it points through a type mismatch).
pub fn schema_at<'a>(schema: &'a Schema, path: &[PathSegment]) -> Option<&'a Schema> {
    let mut current = schema;
    for segment in path {
        current = match (current, segment) {
            (Schema::Object(obj), PathSegment::Key(key)) => &obj.fields.get(key)?.schema,
            (Schema::Array(arr), PathSegment::Index(_)) => &arr.element,
            (Schema::Union(u), PathSegment::Key(key)) => {
                u.variants.iter().find_map(|v| match v {
                    Schema::Object(obj) => obj.fields.get(key).map(|f| f.schema.as_ref()),
                    _ => None,
                })?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Normalized edit distance similarity in `[0.0, 1.0]`; `1.0` is an exact match.
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Nearest enum-option matches for a mismatched value, similarity >= 0.3, top 3.
pub fn nearest_matches(value: &str, options: &[String]) -> Vec<String> {
    let mut scored: Vec<(f64, &String)> = options
        .iter()
        .map(|opt| (similarity(value, opt), opt))
        .filter(|(score, _)| *score >= 0.3)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(3).map(|(_, opt)| opt.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::validate;

    fn age_schema() -> Schema {
        let mut fields = IndexMap::new();
        fields.insert(
            "name".to_string(),
            FieldSchema::new(Schema::String(StringSchema::default())),
        );
        fields.insert(
            "age".to_string(),
            FieldSchema::new(Schema::Number(NumberSchema {
                min: Some(0.0),
                max: None,
                integer: true,
            })),
        );
        Schema::Object(ObjectSchema {
            fields,
            strict: true,
        })
    }

    #[test]
    fn describe_object() {
        assert_eq!(describe(&age_schema()), "object with fields {name, age}");
    }

    #[test]
    fn example_satisfies_every_schema_kind() {
        let schemas = vec![
            age_schema(),
            Schema::Array(ArraySchema {
                element: Box::new(Schema::String(StringSchema::default())),
                min_length: Some(1),
                max_length: None,
            }),
            Schema::Array(ArraySchema {
                element: Box::new(Schema::String(StringSchema::default())),
                min_length: Some(0),
                max_length: Some(0),
            }),
            Schema::Enum(EnumSchema {
                options: vec!["good".into(), "bad".into(), "mixed".into()],
            }),
            Schema::Boolean,
            Schema::String(StringSchema {
                format: Some(StringFormat::Email),
                ..Default::default()
            }),
        ];
        for schema in schemas {
            let value = example(&schema);
            let serialized = serde_json::to_string(&value).unwrap();
            assert!(
                validate(&schema, &serialized).is_ok(),
                "example for {:?} failed round-trip validation",
                schema
            );
        }
    }

    #[test]
    fn nearest_matches_finds_case_typo() {
        let options = vec!["good".to_string(), "bad".to_string(), "mixed".to_string()];
        let matches = nearest_matches("Good", &options);
        assert_eq!(matches.first().map(String::as_str), Some("good"));
    }

    #[test]
    fn similarity_is_one_for_exact_match() {
        assert_eq!(similarity("good", "good"), 1.0);
    }
}
