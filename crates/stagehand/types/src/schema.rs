//! Payload schema descriptors
//!
//! Stage inputs and partition outputs are opaque JSON payloads. A job kind
//! describes the fields it expects with a [`SchemaDescriptor`]; an empty
//! descriptor accepts any payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON type expected for a field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Bool,
    Array,
    Object,
    Any,
}

impl FieldKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
            FieldKind::Any => true,
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Bool => "bool",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
            FieldKind::Any => "any",
        };
        write!(f, "{}", name)
    }
}

/// A single top-level field of a payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// Describes the top-level shape of a JSON object payload
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl SchemaDescriptor {
    /// A descriptor that accepts any payload
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn is_open(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check a payload, returning one message per problem found.
    pub fn check(&self, payload: &Value) -> Vec<String> {
        if self.is_open() {
            return Vec::new();
        }

        let Some(object) = payload.as_object() else {
            return vec!["payload must be a JSON object".to_string()];
        };

        let mut problems = Vec::new();
        for field in &self.fields {
            match object.get(&field.name) {
                None if field.required => {
                    problems.push(format!("missing required field '{}'", field.name));
                }
                None => {}
                Some(value) if !field.kind.matches(value) => {
                    problems.push(format!(
                        "field '{}' must be of type {}",
                        field.name, field.kind
                    ));
                }
                Some(_) => {}
            }
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items_schema() -> SchemaDescriptor {
        SchemaDescriptor::any()
            .with_field(FieldSpec::required("items", FieldKind::Array))
            .with_field(FieldSpec::optional("chunk_size_bytes", FieldKind::Number))
    }

    #[test]
    fn open_schema_accepts_anything() {
        assert!(SchemaDescriptor::any().check(&json!(42)).is_empty());
        assert!(SchemaDescriptor::any().check(&json!({"a": 1})).is_empty());
    }

    #[test]
    fn reports_every_problem() {
        let schema = items_schema()
            .with_field(FieldSpec::required("target", FieldKind::String));
        let problems = schema.check(&json!({"chunk_size_bytes": "big"}));
        assert_eq!(problems.len(), 3);
    }

    #[test]
    fn optional_field_may_be_absent() {
        assert!(items_schema().check(&json!({"items": []})).is_empty());
    }

    #[test]
    fn non_object_payload_rejected() {
        let problems = items_schema().check(&json!([1, 2]));
        assert_eq!(problems, vec!["payload must be a JSON object".to_string()]);
    }
}
