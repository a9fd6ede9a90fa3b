//! Schema-as-source-of-truth for tool arguments.
//!
//! A single [`Schema`] value drives three artefacts: runtime argument
//! validation, the JSON Schema fragment returned by `tools/list`, and —
//! indirectly, via each tool handler's own parsing — the typed argument
//! shape. Per the open design question on schema listing fidelity, this
//! crate's `Schema` goes beyond strings/numbers/booleans/enums/optionals
//! to also cover arrays and nested objects, since several of this
//! workspace's tools (`search_files`, `workspace_tree`) need them; it does
//! not attempt numeric min/max constraints, which no current tool needs —
//! adding them later is a matter of extending [`FieldType`], not a
//! redesign.

use serde_json::{json, Value};

use crate::error::ServerError;

/// The type of a single schema field.
#[derive(Debug, Clone)]
pub enum FieldType {
    /// A UTF-8 string, optionally restricted to a closed set of values.
    String {
        /// If non-empty, the value must be one of these.
        enum_values: Vec<String>,
    },
    /// A number (validated as any JSON number; handlers narrow further).
    Number,
    /// An integer.
    Integer,
    /// A boolean.
    Boolean,
    /// An array of a uniform element type.
    Array(Box<FieldType>),
    /// A nested object with its own fields.
    Object(Vec<Field>),
}

/// A single named field in a [`Schema`].
#[derive(Debug, Clone)]
pub struct Field {
    /// Field name as it appears in the arguments object.
    pub name: &'static str,
    /// The field's type.
    pub ty: FieldType,
    /// Human-readable description surfaced in `tools/list`.
    pub description: Option<&'static str>,
    /// Whether the field must be present.
    pub required: bool,
}

impl Field {
    /// Builds a required string field.
    #[must_use]
    pub const fn string(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            ty: FieldType::String {
                enum_values: Vec::new(),
            },
            description: Some(description),
            required: true,
        }
    }

    /// Builds an optional string field.
    #[must_use]
    pub const fn optional_string(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            ty: FieldType::String {
                enum_values: Vec::new(),
            },
            description: Some(description),
            required: false,
        }
    }

    /// Builds a required enumerated string field.
    #[must_use]
    pub fn enum_field(name: &'static str, description: &'static str, values: &[&str]) -> Self {
        Self {
            name,
            ty: FieldType::String {
                enum_values: values.iter().map(|v| (*v).to_string()).collect(),
            },
            description: Some(description),
            required: true,
        }
    }

    /// Builds an optional integer field.
    #[must_use]
    pub const fn optional_integer(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            ty: FieldType::Integer,
            description: Some(description),
            required: false,
        }
    }

    /// Builds an optional boolean field.
    #[must_use]
    pub const fn optional_boolean(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            ty: FieldType::Boolean,
            description: Some(description),
            required: false,
        }
    }

    /// Builds an optional array-of-strings field.
    #[must_use]
    pub fn optional_string_array(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            ty: FieldType::Array(Box::new(FieldType::String {
                enum_values: Vec::new(),
            })),
            description: Some(description),
            required: false,
        }
    }
}

/// A tool's full argument schema: an ordered list of top-level fields.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// Top-level fields, in declaration order.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Builds a schema from an explicit field list.
    #[must_use]
    pub const fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Validates `args` against this schema.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidArguments`] describing the first
    /// mismatch encountered.
    pub fn validate(&self, tool: &str, args: &Value) -> Result<(), ServerError> {
        let obj = args.as_object().ok_or_else(|| ServerError::InvalidArguments {
            tool: tool.to_string(),
            message: "arguments must be a JSON object".to_string(),
        })?;

        for field in &self.fields {
            let value = obj.get(field.name);
            match value {
                None if field.required => {
                    return Err(ServerError::InvalidArguments {
                        tool: tool.to_string(),
                        message: format!("missing required field '{}'", field.name),
                    });
                }
                None => continue,
                Some(v) => validate_field_type(tool, field.name, &field.ty, v)?,
            }
        }

        Ok(())
    }

    /// Renders this schema as a JSON Schema fragment for `tools/list`.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for field in &self.fields {
            properties.insert(field.name.to_string(), field_type_to_json(&field.ty, field.description));
            if field.required {
                required.push(field.name.to_string());
            }
        }

        json!({
            "type": "object",
            "properties": Value::Object(properties),
            "required": required,
        })
    }
}

fn validate_field_type(tool: &str, field_name: &str, ty: &FieldType, value: &Value) -> Result<(), ServerError> {
    let mismatch = |expected: &str| ServerError::InvalidArguments {
        tool: tool.to_string(),
        message: format!("field '{field_name}' must be {expected}"),
    };

    match ty {
        FieldType::String { enum_values } => {
            let s = value.as_str().ok_or_else(|| mismatch("a string"))?;
            if !enum_values.is_empty() && !enum_values.iter().any(|v| v == s) {
                return Err(ServerError::InvalidArguments {
                    tool: tool.to_string(),
                    message: format!("field '{field_name}' must be one of {enum_values:?}, got '{s}'"),
                });
            }
        }
        FieldType::Number => {
            value.as_f64().ok_or_else(|| mismatch("a number"))?;
        }
        FieldType::Integer => {
            value.as_i64().ok_or_else(|| mismatch("an integer"))?;
        }
        FieldType::Boolean => {
            value.as_bool().ok_or_else(|| mismatch("a boolean"))?;
        }
        FieldType::Array(element_ty) => {
            let arr = value.as_array().ok_or_else(|| mismatch("an array"))?;
            for item in arr {
                validate_field_type(tool, field_name, element_ty, item)?;
            }
        }
        FieldType::Object(nested_fields) => {
            let nested = Schema {
                fields: nested_fields.clone(),
            };
            nested.validate(tool, value)?;
        }
    }

    Ok(())
}

fn field_type_to_json(ty: &FieldType, description: Option<&str>) -> Value {
    let mut obj = serde_json::Map::new();

    match ty {
        FieldType::String { enum_values } => {
            obj.insert("type".to_string(), json!("string"));
            if !enum_values.is_empty() {
                obj.insert("enum".to_string(), json!(enum_values));
            }
        }
        FieldType::Number => {
            obj.insert("type".to_string(), json!("number"));
        }
        FieldType::Integer => {
            obj.insert("type".to_string(), json!("integer"));
        }
        FieldType::Boolean => {
            obj.insert("type".to_string(), json!("boolean"));
        }
        FieldType::Array(element_ty) => {
            obj.insert("type".to_string(), json!("array"));
            obj.insert("items".to_string(), field_type_to_json(element_ty, None));
        }
        FieldType::Object(nested_fields) => {
            let nested = Schema {
                fields: nested_fields.clone(),
            };
            return nested.to_json_schema();
        }
    }

    if let Some(desc) = description {
        obj.insert("description".to_string(), json!(desc));
    }

    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_required_field_missing() {
        let schema = Schema::new(vec![Field::string("path", "target path")]);
        let err = schema.validate("read_file", &json!({})).unwrap_err();
        assert!(matches!(err, ServerError::InvalidArguments { .. }));
    }

    #[test]
    fn validates_enum_field() {
        let schema = Schema::new(vec![Field::enum_field(
            "encoding",
            "encoding",
            &["utf-8", "utf-16le", "binary"],
        )]);
        assert!(schema.validate("read_file", &json!({"encoding": "utf-8"})).is_ok());
        assert!(schema
            .validate("read_file", &json!({"encoding": "latin1"}))
            .is_err());
    }

    #[test]
    fn to_json_schema_has_required_and_properties() {
        let schema = Schema::new(vec![
            Field::string("path", "target path"),
            Field::optional_integer("offset", "byte offset"),
        ]);
        let json_schema = schema.to_json_schema();
        assert_eq!(json_schema["type"], "object");
        assert_eq!(json_schema["required"], json!(["path"]));
        assert!(json_schema["properties"]["offset"]["type"] == "integer");
    }

    #[test]
    fn array_field_validates_elements() {
        let schema = Schema::new(vec![Field::optional_string_array("patterns", "glob patterns")]);
        assert!(schema.validate("t", &json!({"patterns": ["a", "b"]})).is_ok());
        assert!(schema.validate("t", &json!({"patterns": [1, 2]})).is_err());
    }
}
