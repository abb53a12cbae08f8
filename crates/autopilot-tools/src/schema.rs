//! Argument schemas and validation

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

use crate::error::{Result, ToolError};

/// JSON type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Integer,
    Number,
    String,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::String => value.is_string(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::String => "string",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: String,
}

impl ParamSpec {
    pub fn required(
        name: impl Into<String>,
        ty: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
            default: None,
            description: description.into(),
        }
    }

    pub fn optional(
        name: impl Into<String>,
        ty: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, ty, description)
        }
    }

    /// Value used when the argument is omitted
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Ordered parameter declarations of a tool or skill
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolSchema {
    params: Vec<ParamSpec>,
}

impl ToolSchema {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Validate `args`, collecting every violation in one pass.
    ///
    /// `null` is treated as an empty argument object. Defaults are applied to
    /// omitted parameters.
    pub fn validate(&self, args: Value) -> Result<ValidatedArgs> {
        let mut provided = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ToolError::invalid(format!(
                    "arguments must be an object, got {}",
                    json_type_name(&other)
                )))
            }
        };

        let mut details = Vec::new();

        for name in provided.keys() {
            if self.get(name).is_none() {
                details.push(format!("unknown parameter '{}'", name));
            }
        }

        for spec in &self.params {
            if let Some(value) = provided.get(&spec.name) {
                if !spec.ty.accepts(value) {
                    details.push(format!(
                        "parameter '{}' must be {}, got {}",
                        spec.name,
                        spec.ty,
                        json_type_name(value)
                    ));
                }
                continue;
            }
            match &spec.default {
                Some(default) => {
                    provided.insert(spec.name.clone(), default.clone());
                }
                None if spec.required => {
                    details.push(format!("missing required parameter '{}'", spec.name));
                }
                None => {}
            }
        }

        if details.is_empty() {
            Ok(ValidatedArgs(provided))
        } else {
            Err(ToolError::InvalidArguments { details })
        }
    }

    /// JSON Schema object describing the parameters
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for spec in &self.params {
            let mut property = json!({
                "type": spec.ty.as_str(),
                "description": spec.description,
            });
            if let (Some(default), Some(obj)) = (&spec.default, property.as_object_mut()) {
                obj.insert("default".into(), default.clone());
            }
            properties.insert(spec.name.clone(), property);
        }

        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

/// Arguments that passed schema validation, with defaults applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedArgs(Map<String, Value>);

impl ValidatedArgs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        self.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| missing(name, "string"))
    }

    pub fn bool(&self, name: &str) -> Result<bool> {
        self.get(name)
            .and_then(Value::as_bool)
            .ok_or_else(|| missing(name, "boolean"))
    }

    pub fn i64(&self, name: &str) -> Result<i64> {
        self.get(name)
            .and_then(Value::as_i64)
            .ok_or_else(|| missing(name, "integer"))
    }

    /// Integer argument narrowed to `i32`
    pub fn i32(&self, name: &str) -> Result<i32> {
        let value = self.i64(name)?;
        i32::try_from(value).map_err(|_| {
            ToolError::invalid(format!("parameter '{}' out of range: {}", name, value))
        })
    }

    /// Integer argument that must be non-negative
    pub fn u64(&self, name: &str) -> Result<u64> {
        let value = self.i64(name)?;
        u64::try_from(value).map_err(|_| {
            ToolError::invalid(format!("parameter '{}' must be non-negative, got {}", name, value))
        })
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn missing(name: &str, ty: &str) -> ToolError {
    ToolError::invalid(format!("parameter '{}' must be a {}", name, ty))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tap_schema() -> ToolSchema {
        ToolSchema::new()
            .param(ParamSpec::required("x", ParamType::Integer, "X coordinate"))
            .param(ParamSpec::required("y", ParamType::Integer, "Y coordinate"))
            .param(ParamSpec::optional("label", ParamType::String, "Annotation"))
    }

    #[test]
    fn test_valid_arguments() {
        let args = tap_schema().validate(json!({"x": 10, "y": 20})).unwrap();
        assert_eq!(args.i32("x").unwrap(), 10);
        assert_eq!(args.i64("y").unwrap(), 20);
        assert!(args.get("label").is_none());
    }

    #[test]
    fn test_every_violation_is_reported() {
        let err = tap_schema()
            .validate(json!({"x": "ten", "z": 1}))
            .unwrap_err();

        let ToolError::InvalidArguments { details } = err else {
            panic!("expected InvalidArguments");
        };
        assert_eq!(details.len(), 3, "{details:?}");
        assert!(details.iter().any(|d| d.contains("unknown parameter 'z'")));
        assert!(details.iter().any(|d| d.contains("'x' must be integer, got string")));
        assert!(details.iter().any(|d| d.contains("missing required parameter 'y'")));
    }

    #[test]
    fn test_integer_rejects_fractions() {
        let err = tap_schema().validate(json!({"x": 1.5, "y": 2})).unwrap_err();
        assert_eq!(
            err,
            ToolError::invalid("parameter 'x' must be integer, got number")
        );
    }

    #[test]
    fn test_defaults_and_null_arguments() {
        let schema = ToolSchema::new().param(
            ParamSpec::optional("duration_ms", ParamType::Integer, "Gesture length")
                .with_default(300),
        );
        let args = schema.validate(Value::Null).unwrap();
        assert_eq!(args.u64("duration_ms").unwrap(), 300);

        assert!(schema.validate(json!([1, 2])).is_err());
    }

    #[test]
    fn test_narrowing_errors() {
        let schema = ToolSchema::new().param(ParamSpec::required("n", ParamType::Integer, ""));
        let args = schema.validate(json!({"n": -1})).unwrap();
        assert!(args.u64("n").is_err());

        let args = schema.validate(json!({"n": 1_i64 << 40})).unwrap();
        assert!(args.i32("n").is_err());
    }

    #[test]
    fn test_json_schema_output() {
        let schema = tap_schema().to_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["x"]["type"], "integer");
        assert_eq!(schema["required"], json!(["x", "y"]));
        assert_eq!(schema["additionalProperties"], false);
    }

    #[test]
    fn test_schema_deserializes_from_yaml_style_list() {
        let schema: ToolSchema = serde_json::from_value(json!([
            {"name": "keyword", "type": "string", "required": true, "description": "Search text"}
        ]))
        .unwrap();
        assert_eq!(schema.params().len(), 1);
        assert_eq!(schema.get("keyword").unwrap().ty, ParamType::String);
    }
}
