//! Action registry.
//!
//! Every facade declares a closed set of actions up front as a
//! `static ActionSet`. Each action names the parameters it requires and
//! the ones it merely accepts. The set is used twice:
//!
//! 1. to render the JSON Schema a host sends to the LLM
//! 2. to validate a call before anything reaches a driver

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::error::ActionFailure;

/// JSON type of a parameter, used for schema rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    StringArray,
    /// `[x, y]` screen coordinate of non-negative integers.
    Coordinate,
}

impl ParamKind {
    fn schema(&self) -> Value {
        match self {
            ParamKind::String => json!({ "type": "string" }),
            ParamKind::Integer => json!({ "type": "integer" }),
            ParamKind::Number => json!({ "type": "number" }),
            ParamKind::Boolean => json!({ "type": "boolean" }),
            ParamKind::Object => json!({ "type": "object" }),
            ParamKind::StringArray => json!({ "type": "array", "items": { "type": "string" } }),
            ParamKind::Coordinate => json!({
                "type": "array",
                "items": { "type": "integer", "minimum": 0 },
                "minItems": 2,
                "maxItems": 2
            }),
        }
    }
}

/// A named parameter shared by one or more actions of a tool.
#[derive(Debug)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
}

/// One action of a tool.
#[derive(Debug)]
pub struct ActionSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

impl ActionSpec {
    /// Whether `name` is a parameter this action understands.
    pub fn accepts(&self, name: &str) -> bool {
        self.required.contains(&name) || self.optional.contains(&name)
    }
}

/// The closed action vocabulary of one tool.
#[derive(Debug)]
pub struct ActionSet {
    pub tool: &'static str,
    pub params: &'static [ParamSpec],
    pub actions: &'static [ActionSpec],
}

impl ActionSet {
    pub fn get(&self, action: &str) -> Option<&ActionSpec> {
        self.actions.iter().find(|a| a.name == action)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.actions.iter().map(|a| a.name).collect()
    }

    /// Check that `action` exists and every required parameter is present.
    ///
    /// A parameter set to JSON `null` counts as missing. Parameters are
    /// checked in declaration order and the first missing one is reported.
    pub fn validate(&self, action: &str, params: &Value) -> Result<&ActionSpec, ActionFailure> {
        let spec = self
            .get(action)
            .ok_or_else(|| ActionFailure::unsupported_action(self.tool, action, &self.names()))?;

        let empty = Map::new();
        let map = match params {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(ActionFailure::invalid_parameter(format!(
                    "Parameters for '{}' must be a JSON object, got {}",
                    action,
                    json_type_name(other)
                )))
            }
        };

        if let Some(missing) = spec
            .required
            .iter()
            .find(|name| map.get(**name).map_or(true, Value::is_null))
        {
            return Err(ActionFailure::missing_parameter(action, missing));
        }

        Ok(spec)
    }

    /// JSON Schema for the tool: an `action` enum plus every parameter.
    pub fn parameters_schema(&self) -> Value {
        let action_help = self
            .actions
            .iter()
            .map(|a| {
                if a.required.is_empty() {
                    format!("{}: {}", a.name, a.description)
                } else {
                    format!("{}: {} (requires {})", a.name, a.description, a.required.join(", "))
                }
            })
            .collect::<Vec<_>>()
            .join("; ");

        let mut properties = Map::new();
        properties.insert(
            "action".to_string(),
            json!({
                "type": "string",
                "enum": self.names(),
                "description": action_help,
            }),
        );
        for param in self.params {
            let mut schema = param.kind.schema();
            if let Value::Object(obj) = &mut schema {
                obj.insert("description".to_string(), Value::String(param.description.to_string()));
            }
            properties.insert(param.name.to_string(), schema);
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": ["action"]
        })
    }
}

/// Decode validated parameters into an action's typed parameter struct.
///
/// Unknown keys are ignored; wrong types become `invalid_parameter`.
pub fn decode<T: DeserializeOwned>(action: &str, params: Value) -> Result<T, ActionFailure> {
    let params = if params.is_null() { Value::Object(Map::new()) } else { params };
    serde_json::from_value(params).map_err(|e| {
        ActionFailure::invalid_parameter(format!("Invalid parameters for '{}': {}", action, e))
    })
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde::Deserialize;

    static TEST_ACTIONS: ActionSet = ActionSet {
        tool: "demo",
        params: &[
            ParamSpec {
                name: "path",
                kind: ParamKind::String,
                description: "Relative path",
            },
            ParamSpec {
                name: "content",
                kind: ParamKind::String,
                description: "File content",
            },
        ],
        actions: &[
            ActionSpec {
                name: "read",
                description: "Read a file",
                required: &["path"],
                optional: &[],
            },
            ActionSpec {
                name: "write",
                description: "Write a file",
                required: &["path", "content"],
                optional: &[],
            },
            ActionSpec {
                name: "list",
                description: "List a directory",
                required: &[],
                optional: &["path"],
            },
        ],
    };

    #[test]
    fn test_unknown_action() {
        let err = TEST_ACTIONS.validate("explode", &json!({})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedAction);
        assert!(err.message.contains("read, write, list"));
    }

    #[test]
    fn test_missing_parameter_reports_first_in_order() {
        let err = TEST_ACTIONS.validate("write", &json!({})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingParameter);
        assert!(err.message.contains("'path'"));

        let err = TEST_ACTIONS.validate("write", &json!({ "path": "a" })).unwrap_err();
        assert!(err.message.contains("'content'"));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let err = TEST_ACTIONS.validate("read", &json!({ "path": null })).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingParameter);
    }

    #[test]
    fn test_null_params_ok_without_required() {
        let spec = TEST_ACTIONS.validate("list", &Value::Null).unwrap();
        assert_eq!(spec.name, "list");
        assert!(spec.accepts("path"));
        assert!(!spec.accepts("content"));
    }

    #[test]
    fn test_non_object_params_rejected() {
        let err = TEST_ACTIONS.validate("list", &json!([1, 2])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameter);
        assert!(err.message.contains("array"));
    }

    #[test]
    fn test_schema_lists_actions_and_params() {
        let schema = TEST_ACTIONS.parameters_schema();
        assert_eq!(schema["required"][0], "action");
        assert_eq!(schema["properties"]["action"]["enum"], json!(["read", "write", "list"]));
        assert_eq!(schema["properties"]["path"]["type"], "string");
        assert!(schema["properties"]["action"]["description"]
            .as_str()
            .unwrap()
            .contains("requires path, content"));
    }

    #[derive(Debug, Deserialize)]
    struct ReadParams {
        path: String,
        #[serde(default)]
        limit: Option<u32>,
    }

    #[test]
    fn test_decode_typed_params() {
        let params: ReadParams = decode("read", json!({ "path": "a.txt", "extra": true })).unwrap();
        assert_eq!(params.path, "a.txt");
        assert!(params.limit.is_none());
    }

    #[test]
    fn test_decode_wrong_type() {
        let err = decode::<ReadParams>("read", json!({ "path": 42 })).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameter);
        assert!(err.message.contains("read"));
    }
}
