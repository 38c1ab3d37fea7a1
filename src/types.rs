//! Core data types exchanged between hosts and facades.
//!
//! This module defines the tool definition sent to an LLM host and the
//! universal `ActionResult` envelope every action returns.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ActionFailure, ErrorKind};

// --- Tool Definition ---

/// Describes a tool's interface to the LLM via JSON Schema.
///
/// This is what a host registers with its chat framework so the model
/// knows which tools exist, which actions they offer and what parameters
/// each action accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool's name (e.g. "disk")
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema describing the `action` enum and all parameters
    pub input_schema: Value,
}

// --- Action Result ---

/// The return envelope of every action.
///
/// Serialized as `{"status": "success", "result": <data>}` or
/// `{"status": "failure", "result": {"kind": ..., "message": ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum ActionResult {
    Success(Value),
    Failure(ActionFailure),
}

impl ActionResult {
    pub fn success(data: Value) -> Self {
        ActionResult::Success(data)
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        ActionResult::Failure(ActionFailure::new(kind, message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ActionResult::Success(_))
    }

    /// The success payload, if any.
    pub fn data(&self) -> Option<&Value> {
        match self {
            ActionResult::Success(data) => Some(data),
            ActionResult::Failure(_) => None,
        }
    }

    /// The failure payload, if any.
    pub fn error(&self) -> Option<&ActionFailure> {
        match self {
            ActionResult::Success(_) => None,
            ActionResult::Failure(failure) => Some(failure),
        }
    }

    /// Shortcut for `error().map(|f| f.kind)`.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.error().map(|f| f.kind)
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| {
            json!({
                "status": "failure",
                "result": { "kind": "driver_error", "message": e.to_string() },
            })
            .to_string()
        })
    }
}

impl From<ActionFailure> for ActionResult {
    fn from(failure: ActionFailure) -> Self {
        ActionResult::Failure(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope() {
        let result = ActionResult::success(json!({ "path": "a.txt" }));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["result"]["path"], "a.txt");
        assert!(result.is_success());
        assert!(result.kind().is_none());
    }

    #[test]
    fn test_failure_envelope() {
        let result: ActionResult = ActionFailure::not_found("Workflow abc not found")
            .with_suggestion("start a new workflow")
            .into();
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "failure");
        assert_eq!(value["result"]["kind"], "not_found");
        assert_eq!(value["result"]["suggestion"], "start a new workflow");
        assert_eq!(result.kind(), Some(ErrorKind::NotFound));
    }

    #[test]
    fn test_failure_without_suggestion_omits_field() {
        let result = ActionResult::failure(ErrorKind::Timeout, "too slow");
        let value = serde_json::to_value(&result).unwrap();
        assert!(value["result"].get("suggestion").is_none());
    }
}
