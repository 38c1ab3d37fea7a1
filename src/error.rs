//! Error types shared by all facades.
//!
//! Two channels leave a facade:
//! - **ActionFailure**: an ordinary failure (bad action, missing parameter,
//!   unknown workflow, driver error...). Travels as a value inside
//!   `ActionResult`, never as an `Err`.
//! - **SecurityViolation**: a sandbox escape attempt. Returned on the `Err`
//!   side of `Tool::execute` so that a host cannot swallow it together with
//!   everyday failures.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Category of a failed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The action name is not part of the tool's action set.
    UnsupportedAction,
    /// A required parameter was absent or null.
    MissingParameter,
    /// A parameter was present but had the wrong type or value.
    InvalidParameter,
    /// A referenced entity (e.g. a workflow) does not exist.
    NotFound,
    /// The entity exists but does not allow the operation in its current state.
    InvalidState,
    /// The driver call failed.
    DriverError,
    /// The driver call exceeded the dispatch timeout.
    Timeout,
    /// Sandbox escape. Only produced by hosts rendering a propagated
    /// `SecurityViolation`; facades never return it inside a result.
    SecurityViolation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedAction => "unsupported_action",
            Self::MissingParameter => "missing_parameter",
            Self::InvalidParameter => "invalid_parameter",
            Self::NotFound => "not_found",
            Self::InvalidState => "invalid_state",
            Self::DriverError => "driver_error",
            Self::Timeout => "timeout",
            Self::SecurityViolation => "security_violation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure payload carried by `ActionResult::Failure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct ActionFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// Usability hint for the caller (e.g. "provide workflow_id").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ActionFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn unsupported_action(tool: &str, action: &str, valid: &[&str]) -> Self {
        Self::new(
            ErrorKind::UnsupportedAction,
            format!(
                "Unsupported action '{}' for tool '{}'. Valid actions: {}",
                action,
                tool,
                valid.join(", ")
            ),
        )
        .with_suggestion(format!("use one of: {}", valid.join(", ")))
    }

    pub fn missing_parameter(action: &str, name: &str) -> Self {
        Self::new(
            ErrorKind::MissingParameter,
            format!("Missing required parameter '{}' for action '{}'", name, action),
        )
        .with_suggestion(format!("provide {}", name))
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameter, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }
}

/// A path resolved outside the sandbox root.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Path '{path}' escapes sandbox root {}", .root.display())]
pub struct SecurityViolation {
    /// The path as supplied by the caller.
    pub path: String,
    pub root: PathBuf,
}

/// Error returned by a facade's `perform` step.
///
/// `Rejected` carries a structured failure decided by the facade itself
/// (bad parameter, unknown workflow...). `Driver` wraps whatever the driver
/// raised; the dispatcher turns it into `driver_error`, unless a
/// `SecurityViolation` sits in its chain.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error(transparent)]
    Rejected(#[from] ActionFailure),

    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

impl From<SecurityViolation> for ToolError {
    fn from(violation: SecurityViolation) -> Self {
        ToolError::Driver(anyhow::Error::new(violation))
    }
}
