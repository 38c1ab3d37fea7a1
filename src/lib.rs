//! toolclaw - sandboxed tool facades for LLM agents.
//!
//! Each facade (`disk`, `database`, `browser`, `computer`, `eval`, `doc`,
//! `workflow`) accepts an action name plus JSON parameters and returns an
//! `ActionResult`. Hosts collect them in a `ToolRouter`.

pub mod cli;
pub mod config;
pub mod error;
pub mod tools;
pub mod types;
pub mod workflow;

pub use config::AppConfig;
pub use error::{ActionFailure, ErrorKind, SecurityViolation, ToolError};
pub use tools::{create_default_router, Tool, ToolRouter};
pub use types::{ActionResult, ToolDefinition};
pub use workflow::{Workflow, WorkflowManager, WorkflowStatus};
