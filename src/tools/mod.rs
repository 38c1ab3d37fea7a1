//! Tool System module.
//!
//! This module defines the `Tool` trait and `ToolRouter` that together
//! form the facade execution framework.
//!
//! Key concepts:
//! - **Tool trait**: every facade implements this trait. It declares a
//!   closed `ActionSet`, and the provided `execute` method validates a call
//!   against it before handing the typed work to `perform`
//! - **Drivers**: each facade talks to its resource through a driver trait
//!   (`FileSystemDriver`, `SqlDriver`, `BrowserDriver`, `InputDriver`) held
//!   as `Arc<dyn ...>`, so hosts can plug in their own backends
//! - **Dispatcher**: the boundary that turns driver outcomes into
//!   `ActionResult`s and lets only `SecurityViolation` through as an error
//! - **ToolRouter**: a registry that holds all facades and dispatches
//!   calls by tool name

pub mod action;
pub mod browser;
pub mod computer;
pub mod database;
pub mod disk;
pub mod dispatch;
pub mod doc;
pub mod eval;
pub mod sandbox;
pub mod workflow;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::{ActionFailure, ErrorKind, SecurityViolation, ToolError};
use crate::types::{ActionResult, ToolDefinition};
use crate::workflow::WorkflowManager;

use self::action::ActionSet;
use self::dispatch::Dispatcher;

/// Trait that all facade tools must implement.
///
/// Implementors provide the action table, a dispatcher and the `perform`
/// step. Hosts call `execute`, which never fails for ordinary problems:
/// those come back as `ActionResult::Failure`. The only `Err` is a
/// sandbox escape.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g. "disk").
    fn name(&self) -> &str {
        self.actions().tool
    }

    /// A human-readable description of what this tool does.
    fn description(&self) -> &str;

    /// The closed set of actions this tool understands.
    fn actions(&self) -> &'static ActionSet;

    /// Dispatch boundary used for every call.
    fn dispatcher(&self) -> &Dispatcher;

    /// Run a validated action. `action` is always a member of `actions()`
    /// and every required parameter is present.
    async fn perform(&self, action: &'static str, params: Value) -> Result<Value, ToolError>;

    /// Validate and run an action.
    async fn execute(
        &self,
        action: &str,
        params: Value,
    ) -> Result<ActionResult, SecurityViolation> {
        let spec = match self.actions().validate(action, &params) {
            Ok(spec) => spec,
            Err(failure) => {
                debug!(
                    tool = %self.name(),
                    %action,
                    kind = %failure.kind,
                    "Tool::execute: rejected before dispatch"
                );
                return Ok(failure.into());
            }
        };
        self.dispatcher()
            .run(self.name(), spec.name, self.perform(spec.name, params))
            .await
    }

    /// JSON Schema describing the tool's input parameters.
    fn parameters_schema(&self) -> Value {
        self.actions().parameters_schema()
    }

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters_schema(),
        }
    }
}

/// Routes tool calls to the correct facade.
pub struct ToolRouter {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRouter {
    /// Create a new empty ToolRouter.
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool with the router. A tool with the same name replaces
    /// the previous one.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        debug!(tool_name = %tool.name(), "ToolRouter::register: called");
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// Execute `action` on the tool called `name`.
    pub async fn execute(
        &self,
        name: &str,
        action: &str,
        params: Value,
    ) -> Result<ActionResult, SecurityViolation> {
        match self.tools.iter().find(|t| t.name() == name) {
            Some(tool) => tool.execute(action, params).await,
            None => {
                debug!(%name, "ToolRouter::execute: unknown tool");
                let message = format!("Unknown tool: {}", name);
                Ok(ActionFailure::new(ErrorKind::UnsupportedAction, message)
                    .with_suggestion(format!("use one of: {}", self.names().join(", ")))
                    .into())
            }
        }
    }

    /// Execute with JSON-encoded arguments, as they arrive from an LLM.
    /// An empty string means no parameters.
    pub async fn execute_json(
        &self,
        name: &str,
        action: &str,
        arguments: &str,
    ) -> Result<ActionResult, SecurityViolation> {
        let params = if arguments.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(arguments) {
                Ok(params) => params,
                Err(e) => {
                    return Ok(ActionFailure::invalid_parameter(format!(
                        "Invalid JSON arguments for tool '{}': {}",
                        name, e
                    ))
                    .into())
                }
            }
        };
        self.execute(name, action, params).await
    }

    /// Check if a tool with the given name is registered.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    /// Names of all registered tools, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the router has no tools.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a ToolRouter with every built-in tool enabled in `config`.
///
/// Browser and computer facades need a host-provided driver and are
/// registered separately with `ToolRouter::register`.
pub fn create_default_router(config: &AppConfig) -> Result<ToolRouter> {
    let dispatcher = Dispatcher::from_secs(config.dispatch.timeout_secs);
    let mut router = ToolRouter::new();

    let enabled = |name: &str| config.tools.enabled.iter().any(|t| t == name);

    let needs_fs = enabled("disk") || enabled("doc") || enabled("eval");
    let filesystem = if needs_fs {
        let root = config.sandbox_root()?;
        Some(Arc::new(disk::LocalFileSystem::open(&root)?))
    } else {
        None
    };

    if let Some(fs) = &filesystem {
        if enabled("disk") {
            router.register(Box::new(disk::DiskTool::new(fs.clone(), dispatcher.clone())));
        }
        if enabled("doc") {
            router.register(Box::new(doc::DocTool::new(fs.clone(), dispatcher.clone())));
        }
        if enabled("eval") && config.eval.enabled {
            router.register(Box::new(eval::EvalTool::new(
                fs.sandbox().root().to_path_buf(),
                config.eval.max_output_bytes,
                dispatcher.clone(),
            )));
        }
    }

    if enabled("database") {
        let driver = database::SqliteDriver::open(&config.database.path)
            .with_context(|| format!("Failed to open database: {}", config.database.path))?;
        let tool = database::DatabaseTool::new(Arc::new(driver), dispatcher.clone());
        router.register(Box::new(tool));
    }

    if enabled("workflow") {
        let manager = WorkflowManager::open(config.workflow_dir()?)?;
        router.register(Box::new(workflow::WorkflowTool::new(manager, dispatcher.clone())));
    }

    info!(
        tools = ?router.names(),
        timeout = ?dispatcher.timeout().map(|limit| limit.as_secs()),
        "Tool router ready"
    );
    Ok(router)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_in(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.sandbox.root = Some(dir.join("sandbox"));
        config.workflow.storage_dir = Some(dir.join("workflows"));
        config
    }

    #[test]
    fn test_default_router_registers_enabled_tools() {
        let temp = tempfile::tempdir().unwrap();
        let router = create_default_router(&config_in(temp.path())).unwrap();

        for name in ["disk", "database", "eval", "doc", "workflow"] {
            assert!(router.has_tool(name), "missing tool {}", name);
        }
        assert!(!router.has_tool("browser"));
        assert_eq!(router.definitions().len(), router.len());
    }

    #[test]
    fn test_router_respects_enabled_list() {
        let temp = tempfile::tempdir().unwrap();
        let mut config = config_in(temp.path());
        config.tools.enabled = vec!["workflow".to_string()];
        let router = create_default_router(&config).unwrap();
        assert_eq!(router.names(), vec!["workflow".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let router = ToolRouter::new();
        let result = router.execute("nope", "read", json!({})).await.unwrap();
        assert_eq!(result.kind(), Some(ErrorKind::UnsupportedAction));
        assert!(result.error().unwrap().message.contains("nope"));
    }

    #[tokio::test]
    async fn test_execute_json_rejects_bad_json() {
        let temp = tempfile::tempdir().unwrap();
        let router = create_default_router(&config_in(temp.path())).unwrap();
        let result = router.execute_json("disk", "read", "{not json").await.unwrap();
        assert_eq!(result.kind(), Some(ErrorKind::InvalidParameter));
    }

    #[tokio::test]
    async fn test_execute_json_routes_to_tool() {
        let temp = tempfile::tempdir().unwrap();
        let router = create_default_router(&config_in(temp.path())).unwrap();

        let result = router
            .execute_json("disk", "write", r#"{"path": "hello.txt", "content": "hi"}"#)
            .await
            .unwrap();
        assert!(result.is_success());

        let result = router.execute_json("disk", "read", r#"{"path": "hello.txt"}"#).await.unwrap();
        assert_eq!(result.data().unwrap()["content"], "hi");
    }

    #[tokio::test]
    async fn test_router_propagates_security_violation() {
        let temp = tempfile::tempdir().unwrap();
        let router = create_default_router(&config_in(temp.path())).unwrap();
        let err = router
            .execute("disk", "read", json!({ "path": "../../etc/passwd" }))
            .await
            .unwrap_err();
        assert_eq!(err.path, "../../etc/passwd");
    }
}
