//! Workflow tool implementation.
//!
//! Exposes the `WorkflowManager` as a facade. Store access blocks on file
//! locks and fsync, so every call runs on the blocking thread pool.
//!
//! The dispatcher never cuts a workflow call short. Its timeout becomes a
//! deadline for `step` and `complete`, checked under the record lock before
//! saving, so a call reported as `timeout` leaves the record unchanged.

use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::action::{decode, ActionSet, ActionSpec, ParamKind, ParamSpec};
use super::dispatch::Dispatcher;
use super::Tool;
use crate::error::{ActionFailure, ErrorKind, ToolError};
use crate::workflow::{Workflow, WorkflowError, WorkflowManager, WorkflowStatus};

pub static WORKFLOW_ACTIONS: ActionSet = ActionSet {
    tool: "workflow",
    params: &[
        ParamSpec {
            name: "workflow_id",
            kind: ParamKind::String,
            description: "ID returned by start",
        },
        ParamSpec {
            name: "data",
            kind: ParamKind::Object,
            description: "Free-form data for the workflow (start) or the step (step)",
        },
        ParamSpec {
            name: "summary",
            kind: ParamKind::String,
            description: "Closing note stored with the completed workflow",
        },
        ParamSpec {
            name: "status",
            kind: ParamKind::String,
            description: "Filter for list: active or completed",
        },
    ],
    actions: &[
        ActionSpec {
            name: "start",
            description: "Create a new active workflow",
            required: &[],
            optional: &["data"],
        },
        ActionSpec {
            name: "step",
            description: "Process the next step of an active workflow",
            required: &["workflow_id"],
            optional: &["data"],
        },
        ActionSpec {
            name: "status",
            description: "Show a workflow without changing it",
            required: &["workflow_id"],
            optional: &[],
        },
        ActionSpec {
            name: "complete",
            description: "Complete a workflow; no further steps are accepted",
            required: &["workflow_id"],
            optional: &["summary"],
        },
        ActionSpec {
            name: "list",
            description: "List stored workflows, newest first",
            required: &[],
            optional: &["status"],
        },
    ],
};

#[derive(Debug, Deserialize)]
struct StartParams {
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct StepParams {
    workflow_id: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct StatusParams {
    workflow_id: String,
}

#[derive(Debug, Deserialize)]
struct CompleteParams {
    workflow_id: String,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default)]
    status: Option<WorkflowStatus>,
}

impl From<WorkflowError> for ToolError {
    fn from(err: WorkflowError) -> Self {
        let message = err.to_string();
        match err {
            WorkflowError::NotFound(_) => ActionFailure::not_found(message)
                .with_suggestion("check the workflow_id or start a new workflow")
                .into(),
            WorkflowError::StepsClosed(_) => ActionFailure::invalid_state(message)
                .with_suggestion("start a new workflow")
                .into(),
            WorkflowError::AlreadyCompleted(_) => ActionFailure::invalid_state(message)
                .with_suggestion("use status to inspect the workflow")
                .into(),
            WorkflowError::InvalidId(_) => ActionFailure::invalid_parameter(message).into(),
            WorkflowError::DeadlineExceeded(_) => ActionFailure::new(ErrorKind::Timeout, message)
                .with_suggestion("the workflow is unchanged; retry the call")
                .into(),
            WorkflowError::Processor(e) => ToolError::Driver(e.context("Step processor failed")),
            WorkflowError::Storage(e) => ToolError::Driver(e),
        }
    }
}

pub struct WorkflowTool {
    manager: WorkflowManager,
    dispatcher: Dispatcher,
    limit: Option<Duration>,
}

impl WorkflowTool {
    pub fn new(manager: WorkflowManager, dispatcher: Dispatcher) -> Self {
        Self {
            manager,
            limit: dispatcher.timeout(),
            dispatcher: Dispatcher::new(None),
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.limit.and_then(|limit| Instant::now().checked_add(limit))
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T, ToolError>
    where
        F: FnOnce(WorkflowManager) -> Result<T, WorkflowError> + Send + 'static,
        T: Send + 'static,
    {
        let manager = self.manager.clone();
        let outcome = tokio::task::spawn_blocking(move || work(manager))
            .await
            .context("Workflow worker panicked")?;
        Ok(outcome?)
    }
}

#[async_trait]
impl Tool for WorkflowTool {
    fn description(&self) -> &str {
        "Run multi-step workflows whose state survives between calls. \
         'start' returns a workflow_id; 'step' appends a processed step; \
         'status' reads the current state; 'complete' closes the workflow \
         for good; 'list' shows stored workflows."
    }

    fn actions(&self) -> &'static ActionSet {
        &WORKFLOW_ACTIONS
    }

    fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    async fn perform(&self, action: &'static str, params: Value) -> Result<Value, ToolError> {
        match action {
            "start" => {
                let p: StartParams = decode(action, params)?;
                let data = object_data(p.data)?;
                let workflow = self.blocking(move |m| m.start(data)).await?;
                Ok(json!({
                    "workflow_id": workflow.id,
                    "status": workflow.status,
                    "steps": workflow.total_steps(),
                    "created_at": workflow.created_at,
                    "next_actions": workflow.next_actions(),
                }))
            }
            "step" => {
                let p: StepParams = decode(action, params)?;
                let data = object_data(p.data)?;
                let id = p.workflow_id;
                let deadline = self.deadline();
                let workflow = self.blocking(move |m| m.step_before(&id, data, deadline)).await?;
                step_response(&workflow)
            }
            "status" => {
                let p: StatusParams = decode(action, params)?;
                let workflow = self.blocking(move |m| m.status(&p.workflow_id)).await?;
                Ok(json!({
                    "workflow_id": workflow.id,
                    "status": workflow.status,
                    "created_at": workflow.created_at,
                    "updated_at": workflow.updated_at,
                    "completed_at": workflow.completed_at,
                    "data": workflow.data,
                    "metadata": workflow.metadata,
                    "steps": workflow.step_summaries(),
                    "next_actions": workflow.next_actions(),
                }))
            }
            "complete" => {
                let p: CompleteParams = decode(action, params)?;
                let deadline = self.deadline();
                let workflow = self
                    .blocking(move |m| m.complete_before(&p.workflow_id, p.summary, deadline))
                    .await?;
                Ok(json!({
                    "workflow_id": workflow.id,
                    "status": workflow.status,
                    "total_steps": workflow.total_steps(),
                    "created_at": workflow.created_at,
                    "completed_at": workflow.completed_at,
                    "duration_seconds": workflow.duration_seconds(),
                    "summary": workflow.summary,
                }))
            }
            "list" => {
                let p: ListParams = decode(action, params)?;
                let workflows = self.blocking(move |m| m.list(p.status)).await?;
                let entries: Vec<Value> = workflows
                    .iter()
                    .map(|w| {
                        json!({
                            "workflow_id": w.id,
                            "status": w.status,
                            "steps": w.total_steps(),
                            "created_at": w.created_at,
                            "updated_at": w.updated_at,
                        })
                    })
                    .collect();
                Ok(json!({ "count": entries.len(), "workflows": entries }))
            }
            other => Err(ActionFailure::unsupported_action(
                self.name(),
                other,
                &WORKFLOW_ACTIONS.names(),
            )
            .into()),
        }
    }
}

fn step_response(workflow: &Workflow) -> Result<Value, ToolError> {
    let step = workflow
        .steps
        .last()
        .context("Workflow record has no steps after appending one")?;
    Ok(json!({
        "workflow_id": workflow.id,
        "step_number": step.step_number,
        "total_steps": workflow.total_steps(),
        "result": step.result,
        "processed_at": step.processed_at,
        "next_actions": workflow.next_actions(),
    }))
}

/// `data` must be a JSON object; absent or null means empty.
fn object_data(data: Option<Value>) -> Result<Value, ActionFailure> {
    match data {
        None | Some(Value::Null) => Ok(json!({})),
        Some(value @ Value::Object(_)) => Ok(value),
        Some(_) => Err(ActionFailure::invalid_parameter("'data' must be a JSON object")),
    }
}
