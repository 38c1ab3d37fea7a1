//! Workflow state machine.
//!
//! A workflow is a persisted, multi-step record with the lifecycle
//! `active -> completed`:
//!
//! - `start` creates an active record with no steps
//! - `step` appends one step, numbered from 1 without gaps
//! - `status` reads the record and never changes it
//! - `complete` is terminal: afterwards neither `step` nor `complete` is
//!   accepted
//!
//! The record on disk is the source of truth. Every operation re-reads it,
//! and mutations happen under the per-ID lock of `WorkflowStore`.

pub mod store;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

pub use self::store::{RecordLock, WorkflowStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Active,
    Completed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub step_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_step_at: Option<DateTime<Utc>>,
}

/// One processed step. Never modified once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub step_number: usize,
    pub data: Value,
    pub result: Value,
    pub processed_at: DateTime<Utc>,
}

impl Step {
    /// The `action` field of the step's input, if any.
    pub fn action(&self) -> Option<&str> {
        self.data.get("action").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub data: Value,
    #[serde(default)]
    pub metadata: WorkflowMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Workflow {
    pub fn new(data: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            status: WorkflowStatus::Active,
            created_at: now,
            updated_at: now,
            completed_at: None,
            data,
            metadata: WorkflowMetadata::default(),
            summary: None,
            steps: Vec::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// Append the next step, running `processor` to produce its result.
    pub fn append_step(
        &mut self,
        data: Value,
        processor: &dyn StepProcessor,
    ) -> Result<&Step, WorkflowError> {
        if self.is_completed() {
            return Err(WorkflowError::StepsClosed(self.id.clone()));
        }

        let step_number = self.steps.len() + 1;
        let result = processor
            .process(self, step_number, &data)
            .map_err(WorkflowError::Processor)?;
        let now = Utc::now();

        self.steps.push(Step {
            step_number,
            data,
            result,
            processed_at: now,
        });
        self.updated_at = now;
        self.metadata.step_count = self.steps.len();
        self.metadata.last_step_at = Some(now);

        Ok(&self.steps[self.steps.len() - 1])
    }

    /// Move to `completed`. Fails if already there.
    pub fn complete(&mut self, summary: Option<String>) -> Result<(), WorkflowError> {
        if self.is_completed() {
            return Err(WorkflowError::AlreadyCompleted(self.id.clone()));
        }
        let now = Utc::now();
        self.status = WorkflowStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
        self.summary = summary;
        Ok(())
    }

    /// Seconds from creation to completion; `None` while active.
    pub fn duration_seconds(&self) -> Option<f64> {
        self.completed_at
            .map(|done| (done - self.created_at).num_milliseconds() as f64 / 1000.0)
    }

    /// Suggested follow-up actions. Derived from state, never stored.
    pub fn next_actions(&self) -> Vec<&'static str> {
        match self.status {
            WorkflowStatus::Completed => Vec::new(),
            WorkflowStatus::Active if self.steps.is_empty() => vec!["step", "status"],
            WorkflowStatus::Active => vec!["step", "status", "complete"],
        }
    }

    /// Compact per-step view used by status responses.
    pub fn step_summaries(&self) -> Vec<Value> {
        self.steps
            .iter()
            .map(|s| {
                json!({
                    "step_number": s.step_number,
                    "action": s.action(),
                    "processed_at": s.processed_at,
                })
            })
            .collect()
    }
}

/// Turns a step's input into its result.
pub trait StepProcessor: Send + Sync {
    /// `workflow` is the state before the step is appended.
    fn process(
        &self,
        workflow: &Workflow,
        step_number: usize,
        data: &Value,
    ) -> anyhow::Result<Value>;
}

/// Acknowledges the step and echoes what it carried.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStepProcessor;

impl StepProcessor for DefaultStepProcessor {
    fn process(
        &self,
        _workflow: &Workflow,
        step_number: usize,
        data: &Value,
    ) -> anyhow::Result<Value> {
        let mut fields: Vec<&String> =
            data.as_object().map(|o| o.keys().collect()).unwrap_or_default();
        fields.sort();
        Ok(json!({
            "processed": true,
            "step_number": step_number,
            "action": data.get("action").cloned().unwrap_or(Value::Null),
            "fields": fields,
        }))
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Workflow {0} not found")]
    NotFound(String),

    #[error("Cannot add steps to completed workflow {0}")]
    StepsClosed(String),

    #[error("Workflow {0} is already completed")]
    AlreadyCompleted(String),

    #[error("Invalid workflow id '{0}': expected a UUID")]
    InvalidId(String),

    #[error("Workflow {0} was left unchanged: the deadline passed before the update was saved")]
    DeadlineExceeded(String),

    #[error("Step processor failed")]
    Processor(#[source] anyhow::Error),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Runs workflow operations against a `WorkflowStore`.
#[derive(Clone)]
pub struct WorkflowManager {
    store: WorkflowStore,
    processor: Arc<dyn StepProcessor>,
}

impl WorkflowManager {
    pub fn new(store: WorkflowStore) -> Self {
        Self {
            store,
            processor: Arc::new(DefaultStepProcessor),
        }
    }

    /// Open the store at `dir` with the default step processor.
    pub fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        Ok(Self::new(WorkflowStore::open(dir)?))
    }

    pub fn with_processor(mut self, processor: Arc<dyn StepProcessor>) -> Self {
        self.processor = processor;
        self
    }

    pub fn store(&self) -> &WorkflowStore {
        &self.store
    }

    pub fn start(&self, data: Value) -> Result<Workflow, WorkflowError> {
        let workflow = Workflow::new(data);
        self.store.save(&workflow)?;
        info!(id = %workflow.id, "Workflow started");
        Ok(workflow)
    }

    /// Append a step and return the updated workflow; the new step is last.
    pub fn step(&self, id: &str, data: Value) -> Result<Workflow, WorkflowError> {
        self.step_before(id, data, None)
    }

    /// Like `step`, but the record is not saved once `deadline` has passed.
    pub fn step_before(
        &self,
        id: &str,
        data: Value,
        deadline: Option<Instant>,
    ) -> Result<Workflow, WorkflowError> {
        let id = parse_id(id)?;
        let _lock = self.lock_existing(&id)?;
        let mut workflow = self.load(&id)?;
        let step_number = workflow.append_step(data, self.processor.as_ref())?.step_number;
        check_deadline(&id, deadline)?;
        self.store.save(&workflow)?;
        debug!(%id, step_number, "WorkflowManager::step: appended");
        Ok(workflow)
    }

    pub fn status(&self, id: &str) -> Result<Workflow, WorkflowError> {
        let id = parse_id(id)?;
        self.load(&id)
    }

    pub fn complete(&self, id: &str, summary: Option<String>) -> Result<Workflow, WorkflowError> {
        self.complete_before(id, summary, None)
    }

    /// Like `complete`, but the record is not saved once `deadline` has passed.
    pub fn complete_before(
        &self,
        id: &str,
        summary: Option<String>,
        deadline: Option<Instant>,
    ) -> Result<Workflow, WorkflowError> {
        let id = parse_id(id)?;
        let _lock = self.lock_existing(&id)?;
        let mut workflow = self.load(&id)?;
        workflow.complete(summary)?;
        check_deadline(&id, deadline)?;
        self.store.save(&workflow)?;
        info!(%id, steps = workflow.total_steps(), "Workflow completed");
        Ok(workflow)
    }

    /// Stored workflows, newest first, optionally filtered by status.
    pub fn list(&self, status: Option<WorkflowStatus>) -> Result<Vec<Workflow>, WorkflowError> {
        let mut workflows = self.store.list()?;
        if let Some(status) = status {
            workflows.retain(|w| w.status == status);
        }
        Ok(workflows)
    }

    /// Lock a record that exists; unknown IDs leave no lock file behind.
    fn lock_existing(&self, id: &str) -> Result<RecordLock, WorkflowError> {
        if !self.store.exists(id) {
            return Err(WorkflowError::NotFound(id.to_string()));
        }
        Ok(self.store.lock(id)?)
    }

    fn load(&self, id: &str) -> Result<Workflow, WorkflowError> {
        self.store
            .load(id)?
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))
    }
}

/// Checked under the record lock, right before saving.
fn check_deadline(id: &str, deadline: Option<Instant>) -> Result<(), WorkflowError> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => {
            debug!(%id, "WorkflowManager: deadline passed, discarding update");
            Err(WorkflowError::DeadlineExceeded(id.to_string()))
        }
        _ => Ok(()),
    }
}

/// IDs double as file names, so only canonical UUIDs are accepted.
fn parse_id(id: &str) -> Result<String, WorkflowError> {
    Uuid::parse_str(id.trim())
        .map(|uuid| uuid.hyphenated().to_string())
        .map_err(|_| WorkflowError::InvalidId(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn manager() -> (tempfile::TempDir, WorkflowManager) {
        let temp = tempfile::tempdir().unwrap();
        let manager = WorkflowManager::open(temp.path().join("workflows")).unwrap();
        (temp, manager)
    }

    #[test]
    fn test_new_workflow_is_active_and_empty() {
        let workflow = Workflow::new(json!({ "customer": "Alice" }));
        assert_eq!(workflow.status, WorkflowStatus::Active);
        assert!(workflow.steps.is_empty());
        assert!(workflow.completed_at.is_none());
        assert!(Uuid::parse_str(&workflow.id).is_ok());
        assert_eq!(workflow.next_actions(), vec!["step", "status"]);
    }

    #[test]
    fn test_append_and_complete_in_memory() {
        let mut workflow = Workflow::new(json!({}));
        let step = workflow
            .append_step(json!({ "action": "validate", "b": 1, "a": 2 }), &DefaultStepProcessor)
            .unwrap();
        assert_eq!(step.step_number, 1);
        assert_eq!(step.result["action"], "validate");
        assert_eq!(step.result["fields"], json!(["a", "action", "b"]));
        assert_eq!(workflow.metadata.step_count, 1);
        assert!(workflow.metadata.last_step_at.is_some());
        assert_eq!(workflow.next_actions(), vec!["step", "status", "complete"]);

        workflow.complete(None).unwrap();
        assert!(workflow.duration_seconds().unwrap() >= 0.0);
        assert!(workflow.next_actions().is_empty());

        let err = workflow.append_step(json!({}), &DefaultStepProcessor).unwrap_err();
        assert!(matches!(err, WorkflowError::StepsClosed(_)));
        assert!(matches!(workflow.complete(None), Err(WorkflowError::AlreadyCompleted(_))));
        assert_eq!(workflow.total_steps(), 1);
    }

    #[test]
    fn test_default_processor_non_object_data() {
        let workflow = Workflow::new(json!({}));
        let result = DefaultStepProcessor.process(&workflow, 3, &json!("plain")).unwrap();
        assert_eq!(result["step_number"], 3);
        assert_eq!(result["action"], Value::Null);
        assert_eq!(result["fields"], json!([]));
    }

    #[test]
    fn test_manager_lifecycle_persists() {
        let (temp, manager) = manager();
        let started = manager.start(json!({ "customer": "Alice" })).unwrap();
        manager.step(&started.id, json!({ "action": "validate" })).unwrap();

        // A fresh manager sees the same record.
        let reopened = WorkflowManager::open(temp.path().join("workflows")).unwrap();
        let workflow = reopened.step(&started.id, json!({ "action": "ship" })).unwrap();
        assert_eq!(workflow.total_steps(), 2);
        assert_eq!(workflow.data["customer"], "Alice");

        let done = manager.complete(&started.id, Some("shipped".to_string())).unwrap();
        assert_eq!(done.status, WorkflowStatus::Completed);
        assert_eq!(done.summary.as_deref(), Some("shipped"));

        let err = reopened.step(&started.id, json!({})).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Cannot add steps to completed workflow {}", started.id)
        );
        let err = reopened.complete(&started.id, None).unwrap_err();
        assert_eq!(err.to_string(), format!("Workflow {} is already completed", started.id));

        let status = reopened.status(&started.id).unwrap();
        assert_eq!(status.total_steps(), 2);
        assert_eq!(status.status, WorkflowStatus::Completed);
    }

    #[test]
    fn test_unknown_and_invalid_ids() {
        let (_temp, manager) = manager();
        let missing = Uuid::new_v4().to_string();
        assert!(matches!(manager.status(&missing), Err(WorkflowError::NotFound(_))));
        assert!(matches!(manager.step(&missing, json!({})), Err(WorkflowError::NotFound(_))));
        assert!(matches!(manager.complete(&missing, None), Err(WorkflowError::NotFound(_))));
        assert!(matches!(manager.status("../../etc/passwd"), Err(WorkflowError::InvalidId(_))));
    }

    #[test]
    fn test_uppercase_id_is_normalized() {
        let (_temp, manager) = manager();
        let started = manager.start(json!({})).unwrap();
        let workflow = manager.status(&started.id.to_uppercase()).unwrap();
        assert_eq!(workflow.id, started.id);
    }

    #[test]
    fn test_status_is_idempotent() {
        let (_temp, manager) = manager();
        let started = manager.start(json!({})).unwrap();
        manager.step(&started.id, json!({ "action": "a" })).unwrap();

        let first = manager.status(&started.id).unwrap();
        let second = manager.status(&started.id).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_list_filters_by_status() {
        let (_temp, manager) = manager();
        let a = manager.start(json!({})).unwrap();
        let b = manager.start(json!({})).unwrap();
        manager.complete(&a.id, None).unwrap();

        assert_eq!(manager.list(None).unwrap().len(), 2);
        let active = manager.list(Some(WorkflowStatus::Active)).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, b.id);
        let completed = manager.list(Some(WorkflowStatus::Completed)).unwrap();
        assert_eq!(completed[0].id, a.id);
    }

    #[test]
    fn test_update_after_deadline_is_discarded() {
        let (_temp, manager) = manager();
        let started = manager.start(json!({})).unwrap();
        let past = Instant::now();

        let err = manager
            .step_before(&started.id, json!({ "action": "late" }), Some(past))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::DeadlineExceeded(_)));
        let err = manager.complete_before(&started.id, None, Some(past)).unwrap_err();
        assert!(matches!(err, WorkflowError::DeadlineExceeded(_)));

        let reloaded = manager.status(&started.id).unwrap();
        assert_eq!(reloaded.total_steps(), 0);
        assert!(!reloaded.is_completed());

        let later = Instant::now() + std::time::Duration::from_secs(60);
        let stepped = manager.step_before(&started.id, json!({}), Some(later)).unwrap();
        assert_eq!(stepped.total_steps(), 1);
    }

    struct FailingProcessor;

    impl StepProcessor for FailingProcessor {
        fn process(
            &self,
            _workflow: &Workflow,
            _step_number: usize,
            _data: &Value,
        ) -> anyhow::Result<Value> {
            anyhow::bail!("upstream unavailable")
        }
    }

    #[test]
    fn test_processor_failure_appends_nothing() {
        let (_temp, manager) = manager();
        let started = manager.start(json!({})).unwrap();
        let failing = manager.clone().with_processor(Arc::new(FailingProcessor));

        let err = failing.step(&started.id, json!({})).unwrap_err();
        assert!(matches!(err, WorkflowError::Processor(_)));
        assert_eq!(manager.status(&started.id).unwrap().total_steps(), 0);
    }

    #[test]
    fn test_concurrent_steps_are_contiguous() {
        let (_temp, manager) = manager();
        let id = manager.start(json!({})).unwrap().id;

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let manager = manager.clone();
                let id = id.clone();
                std::thread::spawn(move || {
                    for i in 0..5 {
                        manager.step(&id, json!({ "action": format!("t{}-{}", t, i) })).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let workflow = manager.status(&id).unwrap();
        assert_eq!(workflow.total_steps(), 40);
        assert_eq!(workflow.metadata.step_count, 40);
        let numbers: Vec<usize> = workflow.steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, (1..=40).collect::<Vec<_>>());
        let actions: HashSet<&str> = workflow.steps.iter().filter_map(Step::action).collect();
        assert_eq!(actions.len(), 40);
    }
}
