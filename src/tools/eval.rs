//! Eval tool implementation.
//!
//! Runs shell commands via `bash -c` and Python snippets via `python3 -c`,
//! with the sandbox root as working directory, a per-call timeout and
//! output truncation.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::action::{decode, ActionSet, ActionSpec, ParamKind, ParamSpec};
use super::dispatch::Dispatcher;
use super::Tool;
use crate::error::{ActionFailure, ToolError};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 300;

pub static EVAL_ACTIONS: ActionSet = ActionSet {
    tool: "eval",
    params: &[
        ParamSpec {
            name: "command",
            kind: ParamKind::String,
            description: "Shell command to run with bash",
        },
        ParamSpec {
            name: "code",
            kind: ParamKind::String,
            description: "Python source to run with python3",
        },
        ParamSpec {
            name: "timeout",
            kind: ParamKind::Integer,
            description: "Timeout in seconds (default: 30, max: 300)",
        },
    ],
    actions: &[
        ActionSpec {
            name: "shell",
            description: "Run a shell command in the sandbox directory",
            required: &["command"],
            optional: &["timeout"],
        },
        ActionSpec {
            name: "python",
            description: "Run a Python snippet in the sandbox directory",
            required: &["code"],
            optional: &["timeout"],
        },
    ],
};

#[derive(Debug, Deserialize)]
struct ShellParams {
    command: String,
    #[serde(default)]
    timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PythonParams {
    code: String,
    #[serde(default)]
    timeout: Option<u64>,
}

pub struct EvalTool {
    workdir: PathBuf,
    max_output_bytes: usize,
    dispatcher: Dispatcher,
}

impl EvalTool {
    pub fn new(workdir: PathBuf, max_output_bytes: usize, dispatcher: Dispatcher) -> Self {
        Self {
            workdir,
            max_output_bytes,
            dispatcher,
        }
    }

    async fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Option<u64>,
    ) -> Result<Value, ToolError> {
        let timeout_secs = timeout.unwrap_or(DEFAULT_TIMEOUT_SECS).min(MAX_TIMEOUT_SECS);
        debug!(%program, timeout_secs, workdir = ?self.workdir, "EvalTool::run: called");

        let child = tokio::process::Command::new(program)
            .args(args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", program))?;

        let limit = Duration::from_secs(timeout_secs);
        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(output) => output.with_context(|| format!("Failed to run {}", program))?,
            Err(_) => return Err(anyhow!("{} timed out after {}s", program, timeout_secs).into()),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let (stdout, cut_out) = truncate_output(&stdout, self.max_output_bytes);
        let (stderr, cut_err) = truncate_output(&stderr, self.max_output_bytes / 2);
        let exit_code = output.status.code().unwrap_or(-1);

        debug!(%program, exit_code, "EvalTool::run: finished");
        Ok(json!({
            "exit_code": exit_code,
            "stdout": stdout,
            "stderr": stderr,
            "truncated": cut_out || cut_err,
        }))
    }
}

#[async_trait]
impl Tool for EvalTool {
    fn description(&self) -> &str {
        "Run code inside the sandbox directory. 'shell' executes a bash command, \
         'python' executes a python3 snippet. Returns exit code, stdout and stderr. \
         Commands run with a configurable timeout (default 30s)."
    }

    fn actions(&self) -> &'static ActionSet {
        &EVAL_ACTIONS
    }

    fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    async fn perform(&self, action: &'static str, params: Value) -> Result<Value, ToolError> {
        match action {
            "shell" => {
                let p: ShellParams = decode(action, params)?;
                self.run("bash", &["-c", p.command.as_str()], p.timeout).await
            }
            "python" => {
                let p: PythonParams = decode(action, params)?;
                self.run("python3", &["-c", p.code.as_str()], p.timeout).await
            }
            other => Err(ActionFailure::unsupported_action(
                self.name(),
                other,
                &EVAL_ACTIONS.names(),
            )
            .into()),
        }
    }
}

/// Keep the head and tail of `output` within `max_bytes`.
/// Returns the text and whether anything was cut.
fn truncate_output(output: &str, max_bytes: usize) -> (String, bool) {
    if output.len() <= max_bytes {
        return (output.to_string(), false);
    }
    let half = max_bytes / 2;
    let mut head = half;
    while !output.is_char_boundary(head) {
        head -= 1;
    }
    let mut tail = output.len() - half;
    while !output.is_char_boundary(tail) {
        tail += 1;
    }
    let omitted = tail - head;
    let text = format!(
        "{}\n\n... ({} bytes omitted) ...\n\n{}",
        &output[..head],
        omitted,
        &output[tail..]
    );
    (text, true)
}
