//! Database tool implementation.
//!
//! Runs SQL statements through a `SqlDriver`. A list of statements is
//! executed strictly in order and stops at the first one that reports an
//! error. This is sequential-with-early-exit, not a transaction: statements
//! that already succeeded stay applied and are visible in the result.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::action::{decode, ActionSet, ActionSpec, ParamKind, ParamSpec};
use super::dispatch::Dispatcher;
use super::Tool;
use crate::error::{ActionFailure, ToolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementStatus {
    Ok,
    Error,
}

/// What a driver reports for one statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementOutcome {
    pub status: StatementStatus,
    pub result: Value,
}

impl StatementOutcome {
    pub fn ok(result: Value) -> Self {
        Self {
            status: StatementStatus::Ok,
            result,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: StatementStatus::Error,
            result: Value::String(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == StatementStatus::Error
    }
}

/// An outcome tagged with the statement that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementRecord {
    pub statement: String,
    #[serde(flatten)]
    pub outcome: StatementOutcome,
}

/// Capability contract for SQL backends.
///
/// SQL-level failures (syntax errors, missing tables...) are reported as
/// `Ok` with `StatementStatus::Error`. An `Err` means the driver itself is
/// broken and aborts the whole call.
#[async_trait]
pub trait SqlDriver: Send + Sync {
    async fn perform(&self, statement: &str) -> Result<StatementOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Read,
    Write,
}

const READ_PREFIXES: &[&str] = &["SELECT", "WITH", "PRAGMA", "EXPLAIN", "VALUES"];

/// Classify a statement by its leading keyword.
pub fn classify(statement: &str) -> StatementKind {
    let keyword: String = statement
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    if READ_PREFIXES.contains(&keyword.as_str()) {
        StatementKind::Read
    } else {
        StatementKind::Write
    }
}

/// Execute `statements` in order, stopping after the first error record.
pub async fn run_statements(
    driver: &dyn SqlDriver,
    statements: &[String],
) -> Result<Vec<StatementRecord>> {
    let mut records = Vec::with_capacity(statements.len());
    for (index, statement) in statements.iter().enumerate() {
        let outcome = driver.perform(statement).await?;
        let failed = outcome.is_error();
        records.push(StatementRecord {
            statement: statement.clone(),
            outcome,
        });
        if failed {
            let skipped = statements.len() - index - 1;
            debug!(index, skipped, "run_statements: halting on error");
            break;
        }
    }
    Ok(records)
}

/// SQLite-backed driver.
pub struct SqliteDriver {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDriver {
    /// Open a database file, or an in-memory database for `:memory:`.
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory().context("Failed to open in-memory database")?
        } else {
            let path = std::path::Path::new(path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
            Connection::open(path)
                .with_context(|| format!("Failed to open database: {}", path.display()))?
        };
        debug!(%path, "SqliteDriver::open: called");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }
}

#[async_trait]
impl SqlDriver for SqliteDriver {
    async fn perform(&self, statement: &str) -> Result<StatementOutcome> {
        let conn = Arc::clone(&self.conn);
        let statement = statement.to_string();
        tokio::task::spawn_blocking(move || -> Result<StatementOutcome> {
            let conn = conn.lock().map_err(|_| anyhow!("SQLite connection lock poisoned"))?;
            Ok(execute_statement(&conn, &statement))
        })
        .await
        .context("SQLite worker panicked")?
    }
}

fn execute_statement(conn: &Connection, statement: &str) -> StatementOutcome {
    match classify(statement) {
        StatementKind::Read => match query_rows(conn, statement) {
            Ok(result) => StatementOutcome::ok(result),
            Err(e) => StatementOutcome::error(e.to_string()),
        },
        StatementKind::Write => match conn.execute(statement, []) {
            Ok(affected) => StatementOutcome::ok(json!({ "rows_affected": affected })),
            Err(e) => StatementOutcome::error(e.to_string()),
        },
    }
}

fn query_rows(conn: &Connection, statement: &str) -> rusqlite::Result<Value> {
    let mut stmt = conn.prepare(statement)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query([])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut obj = Map::new();
        for (i, name) in columns.iter().enumerate() {
            obj.insert(name.clone(), sql_value_to_json(row.get_ref(i)?));
        }
        out.push(Value::Object(obj));
    }

    Ok(json!({
        "columns": columns,
        "row_count": out.len(),
        "rows": out,
    }))
}

fn sql_value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::String(base64::engine::general_purpose::STANDARD.encode(b)),
    }
}

pub static DATABASE_ACTIONS: ActionSet = ActionSet {
    tool: "database",
    params: &[
        ParamSpec {
            name: "statement",
            kind: ParamKind::String,
            description: "A single SQL statement",
        },
        ParamSpec {
            name: "statements",
            kind: ParamKind::StringArray,
            description: "SQL statements executed in order; execution stops at the first error",
        },
    ],
    actions: &[
        ActionSpec {
            name: "query",
            description: "Run one SQL statement",
            required: &["statement"],
            optional: &[],
        },
        ActionSpec {
            name: "execute",
            description: "Run SQL statements in order, stopping at the first error (no rollback)",
            required: &["statements"],
            optional: &[],
        },
    ],
};

#[derive(Debug, Deserialize)]
struct QueryParams {
    statement: String,
}

#[derive(Debug, Deserialize)]
struct ExecuteParams {
    statements: Vec<String>,
}

/// Facade over a SQL driver.
pub struct DatabaseTool {
    driver: Arc<dyn SqlDriver>,
    dispatcher: Dispatcher,
}

impl DatabaseTool {
    pub fn new(driver: Arc<dyn SqlDriver>, dispatcher: Dispatcher) -> Self {
        Self { driver, dispatcher }
    }
}

#[async_trait]
impl Tool for DatabaseTool {
    fn description(&self) -> &str {
        "Run SQL against the configured database. 'query' runs one statement; \
         'execute' runs a list in order and stops at the first failing statement \
         without rolling back earlier ones."
    }

    fn actions(&self) -> &'static ActionSet {
        &DATABASE_ACTIONS
    }

    fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    async fn perform(&self, action: &'static str, params: Value) -> Result<Value, ToolError> {
        match action {
            "query" => {
                let p: QueryParams = decode(action, params)?;
                let outcome = self.driver.perform(&p.statement).await?;
                let record = StatementRecord {
                    statement: p.statement,
                    outcome,
                };
                Ok(serde_json::to_value(record).context("Failed to encode statement result")?)
            }
            "execute" => {
                let p: ExecuteParams = decode(action, params)?;
                if p.statements.is_empty() {
                    let failure =
                        ActionFailure::invalid_parameter("'statements' must not be empty");
                    return Err(failure.into());
                }
                let records = run_statements(self.driver.as_ref(), &p.statements).await?;
                let halted = records.last().map_or(false, |r| r.outcome.is_error());
                Ok(json!({
                    "executed": records.len(),
                    "total": p.statements.len(),
                    "halted": halted,
                    "results": records,
                }))
            }
            other => Err(ActionFailure::unsupported_action(
                self.name(),
                other,
                &DATABASE_ACTIONS.names(),
            )
            .into()),
        }
    }
}
