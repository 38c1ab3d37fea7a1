//! Dispatch boundary.
//!
//! The `Dispatcher` runs one driver call as a single unit of work and
//! normalizes its outcome:
//!
//! - `Ok(data)` becomes `ActionResult::Success`
//! - `ToolError::Rejected` becomes the failure it carries
//! - `ToolError::Driver` becomes `driver_error` with the full error chain,
//!   unless a `SecurityViolation` is in the chain: that one is handed back
//!   on the `Err` side untouched
//! - exceeding the configured timeout becomes `timeout`

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ActionFailure, ErrorKind, SecurityViolation, ToolError};
use crate::types::ActionResult;

#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Build from a config value in seconds; `0` disables the timeout.
    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            Self::new(None)
        } else {
            Self::new(Some(Duration::from_secs(secs)))
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Await `call` and convert its outcome into an `ActionResult`.
    pub async fn run<F>(
        &self,
        tool: &str,
        action: &str,
        call: F,
    ) -> Result<ActionResult, SecurityViolation>
    where
        F: Future<Output = Result<Value, ToolError>> + Send,
    {
        debug!(%tool, %action, "Dispatcher::run: called");

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    debug!(%tool, %action, ?limit, "Dispatcher::run: timed out");
                    let message = format!(
                        "Action '{}' of tool '{}' timed out after {}s",
                        action,
                        tool,
                        limit.as_secs_f64()
                    );
                    return Ok(ActionFailure::new(ErrorKind::Timeout, message).into());
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(data) => Ok(ActionResult::success(data)),
            Err(ToolError::Rejected(failure)) => {
                debug!(%tool, %action, kind = %failure.kind, "Dispatcher::run: rejected");
                Ok(failure.into())
            }
            Err(ToolError::Driver(err)) => {
                if let Some(violation) = err.downcast_ref::<SecurityViolation>() {
                    warn!(%tool, %action, path = %violation.path, "security violation");
                    return Err(violation.clone());
                }
                debug!(%tool, %action, error = %err, "Dispatcher::run: driver error");
                Ok(ActionFailure::new(ErrorKind::DriverError, format!("{:#}", err)).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};
    use serde_json::json;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_success_passthrough() {
        let result = Dispatcher::default()
            .run("t", "a", async { Ok::<_, ToolError>(json!({ "ok": 1 })) })
            .await
            .unwrap();
        assert_eq!(result.data().unwrap()["ok"], 1);
    }

    #[tokio::test]
    async fn test_driver_error_keeps_full_chain() {
        let err = anyhow!("divided by 0").context("perform failed");
        let result = Dispatcher::default()
            .run("t", "a", async { Err::<Value, ToolError>(err.into()) })
            .await
            .unwrap();
        let failure = result.error().unwrap();
        assert_eq!(failure.kind, ErrorKind::DriverError);
        assert!(failure.message.contains("perform failed"));
        assert!(failure.message.contains("divided by 0"));
    }

    #[tokio::test]
    async fn test_rejection_keeps_kind() {
        let result = Dispatcher::default()
            .run("t", "a", async {
                Err::<Value, ToolError>(ActionFailure::not_found("nope").into())
            })
            .await
            .unwrap();
        assert_eq!(result.kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_security_violation_propagates() {
        let violation = SecurityViolation {
            path: "../x".to_string(),
            root: PathBuf::from("/sandbox"),
        };
        let expected = violation.clone();
        let err = Dispatcher::default()
            .run("t", "a", async move { Err::<Value, ToolError>(violation.into()) })
            .await
            .unwrap_err();
        assert_eq!(err, expected);
    }

    #[tokio::test]
    async fn test_security_violation_found_under_context() {
        let err = Dispatcher::default()
            .run("t", "a", async {
                let inner: anyhow::Result<()> = Err(SecurityViolation {
                    path: "/etc".to_string(),
                    root: PathBuf::from("/sandbox"),
                }
                .into());
                inner.context("while listing")?;
                Ok::<Value, ToolError>(json!(null))
            })
            .await
            .unwrap_err();
        assert_eq!(err.path, "/etc");
    }

    #[tokio::test]
    async fn test_timeout() {
        let dispatcher = Dispatcher::new(Some(Duration::from_millis(20)));
        let result = dispatcher
            .run("t", "slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<Value, ToolError>(json!(null))
            })
            .await
            .unwrap();
        assert_eq!(result.kind(), Some(ErrorKind::Timeout));
        assert!(result.error().unwrap().message.contains("slow"));
    }

    #[test]
    fn test_from_secs_zero_disables() {
        assert!(Dispatcher::from_secs(0).timeout().is_none());
        assert_eq!(Dispatcher::from_secs(5).timeout(), Some(Duration::from_secs(5)));
    }
}
