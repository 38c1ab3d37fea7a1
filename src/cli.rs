//! CLI command definitions and subcommands

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use crate::config::AppConfig;
use crate::error::ErrorKind;
use crate::tools::{create_default_router, ToolRouter};
use crate::types::ActionResult;

/// Exit code for a successful action.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for an action that returned a failure result.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for a sandbox escape attempt.
pub const EXIT_SECURITY_VIOLATION: i32 = 2;

/// toolclaw - sandboxed tool facades for LLM agents
#[derive(Debug, Parser)]
#[command(
    name = "toolclaw",
    version,
    about = "Sandboxed disk, database, eval, doc and workflow tools"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the definitions of all enabled tools as JSON
    Tools,

    /// Run one action and print its result as JSON
    Call {
        /// Tool name, e.g. disk
        tool: String,

        /// Action name, e.g. read
        action: String,

        /// Parameters as a JSON object
        #[arg(short, long)]
        params: Option<String>,
    },

    /// Write the default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => AppConfig::config_path(),
        }
    }
}

/// Run a parsed command and return the process exit code.
pub async fn run(cli: &Cli, config: &AppConfig) -> Result<i32> {
    match &cli.command {
        Command::Tools => {
            let router = create_default_router(config)?;
            let json = serde_json::to_string_pretty(&router.definitions())
                .context("Failed to encode definitions")?;
            println!("{}", json);
            Ok(EXIT_SUCCESS)
        }
        Command::Call { tool, action, params } => {
            let router = create_default_router(config)?;
            let (result, code) = call(&router, tool, action, params.as_deref()).await;
            println!("{}", result.to_pretty_json());
            Ok(code)
        }
        Command::InitConfig { force } => {
            let path = cli.config_path()?;
            if path.exists() && !force {
                eprintln!("Config already exists: {} (use --force to overwrite)", path.display());
                return Ok(EXIT_FAILURE);
            }
            AppConfig::save_default_to(&path)?;
            println!("Created default config: {}", path.display());
            Ok(EXIT_SUCCESS)
        }
    }
}

/// Execute one call through the router and pick the exit code.
///
/// A security violation is rendered as a `security_violation` failure.
pub async fn call(
    router: &ToolRouter,
    tool: &str,
    action: &str,
    params: Option<&str>,
) -> (ActionResult, i32) {
    debug!(%tool, %action, "cli::call: called");
    match router.execute_json(tool, action, params.unwrap_or("")).await {
        Ok(result) => {
            let code = if result.is_success() { EXIT_SUCCESS } else { EXIT_FAILURE };
            (result, code)
        }
        Err(violation) => (
            ActionResult::failure(ErrorKind::SecurityViolation, violation.to_string()),
            EXIT_SECURITY_VIOLATION,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn config_in(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.sandbox.root = Some(dir.join("sandbox"));
        config.workflow.storage_dir = Some(dir.join("workflows"));
        config
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_call() {
        let cli = Cli::try_parse_from([
            "toolclaw",
            "-v",
            "call",
            "disk",
            "read",
            "--params",
            r#"{"path":"a.txt"}"#,
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Call { tool, action, params } => {
                assert_eq!(tool, "disk");
                assert_eq!(action, "read");
                assert_eq!(params.as_deref(), Some(r#"{"path":"a.txt"}"#));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_call_exit_codes() {
        let temp = tempfile::tempdir().unwrap();
        let router = create_default_router(&config_in(temp.path())).unwrap();

        let params = r#"{"path":"a.txt","content":"x"}"#;
        let (result, code) = call(&router, "disk", "write", Some(params)).await;
        assert!(result.is_success());
        assert_eq!(code, EXIT_SUCCESS);

        let (result, code) = call(&router, "disk", "read", None).await;
        assert_eq!(result.kind(), Some(ErrorKind::MissingParameter));
        assert_eq!(code, EXIT_FAILURE);

        let params = r#"{"path":"../../etc/passwd"}"#;
        let (result, code) = call(&router, "disk", "read", Some(params)).await;
        assert_eq!(result.kind(), Some(ErrorKind::SecurityViolation));
        assert_eq!(code, EXIT_SECURITY_VIOLATION);
    }

    #[tokio::test]
    async fn test_init_config_respects_force() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        let path_str = path.to_str().unwrap();
        let config = AppConfig::default();

        let cli = Cli::try_parse_from(["toolclaw", "--config", path_str, "init-config"]).unwrap();
        assert_eq!(run(&cli, &config).await.unwrap(), EXIT_SUCCESS);
        assert!(path.exists());
        assert_eq!(run(&cli, &config).await.unwrap(), EXIT_FAILURE);

        let cli = Cli::try_parse_from(["toolclaw", "--config", path_str, "init-config", "--force"])
            .unwrap();
        assert_eq!(run(&cli, &config).await.unwrap(), EXIT_SUCCESS);
    }
}
