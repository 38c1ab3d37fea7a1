//! Configuration management for toolclaw.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sandbox: SandboxConfig,
    pub workflow: WorkflowConfig,
    pub database: DatabaseConfig,
    pub dispatch: DispatchConfig,
    pub eval: EvalConfig,
    pub tools: ToolsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Root for disk, doc and eval. Defaults to `~/.toolclaw/sandbox`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Where workflow records live. Defaults to `~/.toolclaw/workflows`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path, or `:memory:`.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Per-call timeout in seconds; 0 disables it.
    pub timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub enabled: bool,
    pub max_output_bytes: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_output_bytes: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub enabled: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: ["disk", "database", "eval", "doc", "workflow"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn home_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".toolclaw"))
}

impl AppConfig {
    pub fn config_path() -> Result<PathBuf> {
        Ok(home_dir()?.join("config.toml"))
    }

    /// Load from the default location, falling back to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path` (defaults if it does not exist), then apply
    /// environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `TOOLCLAW_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup("TOOLCLAW_SANDBOX_ROOT") {
            self.sandbox.root = Some(PathBuf::from(root));
        }
        if let Some(dir) = lookup("TOOLCLAW_WORKFLOW_DIR") {
            self.workflow.storage_dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = lookup("TOOLCLAW_DATABASE") {
            self.database.path = path;
        }
        if let Some(secs) = lookup("TOOLCLAW_TIMEOUT_SECS") {
            self.dispatch.timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("Invalid TOOLCLAW_TIMEOUT_SECS: {}", secs))?;
        }
        Ok(())
    }

    pub fn sandbox_root(&self) -> Result<PathBuf> {
        match &self.sandbox.root {
            Some(root) => Ok(root.clone()),
            None => Ok(home_dir()?.join("sandbox")),
        }
    }

    pub fn workflow_dir(&self) -> Result<PathBuf> {
        match &self.workflow.storage_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(home_dir()?.join("workflows")),
        }
    }

    /// Write the default config to `path`.
    pub fn save_default_to(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content =
            toml::to_string_pretty(&Self::default()).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn save_default() -> Result<PathBuf> {
        let config_path = Self::config_path()?;
        Self::save_default_to(&config_path)?;
        Ok(config_path)
    }
}
