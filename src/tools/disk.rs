//! Disk tool implementation.
//!
//! Exposes file and directory operations over a `FileSystemDriver`.
//! The shipped driver, `LocalFileSystem`, runs every path through the
//! `Sandbox` before touching the disk; a path that escapes surfaces as a
//! `SecurityViolation` from `Tool::execute`.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::action::{decode, ActionSet, ActionSpec, ParamKind, ParamSpec};
use super::dispatch::Dispatcher;
use super::sandbox::Sandbox;
use super::Tool;
use crate::error::{ActionFailure, ToolError};

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
}

/// Capability contract for filesystem backends.
///
/// Paths are caller-supplied and relative to the backend's root.
#[async_trait]
pub trait FileSystemDriver: Send + Sync {
    /// Create an empty file. Fails if something already exists there.
    async fn create(&self, path: &str) -> Result<()>;

    async fn read(&self, path: &str) -> Result<String>;

    /// Write `content`, creating the file and missing parents.
    /// Returns the number of bytes written.
    async fn write(&self, path: &str, content: &str) -> Result<u64>;

    /// Delete a file.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Move a file or directory to `destination`, which must not exist.
    async fn move_path(&self, path: &str, destination: &str) -> Result<()>;

    /// Entries of a directory, sorted by name.
    async fn list(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Create a directory and its missing parents.
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Remove an empty directory.
    async fn rmdir(&self, path: &str) -> Result<()>;
}

/// Filesystem driver confined to a sandbox root.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    sandbox: Sandbox,
}

impl LocalFileSystem {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    /// Open a driver rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::new(Sandbox::new(root)?))
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }
}

#[async_trait]
impl FileSystemDriver for LocalFileSystem {
    async fn create(&self, path: &str) -> Result<()> {
        let target = self.sandbox.resolve(path)?;
        debug!(?target, "LocalFileSystem::create: called");
        tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
            .with_context(|| format!("Failed to create file: {}", path))?;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<String> {
        let target = self.sandbox.resolve(path)?;
        debug!(?target, "LocalFileSystem::read: called");
        tokio::fs::read_to_string(&target)
            .await
            .with_context(|| format!("Failed to read file: {}", path))
    }

    async fn write(&self, path: &str, content: &str) -> Result<u64> {
        let target = self.sandbox.resolve(path)?;
        debug!(?target, bytes = content.len(), "LocalFileSystem::write: called");

        // Create directory if it doesn't exist
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory for: {}", path))?;
        }

        tokio::fs::write(&target, content)
            .await
            .with_context(|| format!("Failed to write file: {}", path))?;
        Ok(content.len() as u64)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let target = self.sandbox.resolve_entry(path)?;
        debug!(?target, "LocalFileSystem::delete: called");
        let metadata = tokio::fs::symlink_metadata(&target)
            .await
            .with_context(|| format!("Failed to delete: {}", path))?;
        if metadata.is_dir() {
            bail!("{} is a directory; use rmdir", path);
        }
        tokio::fs::remove_file(&target)
            .await
            .with_context(|| format!("Failed to delete: {}", path))
    }

    async fn move_path(&self, path: &str, destination: &str) -> Result<()> {
        // Both ends are checked before anything moves.
        let source = self.sandbox.resolve_entry(path)?;
        let target = self.sandbox.resolve_entry(destination)?;
        debug!(?source, ?target, "LocalFileSystem::move_path: called");

        if tokio::fs::symlink_metadata(&target).await.is_ok() {
            bail!("Destination already exists: {}", destination);
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory for: {}", destination))?;
        }
        tokio::fs::rename(&source, &target)
            .await
            .with_context(|| format!("Failed to move {} to {}", path, destination))
    }

    async fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        let target = self.sandbox.resolve(path)?;
        debug!(?target, "LocalFileSystem::list: called");

        let mut reader = tokio::fs::read_dir(&target)
            .await
            .with_context(|| format!("Failed to read directory: {}", display_path(path)))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let metadata = tokio::fs::symlink_metadata(entry.path()).await?;
            let kind = if metadata.file_type().is_symlink() {
                EntryKind::Symlink
            } else if metadata.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                kind,
                size: if kind == EntryKind::Directory { 0 } else { metadata.len() },
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let target = self.sandbox.resolve(path)?;
        debug!(?target, "LocalFileSystem::mkdir: called");
        tokio::fs::create_dir_all(&target)
            .await
            .with_context(|| format!("Failed to create directory: {}", path))
    }

    async fn rmdir(&self, path: &str) -> Result<()> {
        let target = self.sandbox.resolve_entry(path)?;
        debug!(?target, "LocalFileSystem::rmdir: called");
        tokio::fs::remove_dir(&target)
            .await
            .with_context(|| format!("Failed to remove directory: {}", path))
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "."
    } else {
        path
    }
}

pub static DISK_ACTIONS: ActionSet = ActionSet {
    tool: "disk",
    params: &[
        ParamSpec {
            name: "path",
            kind: ParamKind::String,
            description: "Path relative to the sandbox root",
        },
        ParamSpec {
            name: "content",
            kind: ParamKind::String,
            description: "Text content to write",
        },
        ParamSpec {
            name: "destination",
            kind: ParamKind::String,
            description: "Target path for move, relative to the sandbox root",
        },
    ],
    actions: &[
        ActionSpec {
            name: "create",
            description: "Create an empty file",
            required: &["path"],
            optional: &[],
        },
        ActionSpec {
            name: "read",
            description: "Read a text file",
            required: &["path"],
            optional: &[],
        },
        ActionSpec {
            name: "write",
            description: "Write a text file, replacing existing content",
            required: &["path", "content"],
            optional: &[],
        },
        ActionSpec {
            name: "delete",
            description: "Delete a file",
            required: &["path"],
            optional: &[],
        },
        ActionSpec {
            name: "move",
            description: "Move or rename a file or directory",
            required: &["path", "destination"],
            optional: &[],
        },
        ActionSpec {
            name: "list",
            description: "List a directory (defaults to the sandbox root)",
            required: &[],
            optional: &["path"],
        },
        ActionSpec {
            name: "mkdir",
            description: "Create a directory and missing parents",
            required: &["path"],
            optional: &[],
        },
        ActionSpec {
            name: "rmdir",
            description: "Remove an empty directory",
            required: &["path"],
            optional: &[],
        },
    ],
};

#[derive(Debug, Deserialize)]
struct PathParams {
    path: String,
}

#[derive(Debug, Deserialize)]
struct WriteParams {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MoveParams {
    path: String,
    destination: String,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default)]
    path: Option<String>,
}

/// Facade over a filesystem driver.
pub struct DiskTool {
    driver: Arc<dyn FileSystemDriver>,
    dispatcher: Dispatcher,
}

impl DiskTool {
    pub fn new(driver: Arc<dyn FileSystemDriver>, dispatcher: Dispatcher) -> Self {
        Self { driver, dispatcher }
    }
}

#[async_trait]
impl Tool for DiskTool {
    fn description(&self) -> &str {
        "Work with files inside the sandbox directory: create, read, write, \
         delete, move, list, mkdir and rmdir. All paths are relative to the \
         sandbox root and may not leave it."
    }

    fn actions(&self) -> &'static ActionSet {
        &DISK_ACTIONS
    }

    fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    async fn perform(&self, action: &'static str, params: Value) -> Result<Value, ToolError> {
        match action {
            "create" => {
                let p: PathParams = decode(action, params)?;
                self.driver.create(&p.path).await?;
                Ok(json!({ "path": p.path, "created": true }))
            }
            "read" => {
                let p: PathParams = decode(action, params)?;
                let content = self.driver.read(&p.path).await?;
                Ok(json!({ "path": p.path, "content": content, "bytes": content.len() }))
            }
            "write" => {
                let p: WriteParams = decode(action, params)?;
                let bytes = self.driver.write(&p.path, &p.content).await?;
                Ok(json!({ "path": p.path, "bytes_written": bytes }))
            }
            "delete" => {
                let p: PathParams = decode(action, params)?;
                self.driver.delete(&p.path).await?;
                Ok(json!({ "path": p.path, "deleted": true }))
            }
            "move" => {
                let p: MoveParams = decode(action, params)?;
                self.driver.move_path(&p.path, &p.destination).await?;
                Ok(json!({ "path": p.path, "destination": p.destination, "moved": true }))
            }
            "list" => {
                let p: ListParams = decode(action, params)?;
                let path = p.path.unwrap_or_default();
                let entries = self.driver.list(&path).await?;
                Ok(json!({
                    "path": display_path(&path),
                    "count": entries.len(),
                    "entries": entries,
                }))
            }
            "mkdir" => {
                let p: PathParams = decode(action, params)?;
                self.driver.mkdir(&p.path).await?;
                Ok(json!({ "path": p.path, "created": true }))
            }
            "rmdir" => {
                let p: PathParams = decode(action, params)?;
                self.driver.rmdir(&p.path).await?;
                Ok(json!({ "path": p.path, "removed": true }))
            }
            other => Err(ActionFailure::unsupported_action(
                self.name(),
                other,
                &DISK_ACTIONS.names(),
            )
            .into()),
        }
    }
}
