//! On-disk workflow records.
//!
//! One pretty-printed JSON file per workflow, `<dir>/<id>.json`, always
//! rewritten whole: the new snapshot goes to a temp file that is fsynced
//! and then renamed over the old one. Mutators take an exclusive advisory
//! lock on `<dir>/<id>.lock` for the whole read-modify-write.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use fs2::FileExt;
use tracing::{debug, warn};

use super::Workflow;

#[derive(Debug, Clone)]
pub struct WorkflowStore {
    dir: PathBuf,
}

impl WorkflowStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create workflow directory: {}", dir.display()))?;
        debug!(?dir, "WorkflowStore::open: called");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    pub fn exists(&self, id: &str) -> bool {
        self.record_path(id).is_file()
    }

    /// Read a record; `None` if no record exists for `id`.
    pub fn load(&self, id: &str) -> Result<Option<Workflow>> {
        let path = self.record_path(id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read workflow record: {}", path.display()))
            }
        };
        let workflow = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt workflow record: {}", path.display()))?;
        Ok(Some(workflow))
    }

    /// Write the full record atomically.
    pub fn save(&self, workflow: &Workflow) -> Result<()> {
        let path = self.record_path(&workflow.id);
        let json = serde_json::to_string_pretty(workflow)?;
        atomic_write_file(&path, json.as_bytes())
            .with_context(|| format!("Failed to write workflow record: {}", path.display()))?;
        debug!(id = %workflow.id, steps = workflow.steps.len(), "WorkflowStore::save: written");
        Ok(())
    }

    /// Take the exclusive lock for `id`, blocking until it is free.
    pub fn lock(&self, id: &str) -> Result<RecordLock> {
        let path = self.dir.join(format!("{}.lock", id));
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;
        FileExt::lock_exclusive(&file)
            .with_context(|| format!("Failed to lock: {}", path.display()))?;
        Ok(RecordLock { file })
    }

    /// All readable records, newest first. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<Workflow>> {
        let mut workflows = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                let parsed = fs::read_to_string(&path)
                    .map_err(anyhow::Error::from)
                    .and_then(|content| Ok(serde_json::from_str::<Workflow>(&content)?));
                match parsed {
                    Ok(workflow) => workflows.push(workflow),
                    Err(e) => {
                        warn!(?path, error = %e, "WorkflowStore::list: skipping unreadable record")
                    }
                }
            }
        }
        workflows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(workflows)
    }
}

/// Held exclusive lock on one workflow ID; released on drop.
#[derive(Debug)]
pub struct RecordLock {
    file: fs::File,
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(error = %e, "RecordLock: unlock failed");
        }
    }
}

fn atomic_write_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other("path has no parent"))?;
    let tmp_name = format!(
        ".{}.tmp-{}-{}",
        path.file_name().and_then(|v| v.to_str()).unwrap_or("record"),
        std::process::id(),
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    );
    let tmp_path = parent.join(tmp_name);

    {
        let mut file = fs::OpenOptions::new().create_new(true).write(true).open(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    sync_parent_dir(parent)
}

#[cfg(unix)]
fn sync_parent_dir(parent: &Path) -> std::io::Result<()> {
    fs::File::open(parent)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_parent: &Path) -> std::io::Result<()> {
    Ok(())
}
