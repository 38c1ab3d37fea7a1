//! Filesystem sandbox.
//!
//! Confines every path-bearing operation to a root directory fixed when
//! the driver is built. Resolution happens before any I/O that could
//! mutate the filesystem:
//!
//! 1. the caller's path is joined onto the root (an absolute path replaces
//!    the root and is then checked like any other)
//! 2. `.` and `..` segments are folded lexically
//! 3. the result must lie under the root
//! 4. symlinks along the deepest existing prefix are resolved and the real
//!    location must still lie under the root

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::error::SecurityViolation;

/// Upper bound on dangling-symlink hops followed while resolving.
const MAX_LINK_HOPS: usize = 32;

#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Create the root if needed and pin its canonical form.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create sandbox root: {}", root.display()))?;
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to canonicalize sandbox root: {}", root.display()))?;
        debug!(?root, "Sandbox::new: called");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` to a location at or below the root.
    ///
    /// An empty path or `.` resolves to the root itself.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, SecurityViolation> {
        let lexical = normalize(&self.root.join(path));

        if !lexical.starts_with(&self.root) {
            warn!(%path, root = ?self.root, "Sandbox::resolve: path escapes root");
            return Err(self.violation(path));
        }

        let real = resolve_links(&lexical);
        if !real.starts_with(&self.root) {
            warn!(%path, ?real, "Sandbox::resolve: symlink escapes root");
            return Err(self.violation(path));
        }

        Ok(lexical)
    }

    /// Like `resolve`, but the root itself is rejected too.
    ///
    /// Used by operations that would remove or replace their target.
    pub fn resolve_entry(&self, path: &str) -> Result<PathBuf, SecurityViolation> {
        let resolved = self.resolve(path)?;
        if resolved == self.root {
            warn!(%path, "Sandbox::resolve_entry: refusing to touch the root");
            return Err(self.violation(path));
        }
        Ok(resolved)
    }

    /// Display form of a resolved path, relative to the root.
    pub fn relative(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel.display().to_string(),
            Err(_) => path.display().to_string(),
        }
    }

    fn violation(&self, path: &str) -> SecurityViolation {
        SecurityViolation {
            path: path.to_string(),
            root: self.root.clone(),
        }
    }
}

/// Fold `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Real location of `path`: canonicalize the deepest existing prefix and
/// re-append the part that does not exist yet. Dangling symlinks are
/// followed to their target.
fn resolve_links(path: &Path) -> PathBuf {
    let mut current = path.to_path_buf();
    let mut rest: Vec<OsString> = Vec::new();
    let mut hops = 0;

    loop {
        if let Ok(canonical) = current.canonicalize() {
            return rejoin(canonical, &rest);
        }

        if hops < MAX_LINK_HOPS {
            if let Ok(target) = std::fs::read_link(&current) {
                hops += 1;
                let base = current.parent().map(Path::to_path_buf).unwrap_or_default();
                current = normalize(&base.join(target));
                continue;
            }
        }

        match current.file_name().map(|name| name.to_os_string()) {
            Some(name) => {
                rest.push(name);
                current.pop();
            }
            None => return rejoin(current, &rest),
        }
    }
}

fn rejoin(mut base: PathBuf, rest: &[OsString]) -> PathBuf {
    for part in rest.iter().rev() {
        base.push(part);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn sandbox() -> (tempfile::TempDir, Sandbox) {
        let temp = tempdir().unwrap();
        let sandbox = Sandbox::new(temp.path().join("root")).unwrap();
        (temp, sandbox)
    }

    #[test]
    fn test_root_is_created_and_canonical() {
        let (_temp, sandbox) = sandbox();
        assert!(sandbox.root().is_dir());
        assert!(sandbox.root().is_absolute());
    }

    #[test]
    fn test_relative_path_inside() {
        let (_temp, sandbox) = sandbox();
        let resolved = sandbox.resolve("notes/today.txt").unwrap();
        assert_eq!(resolved, sandbox.root().join("notes/today.txt"));
        assert_eq!(sandbox.relative(&resolved), "notes/today.txt");
    }

    #[test]
    fn test_empty_and_dot_resolve_to_root() {
        let (_temp, sandbox) = sandbox();
        assert_eq!(sandbox.resolve("").unwrap(), sandbox.root());
        assert_eq!(sandbox.resolve(".").unwrap(), sandbox.root());
        assert_eq!(sandbox.relative(sandbox.root()), ".");
    }

    #[test]
    fn test_inner_parent_segments_allowed() {
        let (_temp, sandbox) = sandbox();
        let resolved = sandbox.resolve("a/b/../c.txt").unwrap();
        assert_eq!(resolved, sandbox.root().join("a/c.txt"));
    }

    #[test]
    fn test_parent_escape_rejected() {
        let (_temp, sandbox) = sandbox();
        let err = sandbox.resolve("../../etc/passwd").unwrap_err();
        assert_eq!(err.path, "../../etc/passwd");
        assert!(sandbox.resolve("a/../../outside").is_err());
    }

    #[test]
    fn test_absolute_path_rejected() {
        let (_temp, sandbox) = sandbox();
        assert!(sandbox.resolve("/etc/passwd").is_err());
    }

    #[test]
    fn test_sibling_with_common_prefix_rejected() {
        let (temp, sandbox) = sandbox();
        fs::create_dir(temp.path().join("root-evil")).unwrap();
        assert!(sandbox.resolve("../root-evil/x").is_err());
    }

    #[test]
    fn test_resolve_entry_rejects_root() {
        let (_temp, sandbox) = sandbox();
        assert!(sandbox.resolve_entry(".").is_err());
        assert!(sandbox.resolve_entry("a/..").is_err());
        assert!(sandbox.resolve_entry("a").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let (temp, sandbox) = sandbox();
        let outside = temp.path().join("outside");
        fs::create_dir(&outside).unwrap();
        fs::write(outside.join("secret.txt"), "s").unwrap();
        std::os::unix::fs::symlink(&outside, sandbox.root().join("link")).unwrap();

        assert!(sandbox.resolve("link/secret.txt").is_err());
        assert!(sandbox.resolve("link/new.txt").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_escape_rejected() {
        let (temp, sandbox) = sandbox();
        let target = temp.path().join("not-yet.txt");
        std::os::unix::fs::symlink(&target, sandbox.root().join("dangling")).unwrap();

        assert!(sandbox.resolve("dangling").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_inside_root_allowed() {
        let (_temp, sandbox) = sandbox();
        fs::create_dir(sandbox.root().join("real")).unwrap();
        let root = sandbox.root();
        std::os::unix::fs::symlink(root.join("real"), root.join("alias")).unwrap();

        let resolved = sandbox.resolve("alias/file.txt").unwrap();
        assert_eq!(resolved, sandbox.root().join("alias/file.txt"));
    }
}
