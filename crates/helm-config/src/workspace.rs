//! Workspace path resolution and the sandbox-escape check every file/pdf/
//! spreadsheet/shell/sub-agent-output operation is built on (SPEC_FULL §3,
//! invariant 1: the canonical form of any accepted path must have the
//! workspace's canonical form as a prefix).

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// `root` must already exist; the workspace directory's lifecycle is
    /// "created at setup, never deleted by the core" (SPEC_FULL §3).
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("creating workspace at {}", root.display()))?;
        let root = root
            .canonicalize()
            .with_context(|| format!("canonicalizing workspace root {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `relative` against the workspace and verify the result
    /// does not escape it. The path need not exist yet (write/mkdir
    /// targets): non-existent components are joined onto the *existing*
    /// canonical prefix and path-traversal (`..`) is resolved lexically
    /// before the existence check, so `../../etc/passwd` is rejected even
    /// when `/etc/passwd` exists and is readable by the process.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let candidate = self.root.join(relative);
        let lexically_normalized = normalize_lexically(&candidate);

        if !lexically_normalized.starts_with(&self.root) {
            anyhow::bail!("path escapes workspace: {relative}");
        }

        // If the path exists, canonicalize for real (resolves symlinks)
        // and re-check — a symlink inside the workspace pointing outside
        // it must still be rejected.
        if lexically_normalized.exists() {
            let canonical = lexically_normalized.canonicalize()?;
            if !canonical.starts_with(&self.root) {
                anyhow::bail!("path escapes workspace via symlink: {relative}");
            }
            return Ok(canonical);
        }

        Ok(lexically_normalized)
    }

    pub fn context_dumps_dir(&self) -> PathBuf {
        self.root.join("context_dumps")
    }

    pub fn subtask_runs_dir(&self) -> PathBuf {
        self.root.join("subtask_runs")
    }

    pub fn cron_logs_dir(&self) -> PathBuf {
        self.root.join(".cron_logs")
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_accepts_path_inside_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path()).unwrap();
        let resolved = ws.resolve("notes.txt").unwrap();
        assert!(resolved.starts_with(ws.root()));
    }

    #[test]
    fn resolve_rejects_traversal_escape() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path()).unwrap();
        assert!(ws.resolve("../../etc/passwd").is_err());
    }

    #[test]
    fn resolve_rejects_absolute_escape_disguised_as_relative() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path()).unwrap();
        assert!(ws.resolve("a/../../b").is_err());
    }

    #[test]
    fn resolve_accepts_nested_nonexistent_path() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path()).unwrap();
        let resolved = ws.resolve("sub/dir/new_file.txt").unwrap();
        assert!(resolved.starts_with(ws.root()));
    }
}
