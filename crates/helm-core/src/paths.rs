//! Workspace-relative path constants (SPEC_FULL §6: persisted-state paths).

use std::path::{Path, PathBuf};

pub fn context_dumps_dir(workspace: &Path) -> PathBuf {
    workspace.join("context_dumps")
}

pub fn subtask_runs_dir(workspace: &Path) -> PathBuf {
    workspace.join("subtask_runs")
}

pub fn cron_logs_dir(workspace: &Path) -> PathBuf {
    workspace.join(".cron_logs")
}

/// `<workspace>/context_dumps/dump_<unix_ts>.md`
pub fn dump_file(workspace: &Path, unix_ts: u64) -> PathBuf {
    context_dumps_dir(workspace).join(format!("dump_{unix_ts}.md"))
}

/// `<workspace>/subtask_runs/run_<unix_ts>/`
pub fn subtask_run_dir(workspace: &Path, unix_ts: u64) -> PathBuf {
    subtask_runs_dir(workspace).join(format!("run_{unix_ts}"))
}

pub fn cron_log_file(workspace: &Path, run_id: &str) -> PathBuf {
    cron_logs_dir(workspace).join(format!("{run_id}.log"))
}

pub fn cron_error_log_file(workspace: &Path, run_id: &str) -> PathBuf {
    cron_logs_dir(workspace).join(format!("{run_id}_error.log"))
}

pub fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
