//! Shell tool (SPEC_FULL §4.5): runs one command string via the OS shell
//! with the workspace as the working directory. Globally disablable via
//! `AgentConfig::shell_enabled` (checked by the caller in
//! `tools::dispatch`, not here).

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;

use super::ToolContext;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const OUTPUT_CAP_BYTES: usize = 10 * 1024;

#[derive(Debug, Deserialize)]
struct ShellArgs {
    command: String,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

pub async fn execute(args: Value, ctx: &ToolContext) -> String {
    let parsed: ShellArgs = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return format!("invalid shell tool arguments: {e}"),
    };
    let timeout = Duration::from_secs(parsed.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));

    let shell = if cfg!(windows) { "cmd" } else { "sh" };
    let shell_flag = if cfg!(windows) { "/C" } else { "-c" };

    let mut command = Command::new(shell);
    command
        .arg(shell_flag)
        .arg(&parsed.command)
        .current_dir(ctx.workspace.root())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    let child = match command.spawn() {
        Ok(c) => c,
        Err(e) => return format!("failed to spawn shell: {e}"),
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.is_empty() {
                combined.push_str("\n[stderr]\n");
                combined.push_str(&stderr);
            }
            let combined = if combined.len() > OUTPUT_CAP_BYTES {
                let mut truncated: String = combined.chars().take(OUTPUT_CAP_BYTES).collect();
                truncated.push_str("\n[truncated]");
                truncated
            } else {
                combined
            };
            format!(
                "exit code: {}\n{combined}",
                output.status.code().unwrap_or(-1)
            )
        }
        Ok(Err(e)) => format!("shell command failed: {e}"),
        Err(_) => format!("shell command timed out after {}s", timeout.as_secs()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron::{CronRunRegistry, JobStore};
    use crate::progress::ProgressBus;
    use crate::tools::browser::BrowserToolState;
    use std::sync::Arc;

    fn context(ws_root: &std::path::Path) -> ToolContext {
        ToolContext {
            workspace: Arc::new(helm_config::Workspace::new(ws_root).unwrap()),
            browser: Arc::new(tokio::sync::Mutex::new(BrowserToolState::new(9222, ws_root.join("profile"), None))),
            shell_enabled: true,
            jobs_path: ws_root.join("jobs.json"),
            job_store: Arc::new(tokio::sync::Mutex::new(JobStore::default())),
            cron_registry: CronRunRegistry::new(),
            progress: ProgressBus::new(),
        }
    }

    #[tokio::test]
    async fn echo_returns_stdout_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let result = execute(serde_json::json!({"command": "echo hi"}), &ctx).await;
        assert!(result.contains("exit code: 0"));
        assert!(result.contains("hi"));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let result = execute(serde_json::json!({"command": "sleep 2", "timeout_secs": 1}), &ctx).await;
        assert!(result.contains("timed out"));
    }
}
