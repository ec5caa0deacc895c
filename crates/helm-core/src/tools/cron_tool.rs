//! Cron tool (SPEC_FULL §4.8): the agent-facing surface for managing
//! scheduled jobs. Actually firing jobs on schedule is the scheduler
//! loop's job (outside this module, since that needs an `Agent` to run
//! the task text); this tool only edits `JobStore` and reads
//! `CronRunRegistry`.

use serde::Deserialize;
use serde_json::Value;

use crate::cron::{CronJob, ScheduleSpec};

use super::ToolContext;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum CronAction {
    Create {
        name: String,
        task: String,
        schedule: ScheduleSpec,
    },
    List,
    Pause { id: String },
    Resume { id: String },
    Delete { id: String },
    Status { id: Option<String> },
}

pub async fn execute(args: Value, ctx: &ToolContext) -> String {
    let action: CronAction = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return format!("invalid cron tool arguments: {e}"),
    };

    match action {
        CronAction::Create { name, task, schedule } => {
            let job = CronJob {
                id: uuid::Uuid::new_v4().to_string(),
                name,
                task_text: task,
                schedule,
                paused: false,
                created: chrono::Utc::now(),
                last_fired: None,
            };
            let mut store = ctx.job_store.lock().await;
            let id = job.id.clone();
            store.jobs.insert(id.clone(), job);
            match store.save(&ctx.jobs_path) {
                Ok(()) => format!("created cron job {id}"),
                Err(e) => format!("created job {id} in memory, but failed to persist: {e}"),
            }
        }
        CronAction::List => {
            let store = ctx.job_store.lock().await;
            if store.jobs.is_empty() {
                return "no cron jobs scheduled".to_string();
            }
            let mut lines: Vec<String> = store
                .jobs
                .values()
                .map(|j| {
                    format!(
                        "{} | {} | {} | {}",
                        j.id,
                        j.name,
                        if j.paused { "paused" } else { "active" },
                        describe_schedule(&j.schedule)
                    )
                })
                .collect();
            lines.sort();
            lines.join("\n")
        }
        CronAction::Pause { id } => set_paused(ctx, &id, true).await,
        CronAction::Resume { id } => set_paused(ctx, &id, false).await,
        CronAction::Delete { id } => {
            let mut store = ctx.job_store.lock().await;
            if store.jobs.remove(&id).is_none() {
                return format!("no such cron job: {id}");
            }
            match store.save(&ctx.jobs_path) {
                Ok(()) => format!("deleted cron job {id}"),
                Err(e) => format!("deleted job {id} in memory, but failed to persist: {e}"),
            }
        }
        CronAction::Status { id } => {
            let runs = ctx.cron_registry.list().await;
            let filtered: Vec<_> = match &id {
                Some(job_id) => runs.into_iter().filter(|r| &r.job_id == job_id).collect(),
                None => runs,
            };
            if filtered.is_empty() {
                return "no recorded runs".to_string();
            }
            filtered
                .iter()
                .take(20)
                .map(|r| {
                    format!(
                        "{} | job={} | {:?} | started={}",
                        r.run_id, r.job_id, r.status, r.started
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

async fn set_paused(ctx: &ToolContext, id: &str, paused: bool) -> String {
    let mut store = ctx.job_store.lock().await;
    let Some(job) = store.jobs.get_mut(id) else {
        return format!("no such cron job: {id}");
    };
    job.paused = paused;
    match store.save(&ctx.jobs_path) {
        Ok(()) => format!("{} cron job {id}", if paused { "paused" } else { "resumed" }),
        Err(e) => format!("updated job {id} in memory, but failed to persist: {e}"),
    }
}

fn describe_schedule(schedule: &ScheduleSpec) -> String {
    match schedule {
        ScheduleSpec::Cron { expression, timezone } => {
            format!("cron '{expression}' ({})", timezone.as_deref().unwrap_or("UTC"))
        }
        ScheduleSpec::Interval { minutes } => format!("every {minutes}m"),
        ScheduleSpec::OneShot { at } => format!("once at {at}"),
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
    async fn create_then_list_then_pause_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let created = execute(
            serde_json::json!({
                "action": "create",
                "name": "daily digest",
                "task": "summarize the inbox",
                "schedule": {"type": "interval", "minutes": 60}
            }),
            &ctx,
        )
        .await;
        assert!(created.starts_with("created cron job"));
        let id = created.trim_start_matches("created cron job ").to_string();

        let listed = execute(serde_json::json!({"action": "list"}), &ctx).await;
        assert!(listed.contains("daily digest"));
        assert!(listed.contains("active"));

        let paused = execute(serde_json::json!({"action": "pause", "id": id}), &ctx).await;
        assert!(paused.starts_with("paused"));
        let listed = execute(serde_json::json!({"action": "list"}), &ctx).await;
        assert!(listed.contains("paused"));
    }

    #[tokio::test]
    async fn delete_unknown_job_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let result = execute(serde_json::json!({"action": "delete", "id": "missing"}), &ctx).await;
        assert!(result.contains("no such cron job"));
    }
}
