//! Scheduler and cron runs (SPEC_FULL §4.8): job store, in-process
//! scheduler, capped per-run event log + history pruning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::progress::ProgressEvent;

pub const MAX_EVENT_LOG: usize = 200;
pub const MAX_CRON_HISTORY: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleSpec {
    /// 5-field cron expression plus an optional IANA timezone name.
    Cron { expression: String, timezone: Option<String> },
    /// Fires every `minutes` minutes.
    Interval { minutes: u64 },
    /// Fires exactly once at `at`.
    OneShot { at: chrono::DateTime<chrono::Utc> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    pub id: String,
    pub name: String,
    pub task_text: String,
    pub schedule: ScheduleSpec,
    pub paused: bool,
    pub created: chrono::DateTime<chrono::Utc>,
    /// Tracked so a one-shot job can be pruned, and so the scheduler
    /// doesn't double-fire a job within the same tick.
    #[serde(default)]
    pub last_fired: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CronRunStatus {
    Running,
    Done,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronRun {
    pub run_id: String,
    pub job_id: String,
    pub status: CronRunStatus,
    pub started: chrono::DateTime<chrono::Utc>,
    pub ended: Option<chrono::DateTime<chrono::Utc>>,
    /// Capped at `MAX_EVENT_LOG` entries to bound memory.
    pub event_log: Vec<String>,
    pub result: Option<String>,
}

impl CronRun {
    pub fn push_event(&mut self, event: impl Into<String>) {
        if self.event_log.len() >= MAX_EVENT_LOG {
            self.event_log.remove(0);
        }
        self.event_log.push(event.into());
    }
}

/// `~/.helm/jobs.json`: a single map of job_id -> CronJob.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct JobStore {
    pub jobs: HashMap<String, CronJob>,
}

impl JobStore {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn next_cron_fire(expression: &str, timezone: &Option<String>, after: chrono::DateTime<chrono::Utc>) -> Option<chrono::DateTime<chrono::Utc>> {
    use cron::Schedule;
    use std::str::FromStr;
    // The `cron` crate expects a 6-field (with seconds) expression; prefix
    // a `0` seconds field if a bare 5-field minute/hour/day/month/weekday
    // expression was given (SPEC_FULL / spec.md §3's `CronJob.schedule_spec`).
    let normalized = if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    };
    let schedule = Schedule::from_str(&normalized).ok()?;
    if let Some(tz_name) = timezone {
        let tz: chrono_tz::Tz = tz_name.parse().ok()?;
        let after_tz = after.with_timezone(&tz);
        schedule.after(&after_tz).next().map(|d| d.with_timezone(&chrono::Utc))
    } else {
        schedule.after(&after).next()
    }
}

impl CronJob {
    /// Whether this job should fire now, given `now` and its own
    /// `last_fired` bookkeeping.
    pub fn is_due(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        if self.paused {
            return false;
        }
        match &self.schedule {
            ScheduleSpec::Cron { expression, timezone } => {
                let since = self.last_fired.unwrap_or(self.created);
                match next_cron_fire(expression, timezone, since) {
                    Some(next) => next <= now,
                    None => false,
                }
            }
            ScheduleSpec::Interval { minutes } => {
                let since = self.last_fired.unwrap_or(self.created);
                now - since >= chrono::Duration::minutes(*minutes as i64)
            }
            ScheduleSpec::OneShot { at } => self.last_fired.is_none() && *at <= now,
        }
    }

    pub fn is_one_shot_spent(&self) -> bool {
        matches!(self.schedule, ScheduleSpec::OneShot { .. }) && self.last_fired.is_some()
    }
}

/// Process-wide map of cron runs, protected by a mutex (SPEC_FULL §5).
/// Listing copies contents out under the lock before stripping
/// non-serializable fields (there are none here — `CronRun` is already
/// fully serializable — but the copy-then-release discipline is kept so
/// the lock is never held across an await).
pub struct CronRunRegistry {
    runs: Mutex<HashMap<String, CronRun>>,
}

impl CronRunRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            runs: Mutex::new(HashMap::new()),
        })
    }

    pub async fn start(&self, run_id: String, job_id: String) {
        let mut runs = self.runs.lock().await;
        runs.insert(
            run_id.clone(),
            CronRun {
                run_id,
                job_id,
                status: CronRunStatus::Running,
                started: chrono::Utc::now(),
                ended: None,
                event_log: Vec::new(),
                result: None,
            },
        );
        self.prune_locked(&mut runs);
    }

    pub async fn push_event(&self, run_id: &str, event: impl Into<String>) {
        let mut runs = self.runs.lock().await;
        if let Some(run) = runs.get_mut(run_id) {
            run.push_event(event);
        }
    }

    pub async fn finish(&self, run_id: &str, status: CronRunStatus, result: Option<String>) {
        let mut runs = self.runs.lock().await;
        if let Some(run) = runs.get_mut(run_id) {
            run.status = status;
            run.ended = Some(chrono::Utc::now());
            run.result = result;
        }
    }

    pub async fn list(&self) -> Vec<CronRun> {
        let runs = self.runs.lock().await;
        let mut out: Vec<CronRun> = runs.values().cloned().collect();
        out.sort_by(|a, b| b.started.cmp(&a.started));
        out
    }

    fn prune_locked(&self, runs: &mut HashMap<String, CronRun>) {
        if runs.len() <= MAX_CRON_HISTORY {
            return;
        }
        let mut completed: Vec<(String, chrono::DateTime<chrono::Utc>)> = runs
            .iter()
            .filter(|(_, r)| r.status != CronRunStatus::Running)
            .map(|(id, r)| (id.clone(), r.started))
            .collect();
        completed.sort_by_key(|(_, started)| *started);
        while runs.len() > MAX_CRON_HISTORY {
            let Some((oldest_id, _)) = completed.first().cloned() else {
                break;
            };
            runs.remove(&oldest_id);
            completed.remove(0);
        }
    }
}

/// One scheduled fire: writes a log file, records a `CronRun`, and
/// broadcasts the start/done/error transitions. The actual agent
/// execution is supplied by the caller as `run_task` so this module
/// doesn't depend on `Agent` directly (breaks a dependency cycle, since
/// `Agent` lives in this same crate but above `cron` in the build order).
pub async fn fire_job(
    job: &CronJob,
    workspace: &Path,
    registry: &CronRunRegistry,
    progress: &crate::progress::ProgressBus,
    run_task: impl std::future::Future<Output = Result<String>>,
) -> PathBuf {
    let run_id = uuid::Uuid::new_v4().to_string();
    registry.start(run_id.clone(), job.id.clone()).await;
    progress.publish(ProgressEvent::CronRunStart {
        run_id: run_id.clone(),
        job_id: job.id.clone(),
    });

    let log_path = crate::paths::cron_log_file(workspace, &run_id);
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    match run_task.await {
        Ok(result) => {
            std::fs::write(&log_path, &result).ok();
            registry.finish(&run_id, CronRunStatus::Done, Some(result)).await;
            progress.publish(ProgressEvent::CronRunDone {
                run_id: run_id.clone(),
                job_id: job.id.clone(),
            });
        }
        Err(err) => {
            let error_path = crate::paths::cron_error_log_file(workspace, &run_id);
            std::fs::write(&error_path, err.to_string()).ok();
            registry.finish(&run_id, CronRunStatus::Error, Some(err.to_string())).await;
            progress.publish(ProgressEvent::CronRunError {
                run_id: run_id.clone(),
                job_id: job.id.clone(),
                error: err.to_string(),
            });
        }
    }
    log_path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_due_exactly_once() {
        let job = CronJob {
            id: "j1".into(),
            name: "n".into(),
            task_text: "t".into(),
            schedule: ScheduleSpec::OneShot { at: chrono::Utc::now() - chrono::Duration::seconds(1) },
            paused: false,
            created: chrono::Utc::now(),
            last_fired: None,
        };
        assert!(job.is_due(chrono::Utc::now()));
        let mut fired = job.clone();
        fired.last_fired = Some(chrono::Utc::now());
        assert!(!fired.is_due(chrono::Utc::now()));
        assert!(fired.is_one_shot_spent());
    }

    #[test]
    fn interval_due_after_elapsed_minutes() {
        let job = CronJob {
            id: "j2".into(),
            name: "n".into(),
            task_text: "t".into(),
            schedule: ScheduleSpec::Interval { minutes: 5 },
            paused: false,
            created: chrono::Utc::now() - chrono::Duration::minutes(10),
            last_fired: None,
        };
        assert!(job.is_due(chrono::Utc::now()));
    }

    #[test]
    fn paused_job_is_never_due() {
        let job = CronJob {
            id: "j3".into(),
            name: "n".into(),
            task_text: "t".into(),
            schedule: ScheduleSpec::Interval { minutes: 1 },
            paused: true,
            created: chrono::Utc::now() - chrono::Duration::hours(1),
            last_fired: None,
        };
        assert!(!job.is_due(chrono::Utc::now()));
    }

    #[test]
    fn job_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let mut store = JobStore::default();
        store.jobs.insert(
            "j1".into(),
            CronJob {
                id: "j1".into(),
                name: "daily report".into(),
                task_text: "summarize inbox".into(),
                schedule: ScheduleSpec::Interval { minutes: 60 },
                paused: false,
                created: chrono::Utc::now(),
                last_fired: None,
            },
        );
        store.save(&path).unwrap();
        let loaded = JobStore::load(&path).unwrap();
        assert_eq!(loaded.jobs.len(), 1);
    }

    #[tokio::test]
    async fn run_registry_prunes_beyond_max_history() {
        let registry = CronRunRegistry::new();
        for i in 0..(MAX_CRON_HISTORY + 10) {
            let run_id = format!("r{i}");
            registry.start(run_id.clone(), "job".into()).await;
            registry.finish(&run_id, CronRunStatus::Done, None).await;
        }
        let list = registry.list().await;
        assert!(list.len() <= MAX_CRON_HISTORY);
    }
}
