//! Sequential subtask execution (SPEC_FULL §4.3): each subtask gets a
//! fresh mini `Agent`, scoped to its own output directory, wired with a
//! custom system prompt instead of the standard one. Subtasks run one at
//! a time — the runner checks the external abort signal between them,
//! not mid-subtask (SPEC_FULL §4.3's sub-agent lifecycle).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use helm_config::Workspace;
use helm_core::tools::ToolContext;
use helm_core::{Agent, AgentConfig, NullUiWriter, ProgressBus, TokenUsage};
use helm_providers::LLMProvider;
use tokio::sync::Mutex;

use crate::decompose::{self, Subtask, SubtaskStatus};

/// The handle external callers poll for probe passthrough while subtasks
/// are running (SPEC_FULL §4.3: "active_agent handle").
pub type ActiveAgent = Arc<Mutex<Agent<NullUiWriter>>>;

pub struct SubtaskRunner {
    provider: Arc<dyn LLMProvider>,
    base_ctx: ToolContext,
    progress: ProgressBus,
    model: String,
    context_limit: u32,
    iteration_cap: u32,
    active_agent: Arc<Mutex<Option<ActiveAgent>>>,
}

pub struct SubtaskRunResult {
    pub subtasks: Vec<Subtask>,
    pub final_output: String,
    pub output_dir: PathBuf,
    pub aborted: bool,
    pub total_usage: TokenUsage,
}

impl SubtaskRunner {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        base_ctx: ToolContext,
        progress: ProgressBus,
        model: String,
        context_limit: u32,
        iteration_cap: u32,
    ) -> Self {
        Self {
            provider,
            base_ctx,
            progress,
            model,
            context_limit,
            iteration_cap,
            active_agent: Arc::new(Mutex::new(None)),
        }
    }

    /// The mini-agent currently executing a subtask, if any — lets an
    /// external caller probe sub-agent state mid-run without blocking on
    /// the subtask itself.
    pub fn active_agent(&self) -> Arc<Mutex<Option<ActiveAgent>>> {
        self.active_agent.clone()
    }

    pub async fn run(
        &self,
        original_task: &str,
        mut subtasks: Vec<Subtask>,
        abort: &helm_core::AbortFlag,
    ) -> Result<SubtaskRunResult> {
        let run_dir = helm_core::paths::subtask_run_dir(
            self.base_ctx.workspace.root(),
            helm_core::paths::now_unix(),
        );
        std::fs::create_dir_all(&run_dir)?;
        let run_workspace = Arc::new(Workspace::new(run_dir.clone())?);

        let mut prior_results: Vec<(String, String)> = Vec::new();
        let mut total_usage = TokenUsage::new(self.context_limit);
        let mut aborted = false;

        for i in 0..subtasks.len() {
            if abort.is_set() {
                subtasks[i].status = SubtaskStatus::Failed;
                aborted = true;
                break;
            }

            let is_compile = subtasks[i].tool == "compile";
            let system_prompt = if is_compile {
                let subtask_outputs: Vec<String> =
                    subtasks[..i].iter().map(|s| s.output.clone()).collect();
                decompose::render_compile_system_prompt(
                    &subtask_outputs,
                    original_task,
                    &run_dir.display().to_string(),
                    &subtasks[i].output,
                )
            } else {
                decompose::render_subtask_system_prompt(
                    &subtasks[i].tool,
                    &subtasks[i].output,
                    &run_dir.display().to_string(),
                    self.context_limit,
                    &prior_results,
                )
            };

            let sub_ctx = ToolContext {
                workspace: run_workspace.clone(),
                browser: self.base_ctx.browser.clone(),
                shell_enabled: self.base_ctx.shell_enabled,
                jobs_path: self.base_ctx.jobs_path.clone(),
                job_store: self.base_ctx.job_store.clone(),
                cron_registry: self.base_ctx.cron_registry.clone(),
                progress: self.progress.clone(),
            };

            let config = AgentConfig {
                workspace: run_dir.clone(),
                model: self.model.clone(),
                context_limit: self.context_limit,
                iteration_cap: self.iteration_cap,
                session_id: format!("subtask-{}", i),
                system_prompt_override: Some(system_prompt),
            };

            let sub_agent = Arc::new(Mutex::new(Agent::new(
                config,
                self.provider.clone(),
                sub_ctx.clone(),
                self.progress.clone(),
                NullUiWriter,
            )));
            *self.active_agent.lock().await = Some(sub_agent.clone());

            subtasks[i].status = SubtaskStatus::Running;
            let started = Instant::now();

            let reply = {
                let mut agent = sub_agent.lock().await;
                agent.run(&subtasks[i].task).await
            };

            *self.active_agent.lock().await = None;

            subtasks[i].duration_secs = started.elapsed().as_secs_f64();

            match reply {
                Ok(text) => {
                    subtasks[i].status = SubtaskStatus::Done;
                    subtasks[i].result = Some(text.clone());
                    {
                        let agent = sub_agent.lock().await;
                        total_usage.prompt_tokens_cumulative += agent.usage.prompt_tokens_cumulative;
                        total_usage.completion_tokens_cumulative += agent.usage.completion_tokens_cumulative;
                    }

                    let output_path = run_dir.join(&subtasks[i].output);
                    if !output_path.exists() {
                        std::fs::write(&output_path, &text)?;
                    }

                    if !is_compile {
                        let preview: String = text.chars().take(300).collect();
                        prior_results.push((subtasks[i].output.clone(), preview));
                        let _ = helm_core::tools::dispatch(
                            "browser",
                            serde_json::json!({"action": "cleanup"}),
                            &sub_ctx,
                        )
                        .await;
                    }
                }
                Err(e) => {
                    subtasks[i].status = SubtaskStatus::Failed;
                    subtasks[i].result = Some(format!("subtask failed: {e}"));
                }
            }
        }

        let final_output = subtasks
            .iter()
            .rev()
            .find(|s| s.status == SubtaskStatus::Done)
            .and_then(|s| std::fs::read_to_string(run_dir.join(&s.output)).ok())
            .unwrap_or_default();

        Ok(SubtaskRunResult {
            subtasks,
            final_output,
            output_dir: run_dir,
            aborted,
            total_usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_providers::mock::{MockProvider, MockResponse};

    fn test_ctx(dir: &std::path::Path) -> ToolContext {
        let ws = Arc::new(Workspace::new(dir.to_path_buf()).unwrap());
        let browser_state = helm_core::tools::browser::BrowserToolState::new(0, dir.join("profile"), None);
        ToolContext {
            workspace: ws,
            browser: Arc::new(tokio::sync::Mutex::new(browser_state)),
            shell_enabled: false,
            jobs_path: dir.join("jobs.json"),
            job_store: Arc::new(tokio::sync::Mutex::new(helm_core::cron::JobStore::default())),
            cron_registry: helm_core::cron::CronRunRegistry::new(),
            progress: ProgressBus::new(),
        }
    }

    #[tokio::test]
    async fn runs_each_subtask_and_compiles_a_final_output() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new().with_responses(vec![
            MockResponse::text("step one done"),
            MockResponse::text("final compiled report"),
        ]);
        let runner = SubtaskRunner::new(
            Arc::new(provider),
            test_ctx(dir.path()),
            ProgressBus::new(),
            "mock-model".to_string(),
            128_000,
            10,
        );
        let subtasks = vec![
            Subtask {
                task: "search for widgets".to_string(),
                tool: "browser".to_string(),
                output: "step_1.md".to_string(),
                index: 0,
                total: 2,
                status: SubtaskStatus::Pending,
                result: None,
                duration_secs: 0.0,
            },
            Subtask {
                task: "compile the findings".to_string(),
                tool: "compile".to_string(),
                output: "final.md".to_string(),
                index: 1,
                total: 2,
                status: SubtaskStatus::Pending,
                result: None,
                duration_secs: 0.0,
            },
        ];
        let abort = helm_core::AbortFlag::new();
        let result = runner.run("find widgets", subtasks, &abort).await.unwrap();
        assert!(!result.aborted);
        assert_eq!(result.subtasks.len(), 2);
        assert!(result.subtasks.iter().all(|s| s.status == SubtaskStatus::Done));
        assert_eq!(result.final_output, "final compiled report");
        assert!(result.output_dir.join("step_1.md").exists());
        assert!(result.output_dir.join("final.md").exists());
    }

    #[tokio::test]
    async fn abort_flag_stops_before_the_next_subtask_starts() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new().with_response(MockResponse::text("step one done"));
        let runner = SubtaskRunner::new(
            Arc::new(provider),
            test_ctx(dir.path()),
            ProgressBus::new(),
            "mock-model".to_string(),
            128_000,
            10,
        );
        let subtasks = vec![
            Subtask {
                task: "first".to_string(),
                tool: "browser".to_string(),
                output: "step_1.md".to_string(),
                index: 0,
                total: 2,
                status: SubtaskStatus::Pending,
                result: None,
                duration_secs: 0.0,
            },
            Subtask {
                task: "second".to_string(),
                tool: "compile".to_string(),
                output: "final.md".to_string(),
                index: 1,
                total: 2,
                status: SubtaskStatus::Pending,
                result: None,
                duration_secs: 0.0,
            },
        ];
        let abort = helm_core::AbortFlag::new();
        abort.set();
        let result = runner.run("anything", subtasks, &abort).await.unwrap();
        assert!(result.aborted);
        assert_eq!(result.subtasks[0].status, SubtaskStatus::Failed);
    }
}
