//! The Agent Loop (SPEC_FULL §4.2): a turn-taking executor that drives an
//! LLM through a provider-agnostic streaming interface, dispatches every
//! tool call it requests, keeps context pressure bounded via proactive
//! compaction, and never crashes the process on provider or tool
//! misbehaviour (SPEC_FULL §7) — every path through `run` returns a
//! `String`, not a panic.

pub mod compaction;
pub mod context_window;
pub mod cron;
pub mod fallback_parser;
pub mod message;
pub mod paths;
pub mod progress;
pub mod prompts;
pub mod session;
pub mod tools;
pub mod ui_writer;

pub use context_window::{context_limit_for_model, PressureLevel, TokenUsage};
pub use message::{Message, MessageRole, ToolCallRequest};
pub use progress::{ContextWarningLevel, ProgressBus, ProgressEvent, SubtaskPhase};
pub use session::{list_sessions, Session, SessionMetadata};
pub use ui_writer::{NullUiWriter, UiWriter};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use anyhow::Result;
use helm_providers::{CompletionRequest, LLMProvider};
use tokio_stream::StreamExt;

use tools::ToolContext;

/// Default configurable iteration cap (SPEC_FULL §4.2). Configuring a
/// higher value is allowed up to [`ITERATION_CAP_CEILING`]; values above
/// that are clamped down to it.
pub const DEFAULT_ITERATION_CAP: u32 = 50;
pub const ITERATION_CAP_CEILING: u32 = 500;

/// Clamps a configured iteration cap to `(0, ITERATION_CAP_CEILING]`,
/// falling back to [`DEFAULT_ITERATION_CAP`] when unset.
pub fn resolve_iteration_cap(configured: Option<u32>) -> u32 {
    match configured {
        Some(0) | None => DEFAULT_ITERATION_CAP,
        Some(n) => n.min(ITERATION_CAP_CEILING),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Starting,
    CallingLlm,
    ToolCall,
    Decomposing,
    RunningSubtasks,
    Flushed,
    Done,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentProbe {
    pub phase: Phase,
    pub iteration: u32,
    pub last_tool: Option<String>,
    pub elapsed_secs: f64,
    pub message_count: usize,
    pub usage: TokenUsage,
}

struct ProbeState {
    phase: Phase,
    phase_started_at: Instant,
    last_tool: Option<String>,
}

/// Static configuration an `Agent` is built from (SPEC_FULL §6's `agent`
/// config block, narrowed to what the loop itself needs).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub workspace: PathBuf,
    pub model: String,
    pub context_limit: u32,
    pub iteration_cap: u32,
    pub session_id: String,
    /// A sub-agent (SPEC_FULL §4.3) overrides the rendered system prompt
    /// entirely instead of interpolating the standard template.
    pub system_prompt_override: Option<String>,
}

enum TurnOutcome {
    Continue,
    Final(String),
    Aborted(String),
    IterationCapReached(String),
}

/// A single structured LLM call result, built identically whether the
/// underlying provider streamed a response (the only path this loop
/// uses — SPEC_FULL §4.2 says streaming is always enabled) — see the
/// REDESIGN FLAGS' `LLMCallResult` note.
struct LLMCallResult {
    text: String,
    tool_calls: Vec<helm_providers::ToolCall>,
    usage: Option<helm_providers::Usage>,
}

/// Drives one multi-turn tool-calling conversation. Not `Clone`able or
/// `Sync`-shareable by itself — callers that need cross-thread abort/probe
/// access wrap it in `Arc<tokio::sync::Mutex<Agent<W>>>` the way
/// `helm-planner`'s subtask runner does, and hold the cheap `AbortFlag`
/// clone separately for a lock-free abort signal.
pub struct Agent<W: UiWriter> {
    pub config: AgentConfig,
    provider: Arc<dyn LLMProvider>,
    tool_ctx: ToolContext,
    progress: ProgressBus,
    ui: W,
    pub history: Vec<Message>,
    pub usage: TokenUsage,
    iteration: u32,
    abort: AbortFlag,
    abort_dump_done: AtomicBool,
    probe_state: RwLock<ProbeState>,
}

/// A cheap, `Clone`+`Send`+`Sync` handle that flips an agent's abort
/// signal without needing to lock the agent itself (REDESIGN FLAGS §9:
/// replaces a bare polled `_abort` boolean with an explicit token).
#[derive(Clone)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for AbortFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: UiWriter> Agent<W> {
    pub fn new(
        config: AgentConfig,
        provider: Arc<dyn LLMProvider>,
        tool_ctx: ToolContext,
        progress: ProgressBus,
        ui: W,
    ) -> Self {
        let usage = TokenUsage::new(config.context_limit);
        Self {
            config,
            provider,
            tool_ctx,
            progress,
            ui,
            history: Vec::new(),
            usage,
            iteration: 0,
            abort: AbortFlag::new(),
            abort_dump_done: AtomicBool::new(false),
            probe_state: RwLock::new(ProbeState {
                phase: Phase::Starting,
                phase_started_at: Instant::now(),
                last_tool: None,
            }),
        }
    }

    pub fn abort_flag(&self) -> AbortFlag {
        self.abort.clone()
    }

    pub fn progress_bus(&self) -> ProgressBus {
        self.progress.clone()
    }

    fn set_phase(&self, phase: Phase) {
        let mut state = self.probe_state.write().unwrap();
        state.phase = phase;
        state.phase_started_at = Instant::now();
    }

    fn set_last_tool(&self, tool: Option<String>) {
        self.probe_state.write().unwrap().last_tool = tool;
    }

    /// Read-only snapshot of agent state, callable at any point without
    /// interrupting an in-flight turn (SPEC_FULL §4.2 "Probe").
    pub fn probe(&self) -> AgentProbe {
        let state = self.probe_state.read().unwrap();
        AgentProbe {
            phase: state.phase,
            iteration: self.iteration,
            last_tool: state.last_tool.clone(),
            elapsed_secs: state.phase_started_at.elapsed().as_secs_f64(),
            message_count: self.history.len(),
            usage: self.usage,
        }
    }

    fn system_prompt(&self) -> String {
        match &self.config.system_prompt_override {
            Some(custom) => custom.clone(),
            None => prompts::render_system_prompt(
                &self.config.workspace.display().to_string(),
                self.config.context_limit,
                &self.usage,
            ),
        }
    }

    /// Runs the context-compaction procedure right now, with `reason`
    /// (SPEC_FULL §4.2). Does nothing and returns `None` if the history
    /// is already empty.
    fn compact_now(&mut self, reason: &str) -> Result<Option<PathBuf>> {
        if self.history.is_empty() {
            return Ok(None);
        }
        let dump_path = compaction::compact(
            &self.config.workspace,
            paths::now_unix(),
            reason,
            &self.config.model,
            &mut self.usage,
            &mut self.history,
        )?;
        Ok(Some(dump_path))
    }

    /// Callable from any thread holding a reference to this agent (e.g.
    /// the owner of the `tokio::sync::Mutex<Agent<W>>` it's wrapped in):
    /// sets the abort flag and, if there's a live conversation, synthesizes
    /// the dump synchronously so the dump path is available immediately
    /// rather than waiting for the run loop's next iteration (SPEC_FULL §5).
    pub fn flush(&mut self) -> Result<Option<PathBuf>> {
        self.abort.set();
        let dump_path = self.compact_now("flush")?;
        self.abort_dump_done.store(dump_path.is_some(), Ordering::SeqCst);
        self.set_phase(Phase::Flushed);
        Ok(dump_path)
    }

    /// Appends a user message and runs turns until a final answer,
    /// an abort, or the iteration cap is reached. Every return path is a
    /// well-formed string per SPEC_FULL §7 — this never propagates a
    /// provider or tool error to the caller as an `Err` except for
    /// genuine LLM call failures (SPEC_FULL §7's "LLM call failure" kind).
    pub async fn run(&mut self, user_input: &str) -> Result<String> {
        self.history.push(Message::user(user_input));
        loop {
            match self.turn().await? {
                TurnOutcome::Continue => continue,
                TurnOutcome::Final(text) => {
                    self.set_phase(Phase::Done);
                    return Ok(text);
                }
                TurnOutcome::Aborted(text) => return Ok(text),
                TurnOutcome::IterationCapReached(text) => return Ok(text),
            }
        }
    }

    async fn turn(&mut self) -> Result<TurnOutcome> {
        // Step 1: abort check.
        if self.abort.is_set() {
            if !self.abort_dump_done.load(Ordering::SeqCst) {
                self.compact_now("flush")?;
            }
            self.set_phase(Phase::Flushed);
            return Ok(TurnOutcome::Aborted(
                "Run aborted by flush; conversation was compacted and dumped to disk.".to_string(),
            ));
        }

        // Iteration cap (SPEC_FULL §4.2 / Testable Properties #8): checked
        // before any LLM call is made, so the count never exceeds the cap.
        self.iteration += 1;
        if self.iteration > self.config.iteration_cap {
            self.set_phase(Phase::Done);
            return Ok(TurnOutcome::IterationCapReached(format!(
                "Stopped after reaching the iteration cap ({} turns) without a final answer.",
                self.config.iteration_cap
            )));
        }

        // Step 2: proactive compaction at >=75% context pressure.
        if self.usage.pressure() != PressureLevel::Ok {
            let level = if self.usage.pressure() == PressureLevel::Critical {
                ContextWarningLevel::Critical
            } else {
                ContextWarningLevel::Warning
            };
            self.progress.publish(ProgressEvent::ContextWarning {
                level,
                usage: self.usage,
            });
        }
        if self.usage.percentage_used() >= context_window::WARNING_THRESHOLD {
            self.compact_now("proactive")?;
        }

        // Step 3: assemble + call the LLM, streaming.
        self.set_phase(Phase::CallingLlm);
        self.progress.publish(ProgressEvent::Thinking);

        let mut wire_messages = vec![helm_providers::Message::new(
            helm_providers::MessageRole::System,
            self.system_prompt(),
        )];
        wire_messages.extend(self.history.iter().map(Message::to_provider));

        let request = CompletionRequest {
            messages: wire_messages,
            max_tokens: Some(self.provider.max_tokens()),
            temperature: Some(self.provider.temperature()),
            stream: true,
            tools: Some(tools::tool_definitions(self.tool_ctx.shell_enabled)),
            disable_thinking: false,
            reasoning_effort: None,
        };

        let result = self.call_llm_streaming(request).await?;

        // Property #7: only overwrite last_prompt_tokens when a usage
        // block actually arrived; an absent terminator leaves it as-is.
        if let Some(usage) = &result.usage {
            self.usage.record_call(usage.prompt_tokens, usage.completion_tokens);
            self.progress.publish(ProgressEvent::TokenUpdate { usage: self.usage });
        }

        // Step 4: append the assistant turn.
        let tool_call_requests: Vec<ToolCallRequest> = result
            .tool_calls
            .iter()
            .map(|tc| ToolCallRequest {
                id: tc.id.clone(),
                name: tc.tool.clone(),
                arguments: serde_json::to_string(&tc.args).unwrap_or_else(|_| "{}".to_string()),
            })
            .collect();
        let content = if result.text.is_empty() { None } else { Some(result.text.clone()) };
        self.history.push(Message::assistant(content, tool_call_requests));

        if !result.tool_calls.is_empty() {
            // Step 7: native tool calls.
            self.set_phase(Phase::ToolCall);
            for tc in &result.tool_calls {
                self.execute_tool_call(&tc.id, &tc.tool, tc.args.clone()).await;
            }
            return Ok(TurnOutcome::Continue);
        }

        // Step 5: fallback text tool-call parser.
        if let Some(parsed) = fallback_parser::parse_fallback_tool_call(&result.text) {
            let call_id = uuid::Uuid::new_v4().to_string();
            // Rewrite the just-appended assistant message: strip the
            // encoded fragment and record the synthesized tool call so the
            // history's tool_calls/tool_call_id invariant still holds.
            if let Some(last) = self.history.last_mut() {
                last.content = if parsed.cleaned_text.is_empty() {
                    None
                } else {
                    Some(parsed.cleaned_text.clone())
                };
                last.tool_calls.push(ToolCallRequest {
                    id: call_id.clone(),
                    name: parsed.name.clone(),
                    arguments: serde_json::to_string(&parsed.arguments).unwrap_or_else(|_| "{}".to_string()),
                });
            }
            self.set_phase(Phase::ToolCall);
            self.execute_tool_call(&call_id, &parsed.name, parsed.arguments).await;
            return Ok(TurnOutcome::Continue);
        }

        // Step 6: no tool calls, no fallback match -> final turn.
        self.progress.publish(ProgressEvent::Message { content: result.text.clone() });
        self.progress.publish(ProgressEvent::Response {
            content: result.text.clone(),
            usage: self.usage,
            session_id: self.config.session_id.clone(),
        });
        Ok(TurnOutcome::Final(result.text))
    }

    async fn execute_tool_call(&mut self, call_id: &str, name: &str, args: serde_json::Value) {
        let args = if args.is_null() { serde_json::json!({}) } else { args };
        self.set_last_tool(Some(name.to_string()));
        let result = tools::dispatch(name, args.clone(), &self.tool_ctx).await;
        self.progress.publish(ProgressEvent::tool_call(name, args, &result));
        self.ui.print_tool_header(name, None);
        self.history.push(Message::tool(call_id, result));
    }

    async fn call_llm_streaming(&mut self, request: CompletionRequest) -> Result<LLMCallResult> {
        let mut stream = self.provider.stream(request).await?;
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut usage = None;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if !chunk.content.is_empty() {
                text.push_str(&chunk.content);
                self.ui.print_inline(&chunk.content);
            }
            if let Some(tc) = chunk.tool_calls {
                tool_calls = tc;
            }
            if chunk.finished {
                usage = chunk.usage;
            }
        }
        Ok(LLMCallResult { text, tool_calls, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_providers::mock::{scenarios, MockChunk, MockProvider, MockResponse};
    use std::sync::Arc;

    fn test_tool_ctx(workspace: &std::path::Path) -> ToolContext {
        let ws = Arc::new(helm_config::Workspace::new(workspace.to_path_buf()).unwrap());
        let browser_state = tools::browser::BrowserToolState::new(0, workspace.join("profile"), None);
        ToolContext {
            workspace: ws,
            browser: Arc::new(tokio::sync::Mutex::new(browser_state)),
            shell_enabled: true,
            jobs_path: workspace.join("jobs.json"),
            job_store: Arc::new(tokio::sync::Mutex::new(cron::JobStore::default())),
            cron_registry: cron::CronRunRegistry::new(),
            progress: ProgressBus::new(),
        }
    }

    fn test_agent(dir: &std::path::Path, provider: MockProvider) -> Agent<NullUiWriter> {
        let config = AgentConfig {
            workspace: dir.to_path_buf(),
            model: "mock-model".to_string(),
            context_limit: 128_000,
            iteration_cap: resolve_iteration_cap(None),
            session_id: "test-session".to_string(),
            system_prompt_override: None,
        };
        Agent::new(
            config,
            Arc::new(provider),
            test_tool_ctx(dir),
            ProgressBus::new(),
            NullUiWriter,
        )
    }

    #[tokio::test]
    async fn happy_path_simple_task_returns_final_text_with_two_tool_calls() {
        let dir = tempfile::tempdir().unwrap();
        let provider = scenarios::tool_then_response(
            "browser",
            serde_json::json!({"action": "open", "url": "https://example.com"}),
            "The title is Example Domain",
        );
        let mut agent = test_agent(dir.path(), provider);
        let reply = agent.run("What's the title of example.com?").await.unwrap();
        assert!(reply.contains("Example Domain"));
        // user + assistant-tool-call + tool-result + final-assistant.
        assert_eq!(agent.history.len(), 4);
        assert!(!dir.path().join("context_dumps").exists());
    }

    #[tokio::test]
    async fn final_turn_with_no_tool_calls_returns_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new().with_response(MockResponse::text("just chatting"));
        let mut agent = test_agent(dir.path(), provider);
        let reply = agent.run("hi").await.unwrap();
        assert_eq!(reply, "just chatting");
        assert_eq!(agent.history.len(), 2);
    }

    #[tokio::test]
    async fn fallback_parser_synthesizes_a_tool_call_from_free_text() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new().with_responses(vec![
            MockResponse::text(r#"Let me check. files{"action": "list", "path": "."}"#),
            MockResponse::text("done"),
        ]);
        let mut agent = test_agent(dir.path(), provider);
        let reply = agent.run("list files").await.unwrap();
        assert_eq!(reply, "done");
        // user -> assistant(fallback) -> tool -> assistant(final)
        assert_eq!(agent.history.len(), 4);
        assert!(agent.history[0].role == MessageRole::User);
        let assistant_turn = &agent.history[1];
        assert_eq!(assistant_turn.tool_calls.len(), 1);
        assert!(!assistant_turn.content.as_deref().unwrap_or("").contains("files{"));
    }

    #[tokio::test]
    async fn iteration_cap_is_never_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let mut responses = Vec::new();
        for _ in 0..20 {
            responses.push(MockResponse::native_tool_call(
                "files",
                serde_json::json!({"action": "list", "path": "."}),
            ));
        }
        let provider = MockProvider::new()
            .with_native_tool_calling(true)
            .with_responses(responses)
            .with_default_response(MockResponse::native_tool_call(
                "files",
                serde_json::json!({"action": "list", "path": "."}),
            ));
        let dir_path = dir.path().to_path_buf();
        let config = AgentConfig {
            workspace: dir_path.clone(),
            model: "mock-model".to_string(),
            context_limit: 128_000,
            iteration_cap: 5,
            session_id: "cap-test".to_string(),
            system_prompt_override: None,
        };
        let mut agent = Agent::new(
            config,
            Arc::new(provider),
            test_tool_ctx(&dir_path),
            ProgressBus::new(),
            NullUiWriter,
        );
        let reply = agent.run("loop forever").await.unwrap();
        assert!(reply.contains("iteration cap"));
        // 5 turns, each appending an assistant tool-call message plus a
        // tool-result message, on top of the initial user message.
        assert_eq!(agent.history.len(), 1 + 5 * 2);
    }

    #[tokio::test]
    async fn flush_compacts_immediately_and_next_turn_returns_abort_notice() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new().with_default_response(MockResponse::text("should not run"));
        let mut agent = test_agent(dir.path(), provider);
        agent.history.push(Message::user("earlier turn"));
        agent.history.push(Message::assistant(Some("earlier reply".into()), vec![]));

        let dump_path = agent.flush().unwrap().expect("flush should dump when history is non-empty");
        assert!(dump_path.exists());
        assert_eq!(agent.history.len(), 1);

        let reply = agent.run("are you there?").await.unwrap();
        assert!(reply.to_lowercase().contains("abort"));
    }

    #[tokio::test]
    async fn usage_updates_from_the_finishing_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new().with_response(MockResponse::custom(
            vec![MockChunk::content("partial"), MockChunk::finished("stop")],
            helm_providers::Usage {
                prompt_tokens: 555,
                completion_tokens: 12,
                total_tokens: 567,
                cache_creation_tokens: 0,
                cache_read_tokens: 0,
            },
        ));
        let mut agent = test_agent(dir.path(), provider);
        let _ = agent.run("go").await.unwrap();
        assert_eq!(agent.usage.last_prompt_tokens, 555);
        assert_eq!(agent.usage.completion_tokens_cumulative, 12);
    }

    #[tokio::test]
    async fn proactive_compaction_fires_above_the_warning_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new().with_responses(vec![
            MockResponse::text("first").with_usage(helm_providers::Usage {
                prompt_tokens: 80_000,
                completion_tokens: 10,
                total_tokens: 80_010,
                cache_creation_tokens: 0,
                cache_read_tokens: 0,
            }),
            MockResponse::text("second"),
        ]);
        let mut agent = test_agent(dir.path(), provider);
        agent.config.context_limit = 100_000;
        agent.usage = TokenUsage::new(100_000);

        let _ = agent.run("first question").await.unwrap();
        assert_eq!(agent.usage.pressure(), PressureLevel::Warning);

        let _ = agent.run("second question").await.unwrap();
        // The second turn's proactive-compaction check saw >=75% pressure
        // from the first call and reset history to the synthetic summary
        // message before appending the new user turn and final reply.
        assert!(dir.path().join("context_dumps").exists());
        assert_eq!(agent.history.len(), 2);
    }

    #[tokio::test]
    async fn probe_is_idempotent_across_repeated_reads() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new().with_response(MockResponse::text("ok"));
        let mut agent = test_agent(dir.path(), provider);
        let _ = agent.run("hi").await.unwrap();
        let a = agent.probe();
        let b = agent.probe();
        assert_eq!(a.iteration, b.iteration);
        assert_eq!(a.message_count, b.message_count);
    }
}
