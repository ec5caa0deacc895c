//! The progress-event taxonomy (SPEC_FULL §6 / REDESIGN FLAGS §9): a single
//! tagged-variant channel replaces the teacher-style pattern of a bag of
//! `on_tool_call`/`on_token_update`/`on_subtask_progress` callback
//! closures. Subscribers call `AgentHost::subscribe()` and receive from
//! the returned channel; there is no global callback registry.

use serde::Serialize;

use crate::context_window::TokenUsage;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Thinking,
    ToolCall {
        tool: String,
        params: serde_json::Value,
        /// Truncated to 2,000 chars per SPEC_FULL §6.
        result: String,
    },
    Message {
        content: String,
    },
    Response {
        content: String,
        usage: TokenUsage,
        session_id: String,
    },
    TokenUpdate {
        usage: TokenUsage,
    },
    ContextWarning {
        level: ContextWarningLevel,
        usage: TokenUsage,
    },
    SubtaskProgress {
        phase: SubtaskPhase,
        index: Option<usize>,
        total: Option<usize>,
        detail: Option<String>,
    },
    ResearchProgress {
        detail: String,
    },
    ResearchComplete {
        summary: String,
    },
    ResearchError {
        error: String,
    },
    CronRunStart {
        run_id: String,
        job_id: String,
    },
    CronRunDone {
        run_id: String,
        job_id: String,
    },
    CronRunError {
        run_id: String,
        job_id: String,
        error: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextWarningLevel {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskPhase {
    Plan,
    SubtaskStart,
    SubtaskDone,
    StreamChunk,
}

const TOOL_RESULT_EVENT_CAP: usize = 2_000;

impl ProgressEvent {
    pub fn tool_call(tool: impl Into<String>, params: serde_json::Value, result: &str) -> Self {
        let result = if result.chars().count() > TOOL_RESULT_EVENT_CAP {
            let mut truncated: String = result.chars().take(TOOL_RESULT_EVENT_CAP).collect();
            truncated.push_str("\n[truncated]");
            truncated
        } else {
            result.to_string()
        };
        ProgressEvent::ToolCall {
            tool: tool.into(),
            params,
            result,
        }
    }
}

/// A broadcast fan-out: every `tokio::sync::broadcast::Receiver` a
/// subscriber holds gets its own outgoing queue (SPEC_FULL §5). Lagging
/// subscribers drop old events rather than stalling the producer.
#[derive(Clone)]
pub struct ProgressBus {
    sender: tokio::sync::broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    pub fn new() -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(256);
        Self { sender }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// No-op (returns `Ok`) when there are no subscribers — a broadcast
    /// channel with zero receivers still accepts sends.
    pub fn publish(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}
