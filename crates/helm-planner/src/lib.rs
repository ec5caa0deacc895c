//! Task decomposition and sequential subtask execution (SPEC_FULL §4.3):
//! a single classification call decides whether an incoming task is
//! simple enough for the main agent loop to handle directly, or complex
//! enough to warrant breaking into an ordered plan of subtasks, each run
//! by its own mini-agent.

pub mod decompose;
pub mod runner;

pub use decompose::{
    parse_decomposition, render_decompose_prompt, render_research_decompose_prompt,
    research_plan_from_subtopics, Subtask, SubtaskStatus,
};
pub use runner::{ActiveAgent, SubtaskRunResult, SubtaskRunner};

use std::sync::Arc;

use anyhow::Result;
use helm_core::tools::ToolContext;
use helm_core::ProgressBus;
use helm_providers::{CompletionRequest, LLMProvider, Message, MessageRole};

/// Runs the decomposition call and, if the task is complex, the full
/// subtask plan. Returns `None` when the task is classified simple — the
/// caller should fall through to the regular agent loop in that case.
pub async fn decompose_and_run(
    task: &str,
    provider: Arc<dyn LLMProvider>,
    tool_ctx: ToolContext,
    progress: ProgressBus,
    model: String,
    context_limit: u32,
    iteration_cap: u32,
    abort: &helm_core::AbortFlag,
) -> Result<Option<SubtaskRunResult>> {
    let plan = match classify(task, provider.as_ref()).await? {
        Some(plan) => plan,
        None => return Ok(None),
    };

    let runner = SubtaskRunner::new(provider, tool_ctx, progress, model, context_limit, iteration_cap);
    let result = runner.run(task, plan, abort).await?;
    Ok(Some(result))
}

/// The decomposition call itself (SPEC_FULL §4.3): one non-streaming,
/// non-tool-calling LLM request classifying the task.
pub async fn classify(task: &str, provider: &dyn LLMProvider) -> Result<Option<Vec<Subtask>>> {
    let request = CompletionRequest {
        messages: vec![Message::new(MessageRole::User, render_decompose_prompt(task))],
        max_tokens: Some(provider.max_tokens()),
        temperature: Some(0.0),
        stream: false,
        tools: None,
        disable_thinking: true,
        reasoning_effort: None,
    };
    let response = provider.complete(request).await?;
    Ok(parse_decomposition(&response.content))
}

/// Builds a fixed deep-research plan (SPEC_FULL §4.3.1): `num_topics`
/// browser subtasks, one per subtopic, plus a trailing compile step.
pub async fn decompose_research(
    query: &str,
    num_topics: usize,
    provider: &dyn LLMProvider,
) -> Result<Vec<Subtask>> {
    let request = CompletionRequest {
        messages: vec![Message::new(
            MessageRole::User,
            render_research_decompose_prompt(query, num_topics),
        )],
        max_tokens: Some(provider.max_tokens()),
        temperature: Some(0.3),
        stream: false,
        tools: None,
        disable_thinking: true,
        reasoning_effort: None,
    };
    let response = provider.complete(request).await?;
    Ok(research_plan_from_subtopics(query, num_topics, &response.content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_providers::mock::{MockProvider, MockResponse};

    #[tokio::test]
    async fn classify_returns_none_for_a_simple_task() {
        let provider = MockProvider::new().with_response(MockResponse::text(r#"{"simple": true}"#));
        let plan = classify("what's 2+2", &provider).await.unwrap();
        assert!(plan.is_none());
    }

    #[tokio::test]
    async fn classify_returns_a_plan_for_a_complex_task() {
        let text = r#"```json
[
  {"task": "search for X", "tool": "browser", "output": "a.md"},
  {"task": "search for Y", "tool": "browser", "output": "b.md"},
  {"task": "compile", "tool": "compile", "output": "final.md"}
]
```"#;
        let provider = MockProvider::new().with_response(MockResponse::text(text));
        let plan = classify("research X and Y and compare them", &provider).await.unwrap();
        let plan = plan.unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.last().unwrap().tool, "compile");
    }

    #[tokio::test]
    async fn decompose_research_always_ends_with_a_compile_step() {
        let provider = MockProvider::new().with_response(MockResponse::text(
            r#"[{"subtopic": "pricing", "task": "research pricing"}, {"subtopic": "reviews", "task": "research reviews"}]"#,
        ));
        let plan = decompose_research("widget market", 2, &provider).await.unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.last().unwrap().tool, "compile");
    }
}
