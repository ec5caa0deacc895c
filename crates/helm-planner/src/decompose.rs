//! Decomposition prompts and the decomposer's response parser (SPEC_FULL
//! §4.3): a single non-tool LLM call classifies a task as simple or
//! complex, and — for complex tasks — returns an ordered plan.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DECOMPOSE_PROMPT: &str = r#"You are a task decomposition planner. Today is {today}.

Given a user task, decide:
1. If it's **simple** (answerable directly, single tool call, or conversational), return a JSON object: {"simple": true}
2. If it's **complex** (multi-step, needs research, file creation, etc.), decompose it into a list of subtasks.

For complex tasks, return a JSON array of subtask objects. Each subtask has:
- "task": Detailed description of what to do
- "tool": Primary tool to use ("browser", "files", "shell", "pdf", "spreadsheet")
- "output": Where to write results — a filename like "step_1_results.md"

Rules:
- Each subtask should be independently executable with a clear output.
- The LAST subtask is ALWAYS a compilation step with tool "compile".
- Compilation takes all prior outputs and produces the final answer.
- Keep the list short — 3-7 subtasks is ideal, max 10.
- Each subtask's "task" should include enough context to execute without seeing the original query.

Example response for a complex task:
```json
[
  {"task": "Search Google for 'best Python web frameworks 2025' and extract the top 5 results with descriptions", "tool": "browser", "output": "step_1_search.md"},
  {"task": "Visit each framework's official site and note key features, performance claims, and community size", "tool": "browser", "output": "step_2_details.md"},
  {"task": "Compile all findings into a comprehensive comparison report with recommendations", "tool": "compile", "output": "final_report.md"}
]
```

Example response for a simple task:
```json
{"simple": true}
```

User task: {task}
"#;

pub const SUBTASK_SYSTEM_PROMPT: &str = r#"You are a focused task executor. Today is {today}.

You have ONE job: complete the task below using the {tool} tool. Write your findings/results to: **{output_file}**

Your workspace is: {workspace}

## Context Window
{context_limit} tokens available. If compacted, use `files grep` on `context_dumps/` to recover details.

## Prior Results
{prior_context}

## Rules
- Stay focused on your specific task.
- Write results to the output file using the files tool.
- Be thorough but efficient.
- When done, confirm what you wrote and where.
"#;

pub const COMPILE_SYSTEM_PROMPT: &str = r#"You are a compilation agent. Today is {today}.

Your job: read all the subtask outputs listed below and compile them into a comprehensive, well-structured final response.

Your workspace is: {workspace}

## Subtask Outputs
{subtask_outputs}

## Original Task
{original_task}

## Instructions
1. Read each subtask output file using the files tool.
2. Synthesize everything into a coherent final output.
3. Write the compiled result to: **{output_file}**
4. Then provide a summary as your response.

Make it thorough, well-organized, and directly useful. Use markdown formatting.
"#;

pub const RESEARCH_DECOMPOSE_PROMPT: &str = r#"You are a research planner. Today is {today}.

Given a research query, decompose it into exactly {n} focused subtopics that together comprehensively cover the topic.

Each subtopic should:
- Be specific enough to research in one focused search session
- Cover a different angle/aspect of the main query
- Be independently researchable

Return a JSON array of {n} objects:
- "subtopic": Concise title
- "task": Detailed research instructions (what to search for, what to find)

Research query: {query}
"#;

pub const RESEARCH_SUBTASK_SYSTEM_PROMPT: &str = r#"You are a focused web researcher. Today is {today}.

Your workspace is: {workspace}

## Research Workflow
1. Use browser action="search" to Google your topic.
2. From the results, pick exactly 3 URLs that look most relevant.
3. For each URL: open it (action="open"), read its content (action="text"), and extract key findings.
4. Write ALL findings to: **{output_file}** using the files tool.

## Key Rules
- You MUST visit exactly 3 URLs (not more, not less).
- Use action="text" to read page content (not elements).
- Include source URLs in your notes.
- Write findings as bullet points with data, stats, and key takeaways.
- Be efficient — don't waste tool calls.

## Context Window
{context_limit} tokens available.
"#;

pub const RESEARCH_COMPILE_PROMPT: &str = r#"You are a research report compiler. Today is {today}.

## Original Research Query
{query}

## Instructions
Read all {n} research findings files listed below, then compile them into a comprehensive, well-structured research report. Write it to: **{output_file}**

Subtask output files:
{file_list}

The report should:
1. Start with an executive summary
2. Organize findings into logical sections
3. Highlight key insights and conclusions
4. Include all source URLs in a References section
5. Note any conflicting information across sources

Use markdown. Be thorough but readable.
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Pending,
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub task: String,
    pub tool: String,
    pub output: String,
    pub index: usize,
    pub total: usize,
    pub status: SubtaskStatus,
    pub result: Option<String>,
    pub duration_secs: f64,
}

impl Subtask {
    fn new(task: String, tool: String, output: String, index: usize, total: usize) -> Self {
        Self {
            task,
            tool,
            output,
            index,
            total,
            status: SubtaskStatus::Pending,
            result: None,
            duration_secs: 0.0,
        }
    }
}

fn today() -> String {
    chrono::Utc::now().format("%B %d, %Y").to_string()
}

pub fn render_decompose_prompt(task: &str) -> String {
    DECOMPOSE_PROMPT
        .replace("{today}", &today())
        .replace("{task}", task)
}

pub fn render_research_decompose_prompt(query: &str, n: usize) -> String {
    RESEARCH_DECOMPOSE_PROMPT
        .replace("{today}", &today())
        .replace("{n}", &n.to_string())
        .replace("{query}", query)
}

/// Prior-results context injected into every subtask after the first
/// (supplemented beyond `decompose.py`'s single-shot prompts — SPEC_FULL
/// §4.3.1): each prior subtask's output filename and a truncated preview
/// of what it produced.
pub fn render_prior_context(prior_results: &[(String, String)]) -> String {
    if prior_results.is_empty() {
        return "(none — this is the first subtask)".to_string();
    }
    prior_results
        .iter()
        .map(|(file, preview)| format!("- {file}: {preview}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_subtask_system_prompt(
    tool: &str,
    output_file: &str,
    workspace: &str,
    context_limit: u32,
    prior_results: &[(String, String)],
) -> String {
    SUBTASK_SYSTEM_PROMPT
        .replace("{today}", &today())
        .replace("{tool}", tool)
        .replace("{output_file}", output_file)
        .replace("{workspace}", workspace)
        .replace("{context_limit}", &context_limit.to_string())
        .replace("{prior_context}", &render_prior_context(prior_results))
}

pub fn render_compile_system_prompt(
    subtask_outputs: &[String],
    original_task: &str,
    workspace: &str,
    output_file: &str,
) -> String {
    let listing = subtask_outputs
        .iter()
        .map(|f| format!("- {f}"))
        .collect::<Vec<_>>()
        .join("\n");
    COMPILE_SYSTEM_PROMPT
        .replace("{today}", &today())
        .replace("{workspace}", workspace)
        .replace("{subtask_outputs}", &listing)
        .replace("{original_task}", original_task)
        .replace("{output_file}", output_file)
}

pub fn render_research_subtask_system_prompt(workspace: &str, output_file: &str, context_limit: u32) -> String {
    RESEARCH_SUBTASK_SYSTEM_PROMPT
        .replace("{today}", &today())
        .replace("{workspace}", workspace)
        .replace("{output_file}", output_file)
        .replace("{context_limit}", &context_limit.to_string())
}

pub fn render_research_compile_prompt(query: &str, n: usize, file_list: &[String], output_file: &str) -> String {
    RESEARCH_COMPILE_PROMPT
        .replace("{today}", &today())
        .replace("{query}", query)
        .replace("{n}", &n.to_string())
        .replace("{file_list}", &file_list.join(", "))
        .replace("{output_file}", output_file)
}

static FENCED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\}|\[.*?\])\s*```").unwrap());
static BARE_OBJECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)(\{[^{}]*"simple"[^{}]*\})"#).unwrap());
static BARE_ARRAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)(\[.*\])").unwrap());

/// Parses the decomposer's response into a plan, or `None` for a simple
/// task — either because the model said so, or because nothing in the
/// response parses (SPEC_FULL §4.3: "on any failure it returns simple").
pub fn parse_decomposition(text: &str) -> Option<Vec<Subtask>> {
    let raw = FENCED_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| {
            BARE_OBJECT_RE
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        })
        .or_else(|| {
            BARE_ARRAY_RE
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        })?;

    let parsed: Value = serde_json::from_str(&raw).ok()?;

    if let Some(obj) = parsed.as_object() {
        if obj.get("simple").and_then(Value::as_bool).unwrap_or(false) {
            return None;
        }
    }

    let items = parsed.as_array()?;
    if items.len() < 2 {
        return None;
    }

    let total = items.len();
    let subtasks: Vec<Subtask> = items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let obj = item.as_object()?;
            Some(Subtask::new(
                obj.get("task")?.as_str()?.to_string(),
                obj.get("tool").and_then(Value::as_str).unwrap_or("browser").to_string(),
                obj.get("output")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("step_{}.md", i + 1)),
                i,
                total,
            ))
        })
        .collect();

    if subtasks.len() >= 2 {
        Some(subtasks)
    } else {
        None
    }
}

static SUBTOPIC_FENCED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\[.*?\])\s*```").unwrap());
static SUBTOPIC_BARE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)(\[.*\])").unwrap());

fn parse_subtopics(text: &str) -> Vec<(String, String)> {
    let raw = SUBTOPIC_FENCED_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| {
            SUBTOPIC_BARE_RE
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        });

    let Some(raw) = raw else { return Vec::new() };
    let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&raw) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let subtopic = obj.get("subtopic").and_then(Value::as_str)?.to_string();
            let task = obj.get("task").and_then(Value::as_str)?.to_string();
            Some((subtopic, task))
        })
        .collect()
}

/// Builds a fixed research plan from a parsed (or synthesized) list of
/// subtopics: `num_topics` browser subtasks plus one compile step.
pub fn research_plan_from_subtopics(query: &str, num_topics: usize, response_text: &str) -> Vec<Subtask> {
    let mut subtopics = parse_subtopics(response_text);
    if subtopics.len() < num_topics {
        subtopics = (0..num_topics)
            .map(|i| (format!("Aspect {}", i + 1), format!("Research aspect {} of: {query}", i + 1)))
            .collect();
    }

    let total = num_topics + 1;
    let mut subtasks: Vec<Subtask> = subtopics
        .into_iter()
        .take(num_topics)
        .enumerate()
        .map(|(i, (_, task))| Subtask::new(task, "browser".to_string(), format!("findings_{}.md", i + 1), i, total))
        .collect();

    let file_list = (0..num_topics)
        .map(|i| format!("findings_{}.md", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    subtasks.push(Subtask::new(
        format!("Compile all {num_topics} research findings ({file_list}) into a final report"),
        "compile".to_string(),
        "final_report.md".to_string(),
        num_topics,
        total,
    ));
    subtasks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_object_in_fenced_block_yields_none() {
        let text = "```json\n{\"simple\": true}\n```";
        assert!(parse_decomposition(text).is_none());
    }

    #[test]
    fn bare_simple_object_yields_none() {
        let text = "I think this is simple. {\"simple\": true} — no decomposition needed.";
        assert!(parse_decomposition(text).is_none());
    }

    #[test]
    fn fenced_array_yields_a_plan_with_compile_last() {
        let text = r#"```json
[
  {"task": "search", "tool": "browser", "output": "a.md"},
  {"task": "compile everything", "tool": "compile", "output": "final.md"}
]
```"#;
        let plan = parse_decomposition(text).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.last().unwrap().tool, "compile");
    }

    #[test]
    fn unparseable_text_yields_none() {
        assert!(parse_decomposition("I'm not sure what to do here.").is_none());
    }

    #[test]
    fn single_item_array_is_rejected_as_too_short() {
        let text = r#"[{"task": "only one step", "tool": "compile", "output": "x.md"}]"#;
        assert!(parse_decomposition(text).is_none());
    }

    #[test]
    fn research_plan_has_n_plus_one_subtasks_with_compile_last() {
        let text = r#"```json
[{"subtopic": "A", "task": "research A"}, {"subtopic": "B", "task": "research B"}]
```"#;
        let plan = research_plan_from_subtopics("widgets", 2, text);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].task, "research A");
        assert_eq!(plan.last().unwrap().tool, "compile");
    }

    #[test]
    fn research_plan_falls_back_when_subtopics_are_short() {
        let plan = research_plan_from_subtopics("widgets", 3, "not json at all");
        assert_eq!(plan.len(), 4);
        assert!(plan[0].task.contains("widgets"));
    }
}
