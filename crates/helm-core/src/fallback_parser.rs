//! Fallback tool-call parser (SPEC_FULL §4.2, REDESIGN FLAGS §9): a pure
//! function `text -> Option<(name, args, cleaned_text)>` for providers
//! that emit tool invocations as free text instead of structured calls.
//!
//! Recognizes two patterns:
//! - `toolname{...json...}` or `toolname(...)` where `toolname` is a
//!   known tool name.
//! - A fenced ` ```json ` block containing `{"name": "...", "arguments": {...}}`
//!   or `{"name": "...", "parameters": {...}}`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

pub const KNOWN_TOOLS: &[&str] = &["browser", "files", "pdf", "spreadsheet", "shell", "cron"];

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFallbackCall {
    pub name: String,
    pub arguments: Value,
    /// The original text with the matched fragment removed, so the
    /// displayed assistant message isn't polluted with the raw call.
    pub cleaned_text: String,
}

static BARE_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\b(\w+)\s*(\{.*?\}|\(.*?\))").unwrap()
});

static FENCED_JSON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").unwrap()
});

/// Tries the bare-call pattern first (`toolname{...}` / `toolname(...)`),
/// falling back to the fenced-JSON-block pattern.
pub fn parse_fallback_tool_call(text: &str) -> Option<ParsedFallbackCall> {
    if let Some(found) = parse_bare_call(text) {
        return Some(found);
    }
    parse_fenced_json(text)
}

fn parse_bare_call(text: &str) -> Option<ParsedFallbackCall> {
    for caps in BARE_CALL_RE.captures_iter(text) {
        let name = caps.get(1)?.as_str();
        if !KNOWN_TOOLS.contains(&name) {
            continue;
        }
        let whole = caps.get(0)?.as_str();
        let payload = caps.get(2)?.as_str();

        let arguments = if payload.starts_with('{') {
            serde_json::from_str(payload).ok()?
        } else {
            // `toolname(action="click", index=0)`-style call; best-effort
            // parse into a JSON object of bare key=value pairs.
            parse_paren_args(payload)
        };

        let cleaned_text = text.replacen(whole, "", 1).trim().to_string();
        return Some(ParsedFallbackCall {
            name: name.to_string(),
            arguments,
            cleaned_text,
        });
    }
    None
}

fn parse_paren_args(payload: &str) -> Value {
    let inner = payload.trim_start_matches('(').trim_end_matches(')');
    let mut obj = serde_json::Map::new();
    for part in inner.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((key, value)) = part.split_once('=') {
            let key = key.trim().trim_matches('"').to_string();
            let value = value.trim().trim_matches('"');
            let parsed = serde_json::from_str::<Value>(value)
                .unwrap_or_else(|_| Value::String(value.to_string()));
            obj.insert(key, parsed);
        }
    }
    Value::Object(obj)
}

fn parse_fenced_json(text: &str) -> Option<ParsedFallbackCall> {
    let caps = FENCED_JSON_RE.captures(text)?;
    let whole = caps.get(0)?.as_str();
    let json_text = caps.get(1)?.as_str();
    let parsed: Value = serde_json::from_str(json_text).ok()?;

    let name = parsed.get("name")?.as_str()?.to_string();
    if !KNOWN_TOOLS.contains(&name.as_str()) {
        return None;
    }
    let arguments = parsed
        .get("arguments")
        .or_else(|| parsed.get("parameters"))
        .cloned()
        .unwrap_or(Value::Object(Default::default()));

    let cleaned_text = text.replacen(whole, "", 1).trim().to_string();
    Some(ParsedFallbackCall {
        name,
        arguments,
        cleaned_text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_json_call() {
        let text = r#"I'll check the page. browser{"action": "elements"} done."#;
        let parsed = parse_fallback_tool_call(text).unwrap();
        assert_eq!(parsed.name, "browser");
        assert_eq!(parsed.arguments["action"], "elements");
        assert!(!parsed.cleaned_text.contains("browser{"));
    }

    #[test]
    fn parses_fenced_json_block_with_arguments_key() {
        let text = "Let me read that file.\n```json\n{\"name\": \"files\", \"arguments\": {\"action\": \"read\", \"path\": \"a.txt\"}}\n```\n";
        let parsed = parse_fallback_tool_call(text).unwrap();
        assert_eq!(parsed.name, "files");
        assert_eq!(parsed.arguments["path"], "a.txt");
    }

    #[test]
    fn parses_fenced_json_block_with_parameters_key() {
        let text = "```json\n{\"name\": \"shell\", \"parameters\": {\"command\": \"ls\"}}\n```";
        let parsed = parse_fallback_tool_call(text).unwrap();
        assert_eq!(parsed.name, "shell");
        assert_eq!(parsed.arguments["command"], "ls");
    }

    #[test]
    fn ignores_unknown_tool_names() {
        let text = r#"notatool{"action": "x"}"#;
        assert!(parse_fallback_tool_call(text).is_none());
    }

    #[test]
    fn no_match_returns_none() {
        assert!(parse_fallback_tool_call("just some regular prose").is_none());
    }
}
