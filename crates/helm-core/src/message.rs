//! The tagged conversation message shape (SPEC_FULL §3): a real enum-backed
//! role instead of a duck-typed dict, with tool calls carried as a
//! first-class field instead of smuggled through free text.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One structured tool invocation an assistant turn requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Raw JSON object text, exactly as the provider emitted it (or as the
    /// fallback text parser reconstructed it). Parsed lazily by the
    /// dispatcher so a malformed-but-present call still round-trips.
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(text: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: text,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    /// Invariant 6 (SPEC_FULL §8): every tool message's `tool_call_id` must
    /// appear in the immediately preceding assistant message's `tool_calls`.
    pub fn validate_tool_pairing(history: &[Message]) -> bool {
        for (i, msg) in history.iter().enumerate() {
            if msg.role == MessageRole::Tool {
                let Some(call_id) = &msg.tool_call_id else {
                    return false;
                };
                let Some(prev) = i.checked_sub(1).map(|j| &history[j]) else {
                    return false;
                };
                if !prev.tool_calls.iter().any(|tc| &tc.id == call_id) {
                    return false;
                }
            }
        }
        true
    }

    /// Converts to the provider-wire shape (`helm_providers::Message`).
    pub fn to_provider(&self) -> helm_providers::Message {
        use helm_providers::MessageRole as PRole;
        let role = match self.role {
            MessageRole::System => PRole::System,
            MessageRole::User => PRole::User,
            MessageRole::Assistant => PRole::Assistant,
            MessageRole::Tool => PRole::Tool,
        };
        helm_providers::Message {
            role,
            content: self.content.clone().unwrap_or_default(),
            images: Vec::new(),
            id: self.tool_call_id.clone().unwrap_or_default(),
            kind: Default::default(),
            cache_control: None,
            tool_call_id: self.tool_call_id.clone(),
            tool_calls: self
                .tool_calls
                .iter()
                .map(|tc| helm_providers::ToolCall {
                    id: tc.id.clone(),
                    tool: tc.name.clone(),
                    args: serde_json::from_str(&tc.arguments).unwrap_or(serde_json::Value::Null),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_holds_for_well_formed_history() {
        let history = vec![
            Message::user("hi"),
            Message::assistant(
                None,
                vec![ToolCallRequest {
                    id: "1".into(),
                    name: "files".into(),
                    arguments: "{}".into(),
                }],
            ),
            Message::tool("1", "ok"),
        ];
        assert!(Message::validate_tool_pairing(&history));
    }

    #[test]
    fn pairing_fails_for_orphan_tool_message() {
        let history = vec![Message::user("hi"), Message::tool("1", "ok")];
        assert!(!Message::validate_tool_pairing(&history));
    }
}
