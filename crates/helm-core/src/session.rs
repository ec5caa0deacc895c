//! Session store (SPEC_FULL §4.7): append-only JSON per session under
//! `~/.helm/sessions/`, atomic write-temp-then-rename, `created_at`
//! preserved across saves.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::context_window::TokenUsage;
use crate::message::Message;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub model: String,
    pub provider: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub usage: TokenUsage,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionMetadata {
    pub id: String,
    pub title: String,
    pub model: String,
    pub provider: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub message_count: usize,
}

const DEFAULT_LIST_CAP: usize = 50;

fn derive_title(messages: &[Message]) -> String {
    messages
        .iter()
        .find(|m| m.role == crate::message::MessageRole::User)
        .and_then(|m| m.content.as_deref())
        .map(|c| {
            let first_line = c.lines().next().unwrap_or(c);
            if first_line.chars().count() > 60 {
                format!("{}...", first_line.chars().take(60).collect::<String>())
            } else {
                first_line.to_string()
            }
        })
        .unwrap_or_else(|| "Untitled session".to_string())
}

impl Session {
    pub fn new(id: String, model: String, provider: String, context_limit: u32) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            title: String::new(),
            model,
            provider,
            created_at: now,
            updated_at: now,
            usage: TokenUsage::new(context_limit),
            messages: Vec::new(),
        }
    }

    fn path(sessions_dir: &Path, id: &str) -> PathBuf {
        sessions_dir.join(format!("{id}.json"))
    }

    /// Persist this session, preserving `created_at` if a prior copy
    /// exists on disk.
    pub fn save(&mut self, sessions_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(sessions_dir)
            .with_context(|| format!("creating {}", sessions_dir.display()))?;

        let path = Self::path(sessions_dir, &self.id);
        if let Ok(existing) = Self::load(sessions_dir, &self.id) {
            self.created_at = existing.created_at;
        }
        if self.title.is_empty() {
            self.title = derive_title(&self.messages);
        }
        self.updated_at = chrono::Utc::now();

        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn load(sessions_dir: &Path, id: &str) -> Result<Self> {
        let path = Self::path(sessions_dir, id);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading session {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing session {}", path.display()))
    }

    /// Render to markdown for export.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.title));
        out.push_str(&format!("- model: {}\n- provider: {}\n- created: {}\n\n", self.model, self.provider, self.created_at));
        for msg in &self.messages {
            let role = match msg.role {
                crate::message::MessageRole::System => "System",
                crate::message::MessageRole::User => "User",
                crate::message::MessageRole::Assistant => "Assistant",
                crate::message::MessageRole::Tool => "Tool",
            };
            out.push_str(&format!("## {role}\n\n{}\n\n", msg.content.as_deref().unwrap_or("")));
        }
        out
    }
}

/// List session metadata (no message bodies), sorted by `updated_at`
/// descending, capped at `limit` (default 50).
pub fn list_sessions(sessions_dir: &Path, limit: Option<usize>) -> Result<Vec<SessionMetadata>> {
    let mut out = Vec::new();
    if !sessions_dir.exists() {
        return Ok(out);
    }
    for entry in std::fs::read_dir(sessions_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Ok(content) = std::fs::read_to_string(&path) {
            if let Ok(session) = serde_json::from_str::<Session>(&content) {
                out.push(SessionMetadata {
                    id: session.id,
                    title: session.title,
                    model: session.model,
                    provider: session.provider,
                    created_at: session.created_at,
                    updated_at: session.updated_at,
                    message_count: session.messages.len(),
                });
            }
        }
    }
    out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    out.truncate(limit.unwrap_or(DEFAULT_LIST_CAP));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips_messages_and_counters() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new("sess-1".into(), "claude-sonnet-4-5".into(), "anthropic".into(), 200_000);
        session.messages.push(Message::user("hello"));
        session.usage.record_call(100, 20);

        session.save(dir.path()).unwrap();
        let loaded = Session::load(dir.path(), "sess-1").unwrap();

        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.usage.prompt_tokens_cumulative, 100);
    }

    #[test]
    fn created_at_survives_resave() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new("sess-2".into(), "m".into(), "p".into(), 128_000);
        session.save(dir.path()).unwrap();
        let first_created = session.created_at;

        std::thread::sleep(std::time::Duration::from_millis(10));
        session.messages.push(Message::user("more"));
        session.save(dir.path()).unwrap();

        assert_eq!(session.created_at, first_created);
    }

    #[test]
    fn title_is_derived_from_first_user_message() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new("sess-3".into(), "m".into(), "p".into(), 128_000);
        session.messages.push(Message::user("What's the weather like?"));
        session.save(dir.path()).unwrap();
        assert_eq!(session.title, "What's the weather like?");
    }

    #[test]
    fn list_sorts_by_updated_at_descending_and_caps() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3 {
            let mut s = Session::new(format!("s{i}"), "m".into(), "p".into(), 128_000);
            s.save(dir.path()).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let list = list_sessions(dir.path(), Some(2)).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list[0].updated_at >= list[1].updated_at);
    }
}
