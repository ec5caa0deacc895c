//! `TokenUsage` (SPEC_FULL §3) and the per-model context-limit lookup
//! table (SPEC_FULL §4.7).

use serde::{Deserialize, Serialize};

pub const WARNING_THRESHOLD: f32 = 0.75;
pub const CRITICAL_THRESHOLD: f32 = 0.90;
pub const DEFAULT_CONTEXT_LIMIT: u32 = 128_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    pub prompt_tokens_cumulative: u64,
    pub completion_tokens_cumulative: u64,
    /// Prompt-side token count of the most recent LLM call. This is the
    /// authoritative measure of live context pressure; the cumulative
    /// totals above are for cost display only.
    pub last_prompt_tokens: u32,
    pub context_limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureLevel {
    Ok,
    Warning,
    Critical,
}

impl TokenUsage {
    pub fn new(context_limit: u32) -> Self {
        Self {
            context_limit,
            ..Default::default()
        }
    }

    pub fn record_call(&mut self, prompt_tokens: u32, completion_tokens: u32) {
        self.prompt_tokens_cumulative += prompt_tokens as u64;
        self.completion_tokens_cumulative += completion_tokens as u64;
        self.last_prompt_tokens = prompt_tokens;
    }

    pub fn percentage_used(&self) -> f32 {
        if self.context_limit == 0 {
            return 0.0;
        }
        self.last_prompt_tokens as f32 / self.context_limit as f32
    }

    pub fn pressure(&self) -> PressureLevel {
        let pct = self.percentage_used();
        if pct >= CRITICAL_THRESHOLD {
            PressureLevel::Critical
        } else if pct >= WARNING_THRESHOLD {
            PressureLevel::Warning
        } else {
            PressureLevel::Ok
        }
    }

    pub fn reset_after_compaction(&mut self) {
        self.prompt_tokens_cumulative = 0;
        self.completion_tokens_cumulative = 0;
        self.last_prompt_tokens = 0;
    }
}

/// Context limits per model family, used when the provider's live catalog
/// doesn't report one. Falls back to `DEFAULT_CONTEXT_LIMIT` (128,000).
pub fn context_limit_for_model(model: &str) -> u32 {
    let m = model.to_lowercase();
    if m.contains("claude-opus-4") || m.contains("claude-sonnet-4") {
        200_000
    } else if m.contains("claude-3-5") || m.contains("claude-3-7") {
        200_000
    } else if m.contains("gpt-4o") || m.contains("gpt-4.1") {
        128_000
    } else if m.contains("gpt-4-turbo") {
        128_000
    } else if m.contains("o1") || m.contains("o3") {
        200_000
    } else if m.contains("gemini-1.5-pro") || m.contains("gemini-2") {
        1_000_000
    } else if m.contains("llama-3.1") || m.contains("llama-3.3") {
        128_000
    } else if m.contains("mixtral") {
        32_000
    } else {
        DEFAULT_CONTEXT_LIMIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pressure_levels_match_thresholds() {
        let mut usage = TokenUsage::new(1000);
        usage.record_call(700, 10);
        assert_eq!(usage.pressure(), PressureLevel::Ok);
        usage.record_call(760, 10);
        assert_eq!(usage.pressure(), PressureLevel::Warning);
        usage.record_call(910, 10);
        assert_eq!(usage.pressure(), PressureLevel::Critical);
    }

    #[test]
    fn repeated_reads_are_idempotent() {
        let mut usage = TokenUsage::new(1000);
        usage.record_call(500, 20);
        let a = usage.percentage_used();
        let b = usage.percentage_used();
        assert_eq!(a, b);
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut usage = TokenUsage::new(1000);
        usage.record_call(900, 100);
        usage.reset_after_compaction();
        assert_eq!(usage.last_prompt_tokens, 0);
        assert_eq!(usage.prompt_tokens_cumulative, 0);
        assert_eq!(usage.completion_tokens_cumulative, 0);
    }
}
