//! Configuration file, browser profiles, and workspace path resolution.
//!
//! The on-disk shape is one JSON document, normally at `~/.helm/config.json`
//! (see `Config::default_path`): a map of named Chromium profiles plus one
//! `agent` block carrying the model/provider selection and tool toggles.
//! The provider set is the one the browser agent's router understands
//! (`helm_providers::router`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod profile;
mod workspace;

pub use profile::{Profile, ProfileStore};
pub use workspace::Workspace;

pub const APP_DIR_NAME: &str = ".helm";

/// Root configuration document, serialized at `~/.helm/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name of the default browser profile, if any are configured.
    pub default: Option<String>,
    /// Named Chromium profiles: `(name) -> (port, data_dir)`.
    #[serde(default)]
    pub profiles: HashMap<String, ProfileEntry>,
    pub agent: AgentConfig,
}

/// Port/data-dir pair for one named profile, as stored in the config file.
/// The filesystem path is derived (`~/.helm/profiles/<name>/`) rather than
/// stored, so moving the home directory doesn't orphan the reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub provider: String,
    pub model: String,
    pub workspace: String,
    pub browser_profile: String,
    #[serde(default = "default_true")]
    pub shell_enabled: bool,
    #[serde(default = "default_true")]
    pub decompose_enabled: bool,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_main_max_tokens")]
    pub main_max_tokens: u32,
    #[serde(default = "default_subagent_max_tokens")]
    pub subagent_max_tokens: u32,
    /// Overrides profile/port resolution; also settable via the `CDP_URL`
    /// environment variable at connection time (the env var wins).
    #[serde(default)]
    pub cdp_url: Option<String>,
    #[serde(default)]
    pub iteration_cap: Option<u32>,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
}

fn default_true() -> bool {
    true
}
fn default_timeout() -> u64 {
    300
}
fn default_main_max_tokens() -> u32 {
    8192
}
fn default_subagent_max_tokens() -> u32 {
    4096
}

/// One provider's credentials/endpoint, keyed by provider name in
/// `agent.providers`. `kind` selects which wire dialect `helm-providers`
/// speaks to it; the rest of the fields are interpreted per-kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub kind: ProviderKind,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub deployment: Option<String>,
    #[serde(default)]
    pub context_length: Option<u32>,
}

/// The provider dialects the router (`helm_providers`) knows how to speak.
/// See SPEC_FULL §4.6 for the quirks each kind carries (Bedrock model-id
/// prefixing, Azure deployment-name routing, OpenRouter-as-OpenAI-compat).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    OpenAiCompatible,
    AnthropicNative,
    AnthropicOAuth,
    AwsBedrock,
    Azure,
    GoogleVertex,
    OpenRouter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default: None,
            profiles: HashMap::new(),
            agent: AgentConfig {
                provider: "anthropic".to_string(),
                model: "claude-sonnet-4-5".to_string(),
                workspace: dirs::home_dir()
                    .map(|h| h.join("helm-workspace").display().to_string())
                    .unwrap_or_else(|| "./helm-workspace".to_string()),
                browser_profile: "default".to_string(),
                shell_enabled: true,
                decompose_enabled: true,
                timeout: default_timeout(),
                main_max_tokens: default_main_max_tokens(),
                subagent_max_tokens: default_subagent_max_tokens(),
                cdp_url: None,
                iteration_cap: None,
                providers: HashMap::new(),
            },
        }
    }
}

impl Config {
    /// `~/.helm/config.json`.
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join("config.json"))
    }

    pub fn app_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir()
            .context("could not determine home directory")?
            .join(APP_DIR_NAME))
    }

    pub fn jobs_path() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join("jobs.json"))
    }

    pub fn sessions_dir() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join("sessions"))
    }

    pub fn profiles_dir() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join("profiles"))
    }

    /// Load from `path`, or the default path, creating+saving a default
    /// document if nothing exists yet.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        if !resolved.exists() {
            let default_config = Self::default();
            if let Some(parent) = resolved.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            default_config.save(&resolved)?;
            return Ok(default_config);
        }

        let content = std::fs::read_to_string(&resolved)
            .with_context(|| format!("reading config at {}", resolved.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("parsing config at {}", resolved.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write-temp-then-rename so a crash mid-write never corrupts the
    /// previous config (last-write-wins across concurrent runs is the
    /// accepted tradeoff; see SPEC_FULL §5).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(default) = &self.default {
            if !self.profiles.contains_key(default) {
                anyhow::bail!("default profile '{}' is not in profiles", default);
            }
        }
        let mut ports = std::collections::HashSet::new();
        for (name, entry) in &self.profiles {
            if !profile::is_filesystem_safe_name(name) {
                anyhow::bail!(
                    "profile name '{}' must be lowercase alphanumerics, '-', or '_'",
                    name
                );
            }
            if !ports.insert(entry.port) {
                anyhow::bail!("profile port {} is used by more than one profile", entry.port);
            }
        }
        Ok(())
    }

    /// Resolve the CDP endpoint port for a named profile, creating the
    /// entry (picking a free-ish port) if it doesn't exist yet.
    pub fn resolve_profile_port(&self, name: &str) -> Option<u16> {
        self.profiles.get(name).map(|p| p.port)
    }
}

#[cfg(test)]
mod tests;
