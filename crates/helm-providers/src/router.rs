//! Credential resolution, provider construction, and the live model
//! catalogue: one place that knows every wire dialect this repo speaks.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::{anthropic::AnthropicProvider, openai::OpenAIProvider, LLMProvider};

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

/// Caller-supplied provider configuration, independent of how it was
/// stored on disk (that's `helm-config`'s concern).
#[derive(Debug, Clone, Default)]
pub struct ProviderSpec {
    pub name: String,
    pub kind: Option<ProviderKind>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub region: Option<String>,
    pub deployment: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Whether a credential was found, and from where, without ever exposing
/// the raw value (`original_source/tappi/agent/config.py`'s `PROVIDERS`
/// masking behavior).
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub configured: bool,
    pub source: CredentialSource,
    /// Last 4 characters only, e.g. `"...ab12"`, or `None` if unconfigured.
    pub masked_preview: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    ConfigFile,
    EnvironmentVariable,
    None,
}

fn mask(secret: &str) -> String {
    if secret.len() <= 4 {
        "...".to_string()
    } else {
        format!("...{}", &secret[secret.len() - 4..])
    }
}

/// Env vars checked per provider kind, in order, when the config file
/// doesn't carry an explicit key. The config-file value always wins when
/// present.
fn env_var_chain(kind: ProviderKind) -> &'static [&'static str] {
    match kind {
        ProviderKind::OpenAiCompatible => &["OPENAI_API_KEY"],
        ProviderKind::AnthropicNative => &["ANTHROPIC_API_KEY"],
        ProviderKind::AnthropicOAuth => &["CLAUDE_MAX_ACCESS_TOKEN"],
        ProviderKind::AwsBedrock => &["AWS_BEARER_TOKEN_BEDROCK", "AWS_ACCESS_KEY_ID"],
        ProviderKind::Azure => &["AZURE_OPENAI_API_KEY"],
        ProviderKind::GoogleVertex => &["GOOGLE_APPLICATION_CREDENTIALS", "GOOGLE_API_KEY"],
        ProviderKind::OpenRouter => &["OPENROUTER_API_KEY"],
    }
}

/// Resolve a credential for `spec`, trying the explicit config value
/// first and then each env var in `spec.kind`'s chain.
pub fn resolve_credential(spec: &ProviderSpec) -> (Option<String>, CredentialStatus) {
    if let Some(key) = &spec.api_key {
        if !key.is_empty() {
            return (
                Some(key.clone()),
                CredentialStatus {
                    configured: true,
                    source: CredentialSource::ConfigFile,
                    masked_preview: Some(mask(key)),
                },
            );
        }
    }

    if let Some(kind) = spec.kind {
        for var in env_var_chain(kind) {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    debug!("resolved credential for '{}' from ${}", spec.name, var);
                    return (
                        Some(value.clone()),
                        CredentialStatus {
                            configured: true,
                            source: CredentialSource::EnvironmentVariable,
                            masked_preview: Some(mask(&value)),
                        },
                    );
                }
            }
        }
    }

    (
        None,
        CredentialStatus {
            configured: false,
            source: CredentialSource::None,
            masked_preview: None,
        },
    )
}

/// Build a concrete `LLMProvider` from a spec, resolving its credential
/// first. Bedrock/Azure/Vertex currently route through the OpenAI-
/// compatible dialect with a kind-specific base URL and model-id prefix,
/// since this repo has no bespoke wire client for them yet (see
/// DESIGN.md).
pub fn build_provider(spec: &ProviderSpec) -> Result<Box<dyn LLMProvider>> {
    let (credential, status) = resolve_credential(spec);
    if !status.configured {
        anyhow::bail!(
            "no credential configured for provider '{}' (checked config file and env vars)",
            spec.name
        );
    }
    let api_key = credential.context("unreachable: configured implies Some")?;

    match spec.kind.unwrap_or(ProviderKind::AnthropicNative) {
        ProviderKind::AnthropicNative => Ok(Box::new(AnthropicProvider::new(
            api_key,
            spec.model.clone(),
            spec.max_tokens,
            spec.temperature,
        )?)),
        ProviderKind::AnthropicOAuth => {
            let provider = AnthropicProvider::new(
                api_key.clone(),
                spec.model.clone(),
                spec.max_tokens,
                spec.temperature,
            )?
            .with_oauth_token(api_key);
            Ok(Box::new(provider))
        }
        ProviderKind::OpenAiCompatible => Ok(Box::new(OpenAIProvider::new_with_name(
            spec.name.clone(),
            api_key,
            spec.model.clone(),
            spec.base_url.clone(),
            spec.max_tokens,
            spec.temperature,
        )?)),
        ProviderKind::OpenRouter => Ok(Box::new(OpenAIProvider::new_with_name(
            spec.name.clone(),
            api_key,
            spec.model.clone(),
            Some(
                spec.base_url
                    .clone()
                    .unwrap_or_else(|| "https://openrouter.ai/api/v1".to_string()),
            ),
            spec.max_tokens,
            spec.temperature,
        )?)),
        ProviderKind::Azure => {
            let deployment = spec
                .deployment
                .as_deref()
                .context("Azure provider requires a deployment name")?;
            let base_url = spec
                .base_url
                .as_deref()
                .context("Azure provider requires a base_url")?;
            Ok(Box::new(OpenAIProvider::new_with_name(
                spec.name.clone(),
                api_key,
                spec.model.clone(),
                Some(format!("{base_url}/openai/deployments/{deployment}")),
                spec.max_tokens,
                spec.temperature,
            )?))
        }
        ProviderKind::AwsBedrock => {
            // Bedrock model ids carry a region prefix (e.g. "us.anthropic...").
            let model = spec.model.as_deref().unwrap_or("anthropic.claude-3-5-sonnet-20241022-v2:0");
            let region = spec.region.as_deref().unwrap_or("us-east-1");
            let prefixed_model = format!("{}.{}", region.split('-').next().unwrap_or("us"), model);
            Ok(Box::new(OpenAIProvider::new_with_name(
                spec.name.clone(),
                api_key,
                Some(prefixed_model),
                spec.base_url.clone(),
                spec.max_tokens,
                spec.temperature,
            )?))
        }
        ProviderKind::GoogleVertex => Ok(Box::new(OpenAIProvider::new_with_name(
            spec.name.clone(),
            api_key,
            spec.model.clone(),
            Some(
                spec.base_url
                    .clone()
                    .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta/openai".to_string()),
            ),
            spec.max_tokens,
            spec.temperature,
        )?)),
    }
}

/// One entry in the model catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub context_window: u32,
    pub supports_tool_use: bool,
}

const CATALOG_TTL: Duration = Duration::from_secs(600);

fn fallback_catalog() -> Vec<ModelInfo> {
    vec![
        ModelInfo { id: "claude-sonnet-4-5".into(), context_window: 200_000, supports_tool_use: true },
        ModelInfo { id: "claude-opus-4-1".into(), context_window: 200_000, supports_tool_use: true },
        ModelInfo { id: "gpt-4o".into(), context_window: 128_000, supports_tool_use: true },
        ModelInfo { id: "gpt-4o-mini".into(), context_window: 128_000, supports_tool_use: true },
    ]
}

struct CatalogEntry {
    models: Vec<ModelInfo>,
    fetched_at: Instant,
}

/// Caches the live model list per provider name for `CATALOG_TTL`,
/// falling back to a hardcoded list on fetch failure or first use.
pub struct ModelCatalog {
    cache: RwLock<HashMap<String, CatalogEntry>>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self { cache: RwLock::new(HashMap::new()) }
    }

    /// Returns the cached list if still fresh, else `None` (caller should
    /// fetch and call `store`).
    pub fn get(&self, provider_name: &str) -> Option<Vec<ModelInfo>> {
        let cache = self.cache.read().unwrap();
        cache.get(provider_name).and_then(|entry| {
            if entry.fetched_at.elapsed() < CATALOG_TTL {
                Some(entry.models.clone())
            } else {
                None
            }
        })
    }

    pub fn store(&self, provider_name: &str, models: Vec<ModelInfo>) {
        self.cache.write().unwrap().insert(
            provider_name.to_string(),
            CatalogEntry { models, fetched_at: Instant::now() },
        );
    }

    /// Models supporting tool use, falling back to the hardcoded list
    /// when no live fetch has populated the cache yet.
    pub fn tool_capable_models(&self, provider_name: &str) -> Vec<ModelInfo> {
        let models = self.get(provider_name).unwrap_or_else(|| {
            warn!("no cached model catalog for '{provider_name}', using fallback list");
            fallback_catalog()
        });
        models.into_iter().filter(|m| m.supports_tool_use).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_key_wins_over_env() {
        std::env::set_var("ANTHROPIC_API_KEY", "env-key");
        let spec = ProviderSpec {
            name: "anthropic".into(),
            kind: Some(ProviderKind::AnthropicNative),
            api_key: Some("config-key".into()),
            ..Default::default()
        };
        let (resolved, status) = resolve_credential(&spec);
        assert_eq!(resolved.as_deref(), Some("config-key"));
        assert_eq!(status.source, CredentialSource::ConfigFile);
        std::env::remove_var("ANTHROPIC_API_KEY");
    }

    #[test]
    fn falls_back_to_env_var() {
        std::env::set_var("OPENAI_API_KEY", "sk-fromenv");
        let spec = ProviderSpec {
            name: "openai".into(),
            kind: Some(ProviderKind::OpenAiCompatible),
            ..Default::default()
        };
        let (resolved, status) = resolve_credential(&spec);
        assert_eq!(resolved.as_deref(), Some("sk-fromenv"));
        assert_eq!(status.source, CredentialSource::EnvironmentVariable);
        std::env::remove_var("OPENAI_API_KEY");
    }

    #[test]
    fn unconfigured_reports_none() {
        std::env::remove_var("OPENROUTER_API_KEY");
        let spec = ProviderSpec {
            name: "openrouter".into(),
            kind: Some(ProviderKind::OpenRouter),
            ..Default::default()
        };
        let (resolved, status) = resolve_credential(&spec);
        assert!(resolved.is_none());
        assert!(!status.configured);
    }

    #[test]
    fn masked_preview_keeps_last_four() {
        let preview = mask("sk-ant-abcdef1234");
        assert_eq!(preview, "...1234");
    }

    #[test]
    fn catalog_falls_back_when_empty() {
        let catalog = ModelCatalog::new();
        let models = catalog.tool_capable_models("anthropic");
        assert!(!models.is_empty());
    }

    #[test]
    fn catalog_stores_and_retrieves() {
        let catalog = ModelCatalog::new();
        catalog.store("anthropic", fallback_catalog());
        assert!(catalog.get("anthropic").is_some());
    }
}
