//! Credentials for the OAuth-token variant of the Anthropic provider (a
//! Claude subscription token rather than a console API key). Distinct from
//! `ProviderKind::AnthropicNative` only in how the bearer token is obtained
//! and refreshed; the wire format on `/v1/messages` is identical, so this
//! module hands `AnthropicProvider` a token rather than reimplementing the
//! request/response plumbing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const TOKEN_ENDPOINT: &str = "https://console.anthropic.com/v1/oauth/token";
/// Refresh this far ahead of actual expiry so a long-running agent turn
/// never starts a request against a token that expires mid-flight.
const REFRESH_SKEW_SECS: u64 = 120;

/// Credentials persisted at `~/.helm/claude_max_credentials.json` after the
/// user completes the one-time OAuth authorization flow (handled entirely
/// by external collaboration, e.g. the CLI's setup wizard).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMaxCredentials {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: u64,
    #[serde(default)]
    pub client_id: Option<String>,
}

impl ClaudeMaxCredentials {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading OAuth credentials at {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing OAuth credentials at {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn is_expiring(&self) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        now + REFRESH_SKEW_SECS >= self.expires_at
    }
}

/// Thin wrapper that keeps a `ClaudeMaxCredentials` fresh across calls,
/// refreshing and persisting it to disk whenever it's within the skew
/// window of expiry.
pub struct ClaudeMaxOAuth {
    client: reqwest::Client,
    path: PathBuf,
    credentials: tokio::sync::RwLock<ClaudeMaxCredentials>,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
    expires_in: u64,
}

impl ClaudeMaxOAuth {
    pub fn new(path: PathBuf, credentials: ClaudeMaxCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            path,
            credentials: tokio::sync::RwLock::new(credentials),
        }
    }

    pub fn from_disk(path: PathBuf) -> Result<Self> {
        let credentials = ClaudeMaxCredentials::load(&path)?;
        Ok(Self::new(path, credentials))
    }

    /// Returns a valid access token, refreshing it first if it's within
    /// `REFRESH_SKEW_SECS` of expiry.
    pub async fn access_token(&self) -> Result<String> {
        {
            let creds = self.credentials.read().await;
            if !creds.is_expiring() {
                return Ok(creds.access_token.clone());
            }
        }
        self.refresh().await
    }

    async fn refresh(&self) -> Result<String> {
        let mut creds = self.credentials.write().await;
        if !creds.is_expiring() {
            return Ok(creds.access_token.clone());
        }

        debug!("refreshing Claude Max OAuth token");
        let response = self
            .client
            .post(TOKEN_ENDPOINT)
            .json(&serde_json::json!({
                "grant_type": "refresh_token",
                "refresh_token": creds.refresh_token,
                "client_id": creds.client_id,
            }))
            .send()
            .await
            .context("sending OAuth refresh request")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("OAuth token refresh failed ({status}): {text}");
        }

        let refreshed: RefreshResponse = response.json().await.context("parsing OAuth refresh response")?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        creds.access_token = refreshed.access_token;
        creds.refresh_token = refreshed.refresh_token;
        creds.expires_at = now + refreshed.expires_in;
        creds.save(&self.path)?;

        Ok(creds.access_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        let creds = ClaudeMaxCredentials {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            expires_at: 9_999_999_999,
            client_id: Some("client".into()),
        };
        creds.save(&path).unwrap();
        let loaded = ClaudeMaxCredentials::load(&path).unwrap();
        assert_eq!(loaded.access_token, "at");
        assert!(!loaded.is_expiring());
    }

    #[test]
    fn expired_token_is_flagged() {
        let creds = ClaudeMaxCredentials {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            expires_at: 1,
            client_id: None,
        };
        assert!(creds.is_expiring());
    }
}
