use tokio::sync::mpsc;
use tokio::time::Duration;

use crate::error::CdpError;
use crate::transport::{self, TransportHandle};
use crate::types::CdpEvent;

#[derive(Debug, Clone)]
pub struct CdpConfig {
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub channel_capacity: usize,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            channel_capacity: 256,
        }
    }
}

/// A CDP client connected to Chrome's browser-level WebSocket endpoint.
pub struct CdpClient {
    handle: TransportHandle,
    config: CdpConfig,
}

impl CdpClient {
    pub async fn connect(url: &str, config: CdpConfig) -> Result<Self, CdpError> {
        let handle = transport::connect(url, config.channel_capacity, config.connect_timeout).await?;
        Ok(Self { handle, config })
    }

    pub async fn send_command(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, CdpError> {
        self.handle
            .send_command(method, params, None, self.config.command_timeout)
            .await
    }

    /// Attach to a target (tab) and obtain a session-scoped sub-client.
    pub async fn create_session(&self, target_id: &str) -> Result<CdpSession, CdpError> {
        let params = serde_json::json!({ "targetId": target_id, "flatten": true });
        let result = self.send_command("Target.attachToTarget", Some(params)).await?;
        let session_id = result["sessionId"]
            .as_str()
            .ok_or_else(|| CdpError::InvalidResponse("Target.attachToTarget missing sessionId".into()))?
            .to_owned();
        Ok(CdpSession {
            session_id,
            handle: self.handle.clone(),
            config: self.config.clone(),
        })
    }

    pub async fn close(self) -> Result<(), CdpError> {
        self.handle.send(transport::TransportCommand::Shutdown).await
    }
}

/// A CDP session bound to one target. Shares the parent's WebSocket
/// connection; commands and events are routed by `sessionId`.
#[derive(Clone)]
pub struct CdpSession {
    session_id: String,
    handle: TransportHandle,
    config: CdpConfig,
}

impl CdpSession {
    pub async fn send_command(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, CdpError> {
        self.handle
            .send_command(method, params, Some(self.session_id.clone()), self.config.command_timeout)
            .await
    }

    pub async fn subscribe(&self, method: &str) -> Result<mpsc::Receiver<CdpEvent>, CdpError> {
        self.handle
            .subscribe(method, Some(self.session_id.clone()), self.config.channel_capacity)
            .await
    }

    /// Send a command and wait for a specific event to arrive, up to a
    /// timeout. This realizes the "synchronous" request shape the driver's
    /// higher-level operations are built on: fire the command, then block
    /// the calling task until the matching event (or the deadline) occurs.
    ///
    /// Per the transport contract, the command's own response is returned
    /// even if the awaited event never shows up before the timeout — a slow
    /// or event-less page load should not turn into a hard error for a
    /// command that itself succeeded.
    pub async fn send_and_wait(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        wait_for_event: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value, CdpError> {
        let mut events = self.subscribe(wait_for_event).await?;
        let response = self.send_command(method, params).await?;
        let _ = tokio::time::timeout(timeout, events.recv()).await;
        Ok(response)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}
