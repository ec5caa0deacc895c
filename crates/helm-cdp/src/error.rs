use thiserror::Error;

/// Errors from the CDP transport layer.
#[derive(Debug, Error)]
pub enum CdpError {
    #[error("CDP connection error: {0}")]
    Connection(String),

    #[error("CDP connection timed out")]
    ConnectionTimeout,

    #[error("CDP command timed out: {method}")]
    CommandTimeout { method: String },

    #[error("CDP protocol error ({code}): {message}")]
    Protocol { code: i64, message: String },

    #[error("CDP connection closed")]
    ConnectionClosed,

    #[error("CDP invalid response: {0}")]
    InvalidResponse(String),

    #[error("CDP internal error: {0}")]
    Internal(String),
}

/// Browser-level errors surfaced to callers above the transport.
///
/// `NotRunning` carries the exact remediation hint the agent relays to
/// the LLM when a tool call hits it: no Chrome instance answers on the
/// configured debugging port.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error(
        "No Chrome instance is running on port {port}. Start one with:\n\
        \n  chrome --remote-debugging-port={port}\n\
        \nor let the browser tool launch a managed instance with a persistent profile."
    )]
    NotRunning { port: u16 },

    #[error("CDP error: {0}")]
    Cdp(#[from] CdpError),

    #[error("tab not found: {0}")]
    TabNotFound(String),

    #[error("element not found at index {0}")]
    ElementNotFound(usize),

    #[error("chrome binary not found; set CDP_CHROME_BINARY or install Chrome/Chromium")]
    ChromeNotFound,

    #[error("chrome did not become ready on port {port} within {timeout_secs}s")]
    LaunchTimeout { port: u16, timeout_secs: u64 },

    #[error("failed to launch chrome: {0}")]
    LaunchFailed(String),
}
