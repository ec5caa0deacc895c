use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use crate::error::BrowserError;

/// Strategy for locating a Chromium-family binary. Default implementation
/// checks the `CDP_CHROME_BINARY` env var, then a platform-specific list of
/// well-known install locations; tests can substitute a fixed-path strategy
/// instead of touching the real filesystem layout.
pub trait ChromeDiscovery: Send + Sync {
    fn find(&self) -> Result<PathBuf, BrowserError>;
}

pub struct DefaultChromeDiscovery;

impl ChromeDiscovery for DefaultChromeDiscovery {
    fn find(&self) -> Result<PathBuf, BrowserError> {
        if let Ok(path) = std::env::var("CDP_CHROME_BINARY") {
            let p = PathBuf::from(path);
            if p.exists() {
                return Ok(p);
            }
        }
        for candidate in candidate_paths() {
            if candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(BrowserError::ChromeNotFound)
    }
}

fn candidate_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ]
    }
    #[cfg(target_os = "linux")]
    {
        vec![
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/snap/bin/chromium"),
        ]
    }
    #[cfg(target_os = "windows")]
    {
        vec![
            PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        ]
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        vec![]
    }
}

/// A handle to a launched Chrome subprocess. Killed on drop unless the
/// process is intentionally detached by the caller.
pub struct ChromeProcess {
    child: Option<Child>,
    pub port: u16,
}

impl ChromeProcess {
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }
}

impl Drop for ChromeProcess {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Launch a Chrome process with remote debugging enabled on `port`, using
/// `user_data_dir` as its profile directory (a persistent directory keeps
/// cookies/logins across runs). Polls `/json/version` for up to 10s at
/// 300ms intervals before giving up, killing the subprocess on timeout.
pub async fn launch(
    discovery: &dyn ChromeDiscovery,
    port: u16,
    user_data_dir: &std::path::Path,
    headless: bool,
    download_dir: Option<&std::path::Path>,
) -> Result<ChromeProcess, BrowserError> {
    let executable = discovery.find()?;
    std::fs::create_dir_all(user_data_dir).map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

    let mut cmd = Command::new(&executable);
    cmd.arg(format!("--remote-debugging-port={port}"))
        .arg(format!("--user-data-dir={}", user_data_dir.display()))
        .arg("--no-first-run")
        .arg("--no-default-browser-check");

    if headless {
        cmd.arg("--headless=new");
    }
    if let Some(dir) = download_dir {
        std::fs::create_dir_all(dir).map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;
    }

    cmd.stdout(Stdio::null()).stderr(Stdio::null());

    let child = cmd
        .spawn()
        .map_err(|e| BrowserError::LaunchFailed(format!("failed to spawn {}: {e}", executable.display())))?;

    let mut process = ChromeProcess {
        child: Some(child),
        port,
    };

    let deadline = Duration::from_secs(10);
    let poll_interval = Duration::from_millis(300);
    let start = tokio::time::Instant::now();

    loop {
        if start.elapsed() > deadline {
            drop(process.child.take());
            return Err(BrowserError::LaunchTimeout {
                port,
                timeout_secs: deadline.as_secs(),
            });
        }
        if query_version(port).await.is_ok() {
            return Ok(process);
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Browser version info from `/json/version`.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserVersion {
    #[serde(rename = "webSocketDebuggerUrl")]
    pub ws_debugger_url: String,
}

/// A single debuggable target from `/json/list`.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    pub title: String,
    pub url: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub ws_debugger_url: Option<String>,
}

pub async fn query_version(port: u16) -> Result<BrowserVersion, BrowserError> {
    let url = format!("http://127.0.0.1:{port}/json/version");
    let resp = reqwest::get(&url)
        .await
        .map_err(|_| BrowserError::NotRunning { port })?;
    resp.json().await.map_err(|e| BrowserError::LaunchFailed(e.to_string()))
}

pub async fn list_targets(port: u16) -> Result<Vec<TargetInfo>, BrowserError> {
    let url = format!("http://127.0.0.1:{port}/json/list");
    let resp = reqwest::get(&url)
        .await
        .map_err(|_| BrowserError::NotRunning { port })?;
    resp.json().await.map_err(|e| BrowserError::LaunchFailed(e.to_string()))
}

pub async fn new_target(port: u16, url: &str) -> Result<TargetInfo, BrowserError> {
    let endpoint = format!("http://127.0.0.1:{port}/json/new?{}", urlencoding_minimal(url));
    let resp = reqwest::Client::new()
        .put(&endpoint)
        .send()
        .await
        .map_err(|_| BrowserError::NotRunning { port })?;
    resp.json().await.map_err(|e| BrowserError::LaunchFailed(e.to_string()))
}

pub async fn close_target(port: u16, target_id: &str) -> Result<(), BrowserError> {
    let endpoint = format!("http://127.0.0.1:{port}/json/close/{target_id}");
    reqwest::get(&endpoint)
        .await
        .map_err(|_| BrowserError::NotRunning { port })?;
    Ok(())
}

fn urlencoding_minimal(s: &str) -> String {
    s.replace(' ', "%20")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDiscovery(PathBuf);
    impl ChromeDiscovery for FixedDiscovery {
        fn find(&self) -> Result<PathBuf, BrowserError> {
            if self.0.exists() {
                Ok(self.0.clone())
            } else {
                Err(BrowserError::ChromeNotFound)
            }
        }
    }

    #[test]
    fn discovery_strategy_is_injectable() {
        let d = FixedDiscovery(PathBuf::from("/nonexistent/chrome"));
        assert!(matches!(d.find(), Err(BrowserError::ChromeNotFound)));
    }
}
