use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::{CdpClient, CdpConfig, CdpSession};
use crate::error::BrowserError;
use crate::js;
use crate::launcher::{self, ChromeDiscovery, ChromeProcess, DefaultChromeDiscovery};

/// One indexed, clickable/typeable element as reported by the page's
/// current indexing pass. Indices are only stable within a single turn —
/// any navigation invalidates them and the agent must re-index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub index: usize,
    pub tag: String,
    pub label: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ElementsResponse {
    scope: String,
    elements: Vec<Element>,
}

/// A single browser tab (CDP target), bound to its own attached session.
pub struct Tab {
    pub target_id: String,
    session: CdpSession,
}

impl Tab {
    async fn new(client: &CdpClient, target_id: String) -> Result<Self, BrowserError> {
        let session = client.create_session(&target_id).await?;
        session.send_command("Page.enable", None).await?;
        session.send_command("DOM.enable", None).await?;
        session.send_command("Runtime.enable", None).await?;
        Ok(Self { target_id, session })
    }

    pub async fn url(&self) -> Result<String, BrowserError> {
        let result = self
            .session
            .send_command("Target.getTargetInfo", Some(json!({ "targetId": self.target_id })))
            .await?;
        Ok(result["targetInfo"]["url"].as_str().unwrap_or_default().to_string())
    }

    /// Navigate and wait for `Page.loadEventFired`, up to 30s.
    pub async fn open(&self, url: &str) -> Result<(), BrowserError> {
        self.session
            .send_and_wait(
                "Page.navigate",
                Some(json!({ "url": url })),
                "Page.loadEventFired",
                Duration::from_secs(30),
            )
            .await?;
        Ok(())
    }

    pub async fn back(&self) -> Result<(), BrowserError> {
        self.navigate_history(-1).await
    }

    pub async fn forward(&self) -> Result<(), BrowserError> {
        self.navigate_history(1).await
    }

    async fn navigate_history(&self, delta: i32) -> Result<(), BrowserError> {
        let history = self.session.send_command("Page.getNavigationHistory", None).await?;
        let current = history["currentIndex"].as_i64().unwrap_or(0);
        let entries = history["entries"].as_array().cloned().unwrap_or_default();
        let target_index = current + delta as i64;
        if target_index < 0 || target_index as usize >= entries.len() {
            return Ok(());
        }
        let entry_id = entries[target_index as usize]["id"].clone();
        self.session
            .send_and_wait(
                "Page.navigateToHistoryEntry",
                Some(json!({ "entryId": entry_id })),
                "Page.loadEventFired",
                Duration::from_secs(30),
            )
            .await?;
        Ok(())
    }

    pub async fn refresh(&self) -> Result<(), BrowserError> {
        self.session
            .send_and_wait("Page.reload", None, "Page.loadEventFired", Duration::from_secs(30))
            .await?;
        Ok(())
    }

    pub async fn bring_to_front(&self) -> Result<(), BrowserError> {
        self.session.send_command("Page.bringToFront", None).await?;
        Ok(())
    }

    async fn eval_raw(&self, expression: &str) -> Result<serde_json::Value, BrowserError> {
        let result = self
            .session
            .send_command(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
            )
            .await?;
        if let Some(exception) = result.get("exceptionDetails") {
            return Err(BrowserError::Cdp(crate::error::CdpError::Protocol {
                code: -32000,
                message: exception.to_string(),
            }));
        }
        Ok(result["result"]["value"].clone())
    }

    /// Runs `elements_js` and stamps every interactive element with its
    /// index. Called directly by the `elements` tool, which always wants
    /// a fresh listing regardless of any stamps already on the page.
    pub async fn ensure_indexed(&self) -> Result<Vec<Element>, BrowserError> {
        let value = self.eval_raw(&js::elements_js(None)).await?;
        let raw = value.as_str().unwrap_or("{}");
        let parsed: ElementsResponse = serde_json::from_str(raw)
            .map_err(|e| BrowserError::Cdp(crate::error::CdpError::InvalidResponse(e.to_string())))?;
        Ok(parsed.elements)
    }

    /// Probes whether the page already carries stamps via
    /// `check_indexed_js` and only (re-)runs `elements_js` if none exist.
    /// Used internally by `click`/`type` so `click(0)` works right after
    /// `open(url)` without an explicit `elements()` call first.
    async fn ensure_stamped(&self) -> Result<(), BrowserError> {
        let already = self.eval_raw(&js::check_indexed_js()).await?;
        if already.as_bool().unwrap_or(false) {
            return Ok(());
        }
        self.ensure_indexed().await?;
        Ok(())
    }

    pub async fn click(&self, index: usize) -> Result<(), BrowserError> {
        self.ensure_stamped().await?;
        let info = self.eval_raw(&js::click_info_js(index)).await?;
        let coords: serde_json::Value = serde_json::from_str(info.as_str().unwrap_or("null"))
            .unwrap_or(serde_json::Value::Null);
        if coords.is_null() {
            return Err(BrowserError::ElementNotFound(index));
        }
        let x = coords["x"].as_f64().unwrap_or(0.0);
        let y = coords["y"].as_f64().unwrap_or(0.0);
        self.click_xy(x, y).await
    }

    pub async fn click_xy(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        for event_type in ["mousePressed", "mouseReleased"] {
            self.session
                .send_command(
                    "Input.dispatchMouseEvent",
                    Some(json!({
                        "type": event_type,
                        "x": x,
                        "y": y,
                        "button": "left",
                        "clickCount": 1,
                    })),
                )
                .await?;
        }
        Ok(())
    }

    pub async fn hover_xy(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.session
            .send_command(
                "Input.dispatchMouseEvent",
                Some(json!({ "type": "mouseMoved", "x": x, "y": y })),
            )
            .await?;
        Ok(())
    }

    pub async fn drag_xy(&self, from: (f64, f64), to: (f64, f64)) -> Result<(), BrowserError> {
        self.session
            .send_command(
                "Input.dispatchMouseEvent",
                Some(json!({ "type": "mousePressed", "x": from.0, "y": from.1, "button": "left", "clickCount": 1 })),
            )
            .await?;
        self.session
            .send_command(
                "Input.dispatchMouseEvent",
                Some(json!({ "type": "mouseMoved", "x": to.0, "y": to.1 })),
            )
            .await?;
        self.session
            .send_command(
                "Input.dispatchMouseEvent",
                Some(json!({ "type": "mouseReleased", "x": to.0, "y": to.1, "button": "left", "clickCount": 1 })),
            )
            .await?;
        Ok(())
    }

    /// Clears the indexed element (if it has existing content) and types
    /// `text` into it. Contenteditable and `<input>`/`<textarea>` elements
    /// take different clear/set paths (see `helm_cdp::js`).
    pub async fn r#type(&self, index: usize, text: &str) -> Result<(), BrowserError> {
        self.ensure_stamped().await?;
        let info = self.eval_raw(&js::type_info_js(index)).await?;
        let parsed: serde_json::Value =
            serde_json::from_str(info.as_str().unwrap_or("null")).unwrap_or(serde_json::Value::Null);
        if parsed.is_null() {
            return Err(BrowserError::ElementNotFound(index));
        }
        if parsed["typeable"].as_bool() == Some(false) {
            return Err(BrowserError::Cdp(crate::error::CdpError::InvalidResponse(
                "element is not typeable".into(),
            )));
        }
        if let (Some(x), Some(y)) = (parsed["x"].as_f64(), parsed["y"].as_f64()) {
            self.click_xy(x, y).await?;
        }
        self.eval_raw(&js::clear_input_js(index)).await.ok();
        self.eval_raw(&js::set_input_value_js(index, text)).await?;
        Ok(())
    }

    /// Clears a contenteditable region via Range+Selection+Backspace.
    pub async fn clear_contenteditable(&self, index: usize) -> Result<(), BrowserError> {
        self.eval_raw(&js::clear_contenteditable_js(index)).await?;
        Ok(())
    }

    pub async fn keys(&self, text: &str) -> Result<(), BrowserError> {
        for ch in text.chars() {
            self.session
                .send_command(
                    "Input.dispatchKeyEvent",
                    Some(json!({ "type": "char", "text": ch.to_string() })),
                )
                .await?;
        }
        Ok(())
    }

    /// Dispatches a named key (`Enter`, `ArrowDown`, `Home`, ...) as a
    /// `rawKeyDown` + `keyUp` pair, optionally combined with a CDP
    /// modifiers bitmask (Alt=1, Ctrl=2, Meta=4, Shift=8) for combos like
    /// cmd+b (SPEC_FULL §4.1 "Keyboard stream"). Dispatching both events
    /// (rather than a single synthetic keypress) is what makes framework
    /// `onKeyDown`/`onKeyUp` handlers fire, same rationale as click's real
    /// mouse-event pair.
    pub async fn key_press(&self, descriptor: &js::KeyDescriptor, modifiers: i32) -> Result<(), BrowserError> {
        for event_type in ["rawKeyDown", "keyUp"] {
            self.session
                .send_command(
                    "Input.dispatchKeyEvent",
                    Some(json!({
                        "type": event_type,
                        "key": descriptor.key,
                        "code": descriptor.code,
                        "windowsVirtualKeyCode": descriptor.vk,
                        "nativeVirtualKeyCode": descriptor.vk,
                        "modifiers": modifiers,
                    })),
                )
                .await?;
        }
        Ok(())
    }

    pub async fn insert_text(&self, text: &str) -> Result<(), BrowserError> {
        self.session
            .send_command("Input.insertText", Some(json!({ "text": text })))
            .await?;
        Ok(())
    }

    pub async fn text(&self, selector: Option<&str>) -> Result<String, BrowserError> {
        let value = self.eval_raw(&js::extract_text_js(selector)).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn html(&self, selector: &str) -> Result<String, BrowserError> {
        let value = self.eval_raw(&js::get_html_js(selector)).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn eval(&self, expression: &str) -> Result<serde_json::Value, BrowserError> {
        self.eval_raw(expression).await
    }

    pub async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        let result = self
            .session
            .send_command("Page.captureScreenshot", Some(json!({ "format": "png" })))
            .await?;
        let b64 = result["data"].as_str().unwrap_or_default();
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, b64)
            .map_err(|e| BrowserError::Cdp(crate::error::CdpError::InvalidResponse(e.to_string())))
    }

    pub async fn scroll(&self, dx: f64, dy: f64) -> Result<(), BrowserError> {
        self.eval_raw(&format!("window.scrollBy({dx}, {dy})")).await?;
        Ok(())
    }

    pub async fn upload(&self, index: usize, file_paths: &[String]) -> Result<(), BrowserError> {
        let root = self.session.send_command("DOM.getDocument", None).await?;
        let root_node_id = root["root"]["nodeId"].as_i64().unwrap_or(0);
        let query = self
            .session
            .send_command(
                "DOM.querySelector",
                Some(json!({
                    "nodeId": root_node_id,
                    "selector": format!("[data-helm-idx=\"{index}\"]"),
                })),
            )
            .await?;
        let node_id = query["nodeId"].as_i64().ok_or(BrowserError::ElementNotFound(index))?;
        self.session
            .send_command(
                "DOM.setFileInputFiles",
                Some(json!({ "files": file_paths, "nodeId": node_id })),
            )
            .await?;
        Ok(())
    }
}

/// A long-lived driver for one Chrome instance reachable on `port`.
/// Mirrors the "explicitly open/close lifecycled value" design: callers
/// construct via `Browser::launch`/`Browser::connect` and call
/// `Browser::close` when done, rather than relying on lazy reconnection.
pub struct Browser {
    client: CdpClient,
    port: u16,
    process: Option<ChromeProcess>,
}

impl Browser {
    /// Attach to an already-running Chrome instance on `port`.
    pub async fn connect(port: u16) -> Result<Self, BrowserError> {
        let version = launcher::query_version(port).await?;
        let client = CdpClient::connect(&version.ws_debugger_url, CdpConfig::default())
            .await
            .map_err(BrowserError::Cdp)?;
        Ok(Self {
            client,
            port,
            process: None,
        })
    }

    /// Launch a fresh Chrome instance with a persistent profile directory
    /// and connect to it. `discovery` is injectable so tests can avoid
    /// touching the real filesystem chrome-binary search.
    pub async fn launch(
        discovery: Arc<dyn ChromeDiscovery>,
        port: u16,
        user_data_dir: &std::path::Path,
        headless: bool,
        download_dir: Option<&std::path::Path>,
    ) -> Result<Self, BrowserError> {
        let process = launcher::launch(discovery.as_ref(), port, user_data_dir, headless, download_dir).await?;
        let mut browser = Self::connect(port).await?;
        browser.process = Some(process);
        if let Some(dir) = download_dir {
            browser
                .client
                .send_command(
                    "Browser.setDownloadBehavior",
                    Some(json!({ "behavior": "allow", "downloadPath": dir.display().to_string() })),
                )
                .await
                .map_err(BrowserError::Cdp)?;
        }
        Ok(browser)
    }

    pub async fn launch_default(port: u16, user_data_dir: &std::path::Path) -> Result<Self, BrowserError> {
        Self::launch(Arc::new(DefaultChromeDiscovery), port, user_data_dir, false, None).await
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn tabs(&self) -> Result<Vec<launcher::TargetInfo>, BrowserError> {
        let targets = launcher::list_targets(self.port).await?;
        Ok(targets.into_iter().filter(|t| t.target_type == "page").collect())
    }

    pub async fn tab(&self, target_id: &str) -> Result<Tab, BrowserError> {
        Tab::new(&self.client, target_id.to_string()).await
    }

    pub async fn newtab(&self, url: &str) -> Result<Tab, BrowserError> {
        let target = launcher::new_target(self.port, url).await?;
        Tab::new(&self.client, target.id).await
    }

    pub async fn close_tab(&self, target_id: &str) -> Result<(), BrowserError> {
        launcher::close_target(self.port, target_id).await
    }

    /// Explicit shutdown. Drops the WebSocket connection and, if this
    /// `Browser` launched its own Chrome process, kills it.
    pub async fn close(mut self) -> Result<(), BrowserError> {
        self.process.take();
        self.client.close().await.map_err(BrowserError::Cdp)
    }
}
