//! Browser tool (SPEC_FULL §4.4): the stateful adapter between the Agent
//! Loop and `helm_cdp::Browser`. Owns one CDP connection, tab-ownership
//! accounting (`initial_tabs`/`opened_tabs`), and the `CDP_URL` override.

use std::collections::HashSet;

use helm_cdp::Browser;
use serde::Deserialize;
use serde_json::Value;

use super::ToolContext;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum BrowserAction {
    Open { url: String },
    Elements { selector: Option<String> },
    Click { index: usize },
    Type { index: usize, text: String },
    Text { selector: Option<String> },
    Html { selector: String },
    Eval { expression: String },
    ClickXy { x: f64, y: f64 },
    HoverXy { x: f64, y: f64 },
    DragXy { from_x: f64, from_y: f64, to_x: f64, to_y: f64 },
    Keys { keys: Vec<String> },
    Upload { index: usize, paths: Vec<String> },
    Screenshot,
    Scroll { direction: String, amount: Option<f64> },
    Newtab { url: String },
    Tab { index: usize },
    Back,
    Forward,
    Refresh,
    Cleanup,
    Search { query: String },
}

/// Per-agent browser state: the (lazily connected) driver plus tab
/// ownership bookkeeping (SPEC_FULL §3 Tab invariant).
pub struct BrowserToolState {
    browser: Option<Browser>,
    port: u16,
    profile_dir: std::path::PathBuf,
    cdp_url_override: Option<String>,
    initial_tabs: Option<HashSet<String>>,
    opened_tabs: Vec<String>,
    active_tab: Option<String>,
}

impl BrowserToolState {
    pub fn new(port: u16, profile_dir: std::path::PathBuf, cdp_url_override: Option<String>) -> Self {
        Self {
            browser: None,
            port,
            profile_dir,
            cdp_url_override,
            initial_tabs: None,
            opened_tabs: Vec::new(),
            active_tab: None,
        }
    }

    /// Lazily connects on first use. If `CDP_URL` is set in the
    /// environment it wins over the configured profile port
    /// (SPEC_FULL §4.4).
    async fn ensure_connected(&mut self) -> anyhow::Result<()> {
        if self.browser.is_some() {
            return Ok(());
        }
        let override_url = std::env::var("CDP_URL").ok().or_else(|| self.cdp_url_override.clone());
        let browser = if let Some(url) = override_url {
            let port = url
                .rsplit(':')
                .next()
                .and_then(|p| p.trim_end_matches('/').parse::<u16>().ok())
                .unwrap_or(self.port);
            Browser::connect(port).await?
        } else {
            Browser::launch_default(self.port, &self.profile_dir).await?
        };

        let tabs = browser.tabs().await.unwrap_or_default();
        self.initial_tabs = Some(tabs.into_iter().map(|t| t.id).collect());
        self.browser = Some(browser);
        Ok(())
    }

    fn browser(&self) -> Option<&Browser> {
        self.browser.as_ref()
    }

    /// Close every live page target not in `initial_tabs` (falling back
    /// to `opened_tabs` if no snapshot was ever taken). Prevents the
    /// agent from leaking tabs while never closing tabs the human user
    /// had open (SPEC_FULL §4.4).
    pub async fn cleanup(&mut self) -> String {
        let Some(browser) = self.browser.as_ref() else {
            return "no active browser connection".to_string();
        };
        let keep: HashSet<String> = match &self.initial_tabs {
            Some(set) => set.clone(),
            None => HashSet::new(),
        };
        let to_close: Vec<String> = match browser.tabs().await {
            Ok(tabs) => {
                if self.initial_tabs.is_some() {
                    tabs.into_iter().map(|t| t.id).filter(|id| !keep.contains(id)).collect()
                } else {
                    self.opened_tabs.clone()
                }
            }
            Err(_) => self.opened_tabs.clone(),
        };
        let mut closed = 0usize;
        for id in &to_close {
            if browser.close_tab(id).await.is_ok() {
                closed += 1;
            }
        }
        self.opened_tabs.retain(|id| !to_close.contains(id));
        format!("closed {closed} tab(s) not present in the initial snapshot")
    }
}

const TEXT_CAP_BYTES: usize = 8 * 1024;
const HTML_CAP_BYTES: usize = 10 * 1024;

fn cap(s: String, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        s
    } else {
        let mut truncated: String = s.chars().take(max_bytes).collect();
        truncated.push_str("\n[truncated]");
        truncated
    }
}

pub async fn execute(args: Value, ctx: &ToolContext) -> String {
    let action: BrowserAction = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return format!("invalid browser tool arguments: {e}"),
    };

    let mut state = ctx.browser.lock().await;
    if let Err(e) = state.ensure_connected().await {
        return format!("Browser error: could not connect to Chromium — {e}. Hint: check the configured profile port is free and Chromium is installed.");
    }

    match action {
        BrowserAction::Newtab { url } => {
            let Some(browser) = state.browser.as_ref() else {
                return "browser not connected".to_string();
            };
            match browser.newtab(&url).await {
                Ok(tab) => {
                    state.opened_tabs.push(tab.target_id.clone());
                    state.active_tab = Some(tab.target_id.clone());
                    format!("opened new tab {} at {url}", tab.target_id)
                }
                Err(e) => format!("Browser error: {e}"),
            }
        }
        BrowserAction::Cleanup => state.cleanup().await,
        BrowserAction::Search { query } => {
            let target_id = state.active_tab.clone();
            let Some(browser) = state.browser() else {
                return "browser not connected".to_string();
            };
            let tab_result = match &target_id {
                Some(id) => browser.tab(id).await,
                None => return "no active tab; call 'open' or 'newtab' first".to_string(),
            };
            let Ok(tab) = tab_result else {
                return "Browser error: active tab not found".to_string();
            };
            let url = format!("https://www.google.com/search?q={}", urlencoding_minimal(&query));
            if let Err(e) = tab.open(&url).await {
                return format!("Browser error: {e}");
            }
            match tab
                .eval(
                    "JSON.stringify(Array.from(document.querySelectorAll('a h3')).slice(0,10).map(h => ({title: h.textContent, url: (h.closest('a')||{}).href})).filter(r => r.url && !r.url.includes('google.')))",
                )
                .await
            {
                Ok(v) => cap(v.to_string(), TEXT_CAP_BYTES),
                Err(e) => format!("Browser error: {e}"),
            }
        }
        other => {
            let target_id = state.active_tab.clone();
            let Some(browser) = state.browser() else {
                return "browser not connected".to_string();
            };

            // `open` creates the first tab implicitly if none is active yet.
            if let BrowserAction::Open { url } = &other {
                let tab = match &target_id {
                    Some(id) => browser.tab(id).await,
                    None => browser.newtab("about:blank").await,
                };
                let tab = match tab {
                    Ok(t) => t,
                    Err(e) => return format!("Browser error: {e}"),
                };
                if target_id.is_none() {
                    state.active_tab = Some(tab.target_id.clone());
                    state.opened_tabs.push(tab.target_id.clone());
                }
                return match tab.open(url).await {
                    Ok(()) => format!("navigated to {url}"),
                    Err(e) => format!("Browser error: {e}"),
                };
            }

            let Some(target_id) = target_id else {
                return "no active tab; call 'open' or 'newtab' first".to_string();
            };
            let tab = match browser.tab(&target_id).await {
                Ok(t) => t,
                Err(e) => return format!("Browser error: {e}"),
            };

            match other {
                BrowserAction::Elements { selector: _ } => match tab.ensure_indexed().await {
                    Ok(elements) => {
                        if elements.is_empty() {
                            "no interactive elements found on this page".to_string()
                        } else {
                            elements
                                .iter()
                                .map(|e| format!("[{}] ({}) {}", e.index, e.label, e.description))
                                .collect::<Vec<_>>()
                                .join("\n")
                        }
                    }
                    Err(e) => format!("Browser error: {e}"),
                },
                BrowserAction::Click { index } => match tab.click(index).await {
                    Ok(()) => format!("clicked element [{index}]"),
                    Err(e) => format!("Browser error: Element [{index}] not found or not clickable — {e}"),
                },
                BrowserAction::Type { index, text } => match tab.r#type(index, &text).await {
                    Ok(()) => format!("typed into element [{index}]"),
                    Err(e) => format!("Browser error: {e}"),
                },
                BrowserAction::Text { selector } => match tab.text(selector.as_deref()).await {
                    Ok(text) => cap(text, TEXT_CAP_BYTES),
                    Err(e) => format!("Browser error: {e}"),
                },
                BrowserAction::Html { selector } => match tab.html(&selector).await {
                    Ok(html) => cap(html, HTML_CAP_BYTES),
                    Err(e) => format!("Browser error: {e}"),
                },
                BrowserAction::Eval { expression } => match tab.eval(&expression).await {
                    Ok(value) => value.to_string(),
                    Err(e) => format!("Browser error: {e}"),
                },
                BrowserAction::ClickXy { x, y } => match tab.click_xy(x, y).await {
                    Ok(()) => format!("clicked at ({x}, {y})"),
                    Err(e) => format!("Browser error: {e}"),
                },
                BrowserAction::HoverXy { x, y } => match tab.hover_xy(x, y).await {
                    Ok(()) => format!("hovered at ({x}, {y})"),
                    Err(e) => format!("Browser error: {e}"),
                },
                BrowserAction::DragXy { from_x, from_y, to_x, to_y } => {
                    match tab.drag_xy((from_x, from_y), (to_x, to_y)).await {
                        Ok(()) => format!("dragged from ({from_x}, {from_y}) to ({to_x}, {to_y})"),
                        Err(e) => format!("Browser error: {e}"),
                    }
                }
                BrowserAction::Keys { keys } => {
                    let mut applied = Vec::new();
                    for key in &keys {
                        let result = apply_key_action(&tab, key).await;
                        if let Err(e) = result {
                            return format!("Browser error: {e} while applying '{key}'");
                        }
                        applied.push(key.clone());
                    }
                    format!("applied keys: {}", applied.join(", "))
                }
                BrowserAction::Upload { index, paths } => match tab.upload(index, &paths).await {
                    Ok(()) => format!("uploaded {} file(s) to element [{index}]", paths.len()),
                    Err(e) => format!("Browser error: {e}"),
                },
                BrowserAction::Screenshot => match tab.screenshot().await {
                    Ok(bytes) => {
                        use base64::Engine;
                        let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
                        format!("data:image/png;base64,{b64}")
                    }
                    Err(e) => format!("Browser error: {e}"),
                },
                BrowserAction::Scroll { direction, amount } => {
                    let amount = amount.unwrap_or(400.0);
                    let (dx, dy) = match direction.as_str() {
                        "up" => (0.0, -amount),
                        "down" => (0.0, amount),
                        "top" => (0.0, -1_000_000.0),
                        "bottom" => (0.0, 1_000_000.0),
                        other => {
                            return format!("unknown scroll direction '{other}'");
                        }
                    };
                    match tab.scroll(dx, dy).await {
                        Ok(()) => format!("scrolled {direction}"),
                        Err(e) => format!("Browser error: {e}"),
                    }
                }
                BrowserAction::Tab { index } => {
                    let tabs = match browser.tabs().await {
                        Ok(t) => t,
                        Err(e) => return format!("Browser error: {e}"),
                    };
                    match tabs.get(index) {
                        Some(t) => format!("[{index}] {} — {}", t.title, t.url),
                        None => format!(
                            "Browser error: tab index {index} out of range (0..{})",
                            tabs.len()
                        ),
                    }
                }
                BrowserAction::Back => match tab.back().await {
                    Ok(()) => "navigated back".to_string(),
                    Err(e) => format!("Browser error: {e}"),
                },
                BrowserAction::Forward => match tab.forward().await {
                    Ok(()) => "navigated forward".to_string(),
                    Err(e) => format!("Browser error: {e}"),
                },
                BrowserAction::Refresh => match tab.refresh().await {
                    Ok(()) => "refreshed page".to_string(),
                    Err(e) => format!("Browser error: {e}"),
                },
                BrowserAction::Open { .. } | BrowserAction::Newtab { .. } | BrowserAction::Cleanup | BrowserAction::Search { .. } => {
                    unreachable!("handled above")
                }
            }
        }
    }
}

/// Applies one token of a "keys" action list (SPEC_FULL §4.1 "Keyboard
/// stream"): a named key flag, a `--combo mod+key`, a `--delay ms`
/// directive, or otherwise literal text inserted verbatim.
async fn apply_key_action(tab: &helm_cdp::browser::Tab, action: &str) -> Result<(), helm_cdp::error::BrowserError> {
    if let Some(ms) = action.strip_prefix("--delay ").and_then(|s| s.trim().parse::<u64>().ok()) {
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        return Ok(());
    }
    if let Some(combo) = action.strip_prefix("--combo ") {
        if let Some((modifiers, descriptor)) = helm_cdp::js::parse_combo(combo.trim()) {
            return tab.key_press(&descriptor, modifiers).await;
        }
        return Ok(());
    }
    if let Some(name) = action.strip_prefix("--") {
        if let Some(descriptor) = helm_cdp::js::named_key(name) {
            return tab.key_press(&descriptor, 0).await;
        }
    }
    tab.insert_text(action).await
}

fn urlencoding_minimal(s: &str) -> String {
    s.chars()
        .map(|c| if c == ' ' { '+' } else { c })
        .collect::<String>()
}
