//! JS expression builders for page indexing and interaction.
//!
//! Every element the agent can act on is addressed by a small integer
//! index rather than a CSS selector, because selectors break across
//! shadow-DOM boundaries and dynamic re-renders. `elements_js` walks the
//! page (piercing open shadow roots), stamps each interactive element
//! with a `data-helm-idx` attribute, and returns a compact description
//! list. Later calls (`click_info_js`, `type_info_js`, ...) look elements
//! up by that stamped index, so they stay valid across a single turn
//! even if the agent made several earlier `eval` calls.

const INTERACTIVE_SELECTOR: &str = concat!(
    "a[href], button, input, select, textarea, [role=\"button\"], [role=\"link\"], ",
    "[role=\"textbox\"], [role=\"checkbox\"], [role=\"radio\"], [role=\"combobox\"], ",
    "[role=\"menuitem\"], [role=\"tab\"], [contenteditable=\"true\"], [onclick], ",
    "[tabindex]:not([tabindex=\"-1\"]), details > summary"
);

const LABEL_CAP: usize = 120;

/// Shared deep-query helper injected once per page: walks light DOM and
/// pierces every open shadow root, yielding a flat array of elements
/// matching `selector` regardless of shadow nesting depth.
fn deep_query_helper() -> String {
    r#"
if (!window.__helmDeepQuery) {
  window.__helmDeepQuery = function(root, selector, out) {
    out = out || [];
    const matches = root.querySelectorAll(selector);
    for (const el of matches) out.push(el);
    const all = root.querySelectorAll('*');
    for (const el of all) {
      if (el.shadowRoot) window.__helmDeepQuery(el.shadowRoot, selector, out);
    }
    return out;
  };
}
"#
    .to_string()
}

/// Shared deep-lookup-by-stamped-index helper: `document.querySelector`
/// can't cross shadow-DOM boundaries, but `elements_js` stamps elements
/// inside shadow roots too, so every later click/type/clear/set call needs
/// this to resolve a `data-helm-idx` stamp wherever it actually lives.
fn deep_find_helper() -> String {
    r#"
if (!window.__helmFindByIndex) {
  window.__helmFindByIndex = function(idx, root) {
    root = root || document;
    const found = root.querySelector('[data-helm-idx="' + idx + '"]');
    if (found) return found;
    const all = root.querySelectorAll('*');
    for (const el of all) {
      if (el.shadowRoot) {
        const deep = window.__helmFindByIndex(idx, el.shadowRoot);
        if (deep) return deep;
      }
    }
    return null;
  };
}
"#
    .to_string()
}

/// Builds the JS that (re-)indexes the page: clears previous stamps,
/// finds every interactive element on the page (piercing shadow roots),
/// sorts elements inside the topmost open modal first, stamps each with
/// `data-helm-idx`, and returns a JSON array of `{index, tag, label,
/// description}` for the model to read. `selector`, when given, scopes
/// the search to a container (e.g. a form) rather than the whole
/// document — it never replaces the interactive-element selector itself.
pub fn elements_js(selector: Option<&str>) -> String {
    let root_expr = match selector {
        Some(sel) => format!("document.querySelector({sel:?})"),
        None => "document".to_string(),
    };
    format!(
        r#"(function() {{
  {deep_query}
  {deep_find}
  document.querySelectorAll('[data-helm-idx]').forEach(el => el.removeAttribute('data-helm-idx'));

  const root = {root_expr};
  if (!root) return JSON.stringify({{ scope: 'page', elements: [] }});

  const modalSelector = '[role="dialog"], [role="presentation"], [aria-modal="true"]';
  const allModals = window.__helmDeepQuery(document, modalSelector)
    .filter(el => {{
      const style = getComputedStyle(el);
      if (style.display === 'none' || style.visibility === 'hidden') return false;
      const rect = el.getBoundingClientRect();
      return rect.width > 0 && rect.height > 0;
    }});
  const realModals = allModals.filter(el => el.getAttribute('role') === 'dialog' || el.getAttribute('aria-modal') === 'true');
  const topmostModal = (realModals.length ? realModals[realModals.length - 1] : allModals[allModals.length - 1]) || null;

  const elements = window.__helmDeepQuery(root, {interactive_selector:?});
  const sorted = elements.slice().sort((a, b) => {{
    const aIn = topmostModal && topmostModal.contains(a) ? 0 : 1;
    const bIn = topmostModal && topmostModal.contains(b) ? 0 : 1;
    return aIn - bIn;
  }});

  const seen = new Set();
  const results = [];
  let idx = 0;

  for (const el of sorted) {{
    if (el.offsetParent === null && el.tagName !== 'BODY' && getComputedStyle(el).position !== 'fixed') continue;

    const tag = el.tagName.toLowerCase();
    const type = el.type || '';
    const role = el.getAttribute('role') || '';
    const isDisabled = el.disabled || el.getAttribute('aria-disabled') === 'true';

    let label = '';
    if (tag === 'a') label = 'link';
    else if (tag === 'button' || role === 'button') label = 'button';
    else if (tag === 'input') label = type ? 'input:' + type : 'input';
    else if (tag === 'select') label = 'select';
    else if (tag === 'textarea') label = 'textarea';
    else if (role === 'textbox') label = 'textbox';
    else if (role) label = role;
    else label = tag;
    if (isDisabled) label += ':disabled';

    const ariaLabel = el.getAttribute('aria-label') || '';
    const text = (el.innerText || el.textContent || '').trim().slice(0, 80).replace(/\s+/g, ' ');
    const placeholder = el.placeholder || '';
    const name = el.name || '';
    const value = (tag === 'input' || tag === 'select' || tag === 'textarea') ? (el.value || '').slice(0, 40) : '';
    const href = el.href || '';

    let description = ariaLabel || text || placeholder || name || '';
    if (value && !description.includes(value)) description += description ? ' [' + value + ']' : value;
    if (tag === 'a' && href && !href.startsWith('javascript:')) {{
      description += description ? ' → ' + href : href;
    }}
    description = description.slice(0, {label_cap});

    const scope = (topmostModal && topmostModal.contains(el)) ? 'modal' : 'page';
    const key = scope + '|' + label + '|' + description;
    if (seen.has(key)) continue;
    seen.add(key);

    el.setAttribute('data-helm-idx', String(idx));
    results.push({{ index: idx, tag: tag, label: label, description: description }});
    idx += 1;
  }}

  return JSON.stringify({{ scope: topmostModal ? 'modal' : 'page', elements: results }});
}})()"#,
        deep_query = deep_query_helper(),
        deep_find = deep_find_helper(),
        root_expr = root_expr,
        interactive_selector = INTERACTIVE_SELECTOR,
        label_cap = LABEL_CAP,
    )
}

/// Confirms the page still carries stamped indices, piercing shadow roots
/// since a stamp may live inside one. Used by the "ensure-indexed"
/// contract to decide whether `elements_js` needs to run at all before a
/// click/type, so `click(0)` works right after `open(url)` without an
/// explicit `elements()` call first.
pub fn check_indexed_js() -> String {
    format!(
        r#"(function() {{
  {deep_find}
  return !!(document.querySelector('[data-helm-idx]') || window.__helmFindByIndex(0));
}})()"#,
        deep_find = deep_find_helper(),
    )
}

fn find_by_index(index: usize) -> String {
    format!(
        r#"(function() {{
  {deep_find}
  return window.__helmFindByIndex({index});
}})()"#,
        deep_find = deep_find_helper(),
    )
}

/// Returns the element's center-point viewport coordinates for a click,
/// or `null` if the index is stale.
pub fn click_info_js(index: usize) -> String {
    let find = find_by_index(index);
    format!(
        r#"(function() {{
  const el = {find};
  if (!el) return null;
  el.scrollIntoViewIfNeeded ? el.scrollIntoViewIfNeeded() : el.scrollIntoView({{block: 'center'}});
  const rect = el.getBoundingClientRect();
  return JSON.stringify({{ x: rect.x + rect.width / 2, y: rect.y + rect.height / 2 }});
}})()"#
    )
}

/// Determines whether the indexed element accepts typed input, and if so
/// its viewport coordinates to focus-click first.
pub fn type_info_js(index: usize) -> String {
    let find = find_by_index(index);
    format!(
        r#"(function() {{
  const el = {find};
  if (!el) return null;
  const tag = el.tagName.toLowerCase();
  const typeable = tag === 'input' || tag === 'textarea' ||
    el.isContentEditable || el.getAttribute('role') === 'textbox';
  if (!typeable) return JSON.stringify({{ typeable: false }});
  const rect = el.getBoundingClientRect();
  return JSON.stringify({{ typeable: true, x: rect.x + rect.width / 2, y: rect.y + rect.height / 2 }});
}})()"#
    )
}

/// Clears a `contenteditable` element using a Range + Selection collapse
/// followed by a synthetic Backspace, which is the only reliable way to
/// trigger the site's own `input` handlers (directly setting
/// `innerText = ''` is invisible to most editors' change detection).
pub fn clear_contenteditable_js(index: usize) -> String {
    let find = find_by_index(index);
    format!(
        r#"(function() {{
  const el = {find};
  if (!el) return false;
  el.focus();
  const range = document.createRange();
  range.selectNodeContents(el);
  const sel = window.getSelection();
  sel.removeAllRanges();
  sel.addRange(range);
  document.execCommand('delete');
  return true;
}})()"#
    )
}

pub fn clear_input_js(index: usize) -> String {
    let find = find_by_index(index);
    format!(
        r#"(function() {{
  const el = {find};
  if (!el) return false;
  el.focus();
  el.select ? el.select() : null;
  document.execCommand('delete');
  return true;
}})()"#
    )
}

/// Sets an `<input>`/`<textarea>` value through the native property
/// descriptor setter rather than direct assignment, so React/Vue/etc.'s
/// overridden `value` setter still observes the change, then dispatches
/// `input`/`change` so framework listeners fire.
pub fn set_input_value_js(index: usize, text: &str) -> String {
    let find = find_by_index(index);
    format!(
        r#"(function() {{
  const el = {find};
  if (!el) return false;
  const tag = el.tagName.toLowerCase();
  const proto = tag === 'textarea' ? window.HTMLTextAreaElement.prototype : window.HTMLInputElement.prototype;
  const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
  setter.call(el, {text:?});
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return true;
}})()"#,
        text = text,
    )
}

/// Depth-first text extraction piercing shadow roots, skipping
/// script/style/noscript/svg subtrees and invisible parents, capped at
/// 8000 characters.
pub fn extract_text_js(selector: Option<&str>) -> String {
    let root_selector = selector.unwrap_or("body");
    format!(
        r#"(function() {{
  const root = document.querySelector({root_selector:?});
  if (!root) return '';
  const SKIP = new Set(['SCRIPT', 'STYLE', 'NOSCRIPT', 'SVG']);
  let out = '';
  const CAP = 8000;

  function visible(el) {{
    const style = getComputedStyle(el);
    return style.display !== 'none' && style.visibility !== 'hidden';
  }}

  function walk(node) {{
    if (out.length >= CAP) return;
    if (node.nodeType === Node.TEXT_NODE) {{
      out += node.textContent;
      return;
    }}
    if (node.nodeType !== Node.ELEMENT_NODE) return;
    if (SKIP.has(node.tagName)) return;
    if (!visible(node)) return;
    for (const child of node.childNodes) {{
      walk(child);
      if (out.length >= CAP) return;
    }}
    if (node.shadowRoot) walk(node.shadowRoot);
  }}

  walk(root);
  out = out.replace(/\s+/g, ' ').trim();
  if (out.length > CAP) out = out.slice(0, CAP) + '... (truncated)';
  return out;
}})()"#
    )
}

/// Returns `outerHTML` of the matched element, capped at 10000 characters.
pub fn get_html_js(selector: &str) -> String {
    format!(
        r#"(function() {{
  const el = document.querySelector({selector:?});
  if (!el) return '';
  let html = el.outerHTML;
  if (html.length > 10000) html = html.slice(0, 10000) + '... (truncated)';
  return html;
}})()"#
    )
}

/// A named key's CDP `key`/`code`/virtual-key-code triple, for the
/// `Input.dispatchKeyEvent` pairs the "keys" stream dispatches for named
/// flags like `--enter` or `--home` (SPEC_FULL §4.1 "Keyboard stream").
pub struct KeyDescriptor {
    pub key: String,
    pub code: String,
    pub vk: i32,
}

impl KeyDescriptor {
    fn named(key: &str, code: &str, vk: i32) -> Self {
        Self { key: key.to_string(), code: code.to_string(), vk }
    }
}

/// Looks up a named key flag (`--enter`, `--tab`, ...) stripped of its
/// leading `--`. Returns `None` for anything not in the fixed set the spec
/// names, so callers can fall back to treating the token as literal text.
pub fn named_key(name: &str) -> Option<KeyDescriptor> {
    let d = match name {
        "enter" => KeyDescriptor::named("Enter", "Enter", 13),
        "tab" => KeyDescriptor::named("Tab", "Tab", 9),
        "escape" => KeyDescriptor::named("Escape", "Escape", 27),
        "backspace" => KeyDescriptor::named("Backspace", "Backspace", 8),
        "delete" => KeyDescriptor::named("Delete", "Delete", 46),
        "up" => KeyDescriptor::named("ArrowUp", "ArrowUp", 38),
        "down" => KeyDescriptor::named("ArrowDown", "ArrowDown", 40),
        "left" => KeyDescriptor::named("ArrowLeft", "ArrowLeft", 37),
        "right" => KeyDescriptor::named("ArrowRight", "ArrowRight", 39),
        "home" => KeyDescriptor::named("Home", "Home", 36),
        "end" => KeyDescriptor::named("End", "End", 35),
        "space" => KeyDescriptor::named(" ", "Space", 32),
        _ => return None,
    };
    Some(d)
}

/// CDP modifier bitmask: Alt=1, Ctrl=2, Meta=4, Shift=8.
pub const MODIFIER_ALT: i32 = 1;
pub const MODIFIER_CTRL: i32 = 2;
pub const MODIFIER_META: i32 = 4;
pub const MODIFIER_SHIFT: i32 = 8;

/// Parses a `--combo cmd+b` style token (already stripped of `--combo `)
/// into a modifiers bitmask plus the final key's descriptor. The final
/// token is looked up as a named key first, falling back to treating a
/// single character as its own key (e.g. `cmd+b` -> key "b").
pub fn parse_combo(spec: &str) -> Option<(i32, KeyDescriptor)> {
    let parts: Vec<&str> = spec.split('+').map(str::trim).filter(|p| !p.is_empty()).collect();
    let (last, mods) = parts.split_last()?;
    let mut modifiers = 0;
    for m in mods {
        modifiers |= match m.to_lowercase().as_str() {
            "cmd" | "command" | "meta" | "super" | "win" => MODIFIER_META,
            "ctrl" | "control" => MODIFIER_CTRL,
            "shift" => MODIFIER_SHIFT,
            "alt" | "option" => MODIFIER_ALT,
            _ => 0,
        };
    }
    let descriptor = named_key(&last.to_lowercase()).unwrap_or_else(|| {
        let vk = last.chars().next().map(|c| c.to_ascii_uppercase() as i32).unwrap_or(0);
        KeyDescriptor { key: last.to_string(), code: last.to_string(), vk }
    });
    Some((modifiers, descriptor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elements_js_embeds_stamp_attribute() {
        let js = elements_js(None);
        assert!(js.contains("data-helm-idx"));
        assert!(js.contains("__helmDeepQuery"));
        assert!(js.contains("__helmFindByIndex"));
    }

    #[test]
    fn elements_js_computes_categorical_labels_and_chained_description() {
        let js = elements_js(None);
        assert!(js.contains("label = 'link'"));
        assert!(js.contains("'input:' + type"));
        assert!(js.contains(":disabled"));
        assert!(js.contains("' → ' + href"));
        assert!(js.contains(&format!("description.slice(0, {LABEL_CAP})")));
    }

    #[test]
    fn elements_js_collects_page_wide_and_sorts_modal_first() {
        let js = elements_js(None);
        // modal elements are never scoped out of the query, only sorted first
        assert!(js.contains("window.__helmDeepQuery(root,"));
        assert!(js.contains("topmostModal.contains(a)"));
        assert!(js.contains("[role=\"presentation\"]"));
        assert!(!js.contains("[role=\"alertdialog\"]"));
        assert!(js.contains("el.getAttribute('role') === 'dialog' || el.getAttribute('aria-modal') === 'true'"));
    }

    #[test]
    fn interactive_selector_excludes_unfocusable_tabindex_and_includes_summary() {
        assert!(INTERACTIVE_SELECTOR.contains("[tabindex]:not([tabindex=\"-1\"])"));
        assert!(INTERACTIVE_SELECTOR.contains("details > summary"));
    }

    #[test]
    fn click_info_js_targets_the_given_index() {
        let js = click_info_js(7);
        assert!(js.contains("__helmFindByIndex(7)"));
    }

    #[test]
    fn check_indexed_js_pierces_shadow_roots() {
        let js = check_indexed_js();
        assert!(js.contains("__helmFindByIndex"));
        assert!(js.contains("document.querySelector('[data-helm-idx]')"));
    }

    #[test]
    fn set_input_value_js_escapes_text_safely() {
        let js = set_input_value_js(3, "hello \"world\"\n");
        assert!(js.contains("__helmFindByIndex(3)"));
        // serde_json::Value's Debug-escaped string must not close the JS string early
        assert!(!js.contains("\"world\"\n\""));
    }

    #[test]
    fn named_key_covers_the_spec_flag_set() {
        for name in ["enter", "tab", "escape", "backspace", "delete", "up", "down", "left", "right", "home", "end", "space"] {
            assert!(named_key(name).is_some(), "missing descriptor for {name}");
        }
        assert!(named_key("not-a-key").is_none());
    }

    #[test]
    fn parse_combo_extracts_modifiers_and_final_key() {
        let (modifiers, descriptor) = parse_combo("cmd+b").unwrap();
        assert_eq!(modifiers, MODIFIER_META);
        assert_eq!(descriptor.key, "b");

        let (modifiers, descriptor) = parse_combo("ctrl+shift+Enter").unwrap();
        assert_eq!(modifiers, MODIFIER_CTRL | MODIFIER_SHIFT);
        assert_eq!(descriptor.key, "Enter");
    }

    #[test]
    fn extract_text_js_caps_at_8000() {
        let js = extract_text_js(Some("#main"));
        assert!(js.contains("8000"));
    }
}
