//! PDF tool (SPEC_FULL §4.5): `read` extracts per-page text via
//! `pdf-extract`, `create` renders an HTML string to PDF via `genpdf`,
//! `info` reports page count.

use serde::Deserialize;
use serde_json::Value;

use super::ToolContext;

const READ_CAP_BYTES: usize = 50 * 1024;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum PdfAction {
    Read { path: String, pages: Option<String> },
    Create { path: String, html: String },
    Info { path: String },
}

fn permission_denied(detail: &str) -> String {
    format!("Permission denied: {detail}")
}

/// Parses a page-range specifier: `"1-5"` or `"1,3,7"`. 1-indexed in the
/// tool's public surface, converted to 0-indexed internally.
fn parse_page_range(spec: &str, total_pages: usize) -> Vec<usize> {
    let mut pages = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.trim().parse::<usize>(), end.trim().parse::<usize>()) {
                for p in start..=end {
                    if p >= 1 && p <= total_pages {
                        pages.push(p - 1);
                    }
                }
            }
        } else if let Ok(p) = part.parse::<usize>() {
            if p >= 1 && p <= total_pages {
                pages.push(p - 1);
            }
        }
    }
    pages
}

pub async fn execute(args: Value, ctx: &ToolContext) -> String {
    let action: PdfAction = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return format!("invalid pdf tool arguments: {e}"),
    };
    let ws = &ctx.workspace;

    match action {
        PdfAction::Read { path, pages } => {
            let resolved = match ws.resolve(&path) {
                Ok(p) => p,
                Err(e) => return permission_denied(&e.to_string()),
            };
            let bytes = match std::fs::read(&resolved) {
                Ok(b) => b,
                Err(e) => return format!("could not read {path}: {e}"),
            };
            match pdf_extract::extract_text_by_pages(&bytes) {
                Ok(page_texts) => {
                    let selected: Vec<usize> = match pages {
                        Some(spec) => parse_page_range(&spec, page_texts.len()),
                        None => (0..page_texts.len()).collect(),
                    };
                    let mut out = String::new();
                    for idx in selected {
                        if let Some(text) = page_texts.get(idx) {
                            out.push_str(&format!("--- page {} ---\n{}\n", idx + 1, text));
                        }
                    }
                    if out.len() > READ_CAP_BYTES {
                        let mut truncated: String = out.chars().take(READ_CAP_BYTES).collect();
                        truncated.push_str("\n[truncated]");
                        truncated
                    } else {
                        out
                    }
                }
                Err(e) => format!("could not extract text from {path}: {e}"),
            }
        }
        PdfAction::Create { path, html } => {
            let resolved = match ws.resolve(&path) {
                Ok(p) => p,
                Err(e) => return permission_denied(&e.to_string()),
            };
            match render_html_to_pdf(&html, &resolved) {
                Ok(()) => format!("created PDF at {path}"),
                Err(e) => format!("could not create PDF at {path}: {e}"),
            }
        }
        PdfAction::Info { path } => {
            let resolved = match ws.resolve(&path) {
                Ok(p) => p,
                Err(e) => return permission_denied(&e.to_string()),
            };
            let bytes = match std::fs::read(&resolved) {
                Ok(b) => b,
                Err(e) => return format!("could not read {path}: {e}"),
            };
            match pdf_extract::extract_text_by_pages(&bytes) {
                Ok(page_texts) => format!("{path}: {} page(s), {} bytes", page_texts.len(), bytes.len()),
                Err(e) => format!("could not read PDF metadata for {path}: {e}"),
            }
        }
    }
}

/// Strips tags to plain text and lays it out with `genpdf`'s default
/// font, one paragraph per block-level element split. This is a
/// deliberately minimal HTML-to-PDF pipeline (no CSS, no images) — good
/// enough for the agent's generated reports/comparisons.
fn render_html_to_pdf(html: &str, output_path: &std::path::Path) -> anyhow::Result<()> {
    let text = strip_tags(html);

    let font_family = genpdf::fonts::from_files("/usr/share/fonts/truetype/liberation", "LiberationSans", None)
        .or_else(|_| genpdf::fonts::from_files("/usr/share/fonts/truetype/dejavu", "DejaVuSans", None))?;
    let mut doc = genpdf::Document::new(font_family);
    doc.set_title("helm document");
    let mut decorator = genpdf::SimplePageDecorator::new();
    decorator.set_margins(10);
    doc.set_page_decorator(decorator);

    for paragraph in text.split("\n\n") {
        if paragraph.trim().is_empty() {
            continue;
        }
        doc.push(genpdf::elements::Paragraph::new(paragraph.trim()));
    }

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    doc.render_to_file(output_path)?;
    Ok(())
}

fn strip_tags(html: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&nbsp;", " ").replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_range_parses_dash_and_comma() {
        assert_eq!(parse_page_range("1-3", 5), vec![0, 1, 2]);
        assert_eq!(parse_page_range("1,3,7", 5), vec![0, 2]);
    }

    #[test]
    fn strip_tags_removes_markup() {
        assert_eq!(strip_tags("<p>Hello <b>World</b></p>"), "Hello World");
    }
}
