//! Spreadsheet tool (SPEC_FULL §4.5): reads CSV/XLSX with an optional
//! column filter and a default row cap, appends rows to CSV, creates new
//! XLSX workbooks, and reports sheet dimensions.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use super::ToolContext;

const DEFAULT_ROW_CAP: usize = 500;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum SpreadsheetAction {
    Read {
        path: String,
        columns: Option<Vec<String>>,
        row_cap: Option<usize>,
    },
    Append {
        path: String,
        rows: Vec<Vec<String>>,
    },
    Create {
        path: String,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Info {
        path: String,
    },
}

fn permission_denied(detail: &str) -> String {
    format!("Permission denied: {detail}")
}

fn is_xlsx(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()),
        Some(ref ext) if ext == "xlsx" || ext == "xlsm" || ext == "xls"
    )
}

pub async fn execute(args: Value, ctx: &ToolContext) -> String {
    let action: SpreadsheetAction = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return format!("invalid spreadsheet tool arguments: {e}"),
    };
    let ws = &ctx.workspace;

    match action {
        SpreadsheetAction::Read { path, columns, row_cap } => {
            let resolved = match ws.resolve(&path) {
                Ok(p) => p,
                Err(e) => return permission_denied(&e.to_string()),
            };
            let cap = row_cap.unwrap_or(DEFAULT_ROW_CAP);
            if is_xlsx(&resolved) {
                read_xlsx(&resolved, columns.as_deref(), cap)
            } else {
                read_csv(&resolved, columns.as_deref(), cap)
            }
        }
        SpreadsheetAction::Append { path, rows } => {
            let resolved = match ws.resolve(&path) {
                Ok(p) => p,
                Err(e) => return permission_denied(&e.to_string()),
            };
            if is_xlsx(&resolved) {
                return "append is only supported for CSV files; use create for XLSX".to_string();
            }
            append_csv(&resolved, &rows)
        }
        SpreadsheetAction::Create { path, headers, rows } => {
            let resolved = match ws.resolve(&path) {
                Ok(p) => p,
                Err(e) => return permission_denied(&e.to_string()),
            };
            if is_xlsx(&resolved) {
                create_xlsx(&resolved, &headers, &rows)
            } else {
                create_csv(&resolved, &headers, &rows)
            }
        }
        SpreadsheetAction::Info { path } => {
            let resolved = match ws.resolve(&path) {
                Ok(p) => p,
                Err(e) => return permission_denied(&e.to_string()),
            };
            info(&resolved)
        }
    }
}

fn read_csv(path: &Path, columns: Option<&[String]>, row_cap: usize) -> String {
    let mut reader = match csv::Reader::from_path(path) {
        Ok(r) => r,
        Err(e) => return format!("could not read {}: {e}", path.display()),
    };
    let headers: Vec<String> = match reader.headers() {
        Ok(h) => h.iter().map(|s| s.to_string()).collect(),
        Err(e) => return format!("could not read headers: {e}"),
    };
    let selected_idx: Option<Vec<usize>> = columns.map(|cols| {
        cols.iter()
            .filter_map(|c| headers.iter().position(|h| h == c))
            .collect()
    });

    let mut out_headers = selected_idx
        .as_ref()
        .map(|idx| idx.iter().map(|&i| headers[i].clone()).collect::<Vec<_>>())
        .unwrap_or_else(|| headers.clone());
    if out_headers.is_empty() {
        out_headers = headers.clone();
    }

    let mut out = vec![out_headers.join(",")];
    let mut truncated = false;
    for (count, record) in reader.records().enumerate() {
        if count >= row_cap {
            truncated = true;
            break;
        }
        let Ok(record) = record else { continue };
        let row: Vec<String> = match &selected_idx {
            Some(idx) if !idx.is_empty() => idx
                .iter()
                .map(|&i| record.get(i).unwrap_or("").to_string())
                .collect(),
            _ => record.iter().map(|s| s.to_string()).collect(),
        };
        out.push(row.join(","));
    }
    if truncated {
        out.push(format!("[truncated at {row_cap} rows]"));
    }
    out.join("\n")
}

fn read_xlsx(path: &Path, columns: Option<&[String]>, row_cap: usize) -> String {
    use calamine::{open_workbook_auto, Reader};
    let mut workbook = match open_workbook_auto(path) {
        Ok(w) => w,
        Err(e) => return format!("could not open {}: {e}", path.display()),
    };
    let sheet_name = match workbook.sheet_names().first().cloned() {
        Some(name) => name,
        None => return "workbook has no sheets".to_string(),
    };
    let range = match workbook.worksheet_range(&sheet_name) {
        Ok(r) => r,
        Err(e) => return format!("could not read sheet '{sheet_name}': {e}"),
    };

    let mut rows_iter = range.rows();
    let headers: Vec<String> = match rows_iter.next() {
        Some(row) => row.iter().map(|c| c.to_string()).collect(),
        None => return "sheet is empty".to_string(),
    };
    let selected_idx: Option<Vec<usize>> = columns.map(|cols| {
        cols.iter()
            .filter_map(|c| headers.iter().position(|h| h == c))
            .collect()
    });

    let out_headers = match &selected_idx {
        Some(idx) if !idx.is_empty() => idx.iter().map(|&i| headers[i].clone()).collect::<Vec<_>>(),
        _ => headers.clone(),
    };
    let mut out = vec![out_headers.join(",")];
    let mut truncated = false;
    for (count, row) in rows_iter.enumerate() {
        if count >= row_cap {
            truncated = true;
            break;
        }
        let values: Vec<String> = match &selected_idx {
            Some(idx) if !idx.is_empty() => idx
                .iter()
                .map(|&i| row.get(i).map(|c| c.to_string()).unwrap_or_default())
                .collect(),
            _ => row.iter().map(|c| c.to_string()).collect(),
        };
        out.push(values.join(","));
    }
    if truncated {
        out.push(format!("[truncated at {row_cap} rows]"));
    }
    out.join("\n")
}

fn append_csv(path: &Path, rows: &[Vec<String>]) -> String {
    let file = match std::fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => f,
        Err(e) => return format!("could not open {}: {e}", path.display()),
    };
    let mut writer = csv::Writer::from_writer(file);
    for row in rows {
        if let Err(e) = writer.write_record(row) {
            return format!("could not append row: {e}");
        }
    }
    if let Err(e) = writer.flush() {
        return format!("could not flush {}: {e}", path.display());
    }
    format!("appended {} row(s) to {}", rows.len(), path.display())
}

fn create_csv(path: &Path, headers: &[String], rows: &[Vec<String>]) -> String {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let file = match std::fs::File::create(path) {
        Ok(f) => f,
        Err(e) => return format!("could not create {}: {e}", path.display()),
    };
    let mut writer = csv::Writer::from_writer(file);
    if let Err(e) = writer.write_record(headers) {
        return format!("could not write headers: {e}");
    }
    for row in rows {
        if let Err(e) = writer.write_record(row) {
            return format!("could not write row: {e}");
        }
    }
    if let Err(e) = writer.flush() {
        return format!("could not flush {}: {e}", path.display());
    }
    format!("created {} with {} row(s)", path.display(), rows.len())
}

fn create_xlsx(path: &Path, headers: &[String], rows: &[Vec<String>]) -> String {
    use rust_xlsxwriter::Workbook;
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, header) in headers.iter().enumerate() {
        if let Err(e) = sheet.write_string(0, col as u16, header) {
            return format!("could not write header: {e}");
        }
    }
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            if let Err(e) = sheet.write_string((row_idx + 1) as u32, col_idx as u16, value) {
                return format!("could not write cell: {e}");
            }
        }
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    match workbook.save(path) {
        Ok(()) => format!("created {} with {} row(s)", path.display(), rows.len()),
        Err(e) => format!("could not save {}: {e}", path.display()),
    }
}

fn info(path: &Path) -> String {
    if is_xlsx(path) {
        use calamine::{open_workbook_auto, Reader};
        let workbook = match open_workbook_auto(path) {
            Ok(w) => w,
            Err(e) => return format!("could not open {}: {e}", path.display()),
        };
        let names = workbook.sheet_names();
        format!("{}: {} sheet(s): {}", path.display(), names.len(), names.join(", "))
    } else {
        match csv::Reader::from_path(path) {
            Ok(mut reader) => {
                let headers = reader.headers().map(|h| h.len()).unwrap_or(0);
                let row_count = reader.records().count();
                format!("{}: {row_count} row(s), {headers} column(s)", path.display())
            }
            Err(e) => format!("could not read {}: {e}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron::{CronRunRegistry, JobStore};
    use crate::progress::ProgressBus;
    use crate::tools::browser::BrowserToolState;
    use std::sync::Arc;

    fn context(ws_root: &std::path::Path) -> ToolContext {
        ToolContext {
            workspace: Arc::new(helm_config::Workspace::new(ws_root).unwrap()),
            browser: Arc::new(tokio::sync::Mutex::new(BrowserToolState::new(9222, ws_root.join("profile"), None))),
            shell_enabled: true,
            jobs_path: ws_root.join("jobs.json"),
            job_store: Arc::new(tokio::sync::Mutex::new(JobStore::default())),
            cron_registry: CronRunRegistry::new(),
            progress: ProgressBus::new(),
        }
    }

    #[tokio::test]
    async fn create_then_read_csv_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let result = execute(
            serde_json::json!({
                "action": "create",
                "path": "data.csv",
                "headers": ["name", "age"],
                "rows": [["alice", "30"], ["bob", "25"]]
            }),
            &ctx,
        )
        .await;
        assert!(result.contains("created"));

        let result = execute(serde_json::json!({"action": "read", "path": "data.csv"}), &ctx).await;
        assert!(result.contains("alice"));
        assert!(result.contains("name,age"));
    }

    #[tokio::test]
    async fn read_with_column_filter_keeps_only_selected_columns() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        execute(
            serde_json::json!({
                "action": "create",
                "path": "data.csv",
                "headers": ["name", "age", "city"],
                "rows": [["alice", "30", "nyc"]]
            }),
            &ctx,
        )
        .await;
        let result = execute(
            serde_json::json!({"action": "read", "path": "data.csv", "columns": ["name"]}),
            &ctx,
        )
        .await;
        assert_eq!(result, "name\nalice");
    }

    #[tokio::test]
    async fn append_adds_rows_without_duplicating_header() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        execute(
            serde_json::json!({"action": "create", "path": "data.csv", "headers": ["a"], "rows": [["1"]]}),
            &ctx,
        )
        .await;
        let result = execute(
            serde_json::json!({"action": "append", "path": "data.csv", "rows": [["2"]]}),
            &ctx,
        )
        .await;
        assert!(result.contains("appended 1"));
        let read_back = execute(serde_json::json!({"action": "read", "path": "data.csv"}), &ctx).await;
        assert!(read_back.contains('2'));
    }

    #[tokio::test]
    async fn xlsx_escape_outside_workspace_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let result = execute(
            serde_json::json!({"action": "info", "path": "../outside.xlsx"}),
            &ctx,
        )
        .await;
        assert!(result.starts_with("Permission denied"));
    }
}
