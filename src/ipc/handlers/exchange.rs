use crate::exchange;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::{export_watermark, grade_scale};
use crate::ipc::helpers::{required_str, storage_err, store_ref};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
enum ImportFormat {
    Json,
    Xlsx,
}

fn handle_export_json(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let path = match required_str(req, "path") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    let watermark = match export_watermark(store) {
        Ok(v) => v,
        Err(e) => return storage_err(req, "db_query_failed", e),
    };
    match exchange::export_json_file(store, &watermark, &path) {
        Ok(mark_count) => ok(
            &req.id,
            json!({ "path": path.to_string_lossy(), "markCount": mark_count }),
        ),
        Err(e) => {
            warn!(error = %e, "JSON export failed");
            err(&req.id, "export_failed", e.to_string(), None)
        }
    }
}

fn handle_export_xlsx(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let path = match required_str(req, "path") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    let (watermark, scale) = match (export_watermark(store), grade_scale(store)) {
        (Ok(w), Ok(s)) => (w, s),
        (Err(e), _) | (_, Err(e)) => return storage_err(req, "db_query_failed", e),
    };
    match exchange::export_xlsx_file(store, &watermark, &scale, &path) {
        Ok(mark_count) => ok(
            &req.id,
            json!({ "path": path.to_string_lossy(), "markCount": mark_count }),
        ),
        Err(e) => {
            warn!(error = %e, "spreadsheet export failed");
            err(&req.id, "export_failed", e.to_string(), None)
        }
    }
}

fn handle_import(state: &mut AppState, req: &Request, format: ImportFormat) -> serde_json::Value {
    let store = match store_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let path = match required_str(req, "path") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    let result = match format {
        ImportFormat::Json => exchange::import_json_file(store, &path),
        ImportFormat::Xlsx => exchange::import_xlsx_file(store, &path),
    };
    match result {
        Ok(summary) => ok(&req.id, json!({ "import": summary })),
        Err(e) => {
            warn!(error = %e, path = %path.display(), ?format, "import failed");
            err(
                &req.id,
                "import_failed",
                "the file could not be imported",
                Some(json!({ "reason": e.to_string() })),
            )
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exchange.exportJson" => Some(handle_export_json(state, req)),
        "exchange.exportXlsx" => Some(handle_export_xlsx(state, req)),
        "exchange.importJson" => Some(handle_import(state, req, ImportFormat::Json)),
        "exchange.importXlsx" => Some(handle_import(state, req, ImportFormat::Xlsx)),
        _ => None,
    }
}
