use crate::import::RawRow;
use crate::ipc::error::{agri_err, err, no_workspace, ok};
use crate::ipc::types::{AppState, Request};
use crate::session::ImportReport;
use serde_json::{Map, Value};
use std::path::PathBuf;

fn report_value(id: &str, report: &ImportReport) -> Value {
    match serde_json::to_value(report) {
        Ok(v) => ok(id, v),
        Err(e) => err(id, "server_error", e.to_string(), None),
    }
}

fn handle_import_rows(state: &mut AppState, req: &Request) -> Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    let Some(arr) = req.params.get("rows").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "rows must be an array", None);
    };
    // Non-object entries carry no usable columns and are rejected per row.
    let rows: Vec<RawRow> = arr
        .iter()
        .map(|v| v.as_object().cloned().unwrap_or_else(Map::new))
        .collect();
    match session.import_rows(&rows) {
        Ok(report) => report_value(&req.id, &report),
        Err(e) => agri_err(&req.id, &e),
    }
}

fn handle_import_file(state: &mut AppState, req: &Request) -> Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    let Some(path) = req.params.get("path").and_then(|v| v.as_str()).map(PathBuf::from) else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };
    match session.import_file(&path) {
        Ok(report) => report_value(&req.id, &report),
        Err(e) => agri_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "import.rows" => Some(handle_import_rows(state, req)),
        "import.file" => Some(handle_import_file(state, req)),
        _ => None,
    }
}
