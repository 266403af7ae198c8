use crate::ipc::error::{agri_err, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::session::Session;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state
                .session
                .as_ref()
                .map(|s| s.workspace().to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match Session::open(&path) {
        Ok(session) => {
            let count = session.dataset().len();
            state.session = Some(session);
            ok(
                &req.id,
                json!({ "workspacePath": path.to_string_lossy(), "recordCount": count }),
            )
        }
        Err(e) => agri_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
