use crate::ipc::error::{agri_err, err, no_workspace, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::Value;

fn handle_config_get(state: &mut AppState, req: &Request) -> Value {
    let Some(session) = state.session.as_ref() else {
        return no_workspace(&req.id);
    };
    match serde_json::to_value(session.config()) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "server_error", e.to_string(), None),
    }
}

fn handle_config_update(state: &mut AppState, req: &Request) -> Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };
    match session.update_config(patch) {
        Ok(cfg) => match serde_json::to_value(&cfg) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "server_error", e.to_string(), None),
        },
        Err(e) => agri_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "config.get" => Some(handle_config_get(state, req)),
        "config.update" => Some(handle_config_update(state, req)),
        _ => None,
    }
}
