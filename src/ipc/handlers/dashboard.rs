use crate::ipc::error::{agri_err, err, no_workspace, ok};
use crate::ipc::helpers::optional_limit;
use crate::ipc::types::{AppState, Request};
use crate::metrics;
use serde_json::{json, Value};

const MAX_TOP_PERFORMERS: usize = 50;

fn handle_dashboard_summary(state: &mut AppState, req: &Request) -> Value {
    let Some(session) = state.session.as_ref() else {
        return no_workspace(&req.id);
    };
    let records = session.dataset().snapshot();
    match metrics::summarize(&records) {
        Some(summary) => ok(&req.id, json!({ "empty": false, "summary": summary })),
        None => ok(&req.id, json!({ "empty": true, "summary": null })),
    }
}

fn handle_dashboard_top_performers(state: &mut AppState, req: &Request) -> Value {
    let Some(session) = state.session.as_ref() else {
        return no_workspace(&req.id);
    };
    let limit = match optional_limit(&req.params, "limit", MAX_TOP_PERFORMERS) {
        Ok(v) => v.unwrap_or(session.config().top_performer_limit),
        Err(e) => return agri_err(&req.id, &e),
    };
    let records = session.dataset().snapshot();
    let performers = metrics::top_n(&records, limit);
    ok(&req.id, json!({ "performers": performers }))
}

fn handle_dashboard_charts(state: &mut AppState, req: &Request) -> Value {
    let Some(session) = state.session.as_ref() else {
        return no_workspace(&req.id);
    };
    if session.dataset().is_empty() {
        return ok(&req.id, json!({ "cropYield": [], "locationYield": [], "scatter": [] }));
    }
    let records = session.dataset().snapshot();
    match serde_json::to_value(metrics::chart_series(&records)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "server_error", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "dashboard.summary" => Some(handle_dashboard_summary(state, req)),
        "dashboard.topPerformers" => Some(handle_dashboard_top_performers(state, req)),
        "dashboard.charts" => Some(handle_dashboard_charts(state, req)),
        _ => None,
    }
}
