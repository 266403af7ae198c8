use crate::error::AgriError;
use crate::ipc::error::{agri_err, err, no_workspace, ok};
use crate::ipc::helpers::{optional_str, parse_draft, required_id};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn handle_records_list(state: &mut AppState, req: &Request) -> Value {
    let Some(session) = state.session.as_ref() else {
        return no_workspace(&req.id);
    };
    let order = match optional_str(&req.params, "order") {
        Ok(v) => v.unwrap_or("store"),
        Err(e) => return agri_err(&req.id, &e),
    };
    let records = match order {
        "store" => session.dataset().records().to_vec(),
        "newestFirst" => session.dataset().table_rows(),
        _ => {
            return err(
                &req.id,
                "bad_params",
                "order must be one of: store, newestFirst",
                None,
            )
        }
    };
    ok(&req.id, json!({ "records": records }))
}

fn handle_records_get(state: &mut AppState, req: &Request) -> Value {
    let Some(session) = state.session.as_ref() else {
        return no_workspace(&req.id);
    };
    let id = match required_id(&req.params) {
        Ok(v) => v,
        Err(e) => return agri_err(&req.id, &e),
    };
    match session.dataset().get(id) {
        Some(rec) => ok(&req.id, json!({ "record": rec })),
        None => agri_err(&req.id, &AgriError::NotFound(id)),
    }
}

fn handle_records_create(state: &mut AppState, req: &Request) -> Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    let draft = match parse_draft(&req.params) {
        Ok(v) => v,
        Err(e) => return agri_err(&req.id, &e),
    };
    match session.create(&draft) {
        Ok(rec) => ok(&req.id, json!({ "id": rec.record.id, "record": rec })),
        Err(e) => agri_err(&req.id, &e),
    }
}

fn handle_records_update(state: &mut AppState, req: &Request) -> Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    let id = match required_id(&req.params) {
        Ok(v) => v,
        Err(e) => return agri_err(&req.id, &e),
    };
    let draft = match parse_draft(&req.params) {
        Ok(v) => v,
        Err(e) => return agri_err(&req.id, &e),
    };
    match session.update(id, &draft) {
        Ok(rec) => ok(&req.id, json!({ "id": id, "record": rec })),
        Err(e) => agri_err(&req.id, &e),
    }
}

fn handle_records_delete(state: &mut AppState, req: &Request) -> Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    let id = match required_id(&req.params) {
        Ok(v) => v,
        Err(e) => return agri_err(&req.id, &e),
    };
    match session.delete(id) {
        Ok(deleted) => ok(&req.id, json!({ "deletedId": deleted })),
        Err(e) => agri_err(&req.id, &e),
    }
}

fn handle_records_select_for_delete(state: &mut AppState, req: &Request) -> Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    let id = match required_id(&req.params) {
        Ok(v) => v,
        Err(e) => return agri_err(&req.id, &e),
    };
    match session.select_for_delete(id) {
        Ok(selected) => ok(&req.id, json!({ "selectedId": selected })),
        Err(e) => agri_err(&req.id, &e),
    }
}

fn handle_records_confirm_delete(state: &mut AppState, req: &Request) -> Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    match session.confirm_delete() {
        Ok(deleted) => ok(&req.id, json!({ "deletedId": deleted })),
        Err(e) => agri_err(&req.id, &e),
    }
}

fn handle_records_cancel_delete(state: &mut AppState, req: &Request) -> Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    ok(&req.id, json!({ "cleared": session.cancel_delete() }))
}

fn handle_dataset_reload(state: &mut AppState, req: &Request) -> Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    match session.reload() {
        Ok(count) => ok(&req.id, json!({ "count": count })),
        Err(e) => agri_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "records.list" => Some(handle_records_list(state, req)),
        "records.get" => Some(handle_records_get(state, req)),
        "records.create" => Some(handle_records_create(state, req)),
        "records.update" => Some(handle_records_update(state, req)),
        "records.delete" => Some(handle_records_delete(state, req)),
        "records.selectForDelete" => Some(handle_records_select_for_delete(state, req)),
        "records.confirmDelete" => Some(handle_records_confirm_delete(state, req)),
        "records.cancelDelete" => Some(handle_records_cancel_delete(state, req)),
        "dataset.reload" => Some(handle_dataset_reload(state, req)),
        _ => None,
    }
}
