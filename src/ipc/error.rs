use crate::error::AgriError;
use crate::import::ImportError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn no_workspace(id: &str) -> serde_json::Value {
    err(id, "no_workspace", "select a workspace first", None)
}

pub fn agri_err(id: &str, e: &AgriError) -> serde_json::Value {
    let details = match e {
        AgriError::Import(ImportError::NoValidRows { rejected }) => {
            Some(json!({ "rejectedCount": rejected }))
        }
        AgriError::Import(ImportError::TooManyRows { rows, max }) => {
            Some(json!({ "rows": rows, "maxImportRows": max }))
        }
        AgriError::NotFound(record_id) => Some(json!({ "id": record_id })),
        _ => None,
    };
    err(id, e.code(), e.to_string(), details)
}
