mod test_support;

use serde_json::json;
use test_support::{request, request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("agrifield-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health["workspacePath"].is_null());

    let code = request_err(&mut stdin, &mut reader, "2", "records.list", json!({}));
    assert_eq!(code, "no_workspace");

    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["recordCount"], 0);

    for (i, method) in [
        "config.get",
        "records.list",
        "dataset.reload",
        "dashboard.summary",
        "dashboard.topPerformers",
        "dashboard.charts",
        "records.cancelDelete",
    ]
    .iter()
    .enumerate()
    {
        let id = format!("m{}", i);
        let _ = request_ok(&mut stdin, &mut reader, &id, method, json!({}));
    }

    let unknown = request(&mut stdin, &mut reader, "9", "records.explode", json!({}));
    assert_eq!(unknown["error"]["code"], "not_implemented");

    let missing_path = request_err(&mut stdin, &mut reader, "10", "workspace.select", json!({}));
    assert_eq!(missing_path, "bad_params");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn malformed_line_gets_bad_json_and_loop_continues() {
    use std::io::{BufRead, Write};

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    writeln!(stdin, "{{not json").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let v: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(v["ok"], false);
    assert_eq!(v["error"]["code"], "bad_json");

    let _ = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    drop(stdin);
    let _ = child.wait();
}
