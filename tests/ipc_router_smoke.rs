use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_marksyd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn marksyd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn assert_ok(v: &serde_json::Value, what: &str) {
    assert_eq!(v["ok"], true, "{} failed: {}", what, v);
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("marksy-router-smoke");
    let json_out = workspace.join("smoke-export.json");
    let xlsx_out = workspace.join("smoke-export.xlsx");
    let bundle_out = workspace.join("smoke-backup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_ok(&health, "health");
    let select = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_ok(&select, "workspace.select");

    let add = request(
        &mut stdin,
        &mut reader,
        "3",
        "marks.add",
        json!({
            "subject": "Physics",
            "paperName": "Unit test 1",
            "date": "2024-03-01",
            "mcq": 40,
            "seq": 20,
            "essay": 20
        }),
    );
    assert_ok(&add, "marks.add");
    let mark_id = add["result"]["mark"]["id"].as_str().expect("mark id").to_string();

    let calls: Vec<(&str, serde_json::Value)> = vec![
        ("marks.list", json!({})),
        ("analytics.summary", json!({})),
        ("analytics.dispersion", json!({})),
        ("analytics.grade", json!({ "score": 66, "max": 100 })),
        ("achievements.list", json!({})),
        ("profile.get", json!({})),
        ("profile.update", json!({ "patch": { "name": "Nimal", "age": 18 } })),
        ("todos.create", json!({ "text": "Revise optics", "dueDate": "2024-03-05" })),
        ("todos.list", json!({})),
        ("tutors.create", json!({ "name": "Mr. Perera", "color": "#10b981" })),
        ("tutors.list", json!({})),
        ("subjects.create", json!({ "name": "Media Studies", "stream": "arts" })),
        ("subjects.favorite", json!({ "name": "Physics", "favorite": true })),
        ("subjects.list", json!({})),
        ("study.log", json!({ "minutes": 45, "subject": "Physics" })),
        ("study.summary", json!({})),
        ("setup.get", json!({})),
        ("setup.update", json!({ "section": "grading", "patch": { "scale": "extended" } })),
        ("exchange.exportJson", json!({ "path": json_out.to_string_lossy() })),
        ("exchange.exportXlsx", json!({ "path": xlsx_out.to_string_lossy() })),
        ("exchange.importJson", json!({ "path": json_out.to_string_lossy() })),
        ("exchange.importXlsx", json!({ "path": xlsx_out.to_string_lossy() })),
        ("backup.exportWorkspaceBundle", json!({ "outPath": bundle_out.to_string_lossy() })),
        ("backup.importWorkspaceBundle", json!({ "inPath": bundle_out.to_string_lossy() })),
        ("marks.delete", json!({ "id": mark_id })),
        ("marks.clear", json!({})),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let id = format!("c{}", i);
        let resp = request(&mut stdin, &mut reader, &id, method, params);
        assert_ok(&resp, method);
    }
    assert!(json_out.is_file());
    assert!(xlsx_out.is_file());
    assert!(bundle_out.is_file());

    writeln!(
        stdin,
        "{}",
        json!({ "id": "u1", "method": "marks.teleport", "params": {} })
    )
    .expect("write unknown method");
    writeln!(stdin, "{{not json").expect("write bad json");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read unknown method response");
    let unknown: serde_json::Value = serde_json::from_str(line.trim()).expect("parse");
    assert_eq!(unknown["error"]["code"], "not_implemented");
    line.clear();
    reader.read_line(&mut line).expect("read bad json response");
    let bad: serde_json::Value = serde_json::from_str(line.trim()).expect("parse");
    assert_eq!(bad["error"]["code"], "bad_json");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn methods_need_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(&mut stdin, &mut reader, "1", "marks.list", json!({}));
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "no_workspace");
    drop(stdin);
    let _ = child.wait();
}
