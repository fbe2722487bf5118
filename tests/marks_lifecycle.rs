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
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn add_mark(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    subject: &str,
    total: f64,
) -> String {
    let res = request_ok(
        stdin,
        reader,
        id,
        "marks.add",
        json!({
            "subject": subject,
            "paperName": format!("{} paper", subject),
            "date": "2024-05-01",
            "total": total
        }),
    );
    res["mark"]["id"].as_str().expect("mark id").to_string()
}

#[test]
fn delete_removes_exactly_one_entry() {
    let workspace = temp_dir("marksy-marks-delete");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let a = add_mark(&mut stdin, &mut reader, "2", "Physics", 70.0);
    let b = add_mark(&mut stdin, &mut reader, "3", "Chemistry", 55.0);
    let c = add_mark(&mut stdin, &mut reader, "4", "Biology", 81.0);

    let del = request_ok(&mut stdin, &mut reader, "5", "marks.delete", json!({ "id": b }));
    assert_eq!(del["removed"], true);
    assert_eq!(del["remaining"], 2);

    let list = request_ok(&mut stdin, &mut reader, "6", "marks.list", json!({}));
    let ids: Vec<&str> = list["marks"]
        .as_array()
        .expect("marks array")
        .iter()
        .filter_map(|m| m["id"].as_str())
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&a.as_str()));
    assert!(ids.contains(&c.as_str()));
    assert!(!ids.contains(&b.as_str()));

    // Unknown ids leave the list as it was.
    let noop = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "marks.delete",
        json!({ "id": "does-not-exist" }),
    );
    assert_eq!(noop["removed"], false);
    assert_eq!(noop["remaining"], 2);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn add_rejects_missing_fields_without_saving() {
    let workspace = temp_dir("marksy-marks-missing");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "marks.add",
        json!({ "subject": "Physics", "date": "2024-05-01" }),
    );
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "bad_params");
    let missing: Vec<&str> = resp["error"]["details"]["missing"]
        .as_array()
        .expect("missing list")
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(missing, vec!["paperName", "total"]);

    let list = request_ok(&mut stdin, &mut reader, "3", "marks.list", json!({}));
    assert_eq!(list["count"], 0);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn add_derives_total_and_flags_mismatch() {
    let workspace = temp_dir("marksy-marks-total");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let derived = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "marks.add",
        json!({
            "subject": "Physics",
            "paper": "Term test",
            "date": "2024-05-01",
            "mcq": 30,
            "seq": 25,
            "essay": 22
        }),
    );
    assert_eq!(derived["mark"]["total"], 77.0);
    assert_eq!(derived["mark"]["paperName"], "Term test");
    assert_eq!(derived["grade"], "A");
    assert_eq!(derived["totalMismatch"], false);

    let mismatched = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "marks.add",
        json!({
            "subject": "Physics",
            "paperName": "Model paper",
            "date": "2024-05-02",
            "mcq": 30,
            "seq": 20,
            "essay": 5,
            "total": 60
        }),
    );
    assert_eq!(mismatched["mark"]["total"], 60.0);
    assert_eq!(mismatched["totalMismatch"], true);

    let cleared = request_ok(&mut stdin, &mut reader, "4", "marks.clear", json!({}));
    assert_eq!(cleared["removed"], 2);
    let list = request_ok(&mut stdin, &mut reader, "5", "marks.list", json!({}));
    assert_eq!(list["count"], 0);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn marks_survive_a_restart() {
    let workspace = temp_dir("marksy-marks-persist");
    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar();
        request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        add_mark(&mut stdin, &mut reader, "2", "Economics", 64.0);
        drop(stdin);
        let _ = child.wait();
    }

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let list = request_ok(&mut stdin, &mut reader, "2", "marks.list", json!({}));
    assert_eq!(list["count"], 1);
    assert_eq!(list["marks"][0]["subject"], "Economics");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
