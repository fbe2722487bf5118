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

fn open_workspace(prefix: &str) -> (PathBuf, Child, ChildStdin, BufReader<ChildStdout>) {
    let workspace = temp_dir(prefix);
    let (child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "select",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    (workspace, child, stdin, reader)
}

fn error_code(v: &serde_json::Value) -> &str {
    assert_eq!(v["ok"], false, "expected failure: {}", v);
    v["error"]["code"].as_str().unwrap_or("")
}

#[test]
fn setup_defaults_and_validation() {
    let (workspace, mut child, mut stdin, mut reader) = open_workspace("marksy-setup");

    let defaults = request_ok(&mut stdin, &mut reader, "1", "setup.get", json!({}));
    assert_eq!(defaults["grading"]["scale"], "standard");
    assert_eq!(defaults["study"]["dailyGoalMinutes"], 120);
    assert_eq!(defaults["display"]["theme"], "system");
    assert_eq!(defaults["display"]["language"], "en");
    assert_eq!(defaults["export"]["watermark"], "Exported from Marksy");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({ "section": "display", "patch": { "theme": "Dark", "language": "si" } }),
    );
    assert_eq!(updated["value"]["theme"], "dark");
    assert_eq!(updated["value"]["language"], "si");

    for (i, (section, patch)) in [
        ("study", json!({ "dailyGoalMinutes": 5 })),
        ("display", json!({ "theme": "neon" })),
        ("grading", json!({ "scale": "curved" })),
        ("grading", json!({ "unknownField": 1 })),
        ("nope", json!({})),
    ]
    .into_iter()
    .enumerate()
    {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("bad-{}", i),
            "setup.update",
            json!({ "section": section, "patch": patch }),
        );
        assert_eq!(error_code(&resp), "bad_params", "{} {}", section, resp);
    }

    let after = request_ok(&mut stdin, &mut reader, "3", "setup.get", json!({}));
    assert_eq!(after["study"]["dailyGoalMinutes"], 120);
    assert_eq!(after["display"]["theme"], "dark");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn sixth_tutor_is_refused() {
    let (workspace, mut child, mut stdin, mut reader) = open_workspace("marksy-tutors");

    for i in 0..5 {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("t{}", i),
            "tutors.create",
            json!({ "name": format!("Tutor {}", i) }),
        );
    }
    let sixth = request(
        &mut stdin,
        &mut reader,
        "t5",
        "tutors.create",
        json!({ "name": "Tutor 5" }),
    );
    assert_eq!(error_code(&sixth), "limit_reached");

    let list = request_ok(&mut stdin, &mut reader, "list", "tutors.list", json!({}));
    assert_eq!(list["tutors"].as_array().map(|a| a.len()), Some(5));
    assert_eq!(list["limit"], 5);

    let bad_color = request(
        &mut stdin,
        &mut reader,
        "color",
        "tutors.create",
        json!({ "name": "Colour", "color": "blue" }),
    );
    assert_eq!(error_code(&bad_color), "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn subjects_and_todos_flow() {
    let (workspace, mut child, mut stdin, mut reader) = open_workspace("marksy-subjects");

    request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "subjects.create",
        json!({ "name": "Media Studies", "stream": "arts" }),
    );
    let dup = request(
        &mut stdin,
        &mut reader,
        "s2",
        "subjects.create",
        json!({ "name": "physics" }),
    );
    assert_eq!(error_code(&dup), "duplicate");

    request_ok(
        &mut stdin,
        &mut reader,
        "s3",
        "subjects.favorite",
        json!({ "name": "Media Studies", "favorite": true }),
    );
    let arts = request_ok(
        &mut stdin,
        &mut reader,
        "s4",
        "subjects.list",
        json!({ "stream": "arts" }),
    );
    assert_eq!(arts["subjects"][0]["name"], "Media Studies");
    assert_eq!(arts["subjects"][0]["favorite"], true);

    let catalog_delete = request(
        &mut stdin,
        &mut reader,
        "s5",
        "subjects.delete",
        json!({ "name": "Physics" }),
    );
    assert_eq!(error_code(&catalog_delete), "not_found");
    request_ok(
        &mut stdin,
        &mut reader,
        "s6",
        "subjects.delete",
        json!({ "name": "Media Studies" }),
    );

    let later = request_ok(
        &mut stdin,
        &mut reader,
        "t1",
        "todos.create",
        json!({ "text": "Essay draft", "dueDate": "2024-09-20" }),
    );
    let sooner = request_ok(
        &mut stdin,
        &mut reader,
        "t2",
        "todos.create",
        json!({ "text": "MCQ drill", "dueDate": "2024-09-10" }),
    );
    let toggled = request_ok(
        &mut stdin,
        &mut reader,
        "t3",
        "todos.toggle",
        json!({ "id": sooner["todo"]["id"] }),
    );
    assert_eq!(toggled["todo"]["done"], true);

    let list = request_ok(&mut stdin, &mut reader, "t4", "todos.list", json!({}));
    assert_eq!(list["openCount"], 1);
    assert_eq!(list["todos"][0]["id"], later["todo"]["id"]);

    let missing = request(
        &mut stdin,
        &mut reader,
        "t5",
        "todos.toggle",
        json!({ "id": "nope" }),
    );
    assert_eq!(error_code(&missing), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn profile_and_study_goal() {
    let (workspace, mut child, mut stdin, mut reader) = open_workspace("marksy-profile");

    let bad_age = request(
        &mut stdin,
        &mut reader,
        "p1",
        "profile.update",
        json!({ "patch": { "age": 7 } }),
    );
    assert_eq!(error_code(&bad_age), "bad_params");
    let bad_avatar = request(
        &mut stdin,
        &mut reader,
        "p2",
        "profile.update",
        json!({ "patch": { "avatar": "https://example.com/me.png" } }),
    );
    assert_eq!(error_code(&bad_avatar), "bad_params");
    let good = request_ok(
        &mut stdin,
        &mut reader,
        "p3",
        "profile.update",
        json!({ "patch": { "avatar": "data:image/png;base64,iVBORw0KGgo=" } }),
    );
    assert_eq!(good["profile"]["avatar"], "data:image/png;base64,iVBORw0KGgo=");

    request_ok(
        &mut stdin,
        &mut reader,
        "g1",
        "setup.update",
        json!({ "section": "study", "patch": { "dailyGoalMinutes": 60 } }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "l1",
        "study.log",
        json!({ "minutes": 30, "date": "2024-06-01", "subject": "Physics" }),
    );
    let zero = request(
        &mut stdin,
        &mut reader,
        "l2",
        "study.log",
        json!({ "minutes": 0 }),
    );
    assert_eq!(error_code(&zero), "bad_params");

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "study.summary",
        json!({ "today": "2024-06-01" }),
    );
    assert_eq!(summary["todayMinutes"], 30);
    assert_eq!(summary["dailyGoalMinutes"], 60);
    assert_eq!(summary["goalProgress"], 0.5);
    assert_eq!(summary["studyStreak"], 1);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
