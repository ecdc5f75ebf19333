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
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .env_remove("GRADEBOOKD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn send_line(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    line: &str,
) -> serde_json::Value {
    writeln!(stdin, "{}", line).expect("write request");
    stdin.flush().expect("flush request");
    let mut out = String::new();
    reader.read_line(&mut out).expect("read response line");
    serde_json::from_str(out.trim()).expect("parse response json")
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
    let value = send_line(stdin, reader, &payload.to_string());
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

#[test]
fn methods_require_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health.get("ok").and_then(|v| v.as_bool()), Some(true));

    let listed = request(&mut stdin, &mut reader, "2", "students.list", json!({}));
    assert_eq!(
        listed
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("no_workspace")
    );

    let unknown = send_line(
        &mut stdin,
        &mut reader,
        &json!({ "id": "3", "method": "grades.explode", "params": {} }).to_string(),
    );
    assert_eq!(
        unknown
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    // A broken line is answered and the loop keeps serving.
    let broken = send_line(&mut stdin, &mut reader, "{not json");
    assert_eq!(
        broken
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_json")
    );
    let again = request(&mut stdin, &mut reader, "4", "health", json!({}));
    assert_eq!(again.get("ok").and_then(|v| v.as_bool()), Some(true));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradebook-router-smoke");
    let bundle_out = workspace.join("smoke-backup.gbbackup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "students.enroll",
        json!({ "admissionNo": "SM1", "name": "Smoke Student", "form": "1", "stream": "A" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "4",
        "students.update",
        json!({ "admissionNo": "SM1", "patch": { "name": "Updated" } }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.get",
        json!({ "admissionNo": "SM1" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "6",
        "marks.set",
        json!({ "admissionNo": "SM1", "subjectType": "compulsory", "subject": "Math", "score": 55 }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "marks.delete",
        json!({ "admissionNo": "SM1", "subjectType": "compulsory", "subject": "Math" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "teachers.register",
        json!({ "username": "smoke", "name": "Smoke Teacher", "subjects": ["Math"] }),
    );
    let _ = request(&mut stdin, &mut reader, "9", "teachers.list", json!({}));
    let _ = request(&mut stdin, &mut reader, "10", "calc.recomputeRanks", json!({}));
    let _ = request(&mut stdin, &mut reader, "11", "calc.meritList", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "calc.subjectStats",
        json!({ "subject": "Math" }),
    );
    let _ = request(&mut stdin, &mut reader, "13", "calc.subjectAverages", json!({}));
    let _ = request(&mut stdin, &mut reader, "14", "exams.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "exams.get",
        json!({ "examId": "missing" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "exams.setActive",
        json!({ "examId": "missing", "active": true }),
    );
    let _ = request(&mut stdin, &mut reader, "17", "results.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "18",
        "results.get",
        json!({ "resultId": "missing" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "18a",
        "results.forExam",
        json!({ "examId": "missing" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "18b",
        "exams.available",
        json!({ "studentId": "SM1" }),
    );
    let _ = request(&mut stdin, &mut reader, "18c", "calc.dashboard", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "19",
        "backup.exportWorkspaceBundle",
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "outPath": bundle_out.to_string_lossy()
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "20",
        "backup.importWorkspaceBundle",
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "inPath": bundle_out.to_string_lossy()
        }),
    );
    let restored = request(
        &mut stdin,
        &mut reader,
        "21",
        "students.get",
        json!({ "admissionNo": "SM1" }),
    );
    assert_eq!(
        restored
            .get("result")
            .and_then(|r| r.get("student"))
            .and_then(|s| s.get("name"))
            .and_then(|v| v.as_str()),
        Some("Updated")
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "22",
        "students.delete",
        json!({ "admissionNo": "SM1" }),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
