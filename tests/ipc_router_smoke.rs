mod support;

use rollcalld::config::hash_password;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

const START_DATE: &str = "2025-12-26";

fn spawn_sidecar(
    api: &support::FakeApi,
    workspace: &Path,
) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rollcalld");
    let mut child = Command::new(exe)
        .env("ROLLCALL_API_URL", api.api_url())
        .env("ROLLCALL_API_KEY", support::API_KEY)
        .env("ROLLCALL_BASE_ID", support::BASE_ID)
        .env(
            "ROLLCALL_CREDENTIALS",
            format!("admin:{}", hash_password("letmein")),
        )
        .env("ROLLCALL_START_DATE", START_DATE)
        .env("ROLLCALL_WORKSPACE", workspace)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rollcalld");
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
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_default()
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn login_mark_submit_and_resubmit() {
    let (_rt, api) = support::start_in_background();
    let alice = api.seed("Participants", json!({ "Name": "Alice", "Email": "alice@example.test" }));
    let bob = api.seed("Participants", json!({ "Name": "Bob" }));
    api.seed("Participants", json!({ "name": "Carol", "phone": "555-0100" }));
    let workspace = tempfile::tempdir().expect("tempdir");
    let (_child, mut stdin, mut reader) = spawn_sidecar(&api, workspace.path());

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["startDate"], START_DATE);
    assert_eq!(health["authenticated"], false);

    let denied = request(&mut stdin, &mut reader, "2", "attendance.open", json!({}));
    assert_eq!(error_code(&denied), Some("unauthenticated"));

    let bad = request(
        &mut stdin,
        &mut reader,
        "3",
        "session.login",
        json!({ "username": "admin", "password": "nope" }),
    );
    assert_eq!(error_code(&bad), Some("invalid_credentials"));
    assert_eq!(bad["error"]["message"], "Invalid username or password");

    let login = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "session.login",
        json!({ "username": " admin ", "password": "letmein" }),
    );
    assert_eq!(login["session"]["username"], "admin");

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.open",
        json!({ "date": START_DATE }),
    );
    assert_eq!(opened["view"]["date"], START_DATE);
    assert_eq!(opened["view"]["stats"]["total"], 3);
    assert_eq!(opened["view"]["stats"]["present"], 0);
    assert_eq!(opened["view"]["canSubmit"], true);

    let empty_submit = request(&mut stdin, &mut reader, "6", "attendance.submit", json!({}));
    assert_eq!(error_code(&empty_submit), Some("validation_failed"));

    request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.markAll",
        json!({ "status": "Present" }),
    );
    let toggled = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "attendance.toggle",
        json!({ "participantId": bob, "status": "Absent" }),
    );
    assert_eq!(toggled["view"]["stats"]["present"], 2);
    assert_eq!(toggled["view"]["stats"]["absent"], 1);

    let submitted = request_ok(&mut stdin, &mut reader, "9", "attendance.submit", json!({}));
    assert_eq!(submitted["created"], 3);
    assert_eq!(submitted["updated"], 0);
    assert_eq!(submitted["summary"]["present"], 2);
    let rows = api.records("Attendance");
    assert_eq!(rows.len(), 3);
    let alice_row = rows
        .iter()
        .find(|r| r["fields"]["Participant ID"] == json!(alice))
        .expect("alice row");
    assert_eq!(alice_row["fields"]["Participant Name"], "Alice");
    assert_eq!(alice_row["fields"]["Date"], START_DATE);
    assert_eq!(alice_row["fields"]["Status"], "Present");

    let resubmitted = request_ok(&mut stdin, &mut reader, "10", "attendance.submit", json!({}));
    assert_eq!(resubmitted["created"], 0);
    assert_eq!(resubmitted["updated"], 3);
    assert_eq!(api.records("Attendance").len(), 3);

    let last = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "attendance.lastSubmission",
        json!({}),
    );
    assert_eq!(last["summary"]["date"], START_DATE);
    assert_eq!(last["summary"]["updated"], 3);

    let early = request(
        &mut stdin,
        &mut reader,
        "12",
        "attendance.setDate",
        json!({ "date": "2025-12-25" }),
    );
    assert_eq!(error_code(&early), Some("validation_failed"));
    assert_eq!(
        early["error"]["message"],
        "Please select a date on or after December 26, 2025"
    );

    let view = request_ok(&mut stdin, &mut reader, "13", "attendance.view", json!({}));
    assert_eq!(view["view"]["date"], START_DATE);
    assert_eq!(view["view"]["stats"]["present"], 2);

    let unknown = request(&mut stdin, &mut reader, "14", "attendance.export", json!({}));
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    request_ok(&mut stdin, &mut reader, "15", "session.logout", json!({}));
    let after = request(&mut stdin, &mut reader, "16", "attendance.view", json!({}));
    assert_eq!(error_code(&after), Some("unauthenticated"));
}

#[test]
fn session_survives_restart_in_same_workspace() {
    let (_rt, api) = support::start_in_background();
    api.seed("Participants", json!({ "Name": "Alice" }));
    let workspace = tempfile::tempdir().expect("tempdir");

    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar(&api, workspace.path());
        request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "session.login",
            json!({ "username": "admin", "password": "letmein" }),
        );
        drop(stdin);
        child.wait().expect("sidecar exit");
    }

    let (_child, mut stdin, mut reader) = spawn_sidecar(&api, workspace.path());
    let status = request_ok(&mut stdin, &mut reader, "2", "session.status", json!({}));
    assert_eq!(status["authenticated"], true);
    assert_eq!(status["session"]["username"], "admin");

    let not_loaded = request(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.toggle",
        json!({ "participantId": "recX", "status": "Present" }),
    );
    assert_eq!(error_code(&not_loaded), Some("not_loaded"));
}

#[test]
fn malformed_line_gets_bad_json() {
    let (_rt, api) = support::start_in_background();
    let workspace = tempfile::tempdir().expect("tempdir");
    let (_child, mut stdin, mut reader) = spawn_sidecar(&api, workspace.path());

    writeln!(stdin, "{{not json").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(value["ok"], false);
    assert_eq!(error_code(&value), Some("bad_json"));

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["authenticated"], false);
}
