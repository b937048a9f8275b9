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
    let exe = env!("CARGO_BIN_EXE_campusd");
    let mut child = Command::new(exe)
        .env_remove("CAMPUSD_CONFIG")
        .env_remove("CAMPUSD_BAND_SIZE")
        .env_remove("CAMPUSD_SECTION_LABELS")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn campusd");
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
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> (String, u64) {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded",
        method
    );
    let error = value.get("error").cloned().unwrap_or_else(|| json!({}));
    (
        error
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        error.get("status").and_then(|v| v.as_u64()).unwrap_or(0),
    )
}

#[test]
fn students_crud_and_filters() {
    let workspace = temp_dir("campusd-students-crud");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let a = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({ "name": "Asha", "department": "CSE", "year": "2024", "rollNo": "CSE-01", "email": "asha@example.edu" }),
    );
    let a_id = a.get("studentId").and_then(|v| v.as_str()).expect("id").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({ "name": "Bilal", "department": "ECE", "year": "2024" }),
    );

    let (code, status) = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "name": "No Year", "department": "CSE" }),
    );
    assert_eq!((code.as_str(), status), ("bad_params", 400));

    let all = request_ok(&mut stdin, &mut reader, "4", "students.list", json!({}));
    assert_eq!(
        all.get("students").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(2)
    );
    let cse = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.list",
        json!({ "department": "CSE" }),
    );
    let cse_rows = cse
        .get("students")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(cse_rows.len(), 1);
    assert_eq!(cse_rows[0].get("rollNo").and_then(|v| v.as_str()), Some("CSE-01"));
    assert!(cse_rows[0].get("section").map(|v| v.is_null()).unwrap_or(false));

    let got = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.get",
        json!({ "studentId": a_id }),
    );
    assert_eq!(
        got.get("student").and_then(|s| s.get("email")).and_then(|v| v.as_str()),
        Some("asha@example.edu")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "results.create",
        json!({ "studentId": a_id, "subject": "Maths", "marksObtained": 10, "marksMax": 20 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "students.delete",
        json!({ "studentId": a_id }),
    );
    let (code, status) = request_err(
        &mut stdin,
        &mut reader,
        "9",
        "students.get",
        json!({ "studentId": a_id }),
    );
    assert_eq!((code.as_str(), status), ("not_found", 404));
    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "10",
        "students.delete",
        json!({ "studentId": a_id }),
    );
    assert_eq!(code, "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn results_validation_listing_and_cpi() {
    let workspace = temp_dir("campusd-results-cpi");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let s = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({ "name": "Chen", "department": "CSE", "year": "2024" }),
    );
    let sid = s.get("studentId").and_then(|v| v.as_str()).expect("id").to_string();

    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "results.cpi",
        json!({ "studentId": sid }),
    );
    assert_eq!(empty.get("percentage").and_then(|v| v.as_f64()), Some(0.0));
    assert_eq!(empty.get("cpi").and_then(|v| v.as_f64()), Some(0.0));

    let (code, status) = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "results.create",
        json!({ "studentId": sid, "subject": "Maths", "marksObtained": -1, "marksMax": 20 }),
    );
    assert_eq!((code.as_str(), status), ("bad_params", 400));
    let (code, status) = request_err(
        &mut stdin,
        &mut reader,
        "3b",
        "results.create",
        json!({ "studentId": sid, "subject": "Maths", "marksObtained": 1e308, "marksMax": 1e308 }),
    );
    assert_eq!((code.as_str(), status), ("bad_params", 400));
    let (code, status) = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "results.create",
        json!({ "studentId": "nobody", "subject": "Maths", "marksObtained": 1, "marksMax": 20 }),
    );
    assert_eq!((code.as_str(), status), ("not_found", 404));

    for (i, (subject, obtained, max)) in [
        ("Maths", 40.0, 50.0),
        ("Physics", 30.0, 50.0),
        ("Maths", 45.0, 50.0),
    ]
    .iter()
    .enumerate()
    {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("r{}", i),
            "results.create",
            json!({
                "studentId": sid,
                "subject": subject,
                "marksObtained": obtained,
                "marksMax": max,
                "examType": "midterm"
            }),
        );
    }

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "results.list",
        json!({ "studentId": sid }),
    );
    let rows = listed
        .get("results")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].get("subject").and_then(|v| v.as_str()), Some("Physics"));

    let cpi = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "results.cpi",
        json!({ "studentId": sid }),
    );
    assert_eq!(cpi.get("totalObtained").and_then(|v| v.as_f64()), Some(115.0));
    assert_eq!(cpi.get("totalMax").and_then(|v| v.as_f64()), Some(150.0));
    assert_eq!(cpi.get("percentage").and_then(|v| v.as_f64()), Some(76.67));
    assert_eq!(cpi.get("cpi").and_then(|v| v.as_f64()), Some(7.67));
    let subjects = cpi
        .get("subjects")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(subjects.len(), 2);
    assert_eq!(subjects[0].get("subject").and_then(|v| v.as_str()), Some("Maths"));
    assert_eq!(subjects[0].get("percentage").and_then(|v| v.as_f64()), Some(85.0));
    assert_eq!(subjects[1].get("percentage").and_then(|v| v.as_f64()), Some(60.0));

    let first_id = rows[0].get("id").and_then(|v| v.as_str()).expect("result id").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "results.delete",
        json!({ "resultId": first_id }),
    );
    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "8",
        "results.delete",
        json!({ "resultId": first_id }),
    );
    assert_eq!(code, "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn attendance_mark_upserts_and_summarises() {
    let workspace = temp_dir("campusd-attendance");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let s = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({ "name": "Dara", "department": "CSE", "year": "2024" }),
    );
    let sid = s.get("studentId").and_then(|v| v.as_str()).expect("id").to_string();

    let none = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.summary",
        json!({ "studentId": sid }),
    );
    assert_eq!(none.get("total").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(none.get("percentage").and_then(|v| v.as_f64()), Some(0.0));

    let marks = [
        ("Maths", "2026-09-01", true),
        ("Maths", "2026-09-02", false),
        ("Maths", "2026-09-03", true),
        ("Physics", "2026-09-01", false),
        // Re-marking a day replaces the earlier entry.
        ("Maths", "2026-09-02", true),
    ];
    for (i, (subject, date, present)) in marks.iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("m{}", i),
            "attendance.mark",
            json!({ "studentId": sid, "subject": subject, "date": date, "present": present }),
        );
    }

    let (code, status) = request_err(
        &mut stdin,
        &mut reader,
        "bad-date",
        "attendance.mark",
        json!({ "studentId": sid, "subject": "Maths", "date": "2026-13-01", "present": true }),
    );
    assert_eq!((code.as_str(), status), ("bad_params", 400));

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.summary",
        json!({ "studentId": sid }),
    );
    assert_eq!(summary.get("total").and_then(|v| v.as_i64()), Some(4));
    assert_eq!(summary.get("present").and_then(|v| v.as_i64()), Some(3));
    assert_eq!(summary.get("percentage").and_then(|v| v.as_f64()), Some(75.0));
    let subjects = summary
        .get("subjects")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(subjects.len(), 2);
    assert_eq!(subjects[0].get("subject").and_then(|v| v.as_str()), Some("Maths"));
    assert_eq!(subjects[0].get("percentage").and_then(|v| v.as_f64()), Some(100.0));
    assert_eq!(subjects[1].get("percentage").and_then(|v| v.as_f64()), Some(0.0));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
