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
    let exe = env!("CARGO_BIN_EXE_teeportald");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn teeportald");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn read_response(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response line");
    serde_json::from_str(line.trim()).expect("parse response json")
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

    let value = read_response(reader);
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
    value.get("result").cloned().unwrap_or(json!({}))
}
fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

fn open_workspace(prefix: &str) -> (PathBuf, Child, ChildStdin, BufReader<ChildStdout>) {
    let workspace = temp_dir(prefix);
    let (child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    (workspace, child, stdin, reader)
}

fn seed(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
) -> (String, String, String) {
    let a = request_ok(
        stdin,
        reader,
        "s1",
        "students.create",
        json!({ "firstName": "Ada", "lastName": "Obi", "program": "hnc", "intakeYear": 2025 }),
    );
    let b = request_ok(
        stdin,
        reader,
        "s2",
        "students.create",
        json!({ "firstName": "Bola", "lastName": "Eze", "program": "hnc", "intakeYear": 2025 }),
    );
    let course = request_ok(
        stdin,
        reader,
        "c1",
        "courses.create",
        json!({ "code": "NT201", "name": "New Testament", "credits": 2 }),
    );
    (
        a["student"]["id"].as_str().expect("student a").to_string(),
        b["student"]["id"].as_str().expect("student b").to_string(),
        course["course"]["id"].as_str().expect("course").to_string(),
    )
}

fn mark_rows(workspace: &PathBuf) -> Vec<(String, f64, String)> {
    let conn = rusqlite::Connection::open(workspace.join("portal.sqlite3")).expect("open db");
    let mut stmt = conn
        .prepare("SELECT id, score, grade FROM marks ORDER BY score DESC")
        .expect("prepare");
    let rows = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .expect("query")
        .collect::<Result<Vec<_>, _>>()
        .expect("rows");
    rows
}

#[test]
fn duplicate_triple_is_refused_until_overwrite_is_confirmed() {
    let (workspace, mut child, mut stdin, mut reader) = open_workspace("teeportal-dup-guard");
    let (student_id, _, course_id) = seed(&mut stdin, &mut reader);

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "marks.save",
        json!({
            "studentId": student_id,
            "courseId": course_id,
            "assessmentName": "CAT 1",
            "assessmentType": "cat",
            "score": 14,
            "maxScore": 20
        }),
    );
    assert_eq!(first["kind"], json!("created"));
    assert_eq!(first["mark"]["percentage"], json!(70.0));
    assert_eq!(first["mark"]["grade"], json!("CREDIT"));
    assert_eq!(first["mark"]["gradePoints"], json!(3.0));
    let mark_id = first["mark"]["id"].as_str().expect("mark id").to_string();
    let created_at = first["mark"]["createdAt"].as_str().expect("createdAt").to_string();

    let dup = request(
        &mut stdin,
        &mut reader,
        "2",
        "marks.save",
        json!({
            "studentId": student_id,
            "courseId": course_id,
            "assessmentName": "CAT 1",
            "score": 9,
            "maxScore": 20
        }),
    );
    assert_eq!(error_code(&dup), Some("duplicate_mark"));
    let existing = &dup["error"]["details"]["existing"];
    assert_eq!(existing["markId"], json!(mark_id));
    assert_eq!(existing["score"], json!(14.0));
    assert_eq!(existing["maxScore"], json!(20.0));
    assert_eq!(existing["grade"], json!("CREDIT"));

    let rows = mark_rows(&workspace);
    assert_eq!(rows.len(), 1, "refused save must not write");
    assert_eq!(rows[0].1, 14.0);

    let replaced = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "marks.save",
        json!({
            "studentId": student_id,
            "courseId": course_id,
            "assessmentName": "CAT 1",
            "score": 9,
            "maxScore": 20,
            "remarks": "resit",
            "overwrite": true
        }),
    );
    assert_eq!(replaced["kind"], json!("overwritten"));
    assert_eq!(replaced["mark"]["id"], json!(mark_id));
    assert_eq!(replaced["mark"]["createdAt"], json!(created_at));
    assert_eq!(replaced["mark"]["percentage"], json!(45.0));
    assert_eq!(replaced["mark"]["grade"], json!("FAIL"));
    assert_eq!(replaced["mark"]["remarks"], json!("resit"));

    let rows = mark_rows(&workspace);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0], (mark_id, 9.0, "FAIL".to_string()));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn invalid_scores_are_rejected_without_writes() {
    let (workspace, mut child, mut stdin, mut reader) = open_workspace("teeportal-dup-invalid");
    let (student_id, _, course_id) = seed(&mut stdin, &mut reader);

    let cases = [
        json!({ "score": -1, "maxScore": 20 }),
        json!({ "score": 5, "maxScore": 0 }),
        json!({ "score": 25, "maxScore": 20 }),
    ];
    for (i, scores) in cases.iter().enumerate() {
        let mut params = json!({
            "studentId": student_id,
            "courseId": course_id,
            "assessmentName": "Quiz",
        });
        params["score"] = scores["score"].clone();
        params["maxScore"] = scores["maxScore"].clone();
        let resp = request(&mut stdin, &mut reader, &format!("bad{}", i), "marks.save", params);
        assert_eq!(error_code(&resp), Some("bad_params"), "case {}", i);
    }

    let blank = request(
        &mut stdin,
        &mut reader,
        "blank",
        "marks.save",
        json!({ "studentId": student_id, "courseId": course_id, "assessmentName": "  ", "score": 5 }),
    );
    assert_eq!(error_code(&blank), Some("bad_params"));

    let missing = request(
        &mut stdin,
        &mut reader,
        "missing",
        "marks.save",
        json!({ "studentId": "nope", "courseId": course_id, "assessmentName": "Quiz", "score": 5 }),
    );
    assert_eq!(error_code(&missing), Some("not_found"));

    assert!(mark_rows(&workspace).is_empty());

    // Boundary: score == maxScore is valid and max score defaults to 100.
    let full = request_ok(
        &mut stdin,
        &mut reader,
        "full",
        "marks.save",
        json!({ "studentId": student_id, "courseId": course_id, "assessmentName": "Quiz", "score": 100 }),
    );
    assert_eq!(full["mark"]["maxScore"], json!(100.0));
    assert_eq!(full["mark"]["grade"], json!("DISTINCTION"));
    assert_eq!(full["mark"]["visibleToStudent"], json!(false));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn bulk_grade_collects_every_outcome() {
    let (workspace, mut child, mut stdin, mut reader) = open_workspace("teeportal-dup-bulk");
    let (a, b, course_id) = seed(&mut stdin, &mut reader);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "marks.save",
        json!({ "studentId": a, "courseId": course_id, "assessmentName": "Final", "score": 80 }),
    );

    let bulk = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "marks.bulkGrade",
        json!({
            "courseId": course_id,
            "assessmentName": "Final",
            "assessmentType": "exam",
            "scores": [
                { "studentId": a, "score": 90 },
                { "studentId": b, "score": 49.99 },
                { "studentId": "ghost", "score": 60 },
                { "studentId": b, "score": 150 }
            ]
        }),
    );
    let outcomes = bulk["outcomes"].as_array().expect("outcomes");
    let statuses: Vec<&str> = outcomes
        .iter()
        .map(|o| o["status"].as_str().expect("status"))
        .collect();
    assert_eq!(statuses, vec!["duplicate", "created", "error", "error"]);
    assert_eq!(outcomes[1]["mark"]["grade"], json!("FAIL"));
    assert_eq!(bulk["summary"]["created"], json!(1));
    assert_eq!(bulk["summary"]["duplicates"], json!(1));
    assert_eq!(bulk["summary"]["errors"], json!(2));

    // The duplicate kept its original score.
    let rows = mark_rows(&workspace);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].1, 80.0);

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "marks.list",
        json!({ "courseId": course_id, "visibleOnly": true }),
    );
    assert_eq!(listed["marks"].as_array().map(|a| a.len()), Some(0));
    let published = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "marks.setVisibility",
        json!({ "courseId": course_id, "assessmentName": "Final", "visible": true }),
    );
    assert_eq!(published["updated"], json!(2));
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "marks.list",
        json!({ "courseId": course_id, "visibleOnly": true }),
    );
    assert_eq!(listed["marks"].as_array().map(|a| a.len()), Some(2));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
