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

fn create_course(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    code: &str,
    credits: i64,
) -> String {
    let course = request_ok(
        stdin,
        reader,
        &format!("course-{}", code),
        "courses.create",
        json!({ "code": code, "name": format!("Course {}", code), "credits": credits }),
    );
    course["course"]["id"].as_str().expect("course id").to_string()
}

fn save_mark(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    student_id: &str,
    course_id: &str,
    score: f64,
) {
    request_ok(
        stdin,
        reader,
        &format!("mark-{}", course_id),
        "marks.save",
        json!({
            "studentId": student_id,
            "courseId": course_id,
            "assessmentName": "Final",
            "assessmentDate": "2025-06-30",
            "score": score
        }),
    );
}

#[test]
fn transcript_gpa_is_credit_weighted_over_passing_marks() {
    let (workspace, mut child, mut stdin, mut reader) = open_workspace("teeportal-transcript");
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "s",
        "students.create",
        json!({ "firstName": "Ada", "lastName": "Obi", "program": "hnc", "intakeYear": 2025 }),
    );
    let student_id = student["student"]["id"].as_str().expect("student id").to_string();

    let ot = create_course(&mut stdin, &mut reader, "OT101", 3);
    let nt = create_course(&mut stdin, &mut reader, "NT101", 2);
    let ch = create_course(&mut stdin, &mut reader, "CH101", 4);
    save_mark(&mut stdin, &mut reader, &student_id, &ot, 90.0);
    save_mark(&mut stdin, &mut reader, &student_id, &nt, 72.0);
    save_mark(&mut stdin, &mut reader, &student_id, &ch, 40.0);

    let t = request_ok(
        &mut stdin,
        &mut reader,
        "t",
        "reports.transcript",
        json!({ "studentId": student_id }),
    );
    let t = &t["transcript"];
    assert_eq!(t["rows"].as_array().map(|a| a.len()), Some(3));
    // (4.0 * 3 + 3.0 * 2) / (3 + 2); the FAIL row carries no weight.
    assert_eq!(t["gpa"], json!(3.6));
    assert_eq!(t["creditsEarned"], json!(5));
    assert_eq!(t["gradeCounts"]["distinction"], json!(1));
    assert_eq!(t["gradeCounts"]["credit"], json!(1));
    assert_eq!(t["gradeCounts"]["fail"], json!(1));

    // Only published marks count toward the student-facing view.
    request_ok(
        &mut stdin,
        &mut reader,
        "pub",
        "marks.setVisibility",
        json!({ "courseId": ot, "visible": true }),
    );
    let published = request_ok(
        &mut stdin,
        &mut reader,
        "tp",
        "reports.transcript",
        json!({ "studentId": student_id, "publishedOnly": true }),
    );
    assert_eq!(published["transcript"]["rows"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(published["transcript"]["gpa"], json!(4.0));

    let csv_path = workspace.join("exports").join("transcript.csv");
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "x",
        "reports.transcriptExport",
        json!({ "studentId": student_id, "outPath": csv_path.to_string_lossy() }),
    );
    assert_eq!(exported["rowsExported"], json!(3));

    let csv = std::fs::read_to_string(&csv_path).expect("read csv");
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "# HNC-2025-001,\"Obi, Ada\",hnc");
    assert!(lines[1].starts_with("course_code,course_name,credits"));
    assert!(lines.iter().any(|l| l.starts_with("OT101,Course OT101,3,Final,exam,2025-06-30,")
        && l.ends_with(",90.00,DISTINCTION,4.0")));
    assert!(lines.iter().any(|l| l.starts_with("CH101,") && l.contains(",FAIL,0.0")));
    assert!(csv.contains("# gpa,3.60\n"));
    assert!(csv.contains("# credits_earned,5\n"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn student_without_passing_marks_has_zero_gpa() {
    let (workspace, mut child, mut stdin, mut reader) = open_workspace("teeportal-transcript-zero");
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "s",
        "students.create",
        json!({ "firstName": "Kemi", "lastName": "Ade", "program": "basic", "intakeYear": 2024 }),
    );
    let student_id = student["student"]["id"].as_str().expect("student id").to_string();

    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "t0",
        "reports.transcript",
        json!({ "studentId": student_id }),
    );
    assert_eq!(empty["transcript"]["gpa"], json!(0.0));
    assert_eq!(empty["transcript"]["creditsEarned"], json!(0));

    let course = create_course(&mut stdin, &mut reader, "BS101", 3);
    save_mark(&mut stdin, &mut reader, &student_id, &course, 20.0);
    let failed = request_ok(
        &mut stdin,
        &mut reader,
        "t1",
        "reports.transcript",
        json!({ "studentId": student_id }),
    );
    assert_eq!(failed["transcript"]["gpa"], json!(0.0));

    let perf = request_ok(
        &mut stdin,
        &mut reader,
        "p",
        "reports.coursePerformance",
        json!({ "courseId": course }),
    );
    assert_eq!(perf["performance"]["markCount"], json!(1));
    assert_eq!(perf["performance"]["passRate"], json!(0.0));
    assert_eq!(perf["performance"]["distribution"]["fail"], json!(1));

    let missing = request(
        &mut stdin,
        &mut reader,
        "m",
        "reports.transcript",
        json!({ "studentId": "missing" }),
    );
    assert_eq!(error_code(&missing), Some("not_found"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
