use crate::ipc::helpers::{db_conn, optional_str, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::reports;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

fn published_only(req: &Request) -> bool {
    req.params
        .get("publishedOnly")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

fn handle_reports_transcript(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    let transcript = reports::transcript(conn, &student_id, published_only(req))?;
    Ok(json!({ "transcript": transcript }))
}

fn handle_reports_transcript_export(
    state: &mut AppState,
    req: &Request,
) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    let out_path = required_str(req, "outPath")?;
    let transcript = reports::transcript(conn, &student_id, published_only(req))?;
    let rows = reports::write_transcript_csv(&transcript, &PathBuf::from(&out_path)).map_err(|e| {
        HandlerErr::new("io_failed", e.to_string()).with_details(json!({ "path": out_path }))
    })?;
    info!(student_id = %student_id, path = %out_path, rows, "transcript exported");
    Ok(json!({
        "path": out_path,
        "rowsExported": rows,
        "gpa": transcript.gpa,
    }))
}

fn handle_reports_gradebook(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let course_id = required_str(req, "courseId")?;
    let academic_year = optional_str(req, "academicYear");
    let semester = match req.params.get("semester") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_i64()
                .ok_or_else(|| HandlerErr::bad_params("semester must be an integer"))?,
        ),
    };
    let gradebook = reports::gradebook(conn, &course_id, academic_year.as_deref(), semester)?;
    Ok(json!({ "gradebook": gradebook }))
}

fn handle_reports_course_performance(
    state: &mut AppState,
    req: &Request,
) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let course_id = required_str(req, "courseId")?;
    Ok(json!({ "performance": reports::course_performance(conn, &course_id)? }))
}

fn handle_reports_dashboard(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    Ok(json!({ "dashboard": reports::dashboard(conn)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "reports.transcript" => handle_reports_transcript(state, req),
        "reports.transcriptExport" => handle_reports_transcript_export(state, req),
        "reports.gradebook" => handle_reports_gradebook(state, req),
        "reports.coursePerformance" => handle_reports_course_performance(state, req),
        "reports.dashboard" => handle_reports_dashboard(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
