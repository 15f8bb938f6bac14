use crate::ipc::helpers::{db_conn, log_activity, parse_params, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::enrollments::{self, EnrollmentDraft, EnrollmentFilter};
use crate::store::StoreError;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkEnrollParams {
    course_id: String,
    student_ids: Vec<String>,
    academic_year: String,
    semester: i64,
}

fn handle_enrollments_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "enrollments": [] }));
    };
    let filter: EnrollmentFilter = parse_params(req, None)?;
    Ok(json!({ "enrollments": enrollments::list(conn, &filter)? }))
}

fn handle_enrollments_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let draft: EnrollmentDraft = parse_params(req, None)?;
    let enrollment = enrollments::insert(conn, &draft)?;
    log_activity(
        conn,
        "create",
        "enrollment",
        Some(&enrollment.id),
        Some(json!({
            "studentId": enrollment.student_id,
            "courseId": enrollment.course_id,
        })),
    );
    Ok(json!({ "enrollment": enrollment }))
}

fn outcome_status(e: &StoreError) -> &'static str {
    match e {
        StoreError::Conflict { .. } => "duplicate",
        _ => "error",
    }
}

fn handle_enrollments_bulk_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let params: BulkEnrollParams = parse_params(req, None)?;

    let mut outcomes = Vec::with_capacity(params.student_ids.len());
    let mut created = 0usize;
    for student_id in &params.student_ids {
        let draft = EnrollmentDraft {
            student_id: student_id.clone(),
            course_id: params.course_id.clone(),
            academic_year: params.academic_year.clone(),
            semester: params.semester,
        };
        match enrollments::insert(conn, &draft) {
            Ok(enrollment) => {
                created += 1;
                outcomes.push(json!({
                    "studentId": student_id,
                    "status": "created",
                    "enrollmentId": enrollment.id,
                }));
            }
            Err(e) => outcomes.push(json!({
                "studentId": student_id,
                "status": outcome_status(&e),
                "message": e.to_string(),
            })),
        }
    }
    log_activity(
        conn,
        "bulk_create",
        "enrollment",
        Some(&params.course_id),
        Some(json!({ "requested": params.student_ids.len(), "created": created })),
    );
    Ok(json!({
        "outcomes": outcomes,
        "created": created,
        "failed": params.student_ids.len() - created,
    }))
}

fn handle_enrollments_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let enrollment_id = required_str(req, "enrollmentId")?;
    enrollments::delete(conn, &enrollment_id)?;
    log_activity(conn, "delete", "enrollment", Some(&enrollment_id), None);
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "enrollments.list" => handle_enrollments_list(state, req),
        "enrollments.create" => handle_enrollments_create(state, req),
        "enrollments.bulkCreate" => handle_enrollments_bulk_create(state, req),
        "enrollments.delete" => handle_enrollments_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
