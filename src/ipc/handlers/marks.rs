use crate::entry::{self, BulkGradeRequest};
use crate::ipc::helpers::{
    db_conn, log_activity, optional_str, parse_params, required_str, respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::setup::PortalSettings;
use crate::store::marks::{self, MarkDraft, MarkFilter, MarkPatch};
use serde_json::{json, Value};
use tracing::info;

fn handle_marks_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "marks": [] }));
    };
    let filter: MarkFilter = parse_params(req, None)?;
    Ok(json!({ "marks": marks::list(conn, &filter)? }))
}

fn handle_marks_save(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let draft: MarkDraft = parse_params(req, None)?;
    let overwrite = req
        .params
        .get("overwrite")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let defaults = PortalSettings::load(conn)?.mark_defaults;

    let saved = state.mark_entry.save(conn, &draft, defaults, overwrite)?;
    log_activity(
        conn,
        match saved.kind {
            entry::SaveKind::Created => "create",
            entry::SaveKind::Overwritten => "overwrite",
        },
        "mark",
        Some(&saved.mark.id),
        Some(json!({
            "studentId": saved.mark.student_id,
            "courseId": saved.mark.course_id,
            "assessmentName": saved.mark.assessment_name,
            "grade": saved.mark.grade,
        })),
    );
    Ok(json!(saved))
}

fn handle_marks_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let mark_id = required_str(req, "markId")?;
    let patch: MarkPatch = parse_params(req, Some("patch"))?;
    let mark = marks::update(conn, &mark_id, &patch)?;
    log_activity(
        conn,
        "update",
        "mark",
        Some(&mark.id),
        req.params.get("patch").cloned(),
    );
    Ok(json!({ "mark": mark }))
}

fn handle_marks_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let mark_id = required_str(req, "markId")?;
    marks::delete(conn, &mark_id)?;
    log_activity(conn, "delete", "mark", Some(&mark_id), None);
    Ok(json!({ "ok": true }))
}

fn handle_marks_set_visibility(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let course_id = required_str(req, "courseId")?;
    let assessment_name = optional_str(req, "assessmentName");
    let visible = req
        .params
        .get("visible")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::bad_params("visible must be a boolean"))?;
    let updated = marks::set_visibility(conn, &course_id, assessment_name.as_deref(), visible)?;
    log_activity(
        conn,
        if visible { "publish" } else { "unpublish" },
        "mark",
        None,
        Some(json!({
            "courseId": course_id,
            "assessmentName": assessment_name,
            "updated": updated,
        })),
    );
    Ok(json!({ "updated": updated }))
}

fn handle_marks_bulk_grade(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let bulk: BulkGradeRequest = parse_params(req, None)?;
    if bulk.course_id.trim().is_empty() {
        return Err(HandlerErr::bad_params("missing courseId"));
    }
    let defaults = PortalSettings::load(conn)?.mark_defaults;
    let (outcomes, summary) = entry::bulk_grade(conn, &bulk, defaults);
    info!(
        course_id = %bulk.course_id,
        assessment = %bulk.assessment_name,
        created = summary.created,
        overwritten = summary.overwritten,
        duplicates = summary.duplicates,
        errors = summary.errors,
        "bulk grading finished"
    );
    log_activity(
        conn,
        "bulk_grade",
        "mark",
        None,
        Some(json!({
            "courseId": bulk.course_id,
            "assessmentName": bulk.assessment_name,
            "summary": summary,
        })),
    );
    Ok(json!({ "outcomes": outcomes, "summary": summary }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "marks.list" => handle_marks_list(state, req),
        "marks.save" => handle_marks_save(state, req),
        "marks.update" => handle_marks_update(state, req),
        "marks.delete" => handle_marks_delete(state, req),
        "marks.setVisibility" => handle_marks_set_visibility(state, req),
        "marks.bulkGrade" => handle_marks_bulk_grade(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
