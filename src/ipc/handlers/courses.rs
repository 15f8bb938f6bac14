use crate::ipc::helpers::{db_conn, log_activity, parse_params, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::setup::PortalSettings;
use crate::store::courses::{self, CourseDraft, CourseFilter, CoursePatch};
use serde_json::{json, Value};

fn handle_courses_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "courses": [] }));
    };
    let filter: CourseFilter = parse_params(req, None)?;
    Ok(json!({ "courses": courses::list(conn, &filter)? }))
}

fn handle_courses_get(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let course_id = required_str(req, "courseId")?;
    Ok(json!({ "course": courses::get(conn, &course_id)? }))
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let draft: CourseDraft = parse_params(req, None)?;
    let settings = PortalSettings::load(conn)?;
    let course = courses::insert(conn, &draft, settings.default_credits)?;
    log_activity(
        conn,
        "create",
        "course",
        Some(&course.id),
        Some(json!({ "code": course.code })),
    );
    Ok(json!({ "course": course }))
}

fn handle_courses_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let course_id = required_str(req, "courseId")?;
    let patch: CoursePatch = parse_params(req, Some("patch"))?;
    let course = courses::update(conn, &course_id, &patch)?;
    log_activity(
        conn,
        "update",
        "course",
        Some(&course.id),
        req.params.get("patch").cloned(),
    );
    Ok(json!({ "course": course }))
}

fn handle_courses_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let course_id = required_str(req, "courseId")?;
    let summary = courses::delete(conn, &course_id)?;
    log_activity(conn, "delete", "course", Some(&course_id), Some(json!(summary)));
    Ok(json!({ "deleted": summary }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "courses.list" => handle_courses_list(state, req),
        "courses.get" => handle_courses_get(state, req),
        "courses.create" => handle_courses_create(state, req),
        "courses.update" => handle_courses_update(state, req),
        "courses.delete" => handle_courses_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
