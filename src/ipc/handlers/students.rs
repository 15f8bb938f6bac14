use crate::ipc::helpers::{db_conn, log_activity, parse_params, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::registration;
use crate::rules;
use crate::setup::PortalSettings;
use crate::store::students::{self, StudentDraft, StudentFilter, StudentPatch};
use crate::store::StoreError;
use serde_json::{json, Value};
use tracing::{info, warn};

fn handle_students_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "students": [] }));
    };
    let filter: StudentFilter = parse_params(req, None)?;
    Ok(json!({ "students": students::list(conn, &filter)? }))
}

fn handle_students_get(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    Ok(json!({ "student": students::get(conn, &student_id)? }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let draft: StudentDraft = parse_params(req, None)?;
    students::validate(&draft)?;

    let manual = draft
        .reg_number
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);
    let settings = PortalSettings::load(conn)?;
    let (reg_number, provisional) = match manual {
        Some(r) => {
            let provisional = rules::is_provisional(&r);
            (r, provisional)
        }
        None => {
            let issued =
                registration::issue(conn, settings.scheme, &draft.program, draft.intake_year);
            (issued.reg_number, issued.provisional)
        }
    };

    let student = students::insert(conn, &draft, &reg_number)?;
    if provisional {
        warn!(
            student_id = %student.id,
            reg_number = %student.reg_number,
            "student registered with a provisional number; needs manual correction"
        );
    } else {
        info!(student_id = %student.id, reg_number = %student.reg_number, "student registered");
    }
    log_activity(
        conn,
        "create",
        "student",
        Some(&student.id),
        Some(json!({ "regNumber": student.reg_number, "provisional": provisional })),
    );
    Ok(json!({
        "student": student,
        "regNumberProvisional": provisional,
        "scheme": settings.scheme.as_str(),
    }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    if req
        .params
        .get("patch")
        .and_then(|p| p.get("regNumber"))
        .is_some()
    {
        return Err(HandlerErr::bad_params(
            "regNumber cannot be patched; use students.assignRegNumber",
        ));
    }
    let patch: StudentPatch = parse_params(req, Some("patch"))?;
    let student = students::update(conn, &student_id, &patch)?;
    log_activity(
        conn,
        "update",
        "student",
        Some(&student.id),
        req.params.get("patch").cloned(),
    );
    Ok(json!({ "student": student }))
}

/// Replaces a provisional registration number. Permanent numbers never change.
fn handle_students_assign_reg_number(
    state: &mut AppState,
    req: &Request,
) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    let reg_number = required_str(req, "regNumber")?;
    let current = students::get(conn, &student_id)?;
    if !rules::is_provisional(&current.reg_number) {
        return Err(StoreError::conflict(
            "registration number is permanent",
            Some(json!({ "regNumber": current.reg_number })),
        )
        .into());
    }
    let student = students::set_reg_number(conn, &student_id, &reg_number)?;
    log_activity(
        conn,
        "assign_reg_number",
        "student",
        Some(&student.id),
        Some(json!({ "from": current.reg_number, "to": student.reg_number })),
    );
    Ok(json!({ "student": student }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    let summary = students::delete(conn, &student_id)?;
    log_activity(
        conn,
        "delete",
        "student",
        Some(&student_id),
        Some(json!(summary)),
    );
    Ok(json!({ "deleted": summary }))
}

fn handle_students_preview_reg_number(
    state: &mut AppState,
    req: &Request,
) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let program = required_str(req, "program")?;
    let intake_year = req
        .params
        .get("intakeYear")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params("missing intakeYear"))?;
    let settings = PortalSettings::load(conn)?;
    let issued = registration::issue(conn, settings.scheme, &program, intake_year);
    Ok(json!({
        "regNumber": issued.reg_number,
        "provisional": issued.provisional,
        "scheme": settings.scheme.as_str(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "students.list" => handle_students_list(state, req),
        "students.get" => handle_students_get(state, req),
        "students.create" => handle_students_create(state, req),
        "students.update" => handle_students_update(state, req),
        "students.assignRegNumber" => handle_students_assign_reg_number(state, req),
        "students.delete" => handle_students_delete(state, req),
        "students.previewRegNumber" => handle_students_preview_reg_number(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
