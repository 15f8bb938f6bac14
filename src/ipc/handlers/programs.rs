use crate::ipc::helpers::{db_conn, log_activity, parse_params, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::programs::{self, ProgramDraft};
use serde_json::{json, Value};

fn handle_programs_list(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "programs": [] }));
    };
    Ok(json!({ "programs": programs::list(conn)? }))
}

fn handle_programs_upsert(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let draft: ProgramDraft = parse_params(req, None)?;
    let program = programs::upsert(conn, &draft)?;
    log_activity(
        conn,
        "upsert",
        "program",
        Some(&program.id),
        Some(json!({ "name": program.name, "code": program.code })),
    );
    Ok(json!({ "program": program }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "programs.list" => handle_programs_list(state, req),
        "programs.upsert" => handle_programs_upsert(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
