use crate::ipc::helpers::{respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::activity::{self, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use serde_json::{json, Value};

fn handle_activity_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "entries": [] }));
    };
    let limit = match req.params.get("limit") {
        None | Some(Value::Null) => DEFAULT_LIST_LIMIT,
        Some(v) => v
            .as_i64()
            .filter(|n| *n > 0)
            .ok_or_else(|| HandlerErr::bad_params("limit must be a positive integer"))?
            .min(MAX_LIST_LIMIT),
    };
    Ok(json!({ "entries": activity::recent(conn, limit)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "activity.list" => handle_activity_list(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
