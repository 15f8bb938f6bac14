use crate::ipc::helpers::{db_conn, log_activity, optional_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::setup::{self, SetupSection};
use serde_json::{json, Map, Value};

fn parse_section(raw: &str) -> Result<SetupSection, HandlerErr> {
    SetupSection::parse(raw).ok_or_else(|| {
        HandlerErr::bad_params("unknown section").with_details(json!({ "section": raw }))
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    if let Some(raw) = optional_str(req, "section") {
        let section = parse_section(&raw)?;
        return Ok(json!({ section.name(): setup::load_section(conn, section)? }));
    }
    let mut out = Map::new();
    for section in SetupSection::ALL {
        out.insert(
            section.name().to_string(),
            setup::load_section(conn, section)?,
        );
    }
    Ok(Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let raw = req
        .params
        .get("section")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing section"))?;
    let section = parse_section(raw)?;
    let patch = req
        .params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))?;

    let mut current = setup::load_section(conn, section)?;
    setup::merge_section_patch(section, &mut current, patch).map_err(HandlerErr::bad_params)?;
    setup::save_section(conn, section, &current)?;
    log_activity(
        conn,
        "update",
        "settings",
        Some(section.name()),
        Some(Value::Object(patch.clone())),
    );
    Ok(json!({ section.name(): current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "setup.get" => handle_setup_get(state, req),
        "setup.update" => handle_setup_update(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
