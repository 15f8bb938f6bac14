use crate::entry::EntryError;
use crate::ipc::wire::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, StoreError};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{error, warn};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(message) => HandlerErr::bad_params(message),
            StoreError::Conflict { message, details } => HandlerErr {
                code: "conflict",
                message,
                details,
            },
            StoreError::NotFound(what) => HandlerErr::new("not_found", format!("{} not found", what))
                .with_details(json!({ "entity": what })),
            StoreError::Db(e) => {
                error!(error = %e, "database operation failed");
                HandlerErr::new("db_query_failed", e.to_string())
            }
        }
    }
}

impl From<EntryError> for HandlerErr {
    fn from(e: EntryError) -> Self {
        match e {
            EntryError::Busy => HandlerErr::new("busy", e.to_string()),
            EntryError::Duplicate { ref existing } => {
                let details = json!({
                    "existing": {
                        "markId": existing.id,
                        "score": existing.score,
                        "maxScore": existing.max_score,
                        "percentage": existing.percentage,
                        "grade": existing.grade,
                        "remarks": existing.remarks,
                        "visibleToStudent": existing.visible_to_student,
                    }
                });
                HandlerErr::new("duplicate_mark", e.to_string()).with_details(details)
            }
            EntryError::Store(inner) => inner.into(),
        }
    }
}

pub fn respond(req: &Request, result: Result<Value, HandlerErr>) -> Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Deserializes `params` (or `params[key]`) into `T`.
pub fn parse_params<T: DeserializeOwned>(req: &Request, key: Option<&str>) -> Result<T, HandlerErr> {
    let raw = match key {
        Some(k) => req
            .params
            .get(k)
            .cloned()
            .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", k)))?,
        None if req.params.is_null() => json!({}),
        None => req.params.clone(),
    };
    serde_json::from_value(raw).map_err(|e| HandlerErr::bad_params(e.to_string()))
}

/// Best-effort: a failed activity write is logged and otherwise ignored.
pub fn log_activity(
    conn: &Connection,
    action: &str,
    entity: &str,
    entity_id: Option<&str>,
    details: Option<Value>,
) {
    if let Err(e) = store::activity::append(conn, action, entity, entity_id, details.as_ref()) {
        warn!(action, entity, error = %e, "activity log write failed");
    }
}
