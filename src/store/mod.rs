//! Record storage for the portal entities.
//!
//! Each submodule owns one table: list (equality filters), get-by-id, insert,
//! update and delete. Inserts and updates hand back the persisted row, ids and
//! timestamps included. Nothing cascades; callers delete dependents first.

pub mod activity;
pub mod courses;
pub mod enrollments;
pub mod marks;
pub mod programs;
pub mod settings;
pub mod students;

use chrono::{SecondsFormat, Utc};
use rusqlite::ErrorCode;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Bad or missing input; raised before any SQL runs.
    #[error("{0}")]
    Validation(String),

    /// Uniqueness violation (duplicate course code, registration number, ...).
    #[error("{message}")]
    Conflict {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn invalid(message: impl Into<String>) -> Self {
        StoreError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>, details: Option<serde_json::Value>) -> Self {
        StoreError::Conflict {
            message: message.into(),
            details,
        }
    }
}

/// Turns a constraint violation into a conflict carrying `message`; anything
/// else stays a database error.
pub(crate) fn conflict_on_constraint(
    e: rusqlite::Error,
    message: &str,
    details: Option<serde_json::Value>,
) -> StoreError {
    if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
        return StoreError::conflict(message, details);
    }
    StoreError::Db(e)
}

pub(crate) fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Trimmed, `None` when blank.
pub(crate) fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Builds `WHERE a = ? AND b = ?` from optional equality predicates.
#[derive(Default)]
pub(crate) struct Filter {
    clauses: Vec<String>,
    params: Vec<rusqlite::types::Value>,
}

impl Filter {
    pub fn eq(&mut self, column: &str, value: impl Into<rusqlite::types::Value>) {
        self.clauses.push(format!("{} = ?", column));
        self.params.push(value.into());
    }

    pub fn raw(&mut self, clause: &str, values: Vec<rusqlite::types::Value>) {
        self.clauses.push(clause.to_string());
        self.params.extend(values);
    }

    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> rusqlite::ParamsFromIter<std::slice::Iter<'_, rusqlite::types::Value>> {
        rusqlite::params_from_iter(self.params.iter())
    }
}

#[cfg(test)]
pub(crate) fn test_conn() -> rusqlite::Connection {
    let conn = rusqlite::Connection::open_in_memory().expect("open in-memory db");
    crate::db::apply_schema(&conn).expect("apply schema");
    conn
}
