use std::path::PathBuf;

use crate::entry::MarkEntry;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub mark_entry: MarkEntry,
}

impl AppState {
    pub fn new(mark_entry: MarkEntry) -> Self {
        Self {
            workspace: None,
            db: None,
            mark_entry,
        }
    }
}
