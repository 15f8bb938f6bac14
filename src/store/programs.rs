use super::{non_empty, StoreError, StoreResult};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub id: String,
    pub name: String,
    pub code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramDraft {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
}

fn row_to_program(row: &rusqlite::Row<'_>) -> rusqlite::Result<Program> {
    Ok(Program {
        id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
    })
}

pub fn list(conn: &Connection) -> StoreResult<Vec<Program>> {
    let mut stmt = conn.prepare("SELECT id, name, code FROM programs ORDER BY id")?;
    let rows = stmt
        .query_map([], row_to_program)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn find(conn: &Connection, id: &str) -> StoreResult<Option<Program>> {
    Ok(conn
        .query_row(
            "SELECT id, name, code FROM programs WHERE id = ?",
            [id],
            row_to_program,
        )
        .optional()?)
}

/// Explicit registration code of a program, if one is configured.
pub fn explicit_code(conn: &Connection, id: &str) -> StoreResult<Option<String>> {
    Ok(find(conn, id)?.and_then(|p| p.code))
}

pub fn upsert(conn: &Connection, draft: &ProgramDraft) -> StoreResult<Program> {
    let id = draft.id.trim().to_ascii_lowercase();
    if id.is_empty() {
        return Err(StoreError::invalid("program id must not be empty"));
    }
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(StoreError::invalid("program name must not be empty"));
    }
    let code = non_empty(draft.code.as_deref()).map(|c| c.to_ascii_uppercase());
    if let Some(c) = code.as_deref() {
        if c.len() < 3 || !c.chars().all(|ch| ch.is_ascii_alphabetic()) {
            return Err(StoreError::invalid(
                "program code must be at least 3 letters",
            ));
        }
    }
    conn.execute(
        "INSERT INTO programs(id, name, code) VALUES(?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, code = excluded.code",
        (&id, name, &code),
    )?;
    find(conn, &id)?.ok_or(StoreError::NotFound("program"))
}
