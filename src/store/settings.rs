use super::StoreResult;
use rusqlite::{Connection, OptionalExtension};

pub fn get_json(conn: &Connection, key: &str) -> StoreResult<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    // Unparseable historical values read as absent.
    Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
}

pub fn set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}
