use super::{new_id, now_ts, StoreResult};
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub action: String,
    pub entity: String,
    pub entity_id: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: String,
}

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 500;

pub fn append(
    conn: &Connection,
    action: &str,
    entity: &str,
    entity_id: Option<&str>,
    details: Option<&serde_json::Value>,
) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO activity_log(id, action, entity, entity_id, details, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            new_id(),
            action,
            entity,
            entity_id,
            details.map(|d| d.to_string()),
            now_ts(),
        ),
    )?;
    Ok(())
}

/// Newest first.
pub fn recent(conn: &Connection, limit: i64) -> StoreResult<Vec<ActivityEntry>> {
    let limit = limit.clamp(1, MAX_LIST_LIMIT);
    let mut stmt = conn.prepare(
        "SELECT id, action, entity, entity_id, details, created_at
         FROM activity_log
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?",
    )?;
    let rows = stmt
        .query_map([limit], |row| {
            let details: Option<String> = row.get(4)?;
            Ok(ActivityEntry {
                id: row.get(0)?,
                action: row.get(1)?,
                entity: row.get(2)?,
                entity_id: row.get(3)?,
                details: details.and_then(|d| serde_json::from_str(&d).ok()),
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_conn;
    use serde_json::json;

    #[test]
    fn recent_is_newest_first_and_limited() {
        let conn = test_conn();
        for i in 0..5 {
            append(&conn, "create", "course", Some(&format!("c{}", i)), Some(&json!({ "n": i })))
                .expect("append");
        }
        let rows = recent(&conn, 2).expect("recent");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].entity_id.as_deref(), Some("c4"));
        assert_eq!(rows[0].details, Some(json!({ "n": 4 })));
    }
}
