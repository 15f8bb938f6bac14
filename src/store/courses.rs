use super::{conflict_on_constraint, new_id, non_empty, now_ts, Filter, StoreError, StoreResult};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    Active,
    Inactive,
}

impl CourseStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub code: String,
    pub name: String,
    pub program: Option<String>,
    pub credits: i64,
    pub status: CourseStatus,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDraft {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub credits: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursePatch {
    pub code: Option<String>,
    pub name: Option<String>,
    pub program: Option<String>,
    pub credits: Option<i64>,
    pub status: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseFilter {
    pub program: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDeleteSummary {
    pub marks_deleted: usize,
    pub enrollments_deleted: usize,
}

pub const MIN_CREDITS: i64 = 1;
pub const MAX_CREDITS: i64 = 10;

const COLUMNS: &str =
    "id, code, name, program, credits, status, description, created_at, updated_at";

fn row_to_course(row: &rusqlite::Row<'_>) -> rusqlite::Result<Course> {
    let status: String = row.get(5)?;
    Ok(Course {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        program: row.get(3)?,
        credits: row.get(4)?,
        status: CourseStatus::parse(&status).unwrap_or(CourseStatus::Active),
        description: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub fn normalize_code(code: &str) -> StoreResult<String> {
    let code = code.trim().to_ascii_uppercase();
    if code.is_empty() {
        return Err(StoreError::invalid("course code is required"));
    }
    Ok(code)
}

fn check_name(name: &str) -> StoreResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::invalid("course name is required"));
    }
    Ok(name.to_string())
}

fn check_credits(credits: i64) -> StoreResult<i64> {
    if !(MIN_CREDITS..=MAX_CREDITS).contains(&credits) {
        return Err(StoreError::invalid(format!(
            "credits must be in {}..={}",
            MIN_CREDITS, MAX_CREDITS
        )));
    }
    Ok(credits)
}

fn check_status(status: Option<&str>) -> StoreResult<CourseStatus> {
    match non_empty(status) {
        None => Ok(CourseStatus::Active),
        Some(s) => CourseStatus::parse(&s)
            .ok_or_else(|| StoreError::invalid("status must be one of: active, inactive")),
    }
}

fn code_conflict(code: &str) -> impl FnOnce(rusqlite::Error) -> StoreError + '_ {
    move |e| conflict_on_constraint(e, "course code already exists", Some(json!({ "code": code })))
}

/// `default_credits` applies when the draft carries none.
pub fn insert(conn: &Connection, draft: &CourseDraft, default_credits: i64) -> StoreResult<Course> {
    let code = normalize_code(&draft.code)?;
    let name = check_name(&draft.name)?;
    let credits = check_credits(draft.credits.unwrap_or(default_credits))?;
    let status = check_status(draft.status.as_deref())?;
    let id = new_id();
    let now = now_ts();
    conn.execute(
        "INSERT INTO courses(id, code, name, program, credits, status, description, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            code,
            name,
            non_empty(draft.program.as_deref()).map(|p| p.to_ascii_lowercase()),
            credits,
            status.as_str(),
            non_empty(draft.description.as_deref()),
            now,
            now,
        ],
    )
    .map_err(code_conflict(&code))?;
    get(conn, &id)
}

pub fn find(conn: &Connection, id: &str) -> StoreResult<Option<Course>> {
    let sql = format!("SELECT {} FROM courses WHERE id = ?", COLUMNS);
    Ok(conn.query_row(&sql, [id], row_to_course).optional()?)
}

pub fn get(conn: &Connection, id: &str) -> StoreResult<Course> {
    find(conn, id)?.ok_or(StoreError::NotFound("course"))
}

pub fn list(conn: &Connection, filter: &CourseFilter) -> StoreResult<Vec<Course>> {
    let mut f = Filter::default();
    if let Some(p) = non_empty(filter.program.as_deref()) {
        f.eq("program", p.to_ascii_lowercase());
    }
    if let Some(s) = non_empty(filter.status.as_deref()) {
        let status = CourseStatus::parse(&s)
            .ok_or_else(|| StoreError::invalid("status must be one of: active, inactive"))?;
        f.eq("status", status.as_str().to_string());
    }
    let sql = format!("SELECT {} FROM courses{} ORDER BY code", COLUMNS, f.where_sql());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(f.params(), row_to_course)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update(conn: &Connection, id: &str, patch: &CoursePatch) -> StoreResult<Course> {
    let mut c = get(conn, id)?;
    if let Some(v) = patch.code.as_deref() {
        c.code = normalize_code(v)?;
    }
    if let Some(v) = patch.name.as_deref() {
        c.name = check_name(v)?;
    }
    if patch.program.is_some() {
        c.program = non_empty(patch.program.as_deref()).map(|p| p.to_ascii_lowercase());
    }
    if let Some(v) = patch.credits {
        c.credits = check_credits(v)?;
    }
    if patch.status.is_some() {
        c.status = check_status(patch.status.as_deref())?;
    }
    if patch.description.is_some() {
        c.description = non_empty(patch.description.as_deref());
    }
    conn.execute(
        "UPDATE courses
         SET code = ?, name = ?, program = ?, credits = ?, status = ?, description = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            c.code,
            c.name,
            c.program,
            c.credits,
            c.status.as_str(),
            c.description,
            now_ts(),
            id,
        ],
    )
    .map_err(code_conflict(&c.code))?;
    get(conn, id)
}

/// Deletes marks and enrollments for the course, then the course.
pub fn delete(conn: &Connection, id: &str) -> StoreResult<CourseDeleteSummary> {
    get(conn, id)?;
    let tx = conn.unchecked_transaction()?;
    let marks_deleted = tx.execute("DELETE FROM marks WHERE course_id = ?", [id])?;
    let enrollments_deleted = tx.execute("DELETE FROM enrollments WHERE course_id = ?", [id])?;
    tx.execute("DELETE FROM courses WHERE id = ?", [id])?;
    tx.commit()?;
    Ok(CourseDeleteSummary {
        marks_deleted,
        enrollments_deleted,
    })
}
