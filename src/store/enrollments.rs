use super::{conflict_on_constraint, new_id, non_empty, now_ts, Filter, StoreError, StoreResult};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub student_id: String,
    pub course_id: String,
    pub academic_year: String,
    pub semester: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentDraft {
    pub student_id: String,
    pub course_id: String,
    pub academic_year: String,
    pub semester: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentFilter {
    pub student_id: Option<String>,
    pub course_id: Option<String>,
    pub academic_year: Option<String>,
    pub semester: Option<i64>,
}

const COLUMNS: &str = "id, student_id, course_id, academic_year, semester, created_at";

fn row_to_enrollment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Enrollment> {
    Ok(Enrollment {
        id: row.get(0)?,
        student_id: row.get(1)?,
        course_id: row.get(2)?,
        academic_year: row.get(3)?,
        semester: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub fn insert(conn: &Connection, draft: &EnrollmentDraft) -> StoreResult<Enrollment> {
    let academic_year = non_empty(Some(draft.academic_year.as_str()))
        .ok_or_else(|| StoreError::invalid("academicYear is required"))?;
    if !(1..=3).contains(&draft.semester) {
        return Err(StoreError::invalid("semester must be in 1..=3"));
    }
    super::students::get(conn, &draft.student_id)?;
    super::courses::get(conn, &draft.course_id)?;

    let id = new_id();
    conn.execute(
        "INSERT INTO enrollments(id, student_id, course_id, academic_year, semester, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            draft.student_id,
            draft.course_id,
            academic_year,
            draft.semester,
            now_ts()
        ],
    )
    .map_err(|e| {
        conflict_on_constraint(
            e,
            "student is already enrolled in this course for the term",
            Some(json!({
                "studentId": draft.student_id,
                "courseId": draft.course_id,
                "academicYear": academic_year,
                "semester": draft.semester
            })),
        )
    })?;
    get(conn, &id)
}

pub fn get(conn: &Connection, id: &str) -> StoreResult<Enrollment> {
    let sql = format!("SELECT {} FROM enrollments WHERE id = ?", COLUMNS);
    conn.query_row(&sql, [id], row_to_enrollment)
        .optional()?
        .ok_or(StoreError::NotFound("enrollment"))
}

pub fn list(conn: &Connection, filter: &EnrollmentFilter) -> StoreResult<Vec<Enrollment>> {
    let mut f = Filter::default();
    if let Some(v) = non_empty(filter.student_id.as_deref()) {
        f.eq("student_id", v);
    }
    if let Some(v) = non_empty(filter.course_id.as_deref()) {
        f.eq("course_id", v);
    }
    if let Some(v) = non_empty(filter.academic_year.as_deref()) {
        f.eq("academic_year", v);
    }
    if let Some(v) = filter.semester {
        f.eq("semester", v);
    }
    let sql = format!(
        "SELECT {} FROM enrollments{} ORDER BY academic_year, semester, created_at",
        COLUMNS,
        f.where_sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(f.params(), row_to_enrollment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Marks already entered for the course stay in place.
pub fn delete(conn: &Connection, id: &str) -> StoreResult<()> {
    let n = conn.execute("DELETE FROM enrollments WHERE id = ?", [id])?;
    if n == 0 {
        return Err(StoreError::NotFound("enrollment"));
    }
    Ok(())
}
