use super::{conflict_on_constraint, new_id, non_empty, now_ts, Filter, StoreError, StoreResult};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    Active,
    Inactive,
    Graduated,
}

impl StudentStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "graduated" => Some(Self::Graduated),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Graduated => "graduated",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub reg_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub program: String,
    pub intake_year: i64,
    pub centre: Option<String>,
    pub status: StudentStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl Student {
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDraft {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub program: String,
    pub intake_year: i64,
    #[serde(default)]
    pub centre: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Manually assigned number; generated when absent.
    #[serde(default)]
    pub reg_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub program: Option<String>,
    pub intake_year: Option<i64>,
    pub centre: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFilter {
    pub program: Option<String>,
    pub intake_year: Option<i64>,
    pub centre: Option<String>,
    pub status: Option<String>,
    /// Case-insensitive match on name or registration number.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDeleteSummary {
    pub marks_deleted: usize,
    pub enrollments_deleted: usize,
}

pub const MIN_INTAKE_YEAR: i64 = 1950;
pub const MAX_INTAKE_YEAR: i64 = 2100;

const COLUMNS: &str = "id, reg_number, first_name, last_name, email, phone, program, intake_year, centre, status, created_at, updated_at";

fn row_to_student(row: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    let status: String = row.get(9)?;
    Ok(Student {
        id: row.get(0)?,
        reg_number: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        program: row.get(6)?,
        intake_year: row.get(7)?,
        centre: row.get(8)?,
        status: StudentStatus::parse(&status).unwrap_or(StudentStatus::Active),
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn required(value: &str, field: &str) -> StoreResult<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(StoreError::invalid(format!("{} is required", field)));
    }
    Ok(v.to_string())
}

fn check_intake_year(year: i64) -> StoreResult<i64> {
    if !(MIN_INTAKE_YEAR..=MAX_INTAKE_YEAR).contains(&year) {
        return Err(StoreError::invalid(format!(
            "intakeYear must be in {}..={}",
            MIN_INTAKE_YEAR, MAX_INTAKE_YEAR
        )));
    }
    Ok(year)
}

fn check_email(email: Option<&str>) -> StoreResult<Option<String>> {
    let email = non_empty(email);
    if let Some(e) = email.as_deref() {
        if !e.contains('@') {
            return Err(StoreError::invalid("email must contain @"));
        }
    }
    Ok(email)
}

fn check_status(status: Option<&str>) -> StoreResult<StudentStatus> {
    match non_empty(status) {
        None => Ok(StudentStatus::Active),
        Some(s) => StudentStatus::parse(&s).ok_or_else(|| {
            StoreError::invalid("status must be one of: active, inactive, graduated")
        }),
    }
}

fn reg_conflict(reg_number: &str) -> impl FnOnce(rusqlite::Error) -> StoreError + '_ {
    move |e| {
        conflict_on_constraint(
            e,
            "registration number already exists",
            Some(json!({ "regNumber": reg_number })),
        )
    }
}

/// Checks the draft without touching storage.
pub fn validate(draft: &StudentDraft) -> StoreResult<()> {
    required(&draft.first_name, "firstName")?;
    required(&draft.last_name, "lastName")?;
    required(&draft.program, "program")?;
    check_intake_year(draft.intake_year)?;
    check_email(draft.email.as_deref())?;
    check_status(draft.status.as_deref())?;
    Ok(())
}

pub fn insert(conn: &Connection, draft: &StudentDraft, reg_number: &str) -> StoreResult<Student> {
    validate(draft)?;
    let reg_number = required(reg_number, "regNumber")?;
    let id = new_id();
    let now = now_ts();
    conn.execute(
        "INSERT INTO students(id, reg_number, first_name, last_name, email, phone, program, intake_year, centre, status, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            reg_number,
            draft.first_name.trim(),
            draft.last_name.trim(),
            check_email(draft.email.as_deref())?,
            non_empty(draft.phone.as_deref()),
            draft.program.trim().to_ascii_lowercase(),
            draft.intake_year,
            non_empty(draft.centre.as_deref()),
            check_status(draft.status.as_deref())?.as_str(),
            now,
            now,
        ],
    )
    .map_err(reg_conflict(&reg_number))?;
    get(conn, &id)
}

pub fn find(conn: &Connection, id: &str) -> StoreResult<Option<Student>> {
    let sql = format!("SELECT {} FROM students WHERE id = ?", COLUMNS);
    Ok(conn.query_row(&sql, [id], row_to_student).optional()?)
}

pub fn get(conn: &Connection, id: &str) -> StoreResult<Student> {
    find(conn, id)?.ok_or(StoreError::NotFound("student"))
}

pub fn list(conn: &Connection, filter: &StudentFilter) -> StoreResult<Vec<Student>> {
    let mut f = Filter::default();
    if let Some(p) = non_empty(filter.program.as_deref()) {
        f.eq("program", p.to_ascii_lowercase());
    }
    if let Some(y) = filter.intake_year {
        f.eq("intake_year", y);
    }
    if let Some(c) = non_empty(filter.centre.as_deref()) {
        f.eq("centre", c);
    }
    if let Some(s) = non_empty(filter.status.as_deref()) {
        let status = StudentStatus::parse(&s).ok_or_else(|| {
            StoreError::invalid("status must be one of: active, inactive, graduated")
        })?;
        f.eq("status", status.as_str().to_string());
    }
    if let Some(q) = non_empty(filter.search.as_deref()) {
        let like = format!("%{}%", q.to_lowercase());
        f.raw(
            "(lower(first_name) LIKE ? OR lower(last_name) LIKE ? OR lower(reg_number) LIKE ?)",
            vec![like.clone().into(), like.clone().into(), like.into()],
        );
    }
    let sql = format!(
        "SELECT {} FROM students{} ORDER BY last_name, first_name, reg_number",
        COLUMNS,
        f.where_sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(f.params(), row_to_student)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Applies the patch. The registration number is not patchable.
pub fn update(conn: &Connection, id: &str, patch: &StudentPatch) -> StoreResult<Student> {
    let mut s = get(conn, id)?;
    if let Some(v) = patch.first_name.as_deref() {
        s.first_name = required(v, "firstName")?;
    }
    if let Some(v) = patch.last_name.as_deref() {
        s.last_name = required(v, "lastName")?;
    }
    if patch.email.is_some() {
        s.email = check_email(patch.email.as_deref())?;
    }
    if patch.phone.is_some() {
        s.phone = non_empty(patch.phone.as_deref());
    }
    if let Some(v) = patch.program.as_deref() {
        s.program = required(v, "program")?.to_ascii_lowercase();
    }
    if let Some(y) = patch.intake_year {
        s.intake_year = check_intake_year(y)?;
    }
    if patch.centre.is_some() {
        s.centre = non_empty(patch.centre.as_deref());
    }
    if patch.status.is_some() {
        s.status = check_status(patch.status.as_deref())?;
    }
    conn.execute(
        "UPDATE students
         SET first_name = ?, last_name = ?, email = ?, phone = ?, program = ?, intake_year = ?, centre = ?, status = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            s.first_name,
            s.last_name,
            s.email,
            s.phone,
            s.program,
            s.intake_year,
            s.centre,
            s.status.as_str(),
            now_ts(),
            id,
        ],
    )?;
    get(conn, id)
}

/// Replaces the registration number unconditionally; immutability is the
/// caller's policy.
pub fn set_reg_number(conn: &Connection, id: &str, reg_number: &str) -> StoreResult<Student> {
    let reg_number = required(reg_number, "regNumber")?;
    let changed = conn
        .execute(
            "UPDATE students SET reg_number = ?, updated_at = ? WHERE id = ?",
            (&reg_number, now_ts(), id),
        )
        .map_err(reg_conflict(&reg_number))?;
    if changed == 0 {
        return Err(StoreError::NotFound("student"));
    }
    get(conn, id)
}

/// Deletes marks, then enrollments, then the student, in one transaction.
pub fn delete(conn: &Connection, id: &str) -> StoreResult<StudentDeleteSummary> {
    get(conn, id)?;
    let tx = conn.unchecked_transaction()?;
    let marks_deleted = tx.execute("DELETE FROM marks WHERE student_id = ?", [id])?;
    let enrollments_deleted = tx.execute("DELETE FROM enrollments WHERE student_id = ?", [id])?;
    tx.execute("DELETE FROM students WHERE id = ?", [id])?;
    tx.commit()?;
    Ok(StudentDeleteSummary {
        marks_deleted,
        enrollments_deleted,
    })
}

/// Every registration number starting with `prefix`, across all programs.
pub fn reg_numbers_with_prefix(conn: &Connection, prefix: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT reg_number FROM students WHERE substr(reg_number, 1, length(?1)) = ?1",
    )?;
    let rows = stmt
        .query_map([prefix], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn cohort_size(conn: &Connection, program: &str, intake_year: i64) -> StoreResult<usize> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM students WHERE program = ? AND intake_year = ?",
        (program.trim().to_ascii_lowercase(), intake_year),
        |r| r.get(0),
    )?;
    Ok(n.max(0) as usize)
}
