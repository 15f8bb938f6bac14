use super::{conflict_on_constraint, new_id, non_empty, now_ts, Filter, StoreError, StoreResult};
use crate::rules::{self, Grade};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentType {
    Exam,
    Test,
    Assignment,
    Cat,
    Practical,
}

impl AssessmentType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exam" => Some(Self::Exam),
            "test" => Some(Self::Test),
            "assignment" => Some(Self::Assignment),
            "cat" => Some(Self::Cat),
            "practical" => Some(Self::Practical),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exam => "exam",
            Self::Test => "test",
            Self::Assignment => "assignment",
            Self::Cat => "cat",
            Self::Practical => "practical",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mark {
    pub id: String,
    pub student_id: String,
    pub course_id: String,
    pub assessment_name: String,
    pub assessment_type: AssessmentType,
    pub assessment_date: Option<String>,
    pub score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub grade: Grade,
    pub grade_points: f64,
    pub remarks: Option<String>,
    pub visible_to_student: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for a mark. Derived columns are never taken from the caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkDraft {
    pub student_id: String,
    pub course_id: String,
    pub assessment_name: String,
    #[serde(default)]
    pub assessment_type: Option<String>,
    #[serde(default)]
    pub assessment_date: Option<String>,
    pub score: f64,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub visible_to_student: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkPatch {
    pub score: Option<f64>,
    pub max_score: Option<f64>,
    pub assessment_type: Option<String>,
    pub assessment_date: Option<String>,
    pub remarks: Option<String>,
    pub visible_to_student: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkFilter {
    pub student_id: Option<String>,
    pub course_id: Option<String>,
    pub assessment_name: Option<String>,
    #[serde(default)]
    pub visible_only: bool,
}

/// Draft defaults the caller resolves from settings.
#[derive(Debug, Clone, Copy)]
pub struct MarkDefaults {
    pub max_score: f64,
    pub visible_to_student: bool,
}

impl Default for MarkDefaults {
    fn default() -> Self {
        Self {
            max_score: 100.0,
            visible_to_student: false,
        }
    }
}

/// A draft after validation, with derived columns filled in.
#[derive(Debug, Clone)]
pub struct ValidMark {
    pub student_id: String,
    pub course_id: String,
    pub assessment_name: String,
    pub assessment_type: AssessmentType,
    pub assessment_date: Option<String>,
    pub score: f64,
    pub max_score: f64,
    pub derived: rules::DerivedMark,
    pub remarks: Option<String>,
    pub visible_to_student: bool,
}

const COLUMNS: &str = "id, student_id, course_id, assessment_name, assessment_type, assessment_date, score, max_score, percentage, grade, grade_points, remarks, visible_to_student, created_at, updated_at";

fn row_to_mark(row: &rusqlite::Row<'_>) -> rusqlite::Result<Mark> {
    let assessment_type: String = row.get(4)?;
    let percentage: f64 = row.get(8)?;
    let grade: String = row.get(9)?;
    let visible: i64 = row.get(12)?;
    Ok(Mark {
        id: row.get(0)?,
        student_id: row.get(1)?,
        course_id: row.get(2)?,
        assessment_name: row.get(3)?,
        assessment_type: AssessmentType::parse(&assessment_type).unwrap_or(AssessmentType::Exam),
        assessment_date: row.get(5)?,
        score: row.get(6)?,
        max_score: row.get(7)?,
        percentage,
        grade: Grade::parse(&grade).unwrap_or_else(|| rules::classify(percentage).grade),
        grade_points: row.get(10)?,
        remarks: row.get(11)?,
        visible_to_student: visible != 0,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn check_scores(score: f64, max_score: f64) -> StoreResult<rules::DerivedMark> {
    if !score.is_finite() || score < 0.0 {
        return Err(StoreError::invalid("score must be a number >= 0"));
    }
    if !max_score.is_finite() || max_score <= 0.0 {
        return Err(StoreError::invalid("maxScore must be a number > 0"));
    }
    // Over-max scores never reach storage, so a stored percentage above 100
    // can only come from rounding; `classify` caps that case.
    if score > max_score {
        return Err(StoreError::invalid("score must not exceed maxScore"));
    }
    rules::derive_mark(score, max_score)
        .ok_or_else(|| StoreError::invalid("could not compute percentage"))
}

fn check_type(t: Option<&str>) -> StoreResult<AssessmentType> {
    match non_empty(t) {
        None => Ok(AssessmentType::Exam),
        Some(s) => AssessmentType::parse(&s).ok_or_else(|| {
            StoreError::invalid(
                "assessmentType must be one of: exam, test, assignment, cat, practical",
            )
        }),
    }
}

pub fn validate(draft: &MarkDraft, defaults: MarkDefaults) -> StoreResult<ValidMark> {
    let student_id = non_empty(Some(draft.student_id.as_str()))
        .ok_or_else(|| StoreError::invalid("studentId is required"))?;
    let course_id = non_empty(Some(draft.course_id.as_str()))
        .ok_or_else(|| StoreError::invalid("courseId is required"))?;
    let assessment_name = non_empty(Some(draft.assessment_name.as_str()))
        .ok_or_else(|| StoreError::invalid("assessmentName is required"))?;
    let max_score = draft.max_score.unwrap_or(defaults.max_score);
    let derived = check_scores(draft.score, max_score)?;
    Ok(ValidMark {
        student_id,
        course_id,
        assessment_name,
        assessment_type: check_type(draft.assessment_type.as_deref())?,
        assessment_date: non_empty(draft.assessment_date.as_deref()),
        score: draft.score,
        max_score,
        derived,
        remarks: non_empty(draft.remarks.as_deref()),
        visible_to_student: draft
            .visible_to_student
            .unwrap_or(defaults.visible_to_student),
    })
}

fn triple_details(m: &ValidMark) -> serde_json::Value {
    json!({
        "studentId": m.student_id,
        "courseId": m.course_id,
        "assessmentName": m.assessment_name
    })
}

pub fn find(conn: &Connection, id: &str) -> StoreResult<Option<Mark>> {
    let sql = format!("SELECT {} FROM marks WHERE id = ?", COLUMNS);
    Ok(conn.query_row(&sql, [id], row_to_mark).optional()?)
}

pub fn get(conn: &Connection, id: &str) -> StoreResult<Mark> {
    find(conn, id)?.ok_or(StoreError::NotFound("mark"))
}

/// Existing mark for the (student, course, assessment) triple.
pub fn find_by_triple(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
    assessment_name: &str,
) -> StoreResult<Option<Mark>> {
    let sql = format!(
        "SELECT {} FROM marks WHERE student_id = ? AND course_id = ? AND assessment_name = ?",
        COLUMNS
    );
    Ok(conn
        .query_row(&sql, (student_id, course_id, assessment_name), row_to_mark)
        .optional()?)
}

pub fn insert(conn: &Connection, m: &ValidMark) -> StoreResult<Mark> {
    let id = new_id();
    let now = now_ts();
    conn.execute(
        "INSERT INTO marks(id, student_id, course_id, assessment_name, assessment_type, assessment_date, score, max_score, percentage, grade, grade_points, remarks, visible_to_student, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            m.student_id,
            m.course_id,
            m.assessment_name,
            m.assessment_type.as_str(),
            m.assessment_date,
            m.score,
            m.max_score,
            m.derived.percentage,
            m.derived.grade.as_str(),
            m.derived.grade_points,
            m.remarks,
            m.visible_to_student,
            now,
            now,
        ],
    )
    .map_err(|e| {
        conflict_on_constraint(
            e,
            "a mark already exists for this assessment",
            Some(triple_details(m)),
        )
    })?;
    get(conn, &id)
}

/// Replaces the graded content of `id` with `m`. Identity, the triple and
/// `created_at` stay as they were; only `updated_at` moves.
pub fn overwrite(conn: &Connection, id: &str, m: &ValidMark) -> StoreResult<Mark> {
    let n = conn.execute(
        "UPDATE marks
         SET assessment_type = ?, assessment_date = ?, score = ?, max_score = ?, percentage = ?, grade = ?, grade_points = ?, remarks = ?, visible_to_student = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            m.assessment_type.as_str(),
            m.assessment_date,
            m.score,
            m.max_score,
            m.derived.percentage,
            m.derived.grade.as_str(),
            m.derived.grade_points,
            m.remarks,
            m.visible_to_student,
            now_ts(),
            id,
        ],
    )?;
    if n == 0 {
        return Err(StoreError::NotFound("mark"));
    }
    get(conn, id)
}

/// Field-level edit of one mark; derived columns are recomputed.
pub fn update(conn: &Connection, id: &str, patch: &MarkPatch) -> StoreResult<Mark> {
    let current = get(conn, id)?;
    let score = patch.score.unwrap_or(current.score);
    let max_score = patch.max_score.unwrap_or(current.max_score);
    let derived = check_scores(score, max_score)?;
    let assessment_type = if patch.assessment_type.is_some() {
        check_type(patch.assessment_type.as_deref())?
    } else {
        current.assessment_type
    };
    let next = ValidMark {
        student_id: current.student_id,
        course_id: current.course_id,
        assessment_name: current.assessment_name,
        assessment_type,
        assessment_date: if patch.assessment_date.is_some() {
            non_empty(patch.assessment_date.as_deref())
        } else {
            current.assessment_date
        },
        score,
        max_score,
        derived,
        remarks: if patch.remarks.is_some() {
            non_empty(patch.remarks.as_deref())
        } else {
            current.remarks
        },
        visible_to_student: patch
            .visible_to_student
            .unwrap_or(current.visible_to_student),
    };
    overwrite(conn, id, &next)
}

pub fn delete(conn: &Connection, id: &str) -> StoreResult<()> {
    let n = conn.execute("DELETE FROM marks WHERE id = ?", [id])?;
    if n == 0 {
        return Err(StoreError::NotFound("mark"));
    }
    Ok(())
}

pub fn list(conn: &Connection, filter: &MarkFilter) -> StoreResult<Vec<Mark>> {
    let mut f = Filter::default();
    if let Some(v) = non_empty(filter.student_id.as_deref()) {
        f.eq("student_id", v);
    }
    if let Some(v) = non_empty(filter.course_id.as_deref()) {
        f.eq("course_id", v);
    }
    if let Some(v) = non_empty(filter.assessment_name.as_deref()) {
        f.eq("assessment_name", v);
    }
    if filter.visible_only {
        f.eq("visible_to_student", 1_i64);
    }
    let sql = format!(
        "SELECT {} FROM marks{} ORDER BY course_id, assessment_name, created_at",
        COLUMNS,
        f.where_sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(f.params(), row_to_mark)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Publishes or hides every mark of a course, or of one assessment in it.
pub fn set_visibility(
    conn: &Connection,
    course_id: &str,
    assessment_name: Option<&str>,
    visible: bool,
) -> StoreResult<usize> {
    super::courses::get(conn, course_id)?;
    let now = now_ts();
    let n = match non_empty(assessment_name) {
        Some(name) => conn.execute(
            "UPDATE marks SET visible_to_student = ?, updated_at = ?
             WHERE course_id = ? AND assessment_name = ? AND visible_to_student != ?",
            rusqlite::params![visible, now, course_id, name, visible],
        )?,
        None => conn.execute(
            "UPDATE marks SET visible_to_student = ?, updated_at = ?
             WHERE course_id = ? AND visible_to_student != ?",
            rusqlite::params![visible, now, course_id, visible],
        )?,
    };
    Ok(n)
}
