use crate::rules::{self, Grade, GpaInput};
use crate::store::activity::{self, ActivityEntry};
use crate::store::courses::{self, Course};
use crate::store::enrollments::{self, EnrollmentFilter};
use crate::store::marks::{self, Mark, MarkFilter};
use crate::store::students::{self, Student};
use crate::store::StoreResult;
use anyhow::Context;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptRow {
    pub course_id: String,
    pub course_code: String,
    pub course_name: String,
    pub credits: i64,
    pub assessment_name: String,
    pub assessment_type: String,
    pub assessment_date: Option<String>,
    pub score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub grade: Grade,
    pub grade_points: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeCounts {
    pub distinction: usize,
    pub credit: usize,
    pub pass: usize,
    pub fail: usize,
}

impl GradeCounts {
    fn tally<'a, I: IntoIterator<Item = &'a Grade>>(grades: I) -> Self {
        let mut c = GradeCounts {
            distinction: 0,
            credit: 0,
            pass: 0,
            fail: 0,
        };
        for g in grades {
            match g {
                Grade::Distinction => c.distinction += 1,
                Grade::Credit => c.credit += 1,
                Grade::Pass => c.pass += 1,
                Grade::Fail => c.fail += 1,
            }
        }
        c
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub student: Student,
    pub rows: Vec<TranscriptRow>,
    pub grade_counts: GradeCounts,
    pub credits_earned: i64,
    pub gpa: f64,
}

/// Rows are re-derived from the stored percentage through the grading table,
/// so a drifted `grade` column cannot leak into the transcript.
pub fn transcript(conn: &Connection, student_id: &str, published_only: bool) -> StoreResult<Transcript> {
    let student = students::get(conn, student_id)?;
    let mut sql = String::from(
        "SELECT m.course_id, COALESCE(c.code, ''), COALESCE(c.name, ''), c.credits,
                m.assessment_name, m.assessment_type, m.assessment_date,
                m.score, m.max_score, m.percentage
         FROM marks m
         LEFT JOIN courses c ON c.id = m.course_id
         WHERE m.student_id = ?",
    );
    if published_only {
        sql.push_str(" AND m.visible_to_student = 1");
    }
    sql.push_str(" ORDER BY c.code, m.assessment_date, m.assessment_name");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([student_id], |r| {
            let credits: Option<i64> = r.get(3)?;
            let percentage: f64 = r.get(9)?;
            let c = rules::classify(percentage);
            Ok(TranscriptRow {
                course_id: r.get(0)?,
                course_code: r.get(1)?,
                course_name: r.get(2)?,
                credits: credits.filter(|v| *v > 0).unwrap_or(rules::DEFAULT_CREDITS),
                assessment_name: r.get(4)?,
                assessment_type: r.get(5)?,
                assessment_date: r.get(6)?,
                score: r.get(7)?,
                max_score: r.get(8)?,
                percentage,
                grade: c.grade,
                grade_points: c.points,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let gpa = rules::gpa(rows.iter().map(|r| GpaInput {
        grade: r.grade,
        grade_points: r.grade_points,
        credits: Some(r.credits),
    }));
    let mut passed: HashSet<&str> = HashSet::new();
    let mut credits_earned = 0;
    for r in rows.iter().filter(|r| r.grade != Grade::Fail) {
        if passed.insert(r.course_id.as_str()) {
            credits_earned += r.credits;
        }
    }
    let grade_counts = GradeCounts::tally(rows.iter().map(|r| &r.grade));

    Ok(Transcript {
        student,
        rows,
        grade_counts,
        credits_earned,
        gpa,
    })
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn transcript_csv(t: &Transcript) -> String {
    let mut csv = String::new();
    csv.push_str(&format!(
        "# {},{},{}\n",
        csv_quote(&t.student.reg_number),
        csv_quote(&t.student.display_name()),
        csv_quote(&t.student.program)
    ));
    csv.push_str("course_code,course_name,credits,assessment,type,date,score,max_score,percentage,grade,grade_points\n");
    for r in &t.rows {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{},{:.2},{},{:.1}\n",
            csv_quote(&r.course_code),
            csv_quote(&r.course_name),
            r.credits,
            csv_quote(&r.assessment_name),
            r.assessment_type,
            csv_quote(r.assessment_date.as_deref().unwrap_or("")),
            r.score,
            r.max_score,
            r.percentage,
            r.grade.as_str(),
            r.grade_points
        ));
    }
    csv.push_str(&format!(
        "# gpa,{:.2}\n# credits_earned,{}\n",
        t.gpa, t.credits_earned
    ));
    csv
}

pub fn write_transcript_csv(t: &Transcript, out_path: &Path) -> anyhow::Result<usize> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    std::fs::write(out_path, transcript_csv(t))
        .with_context(|| format!("failed to write {}", out_path.to_string_lossy()))?;
    Ok(t.rows.len())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradebookStudent {
    pub student_id: String,
    pub reg_number: String,
    pub display_name: String,
    pub academic_year: String,
    pub semester: i64,
    pub marks: Vec<Mark>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gradebook {
    pub course: Course,
    pub assessments: Vec<String>,
    pub students: Vec<GradebookStudent>,
}

/// Enrolled students of a course with their marks in it.
pub fn gradebook(
    conn: &Connection,
    course_id: &str,
    academic_year: Option<&str>,
    semester: Option<i64>,
) -> StoreResult<Gradebook> {
    let course = courses::get(conn, course_id)?;
    let enrolled = enrollments::list(
        conn,
        &EnrollmentFilter {
            course_id: Some(course_id.to_string()),
            academic_year: academic_year.map(str::to_string),
            semester,
            ..Default::default()
        },
    )?;
    let course_marks = marks::list(
        conn,
        &MarkFilter {
            course_id: Some(course_id.to_string()),
            ..Default::default()
        },
    )?;

    let mut assessments: Vec<String> = Vec::new();
    for m in &course_marks {
        if !assessments.contains(&m.assessment_name) {
            assessments.push(m.assessment_name.clone());
        }
    }

    let mut by_student: BTreeMap<&str, Vec<Mark>> = BTreeMap::new();
    for m in &course_marks {
        by_student.entry(m.student_id.as_str()).or_default().push(m.clone());
    }

    let mut rows = Vec::with_capacity(enrolled.len());
    let mut seen: HashSet<String> = HashSet::new();
    for e in &enrolled {
        // A student enrolled in several terms is listed once.
        if !seen.insert(e.student_id.clone()) {
            continue;
        }
        let Some(s) = students::find(conn, &e.student_id)? else {
            continue;
        };
        rows.push(GradebookStudent {
            student_id: s.id.clone(),
            reg_number: s.reg_number.clone(),
            display_name: s.display_name(),
            academic_year: e.academic_year.clone(),
            semester: e.semester,
            marks: by_student.get(s.id.as_str()).cloned().unwrap_or_default(),
        });
    }
    rows.sort_by(|a, b| a.display_name.cmp(&b.display_name));

    Ok(Gradebook {
        course,
        assessments,
        students: rows,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursePerformance {
    pub course: Course,
    pub mark_count: usize,
    pub student_count: usize,
    pub average_percentage: f64,
    pub pass_rate: f64,
    pub distribution: GradeCounts,
}

pub fn course_performance(conn: &Connection, course_id: &str) -> StoreResult<CoursePerformance> {
    let course = courses::get(conn, course_id)?;
    let course_marks = marks::list(
        conn,
        &MarkFilter {
            course_id: Some(course_id.to_string()),
            ..Default::default()
        },
    )?;
    let grades: Vec<Grade> = course_marks
        .iter()
        .map(|m| rules::classify(m.percentage).grade)
        .collect();
    let n = course_marks.len();
    let (average_percentage, pass_rate) = if n == 0 {
        (0.0, 0.0)
    } else {
        let sum: f64 = course_marks.iter().map(|m| m.percentage).sum();
        let passed = grades.iter().filter(|g| **g != Grade::Fail).count();
        (
            rules::round_half_up_2(sum / n as f64),
            rules::round_half_up_2(100.0 * passed as f64 / n as f64),
        )
    };
    let student_count = course_marks
        .iter()
        .map(|m| m.student_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    Ok(CoursePerformance {
        course,
        mark_count: n,
        student_count,
        average_percentage,
        pass_rate,
        distribution: GradeCounts::tally(grades.iter()),
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub students_by_status: BTreeMap<String, i64>,
    pub students_by_program: BTreeMap<String, i64>,
    pub students_by_centre: BTreeMap<String, i64>,
    pub active_courses: i64,
    pub enrollments: i64,
    pub marks: i64,
    pub published_marks: i64,
    pub recent_activity: Vec<ActivityEntry>,
}

fn grouped_counts(conn: &Connection, sql: &str) -> StoreResult<BTreeMap<String, i64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(rows)
}

fn scalar(conn: &Connection, sql: &str) -> StoreResult<i64> {
    Ok(conn.query_row(sql, [], |r| r.get(0))?)
}

pub const DASHBOARD_ACTIVITY: i64 = 10;

pub fn dashboard(conn: &Connection) -> StoreResult<Dashboard> {
    Ok(Dashboard {
        students_by_status: grouped_counts(
            conn,
            "SELECT status, COUNT(*) FROM students GROUP BY status",
        )?,
        students_by_program: grouped_counts(
            conn,
            "SELECT program, COUNT(*) FROM students GROUP BY program",
        )?,
        students_by_centre: grouped_counts(
            conn,
            "SELECT COALESCE(centre, '(none)'), COUNT(*) FROM students GROUP BY COALESCE(centre, '(none)')",
        )?,
        active_courses: scalar(conn, "SELECT COUNT(*) FROM courses WHERE status = 'active'")?,
        enrollments: scalar(conn, "SELECT COUNT(*) FROM enrollments")?,
        marks: scalar(conn, "SELECT COUNT(*) FROM marks")?,
        published_marks: scalar(conn, "SELECT COUNT(*) FROM marks WHERE visible_to_student = 1")?,
        recent_activity: activity::recent(conn, DASHBOARD_ACTIVITY)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::save_mark;
    use crate::store::courses::CourseDraft;
    use crate::store::enrollments::EnrollmentDraft;
    use crate::store::marks::{MarkDefaults, MarkDraft};
    use crate::store::students::StudentDraft;
    use crate::store::test_conn;

    fn student(conn: &Connection, reg: &str) -> Student {
        students::insert(
            conn,
            &StudentDraft {
                first_name: "Ruth".into(),
                last_name: reg.into(),
                program: "hnc".into(),
                intake_year: 2025,
                ..Default::default()
            },
            reg,
        )
        .expect("student")
    }

    fn course(conn: &Connection, code: &str, credits: i64) -> Course {
        courses::insert(
            conn,
            &CourseDraft {
                code: code.into(),
                name: format!("{} course", code),
                credits: Some(credits),
                ..Default::default()
            },
            3,
        )
        .expect("course")
    }

    fn mark(conn: &Connection, s: &str, c: &str, name: &str, score: f64) {
        save_mark(
            conn,
            &MarkDraft {
                student_id: s.into(),
                course_id: c.into(),
                assessment_name: name.into(),
                score,
                ..Default::default()
            },
            MarkDefaults::default(),
            false,
        )
        .expect("mark");
    }

    #[test]
    fn transcript_gpa_is_credit_weighted_over_passing_marks() {
        let conn = test_conn();
        let s = student(&conn, "HNC-2025-001");
        let a = course(&conn, "OT101", 3);
        let b = course(&conn, "NT101", 3);
        let f = course(&conn, "CH101", 4);
        mark(&conn, &s.id, &a.id, "Final Exam", 90.0);
        mark(&conn, &s.id, &b.id, "Final Exam", 55.0);
        mark(&conn, &s.id, &f.id, "Final Exam", 20.0);

        let t = transcript(&conn, &s.id, false).expect("transcript");
        assert_eq!(t.rows.len(), 3);
        assert_eq!(t.gpa, 3.0);
        assert_eq!(t.credits_earned, 6);
        assert_eq!(t.grade_counts.fail, 1);
        assert_eq!(t.grade_counts.distinction, 1);

        let csv = transcript_csv(&t);
        assert!(csv.contains("OT101,OT101 course,3,Final Exam,exam,,90,100,90.00,DISTINCTION,4.0"));
        assert!(csv.contains("# gpa,3.00"));
    }

    #[test]
    fn only_failed_marks_give_zero_gpa() {
        let conn = test_conn();
        let s = student(&conn, "HNC-2025-001");
        let c = course(&conn, "OT101", 3);
        assert_eq!(transcript(&conn, &s.id, false).expect("empty").gpa, 0.0);
        mark(&conn, &s.id, &c.id, "Final Exam", 10.0);
        assert_eq!(transcript(&conn, &s.id, false).expect("failed").gpa, 0.0);
    }

    #[test]
    fn published_only_hides_drafts() {
        let conn = test_conn();
        let s = student(&conn, "HNC-2025-001");
        let c = course(&conn, "OT101", 3);
        mark(&conn, &s.id, &c.id, "CAT 1", 75.0);
        assert_eq!(transcript(&conn, &s.id, true).expect("t").rows.len(), 0);
        marks::set_visibility(&conn, &c.id, None, true).expect("publish");
        assert_eq!(transcript(&conn, &s.id, true).expect("t").rows.len(), 1);
    }

    #[test]
    fn gradebook_and_performance() {
        let conn = test_conn();
        let s1 = student(&conn, "HNC-2025-001");
        let s2 = student(&conn, "HNC-2025-002");
        let c = course(&conn, "OT101", 3);
        for s in [&s1, &s2] {
            enrollments::insert(
                &conn,
                &EnrollmentDraft {
                    student_id: s.id.clone(),
                    course_id: c.id.clone(),
                    academic_year: "2025/2026".into(),
                    semester: 1,
                },
            )
            .expect("enroll");
        }
        mark(&conn, &s1.id, &c.id, "Final Exam", 80.0);
        mark(&conn, &s2.id, &c.id, "Final Exam", 40.0);

        let gb = gradebook(&conn, &c.id, Some("2025/2026"), None).expect("gradebook");
        assert_eq!(gb.students.len(), 2);
        assert_eq!(gb.assessments, vec!["Final Exam".to_string()]);
        assert!(gb.students.iter().all(|s| s.marks.len() == 1));

        let perf = course_performance(&conn, &c.id).expect("performance");
        assert_eq!(perf.mark_count, 2);
        assert_eq!(perf.average_percentage, 60.0);
        assert_eq!(perf.pass_rate, 50.0);
        assert_eq!(perf.distribution.credit, 1);
        assert_eq!(perf.distribution.fail, 1);

        let d = dashboard(&conn).expect("dashboard");
        assert_eq!(d.students_by_status.get("active"), Some(&2));
        assert_eq!(d.enrollments, 2);
        assert_eq!(d.marks, 2);
    }
}
