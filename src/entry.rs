//! Mark entry: the duplicate-mark guard, the single-flight save and bulk
//! grading.
//!
//! The guard is a check-then-act against the `(student, course, assessment)`
//! triple. The UNIQUE constraint on `marks` backs it, so a racing insert that
//! slips past the check surfaces as a duplicate instead of a second row.

use crate::flight::SingleFlight;
use crate::store::marks::{self, Mark, MarkDefaults, MarkDraft};
use crate::store::{self, StoreError};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveKind {
    Created,
    Overwritten,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Saved {
    pub kind: SaveKind,
    pub mark: Mark,
}

#[derive(Debug, Error)]
pub enum EntryError {
    #[error("a mark save is already in progress")]
    Busy,

    /// The triple already has a mark and overwrite was not confirmed.
    #[error("a mark already exists for this student, course and assessment")]
    Duplicate { existing: Box<Mark> },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Mark-entry form. Holds the re-entrancy guard for `save`.
#[derive(Debug, Default)]
pub struct MarkEntry {
    flight: SingleFlight,
}

impl MarkEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flight(&self) -> &SingleFlight {
        &self.flight
    }

    /// Single-flight save: a call made while another is outstanding is
    /// rejected with `Busy` before any storage access.
    pub fn save(
        &self,
        conn: &Connection,
        draft: &MarkDraft,
        defaults: MarkDefaults,
        overwrite: bool,
    ) -> Result<Saved, EntryError> {
        let Some(_permit) = self.flight.try_begin() else {
            return Err(EntryError::Busy);
        };
        save_mark(conn, draft, defaults, overwrite)
    }
}

pub fn save_mark(
    conn: &Connection,
    draft: &MarkDraft,
    defaults: MarkDefaults,
    overwrite: bool,
) -> Result<Saved, EntryError> {
    let valid = marks::validate(draft, defaults)?;
    store::students::get(conn, &valid.student_id)?;
    store::courses::get(conn, &valid.course_id)?;

    let existing = marks::find_by_triple(
        conn,
        &valid.student_id,
        &valid.course_id,
        &valid.assessment_name,
    )?;
    if let Some(existing) = existing {
        if !overwrite {
            return Err(EntryError::Duplicate {
                existing: Box::new(existing),
            });
        }
        let mark = marks::overwrite(conn, &existing.id, &valid)?;
        return Ok(Saved {
            kind: SaveKind::Overwritten,
            mark,
        });
    }

    match marks::insert(conn, &valid) {
        Ok(mark) => Ok(Saved {
            kind: SaveKind::Created,
            mark,
        }),
        Err(StoreError::Conflict { .. }) => {
            // Lost a race to another writer; report what is now stored.
            let existing = marks::find_by_triple(
                conn,
                &valid.student_id,
                &valid.course_id,
                &valid.assessment_name,
            )?
            .ok_or(StoreError::NotFound("mark"))?;
            Err(EntryError::Duplicate {
                existing: Box::new(existing),
            })
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkScore {
    pub student_id: String,
    pub score: f64,
    #[serde(default)]
    pub remarks: Option<String>,
}

/// Shared fields of a bulk grading run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkGradeRequest {
    pub course_id: String,
    pub assessment_name: String,
    #[serde(default)]
    pub assessment_type: Option<String>,
    #[serde(default)]
    pub assessment_date: Option<String>,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub visible_to_student: Option<bool>,
    #[serde(default)]
    pub overwrite: bool,
    pub scores: Vec<BulkScore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkStatus {
    Created,
    Overwritten,
    Duplicate,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub student_id: String,
    pub status: BulkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark: Option<Mark>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSummary {
    pub created: usize,
    pub overwritten: usize,
    pub duplicates: usize,
    pub errors: usize,
}

/// One save per entry; every outcome is collected, nothing fails fast.
pub fn bulk_grade(
    conn: &Connection,
    req: &BulkGradeRequest,
    defaults: MarkDefaults,
) -> (Vec<BulkOutcome>, BulkSummary) {
    let mut outcomes = Vec::with_capacity(req.scores.len());
    let mut summary = BulkSummary::default();
    for entry in &req.scores {
        let draft = MarkDraft {
            student_id: entry.student_id.clone(),
            course_id: req.course_id.clone(),
            assessment_name: req.assessment_name.clone(),
            assessment_type: req.assessment_type.clone(),
            assessment_date: req.assessment_date.clone(),
            score: entry.score,
            max_score: req.max_score,
            remarks: entry.remarks.clone(),
            visible_to_student: req.visible_to_student,
        };
        let outcome = match save_mark(conn, &draft, defaults, req.overwrite) {
            Ok(saved) => {
                let status = match saved.kind {
                    SaveKind::Created => {
                        summary.created += 1;
                        BulkStatus::Created
                    }
                    SaveKind::Overwritten => {
                        summary.overwritten += 1;
                        BulkStatus::Overwritten
                    }
                };
                BulkOutcome {
                    student_id: entry.student_id.clone(),
                    status,
                    mark: Some(saved.mark),
                    message: None,
                }
            }
            Err(EntryError::Duplicate { existing }) => {
                summary.duplicates += 1;
                BulkOutcome {
                    student_id: entry.student_id.clone(),
                    status: BulkStatus::Duplicate,
                    mark: Some(*existing),
                    message: Some("mark already exists".to_string()),
                }
            }
            Err(e) => {
                summary.errors += 1;
                BulkOutcome {
                    student_id: entry.student_id.clone(),
                    status: BulkStatus::Error,
                    mark: None,
                    message: Some(e.to_string()),
                }
            }
        };
        outcomes.push(outcome);
    }
    (outcomes, summary)
}
