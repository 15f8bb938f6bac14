//! Registration-number issuing against the student table.

use crate::rules::{self, Scheme};
use crate::store::{self, StoreError, StoreResult};
use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issued {
    pub reg_number: String,
    /// A `TMP-` placeholder that needs manual correction.
    pub provisional: bool,
}

/// Next number for the cohort under `scheme`. Never fails: a lookup error
/// yields a provisional timestamp id instead.
pub fn issue(conn: &Connection, scheme: Scheme, program: &str, intake_year: i64) -> Issued {
    match next_number(conn, scheme, program, intake_year) {
        Ok(reg_number) => Issued {
            reg_number,
            provisional: false,
        },
        Err(e) => {
            warn!(
                program,
                intake_year,
                scheme = scheme.as_str(),
                error = %e,
                "registration number lookup failed; issuing provisional number"
            );
            Issued {
                reg_number: rules::provisional_reg_number(Utc::now()),
                provisional: true,
            }
        }
    }
}

pub fn next_number(
    conn: &Connection,
    scheme: Scheme,
    program: &str,
    intake_year: i64,
) -> StoreResult<String> {
    let program = program.trim().to_ascii_lowercase();
    match scheme {
        Scheme::Hyphenated => {
            let explicit = store::programs::explicit_code(conn, &program)?;
            let code = rules::program_code(&program, explicit.as_deref());
            // Any student already holding CODE-YEAR-NNN counts, whatever its
            // program, so two programs sharing a code cannot collide.
            let existing = store::students::reg_numbers_with_prefix(
                conn,
                &rules::hyphenated_prefix(&code, intake_year),
            )?;
            let prefix = rules::hyphenated_prefix(&code, intake_year);
            let existing = existing.iter().map(String::as_str);
            rules::next_hyphenated(&code, intake_year, existing).ok_or_else(|| {
                StoreError::conflict(
                    "registration sequence exhausted",
                    Some(serde_json::json!({ "prefix": prefix })),
                )
            })
        }
        Scheme::Legacy => {
            let prefix = rules::legacy_prefix(&program)
                .map(str::to_string)
                .unwrap_or_else(|| rules::program_code(&program, None));
            let size = store::students::cohort_size(conn, &program, intake_year)?;
            Ok(rules::next_legacy(&prefix, intake_year, size))
        }
    }
}
