//! Grading, GPA and registration-number rules.
//!
//! Everything in here is pure: no storage, no clock reads except where a
//! timestamp is passed in. Mark entry, bulk grading and transcripts all go
//! through `classify`, so the band table below is the only copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Grade {
    Fail,
    Pass,
    Credit,
    Distinction,
}

impl Grade {
    pub const ALL: [Grade; 4] = [Grade::Distinction, Grade::Credit, Grade::Pass, Grade::Fail];

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::Distinction => "DISTINCTION",
            Grade::Credit => "CREDIT",
            Grade::Pass => "PASS",
            Grade::Fail => "FAIL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DISTINCTION" => Some(Grade::Distinction),
            "CREDIT" => Some(Grade::Credit),
            "PASS" => Some(Grade::Pass),
            "FAIL" => Some(Grade::Fail),
            _ => None,
        }
    }

    pub fn points(self) -> f64 {
        match self {
            Grade::Distinction => 4.0,
            Grade::Credit => 3.0,
            Grade::Pass => 2.0,
            Grade::Fail => 0.0,
        }
    }
}

/// Inclusive lower bounds, highest first. Anything below the last band is FAIL.
pub const GRADE_BANDS: [(f64, Grade); 3] = [
    (85.0, Grade::Distinction),
    (70.0, Grade::Credit),
    (50.0, Grade::Pass),
];

/// Percentages above this are capped before banding (not before storage).
pub const PERCENT_CAP: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub grade: Grade,
    pub points: f64,
}

/// Total over f64: NaN and negatives land in FAIL, +inf is capped to 100.
pub fn classify(percentage: f64) -> Classification {
    let grade = if percentage.is_nan() {
        Grade::Fail
    } else {
        let p = percentage.min(PERCENT_CAP);
        GRADE_BANDS
            .iter()
            .find(|(lower, _)| p >= *lower)
            .map(|(_, g)| *g)
            .unwrap_or(Grade::Fail)
    };
    Classification {
        grade,
        points: grade.points(),
    }
}

/// Half-up rounding to 2 decimals: `Int(100*x + 0.5) / 100`.
///
/// `100*x` is first snapped to 9 decimal places so a value like 2.175, which
/// has no exact binary form, still rounds up.
pub fn round_half_up_2(x: f64) -> f64 {
    let scaled = (100.0 * x * 1e9).round() / 1e9;
    (scaled + 0.5).floor() / 100.0
}

/// `100 * score / max_score`, rounded to 2 decimals. `None` when `max_score`
/// is not a positive finite number.
pub fn percentage(score: f64, max_score: f64) -> Option<f64> {
    if !max_score.is_finite() || max_score <= 0.0 || !score.is_finite() {
        return None;
    }
    Some(round_half_up_2(100.0 * score / max_score))
}

/// Derived columns of a mark. Grade is classified from the stored (rounded)
/// percentage so re-classifying a stored row can never disagree with it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedMark {
    pub percentage: f64,
    pub grade: Grade,
    pub grade_points: f64,
}

/// Rounds first, then classifies: a raw 49.995 is stored as 50.00 and graded
/// PASS, matching what the row shows.
pub fn derive_mark(score: f64, max_score: f64) -> Option<DerivedMark> {
    let pct = percentage(score, max_score)?;
    let c = classify(pct);
    Some(DerivedMark {
        percentage: pct,
        grade: c.grade,
        grade_points: c.points,
    })
}

pub const DEFAULT_CREDITS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpaInput {
    pub grade: Grade,
    pub grade_points: f64,
    pub credits: Option<i64>,
}

/// Credit-weighted mean of grade points over non-FAIL marks, rounded half-up
/// to 2 decimals. No passing marks (including "no marks at all") gives 0.0.
pub fn gpa<I>(marks: I) -> f64
where
    I: IntoIterator<Item = GpaInput>,
{
    // Integer sums in hundredths of a point, so halves round without float error.
    let mut weighted: i64 = 0;
    let mut credits_sum: i64 = 0;
    for m in marks {
        if m.grade == Grade::Fail {
            continue;
        }
        let credits = match m.credits {
            Some(c) if c > 0 => c,
            _ => DEFAULT_CREDITS,
        };
        let centi_points = (m.grade_points * 100.0).round() as i64;
        weighted += centi_points * credits;
        credits_sum += credits;
    }
    if credits_sum <= 0 {
        return 0.0;
    }
    // round(w / c) half-up, with w >= 0 and c > 0
    ((2 * weighted + credits_sum) / (2 * credits_sum)) as f64 / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    /// `{CODE}-{YYYY}-{NNN}`, sequence = max existing + 1.
    Hyphenated,
    /// `{PFX}{YY}{NNN}`, sequence = cohort size + 1.
    Legacy,
}

impl Scheme {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hyphenated" => Some(Scheme::Hyphenated),
            "legacy" => Some(Scheme::Legacy),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Hyphenated => "hyphenated",
            Scheme::Legacy => "legacy",
        }
    }
}

/// Explicit code if it has at least 3 letters, else the first 3 characters of
/// the program id. Upper-cased either way.
pub fn program_code(program_id: &str, explicit: Option<&str>) -> String {
    if let Some(code) = explicit.map(str::trim) {
        if code.chars().filter(|c| c.is_ascii_alphabetic()).count() >= 3 {
            return code.to_ascii_uppercase();
        }
    }
    program_id
        .trim()
        .chars()
        .take(3)
        .collect::<String>()
        .to_ascii_uppercase()
}

const LEGACY_PREFIXES: [(&str, &str); 3] = [("basic", "TEE"), ("hnc", "HNC"), ("advanced", "ATE")];

pub fn legacy_prefix(program_id: &str) -> Option<&'static str> {
    let key = program_id.trim().to_ascii_lowercase();
    LEGACY_PREFIXES
        .iter()
        .find(|(p, _)| *p == key)
        .map(|(_, pfx)| *pfx)
}

pub fn hyphenated_prefix(code: &str, intake_year: i64) -> String {
    format!("{}-{}-", code, intake_year)
}

pub fn format_hyphenated(code: &str, intake_year: i64, seq: u32) -> String {
    format!("{}{:03}", hyphenated_prefix(code, intake_year), seq)
}

/// Sequence part of `reg` if it is exactly `{code}-{year}-{digits}`.
pub fn parse_hyphenated(reg: &str, code: &str, intake_year: i64) -> Option<u32> {
    let rest = reg.trim().strip_prefix(&hyphenated_prefix(code, intake_year))?;
    if rest.len() < 3 || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

/// `None` once the highest stored sequence is `u32::MAX`.
pub fn next_hyphenated<'a, I>(code: &str, intake_year: i64, existing: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let max = existing
        .into_iter()
        .filter_map(|r| parse_hyphenated(r, code, intake_year))
        .max()
        .unwrap_or(0);
    let seq = max.checked_add(1)?;
    Some(format_hyphenated(code, intake_year, seq))
}

pub fn format_legacy(prefix: &str, intake_year: i64, seq: u32) -> String {
    format!("{}{:02}{:03}", prefix, intake_year.rem_euclid(100), seq)
}

/// Count-based: reuses a number after a deletion inside the cohort.
pub fn next_legacy(prefix: &str, intake_year: i64, cohort_size: usize) -> String {
    format_legacy(prefix, intake_year, cohort_size as u32 + 1)
}

pub const PROVISIONAL_PREFIX: &str = "TMP-";

pub fn provisional_reg_number(now: DateTime<Utc>) -> String {
    format!("{}{}", PROVISIONAL_PREFIX, now.format("%Y%m%d%H%M%S%3f"))
}

pub fn is_provisional(reg: &str) -> bool {
    reg.starts_with(PROVISIONAL_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn classify_boundaries() {
        let cases = [
            (49.99, Grade::Fail),
            (50.0, Grade::Pass),
            (69.99, Grade::Pass),
            (70.0, Grade::Credit),
            (84.99, Grade::Credit),
            (85.0, Grade::Distinction),
            (100.0, Grade::Distinction),
            (150.0, Grade::Distinction),
            (-5.0, Grade::Fail),
        ];
        for (pct, want) in cases {
            assert_eq!(classify(pct).grade, want, "pct={}", pct);
        }
        assert_eq!(classify(f64::NAN).grade, Grade::Fail);
        assert_eq!(classify(f64::INFINITY).grade, Grade::Distinction);
        assert_eq!(classify(f64::NEG_INFINITY).grade, Grade::Fail);
    }

    #[test]
    fn classify_points_follow_grade() {
        assert_eq!(classify(90.0).points, 4.0);
        assert_eq!(classify(75.0).points, 3.0);
        assert_eq!(classify(55.0).points, 2.0);
        assert_eq!(classify(10.0).points, 0.0);
    }

    #[test]
    fn derived_grade_agrees_with_stored_percentage() {
        // 84.996 rounds to 85.00; the stored grade must match that value.
        let d = derive_mark(84.996, 100.0).expect("derive");
        assert_eq!(d.percentage, 85.0);
        assert_eq!(d.grade, classify(d.percentage).grade);
        assert_eq!(d.grade, Grade::Distinction);
        let edge = derive_mark(49.995, 100.0).expect("derive");
        assert_eq!(edge.percentage, 50.0);
        assert_eq!(edge.grade, Grade::Pass);
        assert!(derive_mark(10.0, 0.0).is_none());
    }

    #[test]
    fn gpa_rounds_half_up() {
        let marks = [
            GpaInput { grade: Grade::Distinction, grade_points: 4.0, credits: Some(2) },
            GpaInput { grade: Grade::Credit, grade_points: 3.0, credits: Some(1) },
        ];
        // 11 / 3 = 3.666..
        assert_eq!(gpa(marks), 3.67);
    }

    #[test]
    fn exact_halves_round_up() {
        // 87 / 40 = 2.175 exactly.
        let marks = [
            GpaInput { grade: Grade::Credit, grade_points: 3.0, credits: Some(7) },
            GpaInput { grade: Grade::Pass, grade_points: 2.0, credits: Some(10) },
            GpaInput { grade: Grade::Pass, grade_points: 2.0, credits: Some(10) },
            GpaInput { grade: Grade::Pass, grade_points: 2.0, credits: Some(10) },
            GpaInput { grade: Grade::Pass, grade_points: 2.0, credits: Some(3) },
        ];
        assert_eq!(gpa(marks), 2.18);
        assert_eq!(percentage(87.0, 4000.0), Some(2.18));
        assert_eq!(round_half_up_2(2.175), 2.18);
        assert_eq!(round_half_up_2(1.005), 1.01);
        assert_eq!(round_half_up_2(2.174), 2.17);
    }

    #[test]
    fn hyphenated_sequence_stops_at_u32_max() {
        assert_eq!(next_hyphenated("HNC", 2025, ["HNC-2025-4294967295"]), None);
        assert_eq!(
            next_hyphenated("HNC", 2025, ["HNC-2025-4294967294"]),
            Some("HNC-2025-4294967295".to_string())
        );
    }

    #[test]
    fn legacy_year_is_two_digits() {
        assert_eq!(format_legacy("TEE", 2005, 7), "TEE05007");
        assert_eq!(next_legacy("ATE", 2030, 11), "ATE30012");
    }

    #[test]
    fn provisional_numbers_are_flagged() {
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let reg = provisional_reg_number(now);
        assert_eq!(reg, "TMP-20250304050607000");
        assert!(is_provisional(&reg));
        assert!(!is_provisional("HNC-2025-001"));
    }
}
