//! Workspace settings: JSON sections in the `settings` table, merged over
//! built-in defaults on every read.

use crate::rules::Scheme;
use crate::store::{self, marks::MarkDefaults, StoreResult};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupSection {
    Registration,
    Courses,
    Marks,
}

impl SetupSection {
    pub const ALL: [SetupSection; 3] = [
        SetupSection::Registration,
        SetupSection::Courses,
        SetupSection::Marks,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "registration" => Some(Self::Registration),
            "courses" => Some(Self::Courses),
            "marks" => Some(Self::Marks),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Courses => "courses",
            Self::Marks => "marks",
        }
    }

    fn key(self) -> String {
        format!("setup.{}", self.name())
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Registration => json!({
            "scheme": "hyphenated"
        }),
        SetupSection::Courses => json!({
            "defaultCredits": 3
        }),
        SetupSection::Marks => json!({
            "defaultMaxScore": 100.0,
            "publishByDefault": false
        }),
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v.as_i64().ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_positive_f64(v: &Value, key: &str) -> Result<f64, String> {
    let n = v.as_f64().ok_or_else(|| format!("{} must be a number", key))?;
    if !n.is_finite() || n <= 0.0 {
        return Err(format!("{} must be > 0", key));
    }
    Ok(n)
}

pub fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Registration => match k.as_str() {
                "scheme" => {
                    let scheme = v
                        .as_str()
                        .and_then(Scheme::parse)
                        .ok_or_else(|| "scheme must be one of: hyphenated, legacy".to_string())?;
                    obj.insert(k.clone(), Value::String(scheme.as_str().to_string()));
                }
                _ => return Err(format!("unknown registration field: {}", k)),
            },
            SetupSection::Courses => match k.as_str() {
                "defaultCredits" => {
                    obj.insert(
                        k.clone(),
                        Value::from(parse_i64_range(
                            v,
                            k,
                            store::courses::MIN_CREDITS,
                            store::courses::MAX_CREDITS,
                        )?),
                    );
                }
                _ => return Err(format!("unknown courses field: {}", k)),
            },
            SetupSection::Marks => match k.as_str() {
                "defaultMaxScore" => {
                    obj.insert(k.clone(), Value::from(parse_positive_f64(v, k)?));
                }
                "publishByDefault" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown marks field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: SetupSection) -> StoreResult<Value> {
    let mut current = default_section(section);
    if let Some(saved) = store::settings::get_json(conn, &section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values must not block the portal.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

pub fn save_section(conn: &Connection, section: SetupSection, value: &Value) -> StoreResult<()> {
    store::settings::set_json(conn, &section.key(), value)
}

/// Typed view over all sections.
#[derive(Debug, Clone, Copy)]
pub struct PortalSettings {
    pub scheme: Scheme,
    pub default_credits: i64,
    pub mark_defaults: MarkDefaults,
}

impl PortalSettings {
    pub fn load(conn: &Connection) -> StoreResult<Self> {
        let reg = load_section(conn, SetupSection::Registration)?;
        let courses = load_section(conn, SetupSection::Courses)?;
        let marks = load_section(conn, SetupSection::Marks)?;
        let fallback = MarkDefaults::default();
        Ok(Self {
            scheme: reg
                .get("scheme")
                .and_then(|v| v.as_str())
                .and_then(Scheme::parse)
                .unwrap_or(Scheme::Hyphenated),
            default_credits: courses
                .get("defaultCredits")
                .and_then(|v| v.as_i64())
                .unwrap_or(crate::rules::DEFAULT_CREDITS),
            mark_defaults: MarkDefaults {
                max_score: marks
                    .get("defaultMaxScore")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(fallback.max_score),
                visible_to_student: marks
                    .get("publishByDefault")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(fallback.visible_to_student),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_conn;

    #[test]
    fn defaults_apply_on_fresh_workspace() {
        let conn = test_conn();
        let s = PortalSettings::load(&conn).expect("load");
        assert_eq!(s.scheme, Scheme::Hyphenated);
        assert_eq!(s.default_credits, 3);
        assert_eq!(s.mark_defaults.max_score, 100.0);
        assert!(!s.mark_defaults.visible_to_student);
    }

    #[test]
    fn patch_is_validated_and_persisted() {
        let conn = test_conn();
        let mut reg = load_section(&conn, SetupSection::Registration).expect("load");
        let bad = json!({ "scheme": "sequential" });
        assert!(merge_section_patch(
            SetupSection::Registration,
            &mut reg,
            bad.as_object().expect("obj")
        )
        .is_err());

        let good = json!({ "scheme": "LEGACY" });
        merge_section_patch(SetupSection::Registration, &mut reg, good.as_object().expect("obj"))
            .expect("merge");
        save_section(&conn, SetupSection::Registration, &reg).expect("save");
        assert_eq!(PortalSettings::load(&conn).expect("load").scheme, Scheme::Legacy);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut marks = default_section(SetupSection::Marks);
        let patch = json!({ "defaultMaxScore": 50, "roundTo": 1 });
        assert!(merge_section_patch(SetupSection::Marks, &mut marks, patch.as_object().expect("obj")).is_err());
    }
}
