//! Response envelopes. Every line written to stdout is one of these.

use serde_json::{json, Value};

pub fn ok(id: &str, result: Value) -> Value {
    json!({ "id": id, "ok": true, "result": result })
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    let mut error = json!({ "code": code, "message": message.into() });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({ "id": id, "ok": false, "error": error })
}

/// Reply to a line that did not parse as a request, so there is no id to echo.
pub fn bad_json(message: impl Into<String>) -> Value {
    json!({
        "ok": false,
        "error": { "code": "bad_json", "message": message.into() }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_details_are_omitted_when_absent() {
        let v = err("7", "not_found", "student not found", None);
        assert_eq!(v["ok"], json!(false));
        assert!(v["error"].get("details").is_none());
        let v = err("7", "conflict", "taken", Some(json!({ "regNumber": "HNC-2025-001" })));
        assert_eq!(v["error"]["details"]["regNumber"], json!("HNC-2025-001"));
    }

    #[test]
    fn bad_json_has_no_id() {
        assert!(bad_json("eof").get("id").is_none());
    }
}
