use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

type DbHandler = fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>;

/// Runs a handler body against the open workspace.
pub fn run_with_db(state: &AppState, req: &Request, body: DbHandler) -> serde_json::Value {
    let result = require_db(state).and_then(|conn| body(conn, &req.params));
    respond(req, result)
}

/// Wraps a handler outcome in the response envelope and logs rejections.
pub fn respond(req: &Request, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(result) => ok(&req.id, result),
        Err(error) => {
            if error.status() >= 500 {
                tracing::error!(method = %req.method, code = error.code, message = %error.message, "request failed");
            } else {
                tracing::warn!(method = %req.method, code = error.code, message = %error.message, "request rejected");
            }
            error.response(&req.id)
        }
    }
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Required string param, trimmed. Missing, non-string, and blank all count as
/// missing.
pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// A required number in `0..=max`.
pub fn get_required_bounded(
    params: &serde_json::Value,
    key: &str,
    max: f64,
) -> Result<f64, HandlerErr> {
    let v = params
        .get(key)
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    let n = v
        .as_f64()
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key)))?;
    if !n.is_finite() || n < 0.0 {
        return Err(HandlerErr::bad_params(format!(
            "{} must be a non-negative number",
            key
        )));
    }
    if n > max {
        return Err(HandlerErr::bad_params(format!("{} must be at most {}", key, max))
            .with_details(json!({ "key": key, "max": max })));
    }
    Ok(n)
}

pub fn get_optional_u64(params: &serde_json::Value, key: &str) -> Result<Option<u64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a non-negative integer", key))),
    }
}

pub fn get_optional_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn student_exists(conn: &Connection, student_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::query)
}

pub fn ensure_student(conn: &Connection, student_id: &str) -> Result<(), HandlerErr> {
    if student_exists(conn, student_id)? {
        Ok(())
    } else {
        Err(HandlerErr::not_found("student not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_required_string_counts_as_missing() {
        let p = json!({ "department": "  ", "year": "2024" });
        let e = get_required_str(&p, "department").expect_err("blank");
        assert_eq!(e.code, "bad_params");
        assert_eq!(get_required_str(&p, "year").expect("year"), "2024");
        assert!(get_required_str(&p, "missing").is_err());
    }

    #[test]
    fn bounded_numbers_reject_negative_missing_and_oversized() {
        let p = json!({ "a": 12.5, "b": -1, "c": "7", "big": 1e308, "edge": 100.0 });
        assert_eq!(get_required_bounded(&p, "a", 100.0).expect("a"), 12.5);
        assert!(get_required_bounded(&p, "b", 100.0).is_err());
        assert!(get_required_bounded(&p, "c", 100.0).is_err());
        assert!(get_required_bounded(&p, "d", 100.0).is_err());
        assert_eq!(get_required_bounded(&p, "edge", 100.0).expect("edge"), 100.0);
        let err = get_required_bounded(&p, "big", 100.0).expect_err("big");
        assert_eq!(err.code, "bad_params");
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn optional_integers_accept_null() {
        let p = json!({ "n": null, "m": 3, "x": -2 });
        assert_eq!(get_optional_u64(&p, "n").expect("n"), None);
        assert_eq!(get_optional_u64(&p, "m").expect("m"), Some(3));
        assert!(get_optional_u64(&p, "x").is_err());
        assert_eq!(get_optional_i64(&p, "x").expect("x"), Some(-2));
    }
}
