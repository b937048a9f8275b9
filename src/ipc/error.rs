use crate::store::StoreError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

/// HTTP-equivalent status for an error code, so callers fronting the daemon
/// with a web layer can pass it straight through.
pub fn status_for(code: &str) -> u16 {
    match code {
        "bad_params" | "bad_json" | "no_workspace" => 400,
        "not_found" => 404,
        "stale_generation" | "cohort_changed" => 409,
        "not_implemented" => 501,
        _ => 500,
    }
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
        "status": status_for(code),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn query(e: impl std::fmt::Display) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status(&self) -> u16 {
        status_for(self.code)
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        let message = e.to_string();
        match e {
            StoreError::StaleGeneration { expected } => HandlerErr::new("stale_generation", message)
                .with_details(json!({ "expectedGeneration": expected })),
            StoreError::CohortChanged { ranked, current } => HandlerErr::new("cohort_changed", message)
                .with_details(json!({ "rankedStudents": ranked, "currentStudents": current })),
            StoreError::Db(_) => HandlerErr::new("db_update_failed", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_carries_status() {
        let v = err("7", "not_found", "cohort has no students", None);
        assert_eq!(v["ok"], json!(false));
        assert_eq!(v["error"]["status"], json!(404));
        assert!(v["error"].get("details").is_none());

        let v = HandlerErr::bad_params("missing year")
            .with_details(json!({ "field": "year" }))
            .response("8");
        assert_eq!(v["error"]["status"], json!(400));
        assert_eq!(v["error"]["details"]["field"], json!("year"));
    }

    #[test]
    fn stale_generation_maps_to_conflict() {
        let h: HandlerErr = StoreError::StaleGeneration { expected: 3 }.into();
        assert_eq!(h.code, "stale_generation");
        assert_eq!(h.status(), 409);
    }
}
