use serde_json::json;

use crate::model::ValidationError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
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

/// Step rejection with field-scoped errors the consumer can render next to
/// its inputs. Client and server origins share this shape.
pub fn validation_failed(id: &str, errors: &[ValidationError]) -> serde_json::Value {
    err(
        id,
        "validation_failed",
        "one or more fields failed validation",
        Some(json!({ "errors": errors })),
    )
}

/// A uniqueness lookup itself failed: the data may be fine, the step just
/// could not be verified. `saved` tells the consumer whether the typed data
/// was persisted before the advance was withheld.
pub fn verification_unavailable(
    id: &str,
    errors: &[ValidationError],
    saved: bool,
) -> serde_json::Value {
    err(
        id,
        "verification_unavailable",
        "identity verification is temporarily unavailable",
        Some(json!({ "errors": errors, "saved": saved, "retryable": true })),
    )
}
