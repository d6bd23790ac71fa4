//! Analytics event intake.
//!
//! Events are validated and emitted as structured log lines under the
//! `analytics` target; retention and aggregation are the log pipeline's
//! concern, nothing is stored here.

use axum::{Json, extract::rejection::JsonRejection};
use serde_json::{Value, json};

use nitcheck_core::now_rfc3339;

use crate::error::{ApiError, Issue};

const EVENT_NAMES: [&str; 3] = ["scan_start", "scan_result", "clinic_contact_submit"];
const CONFIDENCE_LEVELS: [&str; 3] = ["high", "medium", "low"];

/// `POST /api/events`
pub async fn track_event(
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload
        .map_err(|_| ApiError::Validation(vec![Issue::new("", "Invalid event payload")]))?;

    let mut issues = Vec::new();

    let event = match body.get("event").and_then(Value::as_str) {
        Some(name) if EVENT_NAMES.contains(&name) => Some(name.to_string()),
        Some(_) => {
            issues.push(Issue::new("event", "Unknown event name"));
            None
        }
        None => {
            issues.push(Issue::new("event", "Required"));
            None
        }
    };

    let confidence_level = match body.get("confidenceLevel") {
        None | Some(Value::Null) => None,
        Some(Value::String(level)) if CONFIDENCE_LEVELS.contains(&level.as_str()) => {
            Some(level.clone())
        }
        Some(_) => {
            issues.push(Issue::new("confidenceLevel", "Must be high, medium, or low"));
            None
        }
    };

    let label = optional_str(&body, "label", &mut issues);
    let clinic_id = optional_str(&body, "clinicId", &mut issues);
    let timestamp = optional_str(&body, "timestamp", &mut issues).unwrap_or_else(now_rfc3339);

    let Some(event) = event else {
        return Err(ApiError::Validation(issues));
    };
    if !issues.is_empty() {
        return Err(ApiError::Validation(issues));
    }

    tracing::info!(
        target: "analytics",
        event = %event,
        label = label.as_deref().unwrap_or(""),
        confidence_level = confidence_level.as_deref().unwrap_or(""),
        clinic_id = clinic_id.as_deref().unwrap_or(""),
        timestamp = %timestamp,
        "analytics event"
    );

    Ok(Json(json!({"ok": true})))
}

fn optional_str(body: &Value, key: &str, issues: &mut Vec<Issue>) -> Option<String> {
    match body.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            issues.push(Issue::new(key, "Must be a string"));
            None
        }
    }
}
