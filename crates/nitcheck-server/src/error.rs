//! API error surface: every failure maps to a JSON envelope
//! `{"ok": false, "code": ..., "error": ..., "issues": [...]}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use std::fmt;

/// One field-level validation problem, mirroring the client-side form errors.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Issue {
    pub path: String,
    pub message: String,
}

impl Issue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Request-handling errors surfaced to API clients.
#[derive(Debug)]
pub enum ApiError {
    /// Payload failed schema validation.
    Validation(Vec<Issue>),

    /// Origin header did not match the site host.
    OriginForbidden,

    /// The caller exhausted its rate-limit budget.
    RateLimited,

    /// Uploaded image is below the minimum shortest-side size.
    ImageTooSmall { min_side_px: u32 },

    /// No scan provider is configured.
    NoProviderConfigured,

    /// Every configured scan provider failed.
    Provider(String),

    /// Lead delivery failed and looks retryable.
    DeliveryTransient,

    /// Lead delivery failed and retrying will not help (bad credentials etc).
    DeliveryPermanent,

    /// Geocoding unavailable (no token, or upstream down).
    GeocodeUnavailable(String),

    /// Nothing matched the request.
    NotFound(String),

    /// Malformed request outside field validation (bad JSON, bad multipart).
    BadRequest(String),

    /// Generic internal error.
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(_) => write!(f, "Invalid request payload"),
            Self::OriginForbidden => write!(f, "Origin not allowed"),
            Self::RateLimited => write!(f, "Too many requests. Please wait and try again."),
            Self::ImageTooSmall { min_side_px } => write!(
                f,
                "Image is too small: the shortest side must be at least {min_side_px}px"
            ),
            Self::NoProviderConfigured => write!(f, "No scan provider is configured"),
            Self::Provider(msg) => write!(f, "Scan service unavailable: {msg}"),
            Self::DeliveryTransient | Self::DeliveryPermanent => write!(
                f,
                "We couldn't deliver your submission right now. Please try again shortly."
            ),
            Self::GeocodeUnavailable(msg) => write!(f, "Geocoding failed: {msg}"),
            Self::NotFound(msg) => write!(f, "{msg}"),
            Self::BadRequest(msg) => write!(f, "{msg}"),
            Self::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::OriginForbidden => "ORIGIN_FORBIDDEN",
            Self::RateLimited => "RATE_LIMITED",
            Self::ImageTooSmall { .. } => "IMAGE_TOO_SMALL",
            Self::NoProviderConfigured => "NO_PROVIDER_CONFIGURED",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::DeliveryTransient => "TRANSIENT_DELIVERY_ERROR",
            Self::DeliveryPermanent => "PERMANENT_DELIVERY_ERROR",
            Self::GeocodeUnavailable(_) => "GEOCODE_UNAVAILABLE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::ImageTooSmall { .. } | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::OriginForbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::NoProviderConfigured
            | Self::DeliveryTransient
            | Self::DeliveryPermanent
            | Self::GeocodeUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "ok": false,
            "code": self.code(),
            "error": self.to_string(),
        });

        if let Self::Validation(issues) = &self {
            body["issues"] = serde_json::to_value(issues).unwrap_or_default();
        }

        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_statuses_line_up() {
        assert_eq!(ApiError::RateLimited.code(), "RATE_LIMITED");
        assert_eq!(ApiError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);

        assert_eq!(
            ApiError::NoProviderConfigured.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Provider("timeout".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::ImageTooSmall { min_side_px: 160 }.code(),
            "IMAGE_TOO_SMALL"
        );
        assert_eq!(ApiError::OriginForbidden.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn validation_error_carries_issues() {
        let err = ApiError::Validation(vec![Issue::new("email", "must be a valid email")]);
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
