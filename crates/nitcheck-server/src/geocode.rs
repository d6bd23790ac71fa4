//! Forward-geocoding proxy for the clinic finder.
//!
//! Keeps the Mapbox token server-side and collapses the response to the one
//! coordinate pair the finder needs.

use axum::{Json, extract::Query, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::AppState;

const MIN_QUERY_LENGTH: usize = 2;
const MAX_QUERY_LENGTH: usize = 200;

#[derive(Debug, Deserialize)]
pub struct GeocodeQuery {
    pub q: Option<String>,
    pub country: Option<String>,
}

/// `GET /api/geocode?q=<text>&country=UK|US`
pub async fn geocode(
    State(state): State<AppState>,
    Query(params): Query<GeocodeQuery>,
) -> Result<Json<Value>, ApiError> {
    let Some(token) = state.config.geocode.mapbox_token.as_deref() else {
        return Err(ApiError::GeocodeUnavailable(
            "geocoding not configured".to_string(),
        ));
    };

    let query = params.q.as_deref().unwrap_or("").trim().to_string();
    if query.len() < MIN_QUERY_LENGTH || query.len() > MAX_QUERY_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Query must be between {MIN_QUERY_LENGTH} and {MAX_QUERY_LENGTH} characters"
        )));
    }

    // Mapbox wants ISO 3166-1 alpha-2; biasing to the selected country makes
    // partial postcodes resolve sensibly (e.g. "hp1" in the UK).
    let country_code = match params.country.as_deref() {
        Some("UK") => Some("GB"),
        Some("US") => Some("US"),
        _ => None,
    };

    let mut url = url::Url::parse(&state.config.geocode.api_base)
        .map_err(|e| ApiError::Internal(format!("bad geocode api base: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| ApiError::Internal("bad geocode api base".to_string()))?
        .extend(["geocoding", "v5", "mapbox.places", &format!("{query}.json")]);
    url.query_pairs_mut()
        .append_pair("access_token", token)
        .append_pair("limit", "1")
        .append_pair("types", "postcode,place,address");
    if let Some(code) = country_code {
        url.query_pairs_mut().append_pair("country", code);
    }

    let response = state.http.get(url).send().await.map_err(|e| {
        tracing::warn!(error = %e, "geocode request failed");
        ApiError::GeocodeUnavailable(e.to_string())
    })?;

    let status = response.status();
    if !status.is_success() {
        let mut detail = response.text().await.unwrap_or_default();
        detail.truncate(200);
        return if status.is_server_error() {
            Err(ApiError::GeocodeUnavailable(detail))
        } else {
            Err(ApiError::BadRequest(if detail.is_empty() {
                "Geocoding request failed".to_string()
            } else {
                detail
            }))
        };
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| ApiError::GeocodeUnavailable(e.to_string()))?;

    let center = body
        .get("features")
        .and_then(Value::as_array)
        .and_then(|features| features.first())
        .and_then(|feature| feature.get("center"))
        .and_then(Value::as_array);

    match center {
        Some(center) if center.len() >= 2 => {
            let lng = center[0].as_f64();
            let lat = center[1].as_f64();
            match (lat, lng) {
                (Some(lat), Some(lng)) => Ok(Json(json!({"lat": lat, "lng": lng}))),
                _ => Err(ApiError::NotFound("No result found".to_string())),
            }
        }
        _ => Err(ApiError::NotFound("No result found".to_string())),
    }
}
