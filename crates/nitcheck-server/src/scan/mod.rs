//! Photo scan pipeline: image intake, provider chain, and the scan routes.

pub mod normalize;
pub mod providers;

use std::io::Cursor;
use std::time::Instant;

use axum::{
    Json,
    extract::{FromRequest, Multipart, Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};

use nitcheck_core::scan::ScanOutcome;

use crate::config::ScanConfig;
use crate::error::{ApiError, Issue};
use crate::middleware::client_ip;
use crate::state::AppState;
use providers::{DeepSeekProvider, DetectionServiceProvider, ProviderError, RoboflowProvider, ScanProvider};

/// A decoded upload ready for the provider chain.
#[derive(Debug)]
pub struct ScanImage {
    pub base64: String,
    pub width: u32,
    pub height: u32,
}

/// Provider chain plus the image-quality thresholds.
pub struct Scanner {
    providers: Vec<Box<dyn ScanProvider>>,
    strong_side_px: u32,
}

impl Scanner {
    pub fn from_config(config: &ScanConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .expect("Failed to create HTTP client");

        let mut providers: Vec<Box<dyn ScanProvider>> = Vec::new();
        if config.roboflow.is_configured() {
            providers.push(Box::new(RoboflowProvider::new(
                client.clone(),
                config.roboflow.clone(),
                config.min_confidence,
            )));
        }
        if config.deepseek.is_configured() {
            providers.push(Box::new(DeepSeekProvider::new(
                client.clone(),
                config.deepseek.clone(),
            )));
        }
        if let Some(url) = &config.detection_url {
            providers.push(Box::new(DetectionServiceProvider::new(client, url.clone())));
        }

        Self {
            providers,
            strong_side_px: config.strong_side_px,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Run the provider chain: first success wins, failures fall through to
    /// the next configured provider.
    pub async fn scan(&self, image: &ScanImage) -> Result<ScanOutcome, ApiError> {
        if self.providers.is_empty() {
            return Err(ApiError::NoProviderConfigured);
        }

        let mut last_error: Option<ProviderError> = None;
        for provider in &self.providers {
            let started = Instant::now();
            match provider.scan(image).await {
                Ok(outcome) => {
                    tracing::info!(
                        provider = provider.name(),
                        label = %outcome.label,
                        confidence = outcome.confidence,
                        detections = outcome.detections.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "scan completed"
                    );
                    return Ok(self.finish(outcome, image));
                }
                Err(e) => {
                    tracing::warn!(
                        provider = provider.name(),
                        error = %e,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "scan provider failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(ApiError::Provider(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "all providers failed".to_string()),
        ))
    }

    /// Attach source dimensions and apply the weak-image confidence cap.
    fn finish(&self, mut outcome: ScanOutcome, image: &ScanImage) -> ScanOutcome {
        if outcome.image_width.is_none() {
            outcome = outcome.with_dimensions(image.width, image.height);
        }
        if image.width.min(image.height) < self.strong_side_px {
            outcome = outcome.cap_confidence_level();
        }
        outcome
    }
}

// =============================================================================
// Routes
// =============================================================================

/// `POST /api/scan` — accepts `multipart/form-data` (field `image` or `file`)
/// or JSON `{"image": "<base64>"}`.
pub async fn scan_photo(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<ScanOutcome>, ApiError> {
    let headers = req.headers().clone();

    let ip = client_ip(&headers);
    let decision = state.limiter.check(
        &format!("scan:ip:{ip}"),
        state.config.rate_limit.window(),
        state.config.rate_limit.max_requests,
    );
    if !decision.allowed {
        tracing::info!(ip = %ip, "scan rate limited");
        return Err(ApiError::RateLimited);
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let bytes = if content_type.starts_with("multipart/form-data") {
        read_multipart_image(req).await?
    } else if content_type.starts_with("application/json") {
        read_json_image(req, state.config.server.body_limit_bytes).await?
    } else {
        return Err(ApiError::BadRequest(
            "Send multipart/form-data with an image field, or JSON with a base64 image".to_string(),
        ));
    };

    let image = prepare_image(bytes, state.config.scan.min_side_px)?;
    let outcome = state.scanner.scan(&image).await?;
    Ok(Json(outcome))
}

async fn read_multipart_image(req: Request) -> Result<Vec<u8>, ApiError> {
    let mut multipart = Multipart::from_request(req, &())
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if matches!(field.name(), Some("image") | Some("file")) {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Could not read upload: {e}")))?;
            return Ok(data.to_vec());
        }
    }

    Err(ApiError::Validation(vec![Issue::new(
        "image",
        "Missing image in form (field: image or file)",
    )]))
}

async fn read_json_image(req: Request, body_limit: usize) -> Result<Vec<u8>, ApiError> {
    let body = axum::body::to_bytes(req.into_body(), body_limit)
        .await
        .map_err(|e| ApiError::BadRequest(format!("Could not read body: {e}")))?;
    let value: Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("Invalid JSON body".to_string()))?;

    let encoded = value
        .get("image")
        .or_else(|| value.get("base64"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ApiError::Validation(vec![Issue::new(
                "image",
                "Missing image in JSON (field: image or base64)",
            )])
        })?;

    decode_base64_image(encoded)
}

/// Decode a base64 payload, tolerating `data:image/...;base64,` prefixes.
fn decode_base64_image(encoded: &str) -> Result<Vec<u8>, ApiError> {
    let payload = match encoded.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };

    BASE64
        .decode(payload.trim())
        .map_err(|_| ApiError::BadRequest("Image is not valid base64".to_string()))
}

/// Decode dimensions and enforce the hard minimum-side floor.
fn prepare_image(bytes: Vec<u8>, min_side_px: u32) -> Result<ScanImage, ApiError> {
    let (width, height) = image::ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .map_err(|_| ApiError::BadRequest("Could not read image. Please try another file.".to_string()))?
        .into_dimensions()
        .map_err(|_| ApiError::BadRequest("Could not read image. Please try another file.".to_string()))?;

    if width.min(height) < min_side_px {
        return Err(ApiError::ImageTooSmall {
            min_side_px,
        });
    }

    Ok(ScanImage {
        base64: BASE64.encode(&bytes),
        width,
        height,
    })
}

/// `GET /api/scan/status` — non-sensitive diagnostics: which provider is
/// configured.
pub async fn scan_status(State(state): State<AppState>) -> Json<Value> {
    let provider = state.config.scan.provider_name();
    Json(json!({
        "configured": provider.is_some(),
        "provider": provider.unwrap_or("none"),
    }))
}

/// `GET /api/cron/warm-inference` — ping the detection service so serverless
/// containers stay warm between scans.
pub async fn warm_inference(State(state): State<AppState>) -> Response {
    let Some(url) = &state.config.scan.detection_url else {
        return Json(json!({"warmed": false, "reason": "no detection service configured"}))
            .into_response();
    };

    let health_url = format!("{}/health", url.trim_end_matches('/'));
    let started = Instant::now();

    match state.http.get(&health_url).send().await {
        Ok(response) => {
            let ms = started.elapsed().as_millis() as u64;
            let status = response.status().as_u16();
            tracing::info!(status, ms, "warm-inference pinged");
            Json(json!({"warmed": true, "status": status, "ms": ms})).into_response()
        }
        Err(e) => {
            let ms = started.elapsed().as_millis() as u64;
            tracing::warn!(error = %e, ms, "warm-inference failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({"warmed": false, "error": e.to_string(), "ms": ms})),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([120, 100, 90]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn decode_strips_data_url_prefix() {
        let encoded = format!("data:image/png;base64,{}", BASE64.encode(b"abc"));
        assert_eq!(decode_base64_image(&encoded).unwrap(), b"abc");
        assert_eq!(decode_base64_image(&BASE64.encode(b"abc")).unwrap(), b"abc");
        assert!(decode_base64_image("%%%not base64%%%").is_err());
    }

    #[test]
    fn prepare_image_reads_dimensions() {
        let image = prepare_image(png_bytes(320, 200), 160).unwrap();
        assert_eq!((image.width, image.height), (320, 200));
        assert!(!image.base64.is_empty());
    }

    #[test]
    fn prepare_image_rejects_small_uploads() {
        let err = prepare_image(png_bytes(100, 400), 160).unwrap_err();
        assert!(matches!(err, ApiError::ImageTooSmall { min_side_px: 160 }));
    }

    #[test]
    fn prepare_image_rejects_non_images() {
        assert!(prepare_image(b"definitely not an image".to_vec(), 160).is_err());
    }

    #[tokio::test]
    async fn scanner_without_providers_reports_unconfigured() {
        let scanner = Scanner::from_config(&ScanConfig::default());
        assert!(!scanner.is_configured());

        let image = ScanImage {
            base64: String::new(),
            width: 640,
            height: 640,
        };
        assert!(matches!(
            scanner.scan(&image).await,
            Err(ApiError::NoProviderConfigured)
        ));
    }
}
