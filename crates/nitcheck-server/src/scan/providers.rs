//! Scan providers: upstream services that turn an uploaded photo into a
//! classification.
//!
//! Providers share one trait and are tried in configuration order by the
//! [`Scanner`](super::Scanner); each one owns its request shape and maps the
//! upstream response onto [`ScanOutcome`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use nitcheck_core::scan::{Detection, ScanLabel, ScanOutcome};

use super::ScanImage;
use super::normalize::normalize_response;
use crate::config::{DeepSeekConfig, RoboflowConfig};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unusable response: {0}")]
    BadResponse(String),
}

impl ProviderError {
    fn status(status: reqwest::StatusCode, body: String) -> Self {
        let mut body = body;
        body.truncate(200);
        Self::Status {
            status: status.as_u16(),
            body,
        }
    }
}

/// One upstream classification service.
#[async_trait]
pub trait ScanProvider: Send + Sync {
    /// Provider name for logging and the status endpoint.
    fn name(&self) -> &'static str;

    /// Classify one image.
    async fn scan(&self, image: &ScanImage) -> Result<ScanOutcome, ProviderError>;
}

// =============================================================================
// Roboflow (serverless workflow or hosted model)
// =============================================================================

pub struct RoboflowProvider {
    client: reqwest::Client,
    config: RoboflowConfig,
    min_confidence: f32,
}

impl RoboflowProvider {
    pub fn new(client: reqwest::Client, config: RoboflowConfig, min_confidence: f32) -> Self {
        Self {
            client,
            config,
            min_confidence,
        }
    }

    async fn request(&self, image: &ScanImage) -> Result<Value, ProviderError> {
        let api_base = self.config.api_base.trim_end_matches('/');
        let api_key = self.config.api_key.as_deref().unwrap_or_default();

        let response = match (&self.config.workspace, &self.config.workflow_id) {
            (Some(workspace), Some(workflow_id)) => {
                // Serverless workflow endpoint
                self.client
                    .post(format!(
                        "{api_base}/infer/workflows/{workspace}/{workflow_id}"
                    ))
                    .json(&json!({
                        "api_key": api_key,
                        "inputs": {
                            "image": {"type": "base64", "value": image.base64}
                        }
                    }))
                    .send()
                    .await?
            }
            _ => {
                // Hosted model endpoint takes the bare base64 body
                let model_id = self.config.model_id.as_deref().unwrap_or_default();
                self.client
                    .post(format!("{api_base}/{model_id}"))
                    .query(&[("api_key", api_key)])
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(image.base64.clone())
                    .send()
                    .await?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::status(status, body));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ScanProvider for RoboflowProvider {
    fn name(&self) -> &'static str {
        "roboflow"
    }

    async fn scan(&self, image: &ScanImage) -> Result<ScanOutcome, ProviderError> {
        let value = self.request(image).await?;
        let normalized = normalize_response(&value, self.min_confidence);

        let mut outcome = ScanOutcome::from_detections(normalized.detections);
        if let (Some(width), Some(height)) = (normalized.image_width, normalized.image_height) {
            outcome = outcome.with_dimensions(width, height);
        }
        Ok(outcome)
    }
}

// =============================================================================
// DeepSeek (vision LLM: classification + reassurance sentence)
// =============================================================================

const DEEPSEEK_PROMPT: &str = "You are a cautious assistant. This image shows hair or scalp (possibly close-up).\n\
Classify it exactly one of: lice, nits, dandruff, clear.\n\
Then write one short, reassuring sentence for the user. Emphasise this is indicative only and they should see a professional for confirmation. Do not diagnose.\n\
Reply with only a JSON object: {\"label\":\"lice\"|\"nits\"|\"dandruff\"|\"clear\",\"explanation\":\"your sentence\"}. No other text.";

/// The LLM does not expose a calibrated score, so its answers carry a fixed
/// confidence matching the high tier.
const DEEPSEEK_CONFIDENCE: f32 = 0.85;

pub struct DeepSeekProvider {
    client: reqwest::Client,
    config: DeepSeekConfig,
}

impl DeepSeekProvider {
    pub fn new(client: reqwest::Client, config: DeepSeekConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ScanProvider for DeepSeekProvider {
    fn name(&self) -> &'static str {
        "deepseek"
    }

    async fn scan(&self, image: &ScanImage) -> Result<ScanOutcome, ProviderError> {
        let api_base = self.config.api_base.trim_end_matches('/');
        let api_key = self.config.api_key.as_deref().unwrap_or_default();

        let response = self
            .client
            .post(format!("{api_base}/v1/chat/completions"))
            .bearer_auth(api_key)
            .json(&json!({
                "model": self.config.model,
                "max_tokens": 200,
                "response_format": {"type": "json_object"},
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": DEEPSEEK_PROMPT},
                        {
                            "type": "image_url",
                            "image_url": {"url": format!("data:image/jpeg;base64,{}", image.base64)}
                        }
                    ]
                }]
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::status(status, body));
        }

        let value: Value = response.json().await?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::BadResponse("no message content".to_string()))?;

        parse_completion(content)
            .ok_or_else(|| ProviderError::BadResponse("content is not the expected JSON".to_string()))
    }
}

/// Parse the model's JSON answer into an outcome. Returns None when the
/// content is not the JSON object the prompt asked for.
fn parse_completion(content: &str) -> Option<ScanOutcome> {
    #[derive(Deserialize)]
    struct Completion {
        label: Option<String>,
        explanation: Option<String>,
    }

    let completion: Completion = serde_json::from_str(content.trim()).ok()?;
    let label = ScanLabel::normalize(completion.label.as_deref().unwrap_or_default());
    Some(ScanOutcome::summary(
        label,
        DEEPSEEK_CONFIDENCE,
        completion.explanation,
    ))
}

// =============================================================================
// Self-hosted detection service (already answers in the internal schema)
// =============================================================================

pub struct DetectionServiceProvider {
    client: reqwest::Client,
    url: String,
}

impl DetectionServiceProvider {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    label: String,
    confidence: f32,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    detections: Vec<PredictDetection>,
    #[serde(default)]
    image_width: Option<u32>,
    #[serde(default)]
    image_height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PredictDetection {
    label: String,
    confidence: f32,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    width: f32,
    #[serde(default)]
    height: f32,
}

#[async_trait]
impl ScanProvider for DetectionServiceProvider {
    fn name(&self) -> &'static str {
        "detection"
    }

    async fn scan(&self, image: &ScanImage) -> Result<ScanOutcome, ProviderError> {
        let url = format!("{}/predict", self.url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .json(&json!({"image": image.base64}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::status(status, body));
        }

        let predict: PredictResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(e.to_string()))?;

        let detections = predict
            .detections
            .into_iter()
            .map(|d| Detection {
                label: ScanLabel::normalize(&d.label),
                confidence: d.confidence,
                x: d.x,
                y: d.y,
                width: d.width,
                height: d.height,
            })
            .collect();

        let mut outcome = ScanOutcome::from_detections(detections);
        // Trust the service's own summary when it disagrees (it applies the
        // same post-processing with model-side context).
        outcome.label = ScanLabel::normalize(&predict.label);
        outcome.confidence = predict.confidence;
        outcome.confidence_level =
            nitcheck_core::scan::ConfidenceLevel::from_confidence(predict.confidence);
        outcome.explanation = predict.explanation;
        if let (Some(width), Some(height)) = (predict.image_width, predict.image_height) {
            outcome = outcome.with_dimensions(width, height);
        }
        Ok(outcome)
    }
}
