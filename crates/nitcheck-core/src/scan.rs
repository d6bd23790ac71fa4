//! Scan result model: labels, detections, and the confidence tiering shared
//! by every scan provider.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classification labels a scan can produce.
///
/// `Clear` doubles as the "nothing recognizable" bucket: any provider class
/// name that does not map onto a known label normalizes to `Clear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanLabel {
    Lice,
    Nits,
    Dandruff,
    Psoriasis,
    Clear,
}

impl ScanLabel {
    /// Map a raw provider class name onto a label.
    ///
    /// Providers disagree on naming ("nit" vs "nits", "head lice" vs "lice"),
    /// so matching is case- and whitespace-insensitive and carries a synonym
    /// table. Unknown names fall back to `Clear` rather than erroring: a
    /// misnamed class must never turn into a scary result.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lice" => Self::Lice,
            "nits" => Self::Nits,
            "dandruff" => Self::Dandruff,
            "psoriasis" => Self::Psoriasis,
            "clear" => Self::Clear,
            "nit" | "egg" | "eggs" => Self::Nits,
            "head lice" | "louse" | "lice detected" => Self::Lice,
            "flake" | "flakes" | "dry scalp" | "dry skin" => Self::Dandruff,
            _ => Self::Clear,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lice => "lice",
            Self::Nits => "nits",
            Self::Dandruff => "dandruff",
            Self::Psoriasis => "psoriasis",
            Self::Clear => "clear",
        }
    }

    /// Labels that should surface the clinic CTA and contact form.
    pub fn needs_clinic(&self) -> bool {
        matches!(self, Self::Lice | Self::Nits)
    }
}

impl fmt::Display for ScanLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ScanLabel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::normalize(s))
    }
}

/// User-facing confidence tier derived from the raw score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    /// Tier thresholds: >= 0.80 high, >= 0.50 medium, otherwise low.
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence >= 0.80 {
            Self::High
        } else if confidence >= 0.50 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single bounding-box prediction in source-image pixel coordinates.
///
/// `x`/`y` are the box centre, matching the detection service contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: ScanLabel,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// The normalized result returned to the client for one uploaded photo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub label: ScanLabel,
    pub confidence: f32,
    pub confidence_level: ConfidenceLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detections: Vec<Detection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_height: Option<u32>,
}

impl ScanOutcome {
    /// The canonical "no findings" result.
    pub fn clear() -> Self {
        Self {
            label: ScanLabel::Clear,
            confidence: 0.0,
            confidence_level: ConfidenceLevel::Low,
            explanation: None,
            detections: Vec::new(),
            image_width: None,
            image_height: None,
        }
    }

    /// Build an outcome from a set of detections.
    ///
    /// Detections are sorted by confidence descending; the summary label and
    /// confidence come from the top box. No detections means `Clear`.
    pub fn from_detections(mut detections: Vec<Detection>) -> Self {
        detections.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        match detections.first() {
            Some(top) => Self {
                label: top.label,
                confidence: top.confidence,
                confidence_level: ConfidenceLevel::from_confidence(top.confidence),
                explanation: None,
                detections,
                image_width: None,
                image_height: None,
            },
            None => Self::clear(),
        }
    }

    /// Build a summary-only outcome (vision-LLM providers return no boxes).
    pub fn summary(label: ScanLabel, confidence: f32, explanation: Option<String>) -> Self {
        Self {
            label,
            confidence,
            confidence_level: ConfidenceLevel::from_confidence(confidence),
            explanation,
            detections: Vec::new(),
            image_width: None,
            image_height: None,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.image_width = Some(width);
        self.image_height = Some(height);
        self
    }

    /// Cap the confidence tier at Low for weak source images.
    pub fn cap_confidence_level(mut self) -> Self {
        self.confidence_level = ConfidenceLevel::Low;
        self
    }
}
