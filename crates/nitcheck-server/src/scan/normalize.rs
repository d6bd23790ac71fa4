//! Normalization of vision-provider detection responses.
//!
//! The inference API answers in several shapes depending on how the model is
//! deployed (serverless workflow, hosted model, older detect endpoints), and
//! none of them are formally documented. This module maps all of them onto
//! the internal detection schema:
//!
//! 1. workflow: `outputs[*].predictions.predictions[*]`
//! 2. detect:   `predictions[*]` at the top level
//! 3. hosted:   `predictions.predictions[*]`
//! 4. anything else: a bounded recursive sweep collecting every object that
//!    looks like a prediction (a confidence plus a class name or box).
//!
//! Workflow responses frequently mirror the same prediction array under more
//! than one key, so parsed detections are deduplicated before the summary is
//! derived.

use nitcheck_core::scan::{Detection, ScanLabel};
use serde_json::Value;

/// Recursion guard for the generic sweep. Provider responses are shallow;
/// anything deeper than this is not a shape we want to chase.
const MAX_SCAN_DEPTH: usize = 8;

/// Detections plus the source-image dimensions, when the provider reports
/// them.
#[derive(Debug, Default)]
pub struct NormalizedDetections {
    pub detections: Vec<Detection>,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
}

/// Map a raw provider response onto the internal detection schema.
///
/// Predictions below `min_confidence` and predictions whose class normalizes
/// to `clear` are dropped. The result is sorted by confidence descending.
pub fn normalize_response(value: &Value, min_confidence: f32) -> NormalizedDetections {
    let mut raw: Vec<&Value> = Vec::new();

    collect_known_shapes(value, &mut raw);
    if raw.is_empty() {
        collect_recursive(value, &mut raw, 0);
    }

    let mut detections: Vec<Detection> = Vec::new();
    for prediction in raw {
        let Some(detection) = parse_prediction(prediction) else {
            continue;
        };
        if detection.confidence < min_confidence {
            continue;
        }
        if detection.label == ScanLabel::Clear {
            continue;
        }
        if !detections.iter().any(|seen| is_duplicate(seen, &detection)) {
            detections.push(detection);
        }
    }

    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let (image_width, image_height) = find_image_dimensions(value, 0);

    NormalizedDetections {
        detections,
        image_width,
        image_height,
    }
}

/// The response shapes we have actually observed, tried most-specific first.
fn collect_known_shapes<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    // workflow: outputs[*].predictions.predictions[*] (or outputs[*].predictions[*])
    if let Some(outputs) = value.get("outputs").and_then(Value::as_array) {
        for output in outputs {
            if let Some(block) = output.get("predictions") {
                collect_prediction_array(block, out);
            }
        }
    }

    // detect / hosted: top-level predictions (flat array or nested once more)
    if let Some(block) = value.get("predictions") {
        collect_prediction_array(block, out);
    }
}

/// `block` is either a prediction array itself or an object wrapping one
/// under another `predictions` key.
fn collect_prediction_array<'a>(block: &'a Value, out: &mut Vec<&'a Value>) {
    match block {
        Value::Array(items) => out.extend(items.iter().filter(|v| looks_like_prediction(v))),
        Value::Object(_) => {
            if let Some(Value::Array(items)) = block.get("predictions") {
                out.extend(items.iter().filter(|v| looks_like_prediction(v)));
            }
        }
        _ => {}
    }
}

/// Generic sweep: walk the whole value collecting prediction-shaped objects
/// wherever they sit.
fn collect_recursive<'a>(value: &'a Value, out: &mut Vec<&'a Value>, depth: usize) {
    if depth > MAX_SCAN_DEPTH {
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                if looks_like_prediction(item) {
                    out.push(item);
                } else {
                    collect_recursive(item, out, depth + 1);
                }
            }
        }
        Value::Object(map) => {
            for child in map.values() {
                collect_recursive(child, out, depth + 1);
            }
        }
        _ => {}
    }
}

/// A prediction carries a confidence and either a class name or a box.
fn looks_like_prediction(value: &Value) -> bool {
    let Value::Object(map) = value else {
        return false;
    };
    let has_confidence = map
        .get("confidence")
        .or_else(|| map.get("score"))
        .map(|v| v.is_number())
        .unwrap_or(false);
    if !has_confidence {
        return false;
    }
    let has_class = ["class", "label", "class_name"]
        .iter()
        .any(|key| map.get(*key).map(|v| v.is_string()).unwrap_or(false));
    let has_box = map.get("x").map(Value::is_number).unwrap_or(false)
        && map.get("y").map(Value::is_number).unwrap_or(false);
    has_class || has_box
}

fn parse_prediction(value: &Value) -> Option<Detection> {
    let confidence = value
        .get("confidence")
        .or_else(|| value.get("score"))
        .and_then(Value::as_f64)?;

    let class = ["class", "label", "class_name"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .unwrap_or("");

    Some(Detection {
        label: ScanLabel::normalize(class),
        confidence: clamp_confidence(confidence),
        x: number_field(value, "x"),
        y: number_field(value, "y"),
        width: number_field(value, "width"),
        height: number_field(value, "height"),
    })
}

/// Some deployments report confidence as a percentage; anything above 1.0 is
/// treated as one.
fn clamp_confidence(raw: f64) -> f32 {
    let scaled = if raw > 1.0 { raw / 100.0 } else { raw };
    scaled.clamp(0.0, 1.0) as f32
}

fn number_field(value: &Value, key: &str) -> f32 {
    value.get(key).and_then(Value::as_f64).unwrap_or(0.0) as f32
}

/// Mirrored prediction arrays yield boxes that agree to well under a pixel.
fn is_duplicate(a: &Detection, b: &Detection) -> bool {
    a.label == b.label
        && (a.x - b.x).abs() < 1.0
        && (a.y - b.y).abs() < 1.0
        && (a.width - b.width).abs() < 1.0
        && (a.height - b.height).abs() < 1.0
}

/// Find the first `image` object carrying numeric width/height.
fn find_image_dimensions(value: &Value, depth: usize) -> (Option<u32>, Option<u32>) {
    if depth > MAX_SCAN_DEPTH {
        return (None, None);
    }
    if let Some(image) = value.get("image")
        && let (Some(width), Some(height)) = (
            image.get("width").and_then(Value::as_u64),
            image.get("height").and_then(Value::as_u64),
        )
    {
        return (Some(width as u32), Some(height as u32));
    }
    match value {
        Value::Object(map) => {
            for child in map.values() {
                let found = find_image_dimensions(child, depth + 1);
                if found.0.is_some() {
                    return found;
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                let found = find_image_dimensions(item, depth + 1);
                if found.0.is_some() {
                    return found;
                }
            }
        }
        _ => {}
    }
    (None, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MIN_CONFIDENCE: f32 = 0.25;

    #[test]
    fn workflow_shape_is_normalized() {
        let response = json!({
            "outputs": [{
                "predictions": {
                    "image": {"width": 1024, "height": 768},
                    "predictions": [
                        {"class": "lice", "confidence": 0.91, "x": 100.0, "y": 120.0, "width": 32.0, "height": 24.0},
                        {"class": "nit", "confidence": 0.48, "x": 300.0, "y": 80.0, "width": 10.0, "height": 8.0}
                    ]
                }
            }]
        });

        let normalized = normalize_response(&response, MIN_CONFIDENCE);
        assert_eq!(normalized.detections.len(), 2);
        assert_eq!(normalized.detections[0].label, ScanLabel::Lice);
        assert_eq!(normalized.detections[1].label, ScanLabel::Nits);
        assert_eq!(normalized.image_width, Some(1024));
        assert_eq!(normalized.image_height, Some(768));
    }

    #[test]
    fn flat_detect_shape_is_normalized() {
        let response = json!({
            "predictions": [
                {"class": "dandruff", "confidence": 0.7, "x": 10.0, "y": 10.0, "width": 5.0, "height": 5.0}
            ],
            "image": {"width": 640, "height": 480}
        });

        let normalized = normalize_response(&response, MIN_CONFIDENCE);
        assert_eq!(normalized.detections.len(), 1);
        assert_eq!(normalized.detections[0].label, ScanLabel::Dandruff);
        assert_eq!(normalized.image_width, Some(640));
    }

    #[test]
    fn nested_hosted_shape_is_normalized() {
        let response = json!({
            "predictions": {
                "predictions": [
                    {"label": "head lice", "confidence": 0.55, "x": 1.0, "y": 2.0, "width": 3.0, "height": 4.0}
                ]
            }
        });

        let normalized = normalize_response(&response, MIN_CONFIDENCE);
        assert_eq!(normalized.detections.len(), 1);
        assert_eq!(normalized.detections[0].label, ScanLabel::Lice);
    }

    #[test]
    fn unknown_shape_falls_back_to_recursive_sweep() {
        let response = json!({
            "result": {
                "frames": [{
                    "boxes": [
                        {"class_name": "nits", "score": 0.8, "x": 5.0, "y": 5.0, "width": 2.0, "height": 2.0}
                    ]
                }]
            }
        });

        let normalized = normalize_response(&response, MIN_CONFIDENCE);
        assert_eq!(normalized.detections.len(), 1);
        assert_eq!(normalized.detections[0].label, ScanLabel::Nits);
        assert_eq!(normalized.detections[0].confidence, 0.8);
    }

    #[test]
    fn mirrored_arrays_are_deduplicated() {
        let prediction = json!(
            {"class": "lice", "confidence": 0.9, "x": 50.0, "y": 60.0, "width": 20.0, "height": 18.0}
        );
        let response = json!({
            "predictions": [prediction.clone()],
            "outputs": [{"predictions": {"predictions": [prediction]}}]
        });

        let normalized = normalize_response(&response, MIN_CONFIDENCE);
        assert_eq!(normalized.detections.len(), 1);
    }

    #[test]
    fn nearby_boxes_of_different_labels_are_kept() {
        let response = json!({
            "predictions": [
                {"class": "lice", "confidence": 0.9, "x": 50.0, "y": 60.0, "width": 20.0, "height": 18.0},
                {"class": "nits", "confidence": 0.9, "x": 50.2, "y": 60.1, "width": 20.0, "height": 18.0}
            ]
        });

        let normalized = normalize_response(&response, MIN_CONFIDENCE);
        assert_eq!(normalized.detections.len(), 2);
    }

    #[test]
    fn percentage_confidences_are_scaled() {
        let response = json!({
            "predictions": [
                {"class": "lice", "confidence": 91.0, "x": 1.0, "y": 1.0, "width": 1.0, "height": 1.0}
            ]
        });

        let normalized = normalize_response(&response, MIN_CONFIDENCE);
        assert_eq!(normalized.detections.len(), 1);
        assert!((normalized.detections[0].confidence - 0.91).abs() < 1e-6);
    }

    #[test]
    fn low_confidence_and_unknown_classes_are_dropped() {
        let response = json!({
            "predictions": [
                {"class": "lice", "confidence": 0.1, "x": 1.0, "y": 1.0, "width": 1.0, "height": 1.0},
                {"class": "background", "confidence": 0.99, "x": 2.0, "y": 2.0, "width": 1.0, "height": 1.0},
                {"class": "nits", "confidence": 0.6, "x": 3.0, "y": 3.0, "width": 1.0, "height": 1.0}
            ]
        });

        let normalized = normalize_response(&response, MIN_CONFIDENCE);
        assert_eq!(normalized.detections.len(), 1);
        assert_eq!(normalized.detections[0].label, ScanLabel::Nits);
    }

    #[test]
    fn detections_are_sorted_by_confidence() {
        let response = json!({
            "predictions": [
                {"class": "nits", "confidence": 0.5, "x": 1.0, "y": 1.0, "width": 1.0, "height": 1.0},
                {"class": "lice", "confidence": 0.95, "x": 2.0, "y": 2.0, "width": 1.0, "height": 1.0},
                {"class": "dandruff", "confidence": 0.7, "x": 3.0, "y": 3.0, "width": 1.0, "height": 1.0}
            ]
        });

        let confidences: Vec<f32> = normalize_response(&response, MIN_CONFIDENCE)
            .detections
            .iter()
            .map(|d| d.confidence)
            .collect();
        assert_eq!(confidences, vec![0.95, 0.7, 0.5]);
    }

    #[test]
    fn boxless_classification_predictions_still_count() {
        let response = json!({
            "predictions": [
                {"class": "lice", "confidence": 0.85}
            ]
        });

        let normalized = normalize_response(&response, MIN_CONFIDENCE);
        assert_eq!(normalized.detections.len(), 1);
        assert_eq!(normalized.detections[0].width, 0.0);
    }

    #[test]
    fn empty_and_irrelevant_responses_produce_no_detections() {
        assert!(normalize_response(&json!({}), MIN_CONFIDENCE).detections.is_empty());
        assert!(
            normalize_response(&json!({"predictions": []}), MIN_CONFIDENCE)
                .detections
                .is_empty()
        );
        assert!(
            normalize_response(&json!({"status": "ok", "time": 0.2}), MIN_CONFIDENCE)
                .detections
                .is_empty()
        );
        assert!(normalize_response(&json!(null), MIN_CONFIDENCE).detections.is_empty());
    }
}
