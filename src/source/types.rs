//! Detection types produced by the vision inference service.
//!
//! A `Detection` is a single object-class observation inside one video frame.
//! Batches arrive as `DetectionResult`s, one per processed frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Area of the box in square pixels.
    pub fn area(&self) -> f64 {
        (self.x2 - self.x1) * (self.y2 - self.y1)
    }

    /// Check whether two boxes overlap significantly (intersection over union).
    pub fn overlaps(&self, other: &BoundingBox, threshold: f64) -> bool {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        if x2 <= x1 || y2 <= y1 {
            return false;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;

        intersection / union > threshold
    }
}

/// A single object-class observation with a confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Bounding box of the detected object; zero-sized when the producer
    /// sends class and confidence only
    #[serde(default)]
    pub bbox: BoundingBox,
    /// Model confidence in [0, 1]
    pub confidence: f64,
    /// Numeric class identifier from the model's label set
    pub class_id: u32,
    /// Human-readable class name (e.g. "traffic_light")
    pub class_name: String,
}

impl Detection {
    pub fn new(class_name: impl Into<String>, class_id: u32, confidence: f64) -> Self {
        Self {
            bbox: BoundingBox::new(0.0, 0.0, 0.0, 0.0),
            confidence,
            class_id,
            class_name: class_name.into(),
        }
    }

    /// Attach a bounding box to the detection.
    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = bbox;
        self
    }
}

/// One inference response: all detections found in a single frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Detections found in the frame
    pub detections: Vec<Detection>,
    /// Number of detections (as reported by the service)
    pub count: usize,
    /// Frame timestamp, if the producer supplied one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Model that produced the detections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    /// Confidence threshold the service applied before responding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
}

impl DetectionResult {
    /// Create a result from a batch of detections.
    pub fn from_detections(detections: Vec<Detection>) -> Self {
        let count = detections.len();
        Self {
            detections,
            count,
            timestamp: Some(Utc::now()),
            model_used: None,
            confidence_threshold: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Drop detections below a confidence threshold.
pub fn filter_by_confidence(detections: &[Detection], threshold: f64) -> Vec<Detection> {
    detections
        .iter()
        .filter(|d| d.confidence >= threshold)
        .cloned()
        .collect()
}

/// Overlap threshold above which two same-class boxes count as duplicates.
const DEDUPE_OVERLAP_THRESHOLD: f64 = 0.5;

/// Collapse duplicate boxes of the same class within one batch.
///
/// Inference services occasionally emit near-identical boxes for the same
/// object; keeping them all would inflate per-class counts. The highest
/// confidence detection of each overlapping group survives.
pub fn dedupe_overlapping(detections: &[Detection]) -> Vec<Detection> {
    let mut sorted: Vec<Detection> = detections.to_vec();
    sorted.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(sorted.len());
    for candidate in sorted {
        let duplicate = kept.iter().any(|k| {
            k.class_name == candidate.class_name
                && k.bbox.overlaps(&candidate.bbox, DEDUPE_OVERLAP_THRESHOLD)
        });
        if !duplicate {
            kept.push(candidate);
        }
    }

    kept
}

/// Batch hygiene applied on every ingest path before aggregation:
/// confidence filter followed by same-class overlap dedupe.
pub fn clean_batch(detections: &[Detection], min_confidence: f64) -> Vec<Detection> {
    dedupe_overlapping(&filter_by_confidence(detections, min_confidence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_area() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 5.0);
        assert_eq!(bbox.area(), 50.0);
    }

    #[test]
    fn test_bbox_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(1.0, 1.0, 11.0, 11.0);
        let c = BoundingBox::new(50.0, 50.0, 60.0, 60.0);

        assert!(a.overlaps(&b, 0.5));
        assert!(!a.overlaps(&c, 0.5));
    }

    #[test]
    fn test_disjoint_boxes_do_not_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(10.0, 0.0, 20.0, 10.0);
        // Touching edges: zero intersection area.
        assert!(!a.overlaps(&b, 0.0));
    }

    #[test]
    fn test_filter_by_confidence() {
        let detections = vec![
            Detection::new("cat", 15, 0.9),
            Detection::new("dog", 16, 0.4),
        ];
        let filtered = filter_by_confidence(&detections, 0.6);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].class_name, "cat");
    }

    #[test]
    fn test_dedupe_keeps_highest_confidence() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let detections = vec![
            Detection::new("cat", 15, 0.7).with_bbox(bbox),
            Detection::new("cat", 15, 0.9).with_bbox(BoundingBox::new(0.5, 0.5, 10.5, 10.5)),
        ];

        let deduped = dedupe_overlapping(&detections);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].confidence, 0.9);
    }

    #[test]
    fn test_dedupe_preserves_distinct_classes() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let detections = vec![
            Detection::new("cat", 15, 0.7).with_bbox(bbox),
            Detection::new("dog", 16, 0.7).with_bbox(bbox),
        ];

        assert_eq!(dedupe_overlapping(&detections).len(), 2);
    }

    #[test]
    fn test_clean_batch_filters_then_dedupes() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let detections = vec![
            // Duplicate cats on the same box, one sub-threshold bird.
            Detection::new("cat", 15, 0.7).with_bbox(bbox),
            Detection::new("cat", 15, 0.9).with_bbox(BoundingBox::new(0.5, 0.5, 10.5, 10.5)),
            Detection::new("bird", 14, 0.4).with_bbox(bbox),
            Detection::new("dog", 16, 0.8).with_bbox(bbox),
        ];

        let cleaned = clean_batch(&detections, 0.6);
        assert_eq!(cleaned.len(), 2);
        assert!(cleaned.iter().any(|d| d.class_name == "cat" && d.confidence == 0.9));
        assert!(cleaned.iter().any(|d| d.class_name == "dog"));
    }

    #[test]
    fn test_detection_result_count() {
        let result = DetectionResult::from_detections(vec![Detection::new("person", 0, 0.8)]);
        assert_eq!(result.count, 1);
        assert!(!result.is_empty());
    }
}
