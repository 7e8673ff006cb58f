//! Tag types and the stateless batch-to-tag conversion.
//!
//! Tags are derived, immutable snapshots: once generated they have no
//! lifecycle beyond the call that produced them.

use crate::source::types::Detection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a generated tag came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagSource {
    Text,
    Image,
    Mixed,
    Pdf,
}

/// A tag derived from a single batch, without temporal context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedTag {
    /// Normalized tag name
    pub name: String,
    /// Ranking score in [0, 1]
    #[serde(rename = "relevanceScore")]
    pub relevance_score: f64,
    /// Origin of the tag
    pub source: TagSource,
}

/// A tag derived from windowed detection aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionTag {
    /// Normalized tag name
    pub name: String,
    /// Ranking score combining mean confidence and observation frequency
    #[serde(rename = "relevanceScore")]
    pub relevance_score: f64,
    /// Origin of the tag (always `image` for detection tags)
    pub source: TagSource,
    /// Mean confidence over the window, omitted when confidence reporting
    /// is disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Numeric class identifier
    pub class_id: u32,
    /// Observations inside the window
    #[serde(rename = "detectionCount")]
    pub detection_count: u32,
    /// First sighting inside the window
    #[serde(rename = "firstDetectedAt")]
    pub first_detected_at: DateTime<Utc>,
    /// Most recent sighting inside the window
    #[serde(rename = "lastDetectedAt")]
    pub last_detected_at: DateTime<Utc>,
}

/// Normalize a model class name into a display tag name.
///
/// Lowercases and replaces underscore/hyphen separators with spaces, so
/// `"traffic_light"` and `"Traffic-Light"` both become `"traffic light"`.
pub fn normalize_tag_name(class_name: &str) -> String {
    class_name
        .to_lowercase()
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect()
}

/// Options for the stateless conversion.
#[derive(Debug, Clone, Copy)]
pub struct ConversionOptions {
    /// Minimum confidence for a detection to participate
    pub min_confidence: f64,
    /// Maximum number of tags returned
    pub max_tags: usize,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            max_tags: 10,
        }
    }
}

/// Convert a single batch of detections to ranked tags.
///
/// Groups the batch by class, averages confidence per class, and returns the
/// top `max_tags` tags sorted by descending score. No temporal memory: every
/// call stands alone.
pub fn detections_to_tags(detections: &[Detection], options: ConversionOptions) -> Vec<GeneratedTag> {
    let mut groups: HashMap<&str, Vec<&Detection>> = HashMap::new();

    for detection in detections {
        if detection.confidence >= options.min_confidence {
            groups
                .entry(detection.class_name.as_str())
                .or_default()
                .push(detection);
        }
    }

    let mut tags: Vec<GeneratedTag> = groups
        .into_iter()
        .map(|(class_name, group)| {
            let avg_confidence =
                group.iter().map(|d| d.confidence).sum::<f64>() / group.len() as f64;
            GeneratedTag {
                name: normalize_tag_name(class_name),
                relevance_score: avg_confidence,
                source: TagSource::Image,
            }
        })
        .collect();

    tags.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| a.name.cmp(&b.name))
    });
    tags.truncate(options.max_tags);
    tags
}
