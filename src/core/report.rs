//! Tag report builder.
//!
//! A `TagReport` is the exported artifact of the pipeline: the ranked tags
//! for the current aggregation window together with aggregate statistics,
//! producer metadata, and a quality grade. Reports are immutable snapshots,
//! serialized to JSON for export and for the `/tags` endpoint.

use crate::core::aggregator::{AggregatorStats, DetectionAggregator};
use crate::core::tags::DetectionTag;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::HashMap;
use uuid::Uuid;

/// The current report schema version.
pub const REPORT_VERSION: &str = "1.0";

/// The name of this producer.
pub const PRODUCER_NAME: &str = "vision-tag-agent";

/// Producer metadata attached to every report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProducer {
    /// Name of the producing software
    pub name: String,
    /// Version of the producing software
    pub version: String,
    /// Unique instance identifier (UUID)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

/// Mean and spread of the confidences behind the reported tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceSpread {
    pub mean: f64,
    pub std_dev: f64,
}

/// Snapshot of the aggregate state and its ranked tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagReport {
    /// Report schema version (must be "1.0")
    pub report_version: String,
    /// When the tags were observed (RFC3339)
    pub observed_at_utc: String,
    /// When this report was computed (RFC3339)
    pub computed_at_utc: String,
    /// Producer metadata
    pub producer: ReportProducer,
    /// Ranked tags for the current window
    pub tags: Vec<DetectionTag>,
    /// Aggregate statistics at report time
    pub stats: AggregatorStats,
    /// Data quality grade in [0, 1], based on how much the window saw
    pub quality: f64,
    /// Whether the window saw too little data to trust the ranking
    pub degraded: bool,
    /// Spread of tag confidences, when confidences are reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_spread: Option<ConfidenceSpread>,
    /// Additional metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<HashMap<String, serde_json::Value>>,
}

/// Builder for tag reports, carrying a per-process instance identity.
pub struct ReportBuilder {
    instance_id: Uuid,
    session_id: Option<String>,
}

impl ReportBuilder {
    /// Create a new report builder with a unique instance ID.
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            session_id: None,
        }
    }

    /// Set the session ID for generated reports.
    pub fn with_session_id(mut self, session_id: String) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Get the instance ID.
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Build a report from the aggregator's current state.
    pub fn build(&self, aggregator: &DetectionAggregator) -> TagReport {
        let computed_at = Utc::now();
        let stats = aggregator.stats();
        let tags = aggregator.generate_tags();

        // Grade quality by how much evidence the window holds.
        let quality = match stats.total_detections {
            0 => 0.0,
            1..=9 => 0.5,
            10..=49 => 0.75,
            _ => 0.95,
        };

        let confidence_spread = spread_of(&tags);

        let mut meta = HashMap::new();
        meta.insert(
            "timezone".to_string(),
            serde_json::Value::String(chrono_tz::Tz::UTC.to_string()),
        );
        meta.insert(
            "tag_count".to_string(),
            serde_json::Value::Number(serde_json::Number::from(tags.len())),
        );
        meta.insert(
            "min_confidence".to_string(),
            serde_json::Value::Number(
                serde_json::Number::from_f64(aggregator.options().min_confidence)
                    .unwrap_or(serde_json::Number::from(0)),
            ),
        );
        meta.insert(
            "aggregation_window_ms".to_string(),
            serde_json::Value::Number(serde_json::Number::from(
                aggregator.options().aggregation_window_ms,
            )),
        );
        if let Some(ref session_id) = self.session_id {
            meta.insert(
                "session_id".to_string(),
                serde_json::Value::String(session_id.clone()),
            );
        }

        // observed_at is the newest sighting across tags; falls back to now
        // for an empty window.
        let observed_at = tags
            .iter()
            .map(|t| t.last_detected_at)
            .max()
            .unwrap_or(computed_at);

        TagReport {
            report_version: REPORT_VERSION.to_string(),
            observed_at_utc: observed_at.to_rfc3339(),
            computed_at_utc: computed_at.to_rfc3339(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                instance_id: Some(self.instance_id.to_string()),
            },
            tags,
            quality,
            degraded: stats.total_detections < 10,
            stats,
            confidence_spread,
            meta: Some(meta),
        }
    }

    /// Build and serialize a report to JSON.
    pub fn build_json(&self, aggregator: &DetectionAggregator) -> String {
        let report = self.build(aggregator);
        serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Mean and standard deviation of the reported tag confidences.
fn spread_of(tags: &[DetectionTag]) -> Option<ConfidenceSpread> {
    let confidences: Vec<f64> = tags.iter().filter_map(|t| t.confidence).collect();
    if confidences.is_empty() {
        return None;
    }

    let mean = confidences.iter().mean();
    let std_dev = if confidences.len() < 2 {
        0.0
    } else {
        confidences.iter().std_dev()
    };

    Some(ConfidenceSpread { mean, std_dev })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::types::Detection;

    fn loaded_aggregator() -> DetectionAggregator {
        let mut agg = DetectionAggregator::default();
        let batch: Vec<Detection> = (0..4).map(|_| Detection::new("cat", 15, 0.8)).collect();
        agg.add_detections(&batch);
        agg
    }

    #[test]
    fn test_report_builder_instance_id() {
        let builder1 = ReportBuilder::new();
        let builder2 = ReportBuilder::new();
        assert_ne!(builder1.instance_id(), builder2.instance_id());
    }

    #[test]
    fn test_report_structure() {
        let builder = ReportBuilder::new().with_session_id("SESS-1".to_string());
        let report = builder.build(&loaded_aggregator());

        assert_eq!(report.report_version, REPORT_VERSION);
        assert_eq!(report.producer.name, PRODUCER_NAME);
        assert!(!report.observed_at_utc.is_empty());
        assert!(!report.computed_at_utc.is_empty());
        assert_eq!(report.tags.len(), 1);
        assert_eq!(report.stats.total_detections, 4);

        let meta = report.meta.as_ref().unwrap();
        assert_eq!(meta["session_id"], "SESS-1");
        assert_eq!(meta["timezone"], "UTC");
    }

    #[test]
    fn test_empty_window_is_degraded() {
        let builder = ReportBuilder::new();
        let report = builder.build(&DetectionAggregator::default());

        assert_eq!(report.quality, 0.0);
        assert!(report.degraded);
        assert!(report.tags.is_empty());
        assert!(report.confidence_spread.is_none());
    }

    #[test]
    fn test_confidence_spread() {
        let mut agg = DetectionAggregator::default();
        agg.add_detections(&[
            Detection::new("cat", 15, 0.8),
            Detection::new("cat", 15, 0.8),
            Detection::new("cat", 15, 0.8),
            Detection::new("dog", 16, 0.6),
            Detection::new("dog", 16, 0.6),
            Detection::new("dog", 16, 0.6),
        ]);

        let report = ReportBuilder::new().build(&agg);
        let spread = report.confidence_spread.unwrap();
        assert!((spread.mean - 0.7).abs() < 1e-9);
        assert!(spread.std_dev > 0.0);
    }

    #[test]
    fn test_report_json_serialization() {
        let builder = ReportBuilder::new();
        let json = builder.build_json(&loaded_aggregator());

        assert!(json.contains("report_version"));
        assert!(json.contains("observed_at_utc"));
        assert!(json.contains("computed_at_utc"));
        assert!(json.contains("producer"));
        assert!(json.contains("relevanceScore"));
        assert!(json.contains("activeClasses"));
    }
}
