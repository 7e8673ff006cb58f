//! Time-windowed detection aggregation.
//!
//! The aggregator keeps a bounded-recency view of recently observed object
//! classes: each class maps to the raw detections seen inside the current
//! aggregation window, plus first/last-seen timestamps and a running count.
//! Entries idle past the window are evicted on every insert. Ranked tags are
//! synthesized on demand and never mutate the aggregate state.

use crate::core::tags::{normalize_tag_name, DetectionTag, TagSource};
use crate::source::types::Detection;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tuning knobs for aggregation and tag synthesis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AggregatorOptions {
    /// Detections below this confidence are silently ignored
    pub min_confidence: f64,
    /// Classes seen fewer times than this produce no tag
    pub min_detection_count: u32,
    /// Maximum number of tags returned by `generate_tags`
    pub max_tags: usize,
    /// Whether generated tags carry their mean confidence
    pub include_confidence: bool,
    /// How long an idle class stays in the aggregate, in milliseconds
    pub aggregation_window_ms: i64,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            min_detection_count: 3,
            max_tags: 10,
            include_confidence: true,
            aggregation_window_ms: 5000,
        }
    }
}

/// Aggregate state for one object class.
#[derive(Debug, Clone)]
struct ClassHistory {
    /// Raw detections seen inside the current window
    detections: Vec<Detection>,
    /// First sighting
    first_seen: DateTime<Utc>,
    /// Most recent sighting
    last_seen: DateTime<Utc>,
    /// Running observation count
    count: u32,
}

/// Point-in-time view of the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorStats {
    /// Sum of per-class observation counts
    #[serde(rename = "totalDetections")]
    pub total_detections: u64,
    /// Number of distinct classes currently tracked
    #[serde(rename = "uniqueClasses")]
    pub unique_classes: usize,
    /// Names of the tracked classes, sorted
    #[serde(rename = "activeClasses")]
    pub active_classes: Vec<String>,
}

/// Aggregates detections over time and converts them to ranked tags.
pub struct DetectionAggregator {
    history: HashMap<String, ClassHistory>,
    options: AggregatorOptions,
}

impl DetectionAggregator {
    /// Create an aggregator with the given options.
    pub fn new(options: AggregatorOptions) -> Self {
        Self {
            history: HashMap::new(),
            options,
        }
    }

    /// Get the options this aggregator was built with.
    pub fn options(&self) -> &AggregatorOptions {
        &self.options
    }

    /// Add a batch of detections, stamped with the current time.
    pub fn add_detections(&mut self, detections: &[Detection]) {
        self.add_detections_at(detections, Utc::now());
    }

    /// Add a batch of detections with an explicit observation time.
    ///
    /// Sub-threshold detections are skipped. After insertion, every class
    /// whose last sighting is older than the aggregation window is evicted.
    pub fn add_detections_at(&mut self, detections: &[Detection], now: DateTime<Utc>) {
        for detection in detections {
            if detection.confidence < self.options.min_confidence {
                continue;
            }

            match self.history.get_mut(&detection.class_name) {
                Some(entry) => {
                    entry.detections.push(detection.clone());
                    entry.last_seen = now;
                    entry.count += 1;
                }
                None => {
                    self.history.insert(
                        detection.class_name.clone(),
                        ClassHistory {
                            detections: vec![detection.clone()],
                            first_seen: now,
                            last_seen: now,
                            count: 1,
                        },
                    );
                }
            }
        }

        self.evict_idle(now);
    }

    /// Drop classes whose last sighting is older than the aggregation window.
    fn evict_idle(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::milliseconds(self.options.aggregation_window_ms);
        self.history.retain(|_, entry| entry.last_seen >= cutoff);
    }

    /// Generate ranked tags from the current aggregate state.
    ///
    /// Classes with fewer than `min_detection_count` observations are
    /// skipped. Relevance is `min(1, (avg_confidence + count/10) / 2)`,
    /// so a class seen often ranks above one seen rarely at equal
    /// confidence. Pure: the aggregate is left untouched.
    pub fn generate_tags(&self) -> Vec<DetectionTag> {
        let mut tags: Vec<DetectionTag> = self
            .history
            .iter()
            .filter(|(_, entry)| entry.count >= self.options.min_detection_count)
            .map(|(class_name, entry)| {
                let avg_confidence = entry
                    .detections
                    .iter()
                    .map(|d| d.confidence)
                    .sum::<f64>()
                    / entry.detections.len() as f64;

                let relevance_score =
                    (1.0_f64).min((avg_confidence + f64::from(entry.count) / 10.0) / 2.0);

                DetectionTag {
                    name: normalize_tag_name(class_name),
                    relevance_score,
                    source: TagSource::Image,
                    confidence: self.options.include_confidence.then_some(avg_confidence),
                    class_id: entry.detections[0].class_id,
                    detection_count: entry.count,
                    first_detected_at: entry.first_seen,
                    last_detected_at: entry.last_seen,
                }
            })
            .collect();

        tags.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then_with(|| a.name.cmp(&b.name))
        });
        tags.truncate(self.options.max_tags);
        tags
    }

    /// Get current detection statistics.
    pub fn stats(&self) -> AggregatorStats {
        let total_detections = self.history.values().map(|e| u64::from(e.count)).sum();
        let mut active_classes: Vec<String> = self.history.keys().cloned().collect();
        active_classes.sort();

        AggregatorStats {
            total_detections,
            unique_classes: self.history.len(),
            active_classes,
        }
    }

    /// Check whether anything is currently tracked.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Clear all detection history.
    pub fn clear(&mut self) {
        self.history.clear();
    }
}

impl Default for DetectionAggregator {
    fn default() -> Self {
        Self::new(AggregatorOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(class: &str, confidences: &[f64]) -> Vec<Detection> {
        confidences
            .iter()
            .map(|&c| Detection::new(class, 15, c))
            .collect()
    }

    #[test]
    fn test_sub_threshold_detections_ignored() {
        let mut agg = DetectionAggregator::default();
        agg.add_detections(&batch("cat", &[0.3, 0.59]));

        let stats = agg.stats();
        assert_eq!(stats.total_detections, 0);
        assert_eq!(stats.unique_classes, 0);
        assert!(stats.active_classes.is_empty());
    }

    #[test]
    fn test_average_confidence_is_arithmetic_mean() {
        let mut agg = DetectionAggregator::default();
        agg.add_detections(&batch("cat", &[0.7, 0.8, 0.65, 0.9]));

        let tags = agg.generate_tags();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "cat");
        assert!((tags[0].confidence.unwrap() - 0.7625).abs() < 1e-9);
        assert_eq!(tags[0].detection_count, 4);
    }

    #[test]
    fn test_relevance_score_formula() {
        let mut agg = DetectionAggregator::default();
        agg.add_detections(&batch("cat", &[0.8, 0.8, 0.8]));

        let tags = agg.generate_tags();
        // (0.8 + 3/10) / 2 = 0.55
        assert!((tags[0].relevance_score - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_relevance_score_caps_at_one() {
        let mut agg = DetectionAggregator::default();
        let detections = batch("cat", &[1.0; 15]);
        agg.add_detections(&detections);

        let tags = agg.generate_tags();
        // (1.0 + 15/10) / 2 = 1.25, capped
        assert_eq!(tags[0].relevance_score, 1.0);
    }

    #[test]
    fn test_min_detection_count_filter() {
        let mut agg = DetectionAggregator::default();
        agg.add_detections(&batch("cat", &[0.9, 0.9]));

        // Two sightings, threshold is three.
        assert!(agg.generate_tags().is_empty());

        agg.add_detections(&batch("cat", &[0.9]));
        assert_eq!(agg.generate_tags().len(), 1);
    }

    #[test]
    fn test_idle_classes_evicted_after_window() {
        let mut agg = DetectionAggregator::default();
        let t0 = Utc::now();

        agg.add_detections_at(&batch("cat", &[0.9]), t0);
        agg.add_detections_at(&batch("dog", &[0.9]), t0 + Duration::milliseconds(6000));

        let stats = agg.stats();
        assert_eq!(stats.active_classes, vec!["dog".to_string()]);
        assert_eq!(stats.unique_classes, 1);
    }

    #[test]
    fn test_recent_classes_survive_eviction() {
        let mut agg = DetectionAggregator::default();
        let t0 = Utc::now();

        agg.add_detections_at(&batch("cat", &[0.9]), t0);
        agg.add_detections_at(&batch("cat", &[0.9]), t0 + Duration::milliseconds(3000));
        agg.add_detections_at(&batch("dog", &[0.9]), t0 + Duration::milliseconds(6000));

        // cat's last sighting is 3s before dog's batch, inside the 5s window.
        let stats = agg.stats();
        assert_eq!(
            stats.active_classes,
            vec!["cat".to_string(), "dog".to_string()]
        );
        assert_eq!(stats.total_detections, 3);
    }

    #[test]
    fn test_generate_tags_sorted_and_bounded() {
        let options = AggregatorOptions {
            min_detection_count: 1,
            max_tags: 3,
            ..AggregatorOptions::default()
        };
        let mut agg = DetectionAggregator::new(options);

        let now = Utc::now();
        for (i, conf) in [0.65, 0.95, 0.7, 0.9, 0.8].iter().enumerate() {
            agg.add_detections_at(
                &[Detection::new(format!("class_{i}"), i as u32, *conf)],
                now,
            );
        }

        let tags = agg.generate_tags();
        assert_eq!(tags.len(), 3);
        for pair in tags.windows(2) {
            assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
    }

    #[test]
    fn test_clear_resets_stats() {
        let mut agg = DetectionAggregator::default();
        agg.add_detections(&batch("cat", &[0.9, 0.9, 0.9]));
        agg.clear();

        let stats = agg.stats();
        assert_eq!(
            stats,
            AggregatorStats {
                total_detections: 0,
                unique_classes: 0,
                active_classes: vec![],
            }
        );
        assert!(agg.is_empty());
    }

    #[test]
    fn test_include_confidence_disabled() {
        let options = AggregatorOptions {
            include_confidence: false,
            ..AggregatorOptions::default()
        };
        let mut agg = DetectionAggregator::new(options);
        agg.add_detections(&batch("cat", &[0.9, 0.9, 0.9]));

        let tags = agg.generate_tags();
        assert!(tags[0].confidence.is_none());
        // Relevance still uses the mean internally: (0.9 + 0.3) / 2
        assert!((tags[0].relevance_score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_tag_name_normalized() {
        let mut agg = DetectionAggregator::default();
        agg.add_detections(&batch("Traffic_Light", &[0.9, 0.9, 0.9]));

        let tags = agg.generate_tags();
        assert_eq!(tags[0].name, "traffic light");
        // Stats keep the raw class name as the key.
        assert_eq!(agg.stats().active_classes, vec!["Traffic_Light".to_string()]);
    }
}
