//! Core functionality for the Vision Tag Agent.
//!
//! This module contains:
//! - Time-windowed detection aggregation
//! - Tag types and the stateless batch-to-tag conversion
//! - Tag report building for export

pub mod aggregator;
pub mod report;
pub mod tags;

// Re-export commonly used types
pub use aggregator::{AggregatorOptions, AggregatorStats, DetectionAggregator};
pub use report::{ReportBuilder, TagReport, PRODUCER_NAME, REPORT_VERSION};
pub use tags::{
    detections_to_tags, normalize_tag_name, ConversionOptions, DetectionTag, GeneratedTag,
    TagSource,
};
