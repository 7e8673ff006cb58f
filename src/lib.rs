//! Vision Tag Agent - windowed aggregation of object detections into content tags.
//!
//! This library turns streams of object-detection results into ranked,
//! human-readable content tags. Detections are held in a sliding time window;
//! classes seen often enough within the window become tags, scored by how
//! confidently and how frequently they were observed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Vision Tag Agent                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Source    │──▶│ Aggregator  │──▶│    Tags     │       │
//! │  │(replay/http)│   │ (5s window) │   │  (ranked)   │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │         │                                    │              │
//! │         ▼                                    ▼              │
//! │  ┌─────────────┐                     ┌─────────────┐       │
//! │  │  Telemetry  │                     │ Tag Report  │       │
//! │  │    Log      │                     │  / Sync     │       │
//! │  └─────────────┘                     └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use vision_tag_agent::core::{AggregatorOptions, DetectionAggregator};
//! use vision_tag_agent::source::Detection;
//!
//! let mut aggregator = DetectionAggregator::new(AggregatorOptions::default());
//!
//! // Feed a few frames' worth of detections
//! for _ in 0..4 {
//!     aggregator.add_detections(&[Detection::new("cat", 15, 0.8)]);
//! }
//!
//! let tags = aggregator.generate_tags();
//! assert_eq!(tags[0].name, "cat");
//! ```

pub mod attachment;
pub mod config;
pub mod core;
pub mod source;
pub mod telemetry;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use attachment::{AttachmentConfig, TaggingResult, UpdateOptions};
pub use config::Config;
pub use core::{
    detections_to_tags, AggregatorOptions, AggregatorStats, DetectionAggregator, DetectionTag,
    GeneratedTag, ReportBuilder, TagReport,
};
pub use source::{Detection, DetectionResult, ReplayConfig, ReplaySource};
pub use telemetry::{SessionLog, SharedSessionLog, TelemetryStats};

// Attachment client re-exports (when enabled)
#[cfg(feature = "attachment")]
pub use attachment::{AttachmentClient, BlockingAttachmentClient};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
