//! Detection sources for the Vision Tag Agent.
//!
//! Detections enter the pipeline either from a recorded JSONL replay, from
//! the HTTP ingest server, or (with the `inference` feature) by querying a
//! vision inference service directly.

pub mod replay;
pub mod types;

#[cfg(feature = "inference")]
pub mod inference;

// Re-export commonly used types
pub use replay::{ReplayConfig, ReplaySource, SourceError};
pub use types::{
    clean_batch, dedupe_overlapping, filter_by_confidence, BoundingBox, Detection,
    DetectionResult,
};

#[cfg(feature = "inference")]
pub use inference::{
    FramePayload, InferenceClient, InferenceConfig, InferenceError, ModelInfo, ServiceHealth,
};
