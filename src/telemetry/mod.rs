//! Telemetry module for the Vision Tag Agent.
//!
//! Session counters for batches, detections, tags, and downstream updates,
//! persisted across runs for the `status` command.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SessionLog, SharedSessionLog,
    TelemetryStats,
};
