//! Session telemetry log.
//!
//! Tracks counters for what the agent has processed this session, with
//! optional JSON persistence so `vision-tagger status` can report cumulative
//! numbers across runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Telemetry counters for the current session.
#[derive(Debug)]
pub struct SessionLog {
    /// Number of detection batches received
    batches_received: AtomicU64,
    /// Number of detections seen (before confidence filtering)
    detections_seen: AtomicU64,
    /// Number of detections accepted into the aggregate
    detections_accepted: AtomicU64,
    /// Number of tags generated
    tags_generated: AtomicU64,
    /// Number of tag reports exported
    reports_exported: AtomicU64,
    /// Number of attachment updates attempted
    attachment_updates: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting counters
    persist_path: Option<PathBuf>,
}

impl SessionLog {
    /// Create a new session log.
    pub fn new() -> Self {
        Self {
            batches_received: AtomicU64::new(0),
            detections_seen: AtomicU64::new(0),
            detections_accepted: AtomicU64::new(0),
            tags_generated: AtomicU64::new(0),
            reports_exported: AtomicU64::new(0),
            attachment_updates: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a session log with persistence.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        // Try to load existing counters
        if let Err(e) = log.load() {
            eprintln!("Note: Could not load previous telemetry: {e}");
        }

        log
    }

    /// Record a received detection batch.
    pub fn record_batch(&self) {
        self.batches_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record detections seen in a batch.
    pub fn record_detections_seen(&self, count: u64) {
        self.detections_seen.fetch_add(count, Ordering::Relaxed);
    }

    /// Record detections accepted into the aggregate.
    pub fn record_detections_accepted(&self, count: u64) {
        self.detections_accepted.fetch_add(count, Ordering::Relaxed);
    }

    /// Record generated tags.
    pub fn record_tags_generated(&self, count: u64) {
        self.tags_generated.fetch_add(count, Ordering::Relaxed);
    }

    /// Record an exported report.
    pub fn record_report_exported(&self) {
        self.reports_exported.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an attachment update attempt.
    pub fn record_attachment_update(&self) {
        self.attachment_updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current counters.
    pub fn stats(&self) -> TelemetryStats {
        TelemetryStats {
            batches_received: self.batches_received.load(Ordering::Relaxed),
            detections_seen: self.detections_seen.load(Ordering::Relaxed),
            detections_accepted: self.detections_accepted.load(Ordering::Relaxed),
            tags_generated: self.tags_generated.load(Ordering::Relaxed),
            reports_exported: self.reports_exported.load(Ordering::Relaxed),
            attachment_updates: self.attachment_updates.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds() as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Batches received: {}\n\
             - Detections seen: {}\n\
             - Detections accepted: {}\n\
             - Tags generated: {}\n\
             - Reports exported: {}\n\
             - Attachment updates: {}\n\
             - Session duration: {} seconds",
            stats.batches_received,
            stats.detections_seen,
            stats.detections_accepted,
            stats.tags_generated,
            stats.reports_exported,
            stats.attachment_updates,
            stats.session_duration_secs
        )
    }

    /// Save counters to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                batches_received: stats.batches_received,
                detections_seen: stats.detections_seen,
                detections_accepted: stats.detections_accepted,
                tags_generated: stats.tags_generated,
                reports_exported: stats.reports_exported,
                attachment_updates: stats.attachment_updates,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load counters from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.batches_received
                    .store(persisted.batches_received, Ordering::Relaxed);
                self.detections_seen
                    .store(persisted.detections_seen, Ordering::Relaxed);
                self.detections_accepted
                    .store(persisted.detections_accepted, Ordering::Relaxed);
                self.tags_generated
                    .store(persisted.tags_generated, Ordering::Relaxed);
                self.reports_exported
                    .store(persisted.reports_exported, Ordering::Relaxed);
                self.attachment_updates
                    .store(persisted.attachment_updates, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.batches_received.store(0, Ordering::Relaxed);
        self.detections_seen.store(0, Ordering::Relaxed);
        self.detections_accepted.store(0, Ordering::Relaxed);
        self.tags_generated.store(0, Ordering::Relaxed);
        self.reports_exported.store(0, Ordering::Relaxed);
        self.attachment_updates.store(0, Ordering::Relaxed);
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of telemetry counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryStats {
    pub batches_received: u64,
    pub detections_seen: u64,
    pub detections_accepted: u64,
    pub tags_generated: u64,
    pub reports_exported: u64,
    pub attachment_updates: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Counter format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    batches_received: u64,
    detections_seen: u64,
    detections_accepted: u64,
    tags_generated: u64,
    reports_exported: u64,
    attachment_updates: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared session log.
pub type SharedSessionLog = Arc<SessionLog>;

/// Create a new shared session log.
pub fn create_shared_log() -> SharedSessionLog {
    Arc::new(SessionLog::new())
}

/// Create a new shared session log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedSessionLog {
    Arc::new(SessionLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_log_counting() {
        let log = SessionLog::new();

        log.record_batch();
        log.record_batch();
        log.record_detections_seen(5);
        log.record_detections_accepted(3);

        let stats = log.stats();
        assert_eq!(stats.batches_received, 2);
        assert_eq!(stats.detections_seen, 5);
        assert_eq!(stats.detections_accepted, 3);
    }

    #[test]
    fn test_session_log_reset() {
        let log = SessionLog::new();

        log.record_detections_seen(100);
        log.record_tags_generated(10);
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.detections_seen, 0);
        assert_eq!(stats.tags_generated, 0);
    }

    #[test]
    fn test_session_log_persistence_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "vision-tagger-telemetry-{}.json",
            uuid::Uuid::new_v4()
        ));

        let log = SessionLog::with_persistence(path.clone());
        log.record_batch();
        log.record_tags_generated(4);
        log.save().unwrap();

        let reloaded = SessionLog::with_persistence(path.clone());
        let stats = reloaded.stats();
        assert_eq!(stats.batches_received, 1);
        assert_eq!(stats.tags_generated, 4);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_summary_format() {
        let log = SessionLog::new();
        let summary = log.summary();

        assert!(summary.contains("Batches received"));
        assert!(summary.contains("Detections accepted"));
        assert!(summary.contains("Tags generated"));
    }
}
