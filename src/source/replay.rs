//! Replay source: feeds recorded detection batches through the pipeline.
//!
//! Reads a JSONL file where each line is one `DetectionResult` and emits the
//! batches on a bounded channel from a background thread, paced by a fixed
//! frame interval. Useful for offline tagging runs and for exercising the
//! pipeline without a live inference service.

use crate::source::types::DetectionResult;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Configuration for the replay source.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Path to the JSONL recording
    pub path: PathBuf,
    /// Delay between emitted batches
    pub frame_interval: Duration,
}

impl ReplayConfig {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            frame_interval: Duration::from_millis(100),
        }
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }
}

/// Errors that can occur while replaying a recording.
#[derive(Debug)]
pub enum SourceError {
    AlreadyRunning,
    Io(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::AlreadyRunning => write!(f, "Replay source is already running"),
            SourceError::Io(e) => write!(f, "Replay IO error: {e}"),
        }
    }
}

impl std::error::Error for SourceError {}

/// Emits recorded detection batches on a channel.
pub struct ReplaySource {
    config: ReplayConfig,
    sender: Sender<DetectionResult>,
    receiver: Receiver<DetectionResult>,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ReplaySource {
    /// Create a new replay source for the given recording.
    pub fn new(config: ReplayConfig) -> Self {
        let (sender, receiver) = bounded(10_000);
        Self {
            config,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Start replaying batches on a background thread.
    ///
    /// Lines that fail to parse are skipped with a warning; the replay stops
    /// at end of file or when `stop` is called.
    pub fn start(&mut self) -> Result<(), SourceError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SourceError::AlreadyRunning);
        }

        let file = std::fs::File::open(&self.config.path)
            .map_err(|e| SourceError::Io(format!("{:?}: {e}", self.config.path)))?;

        self.running.store(true, Ordering::SeqCst);

        let sender = self.sender.clone();
        let running = self.running.clone();
        let interval = self.config.frame_interval;

        let handle = thread::spawn(move || {
            let reader = std::io::BufReader::new(file);
            for (line_no, line) in reader.lines().enumerate() {
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let line = match line {
                    Ok(l) => l,
                    Err(_) => break,
                };
                if line.trim().is_empty() {
                    continue;
                }

                match serde_json::from_str::<DetectionResult>(&line) {
                    Ok(batch) => {
                        if sender.send(batch).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        eprintln!("Warning: skipping malformed line {}: {e}", line_no + 1);
                    }
                }

                thread::sleep(interval);
            }
            running.store(false, Ordering::SeqCst);
        });

        self.handle = Some(handle);
        Ok(())
    }

    /// Stop the replay.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Check if the replay is still producing batches.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for detection batches.
    pub fn receiver(&self) -> &Receiver<DetectionResult> {
        &self.receiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::types::Detection;

    fn write_recording(lines: &[DetectionResult]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("replay-test-{}.jsonl", uuid::Uuid::new_v4()));
        let content: Vec<String> = lines
            .iter()
            .map(|r| serde_json::to_string(r).unwrap())
            .collect();
        std::fs::write(&path, content.join("\n")).unwrap();
        path
    }

    #[test]
    fn test_replay_emits_all_batches() {
        let batches = vec![
            DetectionResult::from_detections(vec![Detection::new("cat", 15, 0.9)]),
            DetectionResult::from_detections(vec![Detection::new("dog", 16, 0.8)]),
        ];
        let path = write_recording(&batches);

        let config = ReplayConfig::new(path.clone()).with_frame_interval(Duration::from_millis(1));
        let mut source = ReplaySource::new(config);
        source.start().unwrap();

        let mut received = Vec::new();
        while let Ok(batch) = source.receiver().recv_timeout(Duration::from_secs(2)) {
            received.push(batch);
            if received.len() == 2 {
                break;
            }
        }
        source.stop();

        assert_eq!(received.len(), 2);
        assert_eq!(received[0].detections[0].class_name, "cat");
        assert_eq!(received[1].detections[0].class_name, "dog");

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_replay_missing_file() {
        let config = ReplayConfig::new(PathBuf::from("/nonexistent/recording.jsonl"));
        let mut source = ReplaySource::new(config);
        assert!(matches!(source.start(), Err(SourceError::Io(_))));
    }

    #[test]
    fn test_replay_skips_malformed_lines() {
        let path =
            std::env::temp_dir().join(format!("replay-test-{}.jsonl", uuid::Uuid::new_v4()));
        let good = serde_json::to_string(&DetectionResult::from_detections(vec![
            Detection::new("person", 0, 0.7),
        ]))
        .unwrap();
        std::fs::write(&path, format!("not json\n{good}\n")).unwrap();

        let config = ReplayConfig::new(path.clone()).with_frame_interval(Duration::from_millis(1));
        let mut source = ReplaySource::new(config);
        source.start().unwrap();

        let batch = source
            .receiver()
            .recv_timeout(Duration::from_secs(2))
            .expect("good line should still be emitted");
        assert_eq!(batch.detections[0].class_name, "person");
        source.stop();

        let _ = std::fs::remove_file(path);
    }
}
