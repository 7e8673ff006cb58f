//! Demonstration of the Vision Tag Agent replay pipeline.
//!
//! This example shows how to:
//! 1. Write a small JSONL replay file of detection results
//! 2. Create and start a replay source
//! 3. Feed detection batches into the aggregator
//! 4. Generate ranked tags and a full tag report
//!
//! Run with: cargo run --example replay_demo

use std::time::Duration;

use vision_tag_agent::{
    core::{AggregatorOptions, DetectionAggregator, ReportBuilder},
    source::{filter_by_confidence, Detection, DetectionResult, ReplayConfig, ReplaySource},
    telemetry::SessionLog,
};

fn main() {
    println!("Vision Tag Agent - Replay Demo");
    println!("==============================");
    println!();

    // Write a small replay file: a few frames of a cat, a dog passing by,
    // and one low-confidence bird that should be filtered out.
    let replay_path = std::env::temp_dir().join("vision-tagger-demo.jsonl");
    let frames = vec![
        vec![
            Detection::new("cat", 15, 0.7),
            Detection::new("bird", 14, 0.4),
        ],
        vec![Detection::new("cat", 15, 0.8)],
        vec![
            Detection::new("cat", 15, 0.65),
            Detection::new("dog", 16, 0.9),
        ],
        vec![
            Detection::new("cat", 15, 0.9),
            Detection::new("dog", 16, 0.85),
        ],
        vec![Detection::new("dog", 16, 0.8)],
    ];

    let lines: Vec<String> = frames
        .into_iter()
        .map(|detections| {
            serde_json::to_string(&DetectionResult::from_detections(detections))
                .expect("serialize frame")
        })
        .collect();
    std::fs::write(&replay_path, lines.join("\n")).expect("write replay file");
    println!("Wrote replay file: {replay_path:?}");
    println!();

    // Create components
    let options = AggregatorOptions::default();
    let mut aggregator = DetectionAggregator::new(options);
    let report_builder = ReportBuilder::new().with_session_id("DEMO".to_string());
    let telemetry = SessionLog::new();

    println!("Instance ID: {}", report_builder.instance_id());
    println!(
        "Window: {}ms, min confidence: {}, min count: {}",
        options.aggregation_window_ms, options.min_confidence, options.min_detection_count
    );
    println!();

    // Start the replay
    let config = ReplayConfig::new(replay_path.clone())
        .with_frame_interval(Duration::from_millis(50));
    let mut source = ReplaySource::new(config);
    if let Err(e) = source.start() {
        eprintln!("Error starting replay: {e}");
        return;
    }

    let receiver = source.receiver().clone();
    let mut frame_count = 0;

    loop {
        match receiver.recv_timeout(Duration::from_millis(200)) {
            Ok(result) => {
                frame_count += 1;
                telemetry.record_batch();
                telemetry.record_detections_seen(result.detections.len() as u64);

                let accepted = filter_by_confidence(&result.detections, options.min_confidence);
                telemetry.record_detections_accepted(accepted.len() as u64);

                println!(
                    "  Frame {}: {} detections, {} accepted",
                    frame_count,
                    result.detections.len(),
                    accepted.len()
                );
                aggregator.add_detections(&accepted);
            }
            Err(_) => {
                if !source.is_running() {
                    break;
                }
            }
        }
    }

    source.stop();
    println!();

    // Generate tags
    let tags = aggregator.generate_tags();
    telemetry.record_tags_generated(tags.len() as u64);

    println!("=== Generated Tags ===");
    for tag in &tags {
        println!(
            "  {} (score {:.3}, count {}, confidence {:?})",
            tag.name, tag.relevance_score, tag.detection_count, tag.confidence
        );
    }
    println!();

    // Build a full report
    let report = report_builder.build(&aggregator);
    println!("=== Tag Report (truncated) ===");
    let json = serde_json::to_string_pretty(&report).expect("serialize report");
    for line in json.lines().take(30) {
        println!("  {line}");
    }
    println!("  ...");
    println!();

    // Final statistics
    println!("{}", telemetry.summary());

    let _ = std::fs::remove_file(replay_path);
    println!();
    println!("Demo complete!");
}
