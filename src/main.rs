//! Vision Tag Agent CLI
//!
//! Windowed aggregation of object detections into ranked content tags.

use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use vision_tag_agent::{
    config::Config,
    core::{DetectionAggregator, ReportBuilder, TagReport},
    source::{clean_batch, ReplayConfig, ReplaySource},
    telemetry::create_shared_log_with_persistence,
    VERSION,
};

#[cfg(feature = "attachment")]
use vision_tag_agent::attachment::{
    AttachmentConfig, BlockingAttachmentClient, UpdateOptions,
};

#[derive(Parser)]
#[command(name = "vision-tagger")]
#[command(version = VERSION)]
#[command(about = "Aggregate object detections into ranked content tags", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start aggregating detections from a replay file
    Start {
        /// JSONL file of detection results to replay
        #[arg(long)]
        replay: PathBuf,

        /// Interval between replayed frames in milliseconds
        #[arg(long, default_value = "100")]
        frame_interval_ms: u64,

        /// Enable pushing tags to the attachment API (requires attachment feature)
        #[arg(long)]
        attachment: bool,

        /// Attachment API port
        #[arg(long, default_value = "5173")]
        attachment_port: u16,

        /// Attachment API token
        #[arg(long)]
        attachment_token: Option<String>,

        /// Target post ID for attachment updates
        #[arg(long)]
        post_id: Option<String>,

        /// Target attachment ID for attachment updates
        #[arg(long)]
        attachment_id: Option<String>,

        /// Sync interval in seconds (how often to build and push a report;
        /// defaults to the configured interval)
        #[arg(long)]
        sync_interval: Option<u64>,
    },

    /// Run the HTTP ingest server
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on (0 for random)
        #[arg(long, default_value = "8787")]
        port: u16,
    },

    /// Pause detection processing
    Pause,

    /// Resume detection processing
    Resume,

    /// Show current agent status
    Status,

    /// Export collected tag reports
    Export {
        /// Output directory for reports
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Export format (json or jsonl)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Show configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            replay,
            frame_interval_ms,
            attachment,
            attachment_port,
            attachment_token,
            post_id,
            attachment_id,
            sync_interval,
        } => {
            cmd_start(
                replay,
                frame_interval_ms,
                attachment,
                attachment_port,
                attachment_token,
                post_id,
                attachment_id,
                sync_interval,
            );
        }
        #[cfg(feature = "server")]
        Commands::Serve { port } => {
            cmd_serve(port);
        }
        Commands::Pause => {
            cmd_pause();
        }
        Commands::Resume => {
            cmd_resume();
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Export { output, format } => {
            cmd_export(output, &format);
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

#[allow(unused_variables, clippy::too_many_arguments)]
fn cmd_start(
    replay: PathBuf,
    frame_interval_ms: u64,
    enable_attachment: bool,
    attachment_port: u16,
    attachment_token: Option<String>,
    post_id: Option<String>,
    attachment_id: Option<String>,
    sync_interval: Option<u64>,
) {
    println!("Vision Tag Agent v{VERSION}");
    println!();

    if !replay.exists() {
        eprintln!("Error: Replay file {replay:?} does not exist");
        std::process::exit(1);
    }

    // Load or create configuration
    let config = Config::load().unwrap_or_default();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    // CLI flag wins over the configured interval
    let sync_interval = resolve_sync_interval(sync_interval, &config);

    println!("Starting aggregation...");
    println!("  Replay file: {replay:?}");
    println!("  Frame interval: {frame_interval_ms}ms");
    println!(
        "  Window: {}ms, min confidence: {}, min count: {}, max tags: {}",
        config.aggregation.aggregation_window_ms,
        config.aggregation.min_confidence,
        config.aggregation.min_detection_count,
        config.aggregation.max_tags
    );

    // Show attachment status
    #[cfg(feature = "attachment")]
    let attachment_client = if enable_attachment {
        match create_attachment_client(attachment_port, attachment_token) {
            Ok(client) => {
                println!(
                    "  Attachment sync: enabled (interval: {}s)",
                    sync_interval.as_secs()
                );
                println!("  Device ID: {}", client.device_id());
                Some(client)
            }
            Err(e) => {
                eprintln!("Warning: Attachment client initialization failed: {e}");
                eprintln!("Continuing without attachment sync.");
                None
            }
        }
    } else {
        println!("  Attachment sync: disabled");
        None
    };

    #[cfg(feature = "attachment")]
    if attachment_client.is_some() && (post_id.is_none() || attachment_id.is_none()) {
        eprintln!("Error: --post-id and --attachment-id are required with --attachment");
        std::process::exit(1);
    }

    #[cfg(not(feature = "attachment"))]
    if enable_attachment {
        eprintln!(
            "Warning: --attachment flag ignored (attachment feature not enabled at compile time)"
        );
    }

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    // Set up session telemetry
    let telemetry = create_shared_log_with_persistence(config.data_path.join("telemetry.json"));

    // Create replay source
    let replay_config =
        ReplayConfig::new(replay).with_frame_interval(Duration::from_millis(frame_interval_ms));
    let mut source = ReplaySource::new(replay_config);

    // Create aggregator and report builder
    let mut aggregator = DetectionAggregator::new(config.aggregation);
    let report_builder =
        ReportBuilder::new().with_session_id(format!("SESS-{}", Utc::now().timestamp_millis()));
    println!("Instance ID: {}", report_builder.instance_id());

    // Storage for completed reports
    let mut reports: Vec<TagReport> = Vec::new();

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc_handler(r);

    // Support pause/resume from another process by polling the config file.
    // If paused at startup, wait until resumed before starting the source.
    let mut paused = config.paused;
    let mut last_config_check = std::time::Instant::now();

    if paused {
        println!("Processing is currently paused.");
        println!("Run `vision-tagger resume` to start processing.");
        println!();
    } else if let Err(e) = source.start() {
        eprintln!("Error starting replay source: {e}");
        std::process::exit(1);
    }

    let mut last_report = std::time::Instant::now();
    let receiver = source.receiver().clone();
    let min_confidence = config.aggregation.min_confidence;

    // Main event loop
    while running.load(Ordering::SeqCst) {
        // Periodically reload config so `vision-tagger pause/resume` can control a running agent.
        if last_config_check.elapsed() >= Duration::from_secs(1) {
            if let Ok(cfg) = Config::load() {
                if cfg.paused != paused {
                    paused = cfg.paused;

                    if paused {
                        println!();
                        println!("Pausing processing...");
                        source.stop();

                        // Drop the partial window and drain queued frames.
                        aggregator.clear();
                        while receiver.try_recv().is_ok() {}
                    } else {
                        println!();
                        println!("Resuming processing...");
                        if let Err(e) = source.start() {
                            eprintln!("Error resuming replay source: {e}");
                            std::process::exit(1);
                        }
                    }
                }
            }
            last_config_check = std::time::Instant::now();
        }

        if paused {
            thread::sleep(Duration::from_millis(100));
            continue;
        }

        // Process frames with timeout
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(result) => {
                telemetry.record_batch();
                telemetry.record_detections_seen(result.detections.len() as u64);

                let accepted = clean_batch(&result.detections, min_confidence);
                telemetry.record_detections_accepted(accepted.len() as u64);
                aggregator.add_detections(&accepted);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                // A timeout with the replay thread stopped means the queue
                // has drained; build the final report below.
                if !source.is_running() {
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                // Replay source finished; build a final report below.
                break;
            }
        }

        // Build a report on the sync interval
        if last_report.elapsed() >= sync_interval {
            let report = report_builder.build(&aggregator);
            telemetry.record_tags_generated(report.tags.len() as u64);

            println!(
                "[{}] Report: {} tags, {} detections, quality {:.2}",
                Utc::now().format("%H:%M:%S"),
                report.tags.len(),
                report.stats.total_detections,
                report.quality
            );
            for tag in &report.tags {
                println!(
                    "  {} (score {:.3}, count {})",
                    tag.name, tag.relevance_score, tag.detection_count
                );
            }

            #[cfg(feature = "attachment")]
            if let (Some(client), Some(pid), Some(aid)) =
                (&attachment_client, &post_id, &attachment_id)
            {
                if !report.tags.is_empty() {
                    telemetry.record_attachment_update();
                    let result = client.try_update_tags(
                        pid,
                        aid,
                        report.tags.clone(),
                        UpdateOptions::default(),
                    );
                    if result.success {
                        println!("[Attachment] Pushed {} tags", result.tag_ids.len());
                    } else {
                        eprintln!("[Attachment] Update failed for {}", result.attachment_id);
                    }
                }
            }

            reports.push(report);
            last_report = std::time::Instant::now();
        }
    }

    // Stop the source
    println!();
    println!("Stopping...");
    source.stop();

    // Build a final report from whatever is left in the window
    if !aggregator.is_empty() {
        let report = report_builder.build(&aggregator);
        telemetry.record_tags_generated(report.tags.len() as u64);
        reports.push(report);
    }

    // Save telemetry
    if let Err(e) = telemetry.save() {
        eprintln!("Warning: Could not save telemetry: {e}");
    }

    // Export reports
    if !reports.is_empty() {
        let export_path = config.export_path.join(format!(
            "session_{}.json",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));

        if let Some(parent) = export_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match serde_json::to_string_pretty(&reports) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&export_path, json) {
                    eprintln!("Error writing reports: {e}");
                } else {
                    println!("Exported {} reports to {:?}", reports.len(), export_path);
                    for _ in &reports {
                        telemetry.record_report_exported();
                    }
                    let _ = telemetry.save();
                }
            }
            Err(e) => {
                eprintln!("Error serializing reports: {e}");
            }
        }
    }

    // Final stats
    println!();
    println!("{}", telemetry.summary());
}

#[cfg(feature = "server")]
fn cmd_serve(port: u16) {
    use vision_tag_agent::server::{run, ServerConfig};

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vision_tag_agent=info".into()),
        )
        .init();

    let config = Config::load().unwrap_or_default();
    let server_config = ServerConfig::new(port, config.aggregation);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error creating runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(async {
        let (addr, shutdown_tx) = match run(server_config).await {
            Ok(handles) => handles,
            Err(e) => {
                eprintln!("Error starting server: {e}");
                std::process::exit(1);
            }
        };

        println!("Vision Tag Agent v{VERSION}");
        println!("Listening on http://{addr}");
        println!("Press Ctrl+C to stop");

        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(());
        println!();
        println!("Server stopped.");
    });
}

fn cmd_pause() {
    let mut config = Config::load().unwrap_or_default();
    config.paused = true;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Processing paused. Use 'vision-tagger resume' to continue.");
}

fn cmd_resume() {
    let mut config = Config::load().unwrap_or_default();
    config.paused = false;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Processing resumed.");
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Vision Tag Agent Status");
    println!("=======================");
    println!();

    println!("Configuration:");
    println!(
        "  Aggregation window: {}ms",
        config.aggregation.aggregation_window_ms
    );
    println!("  Min confidence: {}", config.aggregation.min_confidence);
    println!(
        "  Min detection count: {}",
        config.aggregation.min_detection_count
    );
    println!("  Max tags: {}", config.aggregation.max_tags);
    println!("  Paused: {}", config.paused);
    println!();

    // Load and show telemetry stats if available
    let stats_path = config.data_path.join("telemetry.json");
    if stats_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&stats_path) {
            if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
                println!("Cumulative Statistics:");
                if let Some(batches) = stats.get("batches_received") {
                    println!("  Batches received: {batches}");
                }
                if let Some(seen) = stats.get("detections_seen") {
                    println!("  Detections seen: {seen}");
                }
                if let Some(accepted) = stats.get("detections_accepted") {
                    println!("  Detections accepted: {accepted}");
                }
                if let Some(tags) = stats.get("tags_generated") {
                    println!("  Tags generated: {tags}");
                }
                if let Some(reports) = stats.get("reports_exported") {
                    println!("  Reports exported: {reports}");
                }
            }
        }
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_export(output: Option<PathBuf>, format: &str) {
    let config = Config::load().unwrap_or_default();
    let export_dir = output.unwrap_or(config.export_path.clone());

    // Find all session files
    let session_files: Vec<PathBuf> = std::fs::read_dir(&export_dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
                .collect()
        })
        .unwrap_or_default();

    if session_files.is_empty() {
        println!("No session data found in {export_dir:?}");
        println!("Run 'vision-tagger start' to begin aggregating detections.");
        return;
    }

    println!(
        "Found {} session file(s) in {:?}",
        session_files.len(),
        export_dir
    );

    // Combine all reports
    let mut all_reports: Vec<TagReport> = Vec::new();
    for file in &session_files {
        if let Ok(content) = std::fs::read_to_string(file) {
            if let Ok(reports) = serde_json::from_str::<Vec<TagReport>>(&content) {
                all_reports.extend(reports);
            }
        }
    }

    println!("Total reports: {}", all_reports.len());

    // Export based on format
    let output_path = export_dir.join(format!(
        "export_{}.{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        if format == "jsonl" { "jsonl" } else { "json" }
    ));

    let result = if format == "jsonl" {
        // JSON Lines format
        let lines: Vec<String> = all_reports
            .iter()
            .filter_map(|r| serde_json::to_string(r).ok())
            .collect();
        std::fs::write(&output_path, lines.join("\n"))
    } else {
        // Pretty JSON format
        match serde_json::to_string_pretty(&all_reports) {
            Ok(json) => std::fs::write(&output_path, json),
            Err(e) => {
                eprintln!("Error serializing: {e}");
                return;
            }
        }
    };

    match result {
        Ok(_) => println!("Exported to {output_path:?}"),
        Err(e) => eprintln!("Error writing export: {e}"),
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Report cadence: the CLI flag when given, otherwise the configured
/// sync interval.
fn resolve_sync_interval(flag_secs: Option<u64>, config: &Config) -> Duration {
    flag_secs.map_or(config.sync_interval, Duration::from_secs)
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}

/// Create a blocking attachment client from CLI args.
#[cfg(feature = "attachment")]
fn create_attachment_client(
    port: u16,
    token: Option<String>,
) -> Result<BlockingAttachmentClient, vision_tag_agent::attachment::AttachmentError> {
    let token = token
        .or_else(|| std::env::var("ATTACHMENT_TOKEN").ok())
        .ok_or_else(|| {
            vision_tag_agent::attachment::AttachmentError::Config(
                "No attachment token provided (use --attachment-token or ATTACHMENT_TOKEN)"
                    .to_string(),
            )
        })?;

    let config = AttachmentConfig::new("127.0.0.1", port, token);
    BlockingAttachmentClient::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_interval_defaults_to_config() {
        let mut config = Config::default();
        config.sync_interval = Duration::from_secs(25);

        assert_eq!(
            resolve_sync_interval(None, &config),
            Duration::from_secs(25)
        );
    }

    #[test]
    fn test_sync_interval_flag_overrides_config() {
        let mut config = Config::default();
        config.sync_interval = Duration::from_secs(25);

        assert_eq!(
            resolve_sync_interval(Some(3), &config),
            Duration::from_secs(3)
        );
    }
}
