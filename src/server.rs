//! HTTP server for receiving detection batches from external producers.
//!
//! This module provides an HTTP server that:
//! - Accepts detection batches from ML services via POST /ingest
//! - Aggregates them in a time-windowed DetectionAggregator
//! - Serves ranked tag reports and aggregate stats on demand
//! - Optionally flushes tags to the attachment-tagging API
//!
//! # Architecture
//!
//! ```text
//! ML Service ──→ POST /ingest ──→ vision-tag-agent ──→ GET /tags
//!                                        ↓
//!                              [Windowed Aggregation]
//!                                        ↓
//!                           POST /flush ──→ attachment API
//! ```

use crate::attachment::{AttachmentClient, AttachmentConfig, TaggingResult, UpdateOptions};
use crate::core::aggregator::{AggregatorOptions, DetectionAggregator};
use crate::core::report::{ReportBuilder, TagReport};
use crate::source::types::{clean_batch, Detection};
use crate::telemetry::{create_shared_log, SharedSessionLog};
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Aggregation options
    pub aggregation: AggregatorOptions,
    /// Attachment API configuration, when tag flushing is enabled
    pub attachment_config: Option<AttachmentConfig>,
    /// Target post for flushed tags
    pub post_id: Option<String>,
    /// Target attachment for flushed tags
    pub attachment_id: Option<String>,
}

impl ServerConfig {
    /// Create a new server configuration without attachment flushing.
    pub fn new(port: u16, aggregation: AggregatorOptions) -> Self {
        Self {
            port,
            aggregation,
            attachment_config: None,
            post_id: None,
            attachment_id: None,
        }
    }

    /// Enable flushing tags to an attachment.
    pub fn with_attachment(
        mut self,
        config: AttachmentConfig,
        post_id: String,
        attachment_id: String,
    ) -> Self {
        self.attachment_config = Some(config);
        self.post_id = Some(post_id);
        self.attachment_id = Some(attachment_id);
        self
    }
}

/// Shared server state
pub struct ServerState {
    /// Windowed detection aggregator
    aggregator: RwLock<DetectionAggregator>,
    /// Report builder carrying the instance identity
    report_builder: ReportBuilder,
    /// Session telemetry counters
    telemetry: SharedSessionLog,
    /// Attachment client, when flushing is enabled
    attachment: Option<AttachmentClient>,
    /// Flush target
    post_id: Option<String>,
    /// Flush target
    attachment_id: Option<String>,
}

impl ServerState {
    /// Create new server state
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        let attachment = match &config.attachment_config {
            Some(att_config) => Some(
                AttachmentClient::new(att_config.clone())
                    .map_err(|e| anyhow::anyhow!("Failed to create attachment client: {e}"))?,
            ),
            None => None,
        };

        Ok(Self {
            aggregator: RwLock::new(DetectionAggregator::new(config.aggregation)),
            report_builder: ReportBuilder::new(),
            telemetry: create_shared_log(),
            attachment,
            post_id: config.post_id.clone(),
            attachment_id: config.attachment_id.clone(),
        })
    }
}

/// Detection batch from an ML service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Detections in this batch
    pub detections: Vec<Detection>,
}

/// Response from ingest endpoint
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub status: String,
    /// Detections accepted into the aggregate
    pub accepted: usize,
    /// Detections dropped by confidence filtering or dedup
    pub dropped: usize,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /ingest
///
/// Accepts a detection batch, drops low-confidence and duplicate boxes,
/// and folds the remainder into the aggregation window.
async fn ingest(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<IngestRequest>,
) -> Json<IngestResponse> {
    let seen = request.detections.len();
    state.telemetry.record_batch();
    state.telemetry.record_detections_seen(seen as u64);

    let min_confidence = {
        let aggregator = state.aggregator.read().await;
        aggregator.options().min_confidence
    };

    let cleaned = clean_batch(&request.detections, min_confidence);
    let accepted = cleaned.len();

    {
        let mut aggregator = state.aggregator.write().await;
        aggregator.add_detections(&cleaned);
    }
    state.telemetry.record_detections_accepted(accepted as u64);

    tracing::debug!("Ingested batch: {} seen, {} accepted", seen, accepted);

    Json(IngestResponse {
        status: "ok".to_string(),
        accepted,
        dropped: seen - accepted,
    })
}

/// GET /tags
///
/// Build a full tag report from the current window.
async fn tags(State(state): State<Arc<ServerState>>) -> Json<TagReport> {
    let aggregator = state.aggregator.read().await;
    let report = state.report_builder.build(&aggregator);
    state
        .telemetry
        .record_tags_generated(report.tags.len() as u64);
    Json(report)
}

/// GET /stats
async fn stats(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    let aggregator = state.aggregator.read().await;
    let agg_stats = aggregator.stats();
    let telemetry = state.telemetry.stats();

    Json(serde_json::json!({
        "aggregator": agg_stats,
        "session": telemetry,
    }))
}

/// POST /clear
async fn clear(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    let mut aggregator = state.aggregator.write().await;
    aggregator.clear();
    tracing::info!("Aggregation window cleared");
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /flush
///
/// Generate tags from the current window and push them to the configured
/// attachment. Returns 503 when no attachment target is configured.
async fn flush(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<TaggingResult>, (StatusCode, Json<ErrorResponse>)> {
    let (client, post_id, attachment_id) = match (
        &state.attachment,
        &state.post_id,
        &state.attachment_id,
    ) {
        (Some(client), Some(post_id), Some(attachment_id)) => (client, post_id, attachment_id),
        _ => {
            return Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "No attachment target configured".to_string(),
                    code: "NO_ATTACHMENT".to_string(),
                }),
            ));
        }
    };

    let generated = {
        let aggregator = state.aggregator.read().await;
        aggregator.generate_tags()
    };

    if generated.is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error: "No tags in the current window".to_string(),
                code: "NO_TAGS".to_string(),
            }),
        ));
    }

    state.telemetry.record_attachment_update();
    let result = client
        .try_update_tags(post_id, attachment_id, generated, UpdateOptions::default())
        .await;

    if result.success {
        tracing::info!(
            "Flushed {} tags to attachment {}",
            result.tag_ids.len(),
            result.attachment_id
        );
    } else {
        tracing::error!("Attachment flush failed for {}", result.attachment_id);
    }

    Ok(Json(result))
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState::new(&config)?);

    let app = Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest))
        .route("/tags", get(tags))
        .route("/stats", get(stats))
        .route("/clear", post(clear))
        .route("/flush", post(flush))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                    HeaderValue::from_static("http://localhost:5173"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Vision tag agent server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
