//! Client for pushing generated tags to the attachment-tagging API.
//!
//! The hosting application owns attachments; this client only issues
//! `PATCH /api/posts/{post_id}/attachment?attachmentId={id}` requests with
//! the generated tag names. Failures are reported, never retried.

use crate::core::tags::DetectionTag;
use serde::{Deserialize, Serialize};

/// Attachment API configuration.
#[derive(Debug, Clone)]
pub struct AttachmentConfig {
    /// API host (default: 127.0.0.1)
    pub host: String,
    /// API port
    pub port: u16,
    /// Bearer authentication token
    pub token: String,
}

impl AttachmentConfig {
    /// Create a new attachment API configuration.
    pub fn new(host: impl Into<String>, port: u16, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            token: token.into(),
        }
    }

    /// Get the full API base URL.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Get the attachment update URL for a post/attachment pair.
    pub fn attachment_url(&self, post_id: &str, attachment_id: &str) -> String {
        format!(
            "{}/api/posts/{}/attachment?attachmentId={}",
            self.url(),
            post_id,
            attachment_id
        )
    }
}

/// Attachment client error types.
#[derive(Debug)]
pub enum AttachmentError {
    /// Configuration error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Server returned an error response
    Server { status: u16, message: String },
    /// JSON serialization error
    Serialization(String),
}

impl std::fmt::Display for AttachmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttachmentError::Config(msg) => write!(f, "Attachment config error: {msg}"),
            AttachmentError::Network(msg) => write!(f, "Attachment network error: {msg}"),
            AttachmentError::Server { status, message } => {
                write!(f, "Attachment server error ({status}): {message}")
            }
            AttachmentError::Serialization(msg) => {
                write!(f, "Attachment serialization error: {msg}")
            }
        }
    }
}

impl std::error::Error for AttachmentError {}

/// Per-tag detail carried alongside the tag names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagMetadata {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub class_id: u32,
    #[serde(rename = "detectionCount")]
    pub detection_count: u32,
    #[serde(rename = "firstDetectedAt")]
    pub first_detected_at: String,
    #[serde(rename = "lastDetectedAt")]
    pub last_detected_at: String,
}

impl From<&DetectionTag> for TagMetadata {
    fn from(tag: &DetectionTag) -> Self {
        Self {
            name: tag.name.clone(),
            confidence: tag.confidence,
            class_id: tag.class_id,
            detection_count: tag.detection_count,
            first_detected_at: tag.first_detected_at.to_rfc3339(),
            last_detected_at: tag.last_detected_at.to_rfc3339(),
        }
    }
}

/// Request body for the attachment update.
#[derive(Debug, Clone, Serialize)]
pub struct AttachmentUpdate {
    /// Tag names to apply
    pub tags: Vec<String>,
    /// Number of tags
    #[serde(rename = "tagCount")]
    pub tag_count: usize,
    /// Per-tag detail, included unless metadata is disabled
    #[serde(rename = "detectionMetadata", skip_serializing_if = "Option::is_none")]
    pub detection_metadata: Option<Vec<TagMetadata>>,
}

/// Options for an attachment update.
#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    /// Whether to send per-tag detection metadata
    pub include_metadata: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            include_metadata: true,
        }
    }
}

/// Outcome of pushing tags to an attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggingResult {
    /// The tags that were pushed
    pub tags: Vec<DetectionTag>,
    /// Target attachment
    #[serde(rename = "attachmentId")]
    pub attachment_id: String,
    /// Whether the update succeeded
    pub success: bool,
    /// Names of the applied tags (empty on failure)
    #[serde(rename = "tagIds")]
    pub tag_ids: Vec<String>,
    /// Detections behind the pushed tags
    #[serde(rename = "totalDetections")]
    pub total_detections: u64,
    /// Number of distinct classes behind the pushed tags
    #[serde(rename = "uniqueClasses")]
    pub unique_classes: usize,
}

impl TaggingResult {
    fn success(tags: Vec<DetectionTag>, attachment_id: &str) -> Self {
        let tag_ids: Vec<String> = tags.iter().map(|t| t.name.clone()).collect();
        let total_detections = tags.iter().map(|t| u64::from(t.detection_count)).sum();
        let unique_classes = tags.len();
        Self {
            tags,
            attachment_id: attachment_id.to_string(),
            success: true,
            tag_ids,
            total_detections,
            unique_classes,
        }
    }

    fn failure(tags: Vec<DetectionTag>, attachment_id: &str) -> Self {
        Self {
            tags,
            attachment_id: attachment_id.to_string(),
            success: false,
            tag_ids: Vec::new(),
            total_detections: 0,
            unique_classes: 0,
        }
    }
}

/// Build the update body from a set of tags.
pub fn build_update(tags: &[DetectionTag], options: UpdateOptions) -> AttachmentUpdate {
    let tag_names: Vec<String> = tags.iter().map(|t| t.name.clone()).collect();
    let detection_metadata = options
        .include_metadata
        .then(|| tags.iter().map(TagMetadata::from).collect());

    AttachmentUpdate {
        tag_count: tag_names.len(),
        tags: tag_names,
        detection_metadata,
    }
}

/// Async client for the attachment-tagging API.
#[cfg(feature = "attachment")]
pub struct AttachmentClient {
    config: AttachmentConfig,
    client: reqwest::Client,
    device_id: String,
}

#[cfg(feature = "attachment")]
impl AttachmentClient {
    /// Create a new attachment client.
    pub fn new(config: AttachmentConfig) -> Result<Self, AttachmentError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| AttachmentError::Config(format!("Failed to create HTTP client: {e}")))?;

        // Device ID from hostname + instance
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let device_id = format!(
            "tagger-{}-{}",
            hostname,
            &uuid::Uuid::new_v4().to_string()[..8]
        );

        Ok(Self {
            config,
            client,
            device_id,
        })
    }

    /// Push tags to an attachment.
    pub async fn update_tags(
        &self,
        post_id: &str,
        attachment_id: &str,
        tags: &[DetectionTag],
        options: UpdateOptions,
    ) -> Result<(), AttachmentError> {
        if tags.is_empty() {
            return Err(AttachmentError::Config("No tags to push".to_string()));
        }

        let body = build_update(tags, options);
        let url = self.config.attachment_url(post_id, attachment_id);

        let response = self
            .client
            .patch(&url)
            .header("Authorization", format!("Bearer {}", self.config.token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AttachmentError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AttachmentError::Server {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }

    /// Push tags, folding any error into a `success: false` result.
    pub async fn try_update_tags(
        &self,
        post_id: &str,
        attachment_id: &str,
        tags: Vec<DetectionTag>,
        options: UpdateOptions,
    ) -> TaggingResult {
        match self
            .update_tags(post_id, attachment_id, &tags, options)
            .await
        {
            Ok(()) => TaggingResult::success(tags, attachment_id),
            Err(e) => {
                eprintln!("Error updating attachment tags: {e}");
                TaggingResult::failure(tags, attachment_id)
            }
        }
    }

    /// Get the device ID.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

/// Blocking attachment client for use in synchronous contexts.
#[cfg(feature = "attachment")]
pub struct BlockingAttachmentClient {
    inner: AttachmentClient,
    runtime: tokio::runtime::Runtime,
}

#[cfg(feature = "attachment")]
impl BlockingAttachmentClient {
    /// Create a new blocking attachment client.
    pub fn new(config: AttachmentConfig) -> Result<Self, AttachmentError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| AttachmentError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: AttachmentClient::new(config)?,
            runtime,
        })
    }

    /// Push tags to an attachment.
    pub fn update_tags(
        &self,
        post_id: &str,
        attachment_id: &str,
        tags: &[DetectionTag],
        options: UpdateOptions,
    ) -> Result<(), AttachmentError> {
        self.runtime
            .block_on(self.inner.update_tags(post_id, attachment_id, tags, options))
    }

    /// Push tags, folding any error into a `success: false` result.
    pub fn try_update_tags(
        &self,
        post_id: &str,
        attachment_id: &str,
        tags: Vec<DetectionTag>,
        options: UpdateOptions,
    ) -> TaggingResult {
        self.runtime.block_on(
            self.inner
                .try_update_tags(post_id, attachment_id, tags, options),
        )
    }

    /// Get the device ID.
    pub fn device_id(&self) -> &str {
        self.inner.device_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregator::{AggregatorOptions, DetectionAggregator};
    use crate::source::types::Detection;

    fn sample_tags() -> Vec<DetectionTag> {
        let mut agg = DetectionAggregator::new(AggregatorOptions {
            min_detection_count: 1,
            ..AggregatorOptions::default()
        });
        agg.add_detections(&[
            Detection::new("cat", 15, 0.9),
            Detection::new("traffic_light", 9, 0.8),
        ]);
        agg.generate_tags()
    }

    #[test]
    fn test_attachment_config_url() {
        let config = AttachmentConfig::new("127.0.0.1", 5173, "test-token");
        assert_eq!(config.url(), "http://127.0.0.1:5173");
        assert_eq!(
            config.attachment_url("post1", "att1"),
            "http://127.0.0.1:5173/api/posts/post1/attachment?attachmentId=att1"
        );
    }

    #[test]
    fn test_build_update_body() {
        let tags = sample_tags();
        let update = build_update(&tags, UpdateOptions::default());

        assert_eq!(update.tag_count, 2);
        assert_eq!(update.tags.len(), 2);
        assert!(update.tags.contains(&"cat".to_string()));
        assert!(update.tags.contains(&"traffic light".to_string()));

        let metadata = update.detection_metadata.unwrap();
        assert_eq!(metadata.len(), 2);
        assert!(metadata.iter().all(|m| m.detection_count == 1));
    }

    #[test]
    fn test_build_update_without_metadata() {
        let tags = sample_tags();
        let update = build_update(
            &tags,
            UpdateOptions {
                include_metadata: false,
            },
        );

        assert!(update.detection_metadata.is_none());
        let json = serde_json::to_value(&update).unwrap();
        assert!(json.get("detectionMetadata").is_none());
        assert_eq!(json["tagCount"], 2);
    }

    #[test]
    fn test_tagging_result_counters() {
        let tags = sample_tags();
        let ok = TaggingResult::success(tags.clone(), "att1");
        assert!(ok.success);
        assert_eq!(ok.total_detections, 2);
        assert_eq!(ok.unique_classes, 2);
        assert_eq!(ok.tag_ids.len(), 2);

        let failed = TaggingResult::failure(tags, "att1");
        assert!(!failed.success);
        assert_eq!(failed.total_detections, 0);
        assert_eq!(failed.unique_classes, 0);
        assert!(failed.tag_ids.is_empty());
    }
}
