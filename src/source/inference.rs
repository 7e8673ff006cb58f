//! Client for the vision inference service.
//!
//! The service exposes `/detect-frame` for single-frame object detection,
//! `/models` for listing and switching the active model, and `/health`.
//! Frames travel as base64-encoded JPEG inside a `frame_data` envelope.

use crate::source::types::DetectionResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Inference service configuration.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Service host
    pub host: String,
    /// Service port
    pub port: u16,
}

impl InferenceConfig {
    /// Create a new inference service configuration.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Get the full service URL.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Get the frame detection endpoint URL.
    pub fn detect_url(&self) -> String {
        format!("{}/detect-frame", self.url())
    }

    /// Get the model management endpoint URL.
    pub fn models_url(&self) -> String {
        format!("{}/models", self.url())
    }

    /// Get the health check endpoint URL.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.url())
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", 8000)
    }
}

/// Inference client error types.
#[derive(Debug)]
pub enum InferenceError {
    /// Configuration error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Service returned an error response
    Server { status: u16, message: String },
    /// Response decoding error
    Decode(String),
}

impl std::fmt::Display for InferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InferenceError::Config(msg) => write!(f, "Inference config error: {msg}"),
            InferenceError::Network(msg) => write!(f, "Inference network error: {msg}"),
            InferenceError::Server { status, message } => {
                write!(f, "Inference server error ({status}): {message}")
            }
            InferenceError::Decode(msg) => write!(f, "Inference decode error: {msg}"),
        }
    }
}

impl std::error::Error for InferenceError {}

/// One frame submitted for detection.
#[derive(Debug, Clone, Serialize)]
pub struct FramePayload {
    /// Base64-encoded JPEG frame
    pub frame: String,
    /// Confidence threshold for this frame
    pub confidence: f64,
    /// Capture timestamp (epoch milliseconds)
    pub timestamp: i64,
}

/// Envelope the service expects around a frame payload.
#[derive(Debug, Clone, Serialize)]
struct FrameEnvelope {
    frame_data: FramePayload,
}

/// Model metadata from the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Weights path on the service host
    pub path: String,
    /// Human-readable size (e.g. "6.2MB")
    pub size: String,
    /// Model description
    pub description: String,
}

/// Service health report.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceHealth {
    /// "healthy" or "unhealthy"
    pub status: String,
    /// Currently loaded model
    #[serde(default)]
    pub current_model: Option<String>,
    /// Models available for switching
    #[serde(default)]
    pub available_models: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSwitchResponse {
    pub message: String,
    #[serde(default)]
    pub model_info: Option<ModelInfo>,
}

/// HTTP client for the vision inference service.
#[cfg(feature = "inference")]
pub struct InferenceClient {
    config: InferenceConfig,
    client: reqwest::Client,
}

#[cfg(feature = "inference")]
impl InferenceClient {
    /// Create a new inference client.
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| InferenceError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Submit one frame for object detection.
    pub async fn detect_frame(
        &self,
        payload: FramePayload,
    ) -> Result<DetectionResult, InferenceError> {
        let envelope = FrameEnvelope {
            frame_data: payload,
        };

        let response = self
            .client
            .post(self.config.detect_url())
            .json(&envelope)
            .send()
            .await
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(InferenceError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| InferenceError::Decode(e.to_string()))
    }

    /// Check service health.
    pub async fn health(&self) -> Result<ServiceHealth, InferenceError> {
        let response = self
            .client
            .get(self.config.health_url())
            .send()
            .await
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(ServiceHealth {
                status: "unhealthy".to_string(),
                current_model: None,
                available_models: None,
            });
        }

        response
            .json()
            .await
            .map_err(|e| InferenceError::Decode(e.to_string()))
    }

    /// List models available on the service.
    pub async fn list_models(&self) -> Result<HashMap<String, ModelInfo>, InferenceError> {
        let response = self
            .client
            .get(self.config.models_url())
            .send()
            .await
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(InferenceError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| InferenceError::Decode(e.to_string()))
    }

    /// Switch the service to a different model.
    pub async fn switch_model(
        &self,
        model_name: &str,
    ) -> Result<ModelSwitchResponse, InferenceError> {
        let response = self
            .client
            .post(self.config.models_url())
            .json(&serde_json::json!({ "model_name": model_name }))
            .send()
            .await
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(InferenceError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| InferenceError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference_config_urls() {
        let config = InferenceConfig::new("127.0.0.1", 8000);
        assert_eq!(config.url(), "http://127.0.0.1:8000");
        assert_eq!(config.detect_url(), "http://127.0.0.1:8000/detect-frame");
        assert_eq!(config.models_url(), "http://127.0.0.1:8000/models");
        assert_eq!(config.health_url(), "http://127.0.0.1:8000/health");
    }

    #[test]
    fn test_frame_envelope_shape() {
        let envelope = FrameEnvelope {
            frame_data: FramePayload {
                frame: "aGVsbG8=".to_string(),
                confidence: 0.5,
                timestamp: 1_700_000_000_000,
            },
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("frame_data").is_some());
        assert_eq!(json["frame_data"]["confidence"], 0.5);
    }

    #[test]
    fn test_health_decodes_partial_payload() {
        let health: ServiceHealth = serde_json::from_str(r#"{"status":"healthy"}"#).unwrap();
        assert_eq!(health.status, "healthy");
        assert!(health.current_model.is_none());
    }
}
