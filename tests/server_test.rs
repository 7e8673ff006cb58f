//! Integration tests for the vision-tag-agent HTTP server

#[cfg(feature = "server")]
mod server_tests {
    use std::time::Duration;
    use vision_tag_agent::core::AggregatorOptions;
    use vision_tag_agent::server::{run, ServerConfig};

    fn test_config() -> ServerConfig {
        // Random port; low detection count so small batches produce tags
        ServerConfig::new(
            0,
            AggregatorOptions {
                min_detection_count: 1,
                ..AggregatorOptions::default()
            },
        )
    }

    fn sample_batch() -> serde_json::Value {
        serde_json::json!({
            "detections": [
                { "class_name": "cat", "class_id": 15, "confidence": 0.9 },
                { "class_name": "dog", "class_id": 16, "confidence": 0.8 },
                { "class_name": "bird", "class_id": 14, "confidence": 0.3 }
            ]
        })
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (addr, shutdown_tx) = run(test_config()).await.expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_ingest_filters_low_confidence() {
        let (addr, shutdown_tx) = run(test_config()).await.expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{}/ingest", addr))
            .header("Content-Type", "application/json")
            .json(&sample_batch())
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        // The 0.3-confidence bird falls below the default 0.6 threshold
        assert_eq!(body["accepted"], 2);
        assert_eq!(body["dropped"], 1);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_ingest_then_tags() {
        let (addr, shutdown_tx) = run(test_config()).await.expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        client
            .post(format!("http://{}/ingest", addr))
            .json(&sample_batch())
            .send()
            .await
            .expect("Failed to send request");

        let response = client
            .get(format!("http://{}/tags", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let report: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(report["report_version"], "1.0");
        assert_eq!(report["producer"]["name"], "vision-tag-agent");

        let tags = report["tags"].as_array().expect("tags should be an array");
        assert_eq!(tags.len(), 2);
        // Cat has the higher confidence, so it ranks first
        assert_eq!(tags[0]["name"], "cat");
        assert_eq!(tags[1]["name"], "dog");

        assert_eq!(report["stats"]["totalDetections"], 2);
        assert_eq!(report["stats"]["uniqueClasses"], 2);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_clear_resets_window() {
        let (addr, shutdown_tx) = run(test_config()).await.expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        client
            .post(format!("http://{}/ingest", addr))
            .json(&sample_batch())
            .send()
            .await
            .expect("Failed to send request");

        let response = client
            .post(format!("http://{}/clear", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());

        let stats: serde_json::Value = client
            .get(format!("http://{}/stats", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");

        assert_eq!(stats["aggregator"]["totalDetections"], 0);
        assert_eq!(stats["aggregator"]["uniqueClasses"], 0);
        // Session counters survive the clear
        assert_eq!(stats["session"]["batches_received"], 1);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_flush_without_attachment_target() {
        let (addr, shutdown_tx) = run(test_config()).await.expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{}/flush", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(
            response.status(),
            reqwest::StatusCode::SERVICE_UNAVAILABLE
        );

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "NO_ATTACHMENT");

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let (addr, shutdown_tx) = run(test_config()).await.expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let response = client
            .request(reqwest::Method::OPTIONS, format!("http://{}/ingest", addr))
            .header("Origin", "http://localhost")
            .header("Access-Control-Request-Method", "POST")
            .send()
            .await
            .expect("Failed to send request");

        assert!(
            response.status().is_success() || response.status() == reqwest::StatusCode::NO_CONTENT,
            "CORS preflight failed: {}",
            response.status()
        );

        let _ = shutdown_tx.send(());
    }
}
