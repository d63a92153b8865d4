use super::{connection_failure, downstream, http_client, json_body, UploadedFile};
use crate::config::ServicesConfig;
use anyhow::Result;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;

const API_PREFIX: &str = "/api/v1/video-pipeline";

/// Parameters for a decode job
#[derive(Debug, Default)]
pub struct DecodeRequest {
    pub camera_id: Option<String>,
    pub file: Option<UploadedFile>,
    pub url: Option<String>,
    pub fps: u32,
    pub force_format: Option<String>,
}

/// Progress of a decode job as reported by the pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecodeStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub frame_count: u64,
    pub last_error: Option<String>,
}

impl DecodeStatus {
    pub fn is_complete(&self) -> bool {
        self.status == "completed" && self.frame_count > 0
    }

    pub fn is_error(&self) -> bool {
        self.status == "error"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRequest {
    pub video_url: String,
    pub timestamp: String,
    pub output_image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRequest {
    pub video_url: String,
    pub start_time: String,
    pub duration: String,
    pub output_path: String,
}

/// HTTP client for the video decoding pipeline
#[derive(Clone)]
pub struct VideoPipelineClient {
    base_url: String,
    client: reqwest::Client,
    long_client: reqwest::Client,
}

impl VideoPipelineClient {
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.video_pipeline_url.trim_end_matches('/').to_string(),
            client: http_client(config.request_timeout_secs)?,
            long_client: http_client(config.long_request_timeout_secs)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}/{}/", self.base_url, API_PREFIX, endpoint)
    }

    async fn get_json(&self, endpoint: &str, context: &str) -> Result<Value> {
        let response = self
            .client
            .get(self.url(endpoint))
            .send()
            .await
            .map_err(|e| downstream(context, e))?;
        json_body(response, context).await
    }

    pub async fn health(&self) -> Result<Value> {
        self.get_json("health", "Video pipeline service unavailable").await
    }

    pub async fn test_connection(&self) -> Value {
        let check = async {
            let root: Value = self
                .client
                .get(format!("{}/", self.base_url))
                .send()
                .await?
                .json()
                .await?;
            let health: Value = self.client.get(self.url("health")).send().await?.json().await?;
            let debug: Value = self.client.get(self.url("debug")).send().await?.json().await?;
            Ok::<_, reqwest::Error>((root, health, debug))
        };

        match check.await {
            Ok((root, health, debug)) => json!({
                "status": "connected",
                "video_pipeline_url": self.base_url,
                "root_endpoint": root,
                "health_endpoint": health,
                "debug_endpoint": debug,
            }),
            Err(e) => connection_failure("video_pipeline_url", &self.base_url, "video-pipeline", &e),
        }
    }

    pub async fn video_info(&self, video: UploadedFile) -> Result<Value> {
        let context = "Failed to get video info";
        let form = Form::new().part("video", video.into_part()?);
        let response = self
            .long_client
            .post(self.url("video-info"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| downstream(context, e))?;
        json_body(response, context).await
    }

    pub async fn decode(&self, request: DecodeRequest) -> Result<Value> {
        let context = "Failed to decode video";
        let mut form = Form::new().text("fps", request.fps.to_string());
        if let Some(camera_id) = request.camera_id {
            form = form.text("camera_id", camera_id);
        }
        if let Some(url) = request.url {
            form = form.text("url", url);
        }
        if let Some(force_format) = request.force_format {
            form = form.text("force_format", force_format);
        }
        if let Some(file) = request.file {
            form = form.part("file", file.into_part()?);
        }

        let response = self
            .long_client
            .post(self.url("decode"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| downstream(context, e))?;
        json_body(response, context).await
    }

    /// Start decoding a file already on disk
    pub async fn decode_file(&self, camera_id: &str, path: &Path, file_name: &str, fps: u32) -> Result<Value> {
        let bytes = tokio::fs::read(path).await.map_err(crate::error::Error::from)?;
        let context = "Video pipeline decode failed";
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("video/mp4")
            .map_err(|e| downstream(context, e))?;
        let form = Form::new()
            .text("camera_id", camera_id.to_string())
            .text("fps", fps.to_string())
            .part("file", part);

        let response = self
            .long_client
            .post(self.url("decode"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| downstream(context, e))?;
        json_body(response, context).await
    }

    pub async fn decode_status(&self, camera_id: &str) -> Result<DecodeStatus> {
        let context = "Failed to get decode status";
        let response = self
            .client
            .get(self.url("decode/status"))
            .query(&[("camera_id", camera_id)])
            .send()
            .await
            .map_err(|e| downstream(context, e))?;
        let body = json_body(response, context).await?;
        Ok(serde_json::from_value(body).map_err(crate::error::Error::from)?)
    }

    pub async fn decode_stop(&self, camera_id: &str) -> Result<Value> {
        let context = "Failed to stop decode";
        let response = self
            .client
            .post(self.url("decode/stop"))
            .form(&[("camera_id", camera_id)])
            .send()
            .await
            .map_err(|e| downstream(context, e))?;
        json_body(response, context).await
    }

    pub async fn latest_frame(&self, camera_id: &str) -> Result<Value> {
        let context = "Failed to get latest frame";
        let response = self
            .client
            .get(self.url("latest-frame"))
            .query(&[("camera_id", camera_id)])
            .send()
            .await
            .map_err(|e| downstream(context, e))?;
        json_body(response, context).await
    }

    pub async fn snapshot(&self, request: &SnapshotRequest) -> Result<Value> {
        let context = "Failed to capture snapshot";
        let response = self
            .long_client
            .post(self.url("snapshot"))
            .json(request)
            .send()
            .await
            .map_err(|e| downstream(context, e))?;
        json_body(response, context).await
    }

    pub async fn record(&self, request: &RecordRequest) -> Result<Value> {
        let context = "Failed to record clip";
        let response = self
            .long_client
            .post(self.url("record"))
            .json(request)
            .send()
            .await
            .map_err(|e| downstream(context, e))?;
        json_body(response, context).await
    }

    pub async fn hw_accel_capabilities(&self) -> Result<Value> {
        self.get_json("hw-accel-cap", "Failed to get hardware acceleration info")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_live_under_the_pipeline_prefix() {
        let client = VideoPipelineClient::new(&ServicesConfig::default()).unwrap();
        assert_eq!(
            client.url("decode/status"),
            "http://video-pipeline:8002/api/v1/video-pipeline/decode/status/"
        );
    }

    #[test]
    fn decode_status_states() {
        let running: DecodeStatus =
            serde_json::from_value(json!({"status": "running", "frame_count": 4})).unwrap();
        assert!(!running.is_complete());

        let empty: DecodeStatus =
            serde_json::from_value(json!({"status": "completed"})).unwrap();
        assert!(!empty.is_complete());

        let done: DecodeStatus =
            serde_json::from_value(json!({"status": "completed", "frame_count": 12})).unwrap();
        assert!(done.is_complete());

        let failed: DecodeStatus =
            serde_json::from_value(json!({"status": "error", "last_error": "bad codec"})).unwrap();
        assert!(failed.is_error());
        assert_eq!(failed.last_error.as_deref(), Some("bad codec"));
    }
}
