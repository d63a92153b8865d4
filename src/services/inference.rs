use super::{connection_failure, downstream, http_client, json_body, UploadedFile};
use crate::config::ServicesConfig;
use crate::db::models::Detection;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use reqwest::multipart::Form;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

/// Result of running a model on the newest frame of a camera
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatestFrameResult {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub detections: Vec<Detection>,
    pub ai_annotation_path: Option<String>,
    pub frame_path: Option<String>,
    pub frame_timestamp: Option<Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<Detection>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Detection>>::deserialize(deserializer)?.unwrap_or_default())
}

impl LatestFrameResult {
    pub fn has_detections(&self) -> bool {
        !self.detections.is_empty()
    }
}

/// The calls the alert polling worker makes against the inference service
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Names of the models the service reports as loaded
    async fn loaded_models(&self) -> Result<Vec<String>>;

    async fn load_model(&self, model_name: &str) -> Result<()>;

    async fn latest_frame(&self, camera_id: i32, model_name: &str) -> Result<LatestFrameResult>;
}

/// Reply from the shared-camera inference endpoint
#[derive(Debug, Clone)]
pub enum SharedInference {
    Completed(Value),
    Rejected { status: u16, body: String },
}

/// HTTP client for the AI inference service
#[derive(Clone)]
pub struct AiInferenceClient {
    base_url: String,
    accelerator: String,
    client: reqwest::Client,
    long_client: reqwest::Client,
}

impl AiInferenceClient {
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.ai_inference_url.trim_end_matches('/').to_string(),
            accelerator: config.accelerator.clone(),
            client: http_client(config.request_timeout_secs)?,
            long_client: http_client(config.long_request_timeout_secs)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn accelerator(&self) -> &str {
        &self.accelerator
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json(&self, path: &str, context: &str) -> Result<Value> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| downstream(context, e))?;
        json_body(response, context).await
    }

    pub async fn root(&self) -> Result<Value> {
        self.get_json("/", "AI inference service unavailable").await
    }

    pub async fn models(&self) -> Result<Value> {
        self.get_json("/models", "Failed to get available models").await
    }

    pub async fn model_info(&self) -> Result<Value> {
        self.get_json("/model/info", "Failed to get model info").await
    }

    /// Check the root and models endpoints; failures are reported, not raised
    pub async fn test_connection(&self) -> Value {
        let check = async {
            let root: Value = self.client.get(self.url("/")).send().await?.json().await?;
            let models: Value = self.client.get(self.url("/models")).send().await?.json().await?;
            Ok::<_, reqwest::Error>((root, models))
        };

        match check.await {
            Ok((root, models)) => json!({
                "status": "connected",
                "ai_inference_url": self.base_url,
                "root_endpoint": root,
                "models_endpoint": models,
            }),
            Err(e) => connection_failure("ai_inference_url", &self.base_url, "ai_inference", &e),
        }
    }

    pub async fn load_model_with(&self, model_name: &str, accelerator: &str) -> Result<Value> {
        let context = "Failed to load model";
        let response = self
            .client
            .post(self.url("/model/load"))
            .query(&[("model_name", model_name), ("accelerator", accelerator)])
            .send()
            .await
            .map_err(|e| downstream(context, e))?;
        json_body(response, context).await
    }

    pub async fn latest_frame_with(
        &self,
        camera_id: &str,
        model_name: &str,
        accelerator: &str,
    ) -> Result<Value> {
        let context = "Failed to run inference on latest frame";
        let response = self
            .client
            .post(self.url("/inference/latest-frame"))
            .query(&[
                ("camera_id", camera_id),
                ("model_name", model_name),
                ("accelerator", accelerator),
            ])
            .send()
            .await
            .map_err(|e| downstream(context, e))?;
        json_body(response, context).await
    }

    pub async fn start_background(
        &self,
        camera_id: &str,
        model_name: &str,
        accelerator: &str,
    ) -> Result<Value> {
        let context = "Failed to start background inference";
        let response = self
            .client
            .post(self.url("/inference/background"))
            .query(&[
                ("camera_id", camera_id),
                ("model_name", model_name),
                ("accelerator", accelerator),
            ])
            .send()
            .await
            .map_err(|e| downstream(context, e))?;
        json_body(response, context).await
    }

    /// Object detection on an uploaded image
    pub async fn detect(&self, object_name: &str, image: UploadedFile) -> Result<Value> {
        let context = "Failed to run object detection";
        let form = Form::new()
            .text("object_name", object_name.to_string())
            .part("image", image.into_part()?);

        let response = self
            .long_client
            .post(self.url("/inference/detection"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| downstream(context, e))?;
        json_body(response, context).await
    }

    /// Detection on the frames the video pipeline shares for `camera_id`
    pub async fn shared_camera_inference(
        &self,
        camera_id: &str,
        object_name: &str,
    ) -> Result<SharedInference> {
        let context = "Failed to run shared camera inference";
        let response = self
            .long_client
            .post(self.url(&format!("/shared/cameras/{}/inference", camera_id)))
            .form(&[("object_name", object_name)])
            .send()
            .await
            .map_err(|e| downstream(context, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(SharedInference::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| downstream(context, e))?;
        Ok(SharedInference::Completed(body))
    }
}

#[async_trait]
impl InferenceBackend for AiInferenceClient {
    async fn loaded_models(&self) -> Result<Vec<String>> {
        let info = self.model_info().await?;
        Ok(model_names(&info))
    }

    async fn load_model(&self, model_name: &str) -> Result<()> {
        debug!("Loading model {} on {}", model_name, self.accelerator);
        self.load_model_with(model_name, &self.accelerator).await?;
        Ok(())
    }

    async fn latest_frame(&self, camera_id: i32, model_name: &str) -> Result<LatestFrameResult> {
        let body = self
            .latest_frame_with(&camera_id.to_string(), model_name, &self.accelerator)
            .await?;
        let result = serde_json::from_value(body)
            .map_err(|e| Error::Downstream(format!("Unexpected inference reply: {}", e)))?;
        Ok(result)
    }
}

/// Model names from a `/model/info` reply; entries may be plain names or
/// objects carrying a `name`
pub fn model_names(info: &Value) -> Vec<String> {
    info.get("models")
        .and_then(Value::as_array)
        .map(|models| {
            models
                .iter()
                .filter_map(|m| match m {
                    Value::String(name) => Some(name.clone()),
                    other => other.get("name").and_then(Value::as_str).map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_accept_strings_and_objects() {
        let info = json!({"models": ["person", {"name": "license_plate"}, 7]});
        assert_eq!(model_names(&info), vec!["person", "license_plate"]);
        assert!(model_names(&json!({"accelerators": []})).is_empty());
    }

    #[test]
    fn latest_frame_reply_tolerates_missing_fields() {
        let result: LatestFrameResult = serde_json::from_value(json!({
            "ai_annotation_path": "/app/frames/3/annotated.jpg"
        }))
        .unwrap();
        assert!(!result.has_detections());
        assert_eq!(result.ai_annotation_path.as_deref(), Some("/app/frames/3/annotated.jpg"));

        let result: LatestFrameResult = serde_json::from_value(json!({
            "detections": [{"class_name": "person", "confidence": 0.91, "bbox": [1, 2, 3, 4]}],
            "frame_timestamp": "2024-05-01T10:00:00"
        }))
        .unwrap();
        assert!(result.has_detections());
        assert_eq!(result.detections[0].class_name(), Some("person"));

        let result: LatestFrameResult = serde_json::from_value(json!({
            "detections": [
                {"class_name": "person", "confidence": "0.9", "bbox": {"x1": 1, "y1": 2, "x2": 3, "y2": 4}},
                "person"
            ]
        }))
        .unwrap();
        assert_eq!(result.detections.len(), 2);
        assert_eq!(result.detections[0].confidence(), Some(0.9));

        let result: LatestFrameResult =
            serde_json::from_value(json!({"detections": null})).unwrap();
        assert!(!result.has_detections());
    }

    #[test]
    fn base_url_is_normalised() {
        let config = ServicesConfig {
            ai_inference_url: "http://ai_inference:8001/".to_string(),
            ..ServicesConfig::default()
        };
        let client = AiInferenceClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://ai_inference:8001");
        assert_eq!(client.url("/model/info"), "http://ai_inference:8001/model/info");
    }
}
