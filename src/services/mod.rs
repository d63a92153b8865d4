pub mod analytics;
pub mod inference;
pub mod license_plates;
pub mod video_pipeline;

pub use inference::{AiInferenceClient, InferenceBackend, LatestFrameResult};
pub use license_plates::LicensePlateService;
pub use video_pipeline::VideoPipelineClient;

use crate::error::Error;
use anyhow::Result;
use reqwest::multipart::Part;
use serde_json::{json, Value};
use std::time::Duration;

/// A file received in a multipart request, buffered in memory
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn into_part(self) -> Result<Part> {
        let part = Part::bytes(self.bytes).file_name(self.file_name);
        match self.content_type {
            Some(mime) => Ok(part
                .mime_str(&mime)
                .map_err(|e| Error::Validation(format!("Invalid content type {}: {}", mime, e)))?),
            None => Ok(part),
        }
    }
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
    Ok(client)
}

pub(crate) fn downstream(context: &str, e: reqwest::Error) -> anyhow::Error {
    Error::Downstream(format!("{}: {}", context, e)).into()
}

/// Read a JSON body, treating non-success statuses as downstream errors
pub(crate) async fn json_body(response: reqwest::Response, context: &str) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(Error::Downstream(format!("{}: status {}: {}", context, status, text)).into());
    }
    response.json::<Value>().await.map_err(|e| downstream(context, e))
}

/// Report for the test-connection endpoints, which never fail
pub(crate) fn connection_failure(url_key: &str, url: &str, service: &str, e: &reqwest::Error) -> Value {
    let mut report = if e.is_connect() {
        json!({
            "status": "connection_failed",
            "error": format!("Connection error: {}", e),
            "suggestion": format!("Check if {} service is running and accessible", service),
        })
    } else if e.is_timeout() {
        json!({
            "status": "timeout",
            "error": format!("Timeout error: {}", e),
            "suggestion": format!("{} service is not responding", service),
        })
    } else {
        json!({
            "status": "failed",
            "error": e.to_string(),
        })
    };
    report[url_key] = json!(url);
    report
}
