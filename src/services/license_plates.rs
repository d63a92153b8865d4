use super::inference::{AiInferenceClient, SharedInference};
use super::video_pipeline::VideoPipelineClient;
use super::UploadedFile;
use crate::config::StorageConfig;
use crate::db::models::license_plate_models::{
    group_repeated_plates, NO_DETECTION, NO_PLATES_FOUND, PROCESSING_ERROR, SOURCE_CAMERA,
    SOURCE_FILE,
};
use crate::db::models::{
    LicensePlateDetection, LicensePlateFilter, NewLicensePlateDetection, RepeatedPlate,
    UpdateLicensePlateDetection,
};
use crate::db::repositories::{CamerasRepository, LicensePlatesRepository};
use crate::error::Error;
use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use log::{info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

const PLATE_OBJECT: &str = "license_plate";
const DECODE_FPS: u32 = 1;
const DEFAULT_LOCATION: &str = "File Upload";

#[derive(Debug, Clone, Serialize)]
pub struct FileUploadResponse {
    pub file_id: String,
    pub filename: String,
    pub video_path: String,
    pub status: String,
    pub message: String,
}

/// Where a batch of plate records came from
#[derive(Debug, Clone)]
struct RecordSource {
    source_type: &'static str,
    source_id: Option<i32>,
    source_name: String,
    start_time_offset: Option<String>,
    location: Option<String>,
}

impl RecordSource {
    fn record(&self, plate_number: &str, confidence: f64) -> NewLicensePlateDetection {
        let video_timestamp = match self.source_type {
            SOURCE_FILE => Some(
                self.start_time_offset
                    .clone()
                    .unwrap_or_else(|| "00:00:00".to_string()),
            ),
            _ => None,
        };

        NewLicensePlateDetection {
            source_type: self.source_type.to_string(),
            source_id: self.source_id,
            source_name: self.source_name.clone(),
            plate_number: plate_number.to_string(),
            confidence,
            video_timestamp,
            start_time_offset: self.start_time_offset.clone(),
            location: self.location.clone(),
            ..NewLicensePlateDetection::default()
        }
    }

    fn marker(&self, plate_number: &str, results: Value) -> NewLicensePlateDetection {
        NewLicensePlateDetection {
            detection_bbox: Some(Vec::new()),
            detection_results: Some(results),
            ..self.record(plate_number, 0.0)
        }
    }

    /// One record per detection in an inference reply, or a marker when
    /// nothing was found
    fn from_inference(&self, reply: &Value) -> Vec<NewLicensePlateDetection> {
        let frame_path = reply
            .get("frame_path")
            .and_then(Value::as_str)
            .map(str::to_string);
        let detections = reply
            .get("detections")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        if detections.is_empty() {
            let message = match self.source_type {
                SOURCE_FILE => "No license plates detected in video",
                _ => "No license plates detected on camera",
            };
            return vec![self.marker(NO_PLATES_FOUND, json!({ "message": message }))];
        }

        detections
            .into_iter()
            .map(|detection| {
                let plate_number = detection
                    .get("class_name")
                    .and_then(Value::as_str)
                    .unwrap_or("UNKNOWN");
                let confidence = detection
                    .get("confidence")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                let bbox = detection
                    .get("bbox")
                    .and_then(Value::as_array)
                    .map(|values| values.iter().filter_map(Value::as_f64).collect())
                    .unwrap_or_default();

                NewLicensePlateDetection {
                    thumbnail_path: frame_path.clone(),
                    full_image_path: frame_path.clone(),
                    detection_bbox: Some(bbox),
                    detection_results: Some(detection.clone()),
                    ..self.record(plate_number, confidence)
                }
            })
            .collect()
    }
}

/// Camera id the pipeline uses for the frames of one uploaded file
fn file_camera_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("file_{}", &id[..8])
}

/// Stored name for an upload: a fresh id plus the original extension
fn stored_file_name(file_id: &str, original: &str) -> String {
    match Path::new(original).extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.{}", file_id, ext),
        None => file_id.to_string(),
    }
}

/// License plate detections: storage plus the upload and camera flows
#[derive(Clone)]
pub struct LicensePlateService {
    plates: LicensePlatesRepository,
    cameras: CamerasRepository,
    inference: AiInferenceClient,
    video_pipeline: VideoPipelineClient,
    storage: StorageConfig,
}

impl LicensePlateService {
    pub fn new(
        plates: LicensePlatesRepository,
        cameras: CamerasRepository,
        inference: AiInferenceClient,
        video_pipeline: VideoPipelineClient,
        storage: StorageConfig,
    ) -> Self {
        Self {
            plates,
            cameras,
            inference,
            video_pipeline,
            storage,
        }
    }

    pub async fn list(&self, filter: &LicensePlateFilter) -> Result<Vec<LicensePlateDetection>> {
        self.plates.list(filter).await
    }

    pub async fn get(&self, id: i32) -> Result<LicensePlateDetection> {
        self.plates
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound("Detection not found".to_string()).into())
    }

    pub async fn by_plate(&self, plate_number: &str) -> Result<Vec<LicensePlateDetection>> {
        self.plates.get_by_plate(plate_number).await
    }

    pub async fn by_source(
        &self,
        source_type: &str,
        source_id: Option<i32>,
    ) -> Result<Vec<LicensePlateDetection>> {
        self.plates.get_by_source(source_type, source_id).await
    }

    pub async fn update(
        &self,
        id: i32,
        update: &UpdateLicensePlateDetection,
    ) -> Result<LicensePlateDetection> {
        self.plates
            .update(id, update)
            .await?
            .ok_or_else(|| Error::NotFound("Detection not found".to_string()).into())
    }

    pub async fn delete(&self, id: i32) -> Result<()> {
        if !self.plates.deactivate(id).await? {
            return Err(Error::NotFound("Detection not found".to_string()).into());
        }
        Ok(())
    }

    /// Plates seen more than once in the last `timeframe_hours`
    pub async fn repeated(&self, timeframe_hours: i64) -> Result<Vec<RepeatedPlate>> {
        let cutoff = Utc::now() - ChronoDuration::hours(timeframe_hours.max(0));
        let recent = self.plates.get_since(cutoff).await?;
        Ok(group_repeated_plates(recent))
    }

    fn check_upload(&self, file: &UploadedFile) -> Result<()> {
        let is_video = file
            .content_type
            .as_deref()
            .map(|mime| mime.starts_with("video/"))
            .unwrap_or(false);
        if !is_video {
            return Err(Error::Validation("File must be a video".to_string()).into());
        }

        let size = file.bytes.len() as u64;
        if size > self.storage.max_upload_bytes() {
            return Err(Error::Validation(format!(
                "File too large: {:.1}MB. Maximum allowed size is {}MB.",
                size as f64 / (1024.0 * 1024.0),
                self.storage.max_upload_mb
            ))
            .into());
        }
        Ok(())
    }

    /// Store an uploaded video and run it through decode and plate inference
    pub async fn upload(
        &self,
        file: UploadedFile,
        start_time_offset: Option<String>,
        location: Option<String>,
    ) -> Result<FileUploadResponse> {
        self.check_upload(&file)?;

        let file_id = Uuid::new_v4().to_string();
        let stored_name = stored_file_name(&file_id, &file.file_name);
        let file_path: PathBuf = self.storage.upload_dir.join(stored_name);

        tokio::fs::create_dir_all(&self.storage.upload_dir)
            .await
            .map_err(Error::from)?;
        tokio::fs::write(&file_path, &file.bytes)
            .await
            .map_err(Error::from)?;
        info!(
            "Saved upload {} ({} bytes) to {}",
            file.file_name,
            file.bytes.len(),
            file_path.display()
        );

        let source = RecordSource {
            source_type: SOURCE_FILE,
            source_id: None,
            source_name: file.file_name.clone(),
            start_time_offset,
            location: location.or_else(|| Some(DEFAULT_LOCATION.to_string())),
        };

        if let Err(e) = self.process_video(&file_path, &source).await {
            warn!("Processing of {} failed: {}", file.file_name, e);
            if let Err(remove_err) = tokio::fs::remove_file(&file_path).await {
                warn!("Failed to remove {}: {}", file_path.display(), remove_err);
            }
            return Err(Error::Service(format!("Failed to process video: {}", e)).into());
        }

        Ok(FileUploadResponse {
            file_id,
            filename: file.file_name,
            video_path: file_path.display().to_string(),
            status: "success".to_string(),
            message: "Video uploaded and processed successfully".to_string(),
        })
    }

    async fn process_video(&self, file_path: &Path, source: &RecordSource) -> Result<()> {
        let camera_id = file_camera_id();
        info!("Decoding {} as {}", source.source_name, camera_id);

        self.video_pipeline
            .decode_file(&camera_id, file_path, &source.source_name, DECODE_FPS)
            .await?;
        self.wait_for_frames(&camera_id).await?;

        let records = self.run_plate_inference(&camera_id, source).await?;
        info!(
            "Stored {} plate records for {}",
            records.len(),
            source.source_name
        );
        Ok(())
    }

    async fn wait_for_frames(&self, camera_id: &str) -> Result<()> {
        let interval = Duration::from_secs(self.storage.decode_poll_secs.max(1));
        let deadline = Duration::from_secs(self.storage.decode_timeout_secs);
        let mut waited = Duration::ZERO;

        while waited < deadline {
            match self.video_pipeline.decode_status(camera_id).await {
                Ok(status) if status.is_complete() => {
                    info!("Frames ready for {}: {}", camera_id, status.frame_count);
                    return Ok(());
                }
                Ok(status) if status.is_error() => {
                    return Err(Error::Downstream(format!(
                        "Video decode failed: {}",
                        status.last_error.unwrap_or_else(|| "Unknown error".to_string())
                    ))
                    .into());
                }
                Ok(status) => info!(
                    "Still decoding {} ({}): {} frames",
                    camera_id, status.status, status.frame_count
                ),
                Err(e) => warn!("Error checking decode status for {}: {}", camera_id, e),
            }

            tokio::time::sleep(interval).await;
            waited += interval;
        }

        Err(Error::Downstream(
            "Timeout waiting for video frames to be extracted".to_string(),
        )
        .into())
    }

    /// Inference on the shared frames; failures become marker records
    async fn run_plate_inference(
        &self,
        camera_id: &str,
        source: &RecordSource,
    ) -> Result<Vec<LicensePlateDetection>> {
        let records = match self
            .inference
            .shared_camera_inference(camera_id, PLATE_OBJECT)
            .await
        {
            Ok(SharedInference::Completed(reply)) => source.from_inference(&reply),
            Ok(SharedInference::Rejected { status, body }) => {
                warn!("Plate inference for {} failed: {}", camera_id, body);
                vec![source.marker(
                    NO_DETECTION,
                    json!({ "error": "AI inference failed", "status_code": status }),
                )]
            }
            Err(e) => {
                warn!("Plate inference for {} errored: {}", camera_id, e);
                vec![source.marker(PROCESSING_ERROR, json!({ "error": e.to_string() }))]
            }
        };

        self.store(records).await
    }

    async fn store(&self, records: Vec<NewLicensePlateDetection>) -> Result<Vec<LicensePlateDetection>> {
        let mut stored = Vec::with_capacity(records.len());
        for record in &records {
            stored.push(self.plates.create(record).await?);
        }
        Ok(stored)
    }

    /// Detect plates on a camera's current frames and record each one
    pub async fn detect_from_camera(&self, camera_id: i32) -> Result<Vec<LicensePlateDetection>> {
        let camera = self
            .cameras
            .get_by_id(camera_id)
            .await?
            .ok_or_else(|| Error::NotFound("Camera not found".to_string()))?;

        let reply = match self
            .inference
            .shared_camera_inference(&camera_id.to_string(), PLATE_OBJECT)
            .await?
        {
            SharedInference::Completed(reply) => reply,
            SharedInference::Rejected { status, .. } => {
                return Err(Error::Downstream(format!(
                    "Failed to get camera frame: status {}",
                    status
                ))
                .into())
            }
        };

        let source = RecordSource {
            source_type: SOURCE_CAMERA,
            source_id: Some(camera.id),
            source_name: camera.name.clone(),
            start_time_offset: None,
            location: Some(camera.location.clone().unwrap_or_else(|| "Camera".to_string())),
        };
        self.store(source.from_inference(&reply)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_source() -> RecordSource {
        RecordSource {
            source_type: SOURCE_FILE,
            source_id: None,
            source_name: "gate.mp4".to_string(),
            start_time_offset: Some("00:01:30".to_string()),
            location: Some("North gate".to_string()),
        }
    }

    #[test]
    fn each_detection_becomes_a_record() {
        let reply = json!({
            "frame_path": "/app/frames/file_ab12cd34/frame_0001.jpg",
            "detections": [
                {"class_name": "AB123CD", "confidence": 0.93, "bbox": [10, 20, 110, 60]},
                {"confidence": 0.41}
            ]
        });

        let records = file_source().from_inference(&reply);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].plate_number, "AB123CD");
        assert_eq!(records[0].detection_bbox, Some(vec![10.0, 20.0, 110.0, 60.0]));
        assert_eq!(
            records[0].thumbnail_path.as_deref(),
            Some("/app/frames/file_ab12cd34/frame_0001.jpg")
        );
        assert_eq!(records[0].video_timestamp.as_deref(), Some("00:01:30"));
        assert_eq!(records[1].plate_number, "UNKNOWN");
        assert_eq!(records[1].detection_bbox, Some(Vec::new()));
    }

    #[test]
    fn empty_reply_gives_one_marker() {
        let records = file_source().from_inference(&json!({"detections": []}));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].plate_number, NO_PLATES_FOUND);
        assert_eq!(records[0].confidence, 0.0);
        assert_eq!(records[0].source_type, SOURCE_FILE);
    }

    #[test]
    fn camera_records_carry_the_camera() {
        let source = RecordSource {
            source_type: SOURCE_CAMERA,
            source_id: Some(4),
            source_name: "Loading dock".to_string(),
            start_time_offset: None,
            location: Some("Camera".to_string()),
        };
        let records = source.from_inference(&json!({
            "detections": [{"class_name": "XY999", "confidence": 0.8}]
        }));
        assert_eq!(records[0].source_id, Some(4));
        assert_eq!(records[0].source_type, SOURCE_CAMERA);
        assert!(records[0].video_timestamp.is_none());
    }

    #[test]
    fn generated_names() {
        let camera_id = file_camera_id();
        assert!(camera_id.starts_with("file_"));
        assert_eq!(camera_id.len(), "file_".len() + 8);

        assert_eq!(stored_file_name("abc", "clip.MOV"), "abc.MOV");
        assert_eq!(stored_file_name("abc", "clip"), "abc");
    }
}
