use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::collections::HashMap;

/// Marker plate numbers recorded when a video produced no usable plate
pub const NO_PLATES_FOUND: &str = "NO_PLATES_FOUND";
pub const NO_DETECTION: &str = "NO_DETECTION";
pub const PROCESSING_ERROR: &str = "PROCESSING_ERROR";

pub const SOURCE_CAMERA: &str = "camera";
pub const SOURCE_FILE: &str = "file";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LicensePlateDetection {
    pub id: i32,
    pub source_type: String,
    pub source_id: Option<i32>,
    pub source_name: String,
    pub plate_number: String,
    pub confidence: f64,
    pub thumbnail_path: Option<String>,
    pub full_image_path: Option<String>,
    pub detection_bbox: Option<Json<Vec<f64>>>,
    pub detection_results: Option<serde_json::Value>,
    pub video_path: Option<String>,
    pub video_timestamp: Option<String>,
    pub start_time_offset: Option<String>,
    pub location: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewLicensePlateDetection {
    pub source_type: String,
    pub source_id: Option<i32>,
    pub source_name: String,
    pub plate_number: String,
    pub confidence: f64,
    pub thumbnail_path: Option<String>,
    pub full_image_path: Option<String>,
    pub detection_bbox: Option<Vec<f64>>,
    pub detection_results: Option<serde_json::Value>,
    pub video_path: Option<String>,
    pub video_timestamp: Option<String>,
    pub start_time_offset: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateLicensePlateDetection {
    pub plate_number: Option<String>,
    pub confidence: Option<f64>,
    pub thumbnail_path: Option<String>,
    pub full_image_path: Option<String>,
    pub detection_bbox: Option<Vec<f64>>,
    pub detection_results: Option<serde_json::Value>,
    pub video_path: Option<String>,
    pub video_timestamp: Option<String>,
    pub start_time_offset: Option<String>,
    pub location: Option<String>,
    pub is_active: Option<bool>,
}

/// Query filters for listing detections
#[derive(Debug, Clone, Deserialize)]
pub struct LicensePlateFilter {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub source_type: Option<String>,
    pub plate_number: Option<String>,
    pub is_active: Option<bool>,
}

fn default_limit() -> i64 {
    100
}

impl Default for LicensePlateFilter {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: default_limit(),
            source_type: None,
            plate_number: None,
            is_active: None,
        }
    }
}

/// A plate seen more than once within a time window
#[derive(Debug, Clone, Serialize)]
pub struct RepeatedPlate {
    pub plate_number: String,
    pub count: usize,
    pub detections: Vec<LicensePlateDetection>,
}

/// Group detections by plate number, keeping plates seen more than once,
/// most frequent first.
pub fn group_repeated_plates(detections: Vec<LicensePlateDetection>) -> Vec<RepeatedPlate> {
    let mut groups: HashMap<String, Vec<LicensePlateDetection>> = HashMap::new();
    for detection in detections {
        groups
            .entry(detection.plate_number.clone())
            .or_default()
            .push(detection);
    }

    let mut repeated: Vec<RepeatedPlate> = groups
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .map(|(plate_number, detections)| RepeatedPlate {
            plate_number,
            count: detections.len(),
            detections,
        })
        .collect();

    repeated.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.plate_number.cmp(&b.plate_number))
    });
    repeated
}
