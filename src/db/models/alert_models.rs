use super::detection_models::Detection;
use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Alert engine types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertEngineType {
    HumanDetection,
    HumanCrossingLine,
    HumanInZone,
}

impl AlertEngineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HumanDetection => "human_detection",
            Self::HumanCrossingLine => "human_crossing_line",
            Self::HumanInZone => "human_in_zone",
        }
    }

    /// Whether attaching this engine to a camera starts a polling worker
    pub fn polls_inference(&self) -> bool {
        matches!(self, Self::HumanDetection)
    }
}

impl Display for AlertEngineType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertEngineType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human_detection" => Ok(Self::HumanDetection),
            "human_crossing_line" => Ok(Self::HumanCrossingLine),
            "human_in_zone" => Ok(Self::HumanInZone),
            other => Err(Error::Validation(format!("Unknown alert engine type: {}", other))),
        }
    }
}

/// Alert engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEngine {
    pub id: i32,
    pub name: String,
    #[serde(rename = "type")]
    pub engine_type: AlertEngineType,
    pub config: Option<serde_json::Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database representation of an alert engine, with the type kept as text
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlertEngineDb {
    pub id: i32,
    pub name: String,
    #[sqlx(rename = "type")]
    pub engine_type: String,
    pub config: Option<serde_json::Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AlertEngineDb> for AlertEngine {
    type Error = Error;

    fn try_from(row: AlertEngineDb) -> Result<Self, Self::Error> {
        let engine_type = row.engine_type.parse().map_err(|_| {
            Error::Database(format!(
                "Alert engine {} has unknown type {}",
                row.id, row.engine_type
            ))
        })?;

        Ok(Self {
            id: row.id,
            name: row.name,
            engine_type,
            config: row.config,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Request body for creating an alert engine
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAlertEngine {
    pub name: String,
    #[serde(rename = "type")]
    pub engine_type: AlertEngineType,
    pub config: Option<serde_json::Value>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Partial update of an alert engine
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAlertEngine {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub engine_type: Option<AlertEngineType>,
    pub config: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

/// Camera / alert engine pairing
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CameraAlertEngine {
    pub camera_id: i32,
    pub alert_engine_id: i32,
}

/// A recorded interval during which an alert condition held for a camera
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AlertEvent {
    pub id: i32,
    pub camera_id: i32,
    pub alert_type: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub ai_annotation_path: Option<String>,
    pub detection_results: Option<Json<Vec<Detection>>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlertEvent {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Values for a newly opened alert event
#[derive(Debug, Clone)]
pub struct NewAlertEvent {
    pub camera_id: i32,
    pub alert_type: String,
    pub start_time: DateTime<Utc>,
    pub detections: Vec<Detection>,
    pub ai_annotation_path: Option<String>,
}

/// Filters for listing alert events
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertEventQuery {
    pub camera_id: Option<i32>,
    pub alert_type: Option<String>,
    #[serde(default)]
    pub open_only: bool,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn engine_type_parses_wire_names() {
        for engine_type in [
            AlertEngineType::HumanDetection,
            AlertEngineType::HumanCrossingLine,
            AlertEngineType::HumanInZone,
        ] {
            assert_eq!(engine_type.as_str().parse::<AlertEngineType>().unwrap(), engine_type);
            assert_eq!(
                serde_json::to_value(engine_type).unwrap(),
                json!(engine_type.as_str())
            );
        }
        assert!("vehicle_detection".parse::<AlertEngineType>().is_err());
    }

    #[test]
    fn only_human_detection_polls() {
        assert!(AlertEngineType::HumanDetection.polls_inference());
        assert!(!AlertEngineType::HumanCrossingLine.polls_inference());
        assert!(!AlertEngineType::HumanInZone.polls_inference());
    }

    #[test]
    fn create_request_keeps_config_verbatim() {
        let request: CreateAlertEngine = serde_json::from_value(json!({
            "name": "entrance line",
            "type": "human_crossing_line",
            "config": {"line": [[0, 0], [10, 10]]}
        }))
        .unwrap();

        assert_eq!(request.engine_type, AlertEngineType::HumanCrossingLine);
        assert!(request.is_active);
        assert_eq!(request.config, Some(json!({"line": [[0, 0], [10, 10]]})));
    }

    #[test]
    fn unknown_stored_type_is_a_database_error() {
        let row = AlertEngineDb {
            id: 3,
            name: "legacy".to_string(),
            engine_type: "motion".to_string(),
            config: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(AlertEngine::try_from(row), Err(Error::Database(_))));
    }
}
