use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Analytics configuration
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Analytics {
    pub id: i32,
    pub name: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub analytics_type: String,
    pub config: Option<serde_json::Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAnalytics {
    pub name: String,
    #[serde(rename = "type")]
    pub analytics_type: String,
    pub config: Option<serde_json::Value>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAnalytics {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub analytics_type: Option<String>,
    pub config: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

/// Camera / analytics pairing
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CameraAnalytics {
    pub camera_id: i32,
    pub analytics_id: i32,
}
