use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Camera model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Camera {
    pub id: i32,
    pub name: String,
    pub rtsp_url: String,
    pub location: Option<String>,
    pub ip_address: Option<String>,
    pub is_active: bool,
    pub settings: Option<serde_json::Value>,
    pub analytics_config: Option<serde_json::Value>,
    pub vehicle_tracking_enabled: bool,
    pub vehicle_tracking_config: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for registering a camera
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCamera {
    pub name: String,
    pub rtsp_url: String,
    pub location: Option<String>,
    pub ip_address: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub settings: Option<serde_json::Value>,
    pub analytics_config: Option<serde_json::Value>,
    #[serde(default)]
    pub vehicle_tracking_enabled: bool,
    pub vehicle_tracking_config: Option<serde_json::Value>,
}

fn default_active() -> bool {
    true
}

/// Partial camera update; absent fields keep their stored value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCamera {
    pub name: Option<String>,
    pub rtsp_url: Option<String>,
    pub location: Option<String>,
    pub ip_address: Option<String>,
    pub is_active: Option<bool>,
    pub settings: Option<serde_json::Value>,
    pub analytics_config: Option<serde_json::Value>,
    pub vehicle_tracking_enabled: Option<bool>,
    pub vehicle_tracking_config: Option<serde_json::Value>,
}
