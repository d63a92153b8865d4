use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Zone {
    pub id: i32,
    pub name: String,
    pub camera_id: i32,
    pub analytics_id: Option<i32>,
    pub settings: Option<serde_json::Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateZone {
    pub name: String,
    pub camera_id: i32,
    pub analytics_id: Option<i32>,
    pub settings: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateZone {
    pub name: Option<String>,
    pub analytics_id: Option<i32>,
    pub settings: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}
