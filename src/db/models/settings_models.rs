use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-wide dashboard settings (a single row)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Settings {
    pub id: i32,
    pub store_name: String,
    pub store_description: Option<String>,
    pub store_timezone: String,
    pub store_language: String,
    pub store_theme: String,
    pub store_notifications_enabled: bool,
    pub store_analytics_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSettings {
    pub store_name: String,
    pub store_description: Option<String>,
    #[serde(default = "default_timezone")]
    pub store_timezone: String,
    #[serde(default = "default_language")]
    pub store_language: String,
    #[serde(default = "default_theme")]
    pub store_theme: String,
    #[serde(default = "default_true")]
    pub store_notifications_enabled: bool,
    #[serde(default = "default_true")]
    pub store_analytics_enabled: bool,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_theme() -> String {
    "light".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for CreateSettings {
    fn default() -> Self {
        Self {
            store_name: "Default Store".to_string(),
            store_description: None,
            store_timezone: default_timezone(),
            store_language: default_language(),
            store_theme: default_theme(),
            store_notifications_enabled: true,
            store_analytics_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSettings {
    pub store_name: Option<String>,
    pub store_description: Option<String>,
    pub store_timezone: Option<String>,
    pub store_language: Option<String>,
    pub store_theme: Option<String>,
    pub store_notifications_enabled: Option<bool>,
    pub store_analytics_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Store {
    pub id: i32,
    pub name: String,
}
