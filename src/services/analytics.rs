use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Analytics kinds known to the dashboard; anything else is kept as `Custom`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsType {
    PeopleCounting,
    DwellTime,
    Demographic,
    Custom(String),
}

impl AnalyticsType {
    pub const PREDEFINED: [AnalyticsType; 3] = [
        AnalyticsType::PeopleCounting,
        AnalyticsType::DwellTime,
        AnalyticsType::Demographic,
    ];

    pub fn parse(value: &str) -> Self {
        match value {
            "people_counting" => Self::PeopleCounting,
            "dwell_time" => Self::DwellTime,
            "demographic" => Self::Demographic,
            other => Self::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::PeopleCounting => "people_counting",
            Self::DwellTime => "dwell_time",
            Self::Demographic => "demographic",
            Self::Custom(name) => name,
        }
    }

    /// Catalogue entry for predefined kinds
    pub fn descriptor(&self) -> Option<AnalyticsDescriptor> {
        let (name, description, default_config) = match self {
            Self::PeopleCounting => (
                "People Counting",
                "Track the number of people entering and exiting areas",
                json!({
                    "threshold": 0.5,
                    "min_height": 100,
                    "max_height": 300,
                    "tracking_enabled": true,
                    "count_direction": "both",
                    "reset_interval": 3600
                }),
            ),
            Self::DwellTime => (
                "Dwell Time Analysis",
                "Analyze how long people spend in specific areas",
                json!({
                    "min_dwell_time": 5,
                    "max_dwell_time": 300,
                    "zone_detection": true,
                    "heatmap_enabled": true,
                    "tracking_interval": 1,
                    "session_timeout": 30
                }),
            ),
            Self::Demographic => (
                "Demographic Analytics",
                "Analyze demographic information of visitors",
                json!({
                    "age_groups": ["18-25", "26-35", "36-45", "46-55", "55+"],
                    "gender_detection": true,
                    "emotion_analysis": true,
                    "privacy_mode": true,
                    "confidence_threshold": 0.7,
                    "anonymize_data": true
                }),
            ),
            Self::Custom(_) => return None,
        };

        Some(AnalyticsDescriptor {
            name,
            analytics_type: self.as_str().to_string(),
            description,
            default_config,
        })
    }

    pub fn default_config(&self) -> Option<Value> {
        self.descriptor().map(|d| d.default_config)
    }
}

impl Display for AnalyticsType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsDescriptor {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub analytics_type: String,
    pub description: &'static str,
    pub default_config: Value,
}

/// Predefined analytics kinds keyed by their wire name
pub fn catalogue() -> BTreeMap<String, AnalyticsDescriptor> {
    AnalyticsType::PREDEFINED
        .iter()
        .filter_map(|t| t.descriptor().map(|d| (t.as_str().to_string(), d)))
        .collect()
}

/// Config to store for a new analytics entry: the caller's, else the
/// predefined default for the type, else an empty object
pub fn resolve_config(analytics_type: &str, config: Option<Value>) -> Value {
    config
        .or_else(|| AnalyticsType::parse(analytics_type).default_config())
        .unwrap_or_else(|| json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_lists_predefined_kinds() {
        let types = catalogue();
        let keys: Vec<&str> = types.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["demographic", "dwell_time", "people_counting"]);
        assert_eq!(types["dwell_time"].name, "Dwell Time Analysis");
        assert_eq!(types["people_counting"].default_config["count_direction"], "both");
    }

    #[test]
    fn unknown_kinds_are_custom() {
        let kind = AnalyticsType::parse("queue_length");
        assert_eq!(kind, AnalyticsType::Custom("queue_length".to_string()));
        assert_eq!(kind.to_string(), "queue_length");
        assert!(kind.descriptor().is_none());
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let config = resolve_config("demographic", None);
        assert_eq!(config["confidence_threshold"], 0.7);

        let explicit = resolve_config("demographic", Some(json!({"privacy_mode": false})));
        assert_eq!(explicit, json!({"privacy_mode": false}));

        assert_eq!(resolve_config("queue_length", None), json!({}));
    }
}
