use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A single detection reported by the inference service.
///
/// The service owns the shape of a detection; it is stored and served back
/// unchanged. The accessors read the common fields leniently and return
/// `None` when a field is missing or has an unexpected type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Detection(pub Value);

impl Detection {
    pub fn new(class_name: &str, confidence: f64) -> Self {
        Self(json!({
            "class_name": class_name,
            "confidence": confidence,
        }))
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn class_name(&self) -> Option<&str> {
        self.get("class_name").and_then(Value::as_str)
    }

    /// Confidence as a number, also accepting numeric strings
    pub fn confidence(&self) -> Option<f64> {
        match self.get("confidence")? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Bounding box in whatever form the service sent it
    pub fn bbox(&self) -> Option<&Value> {
        self.get("bbox")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detections_are_kept_verbatim() {
        let raw = json!({
            "class_name": "person",
            "confidence": 0.91,
            "bbox": [10.0, 20.0, 110.0, 220.0],
            "track_id": 7,
            "attributes": {"color": "red"}
        });

        let detection: Detection = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(detection.class_name(), Some("person"));
        assert_eq!(detection.get("track_id"), Some(&json!(7)));
        assert_eq!(serde_json::to_value(&detection).unwrap(), raw);
    }

    #[test]
    fn unexpected_field_types_still_parse() {
        let detection: Detection = serde_json::from_value(json!({
            "class_name": "person",
            "confidence": "0.9",
            "bbox": {"x1": 1, "y1": 2, "x2": 30, "y2": 40}
        }))
        .unwrap();

        assert_eq!(detection.confidence(), Some(0.9));
        assert_eq!(detection.bbox().and_then(|b| b.get("x2")), Some(&json!(30)));

        let odd: Detection = serde_json::from_value(json!({"label": "x", "confidence": [1]})).unwrap();
        assert!(odd.class_name().is_none());
        assert!(odd.confidence().is_none());
        assert!(odd.bbox().is_none());
    }
}
