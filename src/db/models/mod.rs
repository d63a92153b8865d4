pub mod alert_models;
pub mod analytics_models;
pub mod camera_models;
pub mod detection_models;
pub mod license_plate_models;
pub mod settings_models;
pub mod zone_models;

pub use alert_models::{
    AlertEngine, AlertEngineDb, AlertEngineType, AlertEvent, AlertEventQuery, CameraAlertEngine,
    CreateAlertEngine, NewAlertEvent, UpdateAlertEngine,
};
pub use analytics_models::{Analytics, CameraAnalytics, CreateAnalytics, UpdateAnalytics};
pub use camera_models::{Camera, CreateCamera, UpdateCamera};
pub use detection_models::Detection;
pub use license_plate_models::{
    LicensePlateDetection, LicensePlateFilter, NewLicensePlateDetection, RepeatedPlate,
    UpdateLicensePlateDetection,
};
pub use settings_models::{CreateSettings, Settings, Store, UpdateSettings};
pub use zone_models::{CreateZone, UpdateZone, Zone};
