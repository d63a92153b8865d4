pub mod alert_engines;
pub mod alert_registry;
pub mod alert_events;
pub mod analytics;
pub mod cameras;
pub mod license_plates;
pub mod settings;
pub mod zones;

pub use alert_engines::AlertEnginesRepository;
pub use alert_registry::AlertRegistryRepository;
pub use alert_events::AlertEventsRepository;
pub use analytics::AnalyticsRepository;
pub use cameras::CamerasRepository;
pub use license_plates::LicensePlatesRepository;
pub use settings::SettingsRepository;
pub use zones::ZonesRepository;
