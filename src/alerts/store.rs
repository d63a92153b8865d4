use crate::db::models::{
    AlertEngine, AlertEngineType, AlertEvent, Camera, CreateAlertEngine, Detection,
    NewAlertEvent, UpdateAlertEngine,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persistence the polling workers need for alert events
#[async_trait]
pub trait AlertEventStore: Send + Sync {
    /// Insert a new open event. The database allows one open event per
    /// camera and alert type, so the insert is rejected while another is open.
    async fn open(&self, event: NewAlertEvent) -> Result<AlertEvent>;

    /// Replace the detections of an event; a `None` annotation keeps the
    /// stored one. Unknown ids are ignored.
    async fn update(
        &self,
        event_id: i32,
        detections: &[Detection],
        annotation_path: Option<&str>,
    ) -> Result<()>;

    /// Set the end time of an event. Unknown ids are ignored.
    async fn close(&self, event_id: i32, end_time: DateTime<Utc>) -> Result<()>;

    async fn get_open(&self, camera_id: i32, alert_type: &str) -> Result<Option<AlertEvent>>;
}

/// Persistence behind the alert engine registry: engines, their camera
/// pairings and the lookups the snapshot endpoints need
#[async_trait]
pub trait AlertEngineStore: Send + Sync {
    async fn create_engine(&self, engine: &CreateAlertEngine, is_active: bool) -> Result<AlertEngine>;

    async fn engine(&self, id: i32) -> Result<Option<AlertEngine>>;

    async fn engine_by_name(&self, name: &str) -> Result<Option<AlertEngine>>;

    async fn engines(&self, skip: i64, limit: i64) -> Result<Vec<AlertEngine>>;

    async fn update_engine(&self, id: i32, update: &UpdateAlertEngine) -> Result<Option<AlertEngine>>;

    async fn set_active(&self, id: i32, is_active: bool) -> Result<Option<AlertEngine>>;

    /// Delete an engine together with its pairings
    async fn delete_engine(&self, id: i32) -> Result<bool>;

    async fn engines_for_camera(&self, camera_id: i32) -> Result<Vec<AlertEngine>>;

    /// Camera ids paired with an engine, ascending
    async fn camera_ids(&self, alert_engine_id: i32) -> Result<Vec<i32>>;

    async fn attach(&self, camera_id: i32, alert_engine_id: i32) -> Result<()>;

    /// Returns false when the pairing did not exist
    async fn detach(&self, camera_id: i32, alert_engine_id: i32) -> Result<bool>;

    async fn active_engines(&self, engine_type: AlertEngineType) -> Result<Vec<AlertEngine>>;

    async fn camera_has_other_active(
        &self,
        camera_id: i32,
        engine_type: AlertEngineType,
        excluding: i32,
    ) -> Result<bool>;

    async fn camera_exists(&self, camera_id: i32) -> Result<bool>;

    async fn cameras_for_engine(&self, alert_engine_id: i32) -> Result<Vec<Camera>>;

    async fn latest_annotated_event(
        &self,
        camera_ids: &[i32],
        alert_type: &str,
    ) -> Result<Option<AlertEvent>>;
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use crate::error::Error;
    use sqlx::types::Json;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum StoreOp {
        Open(i32),
        Update(i32),
        Close(i32),
    }

    /// Event store kept in memory, enforcing one open event per camera and type
    #[derive(Default)]
    pub struct MemoryEventStore {
        events: Mutex<Vec<AlertEvent>>,
        ops: Mutex<Vec<StoreOp>>,
    }

    impl MemoryEventStore {
        pub fn events(&self) -> Vec<AlertEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn ops(&self) -> Vec<StoreOp> {
            self.ops.lock().unwrap().clone()
        }

        pub fn count(&self, matcher: fn(&StoreOp) -> bool) -> usize {
            self.ops.lock().unwrap().iter().filter(|op| matcher(op)).count()
        }

        pub fn open_events(&self) -> Vec<AlertEvent> {
            self.events()
                .into_iter()
                .filter(|e| e.end_time.is_none())
                .collect()
        }

        /// Seed an already-open event, as left behind by an earlier run
        pub fn seed_open(&self, camera_id: i32, alert_type: &str) -> i32 {
            let mut events = self.events.lock().unwrap();
            let id = events.len() as i32 + 1;
            events.push(AlertEvent {
                id,
                camera_id,
                alert_type: alert_type.to_string(),
                start_time: Utc::now(),
                end_time: None,
                ai_annotation_path: None,
                detection_results: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            });
            id
        }
    }

    #[async_trait]
    impl AlertEventStore for MemoryEventStore {
        async fn open(&self, event: NewAlertEvent) -> Result<AlertEvent> {
            let mut events = self.events.lock().unwrap();
            let duplicate = events.iter().any(|e| {
                e.camera_id == event.camera_id
                    && e.alert_type == event.alert_type
                    && e.end_time.is_none()
            });
            if duplicate {
                return Err(Error::Database("open event already exists".to_string()).into());
            }

            let stored = AlertEvent {
                id: events.len() as i32 + 1,
                camera_id: event.camera_id,
                alert_type: event.alert_type,
                start_time: event.start_time,
                end_time: None,
                ai_annotation_path: event.ai_annotation_path,
                detection_results: Some(Json(event.detections)),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            events.push(stored.clone());
            self.ops.lock().unwrap().push(StoreOp::Open(stored.id));
            Ok(stored)
        }

        async fn update(
            &self,
            event_id: i32,
            detections: &[Detection],
            annotation_path: Option<&str>,
        ) -> Result<()> {
            let mut events = self.events.lock().unwrap();
            if let Some(event) = events.iter_mut().find(|e| e.id == event_id) {
                event.detection_results = Some(Json(detections.to_vec()));
                if let Some(path) = annotation_path {
                    event.ai_annotation_path = Some(path.to_string());
                }
                self.ops.lock().unwrap().push(StoreOp::Update(event_id));
            }
            Ok(())
        }

        async fn close(&self, event_id: i32, end_time: DateTime<Utc>) -> Result<()> {
            let mut events = self.events.lock().unwrap();
            if let Some(event) = events.iter_mut().find(|e| e.id == event_id) {
                event.end_time = Some(end_time);
                self.ops.lock().unwrap().push(StoreOp::Close(event_id));
            }
            Ok(())
        }

        async fn get_open(&self, camera_id: i32, alert_type: &str) -> Result<Option<AlertEvent>> {
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.camera_id == camera_id && e.alert_type == alert_type && e.end_time.is_none())
                .cloned())
        }
    }

    /// Engine registry kept in memory
    #[derive(Default)]
    pub struct MemoryEngineStore {
        engines: Mutex<Vec<AlertEngine>>,
        cameras: Mutex<Vec<Camera>>,
        pairs: Mutex<Vec<(i32, i32)>>,
    }

    impl MemoryEngineStore {
        pub fn add_camera(&self, id: i32) {
            self.cameras.lock().unwrap().push(Camera {
                id,
                name: format!("camera {}", id),
                rtsp_url: format!("rtsp://10.0.0.{}/stream", id),
                location: None,
                ip_address: None,
                is_active: true,
                settings: None,
                analytics_config: None,
                vehicle_tracking_enabled: false,
                vehicle_tracking_config: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            });
        }

        pub fn pairs(&self) -> Vec<(i32, i32)> {
            self.pairs.lock().unwrap().clone()
        }

        fn modify<F>(&self, id: i32, change: F) -> Option<AlertEngine>
        where
            F: FnOnce(&mut AlertEngine),
        {
            let mut engines = self.engines.lock().unwrap();
            let engine = engines.iter_mut().find(|e| e.id == id)?;
            change(engine);
            engine.updated_at = Utc::now();
            Some(engine.clone())
        }
    }

    #[async_trait]
    impl AlertEngineStore for MemoryEngineStore {
        async fn create_engine(&self, engine: &CreateAlertEngine, is_active: bool) -> Result<AlertEngine> {
            let mut engines = self.engines.lock().unwrap();
            let created = AlertEngine {
                id: engines.iter().map(|e| e.id).max().unwrap_or(0) + 1,
                name: engine.name.clone(),
                engine_type: engine.engine_type,
                config: engine.config.clone(),
                is_active,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            engines.push(created.clone());
            Ok(created)
        }

        async fn engine(&self, id: i32) -> Result<Option<AlertEngine>> {
            Ok(self.engines.lock().unwrap().iter().find(|e| e.id == id).cloned())
        }

        async fn engine_by_name(&self, name: &str) -> Result<Option<AlertEngine>> {
            Ok(self.engines.lock().unwrap().iter().find(|e| e.name == name).cloned())
        }

        async fn engines(&self, skip: i64, limit: i64) -> Result<Vec<AlertEngine>> {
            Ok(self
                .engines
                .lock()
                .unwrap()
                .iter()
                .skip(skip as usize)
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn update_engine(&self, id: i32, update: &UpdateAlertEngine) -> Result<Option<AlertEngine>> {
            Ok(self.modify(id, |engine| {
                if let Some(name) = &update.name {
                    engine.name = name.clone();
                }
                if let Some(engine_type) = update.engine_type {
                    engine.engine_type = engine_type;
                }
                if let Some(config) = &update.config {
                    engine.config = Some(config.clone());
                }
                if let Some(is_active) = update.is_active {
                    engine.is_active = is_active;
                }
            }))
        }

        async fn set_active(&self, id: i32, is_active: bool) -> Result<Option<AlertEngine>> {
            Ok(self.modify(id, |engine| engine.is_active = is_active))
        }

        async fn delete_engine(&self, id: i32) -> Result<bool> {
            let mut engines = self.engines.lock().unwrap();
            let before = engines.len();
            engines.retain(|e| e.id != id);
            self.pairs.lock().unwrap().retain(|(_, engine_id)| *engine_id != id);
            Ok(engines.len() < before)
        }

        async fn engines_for_camera(&self, camera_id: i32) -> Result<Vec<AlertEngine>> {
            let ids: Vec<i32> = self
                .pairs()
                .into_iter()
                .filter(|(camera, _)| *camera == camera_id)
                .map(|(_, engine)| engine)
                .collect();
            Ok(self
                .engines
                .lock()
                .unwrap()
                .iter()
                .filter(|e| ids.contains(&e.id))
                .cloned()
                .collect())
        }

        async fn camera_ids(&self, alert_engine_id: i32) -> Result<Vec<i32>> {
            let mut ids: Vec<i32> = self
                .pairs()
                .into_iter()
                .filter(|(_, engine)| *engine == alert_engine_id)
                .map(|(camera, _)| camera)
                .collect();
            ids.sort();
            Ok(ids)
        }

        async fn attach(&self, camera_id: i32, alert_engine_id: i32) -> Result<()> {
            let mut pairs = self.pairs.lock().unwrap();
            if !pairs.contains(&(camera_id, alert_engine_id)) {
                pairs.push((camera_id, alert_engine_id));
            }
            Ok(())
        }

        async fn detach(&self, camera_id: i32, alert_engine_id: i32) -> Result<bool> {
            let mut pairs = self.pairs.lock().unwrap();
            let before = pairs.len();
            pairs.retain(|pair| *pair != (camera_id, alert_engine_id));
            Ok(pairs.len() < before)
        }

        async fn active_engines(&self, engine_type: AlertEngineType) -> Result<Vec<AlertEngine>> {
            Ok(self
                .engines
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.engine_type == engine_type && e.is_active)
                .cloned()
                .collect())
        }

        async fn camera_has_other_active(
            &self,
            camera_id: i32,
            engine_type: AlertEngineType,
            excluding: i32,
        ) -> Result<bool> {
            Ok(self
                .engines_for_camera(camera_id)
                .await?
                .iter()
                .any(|e| e.engine_type == engine_type && e.is_active && e.id != excluding))
        }

        async fn camera_exists(&self, camera_id: i32) -> Result<bool> {
            Ok(self.cameras.lock().unwrap().iter().any(|c| c.id == camera_id))
        }

        async fn cameras_for_engine(&self, alert_engine_id: i32) -> Result<Vec<Camera>> {
            let ids = self.camera_ids(alert_engine_id).await?;
            Ok(self
                .cameras
                .lock()
                .unwrap()
                .iter()
                .filter(|c| ids.contains(&c.id))
                .cloned()
                .collect())
        }

        async fn latest_annotated_event(
            &self,
            _camera_ids: &[i32],
            _alert_type: &str,
        ) -> Result<Option<AlertEvent>> {
            Ok(None)
        }
    }
}
