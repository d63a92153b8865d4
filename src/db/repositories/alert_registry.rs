use crate::{
    alerts::AlertEngineStore,
    db::{
        models::{
            AlertEngine, AlertEngineType, AlertEvent, Camera, CreateAlertEngine, UpdateAlertEngine,
        },
        repositories::{AlertEnginesRepository, AlertEventsRepository, CamerasRepository},
    },
};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

/// The tables behind the alert engine registry
#[derive(Clone)]
pub struct AlertRegistryRepository {
    engines: AlertEnginesRepository,
    cameras: CamerasRepository,
    events: AlertEventsRepository,
}

impl AlertRegistryRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self {
            engines: AlertEnginesRepository::new(Arc::clone(&pool)),
            cameras: CamerasRepository::new(Arc::clone(&pool)),
            events: AlertEventsRepository::new(pool),
        }
    }
}

#[async_trait]
impl AlertEngineStore for AlertRegistryRepository {
    async fn create_engine(&self, engine: &CreateAlertEngine, is_active: bool) -> Result<AlertEngine> {
        self.engines.create(engine, is_active).await
    }

    async fn engine(&self, id: i32) -> Result<Option<AlertEngine>> {
        self.engines.get_by_id(id).await
    }

    async fn engine_by_name(&self, name: &str) -> Result<Option<AlertEngine>> {
        self.engines.get_by_name(name).await
    }

    async fn engines(&self, skip: i64, limit: i64) -> Result<Vec<AlertEngine>> {
        self.engines.get_all(skip, limit).await
    }

    async fn update_engine(&self, id: i32, update: &UpdateAlertEngine) -> Result<Option<AlertEngine>> {
        self.engines.update(id, update).await
    }

    async fn set_active(&self, id: i32, is_active: bool) -> Result<Option<AlertEngine>> {
        self.engines.set_active(id, is_active).await
    }

    async fn delete_engine(&self, id: i32) -> Result<bool> {
        self.engines.delete(id).await
    }

    async fn engines_for_camera(&self, camera_id: i32) -> Result<Vec<AlertEngine>> {
        self.engines.get_by_camera(camera_id).await
    }

    async fn camera_ids(&self, alert_engine_id: i32) -> Result<Vec<i32>> {
        self.engines.camera_ids(alert_engine_id).await
    }

    async fn attach(&self, camera_id: i32, alert_engine_id: i32) -> Result<()> {
        self.engines.attach(camera_id, alert_engine_id).await
    }

    async fn detach(&self, camera_id: i32, alert_engine_id: i32) -> Result<bool> {
        self.engines.detach(camera_id, alert_engine_id).await
    }

    async fn active_engines(&self, engine_type: AlertEngineType) -> Result<Vec<AlertEngine>> {
        self.engines.get_active_by_type(engine_type).await
    }

    async fn camera_has_other_active(
        &self,
        camera_id: i32,
        engine_type: AlertEngineType,
        excluding: i32,
    ) -> Result<bool> {
        self.engines
            .camera_has_other_active(camera_id, engine_type, excluding)
            .await
    }

    async fn camera_exists(&self, camera_id: i32) -> Result<bool> {
        self.cameras.exists(camera_id).await
    }

    async fn cameras_for_engine(&self, alert_engine_id: i32) -> Result<Vec<Camera>> {
        self.cameras.get_by_alert_engine(alert_engine_id).await
    }

    async fn latest_annotated_event(
        &self,
        camera_ids: &[i32],
        alert_type: &str,
    ) -> Result<Option<AlertEvent>> {
        self.events.latest_with_annotation(camera_ids, alert_type).await
    }
}
