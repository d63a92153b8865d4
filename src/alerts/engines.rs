use super::polling::{PollingKey, PollingManager, StartOutcome};
use super::store::AlertEngineStore;
use crate::config::StorageConfig;
use crate::db::models::{
    AlertEngine, AlertEngineType, Camera, CreateAlertEngine, UpdateAlertEngine,
};
use crate::error::Error;
use crate::services::InferenceBackend;
use anyhow::Result;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

/// Alert engine registry: configurations, camera pairings and the polling
/// workers that follow from them
#[derive(Clone)]
pub struct AlertEngineService {
    registry: Arc<dyn AlertEngineStore>,
    polling: Arc<PollingManager>,
    inference: Arc<dyn InferenceBackend>,
    storage: StorageConfig,
}

fn engine_not_found() -> anyhow::Error {
    Error::NotFound("Alert engine not found".to_string()).into()
}

fn polls(engine: &AlertEngine) -> bool {
    engine.engine_type.polls_inference() && engine.is_active
}

impl AlertEngineService {
    pub fn new(
        registry: Arc<dyn AlertEngineStore>,
        polling: Arc<PollingManager>,
        inference: Arc<dyn InferenceBackend>,
        storage: StorageConfig,
    ) -> Self {
        Self {
            registry,
            polling,
            inference,
            storage,
        }
    }

    pub fn polling(&self) -> &Arc<PollingManager> {
        &self.polling
    }

    /// Create an engine. Polling engines start inactive until attached.
    pub async fn create(&self, request: CreateAlertEngine) -> Result<AlertEngine> {
        if self.registry.engine_by_name(&request.name).await?.is_some() {
            return Err(Error::DuplicateName(
                "Alert engine with this name already exists".to_string(),
            )
            .into());
        }

        let is_active = if request.engine_type.polls_inference() {
            false
        } else {
            request.is_active
        };
        self.registry.create_engine(&request, is_active).await
    }

    pub async fn list(&self, skip: i64, limit: i64) -> Result<Vec<AlertEngine>> {
        self.registry.engines(skip, limit).await
    }

    pub async fn get(&self, id: i32) -> Result<AlertEngine> {
        self.registry.engine(id).await?.ok_or_else(engine_not_found)
    }

    pub async fn update(&self, id: i32, request: UpdateAlertEngine) -> Result<AlertEngine> {
        let before = self.get(id).await?;

        if let Some(name) = request.name.as_deref() {
            if name != before.name {
                if let Some(other) = self.registry.engine_by_name(name).await? {
                    if other.id != id {
                        return Err(Error::DuplicateName(
                            "Alert engine with this name already exists".to_string(),
                        )
                        .into());
                    }
                }
            }
        }

        let after = self
            .registry
            .update_engine(id, &request)
            .await?
            .ok_or_else(engine_not_found)?;
        self.follow_state(&before, &after).await?;
        Ok(after)
    }

    /// Delete an engine, stopping its pollers first
    pub async fn delete(&self, id: i32) -> Result<()> {
        let engine = self.get(id).await?;
        if engine.engine_type.polls_inference() {
            for camera_id in self.registry.camera_ids(id).await? {
                self.release_camera(camera_id, id).await?;
            }
        }

        if !self.registry.delete_engine(id).await? {
            return Err(engine_not_found());
        }
        Ok(())
    }

    pub async fn engines_for_camera(&self, camera_id: i32) -> Result<Vec<AlertEngine>> {
        self.registry.engines_for_camera(camera_id).await
    }

    pub async fn cameras_for_engine(&self, id: i32) -> Result<Vec<Camera>> {
        self.get(id).await?;
        self.registry.cameras_for_engine(id).await
    }

    /// Pair a camera with an engine; a polling engine starts its worker and
    /// becomes active. A worker that fails to start is logged and the pairing
    /// is kept.
    pub async fn attach(&self, camera_id: i32, alert_engine_id: i32) -> Result<()> {
        let camera_exists = self.registry.camera_exists(camera_id).await?;
        let engine = self.registry.engine(alert_engine_id).await?;
        let engine = match (camera_exists, engine) {
            (true, Some(engine)) => engine,
            _ => {
                return Err(Error::NotFound(
                    "Camera or alert engine configuration not found".to_string(),
                )
                .into())
            }
        };

        self.registry.attach(camera_id, alert_engine_id).await?;

        if engine.engine_type.polls_inference() {
            match self
                .polling
                .start(camera_id, engine.engine_type.as_str())
                .await
            {
                Ok(outcome) => {
                    if outcome == StartOutcome::AlreadyRunning {
                        info!("Camera {} is already being polled", camera_id);
                    }
                    if !engine.is_active {
                        self.registry.set_active(engine.id, true).await?;
                    }
                }
                Err(e) => error!("Failed to start polling for camera {}: {}", camera_id, e),
            }
        }
        Ok(())
    }

    /// Remove a pairing. The camera keeps its poller while another active
    /// polling engine is still attached to it.
    pub async fn detach(&self, camera_id: i32, alert_engine_id: i32) -> Result<()> {
        let engine = self.registry.engine(alert_engine_id).await?;

        if !self.registry.detach(camera_id, alert_engine_id).await? {
            return Err(Error::NotFound(
                "Camera or alert engine configuration not found".to_string(),
            )
            .into());
        }

        if let Some(engine) = engine {
            if engine.engine_type.polls_inference() {
                self.release_camera(camera_id, engine.id).await?;
            }
        }
        Ok(())
    }

    pub async fn toggle_active(&self, id: i32) -> Result<AlertEngine> {
        let before = self.get(id).await?;
        let after = self
            .registry
            .set_active(id, !before.is_active)
            .await?
            .ok_or_else(engine_not_found)?;
        self.follow_state(&before, &after).await?;
        Ok(after)
    }

    /// Restart pollers of every active polling engine, as after a restart
    pub async fn resume_active(&self) -> Result<usize> {
        let mut started = 0;
        for engine in self
            .registry
            .active_engines(AlertEngineType::HumanDetection)
            .await?
        {
            started += self.start_cameras(&engine).await?;
        }
        info!("Resumed {} alert polling workers", started);
        Ok(started)
    }

    pub async fn running_pollers(&self) -> Vec<PollingKey> {
        self.polling.running().await
    }

    /// Start or stop pollers when an engine's type or active flag changed
    async fn follow_state(&self, before: &AlertEngine, after: &AlertEngine) -> Result<()> {
        match (polls(before), polls(after)) {
            (true, false) => {
                for camera_id in self.registry.camera_ids(after.id).await? {
                    self.release_camera(camera_id, after.id).await?;
                }
            }
            (false, true) => {
                self.start_cameras(after).await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn start_cameras(&self, engine: &AlertEngine) -> Result<usize> {
        let mut started = 0;
        for camera_id in self.registry.camera_ids(engine.id).await? {
            match self
                .polling
                .start(camera_id, engine.engine_type.as_str())
                .await
            {
                Ok(StartOutcome::Started) => started += 1,
                Ok(StartOutcome::AlreadyRunning) => {}
                Err(e) => error!("Failed to start polling for camera {}: {}", camera_id, e),
            }
        }
        Ok(started)
    }

    async fn release_camera(&self, camera_id: i32, alert_engine_id: i32) -> Result<()> {
        let still_needed = self
            .registry
            .camera_has_other_active(camera_id, AlertEngineType::HumanDetection, alert_engine_id)
            .await?;
        if still_needed {
            info!(
                "Camera {} keeps polling for another active engine",
                camera_id
            );
        } else {
            self.polling.stop(camera_id).await;
        }
        Ok(())
    }

    /// Annotated image of the engine's most recent alert event
    pub async fn latest_snapshot(&self, id: i32) -> Result<PathBuf> {
        let engine = self.get(id).await?;
        let camera_ids = self.registry.camera_ids(id).await?;

        let annotation = self
            .registry
            .latest_annotated_event(&camera_ids, engine.engine_type.as_str())
            .await?
            .and_then(|event| event.ai_annotation_path)
            .ok_or_else(|| {
                Error::NotFound("No AI annotation path found for this alert engine".to_string())
            })?;

        let path = self.storage.shared_frame_path(&annotation);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(Error::NotFound(format!("Snapshot {} not found", path.display())).into());
        }
        Ok(path)
    }

    /// Current annotated frame of the engine's first camera, falling back to
    /// the raw frame
    pub async fn latest_annotated_snapshot(&self, id: i32) -> Result<PathBuf> {
        self.get(id).await?;
        let camera_id = *self
            .registry
            .camera_ids(id)
            .await?
            .first()
            .ok_or_else(|| {
                Error::NotFound("No cameras assigned to this alert engine".to_string())
            })?;

        let frame = self
            .inference
            .latest_frame(camera_id, self.polling.model_name())
            .await
            .map_err(|e| Error::Downstream(format!("Failed to get annotated snapshot: {}", e)))?;

        for candidate in [frame.ai_annotation_path, frame.frame_path].into_iter().flatten() {
            let path = self.storage.shared_frame_path(&candidate);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(path);
            }
            warn!("Snapshot {} is not on the shared volume", path.display());
        }

        Err(Error::NotFound("No snapshot available".to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::polling::fakes::ScriptedInference;
    use crate::alerts::store::memory::{MemoryEngineStore, MemoryEventStore};
    use crate::config::AlertPollingConfig;
    use serde_json::json;

    fn service_over(registry: Arc<MemoryEngineStore>) -> AlertEngineService {
        let inference: Arc<dyn InferenceBackend> = Arc::new(ScriptedInference::with_model("person"));
        let polling = Arc::new(PollingManager::new(
            inference.clone(),
            Arc::new(MemoryEventStore::default()),
            AlertPollingConfig::default(),
        ));
        AlertEngineService::new(registry, polling, inference, StorageConfig::default())
    }

    fn people(name: &str) -> CreateAlertEngine {
        CreateAlertEngine {
            name: name.to_string(),
            engine_type: AlertEngineType::HumanDetection,
            config: None,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn config_round_trips_and_names_stay_unique() {
        let service = service_over(Arc::new(MemoryEngineStore::default()));

        let config = json!({"line": [[0, 0], [10, 10]]});
        let line = service
            .create(CreateAlertEngine {
                name: "entrance".to_string(),
                engine_type: AlertEngineType::HumanCrossingLine,
                config: Some(config.clone()),
                is_active: true,
            })
            .await
            .unwrap();
        let fetched = service.get(line.id).await.unwrap();
        assert_eq!(fetched.config, Some(config));
        assert!(fetched.is_active);

        let err = service.create(people("entrance")).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::DuplicateName(_))));

        let other = service.create(people("aisle")).await.unwrap();
        let rename = UpdateAlertEngine {
            name: Some("entrance".to_string()),
            engine_type: None,
            config: None,
            is_active: None,
        };
        let err = service.update(other.id, rename).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::DuplicateName(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn attaching_unknown_ids_has_no_side_effects() {
        let registry = Arc::new(MemoryEngineStore::default());
        registry.add_camera(1);
        let service = service_over(registry.clone());

        let engine = service.create(people("people")).await.unwrap();
        assert!(!engine.is_active);

        let err = service.attach(1, engine.id + 100).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NotFound(_))));
        let err = service.attach(42, engine.id).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NotFound(_))));

        assert!(registry.pairs().is_empty());
        assert!(service.running_pollers().await.is_empty());
        assert!(!service.get(engine.id).await.unwrap().is_active);
    }

    #[tokio::test(start_paused = true)]
    async fn attach_toggle_detach_follow_the_poller() {
        let registry = Arc::new(MemoryEngineStore::default());
        registry.add_camera(1);
        let service = service_over(registry.clone());
        let engine = service.create(people("people")).await.unwrap();

        service.attach(1, engine.id).await.unwrap();
        assert!(service.polling().is_running(1).await);
        assert!(service.get(engine.id).await.unwrap().is_active);
        assert_eq!(service.cameras_for_engine(engine.id).await.unwrap().len(), 1);

        let toggled = service.toggle_active(engine.id).await.unwrap();
        assert!(!toggled.is_active);
        assert!(!service.polling().is_running(1).await);

        service.toggle_active(engine.id).await.unwrap();
        assert!(service.polling().is_running(1).await);

        service.detach(1, engine.id).await.unwrap();
        assert!(!service.polling().is_running(1).await);

        let err = service.detach(1, engine.id).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NotFound(_))));
        service.polling().shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn camera_keeps_polling_while_another_engine_needs_it() {
        let registry = Arc::new(MemoryEngineStore::default());
        registry.add_camera(1);
        let service = service_over(registry.clone());
        let first = service.create(people("front")).await.unwrap();
        let second = service.create(people("back")).await.unwrap();

        service.attach(1, first.id).await.unwrap();
        service.attach(1, second.id).await.unwrap();
        assert_eq!(service.running_pollers().await.len(), 1);

        service.detach(1, first.id).await.unwrap();
        assert!(service.polling().is_running(1).await);

        service.delete(second.id).await.unwrap();
        assert!(!service.polling().is_running(1).await);
        assert!(registry.pairs().is_empty());
    }

    mod postgres {
        use super::*;
        use crate::db::migrations;
        use crate::db::models::CreateCamera;
        use crate::db::repositories::{AlertEventsRepository, AlertRegistryRepository, CamerasRepository};
        use sqlx::postgres::PgPoolOptions;

        /// Service over a test database, or None when TEST_DATABASE_URL is unset
        async fn service() -> Option<(AlertEngineService, CamerasRepository)> {
            let url = match std::env::var("TEST_DATABASE_URL") {
                Ok(url) => url,
                Err(_) => {
                    println!("TEST_DATABASE_URL not set, skipping database test");
                    return None;
                }
            };

            let pool = PgPoolOptions::new()
                .max_connections(2)
                .connect(&url)
                .await
                .expect("Failed to connect to test database");
            migrations::run_migrations(&pool)
                .await
                .expect("Failed to run migrations");
            let pool = Arc::new(pool);

            let inference: Arc<dyn InferenceBackend> =
                Arc::new(ScriptedInference::with_model("person"));
            let polling = Arc::new(PollingManager::new(
                inference.clone(),
                Arc::new(AlertEventsRepository::new(pool.clone())),
                AlertPollingConfig::default(),
            ));

            Some((
                AlertEngineService::new(
                    Arc::new(AlertRegistryRepository::new(pool.clone())),
                    polling,
                    inference,
                    StorageConfig::default(),
                ),
                CamerasRepository::new(pool),
            ))
        }

        fn unique(prefix: &str) -> String {
            format!("{}-{}", prefix, uuid::Uuid::new_v4())
        }

        async fn camera(cameras: &CamerasRepository) -> Camera {
            cameras
                .create(&CreateCamera {
                    name: unique("cam"),
                    rtsp_url: "rtsp://10.0.0.5/stream".to_string(),
                    location: None,
                    ip_address: None,
                    is_active: true,
                    settings: None,
                    analytics_config: None,
                    vehicle_tracking_enabled: false,
                    vehicle_tracking_config: None,
                })
                .await
                .unwrap()
        }

        #[tokio::test]
        async fn line_config_round_trips() {
            let Some((service, _)) = service().await else { return };

            let config = json!({"line": [[0, 0], [10, 10]]});
            let created = service
                .create(CreateAlertEngine {
                    name: unique("line"),
                    engine_type: AlertEngineType::HumanCrossingLine,
                    config: Some(config.clone()),
                    is_active: true,
                })
                .await
                .unwrap();

            let fetched = service.get(created.id).await.unwrap();
            assert_eq!(fetched.config, Some(config));
            assert!(fetched.is_active);

            service.delete(created.id).await.unwrap();
        }

        #[tokio::test]
        async fn attach_toggle_detach_drive_the_poller() {
            let Some((service, cameras)) = service().await else { return };

            let cam = camera(&cameras).await;
            let engine = service.create(people(&unique("people"))).await.unwrap();
            assert!(!engine.is_active);

            let err = service.attach(cam.id, i32::MAX).await.unwrap_err();
            assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NotFound(_))));
            assert!(service.engines_for_camera(cam.id).await.unwrap().is_empty());

            service.attach(cam.id, engine.id).await.unwrap();
            assert!(service.polling().is_running(cam.id).await);
            assert!(service.get(engine.id).await.unwrap().is_active);

            let toggled = service.toggle_active(engine.id).await.unwrap();
            assert!(!toggled.is_active);
            assert!(!service.polling().is_running(cam.id).await);

            service.toggle_active(engine.id).await.unwrap();
            service.detach(cam.id, engine.id).await.unwrap();
            assert!(!service.polling().is_running(cam.id).await);

            service.delete(engine.id).await.unwrap();
            cameras.delete(cam.id).await.unwrap();
            service.polling().shutdown().await;
        }
    }
}
