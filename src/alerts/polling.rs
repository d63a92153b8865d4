use super::store::AlertEventStore;
use super::tracker::{AlertTracker, Transition};
use crate::config::AlertPollingConfig;
use crate::error::Error;
use crate::services::InferenceBackend;
use anyhow::Result;
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One polling worker runs per camera and model
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PollingKey {
    pub camera_id: i32,
    pub model_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

struct WorkerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
    generation: u64,
    /// Cleared as soon as the worker leaves its poll loop
    alive: Arc<AtomicBool>,
}

impl WorkerHandle {
    fn is_live(&self) -> bool {
        self.alive.load(Ordering::Acquire) && !self.task.is_finished()
    }
}

type Registry = Arc<Mutex<HashMap<PollingKey, WorkerHandle>>>;

/// Owns the alert polling workers
pub struct PollingManager {
    inference: Arc<dyn InferenceBackend>,
    events: Arc<dyn AlertEventStore>,
    settings: AlertPollingConfig,
    workers: Registry,
    permits: Arc<Semaphore>,
    generations: AtomicU64,
    root: CancellationToken,
}

impl PollingManager {
    pub fn new(
        inference: Arc<dyn InferenceBackend>,
        events: Arc<dyn AlertEventStore>,
        settings: AlertPollingConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_workers.max(1)));
        Self {
            inference,
            events,
            settings,
            workers: Arc::new(Mutex::new(HashMap::new())),
            permits,
            generations: AtomicU64::new(0),
            root: CancellationToken::new(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.settings.model_name
    }

    fn key(&self, camera_id: i32) -> PollingKey {
        PollingKey {
            camera_id,
            model_name: self.settings.model_name.clone(),
        }
    }

    /// Start polling a camera. Starting a key that is already running does nothing.
    pub async fn start(&self, camera_id: i32, alert_type: &str) -> Result<StartOutcome> {
        let key = self.key(camera_id);
        let mut workers = self.workers.lock().await;

        if let Some(existing) = workers.get(&key) {
            if existing.is_live() {
                info!(
                    "Polling already running for camera {}, model {}",
                    key.camera_id, key.model_name
                );
                return Ok(StartOutcome::AlreadyRunning);
            }
        }

        let permit = self.permits.clone().try_acquire_owned().map_err(|_| {
            Error::Service(format!(
                "Polling capacity of {} workers reached",
                self.settings.max_workers
            ))
        })?;

        let token = self.root.child_token();
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let worker = PollingWorker {
            key: key.clone(),
            alert_type: alert_type.to_string(),
            inference: self.inference.clone(),
            events: self.events.clone(),
            settings: self.settings.clone(),
            token: token.clone(),
        };
        let registry = self.workers.clone();
        let worker_key = key.clone();
        let alive = Arc::new(AtomicBool::new(true));
        let worker_alive = alive.clone();

        let task = tokio::spawn(async move {
            worker.run().await;
            worker_alive.store(false, Ordering::Release);
            drop(permit);

            // A worker that ends on its own removes its entry, unless it was
            // already replaced or stopped.
            let mut workers = registry.lock().await;
            if workers
                .get(&worker_key)
                .map(|h| h.generation == generation)
                .unwrap_or(false)
            {
                workers.remove(&worker_key);
            }
        });

        info!(
            "Started polling for camera {}, model {}",
            key.camera_id, key.model_name
        );
        workers.insert(
            key,
            WorkerHandle {
                token,
                task,
                generation,
                alive,
            },
        );

        Ok(StartOutcome::Started)
    }

    /// Stop polling a camera and wait for its worker to finish.
    /// Returns false when nothing was running.
    pub async fn stop(&self, camera_id: i32) -> bool {
        let key = self.key(camera_id);
        let handle = self.workers.lock().await.remove(&key);

        match handle {
            Some(handle) => {
                info!(
                    "Stopping polling for camera {}, model {}",
                    key.camera_id, key.model_name
                );
                handle.token.cancel();
                if let Err(e) = handle.task.await {
                    error!("Polling worker for camera {} failed: {}", camera_id, e);
                }
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self, camera_id: i32) -> bool {
        self.workers
            .lock()
            .await
            .get(&self.key(camera_id))
            .map(WorkerHandle::is_live)
            .unwrap_or(false)
    }

    /// Keys of the running workers, ordered by camera
    pub async fn running(&self) -> Vec<PollingKey> {
        let workers = self.workers.lock().await;
        let mut keys: Vec<PollingKey> = workers
            .iter()
            .filter(|(_, h)| h.is_live())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Cancel every worker and wait for all of them
    pub async fn shutdown(&self) {
        self.root.cancel();
        let handles: Vec<(PollingKey, WorkerHandle)> =
            self.workers.lock().await.drain().collect();

        info!("Stopping {} polling workers", handles.len());
        let finished = join_all(
            handles
                .into_iter()
                .map(|(key, handle)| async move { (key, handle.task.await) }),
        )
        .await;
        for (key, result) in finished {
            if let Err(e) = result {
                error!("Polling worker for camera {} failed: {}", key.camera_id, e);
            }
        }
    }
}

struct PollingWorker {
    key: PollingKey,
    alert_type: String,
    inference: Arc<dyn InferenceBackend>,
    events: Arc<dyn AlertEventStore>,
    settings: AlertPollingConfig,
    token: CancellationToken,
}

impl PollingWorker {
    async fn ensure_model(&self) -> Result<()> {
        let loaded = match self.inference.loaded_models().await {
            Ok(models) => models.iter().any(|m| m == &self.key.model_name),
            Err(e) => {
                warn!("Could not read model info: {}", e);
                false
            }
        };

        if !loaded {
            self.inference.load_model(&self.key.model_name).await?;
        }
        Ok(())
    }

    async fn run(self) {
        let camera_id = self.key.camera_id;
        let model = self.key.model_name.clone();

        let ready = tokio::select! {
            _ = self.token.cancelled() => return,
            ready = self.ensure_model() => ready,
        };
        if let Err(e) = ready {
            error!("Failed to load model {} for camera {}: {}", model, camera_id, e);
            return;
        }
        info!("Model {} loaded for camera {}", model, camera_id);

        let mut tracker = AlertTracker::new(camera_id, self.alert_type.clone());
        match self.events.get_open(camera_id, &self.alert_type).await {
            Ok(Some(event)) => {
                info!("Continuing open alert event {} for camera {}", event.id, camera_id);
                tracker.adopt(event.id);
            }
            Ok(None) => {}
            Err(e) => warn!("Could not look up open events for camera {}: {}", camera_id, e),
        }

        let mut failures: u32 = 0;
        loop {
            let polled = tokio::select! {
                _ = self.token.cancelled() => break,
                polled = self.inference.latest_frame(camera_id, &model) => polled,
            };

            let delay = match polled {
                Ok(result) => {
                    failures = 0;
                    match tracker.observe(self.events.as_ref(), &result).await {
                        Ok(Transition::Idle) => {}
                        Ok(transition) => debug!("Camera {}: {:?}", camera_id, transition),
                        Err(e) => warn!("Failed to record alert for camera {}: {}", camera_id, e),
                    }
                    self.settings.poll_interval()
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = self.settings.retry_delay(failures);
                    warn!(
                        "Inference poll for camera {} failed ({} in a row), retrying in {:?}: {}",
                        camera_id, failures, delay, e
                    );
                    delay
                }
            };

            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        match tracker.finish(self.events.as_ref()).await {
            Ok(Some(event_id)) => info!("Closed alert event {} on stop", event_id),
            Ok(None) => {}
            Err(e) => warn!("Failed to close alert event for camera {}: {}", camera_id, e),
        }
        info!("Polling stopped for camera {}, model {}", camera_id, model);
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use crate::db::models::Detection;
    use crate::error::Error;
    use crate::services::{InferenceBackend, LatestFrameResult};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Scripted inference service; once the script is used up every poll
    /// returns no detections
    #[derive(Default)]
    pub struct ScriptedInference {
        loaded: Vec<String>,
        load_fails: bool,
        script: Mutex<VecDeque<Option<Vec<Detection>>>>,
        polls: Mutex<Vec<Instant>>,
    }

    impl ScriptedInference {
        pub fn with_model(model: &str) -> Self {
            Self {
                loaded: vec![model.to_string()],
                ..Self::default()
            }
        }

        pub fn failing_to_load() -> Self {
            Self {
                load_fails: true,
                ..Self::default()
            }
        }

        /// `Some(detections)` answers a poll, `None` fails it
        pub fn script(self, steps: Vec<Option<Vec<Detection>>>) -> Self {
            *self.script.lock().unwrap() = steps.into();
            self
        }

        pub fn poll_count(&self) -> usize {
            self.polls.lock().unwrap().len()
        }

        pub fn poll_times(&self) -> Vec<Instant> {
            self.polls.lock().unwrap().clone()
        }
    }

    pub fn person() -> Option<Vec<Detection>> {
        Some(vec![Detection::new("person", 0.9)])
    }

    pub fn nobody() -> Option<Vec<Detection>> {
        Some(Vec::new())
    }

    #[async_trait]
    impl InferenceBackend for ScriptedInference {
        async fn loaded_models(&self) -> Result<Vec<String>> {
            Ok(self.loaded.clone())
        }

        async fn load_model(&self, model_name: &str) -> Result<()> {
            if self.load_fails {
                return Err(Error::Downstream(format!("cannot load {}", model_name)).into());
            }
            Ok(())
        }

        async fn latest_frame(&self, camera_id: i32, _model_name: &str) -> Result<LatestFrameResult> {
            self.polls.lock().unwrap().push(Instant::now());
            let step = self.script.lock().unwrap().pop_front().unwrap_or_else(nobody);
            match step {
                Some(detections) => Ok(LatestFrameResult {
                    detections,
                    ai_annotation_path: Some(format!("/app/frames/{}/annotated.jpg", camera_id)),
                    ..LatestFrameResult::default()
                }),
                None => Err(Error::Downstream("inference unavailable".to_string()).into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::{nobody, person, ScriptedInference};
    use super::*;
    use crate::alerts::store::memory::{MemoryEventStore, StoreOp};
    use std::time::Duration;

    const ALERT: &str = "human_detection";

    fn settings() -> AlertPollingConfig {
        AlertPollingConfig {
            poll_interval_ms: 1000,
            model_name: "person".to_string(),
            max_workers: 4,
            backoff_multiplier: 2.0,
            max_backoff_secs: 8,
        }
    }

    fn manager(
        inference: Arc<ScriptedInference>,
        store: Arc<MemoryEventStore>,
        settings: AlertPollingConfig,
    ) -> PollingManager {
        PollingManager::new(inference, store, settings)
    }

    async fn wait_for_polls(inference: &ScriptedInference, count: usize) {
        while inference.poll_count() < count {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_polls_produce_one_event_lifecycle() {
        let inference = Arc::new(
            ScriptedInference::with_model("person").script(vec![nobody(), person(), person(), nobody()]),
        );
        let store = Arc::new(MemoryEventStore::default());
        let polling = manager(inference.clone(), store.clone(), settings());

        assert_eq!(polling.start(5, ALERT).await.unwrap(), StartOutcome::Started);
        wait_for_polls(&inference, 6).await;
        assert!(polling.stop(5).await);

        assert_eq!(
            store.ops(),
            vec![StoreOp::Open(1), StoreOp::Update(1), StoreOp::Close(1)]
        );
        assert!(store.open_events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_idempotent() {
        let inference = Arc::new(ScriptedInference::with_model("person").script(vec![person(); 3]));
        let store = Arc::new(MemoryEventStore::default());
        let polling = manager(inference.clone(), store.clone(), settings());

        assert_eq!(polling.start(1, ALERT).await.unwrap(), StartOutcome::Started);
        assert_eq!(polling.start(1, ALERT).await.unwrap(), StartOutcome::AlreadyRunning);
        assert_eq!(polling.running().await.len(), 1);

        wait_for_polls(&inference, 4).await;
        polling.shutdown().await;

        assert_eq!(store.count(|op| matches!(op, StoreOp::Open(_))), 1);
        assert_eq!(store.events().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_worker_closes_its_event_and_goes_quiet() {
        let inference = Arc::new(ScriptedInference::with_model("person").script(vec![person(); 100]));
        let store = Arc::new(MemoryEventStore::default());
        let polling = manager(inference.clone(), store.clone(), settings());

        polling.start(2, ALERT).await.unwrap();
        wait_for_polls(&inference, 2).await;
        assert!(polling.stop(2).await);
        assert!(!polling.is_running(2).await);

        let ops_at_stop = store.ops();
        let polls_at_stop = inference.poll_count();
        assert_eq!(ops_at_stop.last(), Some(&StoreOp::Close(1)));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.ops(), ops_at_stop);
        assert_eq!(inference.poll_count(), polls_at_stop);
        assert!(!polling.stop(2).await);
    }

    #[tokio::test(start_paused = true)]
    async fn model_load_failure_ends_the_worker() {
        let inference = Arc::new(ScriptedInference::failing_to_load());
        let store = Arc::new(MemoryEventStore::default());
        let polling = manager(inference.clone(), store.clone(), settings());

        assert_eq!(polling.start(9, ALERT).await.unwrap(), StartOutcome::Started);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(!polling.is_running(9).await);
        assert!(polling.running().await.is_empty());
        assert_eq!(inference.poll_count(), 0);
        assert!(store.events().is_empty());

        // the slot is free again
        assert_eq!(polling.start(9, ALERT).await.unwrap(), StartOutcome::Started);
        polling.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn exiting_worker_does_not_block_a_restart() {
        let inference = Arc::new(ScriptedInference::failing_to_load());
        let store = Arc::new(MemoryEventStore::default());
        let polling = manager(inference, store, settings());

        polling.start(3, ALERT).await.unwrap();

        // hold the registry so the failed worker cannot remove its own entry
        let workers = polling.workers.lock().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let handle = workers.get(&polling.key(3)).unwrap();
        assert!(!handle.task.is_finished());
        assert!(!handle.is_live());
        drop(workers);

        assert_eq!(polling.start(3, ALERT).await.unwrap(), StartOutcome::Started);
        polling.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn open_event_is_adopted_on_start() {
        let inference = Arc::new(ScriptedInference::with_model("person").script(vec![person()]));
        let store = Arc::new(MemoryEventStore::default());
        let existing = store.seed_open(4, ALERT);
        let polling = manager(inference.clone(), store.clone(), settings());

        polling.start(4, ALERT).await.unwrap();
        wait_for_polls(&inference, 2).await;
        polling.stop(4).await;

        assert_eq!(store.events().len(), 1);
        assert_eq!(store.ops(), vec![StoreOp::Update(existing), StoreOp::Close(existing)]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_polls_back_off_and_recover() {
        let inference = Arc::new(
            ScriptedInference::with_model("person").script(vec![None, None, None, None, nobody()]),
        );
        let store = Arc::new(MemoryEventStore::default());
        let polling = manager(inference.clone(), store.clone(), settings());

        polling.start(6, ALERT).await.unwrap();
        wait_for_polls(&inference, 7).await;
        polling.stop(6).await;

        let times = inference.poll_times();
        let gaps: Vec<u64> = times
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs())
            .collect();
        assert_eq!(&gaps[..6], &[2, 4, 8, 8, 1, 1]);
        assert!(store.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_is_bounded() {
        let inference = Arc::new(ScriptedInference::with_model("person"));
        let store = Arc::new(MemoryEventStore::default());
        let polling = manager(
            inference,
            store,
            AlertPollingConfig {
                max_workers: 1,
                ..settings()
            },
        );

        polling.start(1, ALERT).await.unwrap();
        let err = polling.start(2, ALERT).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Service(_))));

        polling.stop(1).await;
        assert_eq!(polling.start(2, ALERT).await.unwrap(), StartOutcome::Started);
        polling.shutdown().await;
    }
}
