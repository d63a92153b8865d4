use anyhow::Result;
use log::{error, info};
use retail_vision::alerts::{AlertEngineService, PollingManager};
use retail_vision::api::rest::{AppState, RestApi};
use retail_vision::config;
use retail_vision::db::repositories::{
    AlertEventsRepository, AlertRegistryRepository, CamerasRepository, LicensePlatesRepository,
};
use retail_vision::db::DatabaseService;
use retail_vision::services::{
    AiInferenceClient, InferenceBackend, LicensePlateService, VideoPipelineClient,
};
use std::path::PathBuf;
use std::sync::Arc;

async fn run_app() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let mut config = config::load_config(config_path.as_deref())?;
    config.apply_env_overrides();
    config.validate()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.api.log_level))
        .init();
    info!("Starting retail vision backend");

    let database = DatabaseService::new(&config.database).await?;
    let db_pool = Arc::clone(&database.pool);

    let inference = AiInferenceClient::new(&config.services)?;
    let video_pipeline = VideoPipelineClient::new(&config.services)?;
    info!(
        "Inference service at {}, video pipeline at {}",
        inference.base_url(),
        video_pipeline.base_url()
    );

    let backend: Arc<dyn InferenceBackend> = Arc::new(inference.clone());
    let events = AlertEventsRepository::new(Arc::clone(&db_pool));
    let polling = Arc::new(PollingManager::new(
        Arc::clone(&backend),
        Arc::new(events),
        config.alerts.clone(),
    ));

    let alert_engines = AlertEngineService::new(
        Arc::new(AlertRegistryRepository::new(Arc::clone(&db_pool))),
        Arc::clone(&polling),
        backend,
        config.storage.clone(),
    );

    // restart pollers for engines that were active before the last shutdown
    if let Err(e) = alert_engines.resume_active().await {
        error!("Failed to resume alert polling: {}", e);
    }

    let license_plates = LicensePlateService::new(
        LicensePlatesRepository::new(Arc::clone(&db_pool)),
        CamerasRepository::new(Arc::clone(&db_pool)),
        inference.clone(),
        video_pipeline.clone(),
        config.storage.clone(),
    );

    let state = AppState {
        db_pool,
        config: Arc::new(config.clone()),
        alert_engines,
        license_plates,
        inference,
        video_pipeline,
    };

    let http_server = RestApi::new(&config.api, state)?;
    let served = http_server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down...");
        })
        .await;

    polling.shutdown().await;
    info!("Alert polling stopped");

    served
}

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        eprintln!("Application error: {:#}", e);
        std::process::exit(1);
    }
}
