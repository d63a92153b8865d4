use crate::api::rest::{ApiError, ApiResult, AppState};
use crate::db::models::{CreateSettings, Settings, UpdateSettings};
use crate::db::repositories::SettingsRepository;
use crate::error::Error;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use log::info;
use std::sync::Arc;

pub fn create_router() -> Router<AppState> {
    Router::new().route(
        "/",
        get(get_settings).put(update_settings).post(create_settings),
    )
}

/// Stored settings, creating the defaults on first access
async fn current_settings(repo: &SettingsRepository) -> ApiResult<Settings> {
    if let Some(settings) = repo.get().await? {
        return Ok(settings);
    }
    info!("No settings stored yet, creating defaults");
    Ok(repo.create(&CreateSettings::default()).await?)
}

pub async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<Settings>> {
    let repo = SettingsRepository::new(Arc::clone(&state.db_pool));
    Ok(Json(current_settings(&repo).await?))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(request): Json<UpdateSettings>,
) -> ApiResult<Json<Settings>> {
    let repo = SettingsRepository::new(Arc::clone(&state.db_pool));
    let settings = current_settings(&repo).await?;
    repo.update(settings.id, &request)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Settings not found"))
}

pub async fn create_settings(
    State(state): State<AppState>,
    Json(request): Json<CreateSettings>,
) -> ApiResult<(StatusCode, Json<Settings>)> {
    let repo = SettingsRepository::new(Arc::clone(&state.db_pool));
    if repo.get().await?.is_some() {
        return Err(Error::AlreadyExists(
            "Settings already exist. Use PUT to update.".to_string(),
        )
        .into());
    }
    let settings = repo.create(&request).await?;
    Ok((StatusCode::CREATED, Json(settings)))
}
