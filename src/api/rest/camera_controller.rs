use crate::api::rest::{ApiError, ApiResult, AppState};
use crate::db::models::{Camera, CreateCamera, UpdateCamera};
use crate::db::repositories::CamerasRepository;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, put};
use axum::Router;
use log::info;
use serde_json::Value;
use std::sync::Arc;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_cameras).post(create_camera))
        .route(
            "/:id",
            get(get_camera).put(update_camera).delete(delete_camera),
        )
        .route("/:id/analytics", put(update_camera_analytics))
}

fn repository(state: &AppState) -> CamerasRepository {
    CamerasRepository::new(Arc::clone(&state.db_pool))
}

fn camera_not_found() -> ApiError {
    ApiError::not_found("Camera not found")
}

pub async fn list_cameras(State(state): State<AppState>) -> ApiResult<Json<Vec<Camera>>> {
    Ok(Json(repository(&state).get_all().await?))
}

pub async fn create_camera(
    State(state): State<AppState>,
    Json(request): Json<CreateCamera>,
) -> ApiResult<(StatusCode, Json<Camera>)> {
    let camera = repository(&state).create(&request).await?;
    info!("Registered camera {} ({})", camera.id, camera.name);
    Ok((StatusCode::CREATED, Json(camera)))
}

pub async fn get_camera(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Camera>> {
    repository(&state)
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(camera_not_found)
}

pub async fn update_camera(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<UpdateCamera>,
) -> ApiResult<Json<Camera>> {
    repository(&state)
        .update(id, &request)
        .await?
        .map(Json)
        .ok_or_else(camera_not_found)
}

pub async fn delete_camera(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    // stop polling before the camera row goes away
    state.alert_engines.polling().stop(id).await;

    if !repository(&state).delete(id).await? {
        return Err(camera_not_found());
    }
    info!("Deleted camera {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Replace the camera's analytics configuration
pub async fn update_camera_analytics(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(analytics_config): Json<Value>,
) -> ApiResult<Json<Camera>> {
    repository(&state)
        .update_analytics_config(id, &analytics_config)
        .await?
        .map(Json)
        .ok_or_else(camera_not_found)
}
