use crate::api::rest::{ApiError, ApiResult, AppState, Pagination};
use crate::db::models::{Analytics, CameraAnalytics, CreateAnalytics, UpdateAnalytics};
use crate::db::repositories::{AnalyticsRepository, CamerasRepository};
use crate::error::Error;
use crate::services::analytics::{catalogue, resolve_config, AnalyticsDescriptor};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::Router;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_analytics).post(create_analytics))
        .route("/types", get(list_analytics_types))
        .route("/camera", post(attach_to_camera))
        .route("/camera/:camera_id", get(get_camera_analytics))
        .route("/camera/:camera_id/:id", delete(detach_from_camera))
        .route(
            "/:id",
            get(get_analytics)
                .put(update_analytics)
                .delete(delete_analytics),
        )
}

fn repository(state: &AppState) -> AnalyticsRepository {
    AnalyticsRepository::new(Arc::clone(&state.db_pool))
}

fn analytics_not_found() -> ApiError {
    ApiError::not_found("Analytics not found")
}

/// Predefined analytics kinds with their default configuration
pub async fn list_analytics_types() -> Json<BTreeMap<String, AnalyticsDescriptor>> {
    Json(catalogue())
}

pub async fn list_analytics(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Analytics>>> {
    Ok(Json(repository(&state).get_all(page.skip, page.limit).await?))
}

pub async fn create_analytics(
    State(state): State<AppState>,
    Json(mut request): Json<CreateAnalytics>,
) -> ApiResult<(StatusCode, Json<Analytics>)> {
    request.config = Some(resolve_config(&request.analytics_type, request.config.take()));
    let analytics = repository(&state).create(&request).await?;
    Ok((StatusCode::CREATED, Json(analytics)))
}

pub async fn get_analytics(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Analytics>> {
    repository(&state)
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(analytics_not_found)
}

pub async fn update_analytics(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<UpdateAnalytics>,
) -> ApiResult<Json<Analytics>> {
    repository(&state)
        .update(id, &request)
        .await?
        .map(Json)
        .ok_or_else(analytics_not_found)
}

pub async fn delete_analytics(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    if !repository(&state).delete(id).await? {
        return Err(analytics_not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_camera_analytics(
    State(state): State<AppState>,
    Path(camera_id): Path<i32>,
) -> ApiResult<Json<Vec<Analytics>>> {
    Ok(Json(repository(&state).get_by_camera(camera_id).await?))
}

pub async fn attach_to_camera(
    State(state): State<AppState>,
    Json(pairing): Json<CameraAnalytics>,
) -> ApiResult<Json<Value>> {
    let repo = repository(&state);
    let cameras = CamerasRepository::new(Arc::clone(&state.db_pool));

    let camera_exists = cameras.exists(pairing.camera_id).await?;
    let analytics = repo.get_by_id(pairing.analytics_id).await?;
    if !camera_exists || analytics.is_none() {
        return Err(Error::NotFound("Camera or analytics configuration not found".to_string()).into());
    }

    repo.attach_to_camera(pairing.camera_id, pairing.analytics_id)
        .await?;
    Ok(Json(json!({
        "message": "Analytics added to camera successfully"
    })))
}

pub async fn detach_from_camera(
    State(state): State<AppState>,
    Path((camera_id, id)): Path<(i32, i32)>,
) -> ApiResult<Json<Value>> {
    if !repository(&state).detach_from_camera(camera_id, id).await? {
        return Err(Error::NotFound("Camera or analytics configuration not found".to_string()).into());
    }
    Ok(Json(json!({
        "message": "Analytics removed from camera successfully"
    })))
}
