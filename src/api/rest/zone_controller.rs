use crate::api::rest::{require_camera, ApiError, ApiResult, AppState};
use crate::db::models::{CreateZone, UpdateZone, Zone};
use crate::db::repositories::ZonesRepository;
use crate::error::Error;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_zones).post(create_zone))
        .route("/:id", get(get_zone).put(update_zone).delete(delete_zone))
}

fn repository(state: &AppState) -> ZonesRepository {
    ZonesRepository::new(Arc::clone(&state.db_pool))
}

fn zone_not_found() -> ApiError {
    ApiError::not_found("Zone not found")
}

pub async fn list_zones(State(state): State<AppState>) -> ApiResult<Json<Vec<Zone>>> {
    Ok(Json(repository(&state).get_all().await?))
}

pub async fn create_zone(
    State(state): State<AppState>,
    Json(request): Json<CreateZone>,
) -> ApiResult<(StatusCode, Json<Zone>)> {
    require_camera(&state, request.camera_id).await?;

    let repo = repository(&state);
    if repo.get_by_name(&request.name).await?.is_some() {
        return Err(Error::DuplicateName("Zone with this name already exists".to_string()).into());
    }

    let zone = repo.create(&request).await?;
    Ok((StatusCode::CREATED, Json(zone)))
}

pub async fn get_zone(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Zone>> {
    repository(&state)
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(zone_not_found)
}

pub async fn update_zone(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<UpdateZone>,
) -> ApiResult<Json<Zone>> {
    let repo = repository(&state);

    if let Some(name) = request.name.as_deref() {
        if let Some(other) = repo.get_by_name(name).await? {
            if other.id != id {
                return Err(
                    Error::DuplicateName("Zone with this name already exists".to_string()).into(),
                );
            }
        }
    }

    repo.update(id, &request)
        .await?
        .map(Json)
        .ok_or_else(zone_not_found)
}

pub async fn delete_zone(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    if !repository(&state).delete(id).await? {
        return Err(zone_not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}
