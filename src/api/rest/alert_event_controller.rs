use crate::api::rest::{ApiError, ApiResult, AppState};
use crate::db::models::{AlertEvent, AlertEventQuery};
use crate::db::repositories::AlertEventsRepository;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(search_alert_events))
        .route("/:id", get(get_alert_event))
}

/// List events, optionally by camera, alert type, or still-open only
pub async fn search_alert_events(
    State(state): State<AppState>,
    Query(query): Query<AlertEventQuery>,
) -> ApiResult<Json<Vec<AlertEvent>>> {
    let repo = AlertEventsRepository::new(Arc::clone(&state.db_pool));
    Ok(Json(repo.search(&query).await?))
}

pub async fn get_alert_event(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<AlertEvent>> {
    let repo = AlertEventsRepository::new(Arc::clone(&state.db_pool));
    repo.get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Alert event not found"))
}
