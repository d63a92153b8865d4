use crate::api::rest::{image_response, ApiResult, AppState, Pagination};
use crate::alerts::PollingKey;
use crate::db::models::{
    AlertEngine, Camera, CameraAlertEngine, CreateAlertEngine, UpdateAlertEngine,
};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Json, Response};
use axum::routing::{delete, get, patch, post};
use axum::Router;
use log::info;
use serde_json::{json, Value};

/// Create alert engine router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_alert_engines).post(create_alert_engine))
        .route("/polling", get(list_pollers))
        .route("/camera", post(attach_to_camera))
        .route("/camera/:camera_id", get(get_camera_alert_engines))
        .route("/camera/:camera_id/:id", delete(detach_from_camera))
        .route(
            "/:id",
            get(get_alert_engine)
                .put(update_alert_engine)
                .delete(delete_alert_engine),
        )
        .route("/:id/cameras", get(get_alert_engine_cameras))
        .route("/:id/toggle", patch(toggle_alert_engine))
        .route("/:id/snapshot", get(get_snapshot))
        .route("/:id/latest-annotated-snapshot", get(get_latest_annotated_snapshot))
}

pub async fn list_alert_engines(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<AlertEngine>>> {
    let engines = state.alert_engines.list(page.skip, page.limit).await?;
    Ok(Json(engines))
}

pub async fn create_alert_engine(
    State(state): State<AppState>,
    Json(request): Json<CreateAlertEngine>,
) -> ApiResult<(StatusCode, Json<AlertEngine>)> {
    let engine = state.alert_engines.create(request).await?;
    info!("Created alert engine {} ({})", engine.name, engine.engine_type);
    Ok((StatusCode::CREATED, Json(engine)))
}

pub async fn get_alert_engine(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<AlertEngine>> {
    Ok(Json(state.alert_engines.get(id).await?))
}

pub async fn update_alert_engine(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<UpdateAlertEngine>,
) -> ApiResult<Json<AlertEngine>> {
    Ok(Json(state.alert_engines.update(id, request).await?))
}

pub async fn delete_alert_engine(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    state.alert_engines.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_camera_alert_engines(
    State(state): State<AppState>,
    Path(camera_id): Path<i32>,
) -> ApiResult<Json<Vec<AlertEngine>>> {
    Ok(Json(state.alert_engines.engines_for_camera(camera_id).await?))
}

pub async fn get_alert_engine_cameras(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Vec<Camera>>> {
    Ok(Json(state.alert_engines.cameras_for_engine(id).await?))
}

fn attached() -> (StatusCode, Json<Value>) {
    (
        StatusCode::CREATED,
        Json(json!({
            "message": "Alert engine added to camera successfully"
        })),
    )
}

pub async fn attach_to_camera(
    State(state): State<AppState>,
    Json(pairing): Json<CameraAlertEngine>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    state
        .alert_engines
        .attach(pairing.camera_id, pairing.alert_engine_id)
        .await?;
    info!(
        "Alert engine {} attached to camera {}",
        pairing.alert_engine_id, pairing.camera_id
    );
    Ok(attached())
}

pub async fn detach_from_camera(
    State(state): State<AppState>,
    Path((camera_id, id)): Path<(i32, i32)>,
) -> ApiResult<StatusCode> {
    state.alert_engines.detach(camera_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_alert_engine(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<AlertEngine>> {
    let engine = state.alert_engines.toggle_active(id).await?;
    info!(
        "Alert engine {} is now {}",
        engine.id,
        if engine.is_active { "active" } else { "inactive" }
    );
    Ok(Json(engine))
}

pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Response> {
    let path = state.alert_engines.latest_snapshot(id).await?;
    image_response(&path).await
}

pub async fn get_latest_annotated_snapshot(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Response> {
    let path = state.alert_engines.latest_annotated_snapshot(id).await?;
    image_response(&path).await
}

/// Running polling workers
pub async fn list_pollers(State(state): State<AppState>) -> Json<Vec<PollingKey>> {
    Json(state.alert_engines.running_pollers().await)
}
