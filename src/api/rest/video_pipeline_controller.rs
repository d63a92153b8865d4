use crate::api::rest::{require_camera, ApiError, ApiResult, AppState, MultipartForm};
use crate::error::Error;
use crate::services::video_pipeline::{DecodeRequest, DecodeStatus, RecordRequest, SnapshotRequest};
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde_json::Value;

const DEFAULT_DECODE_FPS: u32 = 1;

pub fn create_router(max_upload: usize) -> Router<AppState> {
    Router::new()
        .route("/test-connection", get(test_connection))
        .route("/health", get(health))
        .route("/hw-accel-cap", get(hw_accel_capabilities))
        .route("/camera/:camera_id/video-info", post(video_info))
        .route("/camera/:camera_id/decode", post(decode))
        .route("/camera/:camera_id/decode/status", get(decode_status))
        .route("/camera/:camera_id/decode/stop", post(decode_stop))
        .route("/camera/:camera_id/latest-frame", get(latest_frame))
        .route("/camera/:camera_id/snapshot", post(snapshot))
        .route("/camera/:camera_id/record", post(record))
        .layer(DefaultBodyLimit::max(max_upload))
}

pub async fn test_connection(State(state): State<AppState>) -> Json<Value> {
    Json(state.video_pipeline.test_connection().await)
}

pub async fn health(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let body = state.video_pipeline.health().await.map_err(|e| {
        ApiError::from(Error::Unavailable(format!(
            "Video pipeline service unavailable: {}",
            e
        )))
    })?;
    Ok(Json(body))
}

pub async fn video_info(
    State(state): State<AppState>,
    Path(camera_id): Path<i32>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    require_camera(&state, camera_id).await?;
    let mut form = MultipartForm::read(multipart).await?;
    let video = form.required_file("video")?;
    Ok(Json(state.video_pipeline.video_info(video).await?))
}

/// Decode an uploaded file or a stream URL into frames for the camera
pub async fn decode(
    State(state): State<AppState>,
    Path(camera_id): Path<i32>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    require_camera(&state, camera_id).await?;
    let mut form = MultipartForm::read(multipart).await?;

    let fps = match form.field("fps") {
        Some(fps) => fps
            .parse::<u32>()
            .map_err(|_| ApiError::bad_request(format!("Invalid fps: {}", fps)))?,
        None => DEFAULT_DECODE_FPS,
    };

    let request = DecodeRequest {
        camera_id: Some(camera_id.to_string()),
        file: form.take_file("file"),
        url: form.field("url"),
        fps,
        force_format: form.field("force_format"),
    };
    if request.file.is_none() && request.url.is_none() {
        return Err(ApiError::bad_request("Either file or url is required"));
    }

    Ok(Json(state.video_pipeline.decode(request).await?))
}

pub async fn decode_status(
    State(state): State<AppState>,
    Path(camera_id): Path<i32>,
) -> ApiResult<Json<DecodeStatus>> {
    Ok(Json(
        state
            .video_pipeline
            .decode_status(&camera_id.to_string())
            .await?,
    ))
}

pub async fn decode_stop(
    State(state): State<AppState>,
    Path(camera_id): Path<i32>,
) -> ApiResult<Json<Value>> {
    Ok(Json(
        state
            .video_pipeline
            .decode_stop(&camera_id.to_string())
            .await?,
    ))
}

pub async fn latest_frame(
    State(state): State<AppState>,
    Path(camera_id): Path<i32>,
) -> ApiResult<Json<Value>> {
    Ok(Json(
        state
            .video_pipeline
            .latest_frame(&camera_id.to_string())
            .await?,
    ))
}

pub async fn snapshot(
    State(state): State<AppState>,
    Path(camera_id): Path<i32>,
    Query(request): Query<SnapshotRequest>,
) -> ApiResult<Json<Value>> {
    require_camera(&state, camera_id).await?;
    Ok(Json(state.video_pipeline.snapshot(&request).await?))
}

pub async fn record(
    State(state): State<AppState>,
    Path(camera_id): Path<i32>,
    Query(request): Query<RecordRequest>,
) -> ApiResult<Json<Value>> {
    require_camera(&state, camera_id).await?;
    Ok(Json(state.video_pipeline.record(&request).await?))
}

pub async fn hw_accel_capabilities(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(state.video_pipeline.hw_accel_capabilities().await?))
}
