use crate::api::rest::{ApiResult, AppState, MultipartForm};
use crate::db::models::{
    LicensePlateDetection, LicensePlateFilter, RepeatedPlate, UpdateLicensePlateDetection,
};
use crate::services::license_plates::FileUploadResponse;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use log::info;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SourceQuery {
    pub source_id: Option<i32>,
}

/// Create license plate router; uploads up to `max_upload` bytes
pub fn create_router(max_upload: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(list_detections))
        .route("/upload-file", post(upload_file))
        .route("/plate/:plate_number", get(get_by_plate))
        .route("/source/:source_type", get(get_by_source))
        .route("/repeated/:timeframe_hours", get(get_repeated))
        .route("/camera/:camera_id/detect", post(detect_from_camera))
        .route(
            "/:id",
            get(get_detection)
                .put(update_detection)
                .delete(delete_detection),
        )
        .layer(DefaultBodyLimit::max(max_upload))
}

pub async fn list_detections(
    State(state): State<AppState>,
    Query(filter): Query<LicensePlateFilter>,
) -> ApiResult<Json<Vec<LicensePlateDetection>>> {
    Ok(Json(state.license_plates.list(&filter).await?))
}

pub async fn get_detection(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<LicensePlateDetection>> {
    Ok(Json(state.license_plates.get(id).await?))
}

pub async fn get_by_plate(
    State(state): State<AppState>,
    Path(plate_number): Path<String>,
) -> ApiResult<Json<Vec<LicensePlateDetection>>> {
    Ok(Json(state.license_plates.by_plate(&plate_number).await?))
}

pub async fn get_by_source(
    State(state): State<AppState>,
    Path(source_type): Path<String>,
    Query(query): Query<SourceQuery>,
) -> ApiResult<Json<Vec<LicensePlateDetection>>> {
    Ok(Json(
        state
            .license_plates
            .by_source(&source_type, query.source_id)
            .await?,
    ))
}

pub async fn get_repeated(
    State(state): State<AppState>,
    Path(timeframe_hours): Path<i64>,
) -> ApiResult<Json<Vec<RepeatedPlate>>> {
    Ok(Json(state.license_plates.repeated(timeframe_hours).await?))
}

/// Upload a video and run plate detection over its frames
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<FileUploadResponse>> {
    let mut form = MultipartForm::read(multipart).await?;
    let file = form.required_file("file")?;
    info!("Received video upload {}", file.file_name);

    let response = state
        .license_plates
        .upload(
            file,
            form.field("start_time_offset"),
            form.field("location"),
        )
        .await?;
    Ok(Json(response))
}

pub async fn detect_from_camera(
    State(state): State<AppState>,
    Path(camera_id): Path<i32>,
) -> ApiResult<Json<Vec<LicensePlateDetection>>> {
    Ok(Json(state.license_plates.detect_from_camera(camera_id).await?))
}

pub async fn update_detection(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<UpdateLicensePlateDetection>,
) -> ApiResult<Json<LicensePlateDetection>> {
    Ok(Json(state.license_plates.update(id, &request).await?))
}

/// Soft delete: the detection is kept but marked inactive
pub async fn delete_detection(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    state.license_plates.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
