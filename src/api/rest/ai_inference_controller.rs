use crate::api::rest::{require_camera, ApiError, ApiResult, AppState, MultipartForm};
use crate::error::Error;
use axum::extract::{DefaultBodyLimit, Form, Multipart, Path, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct LoadModelForm {
    pub model_name: String,
    pub accelerator: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CameraInferenceForm {
    pub camera_id: String,
    pub model_name: String,
    pub accelerator: Option<String>,
}

pub fn create_router(max_upload: usize) -> Router<AppState> {
    Router::new()
        .route("/test-connection", get(test_connection))
        .route("/health", get(health))
        .route("/models", get(list_models))
        .route("/model/info", get(model_info))
        .route("/model/load", post(load_model))
        .route("/inference/latest-frame", post(latest_frame_inference))
        .route("/inference/background", post(background_inference))
        .route("/detect", post(detect_objects))
        .route("/camera/:camera_id/detect", post(detect_objects_for_camera))
        .layer(DefaultBodyLimit::max(max_upload))
}

fn accelerator<'a>(state: &'a AppState, requested: &'a Option<String>) -> &'a str {
    requested
        .as_deref()
        .unwrap_or_else(|| state.inference.accelerator())
}

/// Connection report; downstream failures are part of the report
pub async fn test_connection(State(state): State<AppState>) -> Json<Value> {
    Json(state.inference.test_connection().await)
}

pub async fn health(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let body = state.inference.root().await.map_err(|e| {
        ApiError::from(Error::Unavailable(format!(
            "AI inference service unavailable: {}",
            e
        )))
    })?;
    Ok(Json(body))
}

pub async fn list_models(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(state.inference.models().await?))
}

pub async fn model_info(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(state.inference.model_info().await?))
}

pub async fn load_model(
    State(state): State<AppState>,
    Form(form): Form<LoadModelForm>,
) -> ApiResult<Json<Value>> {
    let accelerator = accelerator(&state, &form.accelerator);
    Ok(Json(
        state
            .inference
            .load_model_with(&form.model_name, accelerator)
            .await?,
    ))
}

pub async fn latest_frame_inference(
    State(state): State<AppState>,
    Form(form): Form<CameraInferenceForm>,
) -> ApiResult<Json<Value>> {
    let accelerator = accelerator(&state, &form.accelerator);
    Ok(Json(
        state
            .inference
            .latest_frame_with(&form.camera_id, &form.model_name, accelerator)
            .await?,
    ))
}

pub async fn background_inference(
    State(state): State<AppState>,
    Form(form): Form<CameraInferenceForm>,
) -> ApiResult<Json<Value>> {
    let accelerator = accelerator(&state, &form.accelerator);
    Ok(Json(
        state
            .inference
            .start_background(&form.camera_id, &form.model_name, accelerator)
            .await?,
    ))
}

async fn forward_detection(state: &AppState, multipart: Multipart) -> ApiResult<Json<Value>> {
    let mut form = MultipartForm::read(multipart).await?;
    let object_name = form.required_field("object_name")?;
    let image = form.required_file("image")?;
    Ok(Json(state.inference.detect(&object_name, image).await?))
}

/// Object detection on an uploaded image
pub async fn detect_objects(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    forward_detection(&state, multipart).await
}

pub async fn detect_objects_for_camera(
    State(state): State<AppState>,
    Path(camera_id): Path<i32>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    require_camera(&state, camera_id).await?;
    forward_detection(&state, multipart).await
}
