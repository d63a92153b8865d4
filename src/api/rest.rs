use crate::alerts::AlertEngineService;
use crate::config::{ApiConfig, Config};
use crate::db::DatabaseService;
use crate::error::Error;
use crate::services::{AiInferenceClient, LicensePlateService, UploadedFile, VideoPipelineClient};
use anyhow::Result;
use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod ai_inference_controller;
pub mod alert_engine_controller;
pub mod alert_event_controller;
pub mod analytics_controller;
pub mod camera_controller;
pub mod license_plate_controller;
pub mod settings_controller;
pub mod store_controller;
pub mod video_pipeline_controller;
pub mod zone_controller;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: Arc<PgPool>,
    pub config: Arc<Config>,
    pub alert_engines: AlertEngineService,
    pub license_plates: LicensePlateService,
    pub inference: AiInferenceClient,
    pub video_pipeline: VideoPipelineClient,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
    pub status: u16,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: StatusCode::NOT_FOUND.as_u16(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: StatusCode::BAD_REQUEST.as_u16(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::DuplicateName(_)
            | Error::AlreadyExists(_)
            | Error::Validation(_)
            | Error::Config(_) => StatusCode::BAD_REQUEST,
            Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        ApiError {
            message: err.to_string(),
            status: status.as_u16(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(err) = err.downcast_ref::<Error>() {
            return (*err).clone().into();
        }

        ApiError {
            message: err.to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(self);
        (status, body).into_response()
    }
}

/// Text fields and files of a multipart request
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, UploadedFile>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Failed to read {}: {}", name, e)))?;
                    form.files.insert(
                        name,
                        UploadedFile {
                            file_name,
                            content_type,
                            bytes: bytes.to_vec(),
                        },
                    );
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Failed to read {}: {}", name, e)))?;
                    form.fields.insert(name, text);
                }
            }
        }

        Ok(form)
    }

    pub fn field(&self, name: &str) -> Option<String> {
        self.fields.get(name).filter(|v| !v.is_empty()).cloned()
    }

    pub fn required_field(&self, name: &str) -> ApiResult<String> {
        self.field(name)
            .ok_or_else(|| ApiError::bad_request(format!("Missing form field: {}", name)))
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }

    pub fn required_file(&mut self, name: &str) -> ApiResult<UploadedFile> {
        self.take_file(name)
            .ok_or_else(|| ApiError::bad_request(format!("Missing file: {}", name)))
    }
}

/// `skip`/`limit` query parameters of list endpoints
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// Serve an image file from disk
pub(crate) async fn image_response(path: &std::path::Path) -> ApiResult<Response> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|_| ApiError::not_found(format!("Image {} not found", path.display())))?;
    let content_type = match path.extension().and_then(|ext| ext.to_str()) {
        Some("png") => "image/png",
        _ => "image/jpeg",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

/// Fail with 404 unless the camera exists
pub(crate) async fn require_camera(state: &AppState, camera_id: i32) -> ApiResult<()> {
    let repo = crate::db::repositories::CamerasRepository::new(Arc::clone(&state.db_pool));
    if !repo.exists(camera_id).await? {
        return Err(ApiError::not_found("Camera not found"));
    }
    Ok(())
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = DatabaseService::health_check(&state.db_pool).await;
    let polling_workers = state.alert_engines.running_pollers().await.len();
    Json(json!({
        "status": if database { "ok" } else { "degraded" },
        "database": database,
        "polling_workers": polling_workers,
    }))
}

pub fn create_router(state: AppState) -> Router {
    let max_upload = state.config.storage.max_upload_bytes() as usize;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false)
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/alert-engines", alert_engine_controller::create_router())
        .nest("/api/v1/alert-events", alert_event_controller::create_router())
        .nest("/api/v1/cameras", camera_controller::create_router())
        .nest("/api/v1/zones", zone_controller::create_router())
        .nest("/api/v1/analytics", analytics_controller::create_router())
        .nest("/api/v1/settings", settings_controller::create_router())
        .nest("/api/v1/store", store_controller::create_router())
        .nest(
            "/api/v1/license-plates",
            license_plate_controller::create_router(max_upload),
        )
        .nest(
            "/api/v1/ai-inference",
            ai_inference_controller::create_router(max_upload),
        )
        .nest(
            "/api/v1/video-pipeline",
            video_pipeline_controller::create_router(max_upload),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub struct RestApi {
    config: ApiConfig,
    state: AppState,
}

impl RestApi {
    pub fn new(config: &ApiConfig, state: AppState) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            state,
        })
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = create_router(self.state.clone());

        let addr = format!("{}:{}", self.config.address, self.config.port);
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::Config(format!("Invalid listen address {}: {}", addr, e)))?;

        info!("API server listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;

        axum::Server::from_tcp(listener.into_std()?)?
            .serve(app.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_status_codes() {
        let cases = [
            (Error::NotFound("x".into()), 404),
            (Error::DuplicateName("x".into()), 400),
            (Error::AlreadyExists("x".into()), 400),
            (Error::Validation("x".into()), 400),
            (Error::Config("x".into()), 400),
            (Error::Unavailable("x".into()), 503),
            (Error::Downstream("x".into()), 500),
            (Error::Database("x".into()), 500),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn anyhow_errors_keep_their_kind() {
        let err: anyhow::Error = Error::NotFound("Camera not found".into()).into();
        let api = ApiError::from(err);
        assert_eq!(api.status, 404);
        assert_eq!(api.message, "Not found: Camera not found");

        let other = ApiError::from(anyhow::anyhow!("boom"));
        assert_eq!(other.status, 500);
    }
}
