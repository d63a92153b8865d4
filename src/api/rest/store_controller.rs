use crate::api::rest::{ApiError, ApiResult, AppState};
use crate::db::models::Store;
use crate::db::repositories::SettingsRepository;
use crate::error::Error;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct StoreName {
    pub name: String,
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(get_store).post(set_store))
}

pub async fn get_store(State(state): State<AppState>) -> ApiResult<Json<Store>> {
    SettingsRepository::new(Arc::clone(&state.db_pool))
        .get_store()
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Store not found"))
}

/// Set the store name, creating the store when missing
pub async fn set_store(
    State(state): State<AppState>,
    Json(request): Json<StoreName>,
) -> ApiResult<Json<Store>> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(Error::Validation("Store name must not be empty".to_string()).into());
    }

    let store = SettingsRepository::new(Arc::clone(&state.db_pool))
        .set_store_name(name)
        .await?;
    Ok(Json(store))
}
