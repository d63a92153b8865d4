use crate::{
    db::models::{Camera, CreateCamera, UpdateCamera},
    error::Error,
};
use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

const CAMERA_COLUMNS: &str = r#"
    id, name, rtsp_url, location, ip_address, is_active, settings, analytics_config,
    vehicle_tracking_enabled, vehicle_tracking_config, created_at, updated_at
"#;

/// Cameras repository for handling camera operations
#[derive(Clone)]
pub struct CamerasRepository {
    pool: Arc<PgPool>,
}

impl CamerasRepository {
    /// Create a new cameras repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create a new camera
    pub async fn create(&self, camera: &CreateCamera) -> Result<Camera> {
        info!("Creating new camera: {}", camera.name);

        let sql = format!(
            r#"
            INSERT INTO cameras (
                name, rtsp_url, location, ip_address, is_active, settings, analytics_config,
                vehicle_tracking_enabled, vehicle_tracking_config, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING {}
            "#,
            CAMERA_COLUMNS
        );

        let result = sqlx::query_as::<_, Camera>(&sql)
            .bind(&camera.name)
            .bind(&camera.rtsp_url)
            .bind(&camera.location)
            .bind(&camera.ip_address)
            .bind(camera.is_active)
            .bind(&camera.settings)
            .bind(&camera.analytics_config)
            .bind(camera.vehicle_tracking_enabled)
            .bind(&camera.vehicle_tracking_config)
            .bind(Utc::now())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to create camera: {}", e)))?;

        Ok(result)
    }

    /// Get camera by ID
    pub async fn get_by_id(&self, id: i32) -> Result<Option<Camera>> {
        let sql = format!("SELECT {} FROM cameras WHERE id = $1", CAMERA_COLUMNS);

        let result = sqlx::query_as::<_, Camera>(&sql)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get camera by ID: {}", e)))?;

        Ok(result)
    }

    /// Get all cameras
    pub async fn get_all(&self) -> Result<Vec<Camera>> {
        let sql = format!("SELECT {} FROM cameras ORDER BY id", CAMERA_COLUMNS);

        let result = sqlx::query_as::<_, Camera>(&sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get all cameras: {}", e)))?;

        Ok(result)
    }

    /// Update camera; fields left as `None` keep their stored value
    pub async fn update(&self, id: i32, update: &UpdateCamera) -> Result<Option<Camera>> {
        let sql = format!(
            r#"
            UPDATE cameras
            SET name = COALESCE($1, name),
                rtsp_url = COALESCE($2, rtsp_url),
                location = COALESCE($3, location),
                ip_address = COALESCE($4, ip_address),
                is_active = COALESCE($5, is_active),
                settings = COALESCE($6, settings),
                analytics_config = COALESCE($7, analytics_config),
                vehicle_tracking_enabled = COALESCE($8, vehicle_tracking_enabled),
                vehicle_tracking_config = COALESCE($9, vehicle_tracking_config),
                updated_at = $10
            WHERE id = $11
            RETURNING {}
            "#,
            CAMERA_COLUMNS
        );

        let result = sqlx::query_as::<_, Camera>(&sql)
            .bind(&update.name)
            .bind(&update.rtsp_url)
            .bind(&update.location)
            .bind(&update.ip_address)
            .bind(update.is_active)
            .bind(&update.settings)
            .bind(&update.analytics_config)
            .bind(update.vehicle_tracking_enabled)
            .bind(&update.vehicle_tracking_config)
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to update camera: {}", e)))?;

        Ok(result)
    }

    /// Replace the analytics configuration of a camera
    pub async fn update_analytics_config(
        &self,
        id: i32,
        analytics_config: &serde_json::Value,
    ) -> Result<Option<Camera>> {
        let sql = format!(
            r#"
            UPDATE cameras
            SET analytics_config = $1, updated_at = $2
            WHERE id = $3
            RETURNING {}
            "#,
            CAMERA_COLUMNS
        );

        let result = sqlx::query_as::<_, Camera>(&sql)
            .bind(analytics_config)
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to update camera analytics: {}", e)))?;

        Ok(result)
    }

    /// Delete camera
    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM cameras
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to delete camera: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    /// Cameras an alert engine is attached to
    pub async fn get_by_alert_engine(&self, alert_engine_id: i32) -> Result<Vec<Camera>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM cameras
            WHERE id IN (
                SELECT camera_id FROM camera_alert_engines WHERE alert_engine_id = $1
            )
            ORDER BY id
            "#,
            CAMERA_COLUMNS
        );

        let result = sqlx::query_as::<_, Camera>(&sql)
            .bind(alert_engine_id)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get engine cameras: {}", e)))?;

        Ok(result)
    }

    /// Check whether a camera exists
    pub async fn exists(&self, id: i32) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM cameras WHERE id = $1)")
            .bind(id)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to check camera: {}", e)))?;

        Ok(exists)
    }
}
