use crate::{
    db::models::{AlertEngine, AlertEngineDb, AlertEngineType, CreateAlertEngine, UpdateAlertEngine},
    error::Error,
};
use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

fn into_engines(rows: Vec<AlertEngineDb>) -> Result<Vec<AlertEngine>> {
    rows.into_iter()
        .map(|row| AlertEngine::try_from(row).map_err(anyhow::Error::from))
        .collect()
}

fn into_engine(row: Option<AlertEngineDb>) -> Result<Option<AlertEngine>> {
    row.map(AlertEngine::try_from).transpose().map_err(anyhow::Error::from)
}

/// Alert engine repository, including the camera association table
#[derive(Clone)]
pub struct AlertEnginesRepository {
    pool: Arc<PgPool>,
}

impl AlertEnginesRepository {
    /// Create a new alert engine repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Insert an engine; `is_active` is decided by the caller
    pub async fn create(&self, engine: &CreateAlertEngine, is_active: bool) -> Result<AlertEngine> {
        info!("Creating alert engine {} ({})", engine.name, engine.engine_type);

        let row = sqlx::query_as::<_, AlertEngineDb>(
            r#"
            INSERT INTO alert_engines (name, type, config, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING id, name, type, config, is_active, created_at, updated_at
            "#,
        )
        .bind(&engine.name)
        .bind(engine.engine_type.as_str())
        .bind(&engine.config)
        .bind(is_active)
        .bind(Utc::now())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create alert engine: {}", e)))?;

        Ok(AlertEngine::try_from(row)?)
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<AlertEngine>> {
        let row = sqlx::query_as::<_, AlertEngineDb>(
            r#"
            SELECT id, name, type, config, is_active, created_at, updated_at
            FROM alert_engines
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get alert engine by ID: {}", e)))?;

        into_engine(row)
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<AlertEngine>> {
        let row = sqlx::query_as::<_, AlertEngineDb>(
            r#"
            SELECT id, name, type, config, is_active, created_at, updated_at
            FROM alert_engines
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get alert engine by name: {}", e)))?;

        into_engine(row)
    }

    pub async fn get_all(&self, skip: i64, limit: i64) -> Result<Vec<AlertEngine>> {
        let rows = sqlx::query_as::<_, AlertEngineDb>(
            r#"
            SELECT id, name, type, config, is_active, created_at, updated_at
            FROM alert_engines
            ORDER BY id
            OFFSET $1
            LIMIT $2
            "#,
        )
        .bind(skip)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list alert engines: {}", e)))?;

        into_engines(rows)
    }

    /// Partial update; `None` fields keep their stored value
    pub async fn update(&self, id: i32, update: &UpdateAlertEngine) -> Result<Option<AlertEngine>> {
        let row = sqlx::query_as::<_, AlertEngineDb>(
            r#"
            UPDATE alert_engines
            SET name = COALESCE($1, name),
                type = COALESCE($2, type),
                config = COALESCE($3, config),
                is_active = COALESCE($4, is_active),
                updated_at = $5
            WHERE id = $6
            RETURNING id, name, type, config, is_active, created_at, updated_at
            "#,
        )
        .bind(&update.name)
        .bind(update.engine_type.map(|t| t.as_str()))
        .bind(&update.config)
        .bind(update.is_active)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to update alert engine: {}", e)))?;

        into_engine(row)
    }

    pub async fn set_active(&self, id: i32, is_active: bool) -> Result<Option<AlertEngine>> {
        let row = sqlx::query_as::<_, AlertEngineDb>(
            r#"
            UPDATE alert_engines
            SET is_active = $1, updated_at = $2
            WHERE id = $3
            RETURNING id, name, type, config, is_active, created_at, updated_at
            "#,
        )
        .bind(is_active)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to set alert engine state: {}", e)))?;

        into_engine(row)
    }

    /// Delete an engine; its camera associations cascade
    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM alert_engines WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete alert engine: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    /// Engines attached to a camera
    pub async fn get_by_camera(&self, camera_id: i32) -> Result<Vec<AlertEngine>> {
        let rows = sqlx::query_as::<_, AlertEngineDb>(
            r#"
            SELECT e.id, e.name, e.type, e.config, e.is_active, e.created_at, e.updated_at
            FROM alert_engines e
            JOIN camera_alert_engines cae ON cae.alert_engine_id = e.id
            WHERE cae.camera_id = $1
            ORDER BY e.id
            "#,
        )
        .bind(camera_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get camera alert engines: {}", e)))?;

        into_engines(rows)
    }

    /// Camera ids an engine is attached to, in ascending order
    pub async fn camera_ids(&self, alert_engine_id: i32) -> Result<Vec<i32>> {
        let ids: Vec<i32> = sqlx::query_scalar(
            r#"
            SELECT camera_id
            FROM camera_alert_engines
            WHERE alert_engine_id = $1
            ORDER BY camera_id
            "#,
        )
        .bind(alert_engine_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get engine cameras: {}", e)))?;

        Ok(ids)
    }

    pub async fn attach(&self, camera_id: i32, alert_engine_id: i32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO camera_alert_engines (camera_id, alert_engine_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(camera_id)
        .bind(alert_engine_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to attach alert engine: {}", e)))?;

        Ok(())
    }

    /// Returns false when the pairing did not exist
    pub async fn detach(&self, camera_id: i32, alert_engine_id: i32) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM camera_alert_engines WHERE camera_id = $1 AND alert_engine_id = $2",
        )
        .bind(camera_id)
        .bind(alert_engine_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to detach alert engine: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    /// Active engines of one type
    pub async fn get_active_by_type(&self, engine_type: AlertEngineType) -> Result<Vec<AlertEngine>> {
        let rows = sqlx::query_as::<_, AlertEngineDb>(
            r#"
            SELECT id, name, type, config, is_active, created_at, updated_at
            FROM alert_engines
            WHERE type = $1 AND is_active = TRUE
            ORDER BY id
            "#,
        )
        .bind(engine_type.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get active alert engines: {}", e)))?;

        into_engines(rows)
    }

    /// Whether a camera still has an active engine of `engine_type`, other
    /// than `excluding`, attached to it
    pub async fn camera_has_other_active(
        &self,
        camera_id: i32,
        engine_type: AlertEngineType,
        excluding: i32,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM camera_alert_engines cae
                JOIN alert_engines e ON e.id = cae.alert_engine_id
                WHERE cae.camera_id = $1
                  AND e.type = $2
                  AND e.is_active = TRUE
                  AND e.id <> $3
            )
            "#,
        )
        .bind(camera_id)
        .bind(engine_type.as_str())
        .bind(excluding)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to check camera alert engines: {}", e)))?;

        Ok(exists)
    }
}
