use crate::{
    db::models::{Analytics, CreateAnalytics, UpdateAnalytics},
    error::Error,
};
use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;

/// Analytics configuration repository
#[derive(Clone)]
pub struct AnalyticsRepository {
    pool: Arc<PgPool>,
}

impl AnalyticsRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn create(&self, analytics: &CreateAnalytics) -> Result<Analytics> {
        let result = sqlx::query_as::<_, Analytics>(
            r#"
            INSERT INTO analytics (name, type, config, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING id, name, type, config, is_active, created_at, updated_at
            "#,
        )
        .bind(&analytics.name)
        .bind(&analytics.analytics_type)
        .bind(&analytics.config)
        .bind(analytics.is_active)
        .bind(Utc::now())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create analytics: {}", e)))?;

        Ok(result)
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<Analytics>> {
        let result = sqlx::query_as::<_, Analytics>(
            r#"
            SELECT id, name, type, config, is_active, created_at, updated_at
            FROM analytics
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get analytics by ID: {}", e)))?;

        Ok(result)
    }

    pub async fn get_all(&self, skip: i64, limit: i64) -> Result<Vec<Analytics>> {
        let result = sqlx::query_as::<_, Analytics>(
            r#"
            SELECT id, name, type, config, is_active, created_at, updated_at
            FROM analytics
            ORDER BY id
            OFFSET $1
            LIMIT $2
            "#,
        )
        .bind(skip)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get analytics: {}", e)))?;

        Ok(result)
    }

    pub async fn update(&self, id: i32, update: &UpdateAnalytics) -> Result<Option<Analytics>> {
        let result = sqlx::query_as::<_, Analytics>(
            r#"
            UPDATE analytics
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
        .bind(&update.analytics_type)
        .bind(&update.config)
        .bind(update.is_active)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to update analytics: {}", e)))?;

        Ok(result)
    }

    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM analytics WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete analytics: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    /// Analytics configurations attached to a camera
    pub async fn get_by_camera(&self, camera_id: i32) -> Result<Vec<Analytics>> {
        let result = sqlx::query_as::<_, Analytics>(
            r#"
            SELECT a.id, a.name, a.type, a.config, a.is_active, a.created_at, a.updated_at
            FROM analytics a
            JOIN camera_analytics ca ON ca.analytics_id = a.id
            WHERE ca.camera_id = $1
            ORDER BY a.id
            "#,
        )
        .bind(camera_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get camera analytics: {}", e)))?;

        Ok(result)
    }

    pub async fn attach_to_camera(&self, camera_id: i32, analytics_id: i32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO camera_analytics (camera_id, analytics_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(camera_id)
        .bind(analytics_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to add analytics to camera: {}", e)))?;

        Ok(())
    }

    /// Returns false when the pairing did not exist
    pub async fn detach_from_camera(&self, camera_id: i32, analytics_id: i32) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM camera_analytics WHERE camera_id = $1 AND analytics_id = $2",
        )
        .bind(camera_id)
        .bind(analytics_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to remove analytics from camera: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}
