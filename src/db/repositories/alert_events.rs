use crate::{
    alerts::AlertEventStore,
    db::models::{AlertEvent, AlertEventQuery, Detection, NewAlertEvent},
    error::Error,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool};
use std::sync::Arc;
use tracing::debug;

const DEFAULT_SEARCH_LIMIT: i64 = 100;

/// Alert events repository
#[derive(Clone)]
pub struct AlertEventsRepository {
    pool: Arc<PgPool>,
}

impl AlertEventsRepository {
    /// Create a new alert events repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Get event by ID
    pub async fn get_by_id(&self, id: i32) -> Result<Option<AlertEvent>> {
        let result = sqlx::query_as::<_, AlertEvent>(
            r#"
            SELECT id, camera_id, alert_type, start_time, end_time, ai_annotation_path,
                   detection_results, created_at, updated_at
            FROM alert_events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get alert event by ID: {}", e)))?;

        Ok(result)
    }

    /// Search events, newest first
    pub async fn search(&self, query: &AlertEventQuery) -> Result<Vec<AlertEvent>> {
        let result = sqlx::query_as::<_, AlertEvent>(
            r#"
            SELECT id, camera_id, alert_type, start_time, end_time, ai_annotation_path,
                   detection_results, created_at, updated_at
            FROM alert_events
            WHERE ($1::INTEGER IS NULL OR camera_id = $1)
              AND ($2::TEXT IS NULL OR alert_type = $2)
              AND (NOT $3 OR end_time IS NULL)
            ORDER BY start_time DESC
            LIMIT $4
            "#,
        )
        .bind(query.camera_id)
        .bind(&query.alert_type)
        .bind(query.open_only)
        .bind(query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to search alert events: {}", e)))?;

        Ok(result)
    }

    /// Most recent event of `alert_type` on any of `camera_ids` that has an
    /// annotation image
    pub async fn latest_with_annotation(
        &self,
        camera_ids: &[i32],
        alert_type: &str,
    ) -> Result<Option<AlertEvent>> {
        let result = sqlx::query_as::<_, AlertEvent>(
            r#"
            SELECT id, camera_id, alert_type, start_time, end_time, ai_annotation_path,
                   detection_results, created_at, updated_at
            FROM alert_events
            WHERE camera_id = ANY($1)
              AND alert_type = $2
              AND ai_annotation_path IS NOT NULL
            ORDER BY start_time DESC
            LIMIT 1
            "#,
        )
        .bind(camera_ids)
        .bind(alert_type)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get latest annotated event: {}", e)))?;

        Ok(result)
    }
}

#[async_trait]
impl AlertEventStore for AlertEventsRepository {
    async fn open(&self, event: NewAlertEvent) -> Result<AlertEvent> {
        debug!(
            "Opening {} event for camera {}",
            event.alert_type, event.camera_id
        );

        let result = sqlx::query_as::<_, AlertEvent>(
            r#"
            INSERT INTO alert_events (
                camera_id, alert_type, start_time, ai_annotation_path, detection_results,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING id, camera_id, alert_type, start_time, end_time, ai_annotation_path,
                      detection_results, created_at, updated_at
            "#,
        )
        .bind(event.camera_id)
        .bind(&event.alert_type)
        .bind(event.start_time)
        .bind(&event.ai_annotation_path)
        .bind(Json(&event.detections))
        .bind(Utc::now())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to open alert event: {}", e)))?;

        Ok(result)
    }

    async fn update(
        &self,
        event_id: i32,
        detections: &[Detection],
        annotation_path: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE alert_events
            SET detection_results = $1,
                ai_annotation_path = COALESCE($2, ai_annotation_path),
                updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(Json(detections))
        .bind(annotation_path)
        .bind(Utc::now())
        .bind(event_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to update alert event: {}", e)))?;

        Ok(())
    }

    async fn close(&self, event_id: i32, end_time: DateTime<Utc>) -> Result<()> {
        debug!("Closing alert event {}", event_id);

        sqlx::query(
            r#"
            UPDATE alert_events
            SET end_time = $1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(end_time)
        .bind(Utc::now())
        .bind(event_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to close alert event: {}", e)))?;

        Ok(())
    }

    async fn get_open(&self, camera_id: i32, alert_type: &str) -> Result<Option<AlertEvent>> {
        let result = sqlx::query_as::<_, AlertEvent>(
            r#"
            SELECT id, camera_id, alert_type, start_time, end_time, ai_annotation_path,
                   detection_results, created_at, updated_at
            FROM alert_events
            WHERE camera_id = $1 AND alert_type = $2 AND end_time IS NULL
            ORDER BY start_time DESC
            LIMIT 1
            "#,
        )
        .bind(camera_id)
        .bind(alert_type)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get open alert event: {}", e)))?;

        Ok(result)
    }
}
