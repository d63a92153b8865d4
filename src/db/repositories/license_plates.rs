use crate::{
    db::models::{
        LicensePlateDetection, LicensePlateFilter, NewLicensePlateDetection,
        UpdateLicensePlateDetection,
    },
    error::Error,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool};
use std::sync::Arc;

const PLATE_COLUMNS: &str = r#"
    id, source_type, source_id, source_name, plate_number, confidence, thumbnail_path,
    full_image_path, detection_bbox, detection_results, video_path, video_timestamp,
    start_time_offset, location, detected_at, created_at, updated_at, is_active
"#;

/// License plate detections repository
#[derive(Clone)]
pub struct LicensePlatesRepository {
    pool: Arc<PgPool>,
}

impl LicensePlatesRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn create(&self, detection: &NewLicensePlateDetection) -> Result<LicensePlateDetection> {
        let sql = format!(
            r#"
            INSERT INTO license_plate_detections (
                source_type, source_id, source_name, plate_number, confidence, thumbnail_path,
                full_image_path, detection_bbox, detection_results, video_path, video_timestamp,
                start_time_offset, location, detected_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14, $14)
            RETURNING {}
            "#,
            PLATE_COLUMNS
        );

        let result = sqlx::query_as::<_, LicensePlateDetection>(&sql)
            .bind(&detection.source_type)
            .bind(detection.source_id)
            .bind(&detection.source_name)
            .bind(&detection.plate_number)
            .bind(detection.confidence)
            .bind(&detection.thumbnail_path)
            .bind(&detection.full_image_path)
            .bind(detection.detection_bbox.as_ref().map(Json))
            .bind(&detection.detection_results)
            .bind(&detection.video_path)
            .bind(&detection.video_timestamp)
            .bind(&detection.start_time_offset)
            .bind(&detection.location)
            .bind(Utc::now())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to create plate detection: {}", e)))?;

        Ok(result)
    }

    /// List detections, newest first; the plate filter is a case-insensitive substring
    pub async fn list(&self, filter: &LicensePlateFilter) -> Result<Vec<LicensePlateDetection>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM license_plate_detections
            WHERE ($1::TEXT IS NULL OR source_type = $1)
              AND ($2::TEXT IS NULL OR plate_number ILIKE '%' || $2 || '%')
              AND ($3::BOOLEAN IS NULL OR is_active = $3)
            ORDER BY detected_at DESC
            OFFSET $4
            LIMIT $5
            "#,
            PLATE_COLUMNS
        );

        let result = sqlx::query_as::<_, LicensePlateDetection>(&sql)
            .bind(&filter.source_type)
            .bind(&filter.plate_number)
            .bind(filter.is_active)
            .bind(filter.skip)
            .bind(filter.limit)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to list plate detections: {}", e)))?;

        Ok(result)
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<LicensePlateDetection>> {
        let sql = format!(
            "SELECT {} FROM license_plate_detections WHERE id = $1",
            PLATE_COLUMNS
        );

        let result = sqlx::query_as::<_, LicensePlateDetection>(&sql)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get plate detection: {}", e)))?;

        Ok(result)
    }

    /// Active detections of an exact plate number
    pub async fn get_by_plate(&self, plate_number: &str) -> Result<Vec<LicensePlateDetection>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM license_plate_detections
            WHERE plate_number = $1 AND is_active = TRUE
            ORDER BY detected_at DESC
            "#,
            PLATE_COLUMNS
        );

        let result = sqlx::query_as::<_, LicensePlateDetection>(&sql)
            .bind(plate_number)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get detections by plate: {}", e)))?;

        Ok(result)
    }

    /// Active detections from one source type, optionally one source id
    pub async fn get_by_source(
        &self,
        source_type: &str,
        source_id: Option<i32>,
    ) -> Result<Vec<LicensePlateDetection>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM license_plate_detections
            WHERE source_type = $1
              AND ($2::INTEGER IS NULL OR source_id = $2)
              AND is_active = TRUE
            ORDER BY detected_at DESC
            "#,
            PLATE_COLUMNS
        );

        let result = sqlx::query_as::<_, LicensePlateDetection>(&sql)
            .bind(source_type)
            .bind(source_id)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get detections by source: {}", e)))?;

        Ok(result)
    }

    /// Active detections seen at or after `cutoff`
    pub async fn get_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<LicensePlateDetection>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM license_plate_detections
            WHERE detected_at >= $1 AND is_active = TRUE
            ORDER BY detected_at DESC
            "#,
            PLATE_COLUMNS
        );

        let result = sqlx::query_as::<_, LicensePlateDetection>(&sql)
            .bind(cutoff)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get recent detections: {}", e)))?;

        Ok(result)
    }

    pub async fn update(
        &self,
        id: i32,
        update: &UpdateLicensePlateDetection,
    ) -> Result<Option<LicensePlateDetection>> {
        let sql = format!(
            r#"
            UPDATE license_plate_detections
            SET plate_number = COALESCE($1, plate_number),
                confidence = COALESCE($2, confidence),
                thumbnail_path = COALESCE($3, thumbnail_path),
                full_image_path = COALESCE($4, full_image_path),
                detection_bbox = COALESCE($5, detection_bbox),
                detection_results = COALESCE($6, detection_results),
                video_path = COALESCE($7, video_path),
                video_timestamp = COALESCE($8, video_timestamp),
                start_time_offset = COALESCE($9, start_time_offset),
                location = COALESCE($10, location),
                is_active = COALESCE($11, is_active),
                updated_at = $12
            WHERE id = $13
            RETURNING {}
            "#,
            PLATE_COLUMNS
        );

        let result = sqlx::query_as::<_, LicensePlateDetection>(&sql)
            .bind(&update.plate_number)
            .bind(update.confidence)
            .bind(&update.thumbnail_path)
            .bind(&update.full_image_path)
            .bind(update.detection_bbox.as_ref().map(Json))
            .bind(&update.detection_results)
            .bind(&update.video_path)
            .bind(&update.video_timestamp)
            .bind(&update.start_time_offset)
            .bind(&update.location)
            .bind(update.is_active)
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to update plate detection: {}", e)))?;

        Ok(result)
    }

    /// Soft delete: the row stays, flagged inactive
    pub async fn deactivate(&self, id: i32) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE license_plate_detections SET is_active = FALSE, updated_at = $1 WHERE id = $2",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to delete plate detection: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}
