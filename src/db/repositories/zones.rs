use crate::{
    db::models::{CreateZone, UpdateZone, Zone},
    error::Error,
};
use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;

/// Zones repository
#[derive(Clone)]
pub struct ZonesRepository {
    pool: Arc<PgPool>,
}

impl ZonesRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn create(&self, zone: &CreateZone) -> Result<Zone> {
        let result = sqlx::query_as::<_, Zone>(
            r#"
            INSERT INTO zones (name, camera_id, analytics_id, settings, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING id, name, camera_id, analytics_id, settings, is_active, created_at, updated_at
            "#,
        )
        .bind(&zone.name)
        .bind(zone.camera_id)
        .bind(zone.analytics_id)
        .bind(&zone.settings)
        .bind(Utc::now())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create zone: {}", e)))?;

        Ok(result)
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<Zone>> {
        let result = sqlx::query_as::<_, Zone>(
            r#"
            SELECT id, name, camera_id, analytics_id, settings, is_active, created_at, updated_at
            FROM zones
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get zone by ID: {}", e)))?;

        Ok(result)
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Zone>> {
        let result = sqlx::query_as::<_, Zone>(
            r#"
            SELECT id, name, camera_id, analytics_id, settings, is_active, created_at, updated_at
            FROM zones
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get zone by name: {}", e)))?;

        Ok(result)
    }

    pub async fn get_all(&self) -> Result<Vec<Zone>> {
        let result = sqlx::query_as::<_, Zone>(
            r#"
            SELECT id, name, camera_id, analytics_id, settings, is_active, created_at, updated_at
            FROM zones
            ORDER BY id
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get zones: {}", e)))?;

        Ok(result)
    }

    pub async fn update(&self, id: i32, update: &UpdateZone) -> Result<Option<Zone>> {
        let result = sqlx::query_as::<_, Zone>(
            r#"
            UPDATE zones
            SET name = COALESCE($1, name),
                analytics_id = COALESCE($2, analytics_id),
                settings = COALESCE($3, settings),
                is_active = COALESCE($4, is_active),
                updated_at = $5
            WHERE id = $6
            RETURNING id, name, camera_id, analytics_id, settings, is_active, created_at, updated_at
            "#,
        )
        .bind(&update.name)
        .bind(update.analytics_id)
        .bind(&update.settings)
        .bind(update.is_active)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to update zone: {}", e)))?;

        Ok(result)
    }

    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM zones WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete zone: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}
