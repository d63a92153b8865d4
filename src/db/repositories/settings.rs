use crate::{
    db::models::{CreateSettings, Settings, Store, UpdateSettings},
    error::Error,
};
use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

/// Settings and store repository; both tables hold a single row
#[derive(Clone)]
pub struct SettingsRepository {
    pool: Arc<PgPool>,
}

impl SettingsRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn get(&self) -> Result<Option<Settings>> {
        let result = sqlx::query_as::<_, Settings>(
            r#"
            SELECT id, store_name, store_description, store_timezone, store_language,
                   store_theme, store_notifications_enabled, store_analytics_enabled,
                   created_at, updated_at
            FROM settings
            ORDER BY id
            LIMIT 1
            "#,
        )
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get settings: {}", e)))?;

        Ok(result)
    }

    pub async fn create(&self, settings: &CreateSettings) -> Result<Settings> {
        info!("Creating settings for store {}", settings.store_name);

        let result = sqlx::query_as::<_, Settings>(
            r#"
            INSERT INTO settings (
                store_name, store_description, store_timezone, store_language, store_theme,
                store_notifications_enabled, store_analytics_enabled, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, store_name, store_description, store_timezone, store_language,
                      store_theme, store_notifications_enabled, store_analytics_enabled,
                      created_at, updated_at
            "#,
        )
        .bind(&settings.store_name)
        .bind(&settings.store_description)
        .bind(&settings.store_timezone)
        .bind(&settings.store_language)
        .bind(&settings.store_theme)
        .bind(settings.store_notifications_enabled)
        .bind(settings.store_analytics_enabled)
        .bind(Utc::now())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create settings: {}", e)))?;

        Ok(result)
    }

    pub async fn update(&self, id: i32, update: &UpdateSettings) -> Result<Option<Settings>> {
        let result = sqlx::query_as::<_, Settings>(
            r#"
            UPDATE settings
            SET store_name = COALESCE($1, store_name),
                store_description = COALESCE($2, store_description),
                store_timezone = COALESCE($3, store_timezone),
                store_language = COALESCE($4, store_language),
                store_theme = COALESCE($5, store_theme),
                store_notifications_enabled = COALESCE($6, store_notifications_enabled),
                store_analytics_enabled = COALESCE($7, store_analytics_enabled),
                updated_at = $8
            WHERE id = $9
            RETURNING id, store_name, store_description, store_timezone, store_language,
                      store_theme, store_notifications_enabled, store_analytics_enabled,
                      created_at, updated_at
            "#,
        )
        .bind(&update.store_name)
        .bind(&update.store_description)
        .bind(&update.store_timezone)
        .bind(&update.store_language)
        .bind(&update.store_theme)
        .bind(update.store_notifications_enabled)
        .bind(update.store_analytics_enabled)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to update settings: {}", e)))?;

        Ok(result)
    }

    pub async fn get_store(&self) -> Result<Option<Store>> {
        let result = sqlx::query_as::<_, Store>("SELECT id, name FROM stores ORDER BY id LIMIT 1")
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get store: {}", e)))?;

        Ok(result)
    }

    /// Rename the store, creating it when missing
    pub async fn set_store_name(&self, name: &str) -> Result<Store> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let updated = sqlx::query_as::<_, Store>(
            r#"
            UPDATE stores
            SET name = $1
            WHERE id = (SELECT id FROM stores ORDER BY id LIMIT 1)
            RETURNING id, name
            "#,
        )
        .bind(name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::Database(format!("Failed to update store: {}", e)))?;

        let store = match updated {
            Some(store) => store,
            None => sqlx::query_as::<_, Store>("INSERT INTO stores (name) VALUES ($1) RETURNING id, name")
                .bind(name)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| Error::Database(format!("Failed to create store: {}", e)))?,
        };

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;

        Ok(store)
    }
}
