use anyhow::Result;
use sqlx::{Executor, PgPool};
use tracing::info;

/// Embedded migration scripts. Every script is idempotent, so the whole list
/// is applied on each startup.
const MIGRATIONS: &[(&str, &str)] = &[
    ("001_create_stores.sql", include_str!("sql/001_create_stores.sql")),
    ("002_create_cameras.sql", include_str!("sql/002_create_cameras.sql")),
    ("003_create_analytics.sql", include_str!("sql/003_create_analytics.sql")),
    ("004_create_zones.sql", include_str!("sql/004_create_zones.sql")),
    ("005_create_alert_engines.sql", include_str!("sql/005_create_alert_engines.sql")),
    ("006_create_alert_events.sql", include_str!("sql/006_create_alert_events.sql")),
    ("007_create_settings.sql", include_str!("sql/007_create_settings.sql")),
    (
        "008_create_license_plate_detections.sql",
        include_str!("sql/008_create_license_plate_detections.sql"),
    ),
];

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    for (name, sql) in ordered_migrations() {
        execute_migration(pool, name, sql).await?;
        info!("Applied migration: {}", name);
    }

    seed_default_store(pool).await?;

    Ok(())
}

fn migration_order(name: &str) -> usize {
    name.split('_')
        .next()
        .and_then(|prefix| prefix.parse::<usize>().ok())
        .unwrap_or(usize::MAX)
}

/// Migrations sorted by their numeric prefix
fn ordered_migrations() -> Vec<(&'static str, &'static str)> {
    let mut migrations = MIGRATIONS.to_vec();
    migrations.sort_by_key(|(name, _)| migration_order(name));
    migrations
}

async fn execute_migration(pool: &PgPool, name: &str, sql: &str) -> Result<()> {
    pool.execute(sql)
        .await
        .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
    Ok(())
}

/// Create the default store record if none exists
async fn seed_default_store(pool: &PgPool) -> Result<()> {
    let store_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stores")
        .fetch_one(pool)
        .await?;

    if store_count == 0 {
        sqlx::query("INSERT INTO stores (name) VALUES ($1)")
            .bind("Default Store")
            .execute(pool)
            .await?;
        info!("Seeded default store");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_by_prefix() {
        let order: Vec<usize> = ordered_migrations()
            .into_iter()
            .map(|(name, _)| migration_order(name))
            .collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
        assert_eq!(order.len(), MIGRATIONS.len());
        assert!(order.iter().all(|o| *o != usize::MAX));
    }

    #[test]
    fn alert_events_migration_guards_open_events() {
        let (_, sql) = MIGRATIONS
            .iter()
            .find(|(name, _)| name.contains("alert_events"))
            .unwrap();
        assert!(sql.contains("WHERE end_time IS NULL"));
    }
}
