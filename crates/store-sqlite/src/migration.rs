// Migration Runner

use sqlx::SqlitePool;
use taskmesh_core::{EngineError, Result};
use tracing::info;

/// Run database migrations, tracked in `schema_version`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("running store migrations");

    let table_exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
    )
    .fetch_one(pool)
    .await
    .map_err(|e| EngineError::Store(e.to_string()))?;

    let current_version: i64 = if table_exists > 0 {
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await
            .map_err(|e| EngineError::Store(e.to_string()))?
            .unwrap_or(0)
    } else {
        sqlx::query("CREATE TABLE schema_version (version INTEGER PRIMARY KEY)")
            .execute(pool)
            .await
            .map_err(|e| EngineError::Store(e.to_string()))?;
        0
    };

    info!(current_version, "current schema version");

    if current_version < 1 {
        info!("applying migration 001: initial schema");
        apply_migration(pool, include_str!("../migrations/001_initial_schema.sql"), 1).await?;
    }

    info!("all migrations applied");
    Ok(())
}

async fn apply_migration(pool: &SqlitePool, sql: &str, version: i64) -> Result<()> {
    let mut tx = pool.begin().await.map_err(|e| EngineError::Store(e.to_string()))?;

    for statement in sql.split(';') {
        let clean_statement: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();

        if !clean_statement.is_empty() {
            sqlx::query(&clean_statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| EngineError::Store(e.to_string()))?;
        }
    }

    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(&mut *tx)
        .await
        .map_err(|e| EngineError::Store(e.to_string()))?;

    tx.commit().await.map_err(|e| EngineError::Store(e.to_string()))?;
    Ok(())
}
