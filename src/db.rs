//! Postgres pool, embedded migrations and the health probe

use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Settings;

/// Upper bound for any single statement; order placement holds row locks
const STATEMENT_TIMEOUT: &str = "15s";

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn create_pool(settings: &Settings) -> Result<PgPool> {
    let connect_options = PgConnectOptions::from_str(&settings.database_url)
        .context("Invalid DATABASE_URL")?
        .application_name("zomatify-backend")
        .options([("statement_timeout", STATEMENT_TIMEOUT)]);

    let pool = PgPoolOptions::new()
        .max_connections(settings.database_max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(300))
        .connect_with(connect_options)
        .await
        .context("Failed to connect to Postgres")?;

    tracing::info!(
        max_connections = settings.database_max_connections,
        statement_timeout = STATEMENT_TIMEOUT,
        "Database pool ready"
    );

    Ok(pool)
}

/// Apply the embedded migrations in `migrations/`
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations applied");
    Ok(())
}

/// `true` when a trivial query succeeds within the probe timeout
pub async fn health_check(pool: &PgPool) -> bool {
    match tokio::time::timeout(HEALTH_PROBE_TIMEOUT, sqlx::query("SELECT 1").execute(pool)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Database health probe failed");
            false
        }
        Err(_) => {
            tracing::warn!("Database health probe timed out");
            false
        }
    }
}
