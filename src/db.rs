//! PostgreSQL pool, migrations and connectivity probe

use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::time::{Duration, Instant};

use crate::config::Settings;

const APPLICATION_NAME: &str = "b2b-marketplace-backend";

fn pool_options(settings: &Settings) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(settings.database_max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(1800))
}

pub async fn create_pool(settings: &Settings) -> Result<PgPool> {
    let connect_options: PgConnectOptions = settings
        .database_url
        .parse::<PgConnectOptions>()
        .context("Invalid DATABASE_URL")?
        .application_name(APPLICATION_NAME);

    let pool = pool_options(settings)
        .connect_with(connect_options)
        .await
        .context("Failed to connect to PostgreSQL")?;

    tracing::info!(
        max_connections = settings.database_max_connections,
        "Database pool ready"
    );
    Ok(pool)
}

/// Apply the embedded schema migrations under `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrator = sqlx::migrate!("./migrations");
    migrator
        .run(pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!(count = migrator.iter().count(), "Database migrations applied");
    Ok(())
}

/// Round-trip time of a trivial query, or `None` when the database is
/// unreachable.
pub async fn ping(pool: &PgPool) -> Option<Duration> {
    let started = Instant::now();
    match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => Some(started.elapsed()),
        Err(e) => {
            tracing::warn!(error = %e, "Database ping failed");
            None
        }
    }
}
