mod api;
mod app;
mod auth;
mod config;
mod db;
mod domain;
mod error;
mod logging;
mod middleware;
mod routes;
mod services;

use anyhow::{Context, Result};
use std::time::Duration;

use services::{RedisCache, StripeClient};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let settings = config::Settings::from_env()?;
    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        version = env!("CARGO_PKG_VERSION"),
        "Starting B2B marketplace backend"
    );

    let pool = db::create_pool(&settings).await?;
    if settings.run_migrations {
        db::run_migrations(&pool).await?;
    }

    let cache = RedisCache::new(&settings.redis_url, settings.redis_cache_ttl_seconds).await?;

    let stripe = StripeClient::new(
        &settings.stripe_api_url,
        &settings.stripe_secret_key,
        settings.stripe_timeout_seconds,
    )?;

    // Supabase auth proxy and JWKS fetches share one client
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .context("Failed to create HTTP client")?;

    let jwks_cache = auth::JwksCache::new(
        http_client.clone(),
        settings.supabase_jwt_jwks_url.clone(),
        settings.supabase_jwt_issuer.clone(),
        settings.supabase_jwt_audience.clone(),
        settings.jwks_cache_ttl_seconds,
    );
    if let Err(e) = jwks_cache.warm_cache().await {
        tracing::warn!(error = %e, "JWKS not reachable at startup; keys load on first request");
    }

    let server_addr = settings.server_addr.clone();
    let state = app::AppState::new(pool.clone(), settings, jwks_cache, cache, stripe, http_client);
    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind {}", server_addr))?;
    tracing::info!(addr = %server_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    pool.close().await;
    tracing::info!("Shut down cleanly");
    Ok(())
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received; draining connections");
}
