use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use faceauthd::config::Config;
use faceauthd::engine;
use faceauthd::router::router;
use faceauthd::store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("faceauthd starting");

    let config = Config::from_env();

    // Fail fast: both models and the database must be reachable at startup.
    let engine = engine::spawn_engine(
        &config.scrfd_model_path(),
        &config.arcface_model_path(),
    )
    .context("loading face models")?;

    let store = PgStore::connect(&config.database_url)
        .await
        .context("connecting to the embedding store")?;
    tracing::info!("connected to embedding store");

    let app = router(
        Arc::new(engine),
        Arc::new(store),
        config.match_threshold,
        config.max_upload_bytes,
    );

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, threshold = config.match_threshold, "faceauthd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("faceauthd shutting down");
        })
        .await?;

    Ok(())
}
