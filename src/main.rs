use anyhow::Result;
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod storage;

use services::{
    reporter::{EventReporter, HttpReporter, LogReporter},
    storage_service::StorageService,
};
use storage::s3::S3Store;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting s3-gateway with config: {:?}", cfg);

    // --- Initialize backend client ---
    let store = S3Store::connect(&cfg.s3).await;
    tracing::info!(
        endpoint = %cfg.s3.endpoint,
        region = %cfg.s3.region,
        bucket = %cfg.bucket,
        path_style = cfg.s3.path_style,
        "S3 client configured"
    );

    let reporter: Arc<dyn EventReporter> = match &cfg.reporter {
        Some(settings) => {
            tracing::info!(url = %settings.url, "Forwarding events to collector");
            Arc::new(HttpReporter::new(
                settings.url.clone(),
                settings.token.as_ref().map(|t| t.expose().to_string()),
            ))
        }
        None => Arc::new(LogReporter),
    };

    tracing::info!(
        max_attempts = cfg.retry.max_attempts(),
        delay_ms = cfg.retry.delay().as_millis() as u64,
        save_mode = ?cfg.save_mode,
        "Storage policy"
    );

    // --- Initialize core service ---
    let storage = StorageService::new(Arc::new(store), cfg.bucket.clone(), cfg.cdn_endpoint.clone())
        .with_retry(cfg.retry.clone())
        .with_reporter(reporter)
        .with_save_mode(cfg.save_mode);

    match storage.check_ready().await {
        Ok(()) => tracing::info!("Bucket {} is reachable", cfg.bucket),
        Err(err) => tracing::warn!("Bucket {} is not reachable yet: {}", cfg.bucket, err),
    }

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_upload_bytes)
        .with_state(storage)
        .layer(TraceLayer::new_for_http());

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
