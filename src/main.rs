use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::time::{Duration, interval};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ApiError;
use crate::extractor::YtDlp;
use crate::gate::ExtractorGate;
use crate::http::AppState;
use crate::service::ExtractionService;
use crate::storage::{DEFAULT_RETENTION_DAYS, S3Store, StorageGateway};

mod cache;
mod config;
mod error;
mod extractor;
mod gate;
mod http;
mod models;
mod service;
mod storage;

const SWEEP_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "vidgate=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let cfg = Config::load();

    info!(port = cfg.port, api_version = %cfg.api_version, "starting vidgate");
    match &cfg.cookie_path {
        Some(path) => info!(cookie_path = %path.display(), "cookie file configured"),
        None => warn!("no cookie file configured, age-restricted videos may fail"),
    }

    let storage = if cfg.storage.is_configured() {
        let store = Arc::new(S3Store::new(&cfg.storage));
        Some(Arc::new(StorageGateway::new(
            store,
            cfg.storage.public_url.clone(),
        )))
    } else {
        warn!("storage credentials not configured: /merge disabled, no retention sweep");
        None
    };

    if let Some(gateway) = storage.clone() {
        tokio::spawn(async move {
            info!("starting background retention sweep task (every 24h)");
            let mut ticker = interval(SWEEP_PERIOD);
            loop {
                // first tick fires immediately, so the sweep also runs at startup
                ticker.tick().await;
                gateway.sweep_older_than(DEFAULT_RETENTION_DAYS).await;
            }
        });
    }

    let extractor = Arc::new(YtDlp::new(cfg.cookie_path.clone()));
    let gate = ExtractorGate::new(cfg.max_concurrent_extractions);
    info!(capacity = gate.capacity(), "extraction gate ready");

    let service = Arc::new(ExtractionService::new(
        extractor,
        gate,
        storage,
        std::env::temp_dir().join("vidgate"),
    ));

    let app = http::router(AppState {
        service,
        api_version: cfg.api_version.clone(),
    });

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|error| ApiError::internal(format!("failed to bind {addr}: {error}")))?;

    info!(%addr, "listening");

    axum::serve(listener, app)
        .await
        .map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
}
