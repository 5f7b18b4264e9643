//! Batch media generation REST server.

use media_api::server::{self, AppState};
use media_provider::ProviderGenerator;
use media_scheduler::{BatchScheduler, SchedulerConfig};
use media_store::{InMemoryJobStore, LocalFilePersister};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SchedulerConfig::from_env();
    let generator = ProviderGenerator::from_env();
    tracing::info!(
        providers = ?generator.providers(),
        max_concurrency = config.max_concurrency,
        task_timeout_ms = config.task_timeout.as_millis() as u64,
        "scheduler configured"
    );
    let scheduler = Arc::new(BatchScheduler::new(
        Arc::new(InMemoryJobStore::new()),
        Arc::new(LocalFilePersister::from_env()),
        config,
    ));
    let state = Arc::new(AppState {
        scheduler,
        generator: Arc::new(generator),
    });

    let app = server::router(state);
    let addr: SocketAddr = std::env::var("MEDIA_API_LISTEN")
        .unwrap_or_else(|_| "0.0.0.0:8002".to_string())
        .parse()?;
    tracing::info!("media API listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service(),
    )
    .await?;
    Ok(())
}
