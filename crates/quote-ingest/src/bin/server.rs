//! Ingestion server binary
//!
//! Run with: cargo run -p quote-ingest --bin quote-ingest-server

use quote_ingest::{config::IngestConfig, server::IngestServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quote_ingest=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = IngestConfig::load()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Backend: {:?}", config.backend);
    tracing::info!("  - Extraction model: {}", config.extraction.model);
    tracing::info!(
        "  - Retries: {} (initial delay {}ms)",
        config.extraction.max_retries,
        config.extraction.initial_delay_ms
    );
    tracing::info!(
        "  - Admission: {} requests per {}s",
        config.admission.max_requests,
        config.admission.window_secs
    );
    tracing::info!("  - Max upload: {} bytes", config.pipeline.max_upload_bytes);

    let server = IngestServer::new(config).await?;

    println!("\nServer starting...");
    println!("  Upload: POST http://{}/upload", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
