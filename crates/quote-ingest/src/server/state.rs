//! Application state for the ingestion server

use std::sync::Arc;
use std::time::Duration;

use crate::admission::AdmissionController;
use crate::config::{BackendProvider, IngestConfig};
use crate::error::{Error, Result};
use crate::pipeline::{PipelineLimits, PipelineOrchestrator, TracingObserver};
use crate::providers::{
    gcp::{FirestoreRecordStore, GcpAuth, GcsBlobStore, GeminiExtractor},
    local::{FsBlobStore, SqliteRecordStore},
    BlobStoreProvider, ExtractionClient, RecordStoreProvider,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration (immutable after startup)
    config: IngestConfig,
    /// Upload → extract → persist pipeline
    orchestrator: PipelineOrchestrator,
    /// Per-caller request quota
    admission: AdmissionController,
}

impl AppState {
    /// Build every client once from configuration
    pub async fn new(config: IngestConfig) -> Result<Self> {
        tracing::info!(
            "Initializing ingestion state (backend: {:?}, model: {})...",
            config.backend,
            config.extraction.model
        );

        let http = reqwest::Client::builder()
            .user_agent(concat!("quote-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        let extractor = Arc::new(GeminiExtractor::new(http.clone(), &config.extraction)?);
        let extraction = Arc::new(ExtractionClient::from_config(extractor, &config.extraction));

        let (blob_store, record_store): (Arc<dyn BlobStoreProvider>, Arc<dyn RecordStoreProvider>) =
            match config.backend {
                BackendProvider::Gcp => {
                    let gcp_config = config.gcp.as_ref().ok_or_else(|| {
                        Error::Config("GCP backend selected but gcp config is missing".to_string())
                    })?;

                    tracing::info!(
                        "Using GCP backend (bucket: {}, collection: {})",
                        gcp_config.bucket,
                        gcp_config.collection
                    );

                    let auth = Arc::new(GcpAuth::from_config(gcp_config, http.clone())?);
                    (
                        Arc::new(GcsBlobStore::new(Arc::clone(&auth), http.clone(), gcp_config)),
                        Arc::new(FirestoreRecordStore::new(auth, http, gcp_config)),
                    )
                }
                BackendProvider::Local => {
                    tracing::info!(
                        "Using local backend (blobs: {}, records: {})",
                        config.local.blob_dir.display(),
                        config.local.database_path.display()
                    );
                    (
                        Arc::new(FsBlobStore::create(config.local.blob_dir.clone())?),
                        Arc::new(SqliteRecordStore::open(&config.local.database_path)?),
                    )
                }
            };

        let orchestrator = PipelineOrchestrator::new(
            blob_store,
            extraction,
            record_store,
            Arc::new(TracingObserver),
            PipelineLimits::from(&config.pipeline),
        );

        Ok(Self::from_parts(config, orchestrator))
    }

    /// Assemble state around an already-built orchestrator
    pub fn from_parts(config: IngestConfig, orchestrator: PipelineOrchestrator) -> Self {
        let admission = AdmissionController::from_config(&config.admission);
        Self {
            inner: Arc::new(AppStateInner {
                config,
                orchestrator,
                admission,
            }),
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.inner.config
    }

    pub fn orchestrator(&self) -> &PipelineOrchestrator {
        &self.inner.orchestrator
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.inner.admission
    }

    /// Periodically drop elapsed admission windows
    pub fn spawn_admission_purge(&self) -> tokio::task::JoinHandle<()> {
        let state = self.clone();
        let period = Duration::from_secs(self.config().admission.purge_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = state.admission().purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, tracked = state.admission().tracked(), "purged admission windows");
                }
            }
        })
    }
}
