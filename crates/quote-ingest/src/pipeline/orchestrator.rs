//! Sequential upload → extract → persist pipeline

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use super::observer::{PipelineEvent, PipelineObserver};
use super::state::{PipelineState, Stage};
use crate::config::PipelineConfig;
use crate::error::{Error, PersistError, Result, UploadError};
use crate::providers::{BlobStoreProvider, ExtractionClient, RecordStoreProvider};
use crate::types::{BlobReference, ExtractedContent, NewRecord, Record, UploadRequest};

/// Size limit and stage deadlines
#[derive(Debug, Clone)]
pub struct PipelineLimits {
    pub max_upload_bytes: u64,
    pub upload_timeout: Duration,
    pub persist_timeout: Duration,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for PipelineLimits {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            upload_timeout: Duration::from_secs(config.upload_timeout_secs),
            persist_timeout: Duration::from_secs(config.persist_timeout_secs),
        }
    }
}

/// Result of a completed pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub request_id: Uuid,
    /// Persisted record; owns the blob reference and extraction text
    pub record: Record,
    pub state: PipelineState,
}

impl PipelineOutput {
    pub fn blob_reference(&self) -> &BlobReference {
        &self.record.blob_reference
    }

    pub fn extracted(&self) -> &ExtractedContent {
        &self.record.extracted
    }
}

/// Runs one request through the three stages, stopping at the first failure.
///
/// Completed side effects are never rolled back: a blob uploaded before a
/// later stage fails stays in the store without a record.
pub struct PipelineOrchestrator {
    blob_store: Arc<dyn BlobStoreProvider>,
    extractor: Arc<ExtractionClient>,
    record_store: Arc<dyn RecordStoreProvider>,
    observer: Arc<dyn PipelineObserver>,
    limits: PipelineLimits,
}

impl PipelineOrchestrator {
    pub fn new(
        blob_store: Arc<dyn BlobStoreProvider>,
        extractor: Arc<ExtractionClient>,
        record_store: Arc<dyn RecordStoreProvider>,
        observer: Arc<dyn PipelineObserver>,
        limits: PipelineLimits,
    ) -> Self {
        Self {
            blob_store,
            extractor,
            record_store,
            observer,
            limits,
        }
    }

    pub fn limits(&self) -> &PipelineLimits {
        &self.limits
    }

    /// Provider names, for diagnostics
    pub fn describe(&self) -> serde_json::Value {
        serde_json::json!({
            "blob_store": self.blob_store.name(),
            "extraction": {
                "provider": self.extractor.provider_name(),
                "model": self.extractor.model(),
                "max_retries": self.extractor.policy().max_retries,
            },
            "record_store": self.record_store.name(),
        })
    }

    /// Run the pipeline for one request
    pub async fn run(&self, request: UploadRequest) -> Result<PipelineOutput> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let mut state = PipelineState::Received;

        tracing::info!(
            %request_id,
            filename = %request.filename(),
            size = request.byte_len(),
            media_type = %request.media_type(),
            "ingestion started"
        );

        if let Err(err) = request.validate(self.limits.max_upload_bytes) {
            return Err(finish_failed(request_id, state, PipelineState::FailedValidation, err));
        }

        // Upload
        state = state.advance(PipelineState::Uploading)?;
        let upload_timeout = self.limits.upload_timeout;
        let upload = async {
            match tokio::time::timeout(
                upload_timeout,
                self.blob_store.upload(
                    request.bytes().clone(),
                    request.filename(),
                    request.media_type(),
                ),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(UploadError::Timeout(upload_timeout.as_secs())),
            }
        };
        let blob_reference = match self.stage(request_id, Stage::Upload, upload).await {
            Ok(reference) => reference,
            Err(err) => {
                return Err(finish_failed(request_id, state, PipelineState::FailedUpload, err));
            }
        };
        state = state.advance(PipelineState::Uploaded)?;

        // Extract
        state = state.advance(PipelineState::Extracting)?;
        let extract = self
            .extractor
            .extract(request.bytes(), request.media_type());
        let extracted = match self.stage(request_id, Stage::Extract, extract).await {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(%request_id, blob = %blob_reference, "blob left without a record");
                return Err(finish_failed(request_id, state, PipelineState::FailedExtraction, err));
            }
        };
        state = state.advance(PipelineState::Extracted)?;

        // Persist
        state = state.advance(PipelineState::Persisting)?;
        let blob_url = blob_reference.to_string();
        let new_record = NewRecord {
            blob_reference,
            extracted,
            filename: request.filename().to_string(),
            byte_len: request.byte_len(),
        };
        let persist_timeout = self.limits.persist_timeout;
        let persist = async {
            match tokio::time::timeout(persist_timeout, self.record_store.persist(new_record)).await
            {
                Ok(result) => result,
                Err(_) => Err(PersistError::WriteFailure(format!(
                    "insert timed out after {}s",
                    persist_timeout.as_secs()
                ))),
            }
        };
        let record = match self.stage(request_id, Stage::Persist, persist).await {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(%request_id, blob = %blob_url, "blob left without a record");
                return Err(finish_failed(request_id, state, PipelineState::FailedPersist, err));
            }
        };
        state = state.advance(PipelineState::Complete)?;

        tracing::info!(
            %request_id,
            record_id = %record.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ingestion complete"
        );

        Ok(PipelineOutput {
            request_id,
            record,
            state,
        })
    }

    /// Run one stage, reporting entry and outcome to the observer
    async fn stage<T, E, F>(&self, request_id: Uuid, stage: Stage, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Into<Error>,
    {
        self.observer
            .on_event(request_id, &PipelineEvent::StageEntered { stage });
        let started = Instant::now();

        match fut.await {
            Ok(value) => {
                self.observer.on_event(
                    request_id,
                    &PipelineEvent::StageSucceeded {
                        stage,
                        elapsed: started.elapsed(),
                    },
                );
                Ok(value)
            }
            Err(err) => {
                let err: Error = err.into();
                self.observer.on_event(
                    request_id,
                    &PipelineEvent::StageFailed {
                        stage,
                        state: PipelineState::failed(stage),
                        kind: err.kind().unwrap_or("unknown"),
                        message: err.to_string(),
                    },
                );
                Err(err)
            }
        }
    }
}

/// Move into a terminal failure state and log it; an illegal transition
/// replaces the stage error
fn finish_failed(
    request_id: Uuid,
    state: PipelineState,
    terminal: PipelineState,
    err: Error,
) -> Error {
    match state.advance(terminal) {
        Ok(state) => {
            tracing::warn!(%request_id, state = ?state, error = %err, "ingestion failed");
            err
        }
        Err(illegal) => illegal,
    }
}
