//! In-process providers for tests and local demos
//!
//! Every provider records what it was asked to do and can be primed to fail,
//! which makes stage ordering and fail-fast behavior observable.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::blob_store::{object_name, BlobStoreProvider};
use super::extraction::ExtractionProvider;
use super::record_store::RecordStoreProvider;
use crate::error::{ExtractionError, PersistError, UploadError};
use crate::types::{BlobReference, ExtractedContent, NewRecord, Record};

/// A stored object
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub reference: BlobReference,
    pub bytes: Bytes,
    pub media_type: String,
}

/// Blob store that keeps objects in memory
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<Vec<StoredBlob>>,
    failure: Option<UploadError>,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upload fails with `err`
    pub fn failing(err: UploadError) -> Self {
        Self {
            failure: Some(err),
            ..Self::default()
        }
    }

    /// Sleep before answering each upload
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of upload calls, failed ones included
    pub fn upload_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn blobs(&self) -> Vec<StoredBlob> {
        self.blobs.lock().clone()
    }
}

#[async_trait]
impl BlobStoreProvider for MemoryBlobStore {
    async fn upload(
        &self,
        bytes: Bytes,
        filename: &str,
        media_type: &str,
    ) -> Result<BlobReference, UploadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        let reference = BlobReference::new(format!(
            "memory://blobs/{}",
            object_name("", filename)
        ));
        self.blobs.lock().push(StoredBlob {
            reference: reference.clone(),
            bytes,
            media_type: media_type.to_string(),
        });
        Ok(reference)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Record store that assigns sequential ids
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<Record>>,
    failure: Option<PersistError>,
    latency: Option<Duration>,
    next_id: AtomicU64,
    calls: AtomicUsize,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every insert fails with `err`
    pub fn failing(err: PersistError) -> Self {
        Self {
            failure: Some(err),
            ..Self::default()
        }
    }

    /// Sleep before answering each insert
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of persist calls, failed ones included
    pub fn persist_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    /// Records that point at the given blob
    pub fn find_by_blob(&self, reference: &BlobReference) -> Vec<Record> {
        self.records
            .lock()
            .iter()
            .filter(|r| &r.blob_reference == reference)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RecordStoreProvider for MemoryRecordStore {
    async fn persist(&self, record: NewRecord) -> Result<Record, PersistError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = Record::assigned(record, format!("rec-{:06}", id), Utc::now());
        self.records.lock().push(record.clone());
        Ok(record)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Extraction provider that replays a fixed script of outcomes.
///
/// Once the script runs out, the last outcome repeats.
pub struct ScriptedExtractor {
    script: Mutex<VecDeque<Result<ExtractedContent, ExtractionError>>>,
    last: Mutex<Option<Result<ExtractedContent, ExtractionError>>>,
    latency: Option<Duration>,
    calls: Mutex<Vec<Instant>>,
}

impl ScriptedExtractor {
    pub fn new(script: Vec<Result<ExtractedContent, ExtractionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            latency: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same content
    pub fn always(text: impl Into<String>) -> Self {
        Self::new(vec![Ok(ExtractedContent::new(text))])
    }

    /// Sleep before answering each attempt
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Start time of every attempt, on the tokio clock
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().clone()
    }

    fn next_outcome(&self) -> Result<ExtractedContent, ExtractionError> {
        let mut last = self.last.lock();
        if let Some(outcome) = self.script.lock().pop_front() {
            *last = Some(outcome);
        }
        last.clone().unwrap_or_else(|| {
            Err(ExtractionError::Unclassified("script is empty".into()))
        })
    }
}

#[async_trait]
impl ExtractionProvider for ScriptedExtractor {
    async fn extract_once(
        &self,
        _document: &[u8],
        _media_type: &str,
    ) -> Result<ExtractedContent, ExtractionError> {
        self.calls.lock().push(Instant::now());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.next_outcome()
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
