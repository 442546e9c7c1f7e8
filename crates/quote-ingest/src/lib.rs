//! quote-ingest: document ingestion with AI extraction
//!
//! Accepts an uploaded document, stores it in a blob store, extracts
//! structured data from it with Gemini, and records the result together with
//! the document's public URL. Admission control caps requests per caller.

pub mod admission;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod providers;
pub mod retry;
pub mod server;
pub mod types;

pub use admission::{AdmissionController, AdmissionDecision};
pub use config::IngestConfig;
pub use error::{Error, Result};
pub use pipeline::{PipelineOrchestrator, PipelineOutput, PipelineState, Stage};
pub use types::{BlobReference, ExtractedContent, Record, UploadRequest, UploadResponse};
