//! Provider abstractions for blob storage, extraction, and record storage
//!
//! Each external service sits behind a trait so the pipeline can run against
//! GCP (GCS + Gemini + Firestore), the local backend, or in-memory doubles.

pub mod blob_store;
pub mod extraction;
pub mod gcp;
pub mod local;
pub mod memory;
pub mod record_store;

pub use blob_store::BlobStoreProvider;
pub use extraction::{ExtractionClient, ExtractionProvider};
pub use record_store::RecordStoreProvider;
