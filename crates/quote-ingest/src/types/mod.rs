//! Core types for the ingestion pipeline

pub mod record;
pub mod response;
pub mod upload;

pub use record::{BlobReference, ExtractedContent, NewRecord, Record};
pub use response::{SavedRecord, UploadResponse};
pub use upload::UploadRequest;
