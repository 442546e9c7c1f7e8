//! Google Cloud Platform provider implementations
//!
//! - Google Cloud Storage for uploaded documents
//! - Gemini for structured data extraction
//! - Cloud Firestore for ingestion records

mod auth;
mod firestore;
mod gcs_store;
mod gemini_client;

pub use auth::GcpAuth;
pub use firestore::FirestoreRecordStore;
pub use gcs_store::GcsBlobStore;
pub use gemini_client::GeminiExtractor;
