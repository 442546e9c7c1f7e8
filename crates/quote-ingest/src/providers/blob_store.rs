//! Blob store provider trait for storing uploaded documents

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::error::UploadError;
use crate::types::BlobReference;

/// Trait for binary object storage
///
/// Implementations:
/// - `GcsBlobStore`: Google Cloud Storage
/// - `FsBlobStore`: Local filesystem
///
/// Implementations check that their container exists before writing and
/// never retry internally. The caller bounds the whole call with a deadline.
#[async_trait]
pub trait BlobStoreProvider: Send + Sync {
    /// Store a document and return its public reference
    async fn upload(
        &self,
        bytes: Bytes,
        filename: &str,
        media_type: &str,
    ) -> Result<BlobReference, UploadError>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

const MAX_NAME_LEN: usize = 200;

/// Reduce a client-supplied filename to a safe object name component
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "document".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Unique object name so repeated uploads of the same file never collide
pub fn object_name(prefix: &str, filename: &str) -> String {
    format!("{}{}-{}", prefix, Uuid::new_v4(), sanitize_filename(filename))
}
