//! Stage outputs and persisted records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Public URL of a stored document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobReference(String);

impl BlobReference {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for BlobReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw text returned by the extraction service (usually JSON, never checked)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedContent(String);

impl ExtractedContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }

    pub fn into_text(self) -> String {
        self.0
    }
}

/// Record contents before the store assigns identity
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub blob_reference: BlobReference,
    pub extracted: ExtractedContent,
    pub filename: String,
    pub byte_len: u64,
}

/// A persisted ingestion result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Store-assigned identifier
    pub id: String,
    /// Store-assigned creation time
    pub created_at: DateTime<Utc>,
    pub blob_reference: BlobReference,
    pub extracted: ExtractedContent,
    pub filename: String,
    pub byte_len: u64,
}

impl Record {
    /// Attach store-assigned identity to a new record
    pub fn assigned(new: NewRecord, id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at,
            blob_reference: new.blob_reference,
            extracted: new.extracted,
            filename: new.filename,
            byte_len: new.byte_len,
        }
    }
}
