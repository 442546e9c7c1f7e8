//! HTTP response bodies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::PipelineOutput;

/// Successful upload response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Public URL of the stored document
    pub file_url: String,
    /// Raw extraction text
    pub processed_result: String,
    /// Store-assigned identity of the record
    pub saved_data: SavedRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

impl From<PipelineOutput> for UploadResponse {
    fn from(output: PipelineOutput) -> Self {
        let record = output.record;
        Self {
            file_url: record.blob_reference.into_string(),
            processed_result: record.extracted.into_text(),
            saved_data: SavedRecord {
                id: record.id,
                created_at: record.created_at,
            },
        }
    }
}
