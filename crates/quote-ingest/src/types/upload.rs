//! Inbound upload request

use bytes::Bytes;

use crate::error::{Error, Result};

/// A document submitted for ingestion.
///
/// Built once at ingress and never mutated. The payload is reference-counted
/// so stages can share it without copying.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    bytes: Bytes,
    media_type: String,
    filename: String,
    byte_len: u64,
}

impl UploadRequest {
    /// Create a request whose declared length is the payload length
    pub fn new(
        filename: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            byte_len: bytes.len() as u64,
            bytes,
            media_type: media_type.into(),
            filename: filename.into(),
        }
    }

    /// Override the declared length (e.g. from a Content-Length the caller sent)
    pub fn with_declared_len(mut self, byte_len: u64) -> Self {
        self.byte_len = byte_len;
        self
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn byte_len(&self) -> u64 {
        self.byte_len
    }

    /// Entry checks run before any external call
    pub fn validate(&self, max_bytes: u64) -> Result<()> {
        if self.filename.trim().is_empty() {
            return Err(Error::validation("Missing filename"));
        }
        if self.bytes.is_empty() {
            return Err(Error::validation("Uploaded file is empty"));
        }
        if self.byte_len != self.bytes.len() as u64 {
            return Err(Error::validation(format!(
                "Declared size {} does not match payload size {}",
                self.byte_len,
                self.bytes.len()
            )));
        }
        if self.byte_len > max_bytes {
            return Err(Error::PayloadTooLarge {
                size: self.byte_len,
                limit: max_bytes,
            });
        }
        if self.media_type.trim().is_empty() {
            return Err(Error::validation("Missing media type"));
        }
        Ok(())
    }
}
