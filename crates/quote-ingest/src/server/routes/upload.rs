//! Document upload endpoint

use axum::{
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    Json,
};
use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{UploadRequest, UploadResponse};

/// Multipart field carrying the document
pub const FILE_FIELD: &str = "file";

/// POST /upload - Store, extract, and record one document
pub async fn upload_document(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>> {
    tracing::info!("Received upload request");
    let mut multipart =
        multipart.map_err(|rejection| Error::validation(rejection.body_text()))?;
    let limit = state.config().pipeline.max_upload_bytes;
    let mut upload: Option<UploadRequest> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| read_error(err, limit, 0))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name != FILE_FIELD {
            if field.file_name().is_some() {
                return Err(Error::validation(format!("Unexpected file field '{}'", name)));
            }
            continue;
        }
        if upload.is_some() {
            return Err(Error::validation("Only one file may be uploaded per request."));
        }

        let filename = field.file_name().unwrap_or("").to_string();
        let media_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| {
                mime_guess::from_path(&filename)
                    .first_or_octet_stream()
                    .to_string()
            });

        let bytes = read_file(field, limit).await?;
        tracing::info!(filename = %filename, size = bytes.len(), "File received");
        upload = Some(UploadRequest::new(filename, media_type, bytes));
    }

    let request = upload.ok_or_else(|| Error::validation("No file uploaded."))?;
    let output = state.orchestrator().run(request).await?;
    Ok(Json(UploadResponse::from(output)))
}

/// Buffer a file field, giving up as soon as it passes `limit`
async fn read_file(mut field: Field<'_>, limit: u64) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|err| read_error(err, limit, buf.len() as u64))?
    {
        buf.extend_from_slice(&chunk);
        if buf.len() as u64 > limit {
            return Err(Error::PayloadTooLarge {
                size: buf.len() as u64,
                limit,
            });
        }
    }
    Ok(buf.freeze())
}

/// Map a multipart read failure; tripping the request body limit is oversize
fn read_error(err: MultipartError, limit: u64, received: u64) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return Error::PayloadTooLarge {
            size: received.max(limit.saturating_add(1)),
            limit,
        };
    }
    Error::validation(format!("Failed to read upload: {}", err.body_text()))
}
