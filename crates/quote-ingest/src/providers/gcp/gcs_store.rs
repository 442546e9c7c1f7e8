//! Google Cloud Storage blob store
//!
//! Talks to the GCS JSON API directly: a bucket lookup as pre-flight, then a
//! single-request media upload. Objects are addressed by their public URL.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{StatusCode, Url};
use std::sync::Arc;

use super::auth::GcpAuth;
use crate::config::GcpConfig;
use crate::error::UploadError;
use crate::providers::blob_store::{object_name, BlobStoreProvider};
use crate::types::BlobReference;

/// Google Cloud Storage blob store
pub struct GcsBlobStore {
    auth: Arc<GcpAuth>,
    http: reqwest::Client,
    bucket: String,
    prefix: String,
    api_url: String,
    public_url: String,
}

impl GcsBlobStore {
    /// Create a new GCS blob store
    pub fn new(auth: Arc<GcpAuth>, http: reqwest::Client, config: &GcpConfig) -> Self {
        Self {
            auth,
            http,
            bucket: config.bucket.clone(),
            prefix: config.object_prefix.clone(),
            api_url: config.storage_api_url.trim_end_matches('/').to_string(),
            public_url: config.storage_public_url.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Public URL of an object: `{public_url}/{bucket}/{object}`
    pub fn public_reference(&self, object: &str) -> Result<BlobReference, UploadError> {
        let mut url = Url::parse(&self.public_url)
            .map_err(|e| UploadError::IoFailure(format!("bad public URL base: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| UploadError::IoFailure("public URL base cannot hold a path".into()))?
            .pop_if_empty()
            .push(&self.bucket)
            .extend(object.split('/'));
        Ok(BlobReference::new(url.to_string()))
    }

    async fn token(&self) -> Result<String, UploadError> {
        self.auth
            .get_token()
            .await
            .map_err(|e| UploadError::StoreUnavailable(format!("GCS credentials: {}", e)))
    }

    /// Fail fast when the bucket is missing or unreachable
    async fn ensure_bucket(&self, token: &str) -> Result<(), UploadError> {
        let url = format!("{}/storage/v1/b/{}", self.api_url, self.bucket);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                UploadError::StoreUnavailable(format!("bucket {} unreachable: {}", self.bucket, e))
            })?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(UploadError::StoreUnavailable(format!(
                "bucket {} does not exist",
                self.bucket
            ))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(UploadError::StoreUnavailable(format!(
                    "access to bucket {} denied ({})",
                    self.bucket,
                    response.status()
                )))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(UploadError::IoFailure(format!(
                    "bucket lookup failed ({}): {}",
                    status, body
                )))
            }
        }
    }
}

#[async_trait]
impl BlobStoreProvider for GcsBlobStore {
    async fn upload(
        &self,
        bytes: Bytes,
        filename: &str,
        media_type: &str,
    ) -> Result<BlobReference, UploadError> {
        let token = self.token().await?;
        self.ensure_bucket(&token).await?;

        let object = object_name(&self.prefix, filename);
        let url = format!("{}/upload/storage/v1/b/{}/o", self.api_url, self.bucket);
        let size = bytes.len();

        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .query(&[("uploadType", "media"), ("name", object.as_str())])
            .header(reqwest::header::CONTENT_TYPE, media_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| UploadError::IoFailure(format!("GCS upload failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::IoFailure(format!(
                "GCS upload rejected ({}): {}",
                status, body
            )));
        }

        tracing::debug!(bucket = %self.bucket, object = %object, size, "stored object in GCS");
        self.public_reference(&object)
    }

    fn name(&self) -> &str {
        "gcs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> GcsBlobStore {
        let mut config = GcpConfig::new("solar-prod", "quotes-bucket");
        config.storage_api_url = server.uri();
        GcsBlobStore::new(
            Arc::new(GcpAuth::from_access_token("test-token", "solar-prod")),
            reqwest::Client::new(),
            &config,
        )
    }

    #[tokio::test]
    async fn test_upload_returns_public_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/quotes-bucket"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "quotes-bucket"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload/storage/v1/b/quotes-bucket/o"))
            .and(query_param("uploadType", "media"))
            .and(header("content-type", "application/pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "quotes/obj"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reference = store(&server)
            .upload(Bytes::from_static(b"%PDF-1.7"), "Quote.pdf", "application/pdf")
            .await
            .unwrap();

        let url = reference.as_str();
        assert!(url.starts_with("https://storage.googleapis.com/quotes-bucket/quotes/"));
        assert!(url.ends_with("-Quote.pdf"));
    }

    #[tokio::test]
    async fn test_missing_bucket_skips_upload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/quotes-bucket"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = store(&server)
            .upload(Bytes::from_static(b"%PDF"), "quote.pdf", "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_rejected_transfer_is_io_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/quotes-bucket"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload/storage/v1/b/quotes-bucket/o"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend error"))
            .expect(1)
            .mount(&server)
            .await;

        let err = store(&server)
            .upload(Bytes::from_static(b"%PDF"), "quote.pdf", "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::IoFailure(ref m) if m.contains("backend error")));
    }

    #[test]
    fn test_public_reference_encodes_segments() {
        let config = GcpConfig::new("solar-prod", "quotes-bucket");
        let store = GcsBlobStore::new(
            Arc::new(GcpAuth::from_access_token("t", "solar-prod")),
            reqwest::Client::new(),
            &config,
        );
        let reference = store.public_reference("quotes/abc-q 1.pdf").unwrap();
        assert_eq!(
            reference.as_str(),
            "https://storage.googleapis.com/quotes-bucket/quotes/abc-q%201.pdf"
        );
    }
}
