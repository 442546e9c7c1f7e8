//! Cloud Firestore record store
//!
//! Appends one document per ingestion via the Firestore REST `createDocument`
//! call. Firestore assigns the document id and `createTime`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;

use super::auth::GcpAuth;
use crate::config::GcpConfig;
use crate::error::PersistError;
use crate::providers::record_store::RecordStoreProvider;
use crate::types::{NewRecord, Record};

/// Firestore record store
pub struct FirestoreRecordStore {
    auth: Arc<GcpAuth>,
    http: reqwest::Client,
    api_url: String,
    database: String,
    collection: String,
}

impl FirestoreRecordStore {
    pub fn new(auth: Arc<GcpAuth>, http: reqwest::Client, config: &GcpConfig) -> Self {
        Self {
            auth,
            http,
            api_url: config.firestore_api_url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            collection: config.collection.clone(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/projects/{}/databases/{}/documents/{}",
            self.api_url,
            self.auth.project_id(),
            self.database,
            self.collection
        )
    }
}

/// Firestore document body for a new record
fn document_fields(record: &NewRecord) -> serde_json::Value {
    json!({
        "fields": {
            "fileUrl": {"stringValue": record.blob_reference.as_str()},
            "processedResult": {"stringValue": record.extracted.text()},
            "fileName": {"stringValue": record.filename},
            // Firestore encodes int64 as a decimal string
            "fileSize": {"integerValue": record.byte_len.to_string()},
        }
    })
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedDocument {
    name: String,
    create_time: DateTime<Utc>,
}

#[async_trait]
impl RecordStoreProvider for FirestoreRecordStore {
    async fn persist(&self, record: NewRecord) -> Result<Record, PersistError> {
        let token = self
            .auth
            .get_token()
            .await
            .map_err(|e| PersistError::StoreUnavailable(format!("Firestore credentials: {}", e)))?;

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&token)
            .json(&document_fields(&record))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    PersistError::StoreUnavailable(format!("Firestore unreachable: {}", e))
                } else {
                    PersistError::WriteFailure(format!("Firestore request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("Firestore createDocument failed ({}): {}", status, body);
            return Err(match status {
                StatusCode::NOT_FOUND
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::UNAUTHORIZED
                | StatusCode::FORBIDDEN => PersistError::StoreUnavailable(message),
                _ => PersistError::WriteFailure(message),
            });
        }

        let created: CreatedDocument = response.json().await.map_err(|e| {
            PersistError::WriteFailure(format!("Failed to parse Firestore response: {}", e))
        })?;

        let id = created
            .name
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                PersistError::WriteFailure(format!("unexpected document name '{}'", created.name))
            })?
            .to_string();

        tracing::debug!(collection = %self.collection, id = %id, "created Firestore document");
        Ok(Record::assigned(record, id, created.create_time))
    }

    fn name(&self) -> &str {
        "firestore"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlobReference, ExtractedContent};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOCS_PATH: &str = "/v1/projects/solar-prod/databases/(default)/documents/solarQuotes";

    fn store(server: &MockServer) -> FirestoreRecordStore {
        let mut config = GcpConfig::new("solar-prod", "quotes-bucket");
        config.firestore_api_url = server.uri();
        FirestoreRecordStore::new(
            Arc::new(GcpAuth::from_access_token("test-token", "solar-prod")),
            reqwest::Client::new(),
            &config,
        )
    }

    fn new_record() -> NewRecord {
        NewRecord {
            blob_reference: BlobReference::new(
                "https://storage.googleapis.com/quotes-bucket/quotes/abc-quote.pdf",
            ),
            extracted: ExtractedContent::new("{\"installer\": \"Sunny Co\"}"),
            filename: "quote.pdf".to_string(),
            byte_len: 4096,
        }
    }

    #[tokio::test]
    async fn test_store_assigns_id_and_timestamp() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DOCS_PATH))
            .and(body_partial_json(json!({
                "fields": {
                    "fileName": {"stringValue": "quote.pdf"},
                    "fileSize": {"integerValue": "4096"}
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/solar-prod/databases/(default)/documents/solarQuotes/Xy12AbC",
                "fields": {},
                "createTime": "2024-06-01T10:15:30.123456Z",
                "updateTime": "2024-06-01T10:15:30.123456Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let record = store(&server).persist(new_record()).await.unwrap();
        assert_eq!(record.id, "Xy12AbC");
        assert_eq!(record.created_at.to_rfc3339(), "2024-06-01T10:15:30.123456+00:00");
        assert_eq!(record.filename, "quote.pdf");
    }

    #[tokio::test]
    async fn test_missing_database_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("database not found"))
            .mount(&server)
            .await;

        let err = store(&server).persist(new_record()).await.unwrap_err();
        assert!(matches!(err, PersistError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_rejected_write_is_write_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid field"))
            .mount(&server)
            .await;

        let err = store(&server).persist(new_record()).await.unwrap_err();
        assert!(matches!(err, PersistError::WriteFailure(ref m) if m.contains("invalid field")));
    }
}
