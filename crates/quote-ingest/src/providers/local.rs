//! Local provider implementations using the filesystem and SQLite
//!
//! Used when `backend = "local"`: documents land in a directory, records in a
//! SQLite database. The extraction service is still remote.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::Url;
use rusqlite::{params, Connection, ErrorCode};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, PersistError, Result, UploadError};
use crate::types::{BlobReference, ExtractedContent, NewRecord, Record};

use super::blob_store::{object_name, BlobStoreProvider};
use super::record_store::RecordStoreProvider;

/// Local blob store using a directory
pub struct FsBlobStore {
    storage_dir: PathBuf,
}

impl FsBlobStore {
    /// Use an existing directory; uploads fail if it disappears
    pub fn new(storage_dir: PathBuf) -> Self {
        Self { storage_dir }
    }

    /// Create the directory if needed, then use it
    pub fn create(storage_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&storage_dir)?;
        Ok(Self::new(storage_dir))
    }

    async fn check_container(&self) -> std::result::Result<PathBuf, UploadError> {
        match tokio::fs::metadata(&self.storage_dir).await {
            Ok(meta) if meta.is_dir() => tokio::fs::canonicalize(&self.storage_dir)
                .await
                .map_err(|e| UploadError::IoFailure(e.to_string())),
            Ok(_) => Err(UploadError::StoreUnavailable(format!(
                "{} is not a directory",
                self.storage_dir.display()
            ))),
            Err(e) => Err(UploadError::StoreUnavailable(format!(
                "{}: {}",
                self.storage_dir.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl BlobStoreProvider for FsBlobStore {
    async fn upload(
        &self,
        bytes: Bytes,
        filename: &str,
        _media_type: &str,
    ) -> std::result::Result<BlobReference, UploadError> {
        let dir = self.check_container().await?;
        let path = dir.join(object_name("", filename));

        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| UploadError::IoFailure(format!("{}: {}", path.display(), e)))?;

        let url = Url::from_file_path(&path).map_err(|_| {
            UploadError::IoFailure(format!("cannot build file URL for {}", path.display()))
        })?;
        Ok(BlobReference::new(url.to_string()))
    }

    fn name(&self) -> &str {
        "local-fs"
    }
}

/// SQLite-backed record store
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Create or open the database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::Internal(format!("Failed to open database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Internal(format!("Failed to open in-memory database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS quote_records (
                id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
                file_url TEXT NOT NULL,
                processed_result TEXT NOT NULL,
                file_name TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX IF NOT EXISTS idx_quote_records_file_url ON quote_records(file_url);
            "#,
        )
        .map_err(|e| Error::Internal(format!("Failed to create schema: {}", e)))?;
        Ok(())
    }

    /// Records that point at the given blob
    pub async fn find_by_blob(&self, reference: &BlobReference) -> Result<Vec<Record>> {
        let conn = self.conn.clone();
        let url = reference.as_str().to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let mut stmt = conn
                .prepare(
                    "SELECT id, created_at, file_url, processed_result, file_name, file_size
                     FROM quote_records WHERE file_url = ?1 ORDER BY created_at",
                )
                .map_err(|e| Error::Internal(e.to_string()))?;
            let rows = stmt
                .query_map(params![url], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                })
                .map_err(|e| Error::Internal(e.to_string()))?;

            let mut records = Vec::new();
            for row in rows {
                let (id, created_at, file_url, result, file_name, size) =
                    row.map_err(|e| Error::Internal(e.to_string()))?;
                records.push(Record {
                    id,
                    created_at: parse_timestamp(&created_at).map_err(Error::Internal)?,
                    blob_reference: BlobReference::new(file_url),
                    extracted: ExtractedContent::new(result),
                    filename: file_name,
                    byte_len: size.max(0) as u64,
                });
            }
            Ok(records)
        })
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{}': {}", raw, e))
}

fn classify_sqlite(err: rusqlite::Error) -> PersistError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(
                e.code,
                ErrorCode::CannotOpen | ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ) =>
        {
            PersistError::StoreUnavailable(err.to_string())
        }
        _ => PersistError::WriteFailure(err.to_string()),
    }
}

#[async_trait]
impl RecordStoreProvider for SqliteRecordStore {
    async fn persist(&self, record: NewRecord) -> std::result::Result<Record, PersistError> {
        let conn = self.conn.clone();
        let url = record.blob_reference.as_str().to_string();
        let result = record.extracted.text().to_string();
        let file_name = record.filename.clone();
        let size = i64::try_from(record.byte_len)
            .map_err(|_| PersistError::WriteFailure("file size out of range".into()))?;

        let (id, created_at) = tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            conn.query_row(
                "INSERT INTO quote_records (file_url, processed_result, file_name, file_size)
                 VALUES (?1, ?2, ?3, ?4)
                 RETURNING id, created_at",
                params![url, result, file_name, size],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .map_err(classify_sqlite)
        })
        .await
        .map_err(|e| PersistError::WriteFailure(format!("Task join error: {}", e)))??;

        let created_at = parse_timestamp(&created_at).map_err(PersistError::WriteFailure)?;
        Ok(Record::assigned(record, id, created_at))
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_record(url: &str) -> NewRecord {
        NewRecord {
            blob_reference: BlobReference::new(url),
            extracted: ExtractedContent::new("{\"system_size_kw\": 6.4}"),
            filename: "quote.pdf".to_string(),
            byte_len: 2048,
        }
    }

    #[tokio::test]
    async fn test_fs_store_writes_file_and_returns_file_url() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf());

        let reference = store
            .upload(Bytes::from_static(b"%PDF-1.4"), "my quote.pdf", "application/pdf")
            .await
            .unwrap();

        assert!(reference.as_str().starts_with("file://"));
        assert!(reference.as_str().ends_with("-my_quote.pdf"));

        let path = Url::parse(reference.as_str()).unwrap().to_file_path().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"%PDF-1.4");
    }

    #[tokio::test]
    async fn test_fs_store_missing_directory_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path().join("missing"));

        let err = store
            .upload(Bytes::from_static(b"data"), "quote.pdf", "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_sqlite_assigns_identity() {
        let store = SqliteRecordStore::in_memory().unwrap();

        let first = store.persist(new_record("file:///a.pdf")).await.unwrap();
        let second = store.persist(new_record("file:///a.pdf")).await.unwrap();

        assert_eq!(first.id.len(), 32);
        assert_ne!(first.id, second.id);
        assert!(second.created_at >= first.created_at);
        assert_eq!(first.filename, "quote.pdf");
        assert_eq!(first.byte_len, 2048);
    }

    #[tokio::test]
    async fn test_sqlite_find_by_blob() {
        let store = SqliteRecordStore::in_memory().unwrap();
        let saved = store.persist(new_record("file:///a.pdf")).await.unwrap();
        store.persist(new_record("file:///b.pdf")).await.unwrap();

        let found = store
            .find_by_blob(&BlobReference::new("file:///a.pdf"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, saved.id);
        assert_eq!(found[0].extracted, saved.extracted);
    }

    #[tokio::test]
    async fn test_sqlite_file_database_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db").join("records.db");

        let id = {
            let store = SqliteRecordStore::open(&path).unwrap();
            store.persist(new_record("file:///a.pdf")).await.unwrap().id
        };

        let store = SqliteRecordStore::open(&path).unwrap();
        let found = store
            .find_by_blob(&BlobReference::new("file:///a.pdf"))
            .await
            .unwrap();
        assert_eq!(found[0].id, id);
    }
}
