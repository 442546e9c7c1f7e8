//! Record store provider trait

use async_trait::async_trait;

use crate::error::PersistError;
use crate::types::{NewRecord, Record};

/// Trait for append-only record persistence
///
/// Implementations:
/// - `FirestoreRecordStore`: Cloud Firestore
/// - `SqliteRecordStore`: Local SQLite database
///
/// The store assigns the record id and creation timestamp.
#[async_trait]
pub trait RecordStoreProvider: Send + Sync {
    /// Insert a new record
    async fn persist(&self, record: NewRecord) -> Result<Record, PersistError>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
