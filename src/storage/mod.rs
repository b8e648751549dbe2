//! Transcript persistence.
//!
//! The relay hands its finalized transcript to a [`TranscriptStore`]; the
//! production implementation writes one JSON blob per run into Azure Blob
//! Storage, keyed by call id and a timestamp-derived filename. The store is
//! an injected dependency so the relay can be exercised without cloud
//! credentials.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use serde_json::json;
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::relay::TranscriptEntry;

/// Errors that can occur while persisting a transcript.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The blob write failed
    #[error("object store error: {0}")]
    Store(#[from] object_store::Error),

    /// The transcript could not be serialized
    #[error("failed to serialize transcript: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The blob timestamp could not be formatted
    #[error("failed to format timestamp")]
    Timestamp,
}

/// Write-once sink for finished transcripts.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Persist the ordered transcript of one relay run.
    async fn save(&self, call_id: &str, entries: &[TranscriptEntry]) -> Result<(), StorageError>;
}

// =============================================================================
// Blob Storage
// =============================================================================

/// Transcript store backed by an [`ObjectStore`].
///
/// Blobs are laid out as `{call_id}/conversation_{YYYY-MM-DDTHH_MM_SSZ}.json`
/// and contain the call id, the write timestamp and the full message list.
pub struct BlobTranscriptStore {
    store: Arc<dyn ObjectStore>,
}

impl BlobTranscriptStore {
    /// Wrap an already-built object store.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Build a store against an Azure Blob Storage container.
    pub fn azure(account: &str, access_key: &str, container: &str) -> Result<Self, StorageError> {
        let store = MicrosoftAzureBuilder::new()
            .with_account(account)
            .with_access_key(access_key)
            .with_container_name(container)
            .build()?;
        Ok(Self::new(Arc::new(store)))
    }
}

/// Blob name for one transcript write.
fn object_key(call_id: &str, timestamp: &str) -> String {
    format!("{call_id}/conversation_{timestamp}.json")
}

/// Timestamp used in blob names: colon-free so it stays filename-safe.
fn blob_timestamp(now: OffsetDateTime) -> Result<String, StorageError> {
    let format =
        format_description!("[year]-[month]-[day]T[hour]_[minute]_[second]Z");
    now.format(&format).map_err(|_| StorageError::Timestamp)
}

#[async_trait]
impl TranscriptStore for BlobTranscriptStore {
    async fn save(&self, call_id: &str, entries: &[TranscriptEntry]) -> Result<(), StorageError> {
        let timestamp = blob_timestamp(OffsetDateTime::now_utc())?;
        let key = object_key(call_id, &timestamp);

        let payload = serde_json::to_vec_pretty(&json!({
            "call_id": call_id,
            "timestamp": timestamp,
            "messages": entries,
        }))?;

        let path = ObjectPath::from(key.clone());
        self.store
            .put(&path, PutPayload::from(Bytes::from(payload)))
            .await?;

        info!(call_id, blob = %key, entries = entries.len(), "transcript saved");
        Ok(())
    }
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Transcript store that keeps everything in memory. Used in tests and by
/// embedders that persist transcripts themselves.
#[derive(Default)]
pub struct MemoryTranscriptStore {
    saved: Mutex<Vec<(String, Vec<TranscriptEntry>)>>,
}

impl MemoryTranscriptStore {
    /// Every transcript saved so far, in save order.
    pub async fn saved(&self) -> Vec<(String, Vec<TranscriptEntry>)> {
        self.saved.lock().await.clone()
    }
}

#[async_trait]
impl TranscriptStore for MemoryTranscriptStore {
    async fn save(&self, call_id: &str, entries: &[TranscriptEntry]) -> Result<(), StorageError> {
        self.saved
            .lock()
            .await
            .push((call_id.to_string(), entries.to_vec()));
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::relay::{Role, TranscriptLog};
    use futures_util::StreamExt;
    use object_store::memory::InMemory;
    use std::time::Duration;
    use time::macros::datetime;

    fn sample_entries() -> Vec<TranscriptEntry> {
        let mut log = TranscriptLog::new("call-1");
        log.append(Role::User, "hello");
        log.append(Role::Assistant, "hi there");
        log.finalize(Duration::from_secs(2))
    }

    #[test]
    fn test_object_key_layout() {
        assert_eq!(
            object_key("call-1", "2030-01-01T00_00_00Z"),
            "call-1/conversation_2030-01-01T00_00_00Z.json"
        );
    }

    #[test]
    fn test_blob_timestamp_is_filename_safe() {
        let stamp = blob_timestamp(datetime!(2030-01-02 03:04:05 UTC)).unwrap();
        assert_eq!(stamp, "2030-01-02T03_04_05Z");
        assert!(!stamp.contains(':'));
    }

    #[tokio::test]
    async fn test_blob_store_writes_one_object() {
        let inner = Arc::new(InMemory::new());
        let store = BlobTranscriptStore::new(inner.clone());
        store.save("call-1", &sample_entries()).await.unwrap();

        let mut listing = inner.list(None);
        let meta = listing.next().await.unwrap().unwrap();
        let location = meta.location.to_string();
        assert!(location.starts_with("call-1/conversation_"));
        assert!(location.ends_with(".json"));

        let body = inner.get(&meta.location).await.unwrap().bytes().await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["call_id"], "call-1");
        assert_eq!(value["messages"].as_array().unwrap().len(), 3);
        assert_eq!(value["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_memory_store_keeps_save_order() {
        let store = MemoryTranscriptStore::default();
        store.save("a", &sample_entries()).await.unwrap();
        store.save("b", &[]).await.unwrap();

        let saved = store.saved().await;
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].0, "a");
        assert_eq!(saved[1].0, "b");
        assert!(saved[1].1.is_empty());
    }
}
