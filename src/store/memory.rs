//! In-memory stores.
//!
//! Used by `serve --storage memory` for local development and by the test
//! suite. Contents are lost when the process exits.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::StoreError;

use super::{
    new_id, parse_id, sha256_hex, BlobInfo, BlobObject, BlobStore, MetadataRecord,
    MetadataStore, NewBlob, NewMetadataRecord,
};

/// Blob store backed by a vector kept in insertion order.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<Vec<BlobObject>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, blob: NewBlob) -> Result<BlobInfo, StoreError> {
        let info = BlobInfo {
            id: new_id(),
            filename: blob.filename,
            content_type: Some(blob.content_type),
            length: blob.data.len() as u64,
            sha256: Some(sha256_hex(&blob.data)),
            uploaded_at: Utc::now(),
        };

        self.blobs.write().await.push(BlobObject {
            info: info.clone(),
            data: blob.data,
        });
        Ok(info)
    }

    async fn get(&self, id: &str) -> Result<BlobObject, StoreError> {
        parse_id(id)?;
        self.blobs
            .read()
            .await
            .iter()
            .find(|b| b.info.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.blobs.write().await.retain(|b| b.info.id != id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<BlobInfo>, StoreError> {
        Ok(self
            .blobs
            .read()
            .await
            .iter()
            .rev()
            .map(|b| b.info.clone())
            .collect())
    }
}

/// Metadata store backed by a vector kept in insertion order.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    records: RwLock<Vec<MetadataRecord>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn insert(&self, record: NewMetadataRecord) -> Result<MetadataRecord, StoreError> {
        let record = MetadataRecord {
            id: new_id(),
            filename: record.filename,
            created_at: Utc::now(),
            artifacts: record.artifacts,
        };
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn list(&self, limit: usize) -> Result<Vec<MetadataRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}
