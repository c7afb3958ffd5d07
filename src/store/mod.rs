//! Blob and metadata storage.
//!
//! Two stores back the service:
//!
//! - a [`BlobStore`] holding the raw bytes of every original and derived
//!   image, addressed by an identifier it assigns at write time;
//! - a [`MetadataStore`] holding one [`MetadataRecord`] per upload that
//!   links the roles of that upload to blob identifiers.
//!
//! Both are traits so the server can run against S3 in production and
//! against in-memory stores in development and tests.
//!
//! ```text
//! ┌──────────────────────┐      ┌──────────────────────────┐
//! │   MetadataRecord     │      │        BlobStore         │
//! │  id, filename,       │ ───► │  {id} → bytes, filename, │
//! │  role → blob id      │      │  content type, checksum  │
//! └──────────────────────┘      └──────────────────────────┘
//! ```

mod cache;
mod memory;
mod s3;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::StoreError;
use crate::process::ArtifactRole;

pub use cache::{BlobCache, DEFAULT_BLOB_CACHE_CAPACITY};
pub use memory::{MemoryBlobStore, MemoryMetadataStore};
pub use s3::{create_s3_client, S3BlobStore, S3MetadataStore};

// =============================================================================
// Identifiers
// =============================================================================

/// Allocate a new store identifier.
///
/// Identifiers are UUIDv7 strings, so sorting them lexically sorts them by
/// creation time within this process.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Validate an identifier received from a client.
pub fn parse_id(id: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(id).map_err(|_| StoreError::InvalidId(id.to_string()))
}

/// Hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

// =============================================================================
// Blob Types
// =============================================================================

/// A blob about to be written.
#[derive(Debug, Clone)]
pub struct NewBlob {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Descriptive fields of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    /// Identifier assigned by the store
    pub id: String,

    /// Filename given at upload time
    pub filename: String,

    /// MIME type recorded at upload time, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Size in bytes
    pub length: u64,

    /// Hex SHA-256 of the content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    /// When the store accepted the blob
    pub uploaded_at: DateTime<Utc>,
}

/// A stored blob with its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobObject {
    pub info: BlobInfo,
    pub data: Bytes,
}

/// Key-addressed binary storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a blob and return its newly assigned identifier and info.
    async fn put(&self, blob: NewBlob) -> Result<BlobInfo, StoreError>;

    /// Fetch a blob by identifier.
    ///
    /// Returns [`StoreError::InvalidId`] for malformed identifiers and
    /// [`StoreError::NotFound`] for unknown ones.
    async fn get(&self, id: &str) -> Result<BlobObject, StoreError>;

    /// Delete a blob. Deleting an unknown identifier is not an error.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// List every blob, newest first.
    async fn list(&self) -> Result<Vec<BlobInfo>, StoreError>;
}

// =============================================================================
// Metadata Types
// =============================================================================

/// A metadata record about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMetadataRecord {
    /// Filename of the original upload
    pub filename: String,

    /// Blob identifier for each role of the upload
    pub artifacts: BTreeMap<ArtifactRole, String>,
}

/// One committed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Identifier assigned by the store
    pub id: String,

    /// Filename of the original upload
    pub filename: String,

    /// When the record was inserted
    pub created_at: DateTime<Utc>,

    /// Blob identifier for each role of the upload
    pub artifacts: BTreeMap<ArtifactRole, String>,
}

impl MetadataRecord {
    /// Whether any role of this record points at `blob_id`.
    pub fn references(&self, blob_id: &str) -> bool {
        self.artifacts.values().any(|id| id == blob_id)
    }
}

/// Structured-record storage for upload metadata.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a record, assigning its identifier and creation time.
    async fn insert(&self, record: NewMetadataRecord) -> Result<MetadataRecord, StoreError>;

    /// The most recently inserted record, if any.
    async fn latest(&self) -> Result<Option<MetadataRecord>, StoreError> {
        Ok(self.list(1).await?.into_iter().next())
    }

    /// Up to `limit` records, newest first.
    async fn list(&self, limit: usize) -> Result<Vec<MetadataRecord>, StoreError>;
}
