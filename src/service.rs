//! Image service tying the pipeline, committer, and stores together.
//!
//! The service is the entry point the HTTP handlers call:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       ImageService                         │
//! │   upload()                       get_blob()                │
//! │   1. run pipeline (blocking)     1. check cache            │
//! │   2. commit set + record         2. fetch from BlobStore   │
//! │                                  3. cache & return         │
//! │        │              │                  │                 │
//! │        ▼              ▼                  ▼                 │
//! │  ┌────────────┐ ┌──────────────────┐ ┌───────────┐         │
//! │  │EdgePipeline│ │ArtifactCommitter │ │ BlobCache │         │
//! │  └────────────┘ └──────────────────┘ └───────────┘         │
//! └────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::commit::{ArtifactCommitter, CommitReceipt};
use crate::error::{StoreError, UploadError};
use crate::process::EdgePipeline;
use crate::store::{BlobCache, BlobObject, BlobStore, MetadataRecord, MetadataStore};

/// A blob fetched through the service.
#[derive(Debug, Clone)]
pub struct BlobResponse {
    pub blob: BlobObject,

    /// Whether this blob was served from cache
    pub cache_hit: bool,
}

/// Service handling uploads and lookups.
///
/// # Type Parameters
///
/// * `B` - The blob store
/// * `M` - The metadata store
pub struct ImageService<B: BlobStore, M: MetadataStore> {
    pipeline: Arc<EdgePipeline>,
    committer: ArtifactCommitter<B, M>,

    /// Read cache for blob contents
    cache: BlobCache,
}

impl<B: BlobStore + 'static, M: MetadataStore + 'static> ImageService<B, M> {
    /// Create a service with the default pipeline and cache capacity.
    pub fn new(blobs: Arc<B>, metadata: Arc<M>) -> Self {
        Self {
            pipeline: Arc::new(EdgePipeline::default()),
            committer: ArtifactCommitter::new(blobs, metadata),
            cache: BlobCache::new(),
        }
    }

    /// Create a service with a custom blob cache capacity in bytes.
    pub fn with_cache_capacity(blobs: Arc<B>, metadata: Arc<M>, cache_capacity: usize) -> Self {
        Self {
            pipeline: Arc::new(EdgePipeline::default()),
            committer: ArtifactCommitter::new(blobs, metadata),
            cache: BlobCache::with_capacity(cache_capacity),
        }
    }

    /// Replace the pipeline.
    pub fn with_pipeline(mut self, pipeline: EdgePipeline) -> Self {
        self.pipeline = Arc::new(pipeline);
        self
    }

    pub fn pipeline(&self) -> &EdgePipeline {
        &self.pipeline
    }

    pub fn blobs(&self) -> &Arc<B> {
        self.committer.blobs()
    }

    pub fn metadata(&self) -> &Arc<M> {
        self.committer.metadata()
    }

    /// Process an upload and commit every artifact.
    ///
    /// The pipeline runs on the blocking thread pool; nothing is written to
    /// either store until it has produced the complete artifact set.
    ///
    /// # Errors
    ///
    /// - [`UploadError::Pipeline`] if the image cannot be decoded or a layer
    ///   cannot be encoded
    /// - [`UploadError::Commit`] if a store write fails (already rolled back)
    pub async fn upload(
        &self,
        filename: String,
        content_type: Option<String>,
        data: Bytes,
    ) -> Result<CommitReceipt, UploadError> {
        let bytes = data.len();
        let pipeline = Arc::clone(&self.pipeline);
        let name = filename.clone();

        let artifacts = tokio::task::spawn_blocking(move || {
            pipeline.run(&name, content_type.as_deref(), data)
        })
        .await
        .map_err(|e| UploadError::Task(e.to_string()))??;

        debug!(
            filename = %filename,
            bytes,
            artifacts = artifacts.len(),
            "Pipeline finished"
        );

        let receipt = self.committer.commit(&filename, artifacts).await?;
        info!(record_id = %receipt.record_id, filename = %filename, bytes, "Upload stored");
        Ok(receipt)
    }

    /// Fetch a blob, using the cache when available.
    pub async fn get_blob(&self, id: &str) -> Result<BlobResponse, StoreError> {
        if let Some(blob) = self.cache.get(id).await {
            return Ok(BlobResponse {
                blob,
                cache_hit: true,
            });
        }

        let blob = self.blobs().get(id).await?;
        self.cache.put(blob.clone()).await;

        Ok(BlobResponse {
            blob,
            cache_hit: false,
        })
    }

    /// The most recently committed upload, if any.
    pub async fn latest(&self) -> Result<Option<MetadataRecord>, StoreError> {
        self.metadata().latest().await
    }

    /// Up to `limit` committed uploads, newest first.
    pub async fn list(&self, limit: usize) -> Result<Vec<MetadataRecord>, StoreError> {
        self.metadata().list(limit).await
    }

    /// Blob cache statistics.
    ///
    /// Returns `(current_size, capacity, entry_count)`.
    pub async fn cache_stats(&self) -> (usize, usize, usize) {
        let size = self.cache.size().await;
        let capacity = self.cache.capacity();
        let count = self.cache.len().await;
        (size, capacity, count)
    }
}
