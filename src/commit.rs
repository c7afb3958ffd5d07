//! Commit sequencing across the blob and metadata stores.
//!
//! An upload produces several blobs and one metadata record. The two stores
//! have no shared transaction, so the committer orders the writes and
//! compensates on failure:
//!
//! ```text
//!  put original ─► put blue_edges ─► put yellow_edges ─► insert record
//!        │                │                  │                 │
//!        └────────────────┴─── on failure ───┴─────────────────┘
//!                                  │
//!                                  ▼
//!                 delete every blob written so far
//! ```
//!
//! A metadata record is only ever inserted after all of its blobs exist, so
//! readers never see a record pointing at a missing blob. If a compensating
//! delete fails the blob is left behind; its identifier is logged and
//! returned in the error so it can be removed later with [`find_orphans`].

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::error::{CommitError, StoreError};
use crate::process::{ArtifactRole, ArtifactSet};
use crate::store::{BlobInfo, BlobStore, MetadataStore, NewBlob, NewMetadataRecord};

// =============================================================================
// Commit Receipt
// =============================================================================

/// Identifiers produced by a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Identifier of the inserted metadata record
    pub record_id: String,

    /// Blob identifier for each committed role
    pub blob_ids: BTreeMap<ArtifactRole, String>,
}

impl CommitReceipt {
    /// Blob identifier for a role, if that role was committed.
    pub fn blob_id(&self, role: ArtifactRole) -> Option<&str> {
        self.blob_ids.get(&role).map(String::as_str)
    }
}

// =============================================================================
// Artifact Committer
// =============================================================================

/// Writes an [`ArtifactSet`] and its metadata record as one logical unit.
///
/// # Type Parameters
///
/// * `B` - The blob store
/// * `M` - The metadata store
pub struct ArtifactCommitter<B: BlobStore, M: MetadataStore> {
    blobs: Arc<B>,
    metadata: Arc<M>,
}

impl<B: BlobStore, M: MetadataStore> ArtifactCommitter<B, M> {
    pub fn new(blobs: Arc<B>, metadata: Arc<M>) -> Self {
        Self { blobs, metadata }
    }

    pub fn blobs(&self) -> &Arc<B> {
        &self.blobs
    }

    pub fn metadata(&self) -> &Arc<M> {
        &self.metadata
    }

    /// Commit every artifact of an upload, then its metadata record.
    ///
    /// Blobs are written one at a time in role order. On any failure the
    /// blobs written so far are deleted before the error is returned, so the
    /// caller sees either a complete commit or nothing.
    ///
    /// # Errors
    ///
    /// - [`CommitError::BlobWrite`] if a blob write fails
    /// - [`CommitError::MetadataWrite`] if the record insert fails
    ///
    /// Either variant lists the blobs that could not be rolled back.
    pub async fn commit(
        &self,
        filename: &str,
        artifacts: ArtifactSet,
    ) -> Result<CommitReceipt, CommitError> {
        let mut written: Vec<(ArtifactRole, String)> = Vec::with_capacity(artifacts.len());

        for artifact in artifacts {
            let role = artifact.role;
            let bytes = artifact.data.len();
            let blob = NewBlob {
                filename: artifact.filename,
                content_type: artifact.content_type,
                data: artifact.data,
            };

            match self.blobs.put(blob).await {
                Ok(info) => {
                    debug!(role = %role, blob_id = %info.id, bytes, "Stored blob");
                    written.push((role, info.id));
                }
                Err(source) => {
                    warn!(role = %role, error = %source, "Blob write failed, rolling back");
                    let orphaned = self.rollback(&written).await;
                    return Err(CommitError::BlobWrite {
                        role,
                        source,
                        orphaned,
                    });
                }
            }
        }

        let record = NewMetadataRecord {
            filename: filename.to_string(),
            artifacts: written.iter().cloned().collect(),
        };

        match self.metadata.insert(record).await {
            Ok(record) => {
                info!(
                    record_id = %record.id,
                    filename = %record.filename,
                    blobs = record.artifacts.len(),
                    "Committed upload"
                );
                Ok(CommitReceipt {
                    record_id: record.id,
                    blob_ids: record.artifacts,
                })
            }
            Err(source) => {
                warn!(error = %source, "Metadata insert failed, rolling back");
                let orphaned = self.rollback(&written).await;
                Err(CommitError::MetadataWrite { source, orphaned })
            }
        }
    }

    /// Delete written blobs, newest first. Each delete is attempted once.
    ///
    /// Returns the identifiers whose delete failed.
    async fn rollback(&self, written: &[(ArtifactRole, String)]) -> Vec<String> {
        let mut orphaned = Vec::new();

        for (role, id) in written.iter().rev() {
            match self.blobs.delete(id).await {
                Ok(()) => debug!(role = %role, blob_id = %id, "Rolled back blob"),
                Err(e) => {
                    error!(
                        role = %role,
                        orphaned_blob_id = %id,
                        error = %e,
                        "Failed to delete blob during rollback"
                    );
                    orphaned.push(id.clone());
                }
            }
        }

        orphaned
    }
}

impl<B: BlobStore, M: MetadataStore> Clone for ArtifactCommitter<B, M> {
    fn clone(&self) -> Self {
        Self {
            blobs: Arc::clone(&self.blobs),
            metadata: Arc::clone(&self.metadata),
        }
    }
}

// =============================================================================
// Consistency Check
// =============================================================================

/// Result of scanning the stores for unreferenced blobs.
#[derive(Debug, Clone, Default)]
pub struct OrphanReport {
    /// Number of blobs inspected
    pub blobs_scanned: usize,

    /// Number of metadata records inspected
    pub records_scanned: usize,

    /// Unreferenced blobs written after the cutoff, left alone
    pub skipped_recent: usize,

    /// Blobs no metadata record points at, newest first
    pub orphans: Vec<BlobInfo>,
}

impl OrphanReport {
    pub fn is_clean(&self) -> bool {
        self.orphans.is_empty()
    }
}

/// Find blobs that no metadata record references and that were uploaded at
/// or before `cutoff`.
///
/// An upload in flight has blobs but no record yet. Its blobs are newer than
/// any cutoff taken at least one commit duration in the past, so they are
/// counted in `skipped_recent` instead of being reported.
pub async fn find_orphans<B, M>(
    blobs: &B,
    metadata: &M,
    cutoff: DateTime<Utc>,
) -> Result<OrphanReport, StoreError>
where
    B: BlobStore + ?Sized,
    M: MetadataStore + ?Sized,
{
    // Blobs first: a commit that finishes between the two listings has its
    // record picked up by the second one
    let all_blobs = blobs.list().await?;
    let records = metadata.list(usize::MAX).await?;
    let referenced: HashSet<&str> = records
        .iter()
        .flat_map(|r| r.artifacts.values().map(String::as_str))
        .collect();

    let blobs_scanned = all_blobs.len();
    let (orphans, recent): (Vec<BlobInfo>, Vec<BlobInfo>) = all_blobs
        .into_iter()
        .filter(|b| !referenced.contains(b.id.as_str()))
        .partition(|b| b.uploaded_at <= cutoff);

    Ok(OrphanReport {
        blobs_scanned,
        records_scanned: records.len(),
        skipped_recent: recent.len(),
        orphans,
    })
}

/// Delete the orphans listed in a report.
///
/// Returns the identifiers that could not be deleted.
pub async fn delete_orphans<B>(blobs: &B, report: &OrphanReport) -> Vec<String>
where
    B: BlobStore + ?Sized,
{
    let mut failed = Vec::new();
    for orphan in &report.orphans {
        match blobs.delete(&orphan.id).await {
            Ok(()) => info!(blob_id = %orphan.id, "Deleted orphaned blob"),
            Err(e) => {
                error!(orphaned_blob_id = %orphan.id, error = %e, "Failed to delete orphaned blob");
                failed.push(orphan.id.clone());
            }
        }
    }
    failed
}
