use thiserror::Error;

use crate::process::ArtifactRole;

/// Errors returned by the blob and metadata stores
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No object or record exists under the identifier
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Identifier is not a well-formed store identifier
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    /// Error reported by S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// A stored record could not be serialized or deserialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend refused the operation for another reason
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this error means the identifier does not resolve to anything.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(self, StoreError::NotFound(_) | StoreError::InvalidId(_))
    }
}

/// Errors produced by the edge-extraction pipeline
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Input bytes could not be decoded into a grayscale image (client error)
    #[error("Could not decode image: {message}")]
    Decode { message: String },

    /// A derived canvas could not be encoded
    #[error("Could not encode {role} layer: {message}")]
    Encode { role: ArtifactRole, message: String },

    /// A variant recipe is unusable (e.g. unsupported Sobel aperture)
    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

/// Errors produced while committing an artifact set to the stores
#[derive(Debug, Clone, Error)]
pub enum CommitError {
    /// A blob write failed; blobs written before it were deleted
    #[error("Failed to store {role} blob: {source}")]
    BlobWrite {
        role: ArtifactRole,
        #[source]
        source: StoreError,
        /// Blob identifiers that could not be removed during rollback
        orphaned: Vec<String>,
    },

    /// The metadata insert failed after every blob was written
    #[error("Failed to store metadata record: {source}")]
    MetadataWrite {
        #[source]
        source: StoreError,
        /// Blob identifiers that could not be removed during rollback
        orphaned: Vec<String>,
    },
}

impl CommitError {
    /// Blob identifiers left behind because their compensating delete failed.
    pub fn orphaned(&self) -> &[String] {
        match self {
            CommitError::BlobWrite { orphaned, .. } | CommitError::MetadataWrite { orphaned, .. } => {
                orphaned
            }
        }
    }
}

/// Errors produced by the upload workflow (pipeline, then commit)
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    /// The blocking pipeline task panicked or was cancelled
    #[error("Processing task failed: {0}")]
    Task(String),
}

impl UploadError {
    /// Whether the client sent something that cannot be processed.
    pub fn is_client_error(&self) -> bool {
        matches!(self, UploadError::Pipeline(PipelineError::Decode { .. }))
    }
}
