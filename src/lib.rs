//! # Edge Layers
//!
//! An image upload service that derives colorized edge-map layers and
//! stores them in S3-compatible object storage.
//!
//! Every upload is decoded to grayscale and run through two Canny edge
//! recipes. Each recipe produces a transparent PNG layer with its edges
//! painted in a single label color. The original and both layers are stored
//! as blobs, and one metadata record links them together.
//!
//! ## Features
//!
//! - **Edge extraction**: Canny detection with Gaussian or bilateral denoising
//! - **Transparent layers**: Edge pixels in a label color, everything else clear
//! - **All-or-nothing commits**: Partial uploads are rolled back
//! - **Pluggable storage**: S3 in production, in-memory stores for development
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`process`] - Decoding, denoising, edge detection, recoloring, PNG encoding
//! - [`store`] - Blob and metadata stores (S3 and in-memory) and the blob cache
//! - [`commit`] - Ordered writes with compensating deletes
//! - [`service`] - Upload and lookup workflows used by the handlers
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use edge_layers::{create_router, ImageService, MemoryBlobStore, MemoryMetadataStore, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = ImageService::new(
//!         Arc::new(MemoryBlobStore::new()),
//!         Arc::new(MemoryMetadataStore::new()),
//!     );
//!     let router = create_router(service, RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:5000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod commit;
pub mod config;
pub mod error;
pub mod process;
pub mod server;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use commit::{delete_orphans, find_orphans, ArtifactCommitter, CommitReceipt, OrphanReport};
pub use config::{CheckConfig, Cli, Command, ProcessConfig, S3Args, ServeConfig, StorageBackend};
pub use error::{CommitError, PipelineError, StoreError, UploadError};
pub use process::{ArtifactRole, ArtifactSet, EdgePipeline, EncodedArtifact, VariantRecipe};
pub use server::{create_router, ApiError, AppState, ErrorResponse, RouterConfig, UploadResponse};
pub use service::{BlobResponse, ImageService};
pub use store::{
    create_s3_client, BlobCache, BlobInfo, BlobObject, BlobStore, MemoryBlobStore,
    MemoryMetadataStore, MetadataRecord, MetadataStore, S3BlobStore, S3MetadataStore,
};
