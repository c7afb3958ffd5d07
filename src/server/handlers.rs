//! HTTP request handlers for the image API.
//!
//! # Endpoints
//!
//! - `POST /upload` - Process and store an uploaded image
//! - `GET /image/{id}` - Serve a stored blob
//! - `GET /image/latest` - Metadata of the most recent upload
//! - `GET /images` - Metadata of recent uploads, newest first
//! - `GET /health` - Health check endpoint

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, Query, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::commit::CommitReceipt;
use crate::error::{PipelineError, StoreError, UploadError};
use crate::process::{content_type_for_filename, FALLBACK_CONTENT_TYPE};
use crate::service::ImageService;
use crate::store::{BlobStore, MetadataRecord, MetadataStore};

/// Name of the multipart field carrying the upload.
pub const UPLOAD_FIELD: &str = "image";

/// Default number of records returned by `GET /images`.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Upper bound on `GET /images?limit=`.
pub const MAX_LIST_LIMIT: usize = 1000;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the image service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<B: BlobStore, M: MetadataStore> {
    /// The image service for uploads and lookups
    pub service: Arc<ImageService<B, M>>,

    /// Default cache control max-age in seconds (defaults to 1 hour)
    pub cache_max_age: u32,
}

impl<B: BlobStore + 'static, M: MetadataStore + 'static> AppState<B, M> {
    /// Create a new application state with the given service.
    pub fn new(service: ImageService<B, M>) -> Self {
        Self {
            service: Arc::new(service),
            cache_max_age: 3600,
        }
    }

    /// Create a new application state with custom cache max-age.
    pub fn with_cache_max_age(service: ImageService<B, M>, cache_max_age: u32) -> Self {
        Self {
            service: Arc::new(service),
            cache_max_age,
        }
    }
}

impl<B: BlobStore, M: MetadataStore> Clone for AppState<B, M> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for the images list endpoint.
#[derive(Debug, Deserialize)]
pub struct ImagesQueryParams {
    /// Maximum number of records to return (default: 100, max: 1000)
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

impl ImagesQueryParams {
    /// The requested limit clamped to `1..=1000`.
    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, MAX_LIST_LIMIT)
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_request")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// Response from the upload endpoint.
///
/// Serializes as `{"parent_id": ..., "original_id": ..., "blue_edges_id":
/// ..., "yellow_edges_id": ...}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Identifier of the metadata record
    pub parent_id: String,

    /// `{role}_id` to blob identifier
    #[serde(flatten)]
    pub ids: BTreeMap<String, String>,
}

impl From<CommitReceipt> for UploadResponse {
    fn from(receipt: CommitReceipt) -> Self {
        let ids = receipt
            .blob_ids
            .into_iter()
            .map(|(role, id)| (format!("{}_id", role), id))
            .collect();
        Self {
            parent_id: receipt.record_id,
            ids,
        }
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Errors returned by the handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The multipart body has no `image` field
    #[error("No file part named \"image\" in the request")]
    MissingFile,

    /// The `image` field has no filename
    #[error("No file selected")]
    EmptyFilename,

    /// The `image` field has no content
    #[error("Uploaded file is empty")]
    EmptyFile,

    /// The multipart body could not be read
    #[error("Invalid multipart body: {message}")]
    Multipart { message: String, status: StatusCode },

    /// A store lookup failed
    #[error(transparent)]
    Lookup(#[from] StoreError),

    /// No upload has been committed yet
    #[error("No images found")]
    NoRecords,

    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Multipart {
            message: err.body_text(),
            status: err.status(),
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::Multipart {
            message: rejection.body_text(),
            status: rejection.status(),
        }
    }
}

impl ApiError {
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::MissingFile | ApiError::EmptyFilename | ApiError::EmptyFile => {
                (StatusCode::BAD_REQUEST, "invalid_request")
            }
            ApiError::Multipart { status, .. } => (*status, "invalid_multipart"),

            ApiError::Lookup(e) if e.is_lookup_failure() => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Lookup(StoreError::Connection(_)) => {
                (StatusCode::BAD_GATEWAY, "connection_error")
            }
            ApiError::Lookup(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),

            ApiError::NoRecords => (StatusCode::NOT_FOUND, "not_found"),

            ApiError::Upload(UploadError::Pipeline(PipelineError::Decode { .. })) => {
                (StatusCode::BAD_REQUEST, "decode_error")
            }
            ApiError::Upload(UploadError::Pipeline(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "processing_error")
            }
            ApiError::Upload(UploadError::Commit(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
            }
            ApiError::Upload(UploadError::Task(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

/// Convert ApiError to HTTP response.
///
/// This implementation logs errors appropriately based on their severity:
/// - 5xx errors are logged at ERROR level (server errors)
/// - 404 errors are logged at DEBUG level (common and expected)
/// - other 4xx errors are logged at WARN level (client errors)
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.classify();
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);

        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle image uploads.
///
/// # Endpoint
///
/// `POST /upload` with a `multipart/form-data` body whose `image` field
/// carries the file.
///
/// # Response
///
/// `200 OK` with the record and blob identifiers. Nothing is stored when
/// the request is rejected.
pub async fn upload_handler<B, M>(
    State(state): State<AppState<B, M>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError>
where
    B: BlobStore + 'static,
    M: MetadataStore + 'static,
{
    let mut multipart = multipart?;
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?;
        upload = Some((filename, content_type, data));
        break;
    }

    let (filename, content_type, data) = upload.ok_or(ApiError::MissingFile)?;
    let filename = filename
        .filter(|f| !f.trim().is_empty())
        .ok_or(ApiError::EmptyFilename)?;
    if data.is_empty() {
        return Err(ApiError::EmptyFile);
    }

    // Browsers send octet-stream for unknown types; let the pipeline sniff
    let content_type = content_type.filter(|ct| ct != FALLBACK_CONTENT_TYPE);

    info!(filename = %filename, bytes = data.len(), "Received upload");
    let receipt = state.service.upload(filename, content_type, data).await?;

    Ok(Json(receipt.into()))
}

/// Serve a stored blob.
///
/// # Endpoint
///
/// `GET /image/{id}`
///
/// # Response
///
/// `200 OK` with the blob bytes. The content type is the one recorded at
/// upload time, else guessed from the filename, else
/// `application/octet-stream`.
pub async fn image_handler<B, M>(
    State(state): State<AppState<B, M>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError>
where
    B: BlobStore + 'static,
    M: MetadataStore + 'static,
{
    let response = state.service.get_blob(&id).await?;
    let info = &response.blob.info;

    let content_type = info
        .content_type
        .clone()
        .or_else(|| content_type_for_filename(&info.filename).map(str::to_string))
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());

    let mut headers = vec![
        (header::CONTENT_TYPE, content_type),
        (
            header::CACHE_CONTROL,
            format!("public, max-age={}", state.cache_max_age),
        ),
        (
            header::CONTENT_DISPOSITION,
            format!(
                "inline; filename*=UTF-8''{}",
                urlencoding::encode(&info.filename)
            ),
        ),
    ];
    if let Some(sha256) = &info.sha256 {
        headers.push((header::ETAG, format!("\"{}\"", sha256)));
    }

    let mut http_response = Body::from(response.blob.data).into_response();
    for (name, value) in headers {
        match value.parse() {
            Ok(value) => {
                http_response.headers_mut().insert(name, value);
            }
            Err(_) => warn!(blob_id = %id, header = %name, "Skipping unrepresentable header"),
        }
    }
    http_response.headers_mut().insert(
        "x-blob-cache-hit",
        HeaderValue::from_static(if response.cache_hit { "true" } else { "false" }),
    );

    Ok(http_response)
}

/// Return the most recent upload's metadata record.
///
/// # Endpoint
///
/// `GET /image/latest`
pub async fn latest_handler<B, M>(
    State(state): State<AppState<B, M>>,
) -> Result<Json<MetadataRecord>, ApiError>
where
    B: BlobStore + 'static,
    M: MetadataStore + 'static,
{
    let record = state.service.latest().await?.ok_or(ApiError::NoRecords)?;
    Ok(Json(record))
}

/// List upload metadata records, newest first.
///
/// # Endpoint
///
/// `GET /images`
///
/// # Query Parameters
///
/// - `limit`: Maximum number of records to return (default: 100, max: 1000)
pub async fn images_handler<B, M>(
    State(state): State<AppState<B, M>>,
    Query(query): Query<ImagesQueryParams>,
) -> Result<Json<Vec<MetadataRecord>>, ApiError>
where
    B: BlobStore + 'static,
    M: MetadataStore + 'static,
{
    let records = state.service.list(query.effective_limit()).await?;
    Ok(Json(records))
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
