//! Test utilities for integration tests.
//!
//! This module provides store fakes with failure injection, multipart
//! request builders, and helpers for creating test images.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

use edge_layers::error::StoreError;
use edge_layers::store::{
    BlobInfo, BlobObject, BlobStore, MemoryBlobStore, MemoryMetadataStore, MetadataRecord,
    MetadataStore, NewBlob, NewMetadataRecord,
};
use edge_layers::{create_router, ImageService, RouterConfig};

pub const BOUNDARY: &str = "edge-layers-test-boundary";

// =============================================================================
// Failing Stores
// =============================================================================

/// Metadata store whose inserts always fail.
///
/// Reads delegate to an (always empty) in-memory store.
#[derive(Default)]
pub struct FailingMetadataStore {
    inner: MemoryMetadataStore,
    attempts: AtomicUsize,
}

impl FailingMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of insert attempts seen.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataStore for FailingMetadataStore {
    async fn insert(&self, _record: NewMetadataRecord) -> Result<MetadataRecord, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Backend("metadata store unavailable".to_string()))
    }

    async fn list(&self, limit: usize) -> Result<Vec<MetadataRecord>, StoreError> {
        self.inner.list(limit).await
    }
}

/// Blob store that fails the put at a given zero-based position.
pub struct FailingBlobStore {
    inner: MemoryBlobStore,
    fail_at: usize,
    puts: AtomicUsize,
}

impl FailingBlobStore {
    pub fn failing_at(fail_at: usize) -> Self {
        Self {
            inner: MemoryBlobStore::new(),
            fail_at,
            puts: AtomicUsize::new(0),
        }
    }

    /// Number of blobs currently stored.
    pub async fn len(&self) -> usize {
        self.inner.len().await
    }
}

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn put(&self, blob: NewBlob) -> Result<BlobInfo, StoreError> {
        if self.puts.fetch_add(1, Ordering::SeqCst) == self.fail_at {
            return Err(StoreError::S3("simulated write failure".to_string()));
        }
        self.inner.put(blob).await
    }

    async fn get(&self, id: &str) -> Result<BlobObject, StoreError> {
        self.inner.get(id).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }

    async fn list(&self) -> Result<Vec<BlobInfo>, StoreError> {
        self.inner.list().await
    }
}

// =============================================================================
// Router Helpers
// =============================================================================

/// Router plus handles on its in-memory stores.
pub struct TestApp {
    pub router: Router,
    pub blobs: Arc<MemoryBlobStore>,
    pub metadata: Arc<MemoryMetadataStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_router_config())
    }

    pub fn with_config(config: RouterConfig) -> Self {
        let blobs = Arc::new(MemoryBlobStore::new());
        let metadata = Arc::new(MemoryMetadataStore::new());
        let router = create_router(ImageService::new(blobs.clone(), metadata.clone()), config);
        Self {
            router,
            blobs,
            metadata,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        send(&self.router, request).await
    }
}

/// Router configuration used by tests (tracing off).
pub fn test_router_config() -> RouterConfig {
    RouterConfig::new().with_tracing(false)
}

/// Build a router over arbitrary stores.
pub fn router_with<B, M>(blobs: Arc<B>, metadata: Arc<M>) -> Router
where
    B: BlobStore + 'static,
    M: MetadataStore + 'static,
{
    create_router(ImageService::new(blobs, metadata), test_router_config())
}

/// A fully-read response.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body should be JSON")
    }

    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .unwrap_or_else(|| panic!("missing header {}", name))
            .to_str()
            .unwrap()
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    TestResponse {
        status,
        headers,
        body,
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// =============================================================================
// Multipart Requests
// =============================================================================

/// Encode one multipart/form-data part.
pub fn multipart_part(
    field: &str,
    filename: Option<&str>,
    content_type: Option<&str>,
    data: &[u8],
) -> Vec<u8> {
    let mut part = Vec::new();
    part.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    match filename {
        Some(name) => part.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, name
            )
            .as_bytes(),
        ),
        None => part.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n", field).as_bytes(),
        ),
    }
    if let Some(ct) = content_type {
        part.extend_from_slice(format!("Content-Type: {}\r\n", ct).as_bytes());
    }
    part.extend_from_slice(b"\r\n");
    part.extend_from_slice(data);
    part.extend_from_slice(b"\r\n");
    part
}

/// Build a `POST /upload` request from already-encoded parts.
pub fn multipart_request(parts: Vec<Vec<u8>>) -> Request<Body> {
    let mut body: Vec<u8> = parts.into_iter().flatten().collect();
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Build a `POST /upload` request with a single `image` field.
pub fn upload_request(filename: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    multipart_request(vec![multipart_part(
        "image",
        Some(filename),
        Some(content_type),
        data,
    )])
}

// =============================================================================
// Test Images
// =============================================================================

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

/// A black image with a white square in the middle.
pub fn create_square_png(size: u32) -> Vec<u8> {
    let lo = size / 4;
    let hi = size - size / 4;
    let img = GrayImage::from_fn(size, size, |x, y| {
        if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
            Luma([255])
        } else {
            Luma([0])
        }
    });
    encode(DynamicImage::ImageLuma8(img), ImageFormat::Png)
}

/// A uniformly gray image.
pub fn create_solid_gray_png(width: u32, height: u32) -> Vec<u8> {
    let img = GrayImage::from_pixel(width, height, Luma([128]));
    encode(DynamicImage::ImageLuma8(img), ImageFormat::Png)
}

/// A JPEG with a diagonal gradient and a bright stripe.
pub fn create_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = GrayImage::from_fn(width, height, |x, y| {
        if x == width / 2 || x == width / 2 + 1 {
            Luma([255])
        } else {
            Luma([((x + y) % 64) as u8])
        }
    });
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, 90)
        .encode_image(&img)
        .unwrap();
    buf
}

/// Decode a PNG layer into RGBA.
pub fn decode_layer(data: &[u8]) -> RgbaImage {
    image::load_from_memory_with_format(data, ImageFormat::Png)
        .expect("layer should be a PNG")
        .to_rgba8()
}

/// Check for the PNG signature.
pub fn is_valid_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
}
