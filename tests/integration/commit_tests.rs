//! Commit integration tests: store failures during upload.
//!
//! Tests verify that a failed upload leaves no blobs and no records behind
//! and that the client sees a storage error.

use std::sync::Arc;

use axum::http::StatusCode;

use edge_layers::store::{BlobStore, MemoryBlobStore, MemoryMetadataStore, MetadataStore};

use super::test_utils::{
    create_square_png, get, router_with, send, upload_request, FailingBlobStore,
    FailingMetadataStore,
};

#[tokio::test]
async fn test_metadata_failure_rolls_back_blobs() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let metadata = Arc::new(FailingMetadataStore::new());
    let router = router_with(blobs.clone(), metadata.clone());

    let png = create_square_png(32);
    let response = send(&router, upload_request("square.png", "image/png", &png)).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let json = response.json();
    assert_eq!(json["error"], "storage_error");
    assert_eq!(json["status"], 500);

    assert_eq!(metadata.attempts(), 1);
    assert!(blobs.is_empty().await);
    assert!(metadata.list(10).await.unwrap().is_empty());

    let latest = send(&router, get("/image/latest")).await;
    assert_eq!(latest.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_blob_failure_rolls_back_earlier_blobs() {
    // Original and blue layer succeed, yellow layer fails
    let blobs = Arc::new(FailingBlobStore::failing_at(2));
    let metadata = Arc::new(MemoryMetadataStore::new());
    let router = router_with(blobs.clone(), metadata.clone());

    let png = create_square_png(32);
    let response = send(&router, upload_request("square.png", "image/png", &png)).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json()["error"], "storage_error");
    assert_eq!(blobs.len().await, 0);
    assert!(blobs.list().await.unwrap().is_empty());
    assert!(metadata.is_empty().await);
}

#[tokio::test]
async fn test_first_blob_failure_writes_nothing() {
    let blobs = Arc::new(FailingBlobStore::failing_at(0));
    let metadata = Arc::new(MemoryMetadataStore::new());
    let router = router_with(blobs.clone(), metadata.clone());

    let png = create_square_png(32);
    let response = send(&router, upload_request("square.png", "image/png", &png)).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(blobs.len().await, 0);
    assert!(metadata.is_empty().await);

    // The store recovers; the next upload goes through
    let response = send(&router, upload_request("square.png", "image/png", &png)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(blobs.len().await, 3);
    assert_eq!(metadata.len().await, 1);
}

#[tokio::test]
async fn test_concurrent_uploads_are_independent() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let metadata = Arc::new(MemoryMetadataStore::new());
    let router = router_with(blobs.clone(), metadata.clone());
    let png = create_square_png(32);

    let mut handles = Vec::new();
    for i in 0..4 {
        let router = router.clone();
        let png = png.clone();
        handles.push(tokio::spawn(async move {
            let name = format!("upload-{}.png", i);
            send(&router, upload_request(&name, "image/png", &png)).await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().status, StatusCode::OK);
    }

    assert_eq!(blobs.len().await, 12);
    let records = metadata.list(10).await.unwrap();
    assert_eq!(records.len(), 4);
    for record in &records {
        assert_eq!(record.artifacts.len(), 3);
    }
}
