//! API integration tests for uploads, blob retrieval, and record listing.
//!
//! Tests verify:
//! - Upload success and the response shape
//! - Rejected uploads write nothing
//! - Served blobs are byte-identical and carry cache headers
//! - Listing order and the latest record
//! - HTTP response codes and error bodies

use axum::body::Body;
use axum::http::{Request, StatusCode};

use edge_layers::process::{LabelColor, TRANSPARENT};
use edge_layers::RouterConfig;

use super::test_utils::{
    create_solid_gray_png, create_square_png, create_test_jpeg, decode_layer, get, is_valid_png,
    multipart_part, multipart_request, test_router_config, upload_request, TestApp,
};

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let response = app.send(get("/health")).await;

    assert_eq!(response.status, StatusCode::OK);
    let json = response.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// Upload
// =============================================================================

#[tokio::test]
async fn test_upload_success() {
    let app = TestApp::new();
    let png = create_square_png(64);

    let response = app.send(upload_request("square.png", "image/png", &png)).await;
    assert_eq!(response.status, StatusCode::OK);

    let json = response.json();
    let obj = json.as_object().unwrap();
    assert_eq!(obj.len(), 4);
    for key in ["parent_id", "original_id", "blue_edges_id", "yellow_edges_id"] {
        assert!(obj[key].is_string(), "missing {}", key);
    }

    assert_eq!(app.blobs.len().await, 3);
    assert_eq!(app.metadata.len().await, 1);
}

#[tokio::test]
async fn test_upload_jpeg_keeps_original_content_type() {
    let app = TestApp::new();
    let jpeg = create_test_jpeg(48, 32);

    let upload = app.send(upload_request("photo.jpg", "image/jpeg", &jpeg)).await;
    assert_eq!(upload.status, StatusCode::OK);
    let original_id = upload.json()["original_id"].as_str().unwrap().to_string();

    let response = app.send(get(&format!("/image/{}", original_id))).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), "image/jpeg");
    assert_eq!(response.body.as_ref(), jpeg.as_slice());
}

#[tokio::test]
async fn test_upload_octet_stream_is_sniffed() {
    let app = TestApp::new();
    let png = create_square_png(32);

    let upload = app
        .send(upload_request("square.bin", "application/octet-stream", &png))
        .await;
    assert_eq!(upload.status, StatusCode::OK);
    let original_id = upload.json()["original_id"].as_str().unwrap().to_string();

    let response = app.send(get(&format!("/image/{}", original_id))).await;
    assert_eq!(response.header("content-type"), "image/png");
}

#[tokio::test]
async fn test_upload_missing_field() {
    let app = TestApp::new();
    let png = create_square_png(32);

    let request = multipart_request(vec![multipart_part(
        "file",
        Some("square.png"),
        Some("image/png"),
        &png,
    )]);
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let json = response.json();
    assert_eq!(json["error"], "invalid_request");
    assert_eq!(json["status"], 400);
    assert!(app.blobs.is_empty().await);
    assert!(app.metadata.is_empty().await);
}

#[tokio::test]
async fn test_upload_not_multipart() {
    let app = TestApp::new();

    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"image": "square.png"}"#))
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.header("content-type"), "application/json");
    let json = response.json();
    assert_eq!(json["error"], "invalid_multipart");
    assert_eq!(json["status"], 400);
    assert!(app.blobs.is_empty().await);
}

#[tokio::test]
async fn test_upload_multipart_without_boundary() {
    let app = TestApp::new();

    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header("content-type", "multipart/form-data")
        .body(Body::from("--x\r\n"))
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "invalid_multipart");
}

#[tokio::test]
async fn test_upload_empty_filename() {
    let app = TestApp::new();
    let png = create_square_png(32);

    let request = multipart_request(vec![multipart_part(
        "image",
        Some(""),
        Some("image/png"),
        &png,
    )]);
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(app.blobs.is_empty().await);
}

#[tokio::test]
async fn test_upload_without_filename() {
    let app = TestApp::new();
    let png = create_square_png(32);

    let request = multipart_request(vec![multipart_part("image", None, None, &png)]);
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(app.blobs.is_empty().await);
}

#[tokio::test]
async fn test_upload_empty_file() {
    let app = TestApp::new();
    let response = app.send(upload_request("empty.png", "image/png", b"")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(app.blobs.is_empty().await);
}

#[tokio::test]
async fn test_upload_undecodable() {
    let app = TestApp::new();
    let response = app
        .send(upload_request("notes.txt", "text/plain", b"this is not an image"))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "decode_error");
    assert!(app.blobs.is_empty().await);
    assert!(app.metadata.is_empty().await);
}

#[tokio::test]
async fn test_upload_skips_other_fields() {
    let app = TestApp::new();
    let png = create_square_png(32);

    let request = multipart_request(vec![
        multipart_part("caption", None, None, b"a square"),
        multipart_part("image", Some("square.png"), Some("image/png"), &png),
    ]);
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(app.blobs.len().await, 3);
}

#[tokio::test]
async fn test_upload_body_limit() {
    let app = TestApp::with_config(test_router_config().with_max_upload_bytes(1024));
    let jpeg = create_test_jpeg(256, 256);
    assert!(jpeg.len() > 1024);

    let response = app.send(upload_request("big.jpg", "image/jpeg", &jpeg)).await;

    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.blobs.is_empty().await);
}

// =============================================================================
// Layers
// =============================================================================

#[tokio::test]
async fn test_layers_contain_only_label_color() {
    let app = TestApp::new();
    let png = create_square_png(64);
    let upload = app.send(upload_request("square.png", "image/png", &png)).await;
    let json = upload.json();

    for (key, color) in [
        ("blue_edges_id", LabelColor::BLUE),
        ("yellow_edges_id", LabelColor::YELLOW),
    ] {
        let id = json[key].as_str().unwrap();
        let response = app.send(get(&format!("/image/{}", id))).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header("content-type"), "image/png");
        assert!(is_valid_png(&response.body));

        let layer = decode_layer(&response.body);
        assert_eq!(layer.dimensions(), (64, 64));

        let label = color.to_rgba();
        assert!(layer.pixels().all(|p| *p == TRANSPARENT || *p == label));
        // The square's outline must show up
        assert!(layer.pixels().any(|p| *p == label), "{} has no edges", key);
    }
}

#[tokio::test]
async fn test_solid_gray_upload_gives_transparent_layers() {
    let app = TestApp::new();
    let png = create_solid_gray_png(100, 100);
    let upload = app.send(upload_request("gray.png", "image/png", &png)).await;
    assert_eq!(upload.status, StatusCode::OK);
    let json = upload.json();

    for key in ["blue_edges_id", "yellow_edges_id"] {
        let id = json[key].as_str().unwrap();
        let response = app.send(get(&format!("/image/{}", id))).await;
        assert!(!response.body.is_empty());

        let layer = decode_layer(&response.body);
        assert_eq!(layer.dimensions(), (100, 100));
        assert!(layer.pixels().all(|p| *p == TRANSPARENT));
    }
}

// =============================================================================
// Blob Retrieval
// =============================================================================

#[tokio::test]
async fn test_get_image_is_stable() {
    let app = TestApp::new();
    let png = create_square_png(32);
    let upload = app.send(upload_request("square.png", "image/png", &png)).await;
    let id = upload.json()["original_id"].as_str().unwrap().to_string();

    let first = app.send(get(&format!("/image/{}", id))).await;
    let second = app.send(get(&format!("/image/{}", id))).await;

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body.as_ref(), png.as_slice());
    assert_eq!(first.body, second.body);
    assert_eq!(first.header("etag"), second.header("etag"));
    assert_eq!(first.header("x-blob-cache-hit"), "false");
    assert_eq!(second.header("x-blob-cache-hit"), "true");
}

#[tokio::test]
async fn test_get_image_headers() {
    let app = TestApp::with_config(test_router_config().with_cache_max_age(60));
    let png = create_square_png(32);
    let upload = app
        .send(upload_request("my photo.png", "image/png", &png))
        .await;
    let id = upload.json()["original_id"].as_str().unwrap().to_string();

    let response = app.send(get(&format!("/image/{}", id))).await;
    assert_eq!(response.header("cache-control"), "public, max-age=60");
    assert_eq!(
        response.header("content-disposition"),
        "inline; filename*=UTF-8''my%20photo.png"
    );

    let etag = response.header("etag");
    assert!(etag.starts_with('"') && etag.ends_with('"'));
    assert_eq!(etag.len(), 64 + 2);
}

#[tokio::test]
async fn test_get_image_unknown_id() {
    let app = TestApp::new();
    let response = app
        .send(get("/image/01890a5d-ac96-774b-bcce-b302099a8057"))
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    let json = response.json();
    assert_eq!(json["error"], "not_found");
    assert_eq!(json["status"], 404);
    assert!(json["message"].is_string());
}

#[tokio::test]
async fn test_get_image_invalid_id() {
    let app = TestApp::new();
    let response = app.send(get("/image/not-a-valid-id")).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["error"], "not_found");
}

// =============================================================================
// Records
// =============================================================================

#[tokio::test]
async fn test_latest_when_empty() {
    let app = TestApp::new();
    let response = app.send(get("/image/latest")).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["error"], "not_found");
}

#[tokio::test]
async fn test_images_when_empty() {
    let app = TestApp::new();
    let response = app.send(get("/images")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), serde_json::json!([]));
}

#[tokio::test]
async fn test_listing_order_and_latest() {
    let app = TestApp::new();
    let png = create_square_png(32);

    let mut parents = Vec::new();
    for name in ["first.png", "second.png", "third.png"] {
        let upload = app.send(upload_request(name, "image/png", &png)).await;
        assert_eq!(upload.status, StatusCode::OK);
        parents.push(upload.json()["parent_id"].as_str().unwrap().to_string());
    }

    let list = app.send(get("/images")).await;
    assert_eq!(list.status, StatusCode::OK);
    let records = list.json();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 3);

    let names: Vec<_> = records
        .iter()
        .map(|r| r["filename"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["third.png", "second.png", "first.png"]);
    assert_eq!(records[0]["id"], parents[2].as_str());

    let latest = app.send(get("/image/latest")).await;
    assert_eq!(latest.status, StatusCode::OK);
    assert_eq!(latest.json(), records[0]);

    // Every record links all three roles
    let artifacts = records[0]["artifacts"].as_object().unwrap();
    assert_eq!(artifacts.len(), 3);
    for role in ["original", "blue_edges", "yellow_edges"] {
        let id = artifacts[role].as_str().unwrap();
        let blob = app.send(get(&format!("/image/{}", id))).await;
        assert_eq!(blob.status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_images_limit() {
    let app = TestApp::new();
    let png = create_square_png(16);
    for name in ["a.png", "b.png", "c.png"] {
        app.send(upload_request(name, "image/png", &png)).await;
    }

    let response = app.send(get("/images?limit=2")).await;
    let records = response.json();
    assert_eq!(records.as_array().unwrap().len(), 2);
    assert_eq!(records[0]["filename"], "c.png");

    // Zero is clamped up to one
    let response = app.send(get("/images?limit=0")).await;
    assert_eq!(response.json().as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cors_preflight_allows_post() {
    let app = TestApp::with_config(RouterConfig::new().with_tracing(false));
    let request = axum::http::Request::builder()
        .method("OPTIONS")
        .uri("/upload")
        .header("origin", "https://example.com")
        .header("access-control-request-method", "POST")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("access-control-allow-origin"), "*");
    assert!(response
        .header("access-control-allow-methods")
        .contains("POST"));
}
