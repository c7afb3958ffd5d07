//! S3-backed blob and metadata stores.
//!
//! Object layout inside the bucket:
//!
//! ```text
//! {prefix}blobs/{id}            raw image bytes
//!                               Content-Type = MIME type
//!                               x-amz-meta-filename = percent-encoded filename
//!                               x-amz-meta-sha256   = hex checksum
//! {prefix}records/{id}.json     serialized MetadataRecord
//! ```
//!
//! Works with AWS S3 and S3-compatible services such as MinIO.

use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::{ByteStream, DateTime as S3DateTime};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::StoreError;

use super::{
    new_id, parse_id, sha256_hex, BlobInfo, BlobObject, BlobStore, MetadataRecord,
    MetadataStore, NewBlob, NewMetadataRecord,
};

const BLOB_DIR: &str = "blobs/";
const RECORD_DIR: &str = "records/";
const RECORD_SUFFIX: &str = ".json";

const META_FILENAME: &str = "filename";
const META_SHA256: &str = "sha256";

/// Maximum keys requested per list call.
const LIST_PAGE_SIZE: i32 = 1000;

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
///
/// For AWS S3, pass `None` to use the default endpoint:
/// ```ignore
/// let client = create_s3_client(None, "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // For S3-compatible services, we often need to use path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}

/// Normalize a key prefix so it is empty or ends with `/`.
fn normalize_prefix(prefix: Option<&str>) -> String {
    match prefix.map(|p| p.trim_matches('/')) {
        Some(p) if !p.is_empty() => format!("{}/", p),
        _ => String::new(),
    }
}

/// Map an SDK failure onto a store error.
fn sdk_error<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            StoreError::Connection(err.to_string())
        }
        other => StoreError::S3(other.to_string()),
    }
}

fn to_chrono(dt: &S3DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

/// List every key under `prefix`, following continuation tokens.
async fn list_keys(
    client: &Client,
    bucket: &str,
    prefix: &str,
) -> Result<Vec<String>, StoreError> {
    let mut keys = Vec::new();
    let mut continuation_token: Option<String> = None;

    loop {
        let mut request = client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .max_keys(LIST_PAGE_SIZE);

        if let Some(token) = continuation_token {
            request = request.continuation_token(token);
        }

        let result = request.send().await.map_err(sdk_error)?;

        for obj in result.contents() {
            if let Some(key) = obj.key() {
                keys.push(key.to_string());
            }
        }

        if result.is_truncated() == Some(true) {
            continuation_token = result.next_continuation_token().map(|s| s.to_string());
        } else {
            break;
        }
    }

    Ok(keys)
}

// =============================================================================
// Blob Store
// =============================================================================

/// S3-backed implementation of [`BlobStore`].
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3BlobStore {
    /// Create a blob store writing under `{prefix}blobs/` in `bucket`.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: Option<&str>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: normalize_prefix(prefix),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn key(&self, id: &str) -> String {
        format!("{}{}{}", self.prefix, BLOB_DIR, id)
    }

    async fn head(&self, id: &str) -> Result<BlobInfo, StoreError> {
        let key = self.key(id);
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) {
                    StoreError::NotFound(id.to_string())
                } else {
                    sdk_error(e)
                }
            })?;

        let metadata = head.metadata();
        Ok(BlobInfo {
            id: id.to_string(),
            filename: decode_filename(metadata.and_then(|m| m.get(META_FILENAME))),
            content_type: head.content_type().map(str::to_string),
            length: head.content_length().unwrap_or(0).max(0) as u64,
            sha256: metadata.and_then(|m| m.get(META_SHA256)).cloned(),
            uploaded_at: head
                .last_modified()
                .and_then(to_chrono)
                .unwrap_or_else(Utc::now),
        })
    }
}

fn decode_filename(raw: Option<&String>) -> String {
    raw.map(|f| {
        urlencoding::decode(f)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| f.clone())
    })
    .unwrap_or_default()
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, blob: NewBlob) -> Result<BlobInfo, StoreError> {
        let id = new_id();
        let checksum = sha256_hex(&blob.data);
        let length = blob.data.len() as u64;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.key(&id))
            .content_type(&blob.content_type)
            .metadata(META_FILENAME, urlencoding::encode(&blob.filename))
            .metadata(META_SHA256, &checksum)
            .body(ByteStream::from(blob.data))
            .send()
            .await
            .map_err(sdk_error)?;

        debug!(blob_id = %id, bytes = length, "Stored blob in S3");

        Ok(BlobInfo {
            id,
            filename: blob.filename,
            content_type: Some(blob.content_type),
            length,
            sha256: Some(checksum),
            uploaded_at: Utc::now(),
        })
    }

    async fn get(&self, id: &str) -> Result<BlobObject, StoreError> {
        parse_id(id)?;

        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key(id))
            .send()
            .await
            .map_err(|e| {
                let is_not_found = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false)
                    || e.raw_response()
                        .map(|r| r.status().as_u16() == 404)
                        .unwrap_or(false);

                if is_not_found {
                    StoreError::NotFound(id.to_string())
                } else {
                    sdk_error(e)
                }
            })?;

        let metadata = resp.metadata();
        let filename = decode_filename(metadata.and_then(|m| m.get(META_FILENAME)));
        let sha256 = metadata.and_then(|m| m.get(META_SHA256)).cloned();
        let content_type = resp.content_type().map(str::to_string);
        let uploaded_at = resp
            .last_modified()
            .and_then(to_chrono)
            .unwrap_or_else(Utc::now);

        let data: Bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .into_bytes();

        Ok(BlobObject {
            info: BlobInfo {
                id: id.to_string(),
                filename,
                content_type,
                length: data.len() as u64,
                sha256,
                uploaded_at,
            },
            data,
        })
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.key(id))
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<BlobInfo>, StoreError> {
        let dir = format!("{}{}", self.prefix, BLOB_DIR);
        let mut ids: Vec<String> = list_keys(&self.client, &self.bucket, &dir)
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&dir).map(str::to_string))
            .filter(|id| parse_id(id).is_ok())
            .collect();

        ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut blobs = Vec::with_capacity(ids.len());
        for id in ids {
            match self.head(&id).await {
                Ok(info) => blobs.push(info),
                // Deleted between list and head
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(blobs)
    }
}

// =============================================================================
// Metadata Store
// =============================================================================

/// S3-backed implementation of [`MetadataStore`], one JSON object per record.
#[derive(Clone)]
pub struct S3MetadataStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3MetadataStore {
    /// Create a metadata store writing under `{prefix}records/` in `bucket`.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: Option<&str>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: normalize_prefix(prefix),
        }
    }

    fn dir(&self) -> String {
        format!("{}{}", self.prefix, RECORD_DIR)
    }

    fn key(&self, id: &str) -> String {
        format!("{}{}{}", self.dir(), id, RECORD_SUFFIX)
    }

    async fn fetch(&self, id: &str) -> Result<MetadataRecord, StoreError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key(id))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false) {
                    StoreError::NotFound(id.to_string())
                } else {
                    sdk_error(e)
                }
            })?;

        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .into_bytes();

        serde_json::from_slice(&body).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl MetadataStore for S3MetadataStore {
    async fn insert(&self, record: NewMetadataRecord) -> Result<MetadataRecord, StoreError> {
        let record = MetadataRecord {
            id: new_id(),
            filename: record.filename,
            created_at: Utc::now(),
            artifacts: record.artifacts,
        };

        let body =
            serde_json::to_vec(&record).map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.key(&record.id))
            .content_type("application/json")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(sdk_error)?;

        debug!(record_id = %record.id, "Stored metadata record in S3");
        Ok(record)
    }

    async fn list(&self, limit: usize) -> Result<Vec<MetadataRecord>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let dir = self.dir();
        let mut ids: Vec<String> = list_keys(&self.client, &self.bucket, &dir)
            .await?
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(&dir)
                    .and_then(|rest| rest.strip_suffix(RECORD_SUFFIX))
                    .map(str::to_string)
            })
            .collect();

        // UUIDv7 identifiers sort by creation time
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.truncate(limit);

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            records.push(self.fetch(&id).await?);
        }
        Ok(records)
    }
}
