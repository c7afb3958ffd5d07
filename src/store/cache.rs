//! Read-through cache for stored blobs.
//!
//! Blobs never change after they are written, so entries are only ever
//! dropped by eviction.
//!
//! # Size-Based Eviction
//!
//! The cache tracks the total size of cached blob data in bytes and evicts
//! least-recently-used entries when the capacity is exceeded. A blob larger
//! than the whole capacity is never cached.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::RwLock;

use super::BlobObject;

/// Default cache capacity: 64MB
pub const DEFAULT_BLOB_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
const DEFAULT_MAX_ENTRIES: usize = 4_096;

struct Inner {
    entries: LruCache<Arc<str>, BlobObject>,
    current_size: usize,
}

/// LRU cache of blob contents with size-based capacity.
///
/// # Thread Safety
///
/// The cache is thread-safe and can be shared across async tasks via `Arc`.
pub struct BlobCache {
    inner: RwLock<Inner>,

    /// Maximum total size in bytes
    max_size: usize,
}

impl BlobCache {
    /// Create a cache with the default capacity (64MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BLOB_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `max_size` bytes of blob data.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache with explicit byte and entry limits.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: RwLock::new(Inner {
                entries: LruCache::new(max_entries),
                current_size: 0,
            }),
            max_size,
        }
    }

    /// Get a blob, marking it as recently used.
    pub async fn get(&self, id: &str) -> Option<BlobObject> {
        let mut inner = self.inner.write().await;
        inner.entries.get(id).cloned()
    }

    /// Store a blob, evicting least-recently-used entries to stay in budget.
    pub async fn put(&self, blob: BlobObject) {
        let size = blob.data.len();
        if size > self.max_size {
            return;
        }

        let mut inner = self.inner.write().await;
        let key: Arc<str> = Arc::from(blob.info.id.as_str());

        // Returns either the replaced value for this id or the entry pushed
        // out by the entry-count limit; both leave the cache
        if let Some((_, evicted)) = inner.entries.push(key, blob) {
            inner.current_size = inner.current_size.saturating_sub(evicted.data.len());
        }
        inner.current_size += size;

        while inner.current_size > self.max_size {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => {
                    inner.current_size = inner.current_size.saturating_sub(evicted.data.len());
                }
                None => break,
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    /// Total bytes of cached blob data.
    pub async fn size(&self) -> usize {
        self.inner.read().await.current_size
    }

    /// Maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for BlobCache {
    fn default() -> Self {
        Self::new()
    }
}
