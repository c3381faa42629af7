//! Per-bucket object table.
//!
//! Maps keys to stored payloads plus metadata.  Entries are held in a
//! `tokio::sync::RwLock<HashMap<...>>` so reads on different keys proceed
//! concurrently while any mutation is exclusive.  ETag (MD5) and content
//! hash (SHA-256) are computed before the write lock is taken; the map
//! insert under the lock is the atomic commit point, so a concurrent
//! reader observes either the fully-prior or fully-new payload.

use bytes::Bytes;
use md5::{Digest, Md5};
use sha2::Sha256;
use std::collections::HashMap;

use crate::errors::{StoreError, StoreResult};

/// A stored payload plus its metadata.
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    /// Raw bytes of the object.  Zero-length payloads are permitted.
    pub payload: Bytes,
    /// Size in bytes.
    pub size: u64,
    /// Quoted MD5-hex ETag (e.g. `"d41d8cd98f00b204e9800998ecf8427e"`).
    pub etag: String,
    /// Hex-encoded SHA-256 content hash.
    pub content_hash: String,
    /// ISO-8601 last-modified timestamp.
    pub last_modified: String,
}

/// Object metadata without the payload, for head-style lookups.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Size in bytes.
    pub size: u64,
    /// Quoted MD5-hex ETag.
    pub etag: String,
    /// Hex-encoded SHA-256 content hash.
    pub content_hash: String,
    /// ISO-8601 last-modified timestamp.
    pub last_modified: String,
}

/// Metadata returned on a successful write.
#[derive(Debug, Clone)]
pub struct Receipt {
    /// The key that was written.
    pub key: String,
    /// Size of the stored payload in bytes.
    pub size: u64,
    /// Quoted MD5-hex ETag.
    pub etag: String,
    /// Hex-encoded SHA-256 content hash (integrity token).
    pub content_hash: String,
    /// ISO-8601 timestamp of the write.
    pub stored_at: String,
}

#[derive(Debug, Default)]
struct TableInner {
    entries: HashMap<String, ObjectEntry>,
    /// Set when the owning bucket is deleted.  Key operations that resolved
    /// this table before the deletion fail deterministically instead of
    /// mutating a detached map.
    sealed: bool,
}

/// Object table for a single bucket.
pub struct ObjectTable {
    bucket: String,
    inner: tokio::sync::RwLock<TableInner>,
}

impl ObjectTable {
    /// Create an empty table for `bucket`.
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            inner: tokio::sync::RwLock::new(TableInner::default()),
        }
    }

    /// Rebuild a table from restored entries (snapshot load).
    pub(crate) fn from_entries(bucket: &str, entries: HashMap<String, ObjectEntry>) -> Self {
        Self {
            bucket: bucket.to_string(),
            inner: tokio::sync::RwLock::new(TableInner {
                entries,
                sealed: false,
            }),
        }
    }

    /// The bucket this table belongs to.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Store `payload` under `key`, replacing any existing value.
    ///
    /// Returns the receipt and the size of the replaced entry, if any, so
    /// the engine can account capacity deltas.
    pub async fn put(&self, key: &str, payload: Bytes) -> StoreResult<(Receipt, Option<u64>)> {
        let size = payload.len() as u64;
        let etag = compute_etag(&payload);
        let content_hash = compute_content_hash(&payload);
        let stored_at = now_iso8601();

        let entry = ObjectEntry {
            payload,
            size,
            etag: etag.clone(),
            content_hash: content_hash.clone(),
            last_modified: stored_at.clone(),
        };

        let mut inner = self.inner.write().await;
        if inner.sealed {
            return Err(StoreError::NoSuchBucket {
                bucket: self.bucket.clone(),
            });
        }
        let prev_size = inner.entries.insert(key.to_string(), entry).map(|e| e.size);

        Ok((
            Receipt {
                key: key.to_string(),
                size,
                etag,
                content_hash,
                stored_at,
            },
            prev_size,
        ))
    }

    /// Return the most recently completed write for `key`.
    ///
    /// Verifies the stored content hash before returning, so a corrupted
    /// entry surfaces as an error instead of bad bytes.
    pub async fn get(&self, key: &str) -> StoreResult<ObjectEntry> {
        let inner = self.inner.read().await;
        if inner.sealed {
            return Err(StoreError::NoSuchBucket {
                bucket: self.bucket.clone(),
            });
        }
        let entry = inner
            .entries
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NoSuchKey {
                key: key.to_string(),
            })?;
        drop(inner);

        if compute_content_hash(&entry.payload) != entry.content_hash {
            return Err(StoreError::Internal(anyhow::anyhow!(
                "content checksum mismatch for {}/{}",
                self.bucket,
                key
            )));
        }

        Ok(entry)
    }

    /// Return metadata for `key` without the payload.
    pub async fn head(&self, key: &str) -> StoreResult<ObjectMeta> {
        let inner = self.inner.read().await;
        if inner.sealed {
            return Err(StoreError::NoSuchBucket {
                bucket: self.bucket.clone(),
            });
        }
        inner
            .entries
            .get(key)
            .map(|e| ObjectMeta {
                size: e.size,
                etag: e.etag.clone(),
                content_hash: e.content_hash.clone(),
                last_modified: e.last_modified.clone(),
            })
            .ok_or_else(|| StoreError::NoSuchKey {
                key: key.to_string(),
            })
    }

    /// Remove `key` if present.  Removing an absent key is a no-op.
    ///
    /// Returns the freed size when an entry was removed.
    pub async fn delete(&self, key: &str) -> StoreResult<Option<u64>> {
        let mut inner = self.inner.write().await;
        if inner.sealed {
            return Err(StoreError::NoSuchBucket {
                bucket: self.bucket.clone(),
            });
        }
        Ok(inner.entries.remove(key).map(|e| e.size))
    }

    /// Check whether `key` currently holds a payload.
    pub async fn contains(&self, key: &str) -> StoreResult<bool> {
        let inner = self.inner.read().await;
        if inner.sealed {
            return Err(StoreError::NoSuchBucket {
                bucket: self.bucket.clone(),
            });
        }
        Ok(inner.entries.contains_key(key))
    }

    /// Number of objects in the table.
    pub async fn len(&self) -> usize {
        let inner = self.inner.read().await;
        inner.entries.len()
    }

    /// Whether the table holds no objects.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Seal the table: waits for in-flight key operations to complete,
    /// drops all entries, and marks the table dead.  Returns freed bytes.
    pub(crate) async fn seal(&self) -> u64 {
        let mut inner = self.inner.write().await;
        inner.sealed = true;
        let freed: u64 = inner.entries.values().map(|e| e.size).sum();
        inner.entries.clear();
        freed
    }

    /// Snapshot export: clone all entries if the lock is free.
    ///
    /// Returns `None` when the table is write-locked, so a snapshot cycle
    /// can skip it rather than stall the store.
    pub(crate) fn try_export(&self) -> Option<Vec<(String, ObjectEntry)>> {
        let inner = self.inner.try_read().ok()?;
        if inner.sealed {
            return Some(Vec::new());
        }
        Some(
            inner
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

// -- Hash helpers -------------------------------------------------------------

/// Compute the quoted MD5-hex ETag for a byte slice.
pub(crate) fn compute_etag(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    let md5_bytes = hasher.finalize();
    format!("\"{}\"", hex::encode(md5_bytes))
}

/// Compute the hex SHA-256 content hash for a byte slice.
pub(crate) fn compute_content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let hash_bytes = hasher.finalize();
    hex::encode(hash_bytes)
}

/// Current time as an ISO-8601 string with millisecond precision.
pub(crate) fn now_iso8601() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}
