//! Storage engine.
//!
//! Orchestrates the namespace registry and per-bucket object tables and
//! enforces the cross-cutting rules: every operation resolves its bucket
//! first, reads observe the most recent completed write for their key, and
//! bucket lifecycle operations serialize against in-flight key operations
//! in that bucket.  Buckets are guarded individually, so operations on
//! different buckets never block each other.
//!
//! Optional snapshot persistence periodically serializes the full state to
//! a SQLite file and restores it at startup.

use bytes::Bytes;
use metrics::gauge;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::StoreConfig;
use crate::errors::{StoreError, StoreResult};
use crate::metrics::{record_operation, BUCKETS_TOTAL, BYTES_STORED, OBJECTS_TOTAL};
use crate::namespace::{BucketRecord, NamespaceRegistry};
use crate::snapshot::{self, SnapshotState};
use crate::table::{ObjectEntry, ObjectMeta, ObjectTable, Receipt};

/// The storage core: bucket namespace plus per-bucket object tables.
///
/// All state lives in process memory.  The engine exclusively owns table
/// contents; callers interact only through the operation methods below.
pub struct StorageEngine {
    registry: NamespaceRegistry,
    /// One table per bucket.  The map lock serializes bucket lifecycle
    /// against table resolution; each table's own lock serializes key
    /// operations within the bucket.
    tables: tokio::sync::RwLock<HashMap<String, Arc<ObjectTable>>>,
    /// Current total payload bytes across all buckets.
    current_size: tokio::sync::RwLock<u64>,
    /// Maximum bytes for a single object.
    max_object_size: u64,
    /// Maximum total bytes.  0 means unlimited.
    max_total_bytes: u64,
    /// Whether snapshot persistence is enabled.
    snapshot_enabled: bool,
    /// Path to the snapshot SQLite file.
    snapshot_path: PathBuf,
    /// Interval (in seconds) between background snapshots.
    snapshot_interval_seconds: u64,
    /// Flag used to signal the background snapshot task to stop.
    shutdown: Arc<AtomicBool>,
}

impl StorageEngine {
    /// Create an engine from configuration.
    ///
    /// When snapshot persistence is enabled and a snapshot file exists, the
    /// previous state is restored before the engine serves operations.  The
    /// restore reads into plain collections first and only then moves them
    /// into the locks, so this is safe to call from any context.
    pub fn new(config: &StoreConfig) -> anyhow::Result<Self> {
        let snapshot_enabled = config.snapshot.mode == "snapshot";
        let snapshot_path = PathBuf::from(&config.snapshot.path);

        let (bucket_records, mut object_maps, total_size) =
            if snapshot_enabled && snapshot_path.exists() {
                snapshot::read_snapshot(&snapshot_path)?
            } else {
                (Vec::new(), HashMap::new(), 0u64)
            };

        let registry = NamespaceRegistry::new(&config.service.region);
        let mut tables: HashMap<String, Arc<ObjectTable>> = HashMap::new();
        for record in bucket_records {
            let entries = object_maps.remove(&record.name).unwrap_or_default();
            tables.insert(
                record.name.clone(),
                Arc::new(ObjectTable::from_entries(&record.name, entries)),
            );
            registry.restore(record);
        }

        if total_size > 0 {
            tracing::info!(
                "Restored {} buckets ({} bytes) from snapshot",
                tables.len(),
                total_size
            );
        }

        Ok(Self {
            registry,
            tables: tokio::sync::RwLock::new(tables),
            current_size: tokio::sync::RwLock::new(total_size),
            max_object_size: config.limits.max_object_size,
            max_total_bytes: config.limits.max_total_bytes,
            snapshot_enabled,
            snapshot_path,
            snapshot_interval_seconds: config.snapshot.interval_seconds,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    // -- Bucket operations ----------------------------------------------------

    /// Create a bucket.  Idempotent: creating an existing bucket succeeds
    /// and returns the original record.
    pub async fn create_bucket(&self, name: &str) -> StoreResult<BucketRecord> {
        let started = Instant::now();
        let result = self.create_bucket_inner(name).await;
        record_operation("create_bucket", status_of(&result), started);
        result
    }

    async fn create_bucket_inner(&self, name: &str) -> StoreResult<BucketRecord> {
        let mut tables = self.tables.write().await;
        let record = self.registry.create(name)?;
        tables
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ObjectTable::new(name)));
        gauge!(BUCKETS_TOTAL).set(tables.len() as f64);
        drop(tables);

        tracing::debug!(bucket = %name, "bucket ensured");
        Ok(record)
    }

    /// Delete a bucket and everything in it.
    ///
    /// Waits for in-flight key operations in the bucket to complete; any
    /// operation that raced past bucket resolution fails with
    /// `NoSuchBucket` afterwards rather than mutating a detached table.
    pub async fn delete_bucket(&self, name: &str) -> StoreResult<()> {
        let started = Instant::now();
        let result = self.delete_bucket_inner(name).await;
        record_operation("delete_bucket", status_of(&result), started);
        result
    }

    async fn delete_bucket_inner(&self, name: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let table = tables
            .remove(name)
            .ok_or_else(|| StoreError::NoSuchBucket {
                bucket: name.to_string(),
            })?;
        self.registry.remove(name);
        gauge!(BUCKETS_TOTAL).set(tables.len() as f64);
        drop(tables);

        let count = table.len().await;
        let freed = table.seal().await;
        if freed > 0 {
            self.adjust_size(-(freed as i64)).await;
        }
        gauge!(OBJECTS_TOTAL).decrement(count as f64);

        tracing::debug!(bucket = %name, freed, "bucket deleted");
        Ok(())
    }

    /// Check whether a bucket exists.  Pure lookup.
    pub fn bucket_exists(&self, name: &str) -> bool {
        self.registry.exists(name)
    }

    /// List all buckets, sorted by name.
    pub fn list_buckets(&self) -> Vec<BucketRecord> {
        self.registry.list()
    }

    // -- Object operations ----------------------------------------------------

    /// Store `payload` under `(bucket, key)`, replacing any existing value.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        payload: Bytes,
    ) -> StoreResult<Receipt> {
        let started = Instant::now();
        let result = self.put_object_inner(bucket, key, payload).await;
        record_operation("put_object", status_of(&result), started);
        result
    }

    async fn put_object_inner(
        &self,
        bucket: &str,
        key: &str,
        payload: Bytes,
    ) -> StoreResult<Receipt> {
        let table = self.resolve(bucket).await?;

        let new_len = payload.len() as u64;
        if new_len > self.max_object_size {
            return Err(StoreError::EntityTooLarge);
        }

        // Account for the size difference when overwriting, so a same-size
        // replace always fits.
        let prior = match table.head(key).await {
            Ok(meta) => Some(meta.size),
            Err(StoreError::NoSuchKey { .. }) => None,
            Err(e) => return Err(e),
        };
        let delta = new_len as i64 - prior.unwrap_or(0) as i64;
        if delta > 0 {
            self.check_capacity(delta as u64).await?;
        }

        let (receipt, replaced) = table.put(key, payload).await?;

        let actual_delta = new_len as i64 - replaced.unwrap_or(0) as i64;
        self.adjust_size(actual_delta).await;
        if replaced.is_none() {
            gauge!(OBJECTS_TOTAL).increment(1.0);
        }

        tracing::debug!(bucket = %bucket, key = %key, size = new_len, "object stored");
        Ok(receipt)
    }

    /// Return the payload and metadata most recently stored under
    /// `(bucket, key)`.
    pub async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectEntry> {
        let started = Instant::now();
        let result = self.get_object_inner(bucket, key).await;
        record_operation("get_object", status_of(&result), started);
        result
    }

    async fn get_object_inner(&self, bucket: &str, key: &str) -> StoreResult<ObjectEntry> {
        let table = self.resolve(bucket).await?;
        let entry = table.get(key).await?;
        tracing::debug!(bucket = %bucket, key = %key, size = entry.size, "object read");
        Ok(entry)
    }

    /// Return metadata for `(bucket, key)` without the payload.
    pub async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectMeta> {
        let started = Instant::now();
        let result = async {
            let table = self.resolve(bucket).await?;
            table.head(key).await
        }
        .await;
        record_operation("head_object", status_of(&result), started);
        result
    }

    /// Remove `(bucket, key)` if present.  Deleting an absent key in an
    /// existing bucket is a no-op.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let started = Instant::now();
        let result = self.delete_object_inner(bucket, key).await;
        record_operation("delete_object", status_of(&result), started);
        result
    }

    async fn delete_object_inner(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let table = self.resolve(bucket).await?;
        if let Some(freed) = table.delete(key).await? {
            self.adjust_size(-(freed as i64)).await;
            gauge!(OBJECTS_TOTAL).decrement(1.0);
        }
        tracing::debug!(bucket = %bucket, key = %key, "object deleted");
        Ok(())
    }

    /// Check whether `(bucket, key)` currently holds a payload.
    pub async fn object_exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        let table = self.resolve(bucket).await?;
        table.contains(key).await
    }

    /// Number of objects in a bucket.
    pub async fn object_count(&self, bucket: &str) -> StoreResult<usize> {
        let table = self.resolve(bucket).await?;
        Ok(table.len().await)
    }

    /// Total payload bytes currently stored.
    pub async fn usage_bytes(&self) -> u64 {
        *self.current_size.read().await
    }

    // -- Internals ------------------------------------------------------------

    /// Resolve a bucket to its table, or fail with `NoSuchBucket`.
    async fn resolve(&self, bucket: &str) -> StoreResult<Arc<ObjectTable>> {
        let tables = self.tables.read().await;
        tables
            .get(bucket)
            .cloned()
            .ok_or_else(|| StoreError::NoSuchBucket {
                bucket: bucket.to_string(),
            })
    }

    /// Check whether adding `additional` bytes would exceed the capacity
    /// limit.  If the limit is 0 (unlimited), always returns Ok.
    async fn check_capacity(&self, additional: u64) -> StoreResult<()> {
        if self.max_total_bytes == 0 {
            return Ok(());
        }
        let current = *self.current_size.read().await;
        if current + additional > self.max_total_bytes {
            return Err(StoreError::CapacityExceeded);
        }
        Ok(())
    }

    /// Adjust the tracked size by a signed delta.
    async fn adjust_size(&self, delta: i64) {
        let mut size = self.current_size.write().await;
        if delta >= 0 {
            *size = size.saturating_add(delta as u64);
            gauge!(BYTES_STORED).increment(delta as f64);
        } else {
            *size = size.saturating_sub((-delta) as u64);
            gauge!(BYTES_STORED).decrement((-delta) as f64);
        }
    }

    // -- Snapshot persistence -------------------------------------------------

    /// Write the current state to the snapshot file.
    ///
    /// Uses try-read locks throughout; if any lock is contended this cycle
    /// is skipped and the next interval retries.
    pub fn snapshot(&self) -> anyhow::Result<()> {
        let tables = match self.tables.try_read() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("Snapshot skipped: could not acquire bucket map lock");
                return Ok(());
            }
        };

        let mut objects: Vec<(String, String, ObjectEntry)> = Vec::new();
        for (bucket, table) in tables.iter() {
            match table.try_export() {
                Some(entries) => {
                    for (key, entry) in entries {
                        objects.push((bucket.clone(), key, entry));
                    }
                }
                None => {
                    tracing::warn!("Snapshot skipped: could not acquire table lock for {bucket}");
                    return Ok(());
                }
            }
        }
        drop(tables);

        let state = SnapshotState {
            buckets: self.registry.list(),
            objects,
        };
        snapshot::write_snapshot(&self.snapshot_path, &state)
    }

    /// Start a background tokio task that periodically writes snapshots.
    ///
    /// The task runs until [`close`](Self::close) sets the shutdown flag.
    pub fn start_background_snapshot(self: &Arc<Self>) {
        if !self.snapshot_enabled || self.snapshot_interval_seconds == 0 {
            return;
        }

        let engine = Arc::clone(self);
        let interval_secs = self.snapshot_interval_seconds;

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            // The first tick completes immediately; skip it.
            interval.tick().await;

            loop {
                interval.tick().await;
                if engine.shutdown.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(e) = engine.snapshot() {
                    tracing::error!("Background snapshot failed: {e}");
                }
            }
        });
    }

    /// Perform a final snapshot (if persistence is enabled) and signal the
    /// background task to stop.
    pub async fn close(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if self.snapshot_enabled {
            if let Err(e) = self.snapshot() {
                tracing::error!("Final snapshot on close failed: {e}");
            }
        }
    }
}

/// Metric status label for an operation result.
fn status_of<T>(result: &StoreResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SnapshotConfig, StoreConfig};

    fn test_engine() -> StorageEngine {
        StorageEngine::new(&StoreConfig::default()).expect("failed to create engine")
    }

    fn test_engine_with_limits(max_object_size: u64, max_total_bytes: u64) -> StorageEngine {
        let mut config = StoreConfig::default();
        config.limits.max_object_size = max_object_size;
        config.limits.max_total_bytes = max_total_bytes;
        StorageEngine::new(&config).expect("failed to create engine")
    }

    fn snapshot_engine(path: &std::path::Path) -> StorageEngine {
        let mut config = StoreConfig::default();
        config.snapshot = SnapshotConfig {
            mode: "snapshot".to_string(),
            path: path.to_str().unwrap().to_string(),
            interval_seconds: 0,
        };
        StorageEngine::new(&config).expect("failed to create engine")
    }

    #[tokio::test]
    async fn test_create_bucket_is_idempotent() {
        let engine = test_engine();

        let first = engine.create_bucket("my-bucket").await.unwrap();
        let second = engine.create_bucket("my-bucket").await.unwrap();

        assert_eq!(first.name, second.name);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(engine.list_buckets().len(), 1);
    }

    #[tokio::test]
    async fn test_create_bucket_invalid_name() {
        let engine = test_engine();
        let result = engine.create_bucket("Not Valid!").await;
        assert!(matches!(
            result,
            Err(StoreError::InvalidBucketName { .. })
        ));
        assert!(!engine.bucket_exists("Not Valid!"));
    }

    #[tokio::test]
    async fn test_recreate_preserves_contents() {
        let engine = test_engine();
        engine.create_bucket("keep").await.unwrap();
        engine
            .put_object("keep", "data.txt", Bytes::from("payload"))
            .await
            .unwrap();

        // Creating the same bucket again must not wipe it.
        engine.create_bucket("keep").await.unwrap();
        let entry = engine.get_object("keep", "data.txt").await.unwrap();
        assert_eq!(entry.payload, Bytes::from("payload"));
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let engine = test_engine();
        engine.create_bucket("round-trip").await.unwrap();

        let data = Bytes::from("some bytes here");
        let receipt = engine
            .put_object("round-trip", "obj.bin", data.clone())
            .await
            .unwrap();
        assert_eq!(receipt.size, data.len() as u64);

        let entry = engine.get_object("round-trip", "obj.bin").await.unwrap();
        assert_eq!(entry.payload, data);
        assert_eq!(entry.etag, receipt.etag);
    }

    #[tokio::test]
    async fn test_empty_payload_roundtrip() {
        let engine = test_engine();
        engine.create_bucket("empties").await.unwrap();

        engine
            .put_object("empties", "zero.bin", Bytes::new())
            .await
            .unwrap();

        let entry = engine.get_object("empties", "zero.bin").await.unwrap();
        assert_eq!(entry.payload.len(), 0);
        assert_eq!(entry.size, 0);
    }

    #[tokio::test]
    async fn test_overwrite_is_visible() {
        let engine = test_engine();
        engine.create_bucket("versions").await.unwrap();

        engine
            .put_object("versions", "doc.txt", Bytes::from("first"))
            .await
            .unwrap();
        engine
            .put_object("versions", "doc.txt", Bytes::from("second"))
            .await
            .unwrap();

        let entry = engine.get_object("versions", "doc.txt").await.unwrap();
        assert_eq!(entry.payload, Bytes::from("second"));
    }

    #[tokio::test]
    async fn test_get_after_delete_fails() {
        let engine = test_engine();
        engine.create_bucket("cleanup").await.unwrap();

        engine
            .put_object("cleanup", "gone.txt", Bytes::from("bye"))
            .await
            .unwrap();
        engine.delete_object("cleanup", "gone.txt").await.unwrap();

        let result = engine.get_object("cleanup", "gone.txt").await;
        assert!(matches!(result, Err(StoreError::NoSuchKey { .. })));
    }

    #[tokio::test]
    async fn test_delete_absent_key_is_noop() {
        let engine = test_engine();
        engine.create_bucket("quiet").await.unwrap();
        engine.delete_object("quiet", "never-written").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_bucket_is_no_such_bucket() {
        let engine = test_engine();

        // Never NoSuchKey for a missing bucket, regardless of operation.
        assert!(matches!(
            engine.get_object("ghost", "k").await,
            Err(StoreError::NoSuchBucket { .. })
        ));
        assert!(matches!(
            engine.put_object("ghost", "k", Bytes::from("v")).await,
            Err(StoreError::NoSuchBucket { .. })
        ));
        assert!(matches!(
            engine.delete_object("ghost", "k").await,
            Err(StoreError::NoSuchBucket { .. })
        ));
        assert!(matches!(
            engine.head_object("ghost", "k").await,
            Err(StoreError::NoSuchBucket { .. })
        ));
    }

    #[tokio::test]
    async fn test_object_storage_scenario() {
        let engine = test_engine();
        let body = Bytes::from_static(b"hello world!");

        engine.create_bucket("test-object-storage").await.unwrap();
        engine
            .put_object("test-object-storage", "test.txt", body.clone())
            .await
            .unwrap();

        let entry = engine
            .get_object("test-object-storage", "test.txt")
            .await
            .unwrap();
        assert_eq!(entry.payload, body);
    }

    #[tokio::test]
    async fn test_delete_object_scenario() {
        let engine = test_engine();

        engine.create_bucket("test-delete-object").await.unwrap();
        engine
            .put_object(
                "test-delete-object",
                "test.txt",
                Bytes::from_static(b"hello world!"),
            )
            .await
            .unwrap();
        engine
            .delete_object("test-delete-object", "test.txt")
            .await
            .unwrap();

        let result = engine.get_object("test-delete-object", "test.txt").await;
        assert!(matches!(result, Err(StoreError::NoSuchKey { .. })));
    }

    #[tokio::test]
    async fn test_head_object() {
        let engine = test_engine();
        engine.create_bucket("headers").await.unwrap();
        engine
            .put_object("headers", "meta.txt", Bytes::from("abcdef"))
            .await
            .unwrap();

        let meta = engine.head_object("headers", "meta.txt").await.unwrap();
        assert_eq!(meta.size, 6);
        assert!(meta.etag.starts_with('"'));
    }

    #[tokio::test]
    async fn test_entity_too_large() {
        let engine = test_engine_with_limits(8, 0);
        engine.create_bucket("small").await.unwrap();

        engine
            .put_object("small", "fits.bin", Bytes::from("12345678"))
            .await
            .unwrap();

        let result = engine
            .put_object("small", "big.bin", Bytes::from("123456789"))
            .await;
        assert!(matches!(result, Err(StoreError::EntityTooLarge)));
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let engine = test_engine_with_limits(1024, 10);
        engine.create_bucket("capped").await.unwrap();

        engine
            .put_object("capped", "a.txt", Bytes::from("hello"))
            .await
            .unwrap();

        // 5 + 6 = 11 > 10.
        let result = engine
            .put_object("capped", "b.txt", Bytes::from("world!"))
            .await;
        assert!(matches!(result, Err(StoreError::CapacityExceeded)));
    }

    #[tokio::test]
    async fn test_capacity_overwrite_same_size() {
        let engine = test_engine_with_limits(1024, 10);
        engine.create_bucket("capped").await.unwrap();

        engine
            .put_object("capped", "a.txt", Bytes::from("hello"))
            .await
            .unwrap();

        // Overwriting with same-size data must succeed (delta = 0).
        engine
            .put_object("capped", "a.txt", Bytes::from("world"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_capacity_delete_frees_space() {
        let engine = test_engine_with_limits(1024, 10);
        engine.create_bucket("capped").await.unwrap();

        engine
            .put_object("capped", "a.txt", Bytes::from("hello"))
            .await
            .unwrap();
        engine.delete_object("capped", "a.txt").await.unwrap();

        engine
            .put_object("capped", "b.txt", Bytes::from("world!!!!"))
            .await
            .unwrap();
        assert_eq!(engine.usage_bytes().await, 9);
    }

    #[tokio::test]
    async fn test_delete_bucket() {
        let engine = test_engine();
        engine.create_bucket("doomed").await.unwrap();
        engine
            .put_object("doomed", "obj.txt", Bytes::from("data"))
            .await
            .unwrap();

        engine.delete_bucket("doomed").await.unwrap();

        assert!(!engine.bucket_exists("doomed"));
        assert!(matches!(
            engine.get_object("doomed", "obj.txt").await,
            Err(StoreError::NoSuchBucket { .. })
        ));
        assert_eq!(engine.usage_bytes().await, 0);
    }

    #[tokio::test]
    async fn test_delete_missing_bucket() {
        let engine = test_engine();
        let result = engine.delete_bucket("never-created").await;
        assert!(matches!(result, Err(StoreError::NoSuchBucket { .. })));
    }

    #[tokio::test]
    async fn test_recreated_bucket_starts_empty() {
        let engine = test_engine();
        engine.create_bucket("phoenix").await.unwrap();
        engine
            .put_object("phoenix", "old.txt", Bytes::from("ashes"))
            .await
            .unwrap();

        engine.delete_bucket("phoenix").await.unwrap();
        engine.create_bucket("phoenix").await.unwrap();

        assert_eq!(engine.object_count("phoenix").await.unwrap(), 0);
        assert!(matches!(
            engine.get_object("phoenix", "old.txt").await,
            Err(StoreError::NoSuchKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrently_deleted_bucket_fails_deterministically() {
        let engine = test_engine();
        engine.create_bucket("racy").await.unwrap();

        // Simulate an operation that resolved the table before the bucket
        // was deleted: the sealed flag must reject it.
        let table = engine.resolve("racy").await.unwrap();
        engine.delete_bucket("racy").await.unwrap();

        let result = table.put("late.txt", Bytes::from("too late")).await;
        assert!(matches!(result, Err(StoreError::NoSuchBucket { .. })));
    }

    #[tokio::test]
    async fn test_cross_bucket_concurrency() {
        let engine = Arc::new(test_engine());
        for i in 0..4 {
            engine.create_bucket(&format!("bucket-{i}")).await.unwrap();
        }

        let mut handles = Vec::new();
        for i in 0..4 {
            for j in 0..8 {
                let engine = Arc::clone(&engine);
                handles.push(tokio::spawn(async move {
                    let bucket = format!("bucket-{i}");
                    let key = format!("key-{j}");
                    let payload = Bytes::from(format!("payload-{i}-{j}"));
                    engine.put_object(&bucket, &key, payload).await.unwrap();
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..4 {
            let bucket = format!("bucket-{i}");
            assert_eq!(engine.object_count(&bucket).await.unwrap(), 8);
            for j in 0..8 {
                let entry = engine
                    .get_object(&bucket, &format!("key-{j}"))
                    .await
                    .unwrap();
                assert_eq!(entry.payload, Bytes::from(format!("payload-{i}-{j}")));
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_writes_same_key_last_writer_wins() {
        let engine = Arc::new(test_engine());
        engine.create_bucket("contended").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine
                    .put_object("contended", "hot.txt", Bytes::from(format!("writer-{i}")))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // One complete payload survives; never an interleaved one.
        let entry = engine.get_object("contended", "hot.txt").await.unwrap();
        let text = String::from_utf8(entry.payload.to_vec()).unwrap();
        assert!(text.starts_with("writer-"));
        assert_eq!(engine.object_count("contended").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_usage_accounting() {
        let engine = test_engine();
        engine.create_bucket("ledger").await.unwrap();

        engine
            .put_object("ledger", "a.txt", Bytes::from("12345"))
            .await
            .unwrap();
        assert_eq!(engine.usage_bytes().await, 5);

        engine
            .put_object("ledger", "a.txt", Bytes::from("123"))
            .await
            .unwrap();
        assert_eq!(engine.usage_bytes().await, 3);

        engine.delete_object("ledger", "a.txt").await.unwrap();
        assert_eq!(engine.usage_bytes().await, 0);
    }

    // -- Snapshot tests -------------------------------------------------------

    #[tokio::test]
    async fn test_snapshot_and_restore() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let snap_path = dir.path().join("state.snap");

        {
            let engine = snapshot_engine(&snap_path);
            engine.create_bucket("persisted").await.unwrap();
            engine
                .put_object("persisted", "key1.txt", Bytes::from("data one"))
                .await
                .unwrap();
            engine
                .put_object("persisted", "key2.txt", Bytes::from("data two"))
                .await
                .unwrap();
            engine.snapshot().unwrap();
        }

        {
            let engine = snapshot_engine(&snap_path);
            assert!(engine.bucket_exists("persisted"));

            let one = engine.get_object("persisted", "key1.txt").await.unwrap();
            assert_eq!(one.payload, Bytes::from("data one"));

            let two = engine.get_object("persisted", "key2.txt").await.unwrap();
            assert_eq!(two.payload, Bytes::from("data two"));

            assert_eq!(engine.usage_bytes().await, 16);
        }
    }

    #[tokio::test]
    async fn test_close_writes_final_snapshot() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let snap_path = dir.path().join("close.snap");

        let engine = snapshot_engine(&snap_path);
        engine.create_bucket("closing").await.unwrap();
        engine
            .put_object("closing", "key.txt", Bytes::from("close data"))
            .await
            .unwrap();

        engine.close().await;
        assert!(snap_path.exists());

        let restored = snapshot_engine(&snap_path);
        let entry = restored.get_object("closing", "key.txt").await.unwrap();
        assert_eq!(entry.payload, Bytes::from("close data"));
    }

    #[tokio::test]
    async fn test_no_snapshot_when_persistence_none() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let snap_path = dir.path().join("should-not-exist.snap");

        let mut config = StoreConfig::default();
        config.snapshot.path = snap_path.to_str().unwrap().to_string();
        let engine = StorageEngine::new(&config).unwrap();

        engine.create_bucket("transient").await.unwrap();
        engine.close().await;

        assert!(!snap_path.exists());
    }
}
