//! SQLite snapshot persistence.
//!
//! Serializes the full in-memory state (bucket records plus object
//! payloads) to a SQLite file so data can survive restarts.  Writes go to
//! a temp file followed by an atomic rename.  Reading is a pure function
//! over plain collections, safe to call from both sync and async contexts.

use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;

use crate::namespace::BucketRecord;
use crate::table::ObjectEntry;

/// All state captured by one snapshot cycle.
pub(crate) struct SnapshotState {
    /// Bucket records, in any order.
    pub buckets: Vec<BucketRecord>,
    /// Objects as (bucket, key, entry) triples.
    pub objects: Vec<(String, String, ObjectEntry)>,
}

/// Write `state` to the snapshot file at `path`.
///
/// Uses write-to-temp + rename for crash safety.
pub(crate) fn write_snapshot(path: &Path, state: &SnapshotState) -> anyhow::Result<()> {
    let tmp_path = path.with_extension("tmp");

    // Ensure parent directory exists.
    if let Some(parent) = tmp_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Remove stale temp file if present.
    let _ = std::fs::remove_file(&tmp_path);

    let conn = Connection::open(&tmp_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS bucket_snapshots (
             name       TEXT PRIMARY KEY,
             created_at TEXT NOT NULL,
             region     TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS object_snapshots (
             bucket        TEXT NOT NULL,
             key           TEXT NOT NULL,
             payload       BLOB NOT NULL,
             etag          TEXT NOT NULL,
             content_hash  TEXT NOT NULL,
             last_modified TEXT NOT NULL,
             PRIMARY KEY (bucket, key)
         );",
    )?;

    {
        let mut stmt = conn.prepare(
            "INSERT OR REPLACE INTO bucket_snapshots (name, created_at, region) VALUES (?1, ?2, ?3)",
        )?;
        for bucket in &state.buckets {
            stmt.execute(params![bucket.name, bucket.created_at, bucket.region])?;
        }
    }

    {
        let mut stmt = conn.prepare(
            "INSERT OR REPLACE INTO object_snapshots \
             (bucket, key, payload, etag, content_hash, last_modified) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for (bucket, key, entry) in &state.objects {
            stmt.execute(params![
                bucket,
                key,
                entry.payload.as_ref(),
                entry.etag,
                entry.content_hash,
                entry.last_modified,
            ])?;
        }
    }

    // Ensure everything is flushed before the rename.
    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
    drop(conn);

    std::fs::rename(&tmp_path, path)?;
    // Clean up WAL/SHM files from the temp path if they linger.
    let _ = std::fs::remove_file(tmp_path.with_extension("tmp-wal"));
    let _ = std::fs::remove_file(tmp_path.with_extension("tmp-shm"));

    tracing::debug!("Snapshot written to {:?}", path);
    Ok(())
}

/// Read a snapshot file back into plain collections.
///
/// Returns bucket records, per-bucket object maps, and the total payload
/// size in bytes.
#[allow(clippy::type_complexity)]
pub(crate) fn read_snapshot(
    path: &Path,
) -> anyhow::Result<(
    Vec<BucketRecord>,
    HashMap<String, HashMap<String, ObjectEntry>>,
    u64,
)> {
    let conn = Connection::open(path)?;
    let mut buckets: Vec<BucketRecord> = Vec::new();
    let mut objects: HashMap<String, HashMap<String, ObjectEntry>> = HashMap::new();
    let mut total_size: u64 = 0;

    {
        let mut stmt = conn.prepare("SELECT name, created_at, region FROM bucket_snapshots")?;
        let rows = stmt.query_map([], |row| {
            Ok(BucketRecord {
                name: row.get(0)?,
                created_at: row.get(1)?,
                region: row.get(2)?,
            })
        })?;
        for row in rows {
            let record = row?;
            objects.entry(record.name.clone()).or_default();
            buckets.push(record);
        }
    }

    {
        let mut stmt = conn.prepare(
            "SELECT bucket, key, payload, etag, content_hash, last_modified FROM object_snapshots",
        )?;
        let rows = stmt.query_map([], |row| {
            let bucket: String = row.get(0)?;
            let key: String = row.get(1)?;
            let payload: Vec<u8> = row.get(2)?;
            let etag: String = row.get(3)?;
            let content_hash: String = row.get(4)?;
            let last_modified: String = row.get(5)?;
            Ok((bucket, key, payload, etag, content_hash, last_modified))
        })?;
        for row in rows {
            let (bucket, key, payload, etag, content_hash, last_modified) = row?;
            let size = payload.len() as u64;
            total_size += size;
            objects.entry(bucket).or_default().insert(
                key,
                ObjectEntry {
                    payload: bytes::Bytes::from(payload),
                    size,
                    etag,
                    content_hash,
                    last_modified,
                },
            );
        }
    }

    tracing::info!(
        "Read snapshot from {:?} ({} buckets, {} bytes)",
        path,
        buckets.len(),
        total_size,
    );

    Ok((buckets, objects, total_size))
}
