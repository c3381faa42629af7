//! Bucket namespace registry.
//!
//! Tracks bucket existence and enforces global uniqueness of bucket names
//! within the service instance.  Bucket creation is idempotent: creating a
//! name that already exists returns the existing record rather than a
//! conflict.  Names are validated before any state change.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::errors::{StoreError, StoreResult};
use crate::table::now_iso8601;

/// Metadata record for a bucket.
#[derive(Debug, Clone)]
pub struct BucketRecord {
    /// Bucket name.
    pub name: String,
    /// ISO-8601 creation timestamp.
    pub created_at: String,
    /// Region the bucket is placed in.
    pub region: String,
}

// -- Bucket name validation ---------------------------------------------------

/// Validate that a bucket name conforms to S3 naming rules.
///
/// Rules:
/// - 3-63 characters long
/// - Only lowercase letters, numbers, hyphens, and periods
/// - Must begin and end with a letter or number
/// - Must not contain two adjacent periods
/// - Cannot be formatted as an IP address (e.g., 192.168.5.4)
/// - Must not start with `xn--`, `sthree-`, or `amzn-s3-demo-`
/// - Must not end with `-s3alias`, `--ol-s3`, `--x-s3`, or `--table-s3`
pub fn validate_bucket_name(name: &str) -> StoreResult<()> {
    let len = name.len();

    if !(3..=63).contains(&len) {
        return Err(StoreError::InvalidBucketName {
            name: name.to_string(),
        });
    }

    // Must only contain lowercase letters, digits, hyphens, periods.
    for ch in name.chars() {
        if !ch.is_ascii_lowercase() && !ch.is_ascii_digit() && ch != '-' && ch != '.' {
            return Err(StoreError::InvalidBucketName {
                name: name.to_string(),
            });
        }
    }

    // Must begin and end with a letter or digit.  Length is at least 3 here,
    // so first/last always exist.
    let first = name.chars().next().unwrap();
    let last = name.chars().last().unwrap();
    if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
        return Err(StoreError::InvalidBucketName {
            name: name.to_string(),
        });
    }
    if !(last.is_ascii_lowercase() || last.is_ascii_digit()) {
        return Err(StoreError::InvalidBucketName {
            name: name.to_string(),
        });
    }

    // No two adjacent periods.
    if name.contains("..") {
        return Err(StoreError::InvalidBucketName {
            name: name.to_string(),
        });
    }

    // Cannot look like an IP address.
    if looks_like_ip(name) {
        return Err(StoreError::InvalidBucketName {
            name: name.to_string(),
        });
    }

    // Reserved prefixes.
    for prefix in ["xn--", "sthree-", "amzn-s3-demo-"] {
        if name.starts_with(prefix) {
            return Err(StoreError::InvalidBucketName {
                name: name.to_string(),
            });
        }
    }

    // Reserved suffixes (access point aliases, directory and table buckets).
    for suffix in ["-s3alias", "--ol-s3", "--x-s3", "--table-s3"] {
        if name.ends_with(suffix) {
            return Err(StoreError::InvalidBucketName {
                name: name.to_string(),
            });
        }
    }

    Ok(())
}

/// Check whether a string looks like an IPv4 address (e.g., "192.168.5.4").
fn looks_like_ip(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|p| p.parse::<u8>().is_ok())
}

// -- Registry -----------------------------------------------------------------

/// In-memory bucket registry.
///
/// Owns bucket existence but not object contents.  Lookups and mutations
/// never block on I/O, so a `std::sync::RwLock` is sufficient.
pub struct NamespaceRegistry {
    region: String,
    inner: RwLock<HashMap<String, BucketRecord>>,
}

impl NamespaceRegistry {
    /// Create an empty registry placing all buckets in `region`.
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Create a bucket, or return the existing record if the name is taken.
    ///
    /// Invalid names fail with `InvalidBucketName` before any state change.
    pub fn create(&self, name: &str) -> StoreResult<BucketRecord> {
        validate_bucket_name(name)?;

        let mut inner = self.inner.write().expect("rwlock poisoned");
        if let Some(existing) = inner.get(name) {
            return Ok(existing.clone());
        }

        let record = BucketRecord {
            name: name.to_string(),
            created_at: now_iso8601(),
            region: self.region.clone(),
        };
        inner.insert(name.to_string(), record.clone());
        Ok(record)
    }

    /// Check whether a bucket exists.  Pure lookup, no side effects.
    pub fn exists(&self, name: &str) -> bool {
        let inner = self.inner.read().expect("rwlock poisoned");
        inner.contains_key(name)
    }

    /// Get a bucket record by name.
    pub fn get(&self, name: &str) -> Option<BucketRecord> {
        let inner = self.inner.read().expect("rwlock poisoned");
        inner.get(name).cloned()
    }

    /// List all buckets, sorted by name.
    pub fn list(&self) -> Vec<BucketRecord> {
        let inner = self.inner.read().expect("rwlock poisoned");
        let mut buckets: Vec<_> = inner.values().cloned().collect();
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        buckets
    }

    /// Remove a bucket record.  Returns whether it was present.
    pub fn remove(&self, name: &str) -> bool {
        let mut inner = self.inner.write().expect("rwlock poisoned");
        inner.remove(name).is_some()
    }

    /// Insert a record directly, bypassing validation.  Used when restoring
    /// from a snapshot, where names were validated at original creation.
    pub(crate) fn restore(&self, record: BucketRecord) {
        let mut inner = self.inner.write().expect("rwlock poisoned");
        inner.insert(record.name.clone(), record);
    }
}
