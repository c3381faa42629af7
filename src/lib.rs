//! bytevault library — embeddable S3-compatible object storage core.
//!
//! This crate provides the storage engine underneath an S3-compatible
//! service: the bucket namespace, per-bucket object tables, and the
//! put/get/delete lifecycle with read-after-write consistency.  Network
//! transport, request signing, and wire framing are the surrounding API
//! layer's concern; it consumes this crate through [`ServiceState`].

use std::sync::Arc;

pub mod config;
pub mod engine;
pub mod errors;
pub mod metrics;
pub mod namespace;
mod snapshot;
pub mod table;

pub use config::StoreConfig;
pub use engine::StorageEngine;
pub use errors::{StoreError, StoreResult};
pub use namespace::BucketRecord;
pub use table::{ObjectEntry, ObjectMeta, Receipt};

/// Shared service state handed to the surrounding API layer.
pub struct ServiceState {
    /// Validated service configuration.
    pub config: StoreConfig,
    /// The storage engine.
    pub engine: Arc<StorageEngine>,
}

impl ServiceState {
    /// Initialize the service: install metrics (when enabled), build the
    /// engine (restoring a snapshot if one exists), and start background
    /// persistence.
    ///
    /// Must be called from within a Tokio runtime when snapshot
    /// persistence is enabled, since the background task is spawned here.
    pub fn initialize(config: StoreConfig) -> anyhow::Result<Arc<Self>> {
        if config.observability.metrics {
            metrics::init_metrics();
            metrics::describe_metrics();
        }

        let engine = Arc::new(StorageEngine::new(&config)?);
        engine.start_background_snapshot();

        Ok(Arc::new(Self { config, engine }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_initialize_and_store() {
        let state = ServiceState::initialize(StoreConfig::default()).unwrap();

        state.engine.create_bucket("boot-bucket").await.unwrap();
        state
            .engine
            .put_object("boot-bucket", "hello.txt", Bytes::from("hi"))
            .await
            .unwrap();

        let entry = state
            .engine
            .get_object("boot-bucket", "hello.txt")
            .await
            .unwrap();
        assert_eq!(entry.payload, Bytes::from("hi"));
    }
}
