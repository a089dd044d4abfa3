//! # Geonet Store
//!
//! Boundary ports the pipeline talks to, plus adapters that run in-process.
//!
//! ## Ports
//!
//! ```text
//! Repository ── NetworkStore     networks, nodes, edges (cascade delete)
//!            ├─ DatasetStore     datasets, raster/vector records, feature rows
//!            ├─ TaskResultStore  ledger rows
//!            └─ ChartStore       chart artifacts
//!
//! BlobStore                     path-addressed payloads (+ sha2 content addressing)
//! Notifier                      publish(topic, json), best effort
//! ```

mod blob;
mod error;
mod notify;
mod repository;

pub use blob::{validate_key, BlobReader, BlobStore, FsBlobStore, MemoryBlobStore};
pub use error::{Result, StoreError};
pub use notify::{BroadcastNotifier, Notifier};
pub use repository::{
    ChartStore, DatasetStore, MemoryRepository, NetworkStore, Repository, TaskResultStore,
    REPOSITORY_SCHEMA_VERSION,
};
