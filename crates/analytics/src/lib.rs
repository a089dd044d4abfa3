//! # Geonet Analytics
//!
//! Registry of analysis types and the tasks they run against stored networks and datasets.
//!
//! ## Architecture
//!
//! ```text
//! Analytics::run(db_value, project, inputs)
//!     │
//!     ├──> Registry::get ── unknown / disabled / non-object inputs rejected here
//!     │
//!     ├──> AnalysisType::run_task
//!     │      ├─ Ledger::create (record visible at once, "Initializing task...")
//!     │      └─ TaskQueue::schedule_guarded(execute)
//!     │
//!     └──> execute (worker)
//!            ├─ flood_simulation ──> flood Dataset (tiled raster)
//!            ├─ flood_network_failure ──> failures {frame: [node ids]}
//!            ├─ network_recovery ──> recoveries + GCC Chart + resiliency score
//!            └─ segmentation ──> InferenceBackend ──> run_conversion ──> Dataset
//! ```
//!
//! Every error a body returns, and every panic, lands in the task result's `error`; the
//! record is always completed.

mod backend;
mod config;
mod context;
mod error;
mod inputs;
mod orchestrator;
mod registry;
mod types;

pub use backend::{CommandBackend, InferenceBackend, InferenceRequest, UnavailableBackend};
pub use config::{
    default_flood_catalog, AnalyticsConfig, FeatureFlags, FloodConfig, FloodProduct, QueueConfig,
    SegmentationConfig, EXTRACT_CONCURRENCY_ENV, QUEUE_WORKERS_ENV,
};
pub use context::AnalysisContext;
pub use error::{AnalyticsError, Result};
pub use orchestrator::Analytics;
pub use registry::{AnalysisDescriptor, AnalysisType, Registry, ScheduledTask, TaskBody};
pub use types::{
    gcc_timeline, recovery_order, resiliency_score, FloodNetworkFailure, FloodSimulation,
    NetworkRecovery, RecoveryMode, Segmentation, TimelineStep,
};
