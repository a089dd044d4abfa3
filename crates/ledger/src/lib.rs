//! # Geonet Ledger
//!
//! Inspectable execution records for long-running analyses.
//!
//! A [`LedgerEntry`] wraps one `TaskResult`. Every write is saved and then published to
//! `analytics_{project_id}` while the entry lock is held, so observers see writes in order.
//! [`run_guarded`] executes a body on its own task and always reaches `complete()`,
//! whether the body returns an error or panics.

mod entry;
mod error;
mod queue;

pub use entry::{run_guarded, Ledger, LedgerEntry};
pub use error::{LedgerError, Result};
pub use queue::{TaskHandle, TaskQueue, DEFAULT_QUEUE_WORKERS};
