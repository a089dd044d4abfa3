//! # Geonet Topology
//!
//! Builds network graphs out of raw vector features.
//!
//! ```text
//! features ──partition_by_property──> groups
//! groups ──interpret_groups (bounded pool)──> ExtractedGroup per group
//! ExtractedGroup ──persist_group──> NetworkStore (nodes, then edges)
//! ```
//!
//! Nodes closer than [`ExtractorConfig::node_tolerance_degrees`] collapse into one, and
//! edges whose ends do not both land on a node are dropped.

mod config;
mod error;
mod export;
mod extractor;
mod interpret;

pub use config::{ExtractorConfig, DEFAULT_MAX_CONCURRENT_GROUPS, DEFAULT_NODE_TOLERANCE_DEGREES};
pub use error::{Result, TopologyError};
pub use export::{network_from_feature_collection, network_to_feature_collection};
pub use extractor::{
    extract_and_persist, extract_groups, interpret_groups, partition_by_property,
    ExtractionSummary,
};
pub use interpret::{interpret_group, persist_group, ExtractedGroup, GroupEdge};
