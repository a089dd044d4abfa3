use serde::{Deserialize, Serialize};

pub const DEFAULT_NODE_TOLERANCE_DEGREES: f64 = 0.0001;
pub const DEFAULT_MAX_CONCURRENT_GROUPS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Points closer than this (in degrees) resolve to one node
    pub node_tolerance_degrees: f64,
    /// Upper bound on groups interpreted at the same time
    pub max_concurrent_groups: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            node_tolerance_degrees: DEFAULT_NODE_TOLERANCE_DEGREES,
            max_concurrent_groups: DEFAULT_MAX_CONCURRENT_GROUPS,
        }
    }
}
