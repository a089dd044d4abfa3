use crate::features::JsonMap;
use crate::records::ProjectId;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type TaskResultId = u64;

pub const INITIAL_STATUS: &str = "Initializing task...";

/// Closed set of analysis kinds; the serialized form is the stable `db_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    FloodSimulation,
    FloodNetworkFailure,
    NetworkRecovery,
    GeoaiSegmentation,
    Tile2netSegmentation,
    SegmentCurbs,
    Conversion,
}

impl TaskType {
    pub const ALL: [TaskType; 7] = [
        TaskType::FloodSimulation,
        TaskType::FloodNetworkFailure,
        TaskType::NetworkRecovery,
        TaskType::GeoaiSegmentation,
        TaskType::Tile2netSegmentation,
        TaskType::SegmentCurbs,
        TaskType::Conversion,
    ];

    pub const fn db_value(self) -> &'static str {
        match self {
            TaskType::FloodSimulation => "flood_simulation",
            TaskType::FloodNetworkFailure => "flood_network_failure",
            TaskType::NetworkRecovery => "network_recovery",
            TaskType::GeoaiSegmentation => "geoai_segmentation",
            TaskType::Tile2netSegmentation => "tile2net_segmentation",
            TaskType::SegmentCurbs => "segment_curbs",
            TaskType::Conversion => "conversion",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.db_value())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task type: {0}")]
pub struct UnknownTaskType(pub String);

impl FromStr for TaskType {
    type Err = UnknownTaskType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        TaskType::ALL
            .into_iter()
            .find(|task_type| task_type.db_value() == trimmed)
            .ok_or_else(|| UnknownTaskType(trimmed.to_string()))
    }
}

/// One asynchronous unit of analytical work.
///
/// `completed_unix_ms` marks that execution reached its end; whether it succeeded is
/// decided by `error` alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskResult {
    pub id: TaskResultId,
    pub project_id: ProjectId,
    pub name: String,
    pub task_type: TaskType,
    #[serde(default)]
    pub inputs: JsonMap,
    #[serde(default)]
    pub outputs: Option<JsonMap>,
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
    pub created_unix_ms: u64,
    #[serde(default)]
    pub completed_unix_ms: Option<u64>,
}

impl TaskResult {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed_unix_ms.is_some()
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.is_completed() && self.error.is_none()
    }

    /// Output value by key, if the task produced outputs.
    #[must_use]
    pub fn output(&self, key: &str) -> Option<&serde_json::Value> {
        self.outputs.as_ref().and_then(|outputs| outputs.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_values_fit_column_width() {
        for task_type in TaskType::ALL {
            assert!(task_type.db_value().len() <= 25, "{task_type}");
        }
    }

    #[test]
    fn parses_db_values() {
        assert_eq!(
            "network_recovery".parse::<TaskType>(),
            Ok(TaskType::NetworkRecovery)
        );
        assert!("flood".parse::<TaskType>().is_err());
    }

    #[test]
    fn serde_uses_db_value() {
        let json = serde_json::to_string(&TaskType::Tile2netSegmentation).unwrap();
        assert_eq!(json, "\"tile2net_segmentation\"");
    }
}
