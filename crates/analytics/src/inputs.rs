use geonet_ledger::LedgerEntry;
use geonet_protocol::{JsonMap, TaskResult, TaskType};
use geonet_store::TaskResultStore;
use serde_json::Value;

/// Reads task inputs and records every problem on the entry instead of stopping at the
/// first one. Each accessor returns `None` when the value is unusable.
pub(crate) struct InputCheck<'a> {
    entry: &'a LedgerEntry,
    inputs: &'a JsonMap,
}

impl<'a> InputCheck<'a> {
    pub(crate) fn new(entry: &'a LedgerEntry, inputs: &'a JsonMap) -> Self {
        Self { entry, inputs }
    }

    fn present(&self, key: &str) -> Option<&'a Value> {
        match self.inputs.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value),
        }
    }

    fn missing(&self, key: &str) {
        self.entry.write_error(format!("Missing input: {key}"));
    }

    pub(crate) fn id(&self, key: &str) -> Option<u64> {
        let Some(value) = self.present(key) else {
            self.missing(key);
            return None;
        };
        let parsed = match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        if parsed.is_none() {
            self.entry
                .write_error(format!("Input {key} must be an id (got {value})"));
        }
        parsed
    }

    /// Required non-negative number.
    pub(crate) fn number(&self, key: &str) -> Option<f64> {
        let Some(value) = self.present(key) else {
            self.missing(key);
            return None;
        };
        self.parse_number(key, value)
    }

    pub(crate) fn optional_number(&self, key: &str) -> Option<f64> {
        self.present(key)
            .and_then(|value| self.parse_number(key, value))
    }

    fn parse_number(&self, key: &str, value: &Value) -> Option<f64> {
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        match parsed {
            Some(n) if n.is_finite() && n >= 0.0 => Some(n),
            _ => {
                self.entry.write_error(format!(
                    "Input {key} must be a non-negative number (got {value})"
                ));
                None
            }
        }
    }

    pub(crate) fn string(&self, key: &str) -> Option<String> {
        let Some(value) = self.present(key) else {
            self.missing(key);
            return None;
        };
        self.parse_string(key, value)
    }

    pub(crate) fn optional_string(&self, key: &str) -> Option<String> {
        self.present(key)
            .and_then(|value| self.parse_string(key, value))
    }

    fn parse_string(&self, key: &str, value: &Value) -> Option<String> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => {
                self.entry
                    .write_error(format!("Input {key} must be a string (got {value})"));
                None
            }
        }
    }

    pub(crate) fn error(&self, message: impl std::fmt::Display) {
        self.entry.write_error(message);
    }

    /// Look up an upstream task result that finished without error and is one of `accepted`.
    pub(crate) fn upstream(
        &self,
        key: &str,
        tasks: &dyn TaskResultStore,
        accepted: &[TaskType],
    ) -> Option<TaskResult> {
        let id = self.id(key)?;
        let Ok(result) = tasks.get_task_result(id) else {
            self.error(format!("Task result {id} not found"));
            return None;
        };
        if !accepted.contains(&result.task_type) {
            self.error(format!(
                "Task result {id} is a {} task, expected one of: {}",
                result.task_type,
                accepted
                    .iter()
                    .map(|t| t.db_value())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
            return None;
        }
        if !result.succeeded() {
            self.error(format!("Task result {id} has not completed successfully"));
            return None;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geonet_ledger::Ledger;
    use geonet_store::{BroadcastNotifier, MemoryRepository};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn every_problem_is_reported_once() {
        let repo = Arc::new(MemoryRepository::new());
        let ledger = Ledger::new(repo.clone(), Arc::new(BroadcastNotifier::new()));
        let inputs: JsonMap = json!({
            "network": "12",
            "depth_tolerance_meters": -1,
            "label": ["not", "a", "string"],
        })
        .as_object()
        .cloned()
        .unwrap();
        let entry = ledger
            .create("check", TaskType::FloodNetworkFailure, inputs.clone(), 1)
            .unwrap();

        let check = InputCheck::new(&entry, &inputs);
        assert_eq!(check.id("network"), Some(12));
        assert_eq!(check.number("depth_tolerance_meters"), None);
        assert_eq!(check.number("station_radius_meters"), None);
        assert_eq!(check.optional_string("label"), None);
        assert_eq!(check.optional_number("absent"), None);
        assert_eq!(
            check.upstream("flood_simulation", repo.as_ref(), &[TaskType::FloodSimulation]),
            None
        );

        let error = entry.snapshot().error.unwrap();
        let parts: Vec<&str> = error.split(", ").collect();
        assert!(parts[0].starts_with("Input depth_tolerance_meters must be"));
        assert_eq!(parts[1], "Missing input: station_radius_meters");
        assert!(error.contains("Input label must be a string"));
        assert!(error.ends_with("Missing input: flood_simulation"));
    }
}
