use crate::error::Result;
use geonet_protocol::{
    analytics_topic, current_unix_ms, JsonMap, ProjectId, TaskResult, TaskResultId, TaskType,
};
use geonet_store::{Notifier, TaskResultStore};
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

/// Creates and reopens ledger entries on top of the persistence and notification ports.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn TaskResultStore>,
    notifier: Arc<dyn Notifier>,
}

impl Ledger {
    pub fn new(store: Arc<dyn TaskResultStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Insert a fresh `TaskResult` (status `Initializing task...`) and publish it.
    pub fn create(
        &self,
        name: &str,
        task_type: TaskType,
        inputs: JsonMap,
        project_id: ProjectId,
    ) -> Result<LedgerEntry> {
        let result = self
            .store
            .create_task_result(project_id, name, task_type, inputs)?;
        let entry = self.wrap(result);
        entry.publish_current();
        Ok(entry)
    }

    /// Reopen a stored entry, e.g. to inspect the output of an upstream task.
    pub fn open(&self, id: TaskResultId) -> Result<LedgerEntry> {
        Ok(self.wrap(self.store.get_task_result(id)?))
    }

    fn wrap(&self, result: TaskResult) -> LedgerEntry {
        LedgerEntry {
            inner: Arc::new(EntryInner {
                result: Mutex::new(result),
                store: self.store.clone(),
                notifier: self.notifier.clone(),
            }),
        }
    }
}

struct EntryInner {
    result: Mutex<TaskResult>,
    store: Arc<dyn TaskResultStore>,
    notifier: Arc<dyn Notifier>,
}

/// Shared handle to one task result; clones write to the same record.
#[derive(Clone)]
pub struct LedgerEntry {
    inner: Arc<EntryInner>,
}

impl std::fmt::Debug for LedgerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LedgerEntry").field(&self.snapshot()).finish()
    }
}

impl LedgerEntry {
    fn lock(&self) -> MutexGuard<'_, TaskResult> {
        // A panic mid-write leaves a plain record behind; keep using it.
        match self.inner.result.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Apply `change`, then save and publish before releasing the lock.
    fn write(&self, change: impl FnOnce(&mut TaskResult)) {
        let mut result = self.lock();
        change(&mut result);
        self.persist(&result);
    }

    fn persist(&self, result: &TaskResult) {
        if let Err(e) = self.inner.store.save_task_result(result) {
            log::warn!("Failed to save task result {}: {e}", result.id);
        }
        match serde_json::to_value(result) {
            Ok(payload) => self
                .inner
                .notifier
                .publish(&analytics_topic(result.project_id), payload),
            Err(e) => log::warn!("Failed to serialize task result {}: {e}", result.id),
        }
    }

    fn publish_current(&self) {
        let result = self.lock();
        match serde_json::to_value(&*result) {
            Ok(payload) => self
                .inner
                .notifier
                .publish(&analytics_topic(result.project_id), payload),
            Err(e) => log::warn!("Failed to serialize task result {}: {e}", result.id),
        }
    }

    #[must_use]
    pub fn id(&self) -> TaskResultId {
        self.lock().id
    }

    #[must_use]
    pub fn project_id(&self) -> ProjectId {
        self.lock().project_id
    }

    /// Copy of the current record.
    #[must_use]
    pub fn snapshot(&self) -> TaskResult {
        self.lock().clone()
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.lock().error.is_some()
    }

    /// Append `message` to the error, joined to earlier ones with `", "`.
    pub fn write_error(&self, message: impl Display) {
        let message = message.to_string();
        log::warn!("Task {}: {message}", self.id());
        self.write(|result| {
            result.error = Some(match result.error.take() {
                Some(existing) => format!("{existing}, {message}"),
                None => message,
            });
        });
    }

    pub fn write_status(&self, status: impl Display) {
        let status = status.to_string();
        self.write(|result| result.status = status);
    }

    pub fn set_outputs(&self, outputs: JsonMap) {
        self.write(|result| result.outputs = Some(outputs));
    }

    pub fn rename(&self, name: impl Into<String>) {
        let name = name.into();
        self.write(|result| result.name = name);
    }

    /// Stamp completion and the elapsed time. Only the first call has any effect.
    pub fn complete(&self) {
        let mut result = self.lock();
        if result.completed_unix_ms.is_some() {
            return;
        }
        let now = current_unix_ms();
        let elapsed = now.saturating_sub(result.created_unix_ms) as f64 / 1000.0;
        result.completed_unix_ms = Some(now);
        result.status = format!("Completed in {elapsed:.2} seconds");
        log::info!("Task {} ({}) {}", result.id, result.task_type, result.status);
        self.persist(&result);
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run `body` on its own task. An `Err` or a panic is written to the entry's error, and
/// the entry is completed in every case.
pub async fn run_guarded<F, T, E>(entry: LedgerEntry, body: F) -> Option<T>
where
    F: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    let value = match tokio::spawn(body).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            entry.write_error(e);
            None
        }
        Err(join_error) if join_error.is_panic() => {
            entry.write_error(format!(
                "Task panicked: {}",
                panic_message(join_error.into_panic())
            ));
            None
        }
        Err(join_error) => {
            entry.write_error(join_error);
            None
        }
    };
    entry.complete();
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use geonet_store::{BroadcastNotifier, MemoryRepository};
    use pretty_assertions::assert_eq;

    fn ledger() -> (Ledger, Arc<MemoryRepository>, Arc<BroadcastNotifier>) {
        let repo = Arc::new(MemoryRepository::new());
        let notifier = Arc::new(BroadcastNotifier::new());
        (Ledger::new(repo.clone(), notifier.clone()), repo, notifier)
    }

    #[test]
    fn errors_accumulate_without_completing() {
        let (ledger, repo, _) = ledger();
        let entry = ledger
            .create("Network Recovery", TaskType::NetworkRecovery, JsonMap::new(), 1)
            .unwrap();
        entry.write_status("Validating inputs");
        entry.write_error("A");
        entry.write_error("B");

        let stored = repo.get_task_result(entry.id()).unwrap();
        assert_eq!(stored.error.as_deref(), Some("A, B"));
        assert_eq!(stored.status, "Validating inputs");
        assert!(stored.completed_unix_ms.is_none());
    }

    #[test]
    fn complete_takes_effect_once() {
        let (ledger, repo, _) = ledger();
        let entry = ledger
            .create("Flood", TaskType::FloodSimulation, JsonMap::new(), 1)
            .unwrap();
        entry.complete();
        let first = repo.get_task_result(entry.id()).unwrap();
        entry.write_status("late status");
        entry.complete();
        let second = repo.get_task_result(entry.id()).unwrap();

        assert!(first.status.starts_with("Completed in "));
        assert!(first.status.ends_with(" seconds"));
        assert_eq!(second.completed_unix_ms, first.completed_unix_ms);
        assert_eq!(second.status, "late status");
    }

    #[tokio::test]
    async fn every_write_is_published_in_order() {
        let (ledger, _, notifier) = ledger();
        let mut rx = notifier.subscribe("analytics_4");
        let entry = ledger
            .create("Conversion", TaskType::Conversion, JsonMap::new(), 4)
            .unwrap();
        entry.rename("Converted roads");
        entry.write_status("Converting");
        entry.complete();

        let initial = rx.recv().await.unwrap();
        assert_eq!(initial["status"], "Initializing task...");
        assert_eq!(rx.recv().await.unwrap()["name"], "Converted roads");
        assert_eq!(rx.recv().await.unwrap()["status"], "Converting");
        let last = rx.recv().await.unwrap();
        assert!(last["completed_unix_ms"].is_u64());
    }
}
