use crate::error::Result;
use geonet_conversion::{ConversionOptions, Converter, InputFile};
use geonet_ledger::{Ledger, TaskQueue};
use geonet_protocol::{Dataset, JsonMap, ProjectId, TaskResult, TaskType};
use geonet_store::{
    BlobStore, ChartStore, DatasetStore, NetworkStore, Notifier, Repository, TaskResultStore,
};
use serde_json::json;
use std::sync::Arc;

/// Ports and services every analysis runs against. Cheap to clone into task bodies.
#[derive(Clone)]
pub struct AnalysisContext {
    pub networks: Arc<dyn NetworkStore>,
    pub datasets: Arc<dyn DatasetStore>,
    pub tasks: Arc<dyn TaskResultStore>,
    pub charts: Arc<dyn ChartStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub ledger: Ledger,
    pub queue: TaskQueue,
    pub converter: Converter,
}

impl AnalysisContext {
    pub fn new<R: Repository + 'static>(
        repo: Arc<R>,
        blobs: Arc<dyn BlobStore>,
        notifier: Arc<dyn Notifier>,
        queue: TaskQueue,
    ) -> Self {
        Self {
            networks: repo.clone(),
            datasets: repo.clone(),
            tasks: repo.clone(),
            charts: repo.clone(),
            converter: Converter::new(repo.clone(), blobs.clone()),
            ledger: Ledger::new(repo, notifier),
            blobs,
            queue,
        }
    }

    /// Convert `files` into `dataset` under a `conversion` task result, in the caller's task.
    /// Per-file failures end up in the task's error; the returned record is complete.
    pub async fn run_conversion(
        &self,
        project_id: ProjectId,
        dataset: &Dataset,
        files: Vec<InputFile>,
        options: &ConversionOptions,
    ) -> Result<TaskResult> {
        let mut inputs = JsonMap::new();
        inputs.insert("dataset".into(), json!(dataset.id));
        inputs.insert(
            "files".into(),
            json!(files.iter().map(|f| f.name.clone()).collect::<Vec<_>>()),
        );
        let entry = self.ledger.create(
            &format!("Conversion: {}", dataset.name),
            TaskType::Conversion,
            inputs,
            project_id,
        )?;
        entry.write_status(format!("Converting {} file(s)", files.len()));

        let report = self.converter.convert_dataset(dataset, files, options).await;
        for (file, error) in &report.failed {
            entry.write_error(format!("{file}: {error}"));
        }
        if !entry.has_error() {
            let mut outputs = JsonMap::new();
            outputs.insert("datasets".into(), json!([dataset.id]));
            outputs.insert("rasters".into(), json!(report.rasters));
            outputs.insert("vectors".into(), json!(report.vectors));
            outputs.insert("skipped".into(), json!(report.skipped));
            entry.set_outputs(outputs);
        }
        entry.complete();
        Ok(entry.snapshot())
    }
}
