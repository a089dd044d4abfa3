use crate::backend::InferenceBackend;
use crate::config::AnalyticsConfig;
use crate::context::AnalysisContext;
use crate::error::{AnalyticsError, Result};
use crate::types::{FloodNetworkFailure, FloodSimulation, NetworkRecovery, Segmentation};
use geonet_ledger::{LedgerEntry, TaskHandle};
use geonet_protocol::{JsonMap, ProjectId, TaskResult, TaskResultId, TaskType};
use geonet_store::TaskResultStore;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Work scheduled by [`AnalysisType::run_task`]; every `Err` lands in the task's error.
pub type TaskBody = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

/// One analysis kind. Implementations validate their inputs inside [`execute`], writing
/// every problem through the entry, and only run the expensive part when none was found.
///
/// [`execute`]: AnalysisType::execute
pub trait AnalysisType: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn attribution(&self) -> &'static str;

    fn task_type(&self) -> TaskType;

    fn db_value(&self) -> &'static str {
        self.task_type().db_value()
    }

    /// Input name → semantic type tag (`Network`, `TaskResult`, `Dataset`, `number`, `string`)
    fn input_types(&self) -> JsonMap;

    /// Output name → semantic type tag
    fn output_types(&self) -> JsonMap;

    fn is_enabled(&self) -> bool;

    /// Candidate values per input name.
    fn input_options(&self, ctx: &AnalysisContext, project_id: ProjectId) -> Result<JsonMap>;

    /// Rejections that must happen before a task result is created.
    fn precheck(&self, _inputs: &JsonMap) -> Result<()> {
        Ok(())
    }

    fn execute(&self, ctx: AnalysisContext, entry: LedgerEntry) -> TaskBody;

    /// Create the task result and schedule [`execute`](AnalysisType::execute) on the queue.
    /// Returns as soon as the record exists.
    fn run_task(
        &self,
        ctx: &AnalysisContext,
        project_id: ProjectId,
        inputs: JsonMap,
    ) -> Result<ScheduledTask> {
        let entry = ctx
            .ledger
            .create(self.name(), self.task_type(), inputs, project_id)?;
        let result = entry.snapshot();
        let body = self.execute(ctx.clone(), entry.clone());
        let handle = ctx.queue.schedule_guarded(entry, body);
        log::info!("Scheduled {} task {}", self.db_value(), result.id);
        Ok(ScheduledTask {
            result,
            handle,
            tasks: ctx.tasks.clone(),
        })
    }
}

pub(crate) fn type_tags(pairs: &[(&str, &str)]) -> JsonMap {
    pairs
        .iter()
        .map(|(name, tag)| (name.to_string(), Value::String(tag.to_string())))
        .collect()
}

pub(crate) fn network_options(ctx: &AnalysisContext, project_id: ProjectId) -> Result<Value> {
    Ok(ctx
        .networks
        .list_networks(project_id)?
        .into_iter()
        .map(|network| json!({"id": network.id, "name": network.name}))
        .collect())
}

/// Successful task results of the given types, newest last.
pub(crate) fn task_options(
    ctx: &AnalysisContext,
    project_id: ProjectId,
    accepted: &[TaskType],
) -> Result<Value> {
    let mut options = Vec::new();
    for task_type in accepted {
        for result in ctx.tasks.list_task_results(project_id, Some(*task_type))? {
            if result.succeeded() {
                options.push(json!({"id": result.id, "name": result.name}));
            }
        }
    }
    Ok(Value::Array(options))
}

/// Handle to a scheduled analysis. The initial record is available at once; [`wait`] joins
/// the body and re-reads the final record. Dropping the handle leaves the task running.
///
/// [`wait`]: ScheduledTask::wait
pub struct ScheduledTask {
    pub result: TaskResult,
    handle: TaskHandle<Option<()>>,
    tasks: Arc<dyn TaskResultStore>,
}

impl ScheduledTask {
    #[must_use]
    pub fn id(&self) -> TaskResultId {
        self.result.id
    }

    pub async fn wait(self) -> Result<TaskResult> {
        self.handle.join().await?;
        Ok(self.tasks.get_task_result(self.result.id)?)
    }
}

/// Description of a registered type, as listed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisDescriptor {
    pub name: String,
    pub description: String,
    pub attribution: String,
    pub db_value: String,
    pub input_types: JsonMap,
    pub output_types: JsonMap,
    pub enabled: bool,
}

type Factory = fn(&RegistryBuilder<'_>) -> Arc<dyn AnalysisType>;

/// Registration order matters: a factory only sees the types registered before it.
const FACTORIES: &[(TaskType, Factory)] = &[
    (TaskType::FloodSimulation, flood_simulation),
    (TaskType::FloodNetworkFailure, flood_network_failure),
    (TaskType::GeoaiSegmentation, geoai_segmentation),
    (TaskType::Tile2netSegmentation, tile2net_segmentation),
    (TaskType::SegmentCurbs, segment_curbs),
    (TaskType::NetworkRecovery, network_recovery),
];

fn flood_simulation(b: &RegistryBuilder<'_>) -> Arc<dyn AnalysisType> {
    Arc::new(FloodSimulation::new(
        b.config.flood.clone(),
        b.config.features.flood_simulation,
    ))
}

fn flood_network_failure(b: &RegistryBuilder<'_>) -> Arc<dyn AnalysisType> {
    Arc::new(FloodNetworkFailure::new(b.config.features.flood_network_failure))
}

fn geoai_segmentation(b: &RegistryBuilder<'_>) -> Arc<dyn AnalysisType> {
    Arc::new(b.segmentation(TaskType::GeoaiSegmentation))
}

fn tile2net_segmentation(b: &RegistryBuilder<'_>) -> Arc<dyn AnalysisType> {
    Arc::new(b.segmentation(TaskType::Tile2netSegmentation))
}

fn segment_curbs(b: &RegistryBuilder<'_>) -> Arc<dyn AnalysisType> {
    Arc::new(b.segmentation(TaskType::SegmentCurbs))
}

/// Recovery accepts the output of any earlier type that reports `failures`.
fn network_recovery(b: &RegistryBuilder<'_>) -> Arc<dyn AnalysisType> {
    Arc::new(NetworkRecovery::new(
        b.producers_of("failures"),
        b.config.features.network_recovery,
    ))
}

struct RegistryBuilder<'a> {
    config: &'a AnalyticsConfig,
    backend: Arc<dyn InferenceBackend>,
    registered: BTreeMap<TaskType, Arc<dyn AnalysisType>>,
}

impl RegistryBuilder<'_> {
    fn producers_of(&self, output: &str) -> Vec<TaskType> {
        self.registered
            .values()
            .filter(|analysis| analysis.output_types().contains_key(output))
            .map(|analysis| analysis.task_type())
            .collect()
    }

    fn segmentation(&self, task_type: TaskType) -> Segmentation {
        Segmentation::new(
            task_type,
            self.backend.clone(),
            self.config.segmentation.tile_size,
            self.config.features.is_enabled(task_type),
        )
    }
}

/// Closed table of analysis types, built once at startup.
#[derive(Clone)]
pub struct Registry {
    types: BTreeMap<TaskType, Arc<dyn AnalysisType>>,
}

impl Registry {
    pub fn build(config: &AnalyticsConfig, backend: Arc<dyn InferenceBackend>) -> Self {
        let mut builder = RegistryBuilder {
            config,
            backend,
            registered: BTreeMap::new(),
        };
        for (task_type, factory) in FACTORIES {
            let analysis = factory(&builder);
            debug_assert_eq!(analysis.task_type(), *task_type);
            builder.registered.insert(*task_type, analysis);
        }
        Self {
            types: builder.registered,
        }
    }

    /// Resolve a `db_value`. Unknown names are rejected here, before any task result exists.
    pub fn get(&self, db_value: &str) -> Result<&Arc<dyn AnalysisType>> {
        let task_type: TaskType = db_value
            .parse()
            .map_err(|_| AnalyticsError::UnknownType(db_value.to_string()))?;
        self.types
            .get(&task_type)
            .ok_or_else(|| AnalyticsError::UnknownType(db_value.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn AnalysisType>> {
        self.types.values()
    }

    #[must_use]
    pub fn describe(&self) -> Vec<AnalysisDescriptor> {
        self.iter()
            .map(|analysis| AnalysisDescriptor {
                name: analysis.name().to_string(),
                description: analysis.description().to_string(),
                attribution: analysis.attribution().to_string(),
                db_value: analysis.db_value().to_string(),
                input_types: analysis.input_types(),
                output_types: analysis.output_types(),
                enabled: analysis.is_enabled(),
            })
            .collect()
    }
}
