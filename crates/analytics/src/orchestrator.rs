use crate::backend::InferenceBackend;
use crate::config::AnalyticsConfig;
use crate::context::AnalysisContext;
use crate::error::{AnalyticsError, Result};
use crate::registry::{AnalysisDescriptor, Registry, ScheduledTask};
use geonet_protocol::{JsonMap, ProjectId};
use serde_json::Value;
use std::sync::Arc;

/// Entry point for clients: resolves a type by `db_value`, applies the synchronous
/// rejections and hands the work to the type's scheduler.
#[derive(Clone)]
pub struct Analytics {
    registry: Registry,
    ctx: AnalysisContext,
}

impl Analytics {
    pub fn new(registry: Registry, ctx: AnalysisContext) -> Self {
        Self { registry, ctx }
    }

    pub fn from_config(
        config: &AnalyticsConfig,
        ctx: AnalysisContext,
        backend: Arc<dyn InferenceBackend>,
    ) -> Self {
        Self::new(Registry::build(config, backend), ctx)
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn context(&self) -> &AnalysisContext {
        &self.ctx
    }

    #[must_use]
    pub fn describe(&self) -> Vec<AnalysisDescriptor> {
        self.registry.describe()
    }

    pub fn input_options(&self, db_value: &str, project_id: ProjectId) -> Result<JsonMap> {
        self.registry.get(db_value)?.input_options(&self.ctx, project_id)
    }

    /// Schedule one analysis. Unknown or disabled types and malformed input documents fail
    /// here without creating a task result; everything else is reported on the record.
    pub fn run(&self, db_value: &str, project_id: ProjectId, inputs: Value) -> Result<ScheduledTask> {
        let analysis = self.registry.get(db_value)?;
        if !analysis.is_enabled() {
            return Err(AnalyticsError::Disabled(db_value.to_string()));
        }
        let Value::Object(inputs) = inputs else {
            return Err(AnalyticsError::InvalidInputs(format!(
                "inputs must be an object (got {inputs})"
            )));
        };
        analysis.precheck(&inputs)?;
        analysis.run_task(&self.ctx, project_id, inputs)
    }
}
