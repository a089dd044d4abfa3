use crate::backend::{InferenceBackend, InferenceRequest};
use crate::context::AnalysisContext;
use crate::error::Result;
use crate::inputs::InputCheck;
use crate::registry::{type_tags, AnalysisType, TaskBody};
use geonet_conversion::ConversionOptions;
use geonet_ledger::LedgerEntry;
use geonet_protocol::{JsonMap, NewDataset, ProjectId, TaskType};
use serde_json::{json, Value};
use std::sync::Arc;

/// Image segmentation over an aerial imagery dataset, run by an inference backend. The
/// three model variants share this implementation and differ only in their task type.
pub struct Segmentation {
    task_type: TaskType,
    backend: Arc<dyn InferenceBackend>,
    tile_size: u32,
    enabled: bool,
}

impl Segmentation {
    #[must_use]
    pub fn new(
        task_type: TaskType,
        backend: Arc<dyn InferenceBackend>,
        tile_size: u32,
        enabled: bool,
    ) -> Self {
        Self {
            task_type,
            backend,
            tile_size,
            enabled,
        }
    }
}

impl AnalysisType for Segmentation {
    fn name(&self) -> &'static str {
        match self.task_type {
            TaskType::Tile2netSegmentation => "Tile2Net Sidewalk Segmentation",
            TaskType::SegmentCurbs => "Curb Segmentation",
            _ => "GeoAI Segmentation",
        }
    }

    fn description(&self) -> &'static str {
        match self.task_type {
            TaskType::Tile2netSegmentation => {
                "Detect sidewalks, crosswalks and footpaths in aerial imagery and return them \
                 as a pedestrian network dataset."
            }
            TaskType::SegmentCurbs => {
                "Trace curb lines in aerial imagery and return them as a vector dataset."
            }
            _ => "Segment objects described by a text prompt in aerial imagery.",
        }
    }

    fn attribution(&self) -> &'static str {
        match self.task_type {
            TaskType::Tile2netSegmentation => "NYU Visualization and Data Analytics Research Center",
            _ => "Open Geospatial Solutions",
        }
    }

    fn task_type(&self) -> TaskType {
        self.task_type
    }

    fn input_types(&self) -> JsonMap {
        type_tags(&[
            ("aerial_imagery", "Dataset"),
            ("prompt", "string"),
            ("tile_size", "number"),
        ])
    }

    fn output_types(&self) -> JsonMap {
        type_tags(&[("datasets", "Dataset[]")])
    }

    fn is_enabled(&self) -> bool {
        self.enabled && self.backend.is_available()
    }

    /// Only datasets that hold raster data qualify as imagery.
    fn input_options(&self, ctx: &AnalysisContext, project_id: ProjectId) -> Result<JsonMap> {
        let mut imagery = Vec::new();
        for dataset in ctx.datasets.list_datasets(project_id)? {
            if !ctx.datasets.rasters_for_dataset(dataset.id)?.is_empty() {
                imagery.push(json!({"id": dataset.id, "name": dataset.name}));
            }
        }
        let mut options = JsonMap::new();
        options.insert("aerial_imagery".into(), Value::Array(imagery));
        Ok(options)
    }

    fn execute(&self, ctx: AnalysisContext, entry: LedgerEntry) -> TaskBody {
        let backend = self.backend.clone();
        let model = self.task_type;
        let default_tile_size = self.tile_size;
        let label = self.name();
        Box::pin(async move {
            let inputs = entry.snapshot().inputs;
            let check = InputCheck::new(&entry, &inputs);

            let imagery = check
                .id("aerial_imagery")
                .and_then(|id| match ctx.datasets.get_dataset(id) {
                    Ok(dataset) => Some(dataset),
                    Err(_) => {
                        check.error(format!("Dataset {id} not found"));
                        None
                    }
                });
            let prompt = check.optional_string("prompt");
            let tile_size = check
                .optional_number("tile_size")
                .map_or(default_tile_size, |size| size.round().max(1.0) as u32);
            let raster = imagery.as_ref().and_then(|dataset| {
                match ctx.datasets.rasters_for_dataset(dataset.id) {
                    Ok(rasters) if !rasters.is_empty() => rasters.into_iter().next(),
                    _ => {
                        check.error(format!("Dataset {} has no raster data", dataset.id));
                        None
                    }
                }
            });

            let (Some(imagery), Some(raster)) = (imagery, raster) else {
                return Ok(());
            };
            if entry.has_error() {
                return Ok(());
            }

            entry.rename(format!("{label}: {}", imagery.name));
            entry.write_status(format!("Running {model} inference on {}", raster.name));
            let request = InferenceRequest {
                model,
                task_id: entry.id(),
                raster,
                prompt: prompt.clone(),
                tile_size,
            };
            let files = backend.infer(&request).await?;
            log::info!(
                "{model} produced {} file(s) for task {}",
                files.len(),
                entry.id()
            );

            let mut metadata = JsonMap::new();
            metadata.insert("source_dataset".into(), json!(imagery.id));
            metadata.insert("model".into(), json!(model));
            metadata.insert("task_result".into(), json!(entry.id()));
            if let Some(prompt) = &prompt {
                metadata.insert("prompt".into(), json!(prompt));
            }
            let dataset = ctx.datasets.create_dataset(NewDataset {
                project_id: entry.project_id(),
                name: format!("{} {model}", imagery.name),
                category: "segmentation".into(),
                description: format!("{label} of {}", imagery.name),
                metadata,
            })?;

            entry.write_status("Converting model outputs");
            let options = ConversionOptions {
                combine: true,
                tile_size,
            };
            let conversion = ctx
                .run_conversion(entry.project_id(), &dataset, files, &options)
                .await?;
            if let Some(error) = conversion.error {
                entry.write_error(format!("Conversion {} failed: {error}", conversion.id));
                return Ok(());
            }

            let mut outputs = JsonMap::new();
            outputs.insert("datasets".into(), json!([dataset.id]));
            outputs.insert("conversion".into(), json!(conversion.id));
            entry.set_outputs(outputs);
            Ok(())
        })
    }
}
