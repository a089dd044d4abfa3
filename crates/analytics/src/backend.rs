use crate::config::SegmentationConfig;
use crate::error::{AnalyticsError, Result};
use async_trait::async_trait;
use geonet_conversion::InputFile;
use geonet_protocol::{RasterData, TaskResultId, TaskType};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// What a segmentation model is asked to do.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceRequest {
    pub model: TaskType,
    pub task_id: TaskResultId,
    pub raster: RasterData,
    pub prompt: Option<String>,
    pub tile_size: u32,
}

/// Runs model inference and hands back the produced files (GeoJSON vectors, mask rasters),
/// which are then ingested through the regular conversion path.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<Vec<InputFile>>;
}

/// Stand-in used when no model is configured; segmentation types report as disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableBackend;

#[async_trait]
impl InferenceBackend for UnavailableBackend {
    fn is_available(&self) -> bool {
        false
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<Vec<InputFile>> {
        Err(AnalyticsError::BackendError(format!(
            "no inference backend configured for {}",
            request.model
        )))
    }
}

#[derive(Serialize)]
struct CommandRequest<'a> {
    #[serde(flatten)]
    request: &'a InferenceRequest,
    blob_root: Option<&'a Path>,
}

const OUTPUT_EXTENSIONS: &[&str] = &["geojson", "json", "tif", "tiff", "zip"];

/// Runs an external executable:
/// `<program> [args..] --input <dir>/request.json --output <dir>/output`.
/// Every file with a supported extension left in the output directory is returned.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
    work_dir: PathBuf,
    blob_root: Option<PathBuf>,
}

impl CommandBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            work_dir: work_dir.into(),
            blob_root: None,
        }
    }

    #[must_use]
    pub fn with_blob_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.blob_root = Some(root.into());
        self
    }

    /// `None` when no command is configured.
    #[must_use]
    pub fn from_config(config: &SegmentationConfig) -> Option<Self> {
        let program = config.command.as_deref()?.trim();
        if program.is_empty() {
            return None;
        }
        let work_dir = config
            .work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("geonet-inference"));
        let backend = Self::new(program, config.args.clone(), work_dir);
        Some(match &config.blob_root {
            Some(root) => backend.with_blob_root(root.clone()),
            None => backend,
        })
    }

    async fn collect_outputs(dir: &Path) -> Result<Vec<InputFile>> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let supported = name
                .rsplit_once('.')
                .is_some_and(|(_, ext)| OUTPUT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if !supported {
                log::debug!("Ignoring model output {name}");
                continue;
            }
            files.push(InputFile::new(name, tokio::fs::read(entry.path()).await?));
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

#[async_trait]
impl InferenceBackend for CommandBackend {
    async fn infer(&self, request: &InferenceRequest) -> Result<Vec<InputFile>> {
        let dir = self.work_dir.join(format!("task-{}", request.task_id));
        let output_dir = dir.join("output");
        tokio::fs::create_dir_all(&output_dir).await?;
        let request_path = dir.join("request.json");
        let payload = CommandRequest {
            request,
            blob_root: self.blob_root.as_deref(),
        };
        tokio::fs::write(&request_path, serde_json::to_vec_pretty(&payload)?).await?;

        log::info!("Running {} for task {}", self.program, request.task_id);
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg("--input")
            .arg(&request_path)
            .arg("--output")
            .arg(&output_dir)
            .output()
            .await?;

        let result = if output.status.success() {
            Self::collect_outputs(&output_dir).await
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            Err(AnalyticsError::BackendError(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            )))
        };

        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            log::debug!("Failed to remove {}: {e}", dir.display());
        }
        let files = result?;
        if files.is_empty() {
            return Err(AnalyticsError::BackendError(format!(
                "{} produced no outputs",
                self.program
            )));
        }
        Ok(files)
    }
}
