use anyhow::{Context, Result};
use geonet_analytics::{
    AnalysisContext, Analytics, AnalyticsConfig, CommandBackend, InferenceBackend,
    UnavailableBackend,
};
use geonet_ledger::TaskQueue;
use geonet_store::{BroadcastNotifier, FsBlobStore, MemoryRepository};
use std::path::PathBuf;
use std::sync::Arc;

pub struct WorkspacePaths {
    pub config: PathBuf,
    pub state: PathBuf,
    pub blobs: PathBuf,
}

/// Everything one invocation works against: the snapshot-backed repository, the blob
/// directory and the analytics wired on top of them.
pub struct Workspace {
    pub repo: Arc<MemoryRepository>,
    pub config: AnalyticsConfig,
    pub project: u64,
    pub analytics: Analytics,
    state: PathBuf,
}

impl Workspace {
    pub async fn open(paths: WorkspacePaths, project: u64) -> Result<Self> {
        let config = AnalyticsConfig::load(&paths.config)
            .with_context(|| format!("Failed to load config {}", paths.config.display()))?
            .with_env_overrides();
        let repo = Arc::new(
            MemoryRepository::load_or_default(&paths.state)
                .await
                .with_context(|| format!("Failed to load state {}", paths.state.display()))?,
        );
        let blobs = Arc::new(FsBlobStore::new(&paths.blobs));

        let backend: Arc<dyn InferenceBackend> =
            match CommandBackend::from_config(&config.segmentation) {
                Some(backend) if config.segmentation.blob_root.is_none() => {
                    Arc::new(backend.with_blob_root(&paths.blobs))
                }
                Some(backend) => Arc::new(backend),
                None => Arc::new(UnavailableBackend),
            };
        let ctx = AnalysisContext::new(
            repo.clone(),
            blobs,
            Arc::new(BroadcastNotifier::new()),
            TaskQueue::new(config.queue.workers),
        );
        let analytics = Analytics::from_config(&config, ctx, backend);
        log::debug!(
            "Opened workspace (state {}, blobs {})",
            paths.state.display(),
            paths.blobs.display()
        );

        Ok(Self {
            repo,
            config,
            project,
            analytics,
            state: paths.state,
        })
    }

    pub async fn save(&self) -> Result<()> {
        self.repo
            .save(&self.state)
            .await
            .with_context(|| format!("Failed to write state {}", self.state.display()))
    }
}
