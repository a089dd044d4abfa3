use crate::error::{AnalyticsError, Result};
use geonet_ledger::DEFAULT_QUEUE_WORKERS;
use geonet_protocol::TaskType;
use geonet_topology::ExtractorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MAX_QUEUE_WORKERS: usize = 64;
const MAX_EXTRACT_CONCURRENCY: usize = 64;

pub const QUEUE_WORKERS_ENV: &str = "GEONET_QUEUE_WORKERS";
pub const EXTRACT_CONCURRENCY_ENV: &str = "GEONET_EXTRACT_CONCURRENCY";

/// Everything the orchestrator needs at construction time, usually read from `geonet.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub extraction: ExtractorConfig,
    pub queue: QueueConfig,
    pub flood: FloodConfig,
    pub segmentation: SegmentationConfig,
    pub features: FeatureFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_QUEUE_WORKERS,
        }
    }
}

/// One precomputed flood product and the inputs that select it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloodProduct {
    pub precipitation_chart: String,
    /// Annual exceedance probability, e.g. `0.02` for a 50-year event
    pub likelihood: f64,
    pub time_period: String,
    /// File name under `products_url` and under the `flood_products/` blob prefix
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloodConfig {
    /// Base URL products are downloaded from when they are not cached yet
    pub products_url: Option<String>,
    pub tile_size: u32,
    pub catalog: Vec<FloodProduct>,
}

impl Default for FloodConfig {
    fn default() -> Self {
        Self {
            products_url: None,
            tile_size: geonet_conversion::DEFAULT_TILE_SIZE,
            catalog: default_flood_catalog(),
        }
    }
}

/// Two design storms by two planning horizons by four event likelihoods.
#[must_use]
pub fn default_flood_catalog() -> Vec<FloodProduct> {
    let mut catalog = Vec::new();
    for chart in ["design_storm_24h", "design_storm_48h"] {
        for period in ["2030-2050", "2080-2100"] {
            for likelihood in [0.02, 0.04, 0.1, 0.2] {
                catalog.push(FloodProduct {
                    precipitation_chart: chart.to_string(),
                    likelihood,
                    time_period: period.to_string(),
                    file: format!("{chart}_{period}_{}pct.tif", (likelihood * 100.0).round()),
                });
            }
        }
    }
    catalog
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Executable invoked as `<command> [args..] --input <request.json> --output <dir>`
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Scratch directory for requests and model outputs (system temp dir when unset)
    pub work_dir: Option<PathBuf>,
    /// Blob store root passed to the model so it can read raster tiles directly
    pub blob_root: Option<PathBuf>,
    pub tile_size: u32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            work_dir: None,
            blob_root: None,
            tile_size: 512,
        }
    }
}

/// Per-type enable flags. Segmentation needs an external model and is off by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub flood_simulation: bool,
    pub flood_network_failure: bool,
    pub network_recovery: bool,
    pub geoai_segmentation: bool,
    pub tile2net_segmentation: bool,
    pub segment_curbs: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            flood_simulation: true,
            flood_network_failure: true,
            network_recovery: true,
            geoai_segmentation: false,
            tile2net_segmentation: false,
            segment_curbs: false,
        }
    }
}

impl FeatureFlags {
    #[must_use]
    pub fn is_enabled(&self, task_type: TaskType) -> bool {
        match task_type {
            TaskType::FloodSimulation => self.flood_simulation,
            TaskType::FloodNetworkFailure => self.flood_network_failure,
            TaskType::NetworkRecovery => self.network_recovery,
            TaskType::GeoaiSegmentation => self.geoai_segmentation,
            TaskType::Tile2netSegmentation => self.tile2net_segmentation,
            TaskType::SegmentCurbs => self.segment_curbs,
            TaskType::Conversion => true,
        }
    }
}

fn parse_limit(raw: Option<&str>, default_value: usize, max: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
        .clamp(1, max)
}

impl AnalyticsConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| AnalyticsError::ConfigError(e.to_string()))
    }

    /// Read `path` if it exists; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let config = Self::from_toml(&text)?;
                log::debug!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}; using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Apply `GEONET_QUEUE_WORKERS` and `GEONET_EXTRACT_CONCURRENCY`.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        let queue = std::env::var(QUEUE_WORKERS_ENV).ok();
        let extract = std::env::var(EXTRACT_CONCURRENCY_ENV).ok();
        self.with_overrides(queue.as_deref(), extract.as_deref())
    }

    fn with_overrides(mut self, queue: Option<&str>, extract: Option<&str>) -> Self {
        self.queue.workers = parse_limit(queue, self.queue.workers, MAX_QUEUE_WORKERS);
        self.extraction.max_concurrent_groups = parse_limit(
            extract,
            self.extraction.max_concurrent_groups,
            MAX_EXTRACT_CONCURRENCY,
        );
        self
    }
}
