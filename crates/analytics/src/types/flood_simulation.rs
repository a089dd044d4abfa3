use crate::config::{FloodConfig, FloodProduct};
use crate::context::AnalysisContext;
use crate::error::{AnalyticsError, Result};
use crate::inputs::InputCheck;
use crate::registry::{type_tags, AnalysisType, TaskBody};
use geonet_conversion::{ConversionOptions, InputFile};
use geonet_ledger::LedgerEntry;
use geonet_protocol::{JsonMap, NewDataset, ProjectId, TaskType};
use geonet_store::BlobStore;
use serde_json::{json, Value};
use std::collections::BTreeSet;

const PRODUCT_PREFIX: &str = "flood_products";
const LIKELIHOOD_EPSILON: f64 = 1e-9;

/// Selects a precomputed flood depth product and ingests it as a raster dataset.
pub struct FloodSimulation {
    config: FloodConfig,
    enabled: bool,
    client: reqwest::Client,
}

impl FloodSimulation {
    #[must_use]
    pub fn new(config: FloodConfig, enabled: bool) -> Self {
        Self {
            config,
            enabled,
            client: reqwest::Client::new(),
        }
    }

    fn find(&self, chart: &str, likelihood: f64, period: &str) -> Option<&FloodProduct> {
        self.config.catalog.iter().find(|product| {
            product.precipitation_chart == chart
                && product.time_period == period
                && (product.likelihood - likelihood).abs() < LIKELIHOOD_EPSILON
        })
    }
}

/// Blob bytes of `product`, downloading and caching them on first use.
async fn fetch_product(
    blobs: &dyn BlobStore,
    client: &reqwest::Client,
    products_url: Option<&str>,
    product: &FloodProduct,
) -> Result<Vec<u8>> {
    let key = format!("{PRODUCT_PREFIX}/{}", product.file);
    if blobs.exists(&key).await? {
        log::debug!("Reusing cached flood product {key}");
        return Ok(blobs.get(&key).await?);
    }
    let Some(base) = products_url else {
        return Err(AnalyticsError::DownloadError(format!(
            "{} is not cached and no products_url is configured",
            product.file
        )));
    };
    let url = format!("{}/{}", base.trim_end_matches('/'), product.file);
    log::info!("Downloading flood product {url}");
    let bytes = client
        .get(&url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| AnalyticsError::DownloadError(format!("{url}: {e}")))?
        .bytes()
        .await
        .map_err(|e| AnalyticsError::DownloadError(format!("{url}: {e}")))?
        .to_vec();
    blobs.put(&key, bytes.clone()).await?;
    Ok(bytes)
}

impl AnalysisType for FloodSimulation {
    fn name(&self) -> &'static str {
        "Flood Simulation"
    }

    fn description(&self) -> &'static str {
        "Select a modeled flood depth product by precipitation chart, event likelihood and \
         planning horizon, and load it as a multi-frame raster dataset."
    }

    fn attribution(&self) -> &'static str {
        "Northeastern University"
    }

    fn task_type(&self) -> TaskType {
        TaskType::FloodSimulation
    }

    fn input_types(&self) -> JsonMap {
        type_tags(&[
            ("precipitation_chart", "string"),
            ("likelihood", "number"),
            ("time_period", "string"),
        ])
    }

    fn output_types(&self) -> JsonMap {
        type_tags(&[("flood", "Dataset")])
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn input_options(&self, _ctx: &AnalysisContext, _project_id: ProjectId) -> Result<JsonMap> {
        Ok(self.catalog_options())
    }

    fn execute(&self, ctx: AnalysisContext, entry: LedgerEntry) -> TaskBody {
        self.schedule_body(ctx, entry)
    }
}

impl FloodSimulation {
    /// Distinct charts, likelihoods and periods of the catalog.
    fn catalog_options(&self) -> JsonMap {
        let catalog = &self.config.catalog;
        let charts: BTreeSet<&str> = catalog
            .iter()
            .map(|p| p.precipitation_chart.as_str())
            .collect();
        let periods: BTreeSet<&str> = catalog.iter().map(|p| p.time_period.as_str()).collect();
        let mut likelihoods: Vec<f64> = catalog.iter().map(|p| p.likelihood).collect();
        likelihoods.sort_by(f64::total_cmp);
        likelihoods.dedup_by(|a, b| (*a - *b).abs() < LIKELIHOOD_EPSILON);

        let mut options = JsonMap::new();
        options.insert("precipitation_chart".into(), json!(charts));
        options.insert("likelihood".into(), json!(likelihoods));
        options.insert("time_period".into(), json!(periods));
        options
    }

    /// Inputs are checked against the catalog up front; the body only fetches and converts.
    fn schedule_body(&self, ctx: AnalysisContext, entry: LedgerEntry) -> TaskBody {
        let inputs = entry.snapshot().inputs;
        let check = InputCheck::new(&entry, &inputs);
        let chart = check.string("precipitation_chart");
        let likelihood = check.number("likelihood");
        let period = check.string("time_period");
        if let Some(chart) = &chart {
            if !self.config.catalog.iter().any(|p| &p.precipitation_chart == chart) {
                check.error(format!("Unknown precipitation chart: {chart}"));
            }
        }
        if let Some(period) = &period {
            if !self.config.catalog.iter().any(|p| &p.time_period == period) {
                check.error(format!("Unknown time period: {period}"));
            }
        }
        let product = match (&chart, likelihood, &period) {
            (Some(chart), Some(likelihood), Some(period)) if !entry.has_error() => {
                let found = self.find(chart, likelihood, period).cloned();
                if found.is_none() {
                    check.error(format!(
                        "No flood product for chart {chart}, likelihood {likelihood}, period {period}"
                    ));
                }
                found
            }
            _ => None,
        };
        let products_url = self.config.products_url.clone();
        let tile_size = self.config.tile_size;
        let client = self.client.clone();

        Box::pin(async move {
            let Some(product) = product else {
                return Ok(());
            };
            let label = format!(
                "{} {} ({}% annual chance)",
                product.precipitation_chart,
                product.time_period,
                (product.likelihood * 10_000.0).round() / 100.0
            );
            entry.rename(format!("Flood Simulation: {label}"));
            entry.write_status(format!("Fetching {}", product.file));
            let bytes = fetch_product(
                ctx.blobs.as_ref(),
                &client,
                products_url.as_deref(),
                &product,
            )
            .await?;

            let mut metadata = JsonMap::new();
            metadata.insert("precipitation_chart".into(), json!(product.precipitation_chart));
            metadata.insert("likelihood".into(), json!(product.likelihood));
            metadata.insert("time_period".into(), json!(product.time_period));
            metadata.insert("task_result".into(), json!(entry.id()));
            let dataset = ctx.datasets.create_dataset(NewDataset {
                project_id: entry.project_id(),
                name: format!("Flood {label}"),
                category: "flood".into(),
                description: format!("Modeled flood depth in meters from {}", product.file),
                metadata,
            })?;

            entry.write_status("Converting flood raster");
            let options = ConversionOptions {
                combine: false,
                tile_size,
            };
            let report = ctx
                .converter
                .convert_dataset(&dataset, vec![InputFile::new(product.file.clone(), bytes)], &options)
                .await;
            for (file, error) in &report.failed {
                entry.write_error(format!("{file}: {error}"));
            }
            if report.rasters.is_empty() {
                if !entry.has_error() {
                    entry.write_error(format!("{} produced no raster", product.file));
                }
                return Ok(());
            }

            let mut outputs = JsonMap::new();
            outputs.insert("flood".into(), Value::from(dataset.id));
            entry.set_outputs(outputs);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geonet_store::MemoryBlobStore;
    use pretty_assertions::assert_eq;

    fn product() -> FloodProduct {
        FloodProduct {
            precipitation_chart: "design_storm_24h".into(),
            likelihood: 0.1,
            time_period: "2030-2050".into(),
            file: "design_storm_24h_2030-2050_10pct.tif".into(),
        }
    }

    #[test]
    fn catalog_lookup_tolerates_float_noise() {
        let analysis = FloodSimulation::new(FloodConfig::default(), true);
        let found = analysis.find("design_storm_24h", 0.1 + 1e-12, "2030-2050");
        assert_eq!(found, Some(&product()));
        assert!(analysis.find("design_storm_24h", 0.3, "2030-2050").is_none());
    }

    #[tokio::test]
    async fn cached_products_skip_the_network() {
        let blobs = MemoryBlobStore::new();
        blobs
            .put("flood_products/design_storm_24h_2030-2050_10pct.tif", vec![1, 2, 3])
            .await
            .unwrap();
        let bytes = fetch_product(&blobs, &reqwest::Client::new(), None, &product())
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn uncached_product_without_url_fails() {
        let blobs = MemoryBlobStore::new();
        let err = fetch_product(&blobs, &reqwest::Client::new(), None, &product())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::DownloadError(_)));
    }

    #[test]
    fn options_list_distinct_catalog_values() {
        let analysis = FloodSimulation::new(FloodConfig::default(), true);
        let options = analysis.catalog_options();
        assert_eq!(options["likelihood"], json!([0.02, 0.04, 0.1, 0.2]));
        assert_eq!(options["time_period"], json!(["2030-2050", "2080-2100"]));
    }
}
