use crate::error::{ConversionError, Result};
use crate::raster::{decode_geotiff, write_tiled, DEFAULT_TILE_SIZE};
use crate::vector::{read_geojson, read_zip, write_geojson, VectorSource};
use geonet_protocol::{Dataset, JsonMap, NewRasterData, NewVectorData, RasterId, VectorId};
use geonet_store::{BlobStore, DatasetStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    fn extension(&self) -> String {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default()
    }

    fn stem(&self) -> &str {
        let base = self.name.rsplit('/').next().unwrap_or(&self.name);
        base.rsplit_once('.').map_or(base, |(stem, _)| stem)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    /// Merge every vector source of the upload into one collection
    pub combine: bool,
    pub tile_size: u32,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            combine: false,
            tile_size: DEFAULT_TILE_SIZE,
        }
    }
}

/// Outcome of one conversion run. Failures are per-file; earlier files stay converted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub rasters: Vec<RasterId>,
    pub vectors: Vec<VectorId>,
    /// Files with an unsupported extension
    pub skipped: Vec<String>,
    /// (file name, error) pairs
    pub failed: Vec<(String, String)>,
}

impl ConversionReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Decoded {
    Vectors(Vec<VectorSource>),
    Raster,
}

/// Turns uploads into canonical raster and vector records of a dataset.
#[derive(Clone)]
pub struct Converter {
    repo: Arc<dyn DatasetStore>,
    blobs: Arc<dyn BlobStore>,
}

impl Converter {
    pub fn new(repo: Arc<dyn DatasetStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { repo, blobs }
    }

    pub async fn convert_dataset(
        &self,
        dataset: &Dataset,
        files: Vec<InputFile>,
        options: &ConversionOptions,
    ) -> ConversionReport {
        let mut report = ConversionReport::default();
        let mut pending_vectors: Vec<VectorSource> = Vec::new();

        for file in &files {
            match self.convert_file(dataset, file, options, &mut report).await {
                Ok(Some(Decoded::Vectors(sources))) if options.combine => {
                    pending_vectors.extend(sources);
                }
                Ok(Some(Decoded::Vectors(sources))) => {
                    for source in sources {
                        self.store_source(dataset, source, &mut report).await;
                    }
                }
                Ok(Some(Decoded::Raster)) => {}
                Ok(None) => {
                    log::warn!("Skipping {}: unsupported file type", file.name);
                    report.skipped.push(file.name.clone());
                }
                Err(e) => {
                    log::warn!("Failed to convert {}: {e}", file.name);
                    report.failed.push((file.name.clone(), e.to_string()));
                }
            }
        }

        if !pending_vectors.is_empty() {
            let combined = VectorSource {
                name: dataset.name.clone(),
                source_files: pending_vectors
                    .iter()
                    .flat_map(|source| source.source_files.iter().cloned())
                    .collect(),
                features: pending_vectors
                    .into_iter()
                    .flat_map(|source| source.features)
                    .collect(),
            };
            self.store_source(dataset, combined, &mut report).await;
        }

        log::info!(
            "Converted dataset {} ({}): {} raster(s), {} vector(s), {} skipped, {} failed",
            dataset.id,
            dataset.name,
            report.rasters.len(),
            report.vectors.len(),
            report.skipped.len(),
            report.failed.len()
        );
        report
    }

    async fn convert_file(
        &self,
        dataset: &Dataset,
        file: &InputFile,
        options: &ConversionOptions,
        report: &mut ConversionReport,
    ) -> Result<Option<Decoded>> {
        match file.extension().as_str() {
            "zip" => {
                let sources = read_zip(&file.bytes)?;
                if sources.is_empty() {
                    return Err(ConversionError::Unsupported(
                        "archive holds no shapefile or GeoJSON".into(),
                    ));
                }
                Ok(Some(Decoded::Vectors(sources)))
            }
            "json" | "geojson" => Ok(Some(Decoded::Vectors(vec![VectorSource {
                name: file.stem().to_string(),
                features: read_geojson(&file.bytes)?,
                source_files: vec![file.name.clone()],
            }]))),
            "tif" | "tiff" => {
                let id = self.store_raster(dataset, file, options.tile_size).await?;
                report.rasters.push(id);
                Ok(Some(Decoded::Raster))
            }
            _ => Ok(None),
        }
    }

    async fn store_raster(&self, dataset: &Dataset, file: &InputFile, tile_size: u32) -> Result<RasterId> {
        let bytes = file.bytes.clone();
        // TIFF decoding is CPU bound.
        let image = tokio::task::spawn_blocking(move || decode_geotiff(&bytes))
            .await
            .map_err(|e| ConversionError::InvalidRaster(format!("decoder task failed: {e}")))??;
        let prefix = format!("rasters/{}/{}", dataset.id, sanitize(file.stem()));
        let header = write_tiled(self.blobs.as_ref(), &prefix, &image, tile_size).await?;

        let mut metadata = JsonMap::new();
        metadata.insert("source_file".into(), json!(file.name));
        let raster = self.repo.create_raster(NewRasterData {
            dataset_id: dataset.id,
            name: file.stem().to_string(),
            blob_prefix: prefix,
            header,
            metadata,
        })?;
        Ok(raster.id)
    }

    async fn store_source(&self, dataset: &Dataset, source: VectorSource, report: &mut ConversionReport) {
        let name = source.name.clone();
        match self.store_vector(dataset, source).await {
            Ok(id) => report.vectors.push(id),
            Err(e) => {
                log::warn!("Failed to store vector {name}: {e}");
                report.failed.push((name, e.to_string()));
            }
        }
    }

    async fn store_vector(&self, dataset: &Dataset, source: VectorSource) -> Result<VectorId> {
        let bytes = write_geojson(&source.features)?;
        let blob_key = self
            .blobs
            .put_content_addressed(&format!("vectors/{}", dataset.id), "geojson", bytes)
            .await?;

        let mut metadata = JsonMap::new();
        metadata.insert("feature_count".into(), json!(source.features.len()));
        metadata.insert("source_files".into(), json!(source.source_files));
        let vector = self.repo.create_vector(NewVectorData {
            dataset_id: dataset.id,
            name: source.name,
            blob_key,
            metadata,
        })?;
        let rows = self.repo.bulk_create_vector_features(vector.id, source.features)?;
        log::debug!("Vector {} stored with {rows} feature rows", vector.id);
        Ok(vector.id)
    }

    /// Read a stored vector back from its blob.
    pub async fn load_vector(&self, vector_id: VectorId) -> Result<Vec<geonet_protocol::GeometryFeature>> {
        let vector = self.repo.get_vector(vector_id)?;
        read_geojson(&self.blobs.get(&vector.blob_key).await?)
    }
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "raster".to_string()
    } else {
        cleaned
    }
}
