//! # Geonet Conversion
//!
//! Normalizes uploads into the canonical records the rest of the pipeline reads.
//!
//! ```text
//! *.zip (shapefile parts / GeoJSON) ─┐
//! *.json, *.geojson ─────────────────┼──> VectorSource (WGS84) ──> GeoJSON blob + VectorFeature rows
//! *.tif, *.tiff ──> RasterImage ──> header.json + tiles/{frame}/{x}_{y}.f32.gz ──> RasterData
//! ```
//!
//! Reprojection covers EPSG:4326 and EPSG:3857; other systems are logged and passed through.

mod converter;
mod crs;
mod error;
mod raster;
mod vector;

pub use converter::{ConversionOptions, ConversionReport, Converter, InputFile};
pub use crs::Crs;
pub use error::{ConversionError, Result};
pub use raster::{decode_geotiff, write_tiled, RasterImage, RasterReader, DEFAULT_TILE_SIZE};
pub use vector::{read_geojson, read_zip, write_geojson, VectorSource};
