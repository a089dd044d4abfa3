use crate::crs::Crs;
use crate::error::{ConversionError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use geonet_protocol::{GeoTransform, RasterData, RasterHeader};
use geonet_store::BlobStore;
use ndarray::Array2;
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

pub const DEFAULT_TILE_SIZE: u32 = 256;

const PROJECTED_CS_TYPE_KEY: u16 = 3072;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;

/// A decoded raster held in memory: one row-major `f32` buffer per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub frames: Vec<Vec<f32>>,
    pub transform: GeoTransform,
    pub nodata: Option<f64>,
    pub crs: Crs,
}

/// Decode a (Geo)TIFF. Every page and every sample band becomes one frame; pages whose size
/// differs from the first page are skipped.
pub fn decode_geotiff(bytes: &[u8]) -> Result<RasterImage> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?;
    let (width, height) = decoder.dimensions()?;
    let transform = read_transform(&mut decoder);
    let crs = read_crs(&mut decoder);
    let nodata = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|text| text.trim_matches(|c: char| c.is_whitespace() || c == '\0').parse().ok());

    let pixels = width as usize * height as usize;
    if pixels == 0 {
        return Err(ConversionError::InvalidRaster("raster has no pixels".into()));
    }
    let mut frames = Vec::new();
    let mut page = 0usize;
    loop {
        if decoder.dimensions()? == (width, height) {
            let samples = samples_as_f32(decoder.read_image()?);
            let bands = samples.len() / pixels;
            if bands == 0 {
                return Err(ConversionError::InvalidRaster(format!(
                    "page {page} holds {} samples for {pixels} pixels",
                    samples.len()
                )));
            }
            for band in 0..bands {
                frames.push(samples.iter().skip(band).step_by(bands).copied().collect());
            }
        } else {
            log::warn!("Skipping TIFF page {page}: size differs from the first page");
        }
        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
        page += 1;
    }

    log::debug!("Decoded {width}x{height} raster with {} frame(s)", frames.len());
    Ok(RasterImage {
        width,
        height,
        frames,
        transform,
        nodata,
        crs,
    })
}

fn samples_as_f32(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
    }
}

fn read_transform<R: Read + std::io::Seek>(decoder: &mut Decoder<R>) -> GeoTransform {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok();
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok();
    match (scale.as_deref(), tiepoint.as_deref()) {
        (Some([sx, sy, ..]), Some([i, j, _, x, y, ..])) => GeoTransform {
            origin_x: x - i * sx,
            origin_y: y + j * sy,
            pixel_width: *sx,
            pixel_height: -sy,
        },
        _ => {
            log::warn!("TIFF carries no georeferencing tags; using pixel coordinates");
            GeoTransform::default()
        }
    }
}

fn read_crs<R: Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Crs {
    let Ok(keys) = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag) else {
        return Crs::Wgs84;
    };
    let mut geographic = None;
    for entry in keys.get(4..).unwrap_or_default().chunks_exact(4) {
        // Only inline values (location 0) carry an EPSG code directly.
        if let &[key, 0, _, value] = entry {
            match key {
                PROJECTED_CS_TYPE_KEY => return Crs::from_epsg(u32::from(value)),
                GEOGRAPHIC_TYPE_KEY => geographic = Some(Crs::from_epsg(u32::from(value))),
                _ => {}
            }
        }
    }
    geographic.unwrap_or(Crs::Wgs84)
}

fn header_key(prefix: &str) -> String {
    format!("{prefix}/header.json")
}

fn tile_key(prefix: &str, frame: u32, tile_x: u32, tile_y: u32) -> String {
    format!("{prefix}/tiles/{frame}/{tile_x}_{tile_y}.f32.gz")
}

fn tile_extent(header: &RasterHeader, tile_x: u32, tile_y: u32) -> (usize, usize) {
    let size = header.tile_size.max(1);
    let cols = size.min(header.width - tile_x * size);
    let rows = size.min(header.height - tile_y * size);
    (cols as usize, rows as usize)
}

fn encode_tile(values: &[f32]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(values.len()), Compression::default());
    for value in values {
        encoder.write_all(&value.to_le_bytes())?;
    }
    Ok(encoder.finish()?)
}

fn decode_tile(bytes: &[u8]) -> Result<Vec<f32>> {
    let mut raw = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut raw)?;
    Ok(raw
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Store `image` under `prefix` as a header blob plus one compressed tile per
/// (frame, tile column, tile row). Edge tiles are clipped to the raster.
pub async fn write_tiled(
    blobs: &dyn BlobStore,
    prefix: &str,
    image: &RasterImage,
    tile_size: u32,
) -> Result<RasterHeader> {
    let header = RasterHeader {
        width: image.width,
        height: image.height,
        frames: u32::try_from(image.frames.len())
            .map_err(|_| ConversionError::InvalidRaster("too many frames".into()))?,
        tile_size: tile_size.max(1),
        transform: image.transform,
        nodata: image.nodata,
        crs: image.crs.code(),
    };
    let width = image.width as usize;
    let size = header.tile_size as usize;

    for (frame, values) in image.frames.iter().enumerate() {
        if values.len() != width * image.height as usize {
            return Err(ConversionError::InvalidRaster(format!(
                "frame {frame} holds {} values for a {}x{} raster",
                values.len(),
                image.width,
                image.height
            )));
        }
        for tile_y in 0..header.tiles_y() {
            for tile_x in 0..header.tiles_x() {
                let (cols, rows) = tile_extent(&header, tile_x, tile_y);
                let col0 = tile_x as usize * size;
                let row0 = tile_y as usize * size;
                let mut tile = Vec::with_capacity(cols * rows);
                for row in row0..row0 + rows {
                    let start = row * width + col0;
                    tile.extend_from_slice(&values[start..start + cols]);
                }
                let key = tile_key(prefix, frame as u32, tile_x, tile_y);
                blobs.put(&key, encode_tile(&tile)?).await?;
            }
        }
    }
    blobs
        .put(&header_key(prefix), serde_json::to_vec_pretty(&header)?)
        .await?;
    log::info!(
        "Stored raster {prefix} ({}x{}, {} frame(s), {}x{} tiles)",
        header.width,
        header.height,
        header.frames,
        header.tiles_x(),
        header.tiles_y()
    );
    Ok(header)
}

/// Windowed reader over a tiled raster; only tiles intersecting a window are fetched, and
/// fetched tiles are cached for the reader's lifetime.
pub struct RasterReader {
    blobs: Arc<dyn BlobStore>,
    prefix: String,
    header: RasterHeader,
    crs: Crs,
    tiles: HashMap<(u32, u32, u32), Arc<Vec<f32>>>,
}

impl RasterReader {
    pub async fn open(blobs: Arc<dyn BlobStore>, prefix: &str) -> Result<Self> {
        let header: RasterHeader = serde_json::from_slice(&blobs.get(&header_key(prefix)).await?)?;
        Ok(Self::with_header(blobs, prefix, header))
    }

    #[must_use]
    pub fn for_record(blobs: Arc<dyn BlobStore>, raster: &RasterData) -> Self {
        Self::with_header(blobs, &raster.blob_prefix, raster.header.clone())
    }

    fn with_header(blobs: Arc<dyn BlobStore>, prefix: &str, header: RasterHeader) -> Self {
        let crs = header.crs.as_deref().map_or(Crs::Wgs84, Crs::from_name);
        Self {
            blobs,
            prefix: prefix.to_string(),
            header,
            crs,
            tiles: HashMap::new(),
        }
    }

    #[must_use]
    pub fn header(&self) -> &RasterHeader {
        &self.header
    }

    async fn tile(&mut self, frame: u32, tile_x: u32, tile_y: u32) -> Result<Arc<Vec<f32>>> {
        if let Some(tile) = self.tiles.get(&(frame, tile_x, tile_y)) {
            return Ok(tile.clone());
        }
        let bytes = self
            .blobs
            .get(&tile_key(&self.prefix, frame, tile_x, tile_y))
            .await?;
        let tile = Arc::new(decode_tile(&bytes)?);
        let (cols, rows) = tile_extent(&self.header, tile_x, tile_y);
        if tile.len() != cols * rows {
            return Err(ConversionError::InvalidRaster(format!(
                "tile {frame}/{tile_x}_{tile_y} holds {} values, expected {}",
                tile.len(),
                cols * rows
            )));
        }
        self.tiles.insert((frame, tile_x, tile_y), tile.clone());
        Ok(tile)
    }

    /// Pixels of `frame` in the window starting at (`col`, `row`). Cells outside the raster
    /// and nodata cells are NaN.
    pub async fn read_window(
        &mut self,
        frame: u32,
        col: i64,
        row: i64,
        cols: usize,
        rows: usize,
    ) -> Result<Array2<f32>> {
        if frame >= self.header.frames {
            return Err(ConversionError::InvalidRaster(format!(
                "frame {frame} out of range (raster has {})",
                self.header.frames
            )));
        }
        if rows.checked_mul(cols).is_none() || i64::try_from(cols.max(rows)).is_err() {
            return Err(ConversionError::InvalidRaster(format!(
                "window of {cols}x{rows} pixels is too large"
            )));
        }
        let mut window = Array2::from_elem((rows, cols), f32::NAN);
        let width = i64::from(self.header.width);
        let height = i64::from(self.header.height);
        let col_start = col.max(0);
        let col_end = col.saturating_add(cols as i64).min(width);
        let row_start = row.max(0);
        let row_end = row.saturating_add(rows as i64).min(height);
        if col_start >= col_end || row_start >= row_end {
            return Ok(window);
        }

        let size = i64::from(self.header.tile_size.max(1));
        let nodata = self.header.nodata.map(|v| v as f32);
        for tile_y in (row_start / size)..=((row_end - 1) / size) {
            for tile_x in (col_start / size)..=((col_end - 1) / size) {
                let tile = self.tile(frame, tile_x as u32, tile_y as u32).await?;
                let (tile_cols, _) = tile_extent(&self.header, tile_x as u32, tile_y as u32);
                let r0 = row_start.max(tile_y * size);
                let r1 = row_end.min((tile_y + 1) * size);
                let c0 = col_start.max(tile_x * size);
                let c1 = col_end.min((tile_x + 1) * size);
                for r in r0..r1 {
                    for c in c0..c1 {
                        let offset = (r - tile_y * size) as usize * tile_cols
                            + (c - tile_x * size) as usize;
                        let value = tile[offset];
                        if Some(value) != nodata {
                            window[[(r - row) as usize, (c - col) as usize]] = value;
                        }
                    }
                }
            }
        }
        Ok(window)
    }

    /// Window covering the lon/lat box `center ± (dlon, dlat)`, in the raster's own CRS.
    pub async fn window_around(
        &mut self,
        frame: u32,
        lon: f64,
        lat: f64,
        dlon: f64,
        dlat: f64,
    ) -> Result<Array2<f32>> {
        let corners = [
            self.crs.from_wgs84(lon - dlon, lat - dlat),
            self.crs.from_wgs84(lon + dlon, lat + dlat),
        ];
        let pixels: Vec<(f64, f64)> = corners
            .iter()
            .map(|&(x, y)| self.header.transform.world_to_pixel(x, y))
            .collect();
        let width = f64::from(self.header.width);
        let height = f64::from(self.header.height);
        let col_range = clip_pixels(pixels[0].0, pixels[1].0, width);
        let row_range = clip_pixels(pixels[0].1, pixels[1].1, height);
        let (Some((col0, col1)), Some((row0, row1))) = (col_range, row_range) else {
            return Ok(Array2::from_elem((0, 0), f32::NAN));
        };
        let cols = (col1 - col0 + 1) as usize;
        let rows = (row1 - row0 + 1) as usize;
        self.read_window(frame, col0, row0, cols, rows).await
    }

    /// Largest valid value within the lon/lat box, or `None` when every cell is NaN.
    pub async fn max_around(
        &mut self,
        frame: u32,
        lon: f64,
        lat: f64,
        dlon: f64,
        dlat: f64,
    ) -> Result<Option<f32>> {
        let window = self.window_around(frame, lon, lat, dlon, dlat).await?;
        Ok(window
            .iter()
            .copied()
            .filter(|value| !value.is_nan())
            .fold(None, |best: Option<f32>, value| {
                Some(best.map_or(value, |b| b.max(value)))
            }))
    }
}

/// Inclusive pixel span covering world-space edges `a` and `b`, clipped to `0..extent`.
/// `None` when the span misses the raster entirely.
fn clip_pixels(a: f64, b: f64, extent: f64) -> Option<(i64, i64)> {
    if a.is_nan() || b.is_nan() || extent < 1.0 {
        return None;
    }
    let low = a.min(b).floor().max(0.0);
    let high = a.max(b).floor().min(extent - 1.0);
    if low > high {
        return None;
    }
    Some((low as i64, high as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geonet_store::MemoryBlobStore;
    use pretty_assertions::assert_eq;

    fn ramp(width: u32, height: u32, frames: usize) -> RasterImage {
        RasterImage {
            width,
            height,
            frames: (0..frames)
                .map(|f| {
                    (0..width * height)
                        .map(|i| (i + f as u32 * 1000) as f32)
                        .collect()
                })
                .collect(),
            transform: GeoTransform {
                origin_x: 10.0,
                origin_y: 20.0,
                pixel_width: 0.5,
                pixel_height: -0.5,
            },
            nodata: Some(-9999.0),
            crs: Crs::Wgs84,
        }
    }

    #[tokio::test]
    async fn windows_span_tile_boundaries() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let image = ramp(5, 4, 2);
        let header = write_tiled(blobs.as_ref(), "rasters/1/ramp", &image, 2).await.unwrap();
        assert_eq!((header.tiles_x(), header.tiles_y(), header.frames), (3, 2, 2));

        let mut reader = RasterReader::open(blobs.clone(), "rasters/1/ramp").await.unwrap();
        let window = reader.read_window(1, 1, 1, 3, 2).await.unwrap();
        // row 1: 6 7 8, row 2: 11 12 13, offset by frame 1
        assert_eq!(window[[0, 0]], 1006.0);
        assert_eq!(window[[1, 2]], 1013.0);

        let clipped = reader.read_window(0, 4, 3, 2, 2).await.unwrap();
        assert_eq!(clipped[[0, 0]], 19.0);
        assert!(clipped[[1, 1]].is_nan());
    }

    #[tokio::test]
    async fn nodata_is_ignored_by_max() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let mut image = ramp(2, 2, 1);
        image.frames[0] = vec![-9999.0, 0.25, 0.75, -9999.0];
        write_tiled(blobs.as_ref(), "rasters/2/depth", &image, 256).await.unwrap();
        let mut reader = RasterReader::open(blobs, "rasters/2/depth").await.unwrap();

        // Pixel centers sit at lon 10.25/10.75 and lat 19.75/19.25.
        let max = reader.max_around(0, 10.5, 19.5, 0.5, 0.5).await.unwrap();
        assert_eq!(max, Some(0.75));
        let none = reader.max_around(0, 10.25, 19.75, 0.1, 0.1).await.unwrap();
        assert_eq!(none, None);
        assert!(reader.read_window(1, 0, 0, 1, 1).await.is_err());
    }

    #[tokio::test]
    async fn huge_radius_is_clipped_to_the_raster() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let mut image = ramp(2, 2, 1);
        image.transform = GeoTransform {
            origin_x: 0.0,
            origin_y: 0.0002,
            pixel_width: 0.0001,
            pixel_height: -0.0001,
        };
        image.frames[0] = vec![0.5, 1.5, 2.5, 3.5];
        write_tiled(blobs.as_ref(), "rasters/3/depth", &image, 256).await.unwrap();
        let mut reader = RasterReader::open(blobs, "rasters/3/depth").await.unwrap();

        let window = reader.window_around(0, 0.0001, 0.0001, 2.0, 2.0).await.unwrap();
        assert_eq!(window.dim(), (2, 2));
        let max = reader.max_around(0, 0.0001, 0.0001, 2.0, 2.0).await.unwrap();
        assert_eq!(max, Some(3.5));
        let everything = reader.max_around(0, 0.0, 0.0, 1e12, 1e12).await.unwrap();
        assert_eq!(everything, Some(3.5));
        let outside = reader.max_around(0, 50.0, 50.0, 0.001, 0.001).await.unwrap();
        assert_eq!(outside, None);
    }

    #[tokio::test]
    async fn oversized_windows_are_rejected() {
        let blobs = Arc::new(MemoryBlobStore::new());
        write_tiled(blobs.as_ref(), "rasters/4/ramp", &ramp(2, 2, 1), 2).await.unwrap();
        let mut reader = RasterReader::open(blobs, "rasters/4/ramp").await.unwrap();
        assert!(reader.read_window(0, 0, 0, usize::MAX, 2).await.is_err());
    }

    #[test]
    fn pixel_spans_clip_to_the_extent() {
        assert_eq!(clip_pixels(-1e300, 1e300, 4.0), Some((0, 3)));
        assert_eq!(clip_pixels(2.7, 1.2, 4.0), Some((1, 2)));
        assert_eq!(clip_pixels(5.0, 9.0, 4.0), None);
        assert_eq!(clip_pixels(f64::NAN, 1.0, 4.0), None);
    }

    #[test]
    fn tiles_round_trip_through_gzip() {
        let values = vec![0.0, -1.5, f32::MAX, 3.25];
        assert_eq!(decode_tile(&encode_tile(&values).unwrap()).unwrap(), values);
    }
}
