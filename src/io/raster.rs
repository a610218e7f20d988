use crate::core::blocks::BlockWindow;
use crate::types::{GeoTransform, RasterDataType, RasterError, RasterResult};
use gdal::raster::{Buffer, GdalDataType, GdalType, RasterBand, RasterCreationOption};
use gdal::{Dataset, DriverManager};
use ndarray::{Array2, ArrayView2};
use num_traits::NumCast;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tolerance used when comparing cell sizes of two rasters
const CELL_SIZE_TOLERANCE: f64 = 1e-9;

/// Default GeoTIFF creation options: tiled, LZW compressed, 256x256 blocks
pub const DEFAULT_GTIFF_CREATION_OPTIONS: &[(&str, &str)] = &[
    ("TILED", "YES"),
    ("BIGTIFF", "IF_SAFER"),
    ("COMPRESS", "LZW"),
    ("BLOCKXSIZE", "256"),
    ("BLOCKYSIZE", "256"),
];

/// Per-band metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandInfo {
    pub datatype: Option<RasterDataType>,
    pub nodata: Option<f64>,
    /// Native block size `(cols, rows)`
    pub block_size: (usize, usize),
}

/// Metadata snapshot of a raster on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterInfo {
    /// Raster size `(cols, rows)`
    pub size: (usize, usize),
    pub geo_transform: GeoTransform,
    /// Projection as WKT, empty when the raster has none
    pub projection: String,
    pub bands: Vec<BandInfo>,
}

impl RasterInfo {
    pub fn open<P: AsRef<Path>>(path: P) -> RasterResult<Self> {
        let dataset = Dataset::open(path.as_ref())?;
        Self::from_dataset(&dataset)
    }

    pub fn from_dataset(dataset: &Dataset) -> RasterResult<Self> {
        let band_count = dataset.raster_count();
        let mut bands = Vec::with_capacity(band_count as usize);
        for index in 1..=band_count {
            let band = dataset.rasterband(index)?;
            bands.push(BandInfo {
                datatype: datatype_from_gdal(band.band_type()),
                nodata: band.no_data_value(),
                block_size: band.block_size(),
            });
        }

        // A raster without georeferencing still has a pixel grid
        let geo_transform = dataset
            .geo_transform()
            .unwrap_or([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

        Ok(Self {
            size: dataset.raster_size(),
            geo_transform,
            projection: dataset.projection(),
            bands,
        })
    }

    /// Cell size `(pixel_width, pixel_height)` in coordinate units
    pub fn cell_size(&self) -> (f64, f64) {
        (self.geo_transform[1], self.geo_transform[5])
    }

    pub fn band(&self, band: usize) -> RasterResult<&BandInfo> {
        band.checked_sub(1)
            .and_then(|index| self.bands.get(index))
            .ok_or_else(|| {
                RasterError::InvalidInput(format!(
                    "Band {} out of range ({} bands)",
                    band,
                    self.bands.len()
                ))
            })
    }

    /// Same pixel grid dimensions and cell size as `other`
    pub fn is_aligned_with(&self, other: &RasterInfo) -> bool {
        let (w1, h1) = self.cell_size();
        let (w2, h2) = other.cell_size();
        self.size == other.size
            && approx::abs_diff_eq!(w1, w2, epsilon = CELL_SIZE_TOLERANCE)
            && approx::abs_diff_eq!(h1, h2, epsilon = CELL_SIZE_TOLERANCE)
    }
}

/// Map a GDAL band type onto the datatypes this crate writes
pub fn datatype_from_gdal(datatype: GdalDataType) -> Option<RasterDataType> {
    match datatype {
        GdalDataType::UInt8 => Some(RasterDataType::Byte),
        GdalDataType::UInt16 => Some(RasterDataType::UInt16),
        GdalDataType::Int16 => Some(RasterDataType::Int16),
        GdalDataType::UInt32 => Some(RasterDataType::UInt32),
        GdalDataType::Int32 => Some(RasterDataType::Int32),
        GdalDataType::Float32 => Some(RasterDataType::Float32),
        GdalDataType::Float64 => Some(RasterDataType::Float64),
        _ => None,
    }
}

/// Everything needed to create a new single band raster
#[derive(Debug, Clone)]
pub struct RasterCreateParams<'a> {
    pub driver: &'a str,
    pub creation_options: &'a [(String, String)],
    pub size: (usize, usize),
    pub geo_transform: GeoTransform,
    pub projection: &'a str,
    pub datatype: RasterDataType,
    pub nodata: Option<f64>,
}

/// Create a single band raster, overwriting any existing file
pub fn create_raster<P: AsRef<Path>>(path: P, params: &RasterCreateParams<'_>) -> RasterResult<Dataset> {
    match params.datatype {
        RasterDataType::Byte => create_typed::<u8>(path.as_ref(), params),
        RasterDataType::UInt16 => create_typed::<u16>(path.as_ref(), params),
        RasterDataType::Int16 => create_typed::<i16>(path.as_ref(), params),
        RasterDataType::UInt32 => create_typed::<u32>(path.as_ref(), params),
        RasterDataType::Int32 => create_typed::<i32>(path.as_ref(), params),
        RasterDataType::Float32 => create_typed::<f32>(path.as_ref(), params),
        RasterDataType::Float64 => create_typed::<f64>(path.as_ref(), params),
    }
}

fn create_typed<T: GdalType>(path: &Path, params: &RasterCreateParams<'_>) -> RasterResult<Dataset> {
    log::debug!(
        "Creating {} {}x{} {} raster at {}",
        params.driver,
        params.size.0,
        params.size.1,
        params.datatype,
        path.display()
    );

    let driver = DriverManager::get_driver_by_name(params.driver)?;
    let options: Vec<RasterCreationOption> = params
        .creation_options
        .iter()
        .map(|(key, value)| RasterCreationOption {
            key: key.as_str(),
            value: value.as_str(),
        })
        .collect();

    let mut dataset = driver.create_with_band_type_with_options::<T, _>(
        path,
        params.size.0 as isize,
        params.size.1 as isize,
        1,
        &options,
    )?;
    dataset.set_geo_transform(&params.geo_transform)?;
    if !params.projection.is_empty() {
        dataset.set_projection(params.projection)?;
    }
    if let Some(nodata) = params.nodata {
        let mut band = dataset.rasterband(1)?;
        band.set_no_data_value(Some(nodata))?;
    }
    Ok(dataset)
}

/// Cast a block to the band's datatype and write it at `window`
pub fn write_window(
    band: &mut RasterBand<'_>,
    datatype: RasterDataType,
    window: &BlockWindow,
    block: &ArrayView2<'_, f64>,
) -> RasterResult<()> {
    match datatype {
        RasterDataType::Byte => write_typed::<u8>(band, datatype, window, block),
        RasterDataType::UInt16 => write_typed::<u16>(band, datatype, window, block),
        RasterDataType::Int16 => write_typed::<i16>(band, datatype, window, block),
        RasterDataType::UInt32 => write_typed::<u32>(band, datatype, window, block),
        RasterDataType::Int32 => write_typed::<i32>(band, datatype, window, block),
        RasterDataType::Float32 => write_typed::<f32>(band, datatype, window, block),
        RasterDataType::Float64 => write_typed::<f64>(band, datatype, window, block),
    }
}

fn write_typed<T: GdalType + Copy + NumCast>(
    band: &mut RasterBand<'_>,
    datatype: RasterDataType,
    window: &BlockWindow,
    block: &ArrayView2<'_, f64>,
) -> RasterResult<()> {
    if block.dim() != window.shape() {
        return Err(RasterError::ShapeMismatch(format!(
            "Block shape {:?} does not match window {:?}",
            block.dim(),
            window.shape()
        )));
    }

    // Row-major iteration matches GDAL's buffer layout
    let data = block
        .iter()
        .map(|&v| {
            <T as NumCast>::from(v).ok_or_else(|| {
                RasterError::Processing(format!("Value {} cannot be stored as {}", v, datatype))
            })
        })
        .collect::<RasterResult<Vec<T>>>()?;

    let buffer = Buffer::new(window.size(), data);
    band.write(window.offset(), window.size(), &buffer)?;
    Ok(())
}

/// Write an in-memory array as a new single band raster
///
/// Intended for small rasters (tests, lookup grids); large outputs should go
/// through the raster calculator instead.
pub fn array_to_raster<P: AsRef<Path>>(
    array: &Array2<f64>,
    path: P,
    datatype: RasterDataType,
    nodata: Option<f64>,
    geo_transform: GeoTransform,
    projection: &str,
) -> RasterResult<()> {
    let (rows, cols) = array.dim();
    let params = RasterCreateParams {
        driver: "GTiff",
        creation_options: &[],
        size: (cols, rows),
        geo_transform,
        projection,
        datatype,
        nodata,
    };
    let dataset = create_raster(path, &params)?;
    let mut band = dataset.rasterband(1)?;
    let window = BlockWindow {
        x_offset: 0,
        y_offset: 0,
        width: cols,
        height: rows,
    };
    write_window(&mut band, datatype, &window, &array.view())
}

/// Read a whole band as `f64`
pub fn raster_to_array<P: AsRef<Path>>(path: P, band: usize) -> RasterResult<Array2<f64>> {
    let dataset = Dataset::open(path.as_ref())?;
    let rasterband = dataset.rasterband(band as isize)?;
    let (width, height) = rasterband.size();
    let buffer = rasterband.read_as::<f64>((0, 0), (width, height), (width, height), None)?;

    Array2::from_shape_vec((height, width), buffer.data)
        .map_err(|e| RasterError::Processing(format!("Failed to reshape raster data: {}", e)))
}
