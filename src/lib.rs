//! rastercalc: blockwise, nodata-aware raster algebra
//!
//! Streams aligned GDAL rasters block by block through pure per-block
//! operators (sums tolerant of holes, masks, thresholds, clamps, lookup table
//! reclassification, ...) and writes the result as a new raster, never
//! holding a whole raster in memory.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    Comparison, GeoTransform, RasterDataType, RasterError, RasterResult, RawConstant, SourceTerm,
};

pub use crate::core::{
    BlockInput, BlockLayout, BlockReader, BlockWindow, CalculatorConfig, LookupTable, Nodata,
    ProcessingContext, RasterCalculator, RasterOperator,
};
pub use io::{array_to_raster, raster_to_array, RasterInfo};
