//! Core blockwise raster algebra modules

pub mod blocks;
pub mod nodata;
pub mod operators;
pub mod reclassify;
pub mod cdf;
pub mod context;
pub mod calculator;
pub mod statistics;
#[cfg(feature = "parallel")]
pub mod pipeline;

// Re-export main types
pub use blocks::{BlockLayout, BlockReader, BlockWindow, DEFAULT_MAX_BLOCK_BYTES};
pub use nodata::{BlockInput, Nodata, NodataMatching};
pub use operators::{
    Add, AddWithHoles, Clamp, Divide, FnOperator, Mask, Multiply, RasterOperator, ReplaceNodata,
    Subtract, SubtractWithHoles, Threshold,
};
pub use reclassify::{LookupTable, Reclassify, UnmappedPolicy};
pub use cdf::interpolate_plateaus;
pub use context::ProcessingContext;
pub use calculator::{CalculatorConfig, RasterCalculator};
pub use statistics::{raster_percentiles, raster_statistics, RasterStatistics};
#[cfg(feature = "parallel")]
pub use pipeline::{CalculatorJob, Pipeline};
