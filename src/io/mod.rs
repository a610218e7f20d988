//! I/O modules for rasters and lookup tables

pub mod raster;
pub mod table;

pub use raster::{array_to_raster, raster_to_array, BandInfo, RasterInfo};
pub use table::{read_lookup_table, ValueColumn};
