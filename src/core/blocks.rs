//! Block iteration over a raster band's pixel grid
//!
//! Blocks are laid out row-major starting at the top-left pixel. Edge blocks
//! are truncated to the raster extent, never padded, so the windows of one
//! layout cover every pixel exactly once.

use crate::core::nodata::Nodata;
use crate::types::{RasterError, RasterResult};
use gdal::Dataset;
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// Default memory budget for one block read as `f64` (2^16 pixels)
pub const DEFAULT_MAX_BLOCK_BYTES: usize = (1 << 16) * std::mem::size_of::<f64>();

/// Pixel window of one block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockWindow {
    pub x_offset: usize,
    pub y_offset: usize,
    pub width: usize,
    pub height: usize,
}

impl BlockWindow {
    /// Shape of the block as an ndarray `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// GDAL window offset
    pub fn offset(&self) -> (isize, isize) {
        (self.x_offset as isize, self.y_offset as isize)
    }

    /// GDAL window size `(x, y)`
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

/// Block shape chosen for a raster of a given size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    /// Raster size `(cols, rows)`
    pub raster_size: (usize, usize),
    /// Block size `(cols, rows)`
    pub block_size: (usize, usize),
}

impl BlockLayout {
    /// Grow the native block of a band until it fills `max_block_bytes`
    ///
    /// The block is first widened by a whole multiple of its width, then made
    /// taller by a whole multiple of its height. Neither dimension exceeds the
    /// raster. A zero budget keeps the native block size.
    pub fn new(
        raster_size: (usize, usize),
        native_block_size: (usize, usize),
        max_block_bytes: usize,
    ) -> Self {
        let (n_cols, n_rows) = raster_size;
        let mut cols_per_block = native_block_size.0.clamp(1, n_cols.max(1));
        let mut rows_per_block = native_block_size.1.clamp(1, n_rows.max(1));

        let largest_block = max_block_bytes / std::mem::size_of::<f64>();
        if largest_block > 0 {
            let width_factor = largest_block / (cols_per_block * rows_per_block);
            if width_factor > 0 {
                cols_per_block = (cols_per_block * width_factor).min(n_cols.max(1));
            }
            let height_factor = largest_block / (cols_per_block * rows_per_block);
            if height_factor > 0 {
                rows_per_block = (rows_per_block * height_factor).min(n_rows.max(1));
            }
        }

        Self {
            raster_size,
            block_size: (cols_per_block, rows_per_block),
        }
    }

    /// Layout with an explicit block size, no budget growth
    pub fn with_block_size(raster_size: (usize, usize), block_size: (usize, usize)) -> Self {
        Self::new(raster_size, block_size, 0)
    }

    /// Number of blocks per row and per column
    pub fn grid_shape(&self) -> (usize, usize) {
        let (n_cols, n_rows) = self.raster_size;
        let (bw, bh) = self.block_size;
        (n_cols.div_ceil(bw), n_rows.div_ceil(bh))
    }

    pub fn block_count(&self) -> usize {
        let (x_blocks, y_blocks) = self.grid_shape();
        x_blocks * y_blocks
    }

    /// Offsets-only iteration; every call starts again at the first block
    pub fn windows(&self) -> BlockWindows {
        BlockWindows {
            layout: *self,
            index: 0,
            count: self.block_count(),
        }
    }
}

/// Row-major iterator over the windows of a [`BlockLayout`]
#[derive(Debug, Clone)]
pub struct BlockWindows {
    layout: BlockLayout,
    index: usize,
    count: usize,
}

impl Iterator for BlockWindows {
    type Item = BlockWindow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        let (x_blocks, _) = self.layout.grid_shape();
        let (n_cols, n_rows) = self.layout.raster_size;
        let (bw, bh) = self.layout.block_size;

        let x_offset = (self.index % x_blocks) * bw;
        let y_offset = (self.index / x_blocks) * bh;
        self.index += 1;

        Some(BlockWindow {
            x_offset,
            y_offset,
            width: bw.min(n_cols - x_offset),
            height: bh.min(n_rows - y_offset),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BlockWindows {}

/// Streaming reader for one band of a raster on disk
pub struct BlockReader {
    path: PathBuf,
    dataset: Dataset,
    band: usize,
    layout: BlockLayout,
    nodata: Nodata,
}

impl BlockReader {
    /// Open `band` (1-based) of the raster at `path` with the default block budget
    pub fn open<P: AsRef<Path>>(path: P, band: usize) -> RasterResult<Self> {
        Self::open_with_budget(path, band, DEFAULT_MAX_BLOCK_BYTES)
    }

    pub fn open_with_budget<P: AsRef<Path>>(
        path: P,
        band: usize,
        max_block_bytes: usize,
    ) -> RasterResult<Self> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening {} band {} for block reads", path.display(), band);

        let dataset = Dataset::open(&path)?;
        let band_count = dataset.raster_count() as usize;
        if band == 0 || band > band_count {
            return Err(RasterError::InvalidInput(format!(
                "Band {} out of range for {} ({} bands)",
                band,
                path.display(),
                band_count
            )));
        }

        let rasterband = dataset.rasterband(band as isize)?;
        let floating = matches!(
            rasterband.band_type(),
            gdal::raster::GdalDataType::Float32 | gdal::raster::GdalDataType::Float64
        );
        let nodata = Nodata::for_band(rasterband.no_data_value(), floating);
        let layout = BlockLayout::new(rasterband.size(), rasterband.block_size(), max_block_bytes);
        drop(rasterband);

        Ok(Self {
            path,
            dataset,
            band,
            layout,
            nodata,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    pub fn nodata(&self) -> Nodata {
        self.nodata
    }

    /// Raster size `(cols, rows)`
    pub fn raster_size(&self) -> (usize, usize) {
        self.layout.raster_size
    }

    /// Read an arbitrary window as `f64`, shaped `(rows, cols)`
    pub fn read_window(&self, window: &BlockWindow) -> RasterResult<Array2<f64>> {
        let rasterband = self.dataset.rasterband(self.band as isize)?;
        let buffer = rasterband.read_as::<f64>(window.offset(), window.size(), window.size(), None)?;

        Array2::from_shape_vec(window.shape(), buffer.data).map_err(|e| {
            RasterError::Processing(format!(
                "Failed to reshape block at ({}, {}) of {}: {}",
                window.x_offset,
                window.y_offset,
                self.path.display(),
                e
            ))
        })
    }

    /// Lazily read every block in row-major order
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            reader: self,
            windows: self.layout.windows(),
        }
    }
}

/// Iterator returned by [`BlockReader::blocks`]
pub struct Blocks<'a> {
    reader: &'a BlockReader,
    windows: BlockWindows,
}

impl<'a> Iterator for Blocks<'a> {
    type Item = RasterResult<(BlockWindow, Array2<f64>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let window = self.windows.next()?;
        Some(self.reader.read_window(&window).map(|data| (window, data)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.windows.size_hint()
    }
}
