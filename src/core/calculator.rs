//! Blockwise raster calculator
//!
//! Streams every aligned raster source block by block through a
//! [`RasterOperator`] and writes the result into one new raster. Only one
//! block per source is held in memory at a time.

use crate::core::blocks::{BlockLayout, BlockReader, BlockWindow, DEFAULT_MAX_BLOCK_BYTES};
use crate::core::context::ProcessingContext;
use crate::core::nodata::{BlockInput, Nodata};
use crate::core::operators::RasterOperator;
use crate::io::raster::{create_raster, write_window, RasterCreateParams, RasterInfo, DEFAULT_GTIFF_CREATION_OPTIONS};
use crate::types::{RasterDataType, RasterError, RasterResult, RawConstant, SourceTerm};
use ndarray::{s, Array2, ArrayView1};
use std::path::Path;

/// Raster calculator settings
#[derive(Debug, Clone)]
pub struct CalculatorConfig {
    /// Memory budget for one block of one source, read as `f64`
    pub max_block_bytes: usize,
    /// Fixed block size `(cols, rows)`; overrides the native block and budget
    pub block_size: Option<(usize, usize)>,
    /// Replace an existing target instead of failing
    pub overwrite: bool,
    /// GDAL driver of the target raster
    pub driver: String,
    pub creation_options: Vec<(String, String)>,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            max_block_bytes: DEFAULT_MAX_BLOCK_BYTES,
            block_size: None,
            overwrite: false,
            driver: "GTiff".to_string(),
            creation_options: DEFAULT_GTIFF_CREATION_OPTIONS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl CalculatorConfig {
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_block_size(mut self, cols: usize, rows: usize) -> Self {
        self.block_size = Some((cols.max(1), rows.max(1)));
        self
    }

    pub fn with_max_block_bytes(mut self, max_block_bytes: usize) -> Self {
        self.max_block_bytes = max_block_bytes;
        self
    }
}

/// A source term after validation against the raster grid
enum ResolvedTerm {
    /// Index into the opened readers
    Raster(usize),
    Raw(RawConstant),
}

/// Slice a raw constant to `window` and broadcast it to the block shape
fn raw_block(raw: &RawConstant, window: &BlockWindow) -> Array2<f64> {
    let shape = window.shape();
    let (x0, y0) = (window.x_offset, window.y_offset);
    let (x1, y1) = (x0 + window.width, y0 + window.height);
    match raw {
        RawConstant::Scalar(v) => Array2::from_elem(shape, *v),
        RawConstant::Row(values) => ArrayView1::from(&values[x0..x1])
            .broadcast(shape)
            .map(|view| view.to_owned())
            .unwrap_or_else(|| Array2::zeros(shape)),
        RawConstant::Column(values) => ArrayView1::from(&values[y0..y1])
            .insert_axis(ndarray::Axis(1))
            .broadcast(shape)
            .map(|view| view.to_owned())
            .unwrap_or_else(|| Array2::zeros(shape)),
        RawConstant::Array(array) => array.slice(s![y0..y1, x0..x1]).to_owned(),
    }
}

/// Check a raw constant broadcasts against a raster of `(cols, rows)`
fn check_raw(raw: &RawConstant, position: usize, (cols, rows): (usize, usize)) -> RasterResult<()> {
    let ok = match raw {
        RawConstant::Scalar(_) => true,
        RawConstant::Row(values) => values.len() == cols,
        RawConstant::Column(values) => values.len() == rows,
        RawConstant::Array(array) => array.dim() == (rows, cols),
    };
    if ok {
        Ok(())
    } else {
        Err(RasterError::ShapeMismatch(format!(
            "Raw term {} does not broadcast against a {}x{} raster",
            position, cols, rows
        )))
    }
}

/// Evaluates operators over aligned rasters, one block at a time
#[derive(Debug, Clone, Default)]
pub struct RasterCalculator {
    config: CalculatorConfig,
}

impl RasterCalculator {
    pub fn new(config: CalculatorConfig) -> Self {
        Self { config }
    }

    /// Calculator with default settings (no overwrite, tiled LZW GeoTIFF)
    pub fn standard() -> Self {
        Self::new(CalculatorConfig::default())
    }

    pub fn config(&self) -> &CalculatorConfig {
        &self.config
    }

    /// Validate sources and target without touching pixel data
    ///
    /// Returns the metadata of the first raster source, which defines the
    /// output grid.
    pub fn validate<P: AsRef<Path>>(
        &self,
        sources: &[SourceTerm],
        target_path: P,
        target_datatype: RasterDataType,
        target_nodata: f64,
    ) -> RasterResult<RasterInfo> {
        let target_path = target_path.as_ref();
        if !target_datatype.can_represent(target_nodata) {
            return Err(RasterError::InvalidInput(format!(
                "Nodata {} cannot be stored as {}",
                target_nodata, target_datatype
            )));
        }

        // An existing target may be the same file as a source under another spelling
        let canonical_target = if target_path.exists() {
            Some(std::fs::canonicalize(target_path)?)
        } else {
            None
        };
        let mut reference: Option<RasterInfo> = None;

        for (position, term) in sources.iter().enumerate() {
            if let SourceTerm::RasterBand { path, band } = term {
                let same_file = match &canonical_target {
                    Some(target) => path.exists() && std::fs::canonicalize(path)? == *target,
                    None => path == target_path,
                };
                if same_file {
                    return Err(RasterError::InvalidInput(format!(
                        "Target {} is also source {}",
                        target_path.display(),
                        position
                    )));
                }
                let info = RasterInfo::open(path)?;
                info.band(*band)?;
                if let Some(first) = &reference {
                    if !first.is_aligned_with(&info) {
                        return Err(RasterError::ShapeMismatch(format!(
                            "{} ({}x{}, cell {:?}) is not aligned with the first raster source ({}x{}, cell {:?})",
                            path.display(),
                            info.size.0,
                            info.size.1,
                            info.cell_size(),
                            first.size.0,
                            first.size.1,
                            first.cell_size()
                        )));
                    }
                } else {
                    reference = Some(info);
                }
            }
        }

        let reference = reference.ok_or_else(|| {
            RasterError::InvalidInput("At least one raster source term is required".to_string())
        })?;

        for (position, term) in sources.iter().enumerate() {
            if let SourceTerm::Raw(raw) = term {
                check_raw(raw, position, reference.size)?;
            }
        }

        if target_path.exists() && !self.config.overwrite {
            return Err(RasterError::TargetExists(target_path.to_path_buf()));
        }

        Ok(reference)
    }

    /// Apply `operator` to every block of `sources` and write `target_path`
    ///
    /// The target inherits size, geotransform and projection from the first
    /// raster source. An operator error aborts the evaluation; the partially
    /// written target is left on disk.
    pub fn evaluate<O, P>(
        &self,
        ctx: &ProcessingContext,
        sources: &[SourceTerm],
        operator: &O,
        target_path: P,
        target_datatype: RasterDataType,
        target_nodata: f64,
    ) -> RasterResult<RasterInfo>
    where
        O: RasterOperator + ?Sized,
        P: AsRef<Path>,
    {
        let target_path = target_path.as_ref();
        let reference = self.validate(sources, target_path, target_datatype, target_nodata)?;

        log::info!(
            target: ctx.target(),
            "Evaluating {} over {} source terms into {}",
            operator.name(),
            sources.len(),
            target_path.display()
        );

        let mut readers = Vec::new();
        let mut terms = Vec::with_capacity(sources.len());
        for term in sources {
            match term {
                SourceTerm::RasterBand { path, band } => {
                    readers.push(BlockReader::open_with_budget(path, *band, self.config.max_block_bytes)?);
                    terms.push(ResolvedTerm::Raster(readers.len() - 1));
                }
                SourceTerm::Raw(raw) => terms.push(ResolvedTerm::Raw(raw.clone())),
            }
        }

        let layout = match self.config.block_size {
            Some(block_size) => BlockLayout::with_block_size(reference.size, block_size),
            None => *readers[0].layout(),
        };
        log::debug!(
            target: ctx.target(),
            "Block size {:?}, {} blocks",
            layout.block_size,
            layout.block_count()
        );

        if target_path.exists() {
            log::warn!(target: ctx.target(), "Overwriting {}", target_path.display());
            std::fs::remove_file(target_path)?;
        }

        let params = RasterCreateParams {
            driver: &self.config.driver,
            creation_options: &self.config.creation_options,
            size: reference.size,
            geo_transform: reference.geo_transform,
            projection: &reference.projection,
            datatype: target_datatype,
            nodata: Some(target_nodata),
        };
        let dataset = create_raster(target_path, &params)?;
        let mut target_band = dataset.rasterband(1)?;

        let mut progress = ctx.progress(layout.block_count());
        for window in layout.windows() {
            let mut blocks = Vec::with_capacity(terms.len());
            let mut nodata = Vec::with_capacity(terms.len());
            for term in &terms {
                match term {
                    ResolvedTerm::Raster(index) => {
                        blocks.push(readers[*index].read_window(&window)?);
                        nodata.push(readers[*index].nodata());
                    }
                    ResolvedTerm::Raw(raw) => {
                        blocks.push(raw_block(raw, &window));
                        nodata.push(Nodata::none());
                    }
                }
            }

            let inputs: Vec<BlockInput<'_>> = blocks
                .iter()
                .zip(nodata)
                .map(|(block, nd)| BlockInput::new(block.view(), nd))
                .collect();

            let result = operator.apply(&inputs, target_nodata).map_err(|e| {
                log::error!(
                    target: ctx.target(),
                    "{} failed on block at ({}, {}): {}",
                    operator.name(),
                    window.x_offset,
                    window.y_offset,
                    e
                );
                e
            })?;

            if result.dim() != window.shape() {
                return Err(RasterError::Processing(format!(
                    "{} returned a {:?} block for a {:?} window",
                    operator.name(),
                    result.dim(),
                    window.shape()
                )));
            }

            write_window(&mut target_band, target_datatype, &window, &result.view())?;
            progress.step();
        }

        drop(target_band);
        drop(dataset);
        log::info!(
            target: ctx.target(),
            "{} complete: {} blocks written to {}",
            operator.name(),
            progress.done(),
            target_path.display()
        );

        RasterInfo::open(target_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn window(x_offset: usize, y_offset: usize, width: usize, height: usize) -> BlockWindow {
        BlockWindow {
            x_offset,
            y_offset,
            width,
            height,
        }
    }

    #[test]
    fn test_raw_scalar_and_row() {
        let w = window(1, 1, 2, 2);
        assert_eq!(raw_block(&RawConstant::Scalar(3.0), &w), Array2::from_elem((2, 2), 3.0));

        let row = RawConstant::Row(vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(raw_block(&row, &w), array![[1.0, 2.0], [1.0, 2.0]]);
    }

    #[test]
    fn test_raw_column_and_array() {
        let w = window(2, 0, 2, 3);
        let column = RawConstant::Column(vec![5.0, 6.0, 7.0]);
        assert_eq!(raw_block(&column, &w), array![[5.0, 5.0], [6.0, 6.0], [7.0, 7.0]]);

        let full = RawConstant::Array(Array2::from_shape_fn((3, 4), |(r, c)| (r * 10 + c) as f64));
        assert_eq!(raw_block(&full, &w), array![[2.0, 3.0], [12.0, 13.0], [22.0, 23.0]]);
    }

    #[test]
    fn test_raw_shape_checks() {
        let size = (4, 3);
        assert!(check_raw(&RawConstant::Scalar(1.0), 0, size).is_ok());
        assert!(check_raw(&RawConstant::Row(vec![0.0; 4]), 0, size).is_ok());
        assert!(check_raw(&RawConstant::Column(vec![0.0; 3]), 0, size).is_ok());
        assert!(matches!(
            check_raw(&RawConstant::Row(vec![0.0; 3]), 1, size),
            Err(RasterError::ShapeMismatch(_))
        ));
        assert!(matches!(
            check_raw(&RawConstant::Array(Array2::zeros((4, 3))), 1, size),
            Err(RasterError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_config_builders() {
        let config = CalculatorConfig::default().with_overwrite(true).with_block_size(0, 8);
        assert!(config.overwrite);
        assert_eq!(config.block_size, Some((1, 8)));
        assert_eq!(config.driver, "GTiff");
        assert!(config.creation_options.iter().any(|(k, v)| k == "TILED" && v == "YES"));
    }
}
