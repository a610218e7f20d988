//! Streaming statistics over the valid pixels of a raster band

use crate::core::blocks::{BlockReader, DEFAULT_MAX_BLOCK_BYTES};
use crate::core::context::ProcessingContext;
use crate::types::{RasterError, RasterResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Summary of the valid pixels of one band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterStatistics {
    pub valid_count: u64,
    pub nodata_count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub sum: f64,
    pub mean: Option<f64>,
}

impl RasterStatistics {
    fn empty() -> Self {
        Self {
            valid_count: 0,
            nodata_count: 0,
            min: None,
            max: None,
            sum: 0.0,
            mean: None,
        }
    }

    fn push(&mut self, value: f64) {
        self.valid_count += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    /// Accumulate statistics from an iterator of `(value, is_valid)` pairs
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = (f64, bool)>,
    {
        let mut stats = Self::empty();
        for (value, valid) in values {
            if valid {
                stats.push(value);
            } else {
                stats.nodata_count += 1;
            }
        }
        stats.finish();
        stats
    }

    fn finish(&mut self) {
        self.mean = (self.valid_count > 0).then(|| self.sum / self.valid_count as f64);
    }
}

/// Compute summary statistics of a band in one streaming pass
pub fn raster_statistics<P: AsRef<Path>>(
    ctx: &ProcessingContext,
    path: P,
    band: usize,
) -> RasterResult<RasterStatistics> {
    let reader = BlockReader::open_with_budget(path.as_ref(), band, DEFAULT_MAX_BLOCK_BYTES)?;
    let nodata = reader.nodata();
    let mut progress = ctx.progress(reader.layout().block_count());

    let mut stats = RasterStatistics::empty();
    for block in reader.blocks() {
        let (_, data) = block?;
        for &v in data.iter() {
            if nodata.is_valid(v) {
                stats.push(v);
            } else {
                stats.nodata_count += 1;
            }
        }
        progress.step();
    }
    stats.finish();

    log::info!(
        target: ctx.target(),
        "Statistics of {} band {}: {} valid pixels, mean {:?}",
        path.as_ref().display(),
        band,
        stats.valid_count,
        stats.mean
    );
    Ok(stats)
}

/// Percentile of sorted values by linear interpolation between closest ranks
pub fn percentile_of_sorted(sorted: &[f64], percentile: f64) -> RasterResult<f64> {
    if sorted.is_empty() {
        return Err(RasterError::InvalidInput("No values to take a percentile of".to_string()));
    }
    if !(0.0..=100.0).contains(&percentile) {
        return Err(RasterError::InvalidInput(format!(
            "Percentile {} outside [0, 100]",
            percentile
        )));
    }

    let rank = percentile / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Ok(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Percentiles of a band's valid pixels
///
/// Valid values are gathered block by block and sorted once, so memory grows
/// with the number of valid pixels.
pub fn raster_percentiles<P: AsRef<Path>>(
    ctx: &ProcessingContext,
    path: P,
    band: usize,
    percentiles: &[f64],
) -> RasterResult<Vec<f64>> {
    let reader = BlockReader::open(path.as_ref(), band)?;
    let nodata = reader.nodata();
    let mut progress = ctx.progress(reader.layout().block_count());

    let mut values = Vec::new();
    for block in reader.blocks() {
        let (_, data) = block?;
        values.extend(data.iter().copied().filter(|&v| nodata.is_valid(v)));
        progress.step();
    }
    values.sort_by(|a, b| a.total_cmp(b));

    log::debug!(
        target: ctx.target(),
        "Computing {} percentiles over {} values",
        percentiles.len(),
        values.len()
    );
    percentiles
        .iter()
        .map(|&p| percentile_of_sorted(&values, p))
        .collect()
}
