//! Smoothing of cumulative distribution functions

use crate::types::{RasterError, RasterResult};

/// Replace flat runs of a non-decreasing sequence with linear ramps
///
/// A run of equal values starting at index `i` and followed by a larger
/// value at index `j` becomes a ramp from `values[i]` at `i` toward
/// `values[j]` at `j`. A run that reaches the end of the sequence stays flat.
pub fn interpolate_plateaus(values: &[f64]) -> RasterResult<Vec<f64>> {
    if let Some(i) = values.windows(2).position(|w| !(w[0] <= w[1])) {
        return Err(RasterError::InvalidInput(format!(
            "Sequence is not non-decreasing at index {} ({} > {})",
            i + 1,
            values[i],
            values[i + 1]
        )));
    }

    let mut smoothed = values.to_vec();
    let mut start = 0;
    while start < values.len() {
        let mut end = start + 1;
        while end < values.len() && values[end] == values[start] {
            end += 1;
        }

        if end < values.len() && end - start > 1 {
            let (low, high) = (values[start], values[end]);
            let span = (end - start) as f64;
            for (k, v) in smoothed[start..end].iter_mut().enumerate() {
                *v = low + (high - low) * k as f64 / span;
            }
        }
        start = end;
    }

    Ok(smoothed)
}
