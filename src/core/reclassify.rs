//! Integer code reclassification through a lookup table

use crate::core::nodata::BlockInput;
use crate::core::operators::RasterOperator;
use crate::types::{RasterError, RasterResult};
use ndarray::Array2;
use std::collections::BTreeMap;

/// Exact-match map from integer raster codes to output values
///
/// Keys are kept sorted so a lookup is a binary search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupTable {
    keys: Vec<i64>,
    values: Vec<f64>,
}

impl LookupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(code, value)` pairs; a repeated code keeps the last value
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (i64, f64)>,
    {
        let map: BTreeMap<i64, f64> = pairs.into_iter().collect();
        let (keys, values) = map.into_iter().unzip();
        Self { keys, values }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Mapped value for an integral pixel value
    pub fn get(&self, value: f64) -> Option<f64> {
        if value.fract() != 0.0 || !value.is_finite() {
            return None;
        }
        // i64::MAX as f64 rounds up to 2^63
        if value < i64::MIN as f64 || value >= i64::MAX as f64 {
            return None;
        }
        let code = value as i64;
        self.keys
            .binary_search(&code)
            .ok()
            .map(|index| self.values[index])
    }

    pub fn codes(&self) -> &[i64] {
        &self.keys
    }
}

/// What happens to a pixel whose code is not in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmappedPolicy {
    /// Fail the whole evaluation with [`RasterError::UnmappedCode`]
    Error,
    /// Write the original pixel value
    Passthrough,
}

/// Reclassify a single band through a [`LookupTable`]
///
/// Nodata pixels of the input become target nodata.
#[derive(Debug, Clone)]
pub struct Reclassify {
    pub table: LookupTable,
    pub unmapped: UnmappedPolicy,
}

impl Reclassify {
    pub fn new(table: LookupTable, values_required: bool) -> Self {
        Self {
            table,
            unmapped: if values_required {
                UnmappedPolicy::Error
            } else {
                UnmappedPolicy::Passthrough
            },
        }
    }
}

impl RasterOperator for Reclassify {
    fn name(&self) -> &str {
        "reclassify"
    }

    fn apply(&self, inputs: &[BlockInput<'_>], target_nodata: f64) -> RasterResult<Array2<f64>> {
        if inputs.len() != 1 {
            return Err(RasterError::InvalidInput(format!(
                "reclassify expects 1 input, got {}",
                inputs.len()
            )));
        }
        let input = &inputs[0];
        let mut output = Array2::from_elem(input.values.dim(), target_nodata);

        for (out, &v) in output.iter_mut().zip(input.values.iter()) {
            if !input.nodata.is_valid(v) {
                continue;
            }
            *out = match (self.table.get(v), self.unmapped) {
                (Some(mapped), _) => mapped,
                (None, UnmappedPolicy::Passthrough) => v,
                (None, UnmappedPolicy::Error) => return Err(RasterError::UnmappedCode { value: v }),
            };
        }
        Ok(output)
    }
}
