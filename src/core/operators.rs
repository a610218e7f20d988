//! Nodata-aware elementwise operators applied to one block at a time
//!
//! Every operator receives one [`BlockInput`] per source term, in source
//! order, and the target nodata of the output raster. Validity is always
//! sanitized: a pixel is invalid when it matches its source's nodata or is
//! not finite. Results that come out non-finite (overflow, 0/0) are written
//! as target nodata rather than propagated.
//!
//! Combination policies:
//! * strict-AND: [`Add`], [`Subtract`], [`Multiply`], [`Divide`],
//!   [`Threshold`], [`Mask`]
//! * union-with-zero-fill: [`AddWithHoles`], [`SubtractWithHoles`]
//! * fallback: [`ReplaceNodata`]
//! * per-pixel: [`Clamp`] and [`Reclassify`](crate::core::reclassify::Reclassify)

use crate::core::nodata::{all_valid_mask, BlockInput};
use crate::types::{Comparison, RasterError, RasterResult};
use ndarray::Array2;

/// Pure per-block transform used by the raster calculator
pub trait RasterOperator {
    /// Short name used in log messages
    fn name(&self) -> &str;

    /// Compute one output block from the aligned input blocks
    fn apply(&self, inputs: &[BlockInput<'_>], target_nodata: f64) -> RasterResult<Array2<f64>>;
}

impl<T: RasterOperator + ?Sized> RasterOperator for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn apply(&self, inputs: &[BlockInput<'_>], target_nodata: f64) -> RasterResult<Array2<f64>> {
        (**self).apply(inputs, target_nodata)
    }
}

/// Adapts a closure into a [`RasterOperator`]
pub struct FnOperator<F> {
    name: String,
    func: F,
}

impl<F> FnOperator<F>
where
    F: Fn(&[BlockInput<'_>], f64) -> RasterResult<Array2<f64>>,
{
    pub fn new(name: &str, func: F) -> Self {
        Self {
            name: name.to_string(),
            func,
        }
    }
}

impl<F> RasterOperator for FnOperator<F>
where
    F: Fn(&[BlockInput<'_>], f64) -> RasterResult<Array2<f64>>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, inputs: &[BlockInput<'_>], target_nodata: f64) -> RasterResult<Array2<f64>> {
        (self.func)(inputs, target_nodata)
    }
}

/// Check input count and that every input has the same block shape
fn check_inputs(name: &str, inputs: &[BlockInput<'_>], expected: Option<usize>) -> RasterResult<(usize, usize)> {
    if inputs.is_empty() {
        return Err(RasterError::InvalidInput(format!("{} needs at least one input", name)));
    }
    if let Some(n) = expected {
        if inputs.len() != n {
            return Err(RasterError::InvalidInput(format!(
                "{} expects {} inputs, got {}",
                name,
                n,
                inputs.len()
            )));
        }
    }
    let shape = inputs[0].values.dim();
    if let Some(bad) = inputs.iter().find(|input| input.values.dim() != shape) {
        return Err(RasterError::ShapeMismatch(format!(
            "{}: block shapes {:?} and {:?} differ",
            name,
            shape,
            bad.values.dim()
        )));
    }
    Ok(shape)
}

fn finite_or(value: f64, target_nodata: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        target_nodata
    }
}

/// Fold all inputs where every one is valid
fn strict_fold(
    inputs: &[BlockInput<'_>],
    target_nodata: f64,
    fold: impl Fn(f64, f64) -> f64,
) -> Array2<f64> {
    let valid = all_valid_mask(inputs);
    Array2::from_shape_fn(valid.dim(), |idx| {
        if !valid[idx] {
            return target_nodata;
        }
        let first = inputs[0].values[idx];
        let value = inputs[1..].iter().fold(first, |acc, input| fold(acc, input.values[idx]));
        finite_or(value, target_nodata)
    })
}

/// Sum of all inputs, strict-AND
#[derive(Debug, Clone, Copy, Default)]
pub struct Add;

impl RasterOperator for Add {
    fn name(&self) -> &str {
        "add"
    }

    fn apply(&self, inputs: &[BlockInput<'_>], target_nodata: f64) -> RasterResult<Array2<f64>> {
        check_inputs(self.name(), inputs, None)?;
        Ok(strict_fold(inputs, target_nodata, |a, b| a + b))
    }
}

/// `a - b`, strict-AND
#[derive(Debug, Clone, Copy, Default)]
pub struct Subtract;

impl RasterOperator for Subtract {
    fn name(&self) -> &str {
        "subtract"
    }

    fn apply(&self, inputs: &[BlockInput<'_>], target_nodata: f64) -> RasterResult<Array2<f64>> {
        check_inputs(self.name(), inputs, Some(2))?;
        Ok(strict_fold(inputs, target_nodata, |a, b| a - b))
    }
}

/// Product of all inputs, strict-AND
#[derive(Debug, Clone, Copy, Default)]
pub struct Multiply;

impl RasterOperator for Multiply {
    fn name(&self) -> &str {
        "multiply"
    }

    fn apply(&self, inputs: &[BlockInput<'_>], target_nodata: f64) -> RasterResult<Array2<f64>> {
        check_inputs(self.name(), inputs, None)?;
        Ok(strict_fold(inputs, target_nodata, |a, b| a * b))
    }
}

/// `a / b`, strict-AND; pixels where `b == 0` become target nodata
#[derive(Debug, Clone, Copy, Default)]
pub struct Divide;

impl RasterOperator for Divide {
    fn name(&self) -> &str {
        "divide"
    }

    fn apply(&self, inputs: &[BlockInput<'_>], target_nodata: f64) -> RasterResult<Array2<f64>> {
        check_inputs(self.name(), inputs, Some(2))?;
        let valid = all_valid_mask(inputs);
        let (numerator, denominator) = (&inputs[0].values, &inputs[1].values);
        Ok(Array2::from_shape_fn(valid.dim(), |idx| {
            if !valid[idx] || denominator[idx] == 0.0 {
                target_nodata
            } else {
                finite_or(numerator[idx] / denominator[idx], target_nodata)
            }
        }))
    }
}

/// Sum of a stack tolerant of holes
///
/// A source that is invalid at a pixel contributes 0. The output is target
/// nodata only where every source is invalid.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddWithHoles;

impl RasterOperator for AddWithHoles {
    fn name(&self) -> &str {
        "add_with_holes"
    }

    fn apply(&self, inputs: &[BlockInput<'_>], target_nodata: f64) -> RasterResult<Array2<f64>> {
        let shape = check_inputs(self.name(), inputs, None)?;
        let mut sum = Array2::<f64>::zeros(shape);
        let mut any_valid = Array2::from_elem(shape, false);

        for input in inputs {
            ndarray::Zip::from(&mut sum)
                .and(&mut any_valid)
                .and(&input.values)
                .for_each(|s, seen, &v| {
                    if input.nodata.is_valid(v) {
                        *s += v;
                        *seen = true;
                    }
                });
        }

        ndarray::Zip::from(&mut sum).and(&any_valid).for_each(|s, &seen| {
            *s = if seen { finite_or(*s, target_nodata) } else { target_nodata };
        });
        Ok(sum)
    }
}

/// `a - b` where a missing term counts as 0
///
/// Only pixels invalid in both `a` and `b` become target nodata.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubtractWithHoles;

impl RasterOperator for SubtractWithHoles {
    fn name(&self) -> &str {
        "subtract_with_holes"
    }

    fn apply(&self, inputs: &[BlockInput<'_>], target_nodata: f64) -> RasterResult<Array2<f64>> {
        let shape = check_inputs(self.name(), inputs, Some(2))?;
        let (a, b) = (&inputs[0], &inputs[1]);
        Ok(Array2::from_shape_fn(shape, |idx| {
            let (va, vb) = (a.values[idx], b.values[idx]);
            match (a.nodata.is_valid(va), b.nodata.is_valid(vb)) {
                (true, true) => finite_or(va - vb, target_nodata),
                (true, false) => va,
                (false, true) => -vb,
                (false, false) => target_nodata,
            }
        }))
    }
}

/// Fill holes of a primary source from a secondary source
///
/// Where both are invalid the primary's own nodata is kept (target nodata
/// when the primary has none). The output band is tagged with the target
/// nodata, so pass the primary's nodata as target nodata for those cells to
/// read back as nodata; otherwise they read back as valid data.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaceNodata;

impl RasterOperator for ReplaceNodata {
    fn name(&self) -> &str {
        "replace_nodata"
    }

    fn apply(&self, inputs: &[BlockInput<'_>], target_nodata: f64) -> RasterResult<Array2<f64>> {
        let shape = check_inputs(self.name(), inputs, Some(2))?;
        let (primary, secondary) = (&inputs[0], &inputs[1]);
        let fallback = primary.nodata.value.unwrap_or(target_nodata);
        Ok(Array2::from_shape_fn(shape, |idx| {
            let (vp, vs) = (primary.values[idx], secondary.values[idx]);
            if primary.nodata.is_valid(vp) {
                vp
            } else if secondary.nodata.is_valid(vs) {
                vs
            } else {
                fallback
            }
        }))
    }
}

/// Binary raster: 1 where `a <comparison> b`, 0 elsewhere, nodata where either is invalid
///
/// `b` is usually a raw scalar but may be a second raster.
#[derive(Debug, Clone, Copy)]
pub struct Threshold {
    pub comparison: Comparison,
}

impl Threshold {
    pub fn new(comparison: Comparison) -> Self {
        Self { comparison }
    }
}

impl RasterOperator for Threshold {
    fn name(&self) -> &str {
        "threshold"
    }

    fn apply(&self, inputs: &[BlockInput<'_>], target_nodata: f64) -> RasterResult<Array2<f64>> {
        check_inputs(self.name(), inputs, Some(2))?;
        let valid = all_valid_mask(inputs);
        let (a, b) = (&inputs[0].values, &inputs[1].values);
        Ok(Array2::from_shape_fn(valid.dim(), |idx| {
            if !valid[idx] {
                target_nodata
            } else if self.comparison.evaluate(a[idx], b[idx]) {
                1.0
            } else {
                0.0
            }
        }))
    }
}

/// Keep values of `a` where the mask `b` selects the pixel
///
/// Without `mask_values` any valid non-zero mask pixel selects; otherwise
/// the mask pixel must equal one of the listed codes.
#[derive(Debug, Clone, Default)]
pub struct Mask {
    pub mask_values: Option<Vec<f64>>,
}

impl Mask {
    pub fn nonzero() -> Self {
        Self { mask_values: None }
    }

    pub fn with_values(values: Vec<f64>) -> Self {
        Self {
            mask_values: Some(values),
        }
    }

    fn selects(&self, mask_value: f64) -> bool {
        match &self.mask_values {
            None => mask_value != 0.0,
            Some(values) => values.iter().any(|&v| v == mask_value),
        }
    }
}

impl RasterOperator for Mask {
    fn name(&self) -> &str {
        "mask"
    }

    fn apply(&self, inputs: &[BlockInput<'_>], target_nodata: f64) -> RasterResult<Array2<f64>> {
        check_inputs(self.name(), inputs, Some(2))?;
        let valid = all_valid_mask(inputs);
        let (values, mask) = (&inputs[0].values, &inputs[1].values);
        Ok(Array2::from_shape_fn(valid.dim(), |idx| {
            if valid[idx] && self.selects(mask[idx]) {
                values[idx]
            } else {
                target_nodata
            }
        }))
    }
}

/// Bound valid values into `[lower, upper]`
#[derive(Debug, Clone, Copy)]
pub struct Clamp {
    lower: f64,
    upper: f64,
}

impl Clamp {
    pub fn new(lower: f64, upper: f64) -> RasterResult<Self> {
        if !(lower <= upper) {
            return Err(RasterError::InvalidInput(format!(
                "Clamp lower bound {} is above upper bound {}",
                lower, upper
            )));
        }
        Ok(Self { lower, upper })
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.lower, self.upper)
    }
}

impl RasterOperator for Clamp {
    fn name(&self) -> &str {
        "clamp"
    }

    fn apply(&self, inputs: &[BlockInput<'_>], target_nodata: f64) -> RasterResult<Array2<f64>> {
        check_inputs(self.name(), inputs, Some(1))?;
        let input = &inputs[0];
        Ok(input.values.map(|&v| {
            if input.nodata.is_valid(v) {
                v.clamp(self.lower, self.upper)
            } else {
                target_nodata
            }
        }))
    }
}
