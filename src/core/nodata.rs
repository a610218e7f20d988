//! Nodata matching and validity masks

use ndarray::{Array2, ArrayView2, Zip};

/// Relative tolerance used when matching floating point nodata
pub const NODATA_RELATIVE_TOLERANCE: f64 = 1e-5;
/// Absolute tolerance used when matching floating point nodata
pub const NODATA_ABSOLUTE_TOLERANCE: f64 = 1e-8;

/// How pixel values are compared against the nodata sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodataMatching {
    /// Integer bands: raw equality
    Exact,
    /// Float bands: values that drifted through a float round trip still match
    Tolerance,
}

/// Nodata sentinel of one source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nodata {
    pub value: Option<f64>,
    pub matching: NodataMatching,
}

impl Nodata {
    /// No sentinel: every finite pixel is valid
    pub fn none() -> Self {
        Self {
            value: None,
            matching: NodataMatching::Exact,
        }
    }

    pub fn exact(value: f64) -> Self {
        Self {
            value: Some(value),
            matching: NodataMatching::Exact,
        }
    }

    pub fn tolerant(value: f64) -> Self {
        Self {
            value: Some(value),
            matching: NodataMatching::Tolerance,
        }
    }

    /// Build from a band's nodata, choosing the matching mode from its datatype
    pub fn for_band(value: Option<f64>, floating: bool) -> Self {
        Self {
            value,
            matching: if floating {
                NodataMatching::Tolerance
            } else {
                NodataMatching::Exact
            },
        }
    }

    /// True when `v` equals the sentinel
    pub fn matches(&self, v: f64) -> bool {
        match self.value {
            None => false,
            Some(nd) if nd.is_nan() => v.is_nan(),
            Some(nd) => match self.matching {
                NodataMatching::Exact => v == nd,
                NodataMatching::Tolerance => approx::relative_eq!(
                    v,
                    nd,
                    epsilon = NODATA_ABSOLUTE_TOLERANCE,
                    max_relative = NODATA_RELATIVE_TOLERANCE
                ),
            },
        }
    }

    /// Sanitized validity: not nodata and finite
    pub fn is_valid(&self, v: f64) -> bool {
        v.is_finite() && !self.matches(v)
    }

    /// Per-pixel validity mask for a block
    pub fn valid_mask(&self, block: &ArrayView2<'_, f64>) -> Array2<bool> {
        block.map(|&v| self.is_valid(v))
    }
}

impl Default for Nodata {
    fn default() -> Self {
        Self::none()
    }
}

/// One input block handed to an operator, with the nodata of its source
#[derive(Debug, Clone)]
pub struct BlockInput<'a> {
    pub values: ArrayView2<'a, f64>,
    pub nodata: Nodata,
}

impl<'a> BlockInput<'a> {
    pub fn new(values: ArrayView2<'a, f64>, nodata: Nodata) -> Self {
        Self { values, nodata }
    }

    pub fn valid_mask(&self) -> Array2<bool> {
        self.nodata.valid_mask(&self.values)
    }
}

/// Pixels valid in every input (strict-AND)
pub fn all_valid_mask(inputs: &[BlockInput<'_>]) -> Array2<bool> {
    let mut mask = inputs[0].valid_mask();
    for input in &inputs[1..] {
        Zip::from(&mut mask)
            .and(&input.values)
            .for_each(|m, &v| *m = *m && input.nodata.is_valid(v));
    }
    mask
}

/// Pixels valid in at least one input
pub fn any_valid_mask(inputs: &[BlockInput<'_>]) -> Array2<bool> {
    let mut mask = inputs[0].valid_mask();
    for input in &inputs[1..] {
        Zip::from(&mut mask)
            .and(&input.values)
            .for_each(|m, &v| *m = *m || input.nodata.is_valid(v));
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_undefined_nodata_is_all_valid() {
        let nodata = Nodata::none();
        let block = array![[0.0, -9999.0], [1.0, 2.0]];
        assert!(nodata.valid_mask(&block.view()).iter().all(|&v| v));
    }

    #[test]
    fn test_tolerance_matching() {
        let nodata = Nodata::tolerant(-3.4028235e38);
        // f32::MIN widened to f64 does not equal the decimal literal exactly
        assert!(nodata.matches(f32::MIN as f64));
        assert!(!nodata.matches(0.0));

        let exact = Nodata::exact(255.0);
        assert!(exact.matches(255.0));
        assert!(!exact.matches(255.000001));
    }

    #[test]
    fn test_nan_nodata_and_sanitizing() {
        let nodata = Nodata::tolerant(f64::NAN);
        assert!(nodata.matches(f64::NAN));
        assert!(!nodata.is_valid(f64::NAN));
        assert!(!Nodata::none().is_valid(f64::INFINITY));
        assert!(Nodata::none().is_valid(1.0));
    }

    #[test]
    fn test_combined_masks() {
        let a = array![[1.0, -1.0], [-1.0, 2.0]];
        let b = array![[-1.0, -1.0], [3.0, 4.0]];
        let inputs = vec![
            BlockInput::new(a.view(), Nodata::exact(-1.0)),
            BlockInput::new(b.view(), Nodata::exact(-1.0)),
        ];
        assert_eq!(all_valid_mask(&inputs), array![[false, false], [false, true]]);
        assert_eq!(any_valid_mask(&inputs), array![[true, false], [true, true]]);
    }
}
