use ndarray::Array2;
use num_traits::NumCast;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Affine geotransform as reported by GDAL:
/// `[origin_x, pixel_width, rotation_x, origin_y, rotation_y, pixel_height]`
pub type GeoTransform = [f64; 6];

/// Numeric datatype of a raster band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RasterDataType {
    Byte,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
}

impl RasterDataType {
    /// True for the floating point types, whose nodata is matched with a tolerance
    pub fn is_floating(&self) -> bool {
        matches!(self, RasterDataType::Float32 | RasterDataType::Float64)
    }

    /// Size of one cell in bytes
    pub fn size_in_bytes(&self) -> usize {
        match self {
            RasterDataType::Byte => 1,
            RasterDataType::UInt16 | RasterDataType::Int16 => 2,
            RasterDataType::UInt32 | RasterDataType::Int32 | RasterDataType::Float32 => 4,
            RasterDataType::Float64 => 8,
        }
    }

    /// Whether `value` survives a cast into this datatype
    ///
    /// NaN and out-of-range values are not representable by integer types.
    pub fn can_represent(&self, value: f64) -> bool {
        match self {
            RasterDataType::Byte => <u8 as NumCast>::from(value).is_some(),
            RasterDataType::UInt16 => <u16 as NumCast>::from(value).is_some(),
            RasterDataType::Int16 => <i16 as NumCast>::from(value).is_some(),
            RasterDataType::UInt32 => <u32 as NumCast>::from(value).is_some(),
            RasterDataType::Int32 => <i32 as NumCast>::from(value).is_some(),
            RasterDataType::Float32 | RasterDataType::Float64 => true,
        }
    }
}

impl std::fmt::Display for RasterDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RasterDataType::Byte => write!(f, "Byte"),
            RasterDataType::UInt16 => write!(f, "UInt16"),
            RasterDataType::Int16 => write!(f, "Int16"),
            RasterDataType::UInt32 => write!(f, "UInt32"),
            RasterDataType::Int32 => write!(f, "Int32"),
            RasterDataType::Float32 => write!(f, "Float32"),
            RasterDataType::Float64 => write!(f, "Float64"),
        }
    }
}

impl FromStr for RasterDataType {
    type Err = RasterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "byte" | "uint8" | "u8" => Ok(RasterDataType::Byte),
            "uint16" | "u16" => Ok(RasterDataType::UInt16),
            "int16" | "i16" => Ok(RasterDataType::Int16),
            "uint32" | "u32" => Ok(RasterDataType::UInt32),
            "int32" | "i32" => Ok(RasterDataType::Int32),
            "float32" | "f32" => Ok(RasterDataType::Float32),
            "float64" | "f64" => Ok(RasterDataType::Float64),
            _ => Err(RasterError::InvalidInput(format!("Unknown datatype: {}", s))),
        }
    }
}

/// A constant term used unchanged in every block, never read from disk
#[derive(Debug, Clone, PartialEq)]
pub enum RawConstant {
    /// Single value broadcast over the whole block
    Scalar(f64),
    /// One value per raster column
    Row(Vec<f64>),
    /// One value per raster row
    Column(Vec<f64>),
    /// Full raster-sized array, sliced to each block window
    Array(Array2<f64>),
}

/// One input of a raster calculation
#[derive(Debug, Clone, PartialEq)]
pub enum SourceTerm {
    /// 1-based band of a raster on disk
    RasterBand { path: PathBuf, band: usize },
    Raw(RawConstant),
}

impl SourceTerm {
    /// Reference band 1 of the raster at `path`
    pub fn raster<P: Into<PathBuf>>(path: P) -> Self {
        SourceTerm::RasterBand { path: path.into(), band: 1 }
    }

    pub fn raster_band<P: Into<PathBuf>>(path: P, band: usize) -> Self {
        SourceTerm::RasterBand { path: path.into(), band }
    }

    pub fn scalar(value: f64) -> Self {
        SourceTerm::Raw(RawConstant::Scalar(value))
    }

    pub fn is_raster(&self) -> bool {
        matches!(self, SourceTerm::RasterBand { .. })
    }
}

/// Comparison predicate used by thresholding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Equal,
    NotEqual,
}

impl Comparison {
    pub fn evaluate(&self, a: f64, b: f64) -> bool {
        match self {
            Comparison::LessThan => a < b,
            Comparison::LessOrEqual => a <= b,
            Comparison::GreaterThan => a > b,
            Comparison::GreaterOrEqual => a >= b,
            Comparison::Equal => a == b,
            Comparison::NotEqual => a != b,
        }
    }
}

impl FromStr for Comparison {
    type Err = RasterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lt" | "<" => Ok(Comparison::LessThan),
            "le" | "<=" => Ok(Comparison::LessOrEqual),
            "gt" | ">" => Ok(Comparison::GreaterThan),
            "ge" | ">=" => Ok(Comparison::GreaterOrEqual),
            "eq" | "==" => Ok(Comparison::Equal),
            "ne" | "!=" => Ok(Comparison::NotEqual),
            _ => Err(RasterError::InvalidInput(format!("Unknown comparison: {}", s))),
        }
    }
}

/// Error types for raster processing
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Lookup table error: {0}")]
    Table(#[from] csv::Error),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Value {value} has no entry in the lookup table")]
    UnmappedCode { value: f64 },

    #[error("Target raster already exists: {0}")]
    TargetExists(PathBuf),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for raster operations
pub type RasterResult<T> = Result<T, RasterError>;
