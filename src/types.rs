use chrono::NaiveDate;
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Single raster band (rows x cols), `NaN` marks no-data
pub type BandData = Array2<f32>;

/// Multi-band raster data (band x rows x cols)
pub type BandStack = Array3<f32>;

/// Value used for masked / undefined pixels
pub const NO_DATA: f32 = f32::NAN;

/// Bands carried by a Sentinel-1 GRD observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    VV,
    VH,
    #[serde(rename = "angle")]
    Angle,
}

impl Band {
    /// Canonical band order of a backscatter observation
    pub const SAR_BANDS: [Band; 3] = [Band::VV, Band::VH, Band::Angle];

    pub fn name(&self) -> &'static str {
        match self {
            Band::VV => "VV",
            Band::VH => "VH",
            Band::Angle => "angle",
        }
    }

    /// Band names in canonical order, as owned strings
    pub fn sar_band_names() -> Vec<String> {
        Self::SAR_BANDS.iter().map(|b| b.name().to_string()).collect()
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Orbit pass direction of the acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrbitDirection {
    Ascending,
    Descending,
}

impl std::fmt::Display for OrbitDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrbitDirection::Ascending => write!(f, "ASCENDING"),
            OrbitDirection::Descending => write!(f, "DESCENDING"),
        }
    }
}

impl FromStr for OrbitDirection {
    type Err = FloodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ASCENDING" => Ok(OrbitDirection::Ascending),
            "DESCENDING" => Ok(OrbitDirection::Descending),
            _ => Err(FloodError::InvalidParameter {
                name: "direction",
                value: s.to_string(),
                reason: "expected ASCENDING or DESCENDING".to_string(),
            }),
        }
    }
}

/// Sentinel-1 acquisition mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcquisitionMode {
    IW, // Interferometric Wide swath
    EW, // Extra Wide swath
    SM, // StripMap
    WV, // Wave
}

impl std::fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for AcquisitionMode {
    type Err = FloodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "IW" => Ok(AcquisitionMode::IW),
            "EW" => Ok(AcquisitionMode::EW),
            "SM" => Ok(AcquisitionMode::SM),
            "WV" => Ok(AcquisitionMode::WV),
            _ => Err(FloodError::InvalidParameter {
                name: "mode",
                value: s.to_string(),
                reason: "expected one of IW, EW, SM, WV".to_string(),
            }),
        }
    }
}

/// Acquisition geometry of one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionInfo {
    pub orbit_pass: OrbitDirection,
    pub instrument_mode: AcquisitionMode,
}

impl AcquisitionInfo {
    pub fn new(orbit_pass: OrbitDirection, instrument_mode: AcquisitionMode) -> Self {
        Self { orbit_pass, instrument_mode }
    }
}

/// Parse a `YYYY-MM-DD` date string
pub fn parse_date(s: &str) -> FloodResult<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s, "%Y-%m-%d")?)
}

/// Error types for flood mapping
#[derive(Debug, thiserror::Error)]
pub enum FloodError {
    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Raster shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Band error: {0}")]
    Band(String),

    #[error("Data provider error: {0}")]
    Provider(String),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Date parsing error: {0}")]
    Date(#[from] chrono::ParseError),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for flood mapping operations
pub type FloodResult<T> = Result<T, FloodError>;
