//! Providers of historical water information

pub mod dswe;
pub mod water_history;

pub use dswe::DsweHistory;
pub use water_history::MonthlyWaterHistory;

use crate::core::{Filter, ImageCollection, RasterImage};
use crate::types::FloodResult;

/// Band names of the seasonal inundation probabilities, one per sub-class
pub const DSWE_PROBABILITY_BANDS: [&str; 3] = ["pDSWE1", "pDSWE2", "pDSWE3"];

/// Long-term monthly surface water history.
///
/// Each image is single-band and categorical: 0 not observed,
/// 1 not water, 2 water.
pub trait WaterHistorySource: Send + Sync {
    fn monthly_history(&self) -> FloodResult<ImageCollection>;
}

/// Seasonal inundation classifier.
///
/// Returns an image with the bands in [`DSWE_PROBABILITY_BANDS`], each the
/// percentage of valid observations (matching `filters`) in that sub-class.
pub trait SeasonalWaterClassifier: Send + Sync {
    fn probabilities(&self, filters: &[Filter]) -> FloodResult<RasterImage>;
}
