use chrono::{NaiveDate, TimeZone, Utc};

use super::WaterHistorySource;
use crate::core::{ImageCollection, RasterImage};
use crate::types::{BandData, FloodError, FloodResult};

/// Monthly water classification codes
pub const NOT_OBSERVED: f32 = 0.0;
pub const NOT_WATER: f32 = 1.0;
pub const WATER: f32 = 2.0;

/// Band name used for monthly classification images
pub const WATER_BAND: &str = "water";

/// In-memory monthly water history
#[derive(Debug, Clone)]
pub struct MonthlyWaterHistory {
    months: ImageCollection,
}

impl MonthlyWaterHistory {
    /// Wrap a collection of single-band monthly classification images
    pub fn new(months: ImageCollection) -> FloodResult<Self> {
        if let Some(bad) = months.iter().find(|image| image.band_count() != 1) {
            return Err(FloodError::Band(format!(
                "Monthly water history images must have one band, found {:?}",
                bad.band_names()
            )));
        }

        log::debug!("Monthly water history with {} months", months.len());
        Ok(Self { months })
    }

    /// Build from (first day of month, classification grid) pairs
    pub fn from_months(months: Vec<(NaiveDate, BandData)>) -> FloodResult<Self> {
        let images = months
            .into_iter()
            .map(|(date, grid)| {
                let image = RasterImage::from_band(WATER_BAND, grid)?;
                let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(|| {
                    FloodError::Processing(format!("Invalid month start {}", date))
                })?;
                Ok(image.with_time_start(Utc.from_utc_datetime(&midnight)))
            })
            .collect::<FloodResult<Vec<_>>>()?;

        Self::new(ImageCollection::new(images))
    }

    pub fn len(&self) -> usize {
        self.months.len()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }
}

impl WaterHistorySource for MonthlyWaterHistory {
    fn monthly_history(&self) -> FloodResult<ImageCollection> {
        if self.months.is_empty() {
            return Err(FloodError::Provider(
                "Monthly water history is empty".to_string(),
            ));
        }
        Ok(self.months.clone())
    }
}
