//! Long-term water occurrence from a monthly water history

use super::band_math::RasterImage;
use super::collection::ImageCollection;
use crate::io::water_history::{NOT_OBSERVED, WATER};
use crate::io::WaterHistorySource;
use crate::types::{BandData, FloodResult};

/// Per-pixel observation count and water occurrence percentage
#[derive(Debug, Clone)]
pub struct WaterOccurrence {
    valid_count: RasterImage,
    water_percent: RasterImage,
}

impl WaterOccurrence {
    /// Summarise monthly classifications.
    ///
    /// `valid_count` counts months with any observation, `water_percent` is
    /// the share of those months classified as water. Pixels never observed
    /// have a zero count and no-data percentage.
    pub fn from_monthly_history(history: &ImageCollection) -> FloodResult<Self> {
        let valid_count = history
            .map(|month| Ok(month.gt(NOT_OBSERVED)))?
            .sum()?
            .rename(&["valid_count"])?;
        let water_count = history.map(|month| Ok(month.eq(WATER)))?.sum()?;

        Self::from_count_images(valid_count, water_count)
    }

    pub fn from_source(source: &dyn WaterHistorySource) -> FloodResult<Self> {
        Self::from_monthly_history(&source.monthly_history()?)
    }

    /// Build from precomputed per-pixel month counts
    pub fn from_counts(valid_count: BandData, water_count: BandData) -> FloodResult<Self> {
        Self::from_count_images(
            RasterImage::from_band("valid_count", valid_count)?,
            RasterImage::from_band("water_count", water_count)?,
        )
    }

    fn from_count_images(valid_count: RasterImage, water_count: RasterImage) -> FloodResult<Self> {
        let water_percent = water_count
            .divide(&valid_count)?
            .multiply_scalar(100.0)
            .rename(&["water_percent"])?;

        let (rows, cols) = valid_count.shape();
        log::debug!("Water occurrence computed for {}x{} pixels", rows, cols);

        Ok(Self {
            valid_count,
            water_percent,
        })
    }

    pub fn valid_count(&self) -> &RasterImage {
        &self.valid_count
    }

    pub fn water_percent(&self) -> &RasterImage {
        &self.water_percent
    }

    pub fn shape(&self) -> (usize, usize) {
        self.valid_count.shape()
    }

    /// 1 where the pixel was observed at least once
    pub fn validity_mask(&self) -> RasterImage {
        self.valid_count.gt(0.0)
    }

    /// 1 where water occurrence reaches `threshold` percent
    pub fn open_water(&self, threshold: f32) -> RasterImage {
        self.water_percent.gte(threshold)
    }
}
