//! Seasonal inundation probabilities from a DSWE classification history

use ndarray::Array3;

use super::{SeasonalWaterClassifier, DSWE_PROBABILITY_BANDS};
use crate::core::{Filter, ImageCollection, RasterImage};
use crate::types::{FloodError, FloodResult, NO_DATA};

/// DSWE classification codes
pub const DSWE_NOT_WATER: f32 = 0.0;
pub const DSWE_HIGH_CONFIDENCE: f32 = 1.0;
pub const DSWE_MODERATE_CONFIDENCE: f32 = 2.0;
pub const DSWE_POTENTIAL_WETLAND: f32 = 3.0;
pub const DSWE_LOW_CONFIDENCE: f32 = 4.0;
/// Cloud, shadow or snow
pub const DSWE_OBSCURED: f32 = 9.0;

fn is_valid_class(class: f32) -> bool {
    class >= DSWE_NOT_WATER && class <= DSWE_LOW_CONFIDENCE && class.fract() == 0.0
}

/// In-memory history of per-scene DSWE classifications
#[derive(Debug, Clone)]
pub struct DsweHistory {
    scenes: ImageCollection,
}

impl DsweHistory {
    /// Wrap a collection of single-band, timestamped DSWE class images
    pub fn new(scenes: ImageCollection) -> FloodResult<Self> {
        if let Some(bad) = scenes.iter().find(|image| image.band_count() != 1) {
            return Err(FloodError::Band(format!(
                "DSWE scenes must have one band, found {:?}",
                bad.band_names()
            )));
        }
        Ok(Self { scenes })
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    fn no_data_probabilities(&self) -> FloodResult<RasterImage> {
        let (rows, cols) = self.scenes.first().map(|s| s.shape()).unwrap_or((0, 0));
        RasterImage::new(
            Array3::from_elem((DSWE_PROBABILITY_BANDS.len(), rows, cols), NO_DATA),
            DSWE_PROBABILITY_BANDS.iter().map(|b| b.to_string()).collect(),
        )
    }
}

impl SeasonalWaterClassifier for DsweHistory {
    fn probabilities(&self, filters: &[Filter]) -> FloodResult<RasterImage> {
        if self.scenes.is_empty() {
            return Err(FloodError::Provider("DSWE history is empty".to_string()));
        }

        let scenes = self.scenes.filter_all(filters);
        log::info!(
            "DSWE probabilities from {} of {} scenes",
            scenes.len(),
            self.scenes.len()
        );
        if scenes.is_empty() {
            log::warn!("No DSWE scenes match the seasonal filters");
            return self.no_data_probabilities();
        }

        let valid_count = scenes
            .map(|scene| Ok(scene.map_values(|c| if is_valid_class(c) { 1.0 } else { 0.0 })))?
            .sum()?;

        let mut bands = Vec::with_capacity(DSWE_PROBABILITY_BANDS.len());
        for (class, name) in [
            DSWE_HIGH_CONFIDENCE,
            DSWE_MODERATE_CONFIDENCE,
            DSWE_POTENTIAL_WETLAND,
        ]
        .iter()
        .zip(DSWE_PROBABILITY_BANDS)
        {
            let class_count = scenes.map(|scene| Ok(scene.eq(*class)))?.sum()?;
            let percent = class_count.divide(&valid_count)?.multiply_scalar(100.0);
            let band_name = percent.band_names()[0].clone();
            bands.push((name, percent.band(&band_name)?.to_owned()));
        }

        RasterImage::from_bands(bands)
    }
}
