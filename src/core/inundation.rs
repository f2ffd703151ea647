//! Prior inundation and permanent open water masks

use super::band_math::RasterImage;
use super::water_mask::WaterOccurrence;
use crate::io::DSWE_PROBABILITY_BANDS;
use crate::types::FloodResult;

/// Where the prior inundation information came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InundationSource {
    /// Seasonal (DSWE) inundation probabilities
    Seasonal,
    /// Long-term water occurrence used as a stand-in
    WaterOccurrence,
}

/// Boolean (1/0) prior inundation and open water rasters
#[derive(Debug, Clone)]
pub struct InundationMask {
    inundated: RasterImage,
    open_water: RasterImage,
    source: InundationSource,
}

impl InundationMask {
    /// Inundation from water occurrence alone.
    ///
    /// Reuses the long-term water percentage as the seasonal proxy.
    pub fn from_water_occurrence(
        water: &WaterOccurrence,
        open_water_threshold: f32,
        inundation_threshold: f32,
    ) -> FloodResult<Self> {
        Ok(Self {
            inundated: water
                .water_percent()
                .gte(inundation_threshold)
                .rename(&["inundated"])?,
            open_water: water.open_water(open_water_threshold).rename(&["open_water"])?,
            source: InundationSource::WaterOccurrence,
        })
    }

    /// Inundation from seasonal probabilities.
    ///
    /// The three sub-class probabilities are summed into one inundation
    /// percentage. Pixels where the high-confidence class alone reaches the
    /// open water threshold are promoted to open water.
    pub fn from_seasonal(
        water: &WaterOccurrence,
        probabilities: &RasterImage,
        open_water_threshold: f32,
        inundation_threshold: f32,
    ) -> FloodResult<Self> {
        let [p1, p2, p3] = DSWE_PROBABILITY_BANDS;
        let high_confidence = probabilities.select(&[p1])?;
        let combined = high_confidence
            .add(&probabilities.select(&[p2])?)?
            .add(&probabilities.select(&[p3])?)?;

        let open_water = water
            .open_water(open_water_threshold)
            .where_(&high_confidence.gte(open_water_threshold), 1.0)?
            .rename(&["open_water"])?;

        Ok(Self {
            inundated: combined.gte(inundation_threshold).rename(&["inundated"])?,
            open_water,
            source: InundationSource::Seasonal,
        })
    }

    pub fn inundated(&self) -> &RasterImage {
        &self.inundated
    }

    pub fn open_water(&self) -> &RasterImage {
        &self.open_water
    }

    pub fn source(&self) -> InundationSource {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FloodError, NO_DATA};
    use ndarray::array;

    fn water() -> WaterOccurrence {
        // water percent: 95, 50, 10, 0
        WaterOccurrence::from_counts(
            array![[20.0, 20.0, 20.0, 20.0]],
            array![[19.0, 10.0, 2.0, 0.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_fallback_uses_water_occurrence() {
        let mask = InundationMask::from_water_occurrence(&water(), 90.0, 25.0).unwrap();
        assert_eq!(mask.source(), InundationSource::WaterOccurrence);

        let inundated: Vec<_> = (0..4).map(|c| mask.inundated().pixel("inundated", 0, c).unwrap()).collect();
        assert_eq!(inundated, vec![Some(1.0), Some(1.0), Some(0.0), Some(0.0)]);

        let open: Vec<_> = (0..4).map(|c| mask.open_water().pixel("open_water", 0, c).unwrap()).collect();
        assert_eq!(open, vec![Some(1.0), Some(0.0), Some(0.0), Some(0.0)]);
    }

    #[test]
    fn test_seasonal_promotes_open_water() {
        let probabilities = RasterImage::from_bands(vec![
            ("pDSWE1", array![[0.0, 92.0, 5.0, NO_DATA]]),
            ("pDSWE2", array![[0.0, 3.0, 10.0, NO_DATA]]),
            ("pDSWE3", array![[0.0, 0.0, 12.0, NO_DATA]]),
        ])
        .unwrap();

        let mask = InundationMask::from_seasonal(&water(), &probabilities, 90.0, 25.0).unwrap();
        assert_eq!(mask.source(), InundationSource::Seasonal);

        let open: Vec<_> = (0..4).map(|c| mask.open_water().pixel("open_water", 0, c).unwrap()).collect();
        // pixel 0 keeps long-term open water, pixel 1 is promoted
        assert_eq!(open, vec![Some(1.0), Some(1.0), Some(0.0), Some(0.0)]);

        let inundated: Vec<_> = (0..4).map(|c| mask.inundated().pixel("inundated", 0, c).unwrap()).collect();
        assert_eq!(inundated, vec![Some(0.0), Some(1.0), Some(1.0), None]);
    }

    #[test]
    fn test_seasonal_requires_probability_bands() {
        let probabilities = RasterImage::from_band("pDSWE1", array![[0.0, 0.0, 0.0, 0.0]]).unwrap();
        let result = InundationMask::from_seasonal(&water(), &probabilities, 90.0, 25.0);
        assert!(matches!(result, Err(FloodError::Band(_))));
    }
}
