//! Flood classification from backscatter z-scores
//!
//! Per pixel, the class code is `vv_flag * 1 + vh_flag * 2 + inundated * 10`,
//! overridden to 20 for permanent open water, and masked where the water
//! history never observed the pixel.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::band_math::RasterImage;
use super::collection::{Filter, ImageCollection};
use super::inundation::InundationMask;
use super::water_mask::WaterOccurrence;
use crate::io::{SeasonalWaterClassifier, WaterHistorySource};
use crate::types::{Band, FloodError, FloodResult};

/// Display colours indexed by class code; unused codes are black
pub const FLOOD_PALETTE: [&str; 21] = [
    "#000000", // 0 - non-water, non-flood
    "#FC9272", // 1 - VV only
    "#FC9272", // 2 - VH only
    "#FF0000", // 3 - VV + VH
    "#000000",
    "#000000",
    "#000000",
    "#000000",
    "#000000",
    "#000000",
    "#DEEBF7", // 10 - prior inundation, no flag
    "#8C6BB1", // 11 - prior inundation, VV only
    "#8C6BB1", // 12 - prior inundation, VH only
    "#810F7C", // 13 - prior inundation, VV + VH
    "#000000",
    "#000000",
    "#000000",
    "#000000",
    "#000000",
    "#000000",
    "#08306B", // 20 - permanent open water
];

/// Band name of the classified output
pub const FLOOD_CLASS_BAND: &str = "flood_class";

/// Flood class codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum FloodClass {
    NoFlag = 0,
    Vv = 1,
    Vh = 2,
    VvVh = 3,
    PriorInundation = 10,
    PriorInundationVv = 11,
    PriorInundationVh = 12,
    PriorInundationVvVh = 13,
    OpenWater = 20,
}

impl FloodClass {
    pub const ALL: [FloodClass; 9] = [
        FloodClass::NoFlag,
        FloodClass::Vv,
        FloodClass::Vh,
        FloodClass::VvVh,
        FloodClass::PriorInundation,
        FloodClass::PriorInundationVv,
        FloodClass::PriorInundationVh,
        FloodClass::PriorInundationVvVh,
        FloodClass::OpenWater,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    /// Classification rule for a single pixel
    pub fn from_flags(vv_flag: bool, vh_flag: bool, inundated: bool, open_water: bool) -> Self {
        if open_water {
            return FloodClass::OpenWater;
        }
        let code = vv_flag as u8 + 2 * vh_flag as u8 + 10 * inundated as u8;
        // every combination of the three flags is a defined code
        Self::from_code(code).unwrap_or(FloodClass::NoFlag)
    }

    pub fn color(self) -> &'static str {
        FLOOD_PALETTE[self.code() as usize]
    }

    /// At least one backscatter flag is set
    pub fn is_flagged(self) -> bool {
        matches!(self.code() % 10, 1..=3)
    }

    pub fn has_prior_inundation(self) -> bool {
        (10..=13).contains(&self.code())
    }

    pub fn description(self) -> &'static str {
        match self {
            FloodClass::NoFlag => "non-water, no flood flags",
            FloodClass::Vv => "VV flag only",
            FloodClass::Vh => "VH flag only",
            FloodClass::VvVh => "VV and VH flags",
            FloodClass::PriorInundation => "prior inundation, no flags",
            FloodClass::PriorInundationVv => "prior inundation, VV flag",
            FloodClass::PriorInundationVh => "prior inundation, VH flag",
            FloodClass::PriorInundationVvVh => "prior inundation, VV and VH flags",
            FloodClass::OpenWater => "permanent open water",
        }
    }
}

impl std::fmt::Display for FloodClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code(), self.description())
    }
}

/// Optional classifier settings as supplied by a caller.
///
/// Unset fields take the documented defaults of [`FloodMapParams`]; an
/// explicit zero is kept as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FloodMapOptions {
    pub percent_open_water_threshold: Option<f32>,
    pub percent_inundation_threshold: Option<f32>,
    pub use_seasonal_classifier: Option<bool>,
    pub seasonal_start: Option<NaiveDate>,
    pub seasonal_end: Option<NaiveDate>,
    pub day_of_year_start: Option<u32>,
    pub day_of_year_end: Option<u32>,
}

impl FloodMapOptions {
    /// Load options from a JSON document
    pub fn from_json_str(json: &str) -> FloodResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Substitute defaults for unset fields and validate the result
    pub fn resolve(&self) -> FloodResult<FloodMapParams> {
        let defaults = FloodMapParams::default();
        let params = FloodMapParams {
            percent_open_water_threshold: self
                .percent_open_water_threshold
                .unwrap_or(defaults.percent_open_water_threshold),
            percent_inundation_threshold: self
                .percent_inundation_threshold
                .unwrap_or(defaults.percent_inundation_threshold),
            use_seasonal_classifier: self
                .use_seasonal_classifier
                .unwrap_or(defaults.use_seasonal_classifier),
            seasonal_start: self.seasonal_start.unwrap_or(defaults.seasonal_start),
            seasonal_end: self.seasonal_end.unwrap_or(defaults.seasonal_end),
            day_of_year_start: self.day_of_year_start.unwrap_or(defaults.day_of_year_start),
            day_of_year_end: self.day_of_year_end.unwrap_or(defaults.day_of_year_end),
        };
        params.validate()?;
        Ok(params)
    }
}

/// Resolved classifier settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloodMapParams {
    /// Water occurrence (%) at or above which a pixel is permanent open water
    pub percent_open_water_threshold: f32,
    /// Inundation frequency (%) at or above which a pixel was previously inundated
    pub percent_inundation_threshold: f32,
    /// Use seasonal (DSWE) probabilities for prior inundation
    pub use_seasonal_classifier: bool,
    /// Seasonal history start (inclusive)
    pub seasonal_start: NaiveDate,
    /// Seasonal history end (exclusive)
    pub seasonal_end: NaiveDate,
    /// Day-of-year window for the seasonal history (inclusive)
    pub day_of_year_start: u32,
    pub day_of_year_end: u32,
}

impl Default for FloodMapParams {
    fn default() -> Self {
        Self {
            percent_open_water_threshold: 90.0,
            percent_inundation_threshold: 25.0,
            use_seasonal_classifier: false,
            seasonal_start: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default(),
            seasonal_end: NaiveDate::from_ymd_opt(2016, 1, 1).unwrap_or_default(),
            day_of_year_start: 1,
            day_of_year_end: 366,
        }
    }
}

impl FloodMapParams {
    /// Thresholds must be finite. Percentages outside 0-100 are accepted: a
    /// threshold above 100 never matches, one below 0 always does.
    ///
    /// The seasonal window is only checked when the seasonal classifier is
    /// requested, since it is unused otherwise.
    pub fn validate(&self) -> FloodResult<()> {
        for (name, value) in [
            ("percent_open_water_threshold", self.percent_open_water_threshold),
            ("percent_inundation_threshold", self.percent_inundation_threshold),
        ] {
            if !value.is_finite() {
                return Err(FloodError::InvalidParameter {
                    name,
                    value: value.to_string(),
                    reason: "must be a finite percentage".to_string(),
                });
            }
        }

        if self.use_seasonal_classifier {
            self.validate_seasonal_window()?;
        }

        Ok(())
    }

    fn validate_seasonal_window(&self) -> FloodResult<()> {
        for (name, value) in [
            ("day_of_year_start", self.day_of_year_start),
            ("day_of_year_end", self.day_of_year_end),
        ] {
            if !(1..=366).contains(&value) {
                return Err(FloodError::InvalidParameter {
                    name,
                    value: value.to_string(),
                    reason: "must be between 1 and 366".to_string(),
                });
            }
        }

        if self.seasonal_start >= self.seasonal_end {
            return Err(FloodError::InvalidParameter {
                name: "seasonal_end",
                value: self.seasonal_end.to_string(),
                reason: format!("must be after seasonal_start {}", self.seasonal_start),
            });
        }

        Ok(())
    }

    /// Date and day-of-year filters for the seasonal classifier
    pub fn seasonal_filters(&self) -> Vec<Filter> {
        vec![
            Filter::date(self.seasonal_start, self.seasonal_end),
            Filter::day_of_year(self.day_of_year_start, self.day_of_year_end),
        ]
    }
}

/// Per-class pixel counts of a flood map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FloodClassStats {
    pub total_pixels: usize,
    pub masked_pixels: usize,
    pub class_counts: BTreeMap<FloodClass, usize>,
    /// Pixels with at least one backscatter flag, outside open water
    pub flagged_pixels: usize,
    /// Flagged pixels as a percentage of unmasked pixels
    pub flagged_percentage: f64,
}

impl FloodClassStats {
    pub fn count(&self, class: FloodClass) -> usize {
        self.class_counts.get(&class).copied().unwrap_or(0)
    }

    pub fn valid_pixels(&self) -> usize {
        self.total_pixels - self.masked_pixels
    }
}

/// Classified flood map for one acquisition
#[derive(Debug, Clone, PartialEq)]
pub struct FloodMap {
    classes: Array2<Option<FloodClass>>,
    time_start: Option<DateTime<Utc>>,
}

impl FloodMap {
    /// Decode a single-band class-code image; no-data becomes `None`
    pub fn from_class_image(image: &RasterImage) -> FloodResult<Self> {
        let band = image.band(FLOOD_CLASS_BAND)?;
        let mut classes = Array2::from_elem(band.dim(), None);

        for ((row, col), &value) in band.indexed_iter() {
            if value.is_nan() {
                continue;
            }
            let class = if value.fract() == 0.0 && (0.0..=255.0).contains(&value) {
                FloodClass::from_code(value as u8)
            } else {
                None
            };
            classes[[row, col]] = Some(class.ok_or_else(|| {
                FloodError::Processing(format!(
                    "Invalid flood class code {} at ({}, {})",
                    value, row, col
                ))
            })?);
        }

        Ok(Self {
            classes,
            time_start: image.time_start(),
        })
    }

    pub fn classes(&self) -> &Array2<Option<FloodClass>> {
        &self.classes
    }

    pub fn time_start(&self) -> Option<DateTime<Utc>> {
        self.time_start
    }

    pub fn shape(&self) -> (usize, usize) {
        self.classes.dim()
    }

    /// Class at a pixel, `None` if masked or outside the map
    pub fn get(&self, row: usize, col: usize) -> Option<FloodClass> {
        self.classes.get((row, col)).copied().flatten()
    }

    /// Raw class codes with `no_data` written for masked pixels
    pub fn codes(&self, no_data: u8) -> Array2<u8> {
        self.classes.mapv(|c| c.map(FloodClass::code).unwrap_or(no_data))
    }

    pub fn statistics(&self) -> FloodClassStats {
        let mut stats = FloodClassStats {
            total_pixels: self.classes.len(),
            ..Default::default()
        };

        for class in self.classes.iter() {
            match class {
                Some(c) => {
                    *stats.class_counts.entry(*c).or_insert(0) += 1;
                    if c.is_flagged() {
                        stats.flagged_pixels += 1;
                    }
                }
                None => stats.masked_pixels += 1,
            }
        }

        let valid = stats.valid_pixels();
        stats.flagged_percentage = if valid > 0 {
            stats.flagged_pixels as f64 / valid as f64 * 100.0
        } else {
            0.0
        };
        stats
    }
}

/// Water occurrence and inundation masks shared by every acquisition
#[derive(Debug, Clone)]
pub struct FloodBackground {
    water: WaterOccurrence,
    inundation: InundationMask,
}

impl FloodBackground {
    pub fn new(water: WaterOccurrence, inundation: InundationMask) -> Self {
        Self { water, inundation }
    }

    pub fn water(&self) -> &WaterOccurrence {
        &self.water
    }

    pub fn inundation(&self) -> &InundationMask {
        &self.inundation
    }

    /// Classify one z-score image against this background
    pub fn classify(
        &self,
        z: &RasterImage,
        zvv_threshold: f32,
        zvh_threshold: f32,
    ) -> FloodResult<FloodMap> {
        check_z_threshold("zvv_threshold", zvv_threshold)?;
        check_z_threshold("zvh_threshold", zvh_threshold)?;

        let vv_flag = z.select(&[Band::VV.name()])?.lte(zvv_threshold);
        let vh_flag = z.select(&[Band::VH.name()])?.lte(zvh_threshold);

        let mut flood_class = RasterImage::constant(FLOOD_CLASS_BAND, 0.0, z.shape())
            .add(&vv_flag)?
            .add(&vh_flag.multiply_scalar(2.0))?
            .add(&self.inundation.inundated().multiply_scalar(10.0))?
            .where_(&self.inundation.open_water().eq(1.0), 20.0)?
            .update_mask(&self.water.validity_mask())?;
        flood_class.set_time_start(z.time_start());

        FloodMap::from_class_image(&flood_class)
    }
}

fn check_z_threshold(name: &'static str, value: f32) -> FloodResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(FloodError::InvalidParameter {
            name,
            value: value.to_string(),
            reason: "z-score threshold must be finite".to_string(),
        })
    }
}

/// Flood classifier wired to its water history providers
pub struct FloodMapper {
    water_history: Box<dyn WaterHistorySource>,
    seasonal: Option<Box<dyn SeasonalWaterClassifier>>,
}

impl FloodMapper {
    pub fn new<W: WaterHistorySource + 'static>(water_history: W) -> Self {
        Self {
            water_history: Box::new(water_history),
            seasonal: None,
        }
    }

    pub fn with_seasonal_classifier<S: SeasonalWaterClassifier + 'static>(mut self, seasonal: S) -> Self {
        self.seasonal = Some(Box::new(seasonal));
        self
    }

    pub fn has_seasonal_classifier(&self) -> bool {
        self.seasonal.is_some()
    }

    /// Compute the water occurrence and inundation masks
    pub fn background(&self, params: &FloodMapParams) -> FloodResult<FloodBackground> {
        params.validate()?;

        let water = WaterOccurrence::from_source(self.water_history.as_ref())?;
        let pow = params.percent_open_water_threshold;
        let pin = params.percent_inundation_threshold;

        let inundation = match (&self.seasonal, params.use_seasonal_classifier) {
            (Some(seasonal), true) => {
                log::info!(
                    "Seasonal inundation from {} to {}, day of year {}-{}",
                    params.seasonal_start,
                    params.seasonal_end,
                    params.day_of_year_start,
                    params.day_of_year_end
                );
                let probabilities = seasonal.probabilities(&params.seasonal_filters())?;
                InundationMask::from_seasonal(&water, &probabilities, pow, pin)?
            }
            (None, true) => {
                log::warn!(
                    "No seasonal classifier available, using long-term water occurrence for prior inundation"
                );
                InundationMask::from_water_occurrence(&water, pow, pin)?
            }
            (_, false) => InundationMask::from_water_occurrence(&water, pow, pin)?,
        };

        Ok(FloodBackground::new(water, inundation))
    }

    /// Classify one z-score image
    pub fn map_floods(
        &self,
        z: &RasterImage,
        zvv_threshold: f32,
        zvh_threshold: f32,
        options: &FloodMapOptions,
    ) -> FloodResult<FloodMap> {
        self.map_floods_with_params(z, zvv_threshold, zvh_threshold, &options.resolve()?)
    }

    pub fn map_floods_with_params(
        &self,
        z: &RasterImage,
        zvv_threshold: f32,
        zvh_threshold: f32,
        params: &FloodMapParams,
    ) -> FloodResult<FloodMap> {
        log::info!(
            "Mapping floods: zvv <= {}, zvh <= {}, open water >= {}%, inundation >= {}%",
            zvv_threshold,
            zvh_threshold,
            params.percent_open_water_threshold,
            params.percent_inundation_threshold
        );

        let map = self.background(params)?.classify(z, zvv_threshold, zvh_threshold)?;
        log::debug!("Flood map statistics: {:?}", map.statistics());
        Ok(map)
    }

    /// Classify every image of a z-score series, sharing one background
    pub fn map_floods_series(
        &self,
        z_scores: &ImageCollection,
        zvv_threshold: f32,
        zvh_threshold: f32,
        options: &FloodMapOptions,
    ) -> FloodResult<Vec<FloodMap>> {
        let params = options.resolve()?;
        let background = self.background(&params)?;
        log::info!("Mapping floods for {} acquisitions", z_scores.len());

        #[cfg(feature = "parallel")]
        let maps: FloodResult<Vec<FloodMap>> = {
            use rayon::prelude::*;
            z_scores
                .images()
                .par_iter()
                .map(|z| background.classify(z, zvv_threshold, zvh_threshold))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let maps: FloodResult<Vec<FloodMap>> = z_scores
            .iter()
            .map(|z| background.classify(z, zvv_threshold, zvh_threshold))
            .collect();

        maps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_matches_codes() {
        assert_eq!(FLOOD_PALETTE.len(), 21);
        assert_eq!(FloodClass::OpenWater.color(), "#08306B");
        assert_eq!(FloodClass::VvVh.color(), "#FF0000");
        assert_eq!(FloodClass::PriorInundation.color(), "#DEEBF7");
        for unused in (4..=9).chain(14..=19) {
            assert_eq!(FLOOD_PALETTE[unused], "#000000");
            assert!(FloodClass::from_code(unused as u8).is_none());
        }
    }

    #[test]
    fn test_from_flags_encoding() {
        assert_eq!(FloodClass::from_flags(false, false, false, false).code(), 0);
        assert_eq!(FloodClass::from_flags(true, false, false, false).code(), 1);
        assert_eq!(FloodClass::from_flags(false, true, false, false).code(), 2);
        assert_eq!(FloodClass::from_flags(true, true, false, false).code(), 3);
        assert_eq!(FloodClass::from_flags(false, false, true, false).code(), 10);
        assert_eq!(FloodClass::from_flags(true, true, true, false).code(), 13);
        for vv in [false, true] {
            for vh in [false, true] {
                for inundated in [false, true] {
                    assert_eq!(FloodClass::from_flags(vv, vh, inundated, true), FloodClass::OpenWater);
                }
            }
        }
    }

    #[test]
    fn test_class_predicates() {
        assert!(FloodClass::Vh.is_flagged());
        assert!(FloodClass::PriorInundationVvVh.is_flagged());
        assert!(!FloodClass::PriorInundation.is_flagged());
        assert!(!FloodClass::OpenWater.is_flagged());
        assert!(FloodClass::PriorInundationVv.has_prior_inundation());
        assert!(!FloodClass::OpenWater.has_prior_inundation());
    }

    #[test]
    fn test_option_defaults() {
        let params = FloodMapOptions::default().resolve().unwrap();
        assert_eq!(params, FloodMapParams::default());
        assert_eq!(params.percent_open_water_threshold, 90.0);
        assert_eq!(params.percent_inundation_threshold, 25.0);
        assert_eq!(params.seasonal_end, NaiveDate::from_ymd_opt(2016, 1, 1).unwrap());
        assert_eq!((params.day_of_year_start, params.day_of_year_end), (1, 366));
    }

    #[test]
    fn test_explicit_zero_threshold_is_kept() {
        let options = FloodMapOptions {
            percent_inundation_threshold: Some(0.0),
            ..Default::default()
        };
        assert_eq!(options.resolve().unwrap().percent_inundation_threshold, 0.0);
    }

    #[test]
    fn test_option_validation() {
        let bad_pct = FloodMapOptions {
            percent_open_water_threshold: Some(f32::INFINITY),
            ..Default::default()
        };
        assert!(matches!(
            bad_pct.resolve(),
            Err(FloodError::InvalidParameter { name: "percent_open_water_threshold", .. })
        ));

        let bad_doy = FloodMapOptions {
            use_seasonal_classifier: Some(true),
            day_of_year_end: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            bad_doy.resolve(),
            Err(FloodError::InvalidParameter { name: "day_of_year_end", .. })
        ));

        let bad_range = FloodMapOptions {
            use_seasonal_classifier: Some(true),
            seasonal_start: NaiveDate::from_ymd_opt(2018, 1, 1),
            ..Default::default()
        };
        assert!(matches!(
            bad_range.resolve(),
            Err(FloodError::InvalidParameter { name: "seasonal_end", .. })
        ));
    }

    #[test]
    fn test_seasonal_window_ignored_without_seasonal_classifier() {
        let options = FloodMapOptions {
            seasonal_start: NaiveDate::from_ymd_opt(2017, 1, 1),
            day_of_year_start: Some(0),
            ..Default::default()
        };
        let params = options.resolve().unwrap();
        assert!(!params.use_seasonal_classifier);
        assert_eq!(params.seasonal_start, NaiveDate::from_ymd_opt(2017, 1, 1).unwrap());
    }

    #[test]
    fn test_thresholds_beyond_percentage_range() {
        let params = FloodMapOptions {
            percent_open_water_threshold: Some(101.0),
            percent_inundation_threshold: Some(-5.0),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert_eq!(params.percent_open_water_threshold, 101.0);
        assert_eq!(params.percent_inundation_threshold, -5.0);
    }

    #[test]
    fn test_options_from_json() {
        let options = FloodMapOptions::from_json_str(
            r#"{"percent_open_water_threshold": 80, "use_seasonal_classifier": true, "seasonal_end": "2018-01-01"}"#,
        )
        .unwrap();
        let params = options.resolve().unwrap();
        assert_eq!(params.percent_open_water_threshold, 80.0);
        assert_eq!(params.percent_inundation_threshold, 25.0);
        assert!(params.use_seasonal_classifier);
        assert_eq!(params.seasonal_end, NaiveDate::from_ymd_opt(2018, 1, 1).unwrap());

        assert!(matches!(
            FloodMapOptions::from_json_str(r#"{"pow_thd": 80}"#),
            Err(FloodError::Config(_))
        ));
    }

    #[test]
    fn test_flood_map_decoding_and_stats() {
        let image = RasterImage::from_band(
            FLOOD_CLASS_BAND,
            ndarray::array![[0.0, 1.0, 13.0], [20.0, 10.0, f32::NAN]],
        )
        .unwrap();
        let map = FloodMap::from_class_image(&image).unwrap();

        assert_eq!(map.get(0, 2), Some(FloodClass::PriorInundationVvVh));
        assert_eq!(map.get(1, 2), None);
        assert_eq!(map.get(5, 5), None);
        assert_eq!(map.codes(255)[[1, 2]], 255);

        let stats = map.statistics();
        assert_eq!(stats.total_pixels, 6);
        assert_eq!(stats.masked_pixels, 1);
        assert_eq!(stats.flagged_pixels, 2);
        assert_eq!(stats.count(FloodClass::OpenWater), 1);
        assert!((stats.flagged_percentage - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_code_is_rejected() {
        let image = RasterImage::from_band(FLOOD_CLASS_BAND, ndarray::array![[4.0]]).unwrap();
        assert!(matches!(
            FloodMap::from_class_image(&image),
            Err(FloodError::Processing(_))
        ));
    }
}
