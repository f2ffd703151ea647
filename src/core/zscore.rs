//! Baseline statistics, backscatter anomalies and z-scores
//!
//! The baseline is always computed from observations sharing the orbit
//! direction and instrument mode of the anomaly series, since backscatter
//! differs systematically between acquisition geometries.

use chrono::{DateTime, NaiveDate, Utc};
use ndarray::Array3;
use serde::{Deserialize, Serialize};

use super::band_math::RasterImage;
use super::collection::{
    map_images, pixel_mean_std_dev, reduce_mean, reduce_std_dev, Filter, ImageCollection,
};
use crate::types::{parse_date, AcquisitionMode, Band, FloodResult, OrbitDirection, NO_DATA};

/// Baseline period and acquisition geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineParams {
    /// First day of the baseline period (inclusive)
    pub start: NaiveDate,
    /// End of the baseline period (exclusive)
    pub end: NaiveDate,
    /// Acquisition mode
    #[serde(default = "default_mode")]
    pub mode: AcquisitionMode,
    /// Orbit pass direction
    #[serde(default = "default_direction")]
    pub direction: OrbitDirection,
}

fn default_mode() -> AcquisitionMode {
    AcquisitionMode::IW
}

fn default_direction() -> OrbitDirection {
    OrbitDirection::Descending
}

impl BaselineParams {
    /// Baseline over `[start, end)` for descending IW acquisitions
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            mode: default_mode(),
            direction: default_direction(),
        }
    }

    /// Baseline from `YYYY-MM-DD` strings
    pub fn from_dates(start: &str, end: &str) -> FloodResult<Self> {
        Ok(Self::new(parse_date(start)?, parse_date(end)?))
    }

    pub fn with_mode(mut self, mode: AcquisitionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_direction(mut self, direction: OrbitDirection) -> Self {
        self.direction = direction;
        self
    }
}

/// Computes baseline statistics and per-observation z-scores
#[derive(Debug, Clone)]
pub struct BaselineProcessor {
    params: BaselineParams,
}

impl BaselineProcessor {
    pub fn new(params: BaselineParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &BaselineParams {
        &self.params
    }

    /// Observations with matching orbit direction and mode, any date
    fn matching_geometry<'a>(&self, collection: &'a ImageCollection) -> Vec<&'a RasterImage> {
        collection.select(&[
            Filter::OrbitPass(self.params.direction),
            Filter::InstrumentMode(self.params.mode),
        ])
    }

    /// Matching observations inside the baseline period
    fn baseline_window<'a>(&self, matching: &[&'a RasterImage], total: usize) -> Vec<&'a RasterImage> {
        let period = Filter::date(self.params.start, self.params.end);
        let window: Vec<&RasterImage> = matching
            .iter()
            .copied()
            .filter(|image| period.matches(image))
            .collect();

        log::info!(
            "Baseline {} to {} ({} {}): {} of {} observations",
            self.params.start,
            self.params.end,
            self.params.direction,
            self.params.mode,
            window.len(),
            total
        );
        window
    }

    /// Per-band mean over the baseline period.
    ///
    /// An empty baseline yields an all no-data image.
    pub fn baseline_mean(&self, collection: &ImageCollection) -> FloodResult<RasterImage> {
        let matching = self.matching_geometry(collection);
        let window = self.baseline_window(&matching, collection.len());
        window_mean(&window, template(&matching, collection))
    }

    /// Per-band sample standard deviation over the baseline period,
    /// with bands named VV, VH, angle.
    pub fn baseline_std_dev(&self, collection: &ImageCollection) -> FloodResult<RasterImage> {
        let matching = self.matching_geometry(collection);
        let window = self.baseline_window(&matching, collection.len());
        window_std_dev(&window, template(&matching, collection))
    }

    /// Observation minus baseline mean, for every observation with matching
    /// geometry (not only those inside the baseline period)
    pub fn anomalies(&self, collection: &ImageCollection) -> FloodResult<ImageCollection> {
        let matching = self.matching_geometry(collection);
        let window = self.baseline_window(&matching, collection.len());
        let mean = window_mean(&window, template(&matching, collection))?;

        log::info!("Computing anomalies for {} observations", matching.len());
        map_images(&matching, |observation| {
            let mut anomaly = observation.subtract(&mean)?;
            anomaly.set_time_start(observation.time_start());
            Ok(anomaly)
        })
    }

    /// Anomaly divided by the baseline standard deviation
    pub fn z_scores(&self, collection: &ImageCollection) -> FloodResult<ImageCollection> {
        let matching = self.matching_geometry(collection);
        let window = self.baseline_window(&matching, collection.len());
        let shape = template(&matching, collection);
        let mean = window_mean(&window, shape)?;
        let sd = window_std_dev(&window, shape)?;

        log::info!("Computing z-scores for {} observations", matching.len());
        map_images(&matching, |observation| {
            let mut z = observation.subtract(&mean)?.divide(&sd)?;
            z.set_time_start(observation.time_start());
            Ok(z)
        })
    }

    /// Z-score time series of one band at one pixel, in time order.
    ///
    /// Only the requested pixel is read, so rasters are never stacked and
    /// observations of differing size are tolerated as long as they contain
    /// the pixel. Observations without a timestamp are skipped.
    pub fn pixel_series(
        &self,
        collection: &ImageCollection,
        row: usize,
        col: usize,
        band: Band,
    ) -> FloodResult<Vec<(DateTime<Utc>, Option<f32>)>> {
        let name = band.name();
        let value_at = |image: &RasterImage| -> FloodResult<f32> {
            Ok(image.pixel(name, row, col)?.unwrap_or(NO_DATA))
        };

        let matching = self.matching_geometry(collection);
        let window = self.baseline_window(&matching, collection.len());
        let samples = window
            .iter()
            .map(|image| value_at(image))
            .collect::<FloodResult<Vec<f32>>>()?;
        let (mean, sd) = pixel_mean_std_dev(samples);

        let mut series = Vec::with_capacity(matching.len());
        for observation in &matching {
            if let Some(t) = observation.time_start() {
                let z = if sd == 0.0 {
                    NO_DATA
                } else {
                    (value_at(observation)? - mean) / sd
                };
                series.push((t, if z.is_nan() { None } else { Some(z) }));
            }
        }
        Ok(series)
    }
}

/// Shape template for an undefined baseline: the first observation with
/// matching geometry, else any observation
fn template<'a>(
    matching: &[&'a RasterImage],
    collection: &'a ImageCollection,
) -> Option<&'a RasterImage> {
    matching.first().copied().or_else(|| collection.first())
}

fn window_mean(window: &[&RasterImage], template: Option<&RasterImage>) -> FloodResult<RasterImage> {
    if window.is_empty() {
        log::warn!("No observations in baseline period, mean is undefined");
        return no_data_like(template);
    }
    reduce_mean(window)
}

fn window_std_dev(
    window: &[&RasterImage],
    template: Option<&RasterImage>,
) -> FloodResult<RasterImage> {
    let sd = if window.is_empty() {
        log::warn!("No observations in baseline period, standard deviation is undefined");
        no_data_like(template)?
    } else {
        reduce_std_dev(window)?
    };

    let names: Vec<&str> = Band::SAR_BANDS.iter().map(|b| b.name()).collect();
    sd.rename(&names)
}

/// All no-data image shaped like `template`
fn no_data_like(template: Option<&RasterImage>) -> FloodResult<RasterImage> {
    match template {
        Some(image) => RasterImage::new(
            Array3::from_elem(image.data().dim(), NO_DATA),
            image.band_names().to_vec(),
        ),
        None => RasterImage::new(
            Array3::from_elem((Band::SAR_BANDS.len(), 0, 0), NO_DATA),
            Band::sar_band_names(),
        ),
    }
}

/// Mean backscatter over `[start, end)` for the given mode and direction
pub fn compute_baseline_mean(
    collection: &ImageCollection,
    start: NaiveDate,
    end: NaiveDate,
    mode: AcquisitionMode,
    direction: OrbitDirection,
) -> FloodResult<RasterImage> {
    processor(start, end, mode, direction).baseline_mean(collection)
}

/// Sample standard deviation of backscatter over `[start, end)`
pub fn compute_baseline_std_dev(
    collection: &ImageCollection,
    start: NaiveDate,
    end: NaiveDate,
    mode: AcquisitionMode,
    direction: OrbitDirection,
) -> FloodResult<RasterImage> {
    processor(start, end, mode, direction).baseline_std_dev(collection)
}

/// Backscatter anomaly of every matching observation
pub fn compute_anomaly(
    collection: &ImageCollection,
    start: NaiveDate,
    end: NaiveDate,
    mode: AcquisitionMode,
    direction: OrbitDirection,
) -> FloodResult<ImageCollection> {
    processor(start, end, mode, direction).anomalies(collection)
}

/// Backscatter z-score of every matching observation
pub fn compute_z_score(
    collection: &ImageCollection,
    start: NaiveDate,
    end: NaiveDate,
    mode: AcquisitionMode,
    direction: OrbitDirection,
) -> FloodResult<ImageCollection> {
    processor(start, end, mode, direction).z_scores(collection)
}

fn processor(
    start: NaiveDate,
    end: NaiveDate,
    mode: AcquisitionMode,
    direction: OrbitDirection,
) -> BaselineProcessor {
    BaselineProcessor::new(
        BaselineParams::new(start, end)
            .with_mode(mode)
            .with_direction(direction),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AcquisitionInfo;
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;
    use ndarray::{array, Array2};

    fn observation(
        date: (i32, u32, u32),
        values: (f32, f32, f32),
        direction: OrbitDirection,
        mode: AcquisitionMode,
    ) -> RasterImage {
        RasterImage::from_sar_bands(array![[values.0]], array![[values.1]], array![[values.2]])
            .unwrap()
            .with_time_start(Utc.with_ymd_and_hms(date.0, date.1, date.2, 17, 8, 15).unwrap())
            .with_acquisition(AcquisitionInfo::new(direction, mode))
    }

    fn test_collection() -> ImageCollection {
        use AcquisitionMode::*;
        use OrbitDirection::*;
        ImageCollection::new(vec![
            observation((2019, 2, 1), (-10.0, -20.0, 35.0), Descending, IW),
            observation((2019, 3, 1), (-12.0, -22.0, 37.0), Descending, IW),
            observation((2019, 4, 1), (-14.0, -24.0, 39.0), Descending, IW),
            // other geometry, excluded everywhere
            observation((2019, 3, 5), (0.0, 0.0, 0.0), Ascending, IW),
            observation((2019, 3, 6), (100.0, 100.0, 100.0), Descending, SM),
            // after the baseline period
            observation((2020, 5, 10), (-18.0, -23.0, 37.0), Descending, IW),
        ])
    }

    fn baseline() -> BaselineProcessor {
        BaselineProcessor::new(BaselineParams::from_dates("2019-01-01", "2020-01-01").unwrap())
    }

    #[test]
    fn test_baseline_mean_uses_matching_window_only() {
        let mean = baseline().baseline_mean(&test_collection()).unwrap();
        assert_abs_diff_eq!(mean.pixel("VV", 0, 0).unwrap().unwrap(), -12.0, epsilon = 1e-5);
        assert_abs_diff_eq!(mean.pixel("VH", 0, 0).unwrap().unwrap(), -22.0, epsilon = 1e-5);
        assert_abs_diff_eq!(mean.pixel("angle", 0, 0).unwrap().unwrap(), 37.0, epsilon = 1e-5);
    }

    #[test]
    fn test_baseline_std_dev_band_names() {
        let sd = baseline().baseline_std_dev(&test_collection()).unwrap();
        assert_eq!(sd.band_names(), &["VV".to_string(), "VH".to_string(), "angle".to_string()]);
        for band in ["VV", "VH", "angle"] {
            assert_abs_diff_eq!(sd.pixel(band, 0, 0).unwrap().unwrap(), 2.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_anomalies_cover_all_matching_observations() {
        let anomalies = baseline().anomalies(&test_collection()).unwrap();
        assert_eq!(anomalies.len(), 4);

        let last = anomalies.images().last().unwrap();
        assert_eq!(
            last.time_start(),
            Some(Utc.with_ymd_and_hms(2020, 5, 10, 17, 8, 15).unwrap())
        );
        assert_abs_diff_eq!(last.pixel("VV", 0, 0).unwrap().unwrap(), -6.0, epsilon = 1e-5);
    }

    #[test]
    fn test_z_scores() {
        let z = baseline().z_scores(&test_collection()).unwrap();
        assert_eq!(z.len(), 4);

        let flood = z.images().last().unwrap();
        assert_abs_diff_eq!(flood.pixel("VV", 0, 0).unwrap().unwrap(), -3.0, epsilon = 1e-5);
        assert_abs_diff_eq!(flood.pixel("VH", 0, 0).unwrap().unwrap(), -0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(flood.pixel("angle", 0, 0).unwrap().unwrap(), 0.0, epsilon = 1e-5);
        assert_eq!(flood.acquisition().unwrap().orbit_pass, OrbitDirection::Descending);
    }

    #[test]
    fn test_empty_baseline_yields_no_data() {
        let processor =
            BaselineProcessor::new(BaselineParams::from_dates("2010-01-01", "2011-01-01").unwrap());
        let collection = test_collection();

        let mean = processor.baseline_mean(&collection).unwrap();
        assert_eq!(mean.shape(), (1, 1));
        assert_eq!(mean.pixel("VV", 0, 0).unwrap(), None);

        let z = processor.z_scores(&collection).unwrap();
        assert_eq!(z.len(), 4);
        assert!(z.iter().all(|img| img.pixel("VV", 0, 0).unwrap().is_none()));
    }

    #[test]
    fn test_empty_baseline_shaped_like_matching_geometry() {
        let ascending = RasterImage::from_sar_bands(
            Array2::from_elem((2, 2), -8.0),
            Array2::from_elem((2, 2), -15.0),
            Array2::from_elem((2, 2), 40.0),
        )
        .unwrap()
        .with_time_start(Utc.with_ymd_and_hms(2017, 6, 1, 5, 50, 0).unwrap())
        .with_acquisition(AcquisitionInfo::new(OrbitDirection::Ascending, AcquisitionMode::IW));
        let descending = RasterImage::from_sar_bands(
            Array2::from_elem((3, 3), -10.0),
            Array2::from_elem((3, 3), -17.0),
            Array2::from_elem((3, 3), 38.0),
        )
        .unwrap()
        .with_time_start(Utc.with_ymd_and_hms(2019, 6, 1, 17, 8, 15).unwrap())
        .with_acquisition(AcquisitionInfo::new(OrbitDirection::Descending, AcquisitionMode::IW));
        let collection = ImageCollection::new(vec![ascending, descending]);

        let z = compute_z_score(
            &collection,
            NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2011, 1, 1).unwrap(),
            AcquisitionMode::IW,
            OrbitDirection::Descending,
        )
        .unwrap();
        assert_eq!(z.len(), 1);
        assert_eq!(z.images()[0].shape(), (3, 3));
        assert!(z.images()[0].data().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_pixel_series_matches_full_z_scores() {
        let collection = test_collection();
        let z = baseline().z_scores(&collection).unwrap();

        for band in Band::SAR_BANDS {
            let series = baseline().pixel_series(&collection, 0, 0, band).unwrap();
            let expected: Vec<_> = z
                .iter()
                .map(|img| (img.time_start().unwrap(), img.pixel(band.name(), 0, 0).unwrap()))
                .collect();
            assert_eq!(series, expected);
        }

        assert!(baseline().pixel_series(&collection, 5, 0, Band::VV).is_err());
    }

    #[test]
    fn test_reversed_range_yields_no_data() {
        let mean = compute_baseline_mean(
            &test_collection(),
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
            AcquisitionMode::IW,
            OrbitDirection::Descending,
        )
        .unwrap();
        assert_eq!(mean.pixel("VH", 0, 0).unwrap(), None);
    }

    #[test]
    fn test_empty_collection() {
        let z = baseline().z_scores(&ImageCollection::default()).unwrap();
        assert!(z.is_empty());

        let sd = baseline().baseline_std_dev(&ImageCollection::default()).unwrap();
        assert_eq!(sd.shape(), (0, 0));
    }

    #[test]
    fn test_ascending_series() {
        let processor = BaselineProcessor::new(
            BaselineParams::from_dates("2019-01-01", "2020-01-01")
                .unwrap()
                .with_direction(OrbitDirection::Ascending),
        );
        let z = processor.z_scores(&test_collection()).unwrap();
        assert_eq!(z.len(), 1);
        // single baseline observation: no sample standard deviation
        assert_eq!(z.images()[0].pixel("VV", 0, 0).unwrap(), None);
    }

    #[test]
    fn test_pixel_series() {
        let series = baseline()
            .pixel_series(&test_collection(), 0, 0, Band::VV)
            .unwrap();
        assert_eq!(series.len(), 4);
        assert!(series.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_abs_diff_eq!(series[0].1.unwrap(), 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(series[3].1.unwrap(), -3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_params_from_json() {
        let params: BaselineParams =
            serde_json::from_str(r#"{"start": "2017-01-01", "end": "2018-01-01"}"#).unwrap();
        assert_eq!(params.mode, AcquisitionMode::IW);
        assert_eq!(params.direction, OrbitDirection::Descending);

        let params: BaselineParams = serde_json::from_str(
            r#"{"start": "2017-01-01", "end": "2018-01-01", "mode": "SM", "direction": "ASCENDING"}"#,
        )
        .unwrap();
        assert_eq!(params.mode, AcquisitionMode::SM);
        assert_eq!(params.direction, OrbitDirection::Ascending);
    }
}
