//! Time-ordered image collections with metadata filters and temporal reducers

use chrono::{Datelike, NaiveDate};
use ndarray::{Array3, Zip};
use serde::{Deserialize, Serialize};

use super::band_math::RasterImage;
use crate::types::{AcquisitionMode, FloodError, FloodResult, OrbitDirection, NO_DATA};

/// Filter over image metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Acquisition date in `[start, end)`
    Date { start: NaiveDate, end: NaiveDate },
    /// Day of year in `[start, end]`, wrapping past new year when `start > end`
    DayOfYear { start: u32, end: u32 },
    /// Orbit pass equals the given direction
    OrbitPass(OrbitDirection),
    /// Instrument mode equals the given mode
    InstrumentMode(AcquisitionMode),
}

impl Filter {
    pub fn date(start: NaiveDate, end: NaiveDate) -> Self {
        Filter::Date { start, end }
    }

    pub fn day_of_year(start: u32, end: u32) -> Self {
        Filter::DayOfYear { start, end }
    }

    /// Images lacking the filtered property never match
    pub fn matches(&self, image: &RasterImage) -> bool {
        match self {
            Filter::Date { start, end } => image
                .time_start()
                .map(|t| {
                    let date = t.date_naive();
                    date >= *start && date < *end
                })
                .unwrap_or(false),
            Filter::DayOfYear { start, end } => image
                .time_start()
                .map(|t| {
                    let doy = t.ordinal();
                    if start <= end {
                        doy >= *start && doy <= *end
                    } else {
                        doy >= *start || doy <= *end
                    }
                })
                .unwrap_or(false),
            Filter::OrbitPass(direction) => image
                .acquisition()
                .map(|a| a.orbit_pass == *direction)
                .unwrap_or(false),
            Filter::InstrumentMode(mode) => image
                .acquisition()
                .map(|a| a.instrument_mode == *mode)
                .unwrap_or(false),
        }
    }
}

/// Collection of raster images ordered by acquisition time
#[derive(Debug, Clone, Default)]
pub struct ImageCollection {
    images: Vec<RasterImage>,
}

impl ImageCollection {
    /// Build a collection; images are sorted by `time_start` (untimed first)
    pub fn new(mut images: Vec<RasterImage>) -> Self {
        images.sort_by_key(|image| image.time_start());
        Self { images }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[RasterImage] {
        &self.images
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RasterImage> {
        self.images.iter()
    }

    pub fn first(&self) -> Option<&RasterImage> {
        self.images.first()
    }

    pub fn filter(&self, filter: &Filter) -> ImageCollection {
        self.filter_all(std::slice::from_ref(filter))
    }

    /// Keep images matching every filter
    pub fn filter_all(&self, filters: &[Filter]) -> ImageCollection {
        ImageCollection {
            images: self.select(filters).into_iter().cloned().collect(),
        }
    }

    /// Borrow the images matching every filter, in collection order
    pub fn select(&self, filters: &[Filter]) -> Vec<&RasterImage> {
        self.images
            .iter()
            .filter(|image| filters.iter().all(|f| f.matches(image)))
            .collect()
    }

    pub fn filter_orbit(&self, direction: OrbitDirection) -> ImageCollection {
        self.filter(&Filter::OrbitPass(direction))
    }

    pub fn filter_mode(&self, mode: AcquisitionMode) -> ImageCollection {
        self.filter(&Filter::InstrumentMode(mode))
    }

    pub fn filter_date(&self, start: NaiveDate, end: NaiveDate) -> ImageCollection {
        self.filter(&Filter::date(start, end))
    }

    pub fn filter_day_of_year(&self, start: u32, end: u32) -> ImageCollection {
        self.filter(&Filter::day_of_year(start, end))
    }

    /// Apply `f` to every image, keeping collection order
    pub fn map<F>(&self, f: F) -> FloodResult<ImageCollection>
    where
        F: Fn(&RasterImage) -> FloodResult<RasterImage> + Sync + Send,
    {
        map_images(&self.refs(), f)
    }

    /// Per-pixel mean over time, skipping no-data samples
    pub fn mean(&self) -> FloodResult<RasterImage> {
        reduce_mean(&self.refs())
    }

    /// Per-pixel sum over time, skipping no-data samples
    pub fn sum(&self) -> FloodResult<RasterImage> {
        let images = self.refs();
        let (sum, count) = accumulate(&images)?;
        let data = Zip::from(&sum)
            .and(&count)
            .map_collect(|&s, &c| if c > 0 { s as f32 } else { NO_DATA });
        RasterImage::new(data, reducer_band_names(&images, ""))
    }

    /// Per-pixel number of valid (non no-data) samples
    pub fn count(&self) -> FloodResult<RasterImage> {
        let images = self.refs();
        let (_, count) = accumulate(&images)?;
        RasterImage::new(count.mapv(|c| c as f32), reducer_band_names(&images, "_count"))
    }

    /// Per-pixel sample standard deviation over time.
    ///
    /// Pixels with fewer than two valid samples are no-data. Output bands
    /// carry a `_stdDev` suffix.
    pub fn std_dev(&self) -> FloodResult<RasterImage> {
        reduce_std_dev(&self.refs())
    }

    fn refs(&self) -> Vec<&RasterImage> {
        self.images.iter().collect()
    }
}

/// Apply `f` to borrowed images, keeping their order
pub(crate) fn map_images<F>(images: &[&RasterImage], f: F) -> FloodResult<ImageCollection>
where
    F: Fn(&RasterImage) -> FloodResult<RasterImage> + Sync + Send,
{
    #[cfg(feature = "parallel")]
    let images: FloodResult<Vec<RasterImage>> = {
        use rayon::prelude::*;
        images.par_iter().map(|image| f(image)).collect()
    };

    #[cfg(not(feature = "parallel"))]
    let images: FloodResult<Vec<RasterImage>> = images.iter().map(|image| f(image)).collect();

    Ok(ImageCollection { images: images? })
}

pub(crate) fn reduce_mean(images: &[&RasterImage]) -> FloodResult<RasterImage> {
    let (sum, count) = accumulate(images)?;
    let data = Zip::from(&sum)
        .and(&count)
        .map_collect(|&s, &c| if c > 0 { (s / c as f64) as f32 } else { NO_DATA });
    RasterImage::new(data, reducer_band_names(images, ""))
}

pub(crate) fn reduce_std_dev(images: &[&RasterImage]) -> FloodResult<RasterImage> {
    let (sum, count) = accumulate(images)?;
    let mean = Zip::from(&sum)
        .and(&count)
        .map_collect(|&s, &c| if c > 0 { s / c as f64 } else { f64::NAN });

    let mut squares = Array3::<f64>::zeros(sum.dim());
    for image in images {
        Zip::from(&mut squares)
            .and(&mean)
            .and(image.data())
            .for_each(|sq, &m, &x| {
                if !x.is_nan() {
                    let d = x as f64 - m;
                    *sq += d * d;
                }
            });
    }

    let data = Zip::from(&squares).and(&count).map_collect(|&sq, &c| {
        if c > 1 {
            (sq / (c - 1) as f64).sqrt() as f32
        } else {
            NO_DATA
        }
    });

    log::debug!("Reduced {} images to sample standard deviation", images.len());
    RasterImage::new(data, reducer_band_names(images, "_stdDev"))
}

/// Mean and sample standard deviation of a pixel's valid samples.
///
/// Same arithmetic as the raster reducers, so a single pixel can be
/// reduced without materialising whole bands.
pub(crate) fn pixel_mean_std_dev<I>(samples: I) -> (f32, f32)
where
    I: IntoIterator<Item = f32>,
{
    let valid: Vec<f64> = samples
        .into_iter()
        .filter(|x| !x.is_nan())
        .map(f64::from)
        .collect();
    let n = valid.len();
    if n == 0 {
        return (NO_DATA, NO_DATA);
    }

    let mean = valid.iter().sum::<f64>() / n as f64;
    let sd = if n > 1 {
        let sq: f64 = valid.iter().map(|x| (x - mean) * (x - mean)).sum();
        (sq / (n - 1) as f64).sqrt() as f32
    } else {
        NO_DATA
    };
    (mean as f32, sd)
}

/// Sum and valid-sample count per band and pixel
fn accumulate(images: &[&RasterImage]) -> FloodResult<(Array3<f64>, Array3<u32>)> {
    let first = images.first().ok_or_else(|| {
        FloodError::Processing("Cannot reduce an empty image collection".to_string())
    })?;

    let dim = first.data().dim();
    let mut sum = Array3::<f64>::zeros(dim);
    let mut count = Array3::<u32>::zeros(dim);

    for image in images {
        if image.data().dim() != dim {
            let (_, rows, cols) = dim;
            return Err(if image.band_count() != first.band_count() {
                FloodError::Band(format!(
                    "Collection mixes {} and {} band images",
                    first.band_count(),
                    image.band_count()
                ))
            } else {
                FloodError::ShapeMismatch {
                    expected: (rows, cols),
                    actual: image.shape(),
                }
            });
        }

        Zip::from(&mut sum)
            .and(&mut count)
            .and(image.data())
            .for_each(|s, c, &x| {
                if !x.is_nan() {
                    *s += x as f64;
                    *c += 1;
                }
            });
    }

    Ok((sum, count))
}

fn reducer_band_names(images: &[&RasterImage], suffix: &str) -> Vec<String> {
    images
        .first()
        .map(|image| {
            image
                .band_names()
                .iter()
                .map(|name| format!("{}{}", name, suffix))
                .collect()
        })
        .unwrap_or_default()
}

impl FromIterator<RasterImage> for ImageCollection {
    fn from_iter<I: IntoIterator<Item = RasterImage>>(iter: I) -> Self {
        ImageCollection::new(iter.into_iter().collect())
    }
}

impl IntoIterator for ImageCollection {
    type Item = RasterImage;
    type IntoIter = std::vec::IntoIter<RasterImage>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.into_iter()
    }
}
