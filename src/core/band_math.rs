//! Per-pixel raster algebra on multi-band images
//!
//! `NaN` is the no-data value. Arithmetic propagates it, comparisons
//! return 1.0 / 0.0 (or no-data), and the masking operations follow the
//! usual "masked input stays masked" rule.

use chrono::{DateTime, Utc};
use ndarray::{Array, Array3, ArrayView, ArrayView2, Axis, Dimension, Zip};

use crate::types::{AcquisitionInfo, Band, BandData, BandStack, FloodError, FloodResult, NO_DATA};

/// Multi-band raster with acquisition metadata
#[derive(Debug, Clone)]
pub struct RasterImage {
    data: BandStack,
    band_names: Vec<String>,
    time_start: Option<DateTime<Utc>>,
    acquisition: Option<AcquisitionInfo>,
}

impl RasterImage {
    /// Create an image from a band stack (band x rows x cols)
    pub fn new(data: BandStack, band_names: Vec<String>) -> FloodResult<Self> {
        if band_names.is_empty() {
            return Err(FloodError::Band("Image must have at least one band".to_string()));
        }
        if data.len_of(Axis(0)) != band_names.len() {
            return Err(FloodError::Band(format!(
                "{} band names given for {} bands",
                band_names.len(),
                data.len_of(Axis(0))
            )));
        }

        Ok(Self {
            data,
            band_names,
            time_start: None,
            acquisition: None,
        })
    }

    /// Create an image from named 2D bands of equal shape
    pub fn from_bands<S: Into<String>>(bands: Vec<(S, BandData)>) -> FloodResult<Self> {
        let (names, arrays): (Vec<String>, Vec<BandData>) =
            bands.into_iter().map(|(name, data)| (name.into(), data)).unzip();
        let data = stack_bands(&arrays)?;
        Self::new(data, names)
    }

    /// Single-band image
    pub fn from_band(name: &str, data: BandData) -> FloodResult<Self> {
        Self::from_bands(vec![(name, data)])
    }

    /// VV / VH / angle backscatter observation
    pub fn from_sar_bands(vv: BandData, vh: BandData, angle: BandData) -> FloodResult<Self> {
        Self::from_bands(vec![
            (Band::VV.name(), vv),
            (Band::VH.name(), vh),
            (Band::Angle.name(), angle),
        ])
    }

    /// Single-band image filled with one value
    pub fn constant(name: &str, value: f32, shape: (usize, usize)) -> Self {
        Self {
            data: Array3::from_elem((1, shape.0, shape.1), value),
            band_names: vec![name.to_string()],
            time_start: None,
            acquisition: None,
        }
    }

    pub fn with_time_start(mut self, time_start: DateTime<Utc>) -> Self {
        self.time_start = Some(time_start);
        self
    }

    pub fn with_acquisition(mut self, acquisition: AcquisitionInfo) -> Self {
        self.acquisition = Some(acquisition);
        self
    }

    pub fn set_time_start(&mut self, time_start: Option<DateTime<Utc>>) {
        self.time_start = time_start;
    }

    pub fn time_start(&self) -> Option<DateTime<Utc>> {
        self.time_start
    }

    pub fn acquisition(&self) -> Option<AcquisitionInfo> {
        self.acquisition
    }

    pub fn band_names(&self) -> &[String] {
        &self.band_names
    }

    pub fn band_count(&self) -> usize {
        self.band_names.len()
    }

    /// Raster shape as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        let (_, rows, cols) = self.data.dim();
        (rows, cols)
    }

    pub fn data(&self) -> &BandStack {
        &self.data
    }

    fn band_index(&self, name: &str) -> FloodResult<usize> {
        self.band_names
            .iter()
            .position(|b| b == name)
            .ok_or_else(|| {
                FloodError::Band(format!(
                    "Band '{}' not found (available: {:?})",
                    name, self.band_names
                ))
            })
    }

    /// View of one band by name
    pub fn band(&self, name: &str) -> FloodResult<ArrayView2<'_, f32>> {
        let index = self.band_index(name)?;
        Ok(self.data.index_axis(Axis(0), index))
    }

    /// Pixel value, `None` where the pixel is no-data
    pub fn pixel(&self, name: &str, row: usize, col: usize) -> FloodResult<Option<f32>> {
        let band = self.band(name)?;
        let value = band.get((row, col)).copied().ok_or_else(|| {
            FloodError::Processing(format!(
                "Pixel ({}, {}) outside raster of shape {:?}",
                row,
                col,
                self.shape()
            ))
        })?;
        Ok(if value.is_nan() { None } else { Some(value) })
    }

    /// New image with the given bands, keeping metadata
    pub fn select(&self, names: &[&str]) -> FloodResult<RasterImage> {
        let bands = names
            .iter()
            .map(|name| self.band(name).map(|b| b.to_owned()))
            .collect::<FloodResult<Vec<_>>>()?;
        Ok(self.derive(
            stack_bands(&bands)?,
            names.iter().map(|n| n.to_string()).collect(),
        ))
    }

    /// Replace all band names, keeping order
    pub fn rename(&self, names: &[&str]) -> FloodResult<RasterImage> {
        if names.len() != self.band_count() {
            return Err(FloodError::Band(format!(
                "Cannot rename {} bands to {:?}",
                self.band_count(),
                names
            )));
        }
        Ok(self.derive(self.data.clone(), names.iter().map(|n| n.to_string()).collect()))
    }

    /// Apply a function to every valid pixel; no-data is preserved
    pub fn map_values<F>(&self, f: F) -> RasterImage
    where
        F: Fn(f32) -> f32 + Sync + Send,
    {
        let data = map_pixels(self.data.view(), |x| if x.is_nan() { x } else { f(x) });
        self.derive(data, self.band_names.clone())
    }

    pub fn multiply_scalar(&self, k: f32) -> RasterImage {
        self.map_values(|x| x * k)
    }

    pub fn lte(&self, threshold: f32) -> RasterImage {
        self.compare(|x| x <= threshold)
    }

    pub fn gte(&self, threshold: f32) -> RasterImage {
        self.compare(|x| x >= threshold)
    }

    pub fn gt(&self, threshold: f32) -> RasterImage {
        self.compare(|x| x > threshold)
    }

    pub fn eq(&self, value: f32) -> RasterImage {
        self.compare(|x| x == value)
    }

    fn compare<F>(&self, predicate: F) -> RasterImage
    where
        F: Fn(f32) -> bool + Sync + Send,
    {
        self.map_values(|x| if predicate(x) { 1.0 } else { 0.0 })
    }

    pub fn add(&self, other: &RasterImage) -> FloodResult<RasterImage> {
        self.binary_op(other, |a, b| a + b)
    }

    pub fn subtract(&self, other: &RasterImage) -> FloodResult<RasterImage> {
        self.binary_op(other, |a, b| a - b)
    }

    pub fn multiply(&self, other: &RasterImage) -> FloodResult<RasterImage> {
        self.binary_op(other, |a, b| a * b)
    }

    /// Band-wise division; division by zero yields no-data
    pub fn divide(&self, other: &RasterImage) -> FloodResult<RasterImage> {
        self.binary_op(other, |a, b| if b == 0.0 { NO_DATA } else { a / b })
    }

    /// Replace pixels with `value` where `test` is non-zero.
    ///
    /// Masked input pixels stay masked, masked test pixels keep the input.
    pub fn where_(&self, test: &RasterImage, value: f32) -> FloodResult<RasterImage> {
        self.binary_op(test, |input, t| {
            if input.is_nan() || t.is_nan() || t == 0.0 {
                input
            } else {
                value
            }
        })
    }

    /// Mask out pixels where `mask` is zero or no-data
    pub fn update_mask(&self, mask: &RasterImage) -> FloodResult<RasterImage> {
        self.binary_op(mask, |x, m| if m.is_nan() || m == 0.0 { NO_DATA } else { x })
    }

    /// Band-wise binary operation.
    ///
    /// Band counts must match, or one side must be single-band (broadcast).
    /// Output keeps the metadata of `self`.
    fn binary_op<F>(&self, other: &RasterImage, f: F) -> FloodResult<RasterImage>
    where
        F: Fn(f32, f32) -> f32 + Sync + Send,
    {
        if self.shape() != other.shape() {
            return Err(FloodError::ShapeMismatch {
                expected: self.shape(),
                actual: other.shape(),
            });
        }

        let (n, m) = (self.band_count(), other.band_count());
        if n != m && n != 1 && m != 1 {
            return Err(FloodError::Band(format!(
                "Band count mismatch: {} vs {}",
                n, m
            )));
        }

        let out_bands = n.max(m);
        let names = if n >= m {
            self.band_names.clone()
        } else {
            other.band_names.clone()
        };

        let bands: Vec<BandData> = (0..out_bands)
            .map(|i| {
                let a = self.data.index_axis(Axis(0), if n == 1 { 0 } else { i });
                let b = other.data.index_axis(Axis(0), if m == 1 { 0 } else { i });
                zip_pixels(a, b, &f)
            })
            .collect();

        Ok(self.derive(stack_bands(&bands)?, names))
    }

    fn derive(&self, data: BandStack, band_names: Vec<String>) -> RasterImage {
        RasterImage {
            data,
            band_names,
            time_start: self.time_start,
            acquisition: self.acquisition,
        }
    }
}

/// Stack equally shaped 2D bands along a new leading axis
pub(crate) fn stack_bands(bands: &[BandData]) -> FloodResult<BandStack> {
    if bands.is_empty() {
        return Err(FloodError::Band("No bands to stack".to_string()));
    }
    let expected = bands[0].dim();
    if let Some(bad) = bands.iter().find(|b| b.dim() != expected) {
        return Err(FloodError::ShapeMismatch {
            expected,
            actual: bad.dim(),
        });
    }
    let views: Vec<ArrayView2<f32>> = bands.iter().map(|b| b.view()).collect();
    ndarray::stack(Axis(0), &views)
        .map_err(|e| FloodError::Processing(format!("Shape error: {}", e)))
}

#[cfg(feature = "parallel")]
fn map_pixels<D, F>(a: ArrayView<f32, D>, f: F) -> Array<f32, D>
where
    D: Dimension,
    F: Fn(f32) -> f32 + Sync + Send,
{
    Zip::from(a).par_map_collect(|&x| f(x))
}

#[cfg(not(feature = "parallel"))]
fn map_pixels<D, F>(a: ArrayView<f32, D>, f: F) -> Array<f32, D>
where
    D: Dimension,
    F: Fn(f32) -> f32 + Sync + Send,
{
    Zip::from(a).map_collect(|&x| f(x))
}

#[cfg(feature = "parallel")]
fn zip_pixels<F>(a: ArrayView2<f32>, b: ArrayView2<f32>, f: &F) -> BandData
where
    F: Fn(f32, f32) -> f32 + Sync + Send,
{
    Zip::from(a).and(b).par_map_collect(|&x, &y| f(x, y))
}

#[cfg(not(feature = "parallel"))]
fn zip_pixels<F>(a: ArrayView2<f32>, b: ArrayView2<f32>, f: &F) -> BandData
where
    F: Fn(f32, f32) -> f32 + Sync + Send,
{
    Zip::from(a).and(b).map_collect(|&x, &y| f(x, y))
}
