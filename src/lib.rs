//! s1flood: Sentinel-1 flood mapping
//!
//! Computes backscatter z-scores against a baseline period and classifies
//! them into flood classes using long-term water occurrence and, optionally,
//! seasonal inundation probabilities.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    AcquisitionInfo, AcquisitionMode, Band, BandData, FloodError, FloodResult, OrbitDirection,
    NO_DATA,
};

pub use crate::core::{
    compute_anomaly, compute_baseline_mean, compute_baseline_std_dev, compute_z_score,
    BaselineParams, BaselineProcessor, Filter, FloodClass, FloodMap, FloodMapOptions,
    FloodMapParams, FloodMapper, ImageCollection, RasterImage, FLOOD_PALETTE,
};

pub use io::{DsweHistory, MonthlyWaterHistory, SeasonalWaterClassifier, WaterHistorySource};

/// Python module definition
#[cfg(feature = "python")]
mod python {
    use numpy::{PyArray2, PyReadonlyArray2, ToPyArray};
    use pyo3::prelude::*;

    use crate::core::{FloodBackground, InundationMask, WaterOccurrence};
    use crate::{Band, FloodError, FloodMapOptions, RasterImage, FLOOD_PALETTE};

    /// Class code written for masked pixels
    const NO_DATA_CODE: u8 = 255;

    fn to_py_err(e: FloodError) -> PyErr {
        match e {
            FloodError::InvalidParameter { .. } | FloodError::Config(_) | FloodError::Date(_) => {
                PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", e))
            }
            _ => PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e)),
        }
    }

    /// Classify z-score arrays against monthly water counts
    #[pyfunction]
    #[pyo3(signature = (
        zvv, zvh, valid_count, water_count, zvv_threshold, zvh_threshold,
        pow_threshold = None, pin_threshold = None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn classify_floods<'py>(
        py: Python<'py>,
        zvv: PyReadonlyArray2<f32>,
        zvh: PyReadonlyArray2<f32>,
        valid_count: PyReadonlyArray2<f32>,
        water_count: PyReadonlyArray2<f32>,
        zvv_threshold: f32,
        zvh_threshold: f32,
        pow_threshold: Option<f32>,
        pin_threshold: Option<f32>,
    ) -> PyResult<&'py PyArray2<u8>> {
        let options = FloodMapOptions {
            percent_open_water_threshold: pow_threshold,
            percent_inundation_threshold: pin_threshold,
            ..Default::default()
        };
        let params = options.resolve().map_err(to_py_err)?;

        let water = WaterOccurrence::from_counts(
            valid_count.as_array().to_owned(),
            water_count.as_array().to_owned(),
        )
        .map_err(to_py_err)?;
        let inundation = InundationMask::from_water_occurrence(
            &water,
            params.percent_open_water_threshold,
            params.percent_inundation_threshold,
        )
        .map_err(to_py_err)?;

        let z = RasterImage::from_bands(vec![
            (Band::VV.name(), zvv.as_array().to_owned()),
            (Band::VH.name(), zvh.as_array().to_owned()),
        ])
        .map_err(to_py_err)?;

        let map = FloodBackground::new(water, inundation)
            .classify(&z, zvv_threshold, zvh_threshold)
            .map_err(to_py_err)?;

        Ok(map.codes(NO_DATA_CODE).to_pyarray(py))
    }

    /// Colour palette indexed by class code
    #[pyfunction]
    fn flood_palette() -> Vec<&'static str> {
        FLOOD_PALETTE.to_vec()
    }

    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(classify_floods, m)?)?;
        m.add_function(wrap_pyfunction!(flood_palette, m)?)?;
        m.add("NO_DATA", NO_DATA_CODE)?;
        Ok(())
    }
}
