//! Core flood mapping modules

pub mod band_math;
pub mod collection;
pub mod flood_map;
pub mod inundation;
pub mod water_mask;
pub mod zscore;

// Re-export main types
pub use band_math::RasterImage;
pub use collection::{Filter, ImageCollection};
pub use flood_map::{
    FloodBackground, FloodClass, FloodClassStats, FloodMap, FloodMapOptions, FloodMapParams,
    FloodMapper, FLOOD_CLASS_BAND, FLOOD_PALETTE,
};
pub use inundation::{InundationMask, InundationSource};
pub use water_mask::WaterOccurrence;
pub use zscore::{
    compute_anomaly, compute_baseline_mean, compute_baseline_std_dev, compute_z_score,
    BaselineParams, BaselineProcessor,
};
