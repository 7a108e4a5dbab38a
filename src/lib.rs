//! Land-cover change between a hand-digitized 1848 survey and a 2018
//! satellite classification.
//!
//! The pipeline loads a contour boundary, harmonizes the historical vector
//! layers, rasterizes them, aligns and masks the modern raster onto the same
//! grid, computes per-class areas and writes everything to disk.

pub mod align;
pub mod area;
pub mod class;
pub mod config;
pub mod error;
pub mod geotags;
pub mod pipeline;
pub mod projection;
pub mod raster;
pub mod rasterize;
pub mod report;
pub mod tiff;
pub mod vector;

pub use class::{ClassLabel, RemapTable};
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{run, PipelineOutputs};
