use crate::projection::{Extent, ProjectionError};
use crate::raster::RasterError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Everything that can stop a run. None of these are retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("cannot read shapefile {path}: {source}")]
    Shapefile {
        path: PathBuf,
        source: shapefile::Error,
    },
    #[error("cannot read GeoJSON {path}: {source}")]
    GeoJson {
        path: PathBuf,
        source: geojson::Error,
    },
    #[error("CSV error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("invalid configuration {path}: {source}")]
    Config {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("layer {layer}: {message}")]
    Schema { layer: String, message: String },
    #[error("layer {layer}: feature {id} is still invalid after repair")]
    InvalidGeometry { layer: String, id: i64 },
    #[error("cannot align {subject} to {reference}: off by {deviation} (tolerance {tolerance})")]
    Alignment {
        reference: Extent,
        subject: Extent,
        deviation: f64,
        tolerance: f64,
    },
    #[error("EPSG:{epsg} is not supported here: {reason}")]
    UnsupportedCrs { epsg: u16, reason: String },
    #[error("cannot render chart: {0}")]
    Chart(String),
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

impl PipelineError {
    pub fn io<P: Into<PathBuf>>(path: P, source: io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn schema<L: Into<String>, M: Into<String>>(layer: L, message: M) -> Self {
        PipelineError::Schema {
            layer: layer.into(),
            message: message.into(),
        }
    }
}
