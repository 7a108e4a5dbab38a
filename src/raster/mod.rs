use crate::projection::{Extent, ProjectionError};
use crate::tiff::TiffError;
use crate::geotags::GeoTiffError;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::io;
use thiserror::Error;

mod compression;
mod format;
mod geotiff;
mod legend;
mod ops;
mod pam;

pub use compression::{Compression, DecompressError, Predictor};
pub use geotiff::{decode_geotiff, encode_geotiff, read_geotiff, write_geotiff};
pub use legend::{Legend, LegendEntry};
pub use pam::{pam_sidecar_path, pam_xml, write_pam_legend};

/// Cell value meaning "no data". Class codes start at 1.
pub const NODATA: u8 = 0;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("cell buffer holds {actual} values, grid needs {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error("invalid grid: {0}")]
    InvalidGrid(String),
    #[error("grids do not share a shape: {0}")]
    ShapeMismatch(String),
    #[error("crop window {0} does not overlap the grid")]
    EmptyWindow(Extent),
    #[error("class code {0} does not fit a categorical grid")]
    CodeOutOfRange(u64),
    #[error("invalid legend: {0}")]
    InvalidLegend(String),
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error(transparent)]
    Decompress(#[from] DecompressError),
    #[error(transparent)]
    Tiff(#[from] TiffError),
    #[error(transparent)]
    GeoTiff(#[from] GeoTiffError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Fixed geometry of a north-up grid: extent, cell counts and CRS.
///
/// Resolution is derived from extent and cell counts, so forcing a new extent
/// keeps the cell layout and adjusts the resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub extent: Extent,
    pub cols: usize,
    pub rows: usize,
    pub epsg: u16,
}

impl GridSpec {
    pub fn new(extent: Extent, cols: usize, rows: usize, epsg: u16) -> Result<Self, RasterError> {
        if !extent.is_valid() {
            return Err(RasterError::InvalidGrid(format!("degenerate extent {extent}")));
        }
        if cols == 0 || rows == 0 {
            return Err(RasterError::InvalidGrid(format!("{cols}x{rows} cells")));
        }
        Ok(Self {
            extent,
            cols,
            rows,
            epsg,
        })
    }

    /// Grid anchored at the top-left corner of `extent` with square cells of
    /// `resolution`. Partial cells along the right and bottom edges are kept
    /// whole, growing the extent to a multiple of the resolution.
    pub fn from_resolution(extent: Extent, resolution: f64, epsg: u16) -> Result<Self, RasterError> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(RasterError::InvalidGrid(format!("resolution {resolution}")));
        }
        if !extent.is_valid() {
            return Err(RasterError::InvalidGrid(format!("degenerate extent {extent}")));
        }
        let cols = cells_along(extent.width(), resolution);
        let rows = cells_along(extent.height(), resolution);
        let snapped = Extent::new(
            extent.min_x,
            extent.max_y - rows as f64 * resolution,
            extent.min_x + cols as f64 * resolution,
            extent.max_y,
        );
        Self::new(snapped, cols, rows, epsg)
    }

    pub fn resolution(&self) -> (f64, f64) {
        (
            self.extent.width() / self.cols as f64,
            self.extent.height() / self.rows as f64,
        )
    }

    /// Area of one cell in squared CRS units.
    pub fn cell_area(&self) -> f64 {
        let (rx, ry) = self.resolution();
        rx * ry
    }

    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        let (rx, ry) = self.resolution();
        (
            self.extent.min_x + (col as f64 + 0.5) * rx,
            self.extent.max_y - (row as f64 + 0.5) * ry,
        )
    }

    /// Cell containing a point; cells are closed on the top-left edges.
    pub fn cell_at(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (rx, ry) = self.resolution();
        let u = (x - self.extent.min_x) / rx;
        let v = (self.extent.max_y - y) / ry;
        if !(u >= 0.0 && v >= 0.0) {
            return None;
        }
        let (col, row) = (u.floor() as usize, v.floor() as usize);
        (col < self.cols && row < self.rows).then_some((col, row))
    }

    pub fn with_extent(&self, extent: Extent) -> Result<Self, RasterError> {
        Self::new(extent, self.cols, self.rows, self.epsg)
    }
}

impl Display for GridSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (rx, ry) = self.resolution();
        write!(
            f,
            "Grid({}x{}, {}x{} cells, EPSG:{}, {})",
            rx, ry, self.cols, self.rows, self.epsg, self.extent
        )
    }
}

fn cells_along(length: f64, resolution: f64) -> usize {
    let n = length / resolution;
    let rounded = n.round();
    if (n - rounded).abs() < 1e-6 {
        rounded as usize
    } else {
        n.ceil() as usize
    }
}

/// Single-band grid of class codes, row-major from the top-left cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalGrid {
    spec: GridSpec,
    cells: Vec<u8>,
    legend: Option<Legend>,
}

impl CategoricalGrid {
    /// A grid where every cell is no data.
    pub fn empty(spec: GridSpec) -> Self {
        Self {
            spec,
            cells: vec![NODATA; spec.len()],
            legend: None,
        }
    }

    pub fn from_cells(spec: GridSpec, cells: Vec<u8>) -> Result<Self, RasterError> {
        if cells.len() != spec.len() {
            return Err(RasterError::BufferSize {
                expected: spec.len(),
                actual: cells.len(),
            });
        }
        Ok(Self {
            spec,
            cells,
            legend: None,
        })
    }

    pub fn with_legend(mut self, legend: Legend) -> Self {
        self.legend = Some(legend);
        self
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn legend(&self) -> Option<&Legend> {
        self.legend.as_ref()
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn get(&self, col: usize, row: usize) -> Option<u8> {
        if col >= self.spec.cols || row >= self.spec.rows {
            return None;
        }
        Some(self.cells[row * self.spec.cols + col])
    }

    pub(crate) fn row_mut(&mut self, row: usize) -> &mut [u8] {
        let cols = self.spec.cols;
        &mut self.cells[row * cols..(row + 1) * cols]
    }

    /// Cell count per class code, excluding no data.
    pub fn counts(&self) -> BTreeMap<u8, u64> {
        let mut histogram = [0_u64; 256];
        for &code in &self.cells {
            histogram[code as usize] += 1;
        }
        histogram
            .iter()
            .enumerate()
            .filter(|(code, count)| *code != NODATA as usize && **count > 0)
            .map(|(code, count)| (code as u8, *count))
            .collect()
    }

    /// Distinct class codes present, excluding no data.
    pub fn codes(&self) -> BTreeSet<u8> {
        self.counts().into_keys().collect()
    }

    pub fn nodata_count(&self) -> u64 {
        self.cells.iter().filter(|c| **c == NODATA).count() as u64
    }
}

impl Display for CategoricalGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CategoricalGrid({}, {} classes)", self.spec, self.codes().len())
    }
}
