//! Burns harmonized polygons into a categorical grid.
//!
//! A cell takes the class of a feature when the feature covers the cell
//! centre. Features are burned in collection order, so later features win
//! where they overlap earlier ones.

use crate::error::{PipelineError, PipelineResult};
use crate::raster::{CategoricalGrid, GridSpec, Legend};
use crate::vector::FeatureCollection;
use geo::BoundingRect;
use geo_types::{Coord, Polygon};
use tracing::{debug, info};

pub fn rasterize(
    collection: &FeatureCollection,
    spec: &GridSpec,
    legend: &Legend,
) -> PipelineResult<CategoricalGrid> {
    if collection.epsg != spec.epsg {
        return Err(PipelineError::UnsupportedCrs {
            epsg: collection.epsg,
            reason: format!("features must be in the grid CRS EPSG:{}", spec.epsg),
        });
    }

    let mut grid = CategoricalGrid::empty(*spec);
    let mut burned = 0;
    for feature in collection.iter() {
        let code = legend.code(feature.class_label).ok_or_else(|| {
            PipelineError::schema(
                "rasterize",
                format!("class {} has no code in the legend", feature.class_label),
            )
        })?;
        let mut cells = 0;
        for polygon in &feature.geometry {
            cells += burn_polygon(&mut grid, polygon, code);
        }
        if cells > 0 {
            burned += 1;
        } else {
            debug!("Feature {} covers no cell centre", feature.id);
        }
    }

    info!(
        "Rasterized {burned} of {} features onto {}",
        collection.len(),
        spec
    );
    Ok(grid.with_legend(legend.clone()))
}

/// Even-odd scanline fill over all rings, sampled at cell centres.
fn burn_polygon(grid: &mut CategoricalGrid, polygon: &Polygon<f64>, code: u8) -> usize {
    let Some(bounds) = polygon.bounding_rect() else {
        return 0;
    };
    let spec = *grid.spec();
    let (rx, ry) = spec.resolution();
    let edges: Vec<(Coord<f64>, Coord<f64>)> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .flat_map(|ring| ring.lines().map(|line| (line.start, line.end)))
        .collect();

    let first_row = index_at_or_after((spec.extent.max_y - bounds.max().y) / ry - 0.5, spec.rows);
    let last_row = index_at_or_after((spec.extent.max_y - bounds.min().y) / ry - 0.5, spec.rows);

    let mut count = 0;
    let mut crossings = Vec::new();
    for row in first_row..last_row.min(spec.rows) {
        let y = spec.extent.max_y - (row as f64 + 0.5) * ry;
        crossings.clear();
        for (a, b) in &edges {
            if (a.y > y) != (b.y > y) {
                crossings.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
            }
        }
        crossings.sort_by(f64::total_cmp);

        let cells = grid.row_mut(row);
        for span in crossings.chunks_exact(2) {
            let start = index_at_or_after((span[0] - spec.extent.min_x) / rx - 0.5, spec.cols);
            let end = index_at_or_after((span[1] - spec.extent.min_x) / rx - 0.5, spec.cols);
            for cell in &mut cells[start..end.max(start)] {
                *cell = code;
            }
            count += end.saturating_sub(start);
        }
    }
    count
}

/// Smallest index `i >= position`, clamped to `0..=len`.
fn index_at_or_after(position: f64, len: usize) -> usize {
    position.ceil().clamp(0.0, len as f64) as usize
}
