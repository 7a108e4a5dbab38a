use super::source::read_vector;
use crate::error::{PipelineError, PipelineResult};
use crate::projection::{Crs, Extent};
use geo::{unary_union, BooleanOps, BoundingRect};
use geo_types::{Geometry, LineString, MultiLineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// File holding the study boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourSource {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epsg: Option<u16>,
}

/// The 1400 m contour: one (multi)polygon in the target CRS that every
/// harmonized feature is clipped to.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub epsg: u16,
    pub boundary: MultiPolygon<f64>,
}

impl Contour {
    pub fn new(epsg: u16, boundary: MultiPolygon<f64>) -> Self {
        Self { epsg, boundary }
    }

    pub fn clip_polygons(&self, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        self.boundary.intersection(geometry)
    }

    pub fn clip_lines(&self, geometry: &MultiLineString<f64>) -> MultiLineString<f64> {
        self.boundary.clip(geometry, false)
    }

    pub fn extent(&self) -> Option<Extent> {
        self.boundary.bounding_rect().map(Extent::from)
    }
}

/// Reads the boundary file, dissolves its parts and reprojects to `target`.
///
/// Polygons are taken as is; closed line strings (a contour traced as a
/// polyline) are closed into polygons. Anything else is ignored.
pub fn load_contour(source: &ContourSource, target: &Crs) -> PipelineResult<Contour> {
    let layer = read_vector("contour", &source.path, source.epsg)?;
    let source_crs = Crs::from_epsg(layer.epsg)?;

    let mut parts: Vec<Polygon<f64>> = Vec::new();
    for geometry in layer.features.into_iter().filter_map(|f| f.geometry) {
        collect_rings(geometry, &mut parts);
    }
    if parts.is_empty() {
        return Err(PipelineError::schema(
            "contour",
            format!("{} holds no polygon", source.path.display()),
        ));
    }

    let dissolved = unary_union(parts.iter());
    let boundary = source_crs.reproject(target, &dissolved)?;
    let contour = Contour::new(target.epsg(), boundary);
    info!(
        "Loaded contour from {} ({} parts, extent {})",
        source.path.display(),
        contour.boundary.0.len(),
        contour
            .extent()
            .map_or_else(|| "empty".to_string(), |e| e.to_string())
    );
    Ok(contour)
}

fn collect_rings(geometry: Geometry<f64>, parts: &mut Vec<Polygon<f64>>) {
    match geometry {
        Geometry::Polygon(polygon) => parts.push(polygon),
        Geometry::MultiPolygon(multi) => parts.extend(multi),
        Geometry::LineString(line) => push_closed(line, parts),
        Geometry::MultiLineString(lines) => lines.into_iter().for_each(|l| push_closed(l, parts)),
        Geometry::GeometryCollection(collection) => {
            collection.into_iter().for_each(|g| collect_rings(g, parts))
        }
        _ => {}
    }
}

fn push_closed(line: LineString<f64>, parts: &mut Vec<Polygon<f64>>) {
    if line.0.len() >= 4 && line.is_closed() {
        parts.push(Polygon::new(line, vec![]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::Area;
    use geo_types::{line_string, polygon};

    fn square() -> Contour {
        let boundary = polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)];
        Contour::new(32643, MultiPolygon::new(vec![boundary]))
    }

    #[test]
    fn polygons_are_cut_to_the_boundary() {
        let overhang = polygon![(x: 5.0, y: 5.0), (x: 15.0, y: 5.0), (x: 15.0, y: 15.0), (x: 5.0, y: 15.0)];
        let clipped = square().clip_polygons(&MultiPolygon::new(vec![overhang]));
        assert_relative_eq!(clipped.unsigned_area(), 25.0, epsilon = 1e-9);
    }

    #[test]
    fn lines_are_cut_to_the_boundary() {
        let road = MultiLineString::new(vec![line_string![(x: -5.0, y: 5.0), (x: 5.0, y: 5.0)]]);
        let clipped = square().clip_lines(&road);
        let xs: Vec<f64> = clipped.0.iter().flat_map(|l| l.0.iter().map(|c| c.x)).collect();
        assert!(xs.iter().all(|x| *x >= -1e-9 && *x <= 5.0 + 1e-9));
        assert!(!clipped.0.is_empty());
    }

    #[test]
    fn closed_polylines_become_polygons() {
        let mut parts = Vec::new();
        let ring = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)];
        let open = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)];
        collect_rings(Geometry::LineString(ring), &mut parts);
        collect_rings(Geometry::LineString(open), &mut parts);
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn extent_covers_the_boundary() {
        assert_eq!(square().extent(), Some(Extent::new(0.0, 0.0, 10.0, 10.0)));
    }
}
