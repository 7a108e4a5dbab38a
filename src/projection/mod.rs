use geo::MapCoords;
use geo_types::Coord;
use proj4rs::errors::Error as Proj4Error;
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use std::fmt;
use thiserror::Error;

mod extent;
mod prj;

pub use extent::Extent;
pub use prj::epsg_from_wkt;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("unknown or unsupported EPSG code {0}")]
    UnknownEpsg(u16),
    #[error("coordinate transform EPSG:{from} -> EPSG:{to} failed: {reason}")]
    Transform { from: u16, to: u16, reason: String },
    #[error("coordinate ({0}, {1}) is not finite")]
    NonFinite(f64, f64),
}

/// A coordinate reference system identified by its EPSG code.
///
/// Geographic CRSs take and return degrees; proj4rs works in radians so the
/// conversion happens at this boundary.
#[derive(Clone)]
pub struct Crs {
    epsg: u16,
    proj: Proj,
}

impl fmt::Debug for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Crs(EPSG:{})", self.epsg)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

impl PartialEq for Crs {
    fn eq(&self, other: &Self) -> bool {
        self.epsg == other.epsg
    }
}

impl Crs {
    pub fn from_epsg(epsg: u16) -> Result<Self, ProjectionError> {
        let proj = Proj::from_epsg_code(epsg).map_err(|_| ProjectionError::UnknownEpsg(epsg))?;
        Ok(Self { epsg, proj })
    }

    pub fn epsg(&self) -> u16 {
        self.epsg
    }

    pub fn is_geographic(&self) -> bool {
        self.proj.is_latlong()
    }

    pub fn transform_coord(&self, to: &Crs, coord: Coord<f64>) -> Result<Coord<f64>, ProjectionError> {
        if self.epsg == to.epsg {
            return Ok(coord);
        }
        if !coord.x.is_finite() || !coord.y.is_finite() {
            return Err(ProjectionError::NonFinite(coord.x, coord.y));
        }

        let mut point = if self.is_geographic() {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };
        transform(&self.proj, &to.proj, &mut point).map_err(|e: Proj4Error| ProjectionError::Transform {
            from: self.epsg,
            to: to.epsg,
            reason: format!("{e:?}"),
        })?;

        if to.is_geographic() {
            Ok(Coord {
                x: point.0.to_degrees(),
                y: point.1.to_degrees(),
            })
        } else {
            Ok(Coord {
                x: point.0,
                y: point.1,
            })
        }
    }

    /// Reprojects every vertex of a geometry.
    pub fn reproject<G>(&self, to: &Crs, geometry: &G) -> Result<G::Output, ProjectionError>
    where
        G: MapCoords<f64, f64>,
    {
        geometry.try_map_coords(|coord| self.transform_coord(to, coord))
    }

    /// Bounding box of `extent` after reprojection, densified along each edge
    /// so curved edges in the target CRS are covered.
    pub fn transform_extent(
        &self,
        to: &Crs,
        extent: &Extent,
        samples_per_edge: usize,
    ) -> Result<Extent, ProjectionError> {
        let n = samples_per_edge.max(1);
        let mut bounds: Option<Extent> = None;
        for i in 0..=n {
            let t = i as f64 / n as f64;
            let x = extent.min_x + t * extent.width();
            let y = extent.min_y + t * extent.height();
            for (px, py) in [
                (x, extent.min_y),
                (x, extent.max_y),
                (extent.min_x, y),
                (extent.max_x, y),
            ] {
                let c = self.transform_coord(to, Coord { x: px, y: py })?;
                match bounds.as_mut() {
                    Some(b) => b.expand_to_include(c.x, c.y),
                    None => bounds = Some(Extent::new(c.x, c.y, c.x, c.y)),
                }
            }
        }
        // The loop runs at least once
        Ok(bounds.unwrap_or(*extent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use geo_types::{point, Point};

    #[test]
    fn wgs84_to_utm43n_and_back() {
        let wgs84 = Crs::from_epsg(4326).unwrap();
        let utm = Crs::from_epsg(32643).unwrap();
        assert!(wgs84.is_geographic());
        assert!(!utm.is_geographic());

        // Ooty, Nilgiris
        let p: Point<f64> = point!(x: 76.6950, y: 11.4102);
        let projected = wgs84.reproject(&utm, &p).unwrap();
        assert!(projected.x() > 600_000.0 && projected.x() < 700_000.0);
        assert!(projected.y() > 1_200_000.0 && projected.y() < 1_300_000.0);

        let back = utm.reproject(&wgs84, &projected).unwrap();
        assert_abs_diff_eq!(back.x(), p.x(), epsilon = 1e-7);
        assert_abs_diff_eq!(back.y(), p.y(), epsilon = 1e-7);
    }

    #[test]
    fn same_crs_is_identity() {
        let utm = Crs::from_epsg(32643).unwrap();
        let c = Coord { x: 1.5, y: -2.5 };
        assert_eq!(utm.transform_coord(&utm, c).unwrap(), c);
    }

    #[test]
    fn transformed_extent_covers_the_source() {
        let wgs84 = Crs::from_epsg(4326).unwrap();
        let utm = Crs::from_epsg(32643).unwrap();
        let extent = Extent::new(76.5, 11.2, 76.9, 11.6);
        let projected = wgs84.transform_extent(&utm, &extent, 8).unwrap();
        let corner = wgs84
            .transform_coord(&utm, Coord { x: 76.5, y: 11.6 })
            .unwrap();
        assert!(projected.contains(corner.x, corner.y));
        assert!(projected.is_valid());
    }
}
