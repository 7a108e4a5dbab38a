use crate::error::{PipelineError, PipelineResult};
use crate::projection::Crs;
use crate::raster::{CategoricalGrid, GridSpec, Legend, RasterError};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignOptions {
    /// Largest accepted difference between the cropped subject extent and
    /// the reference extent, in CRS units. Defaults to one subject cell.
    pub tolerance: Option<f64>,
    /// Cell size used when the subject has to be reprojected.
    pub resolution: f64,
}

/// Puts `subject` on the reference extent and masks it with the reference's
/// no-data pattern.
///
/// A subject in the reference CRS is cropped to the nearest window and has
/// its bounds forced onto the reference bounds; a subject in another CRS is
/// warped straight onto the reference extent. In both cases the reference is
/// then resampled to the subject grid (nearest neighbour) and used as mask.
pub fn align(
    reference: &CategoricalGrid,
    subject: &CategoricalGrid,
    legend: &Legend,
    options: &AlignOptions,
) -> PipelineResult<CategoricalGrid> {
    let target = reference.spec();
    let placed = if subject.spec().epsg == target.epsg {
        crop_to_reference(reference, subject, options)?
    } else {
        let source_crs = Crs::from_epsg(subject.spec().epsg)?;
        let target_crs = Crs::from_epsg(target.epsg)?;
        let cols = (target.extent.width() / options.resolution).round().max(1.0) as usize;
        let rows = (target.extent.height() / options.resolution).round().max(1.0) as usize;
        let spec = GridSpec::new(target.extent, cols, rows, target.epsg)?;
        info!("Reprojecting {} onto {}", subject.spec(), spec);
        subject.reproject_nearest(&source_crs, &spec, &target_crs)?
    };

    let mask = reference.resample_nearest(placed.spec())?;
    let masked = placed.mask(&mask)?.with_legend(legend.clone());

    let unknown: Vec<u8> = masked
        .codes()
        .into_iter()
        .filter(|code| legend.label(*code).is_none())
        .collect();
    if !unknown.is_empty() {
        return Err(RasterError::InvalidLegend(format!(
            "codes {unknown:?} of the aligned raster have no legend entry"
        ))
        .into());
    }
    info!(
        "Aligned {} ({} no-data cells after masking)",
        masked.spec(),
        masked.nodata_count()
    );
    Ok(masked)
}

fn crop_to_reference(
    reference: &CategoricalGrid,
    subject: &CategoricalGrid,
    options: &AlignOptions,
) -> PipelineResult<CategoricalGrid> {
    let target = reference.spec().extent;
    let (rx, ry) = subject.spec().resolution();
    let tolerance = options.tolerance.unwrap_or(rx.max(ry));
    let alignment_error = |subject, deviation| PipelineError::Alignment {
        reference: target,
        subject,
        deviation,
        tolerance,
    };

    let cropped = match subject.crop(&target) {
        Ok(cropped) => cropped,
        Err(RasterError::EmptyWindow(_)) => {
            return Err(alignment_error(subject.spec().extent, f64::INFINITY))
        }
        Err(e) => return Err(e.into()),
    };
    let deviation = cropped.spec().extent.max_deviation(&target);
    if deviation > tolerance {
        return Err(alignment_error(cropped.spec().extent, deviation));
    }
    debug!("Cropped extent is off by {deviation}, forcing reference bounds");
    Ok(cropped.with_forced_extent(target)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::Extent;
    use crate::raster::NODATA;

    fn grid(extent: Extent, resolution: f64, epsg: u16, cells: Vec<u8>) -> CategoricalGrid {
        let spec = GridSpec::from_resolution(extent, resolution, epsg).unwrap();
        CategoricalGrid::from_cells(spec, cells).unwrap()
    }

    fn options() -> AlignOptions {
        AlignOptions {
            tolerance: None,
            resolution: 3.0,
        }
    }

    fn reference() -> CategoricalGrid {
        grid(Extent::new(0.0, 0.0, 12.0, 12.0), 6.0, 32643, vec![1, NODATA, 2, 3])
    }

    #[test]
    fn subject_takes_the_reference_extent_and_mask() {
        // 6x6 cells of 3 m around the reference, all code 5
        let subject = grid(Extent::new(-3.0, -3.0, 15.0, 15.0), 3.0, 32643, vec![5; 36]);
        let aligned = align(&reference(), &subject, &Legend::classification(), &options()).unwrap();

        assert_eq!(aligned.spec().extent, reference().spec().extent);
        assert_eq!((aligned.spec().cols, aligned.spec().rows), (4, 4));
        assert_eq!(
            aligned.cells(),
            &[5, 5, 0, 0, 5, 5, 0, 0, 5, 5, 5, 5, 5, 5, 5, 5]
        );
        assert_eq!(aligned.legend(), Some(&Legend::classification()));
    }

    #[test]
    fn codes_outside_the_legend_are_rejected() {
        let subject = grid(Extent::new(0.0, 0.0, 12.0, 12.0), 6.0, 32643, vec![9; 4]);
        let result = align(&reference(), &subject, &Legend::classification(), &options());
        assert!(matches!(
            result,
            Err(PipelineError::Raster(RasterError::InvalidLegend(_)))
        ));
    }

    #[test]
    fn masked_out_codes_need_no_legend_entry() {
        // Code 9 only sits under the reference's no-data cell
        let subject = grid(Extent::new(0.0, 0.0, 12.0, 12.0), 6.0, 32643, vec![4, 9, 4, 4]);
        let aligned = align(&reference(), &subject, &Legend::classification(), &options()).unwrap();
        assert_eq!(aligned.cells(), &[4, NODATA, 4, 4]);
    }

    #[test]
    fn round_off_is_absorbed() {
        let subject = grid(
            Extent::new(1e-7, -1e-7, 12.0 + 1e-7, 12.0 - 1e-7),
            6.0,
            32643,
            vec![4; 4],
        );
        let aligned = align(&reference(), &subject, &Legend::classification(), &options()).unwrap();
        assert_eq!(aligned.spec().extent, reference().spec().extent);
        assert_eq!(aligned.cells(), &[4, NODATA, 4, 4]);
    }

    #[test]
    fn shifted_grids_fail_to_align() {
        let subject = grid(Extent::new(2.0, 0.0, 14.0, 12.0), 4.0, 32643, vec![4; 9]);
        let strict = AlignOptions {
            tolerance: Some(0.5),
            ..options()
        };
        let result = align(&reference(), &subject, &Legend::classification(), &strict);
        assert!(matches!(result, Err(PipelineError::Alignment { .. })));
    }

    #[test]
    fn disjoint_grids_fail_to_align() {
        let subject = grid(Extent::new(100.0, 100.0, 112.0, 112.0), 6.0, 32643, vec![4; 4]);
        let result = align(&reference(), &subject, &Legend::classification(), &options());
        assert!(matches!(result, Err(PipelineError::Alignment { .. })));
    }

    #[test]
    fn other_crs_are_warped_onto_the_reference() {
        let utm = Crs::from_epsg(32643).unwrap();
        let wgs84 = Crs::from_epsg(4326).unwrap();
        let centre = wgs84
            .transform_coord(&utm, geo_types::Coord { x: 76.7, y: 11.4 })
            .unwrap();
        let reference = grid(
            Extent::new(centre.x, centre.y, centre.x + 12.0, centre.y + 12.0),
            6.0,
            32643,
            vec![1, NODATA, 2, 3],
        );
        let subject = grid(Extent::new(76.0, 11.0, 77.0, 12.0), 0.5, 4326, vec![6; 4]);

        let aligned = align(&reference, &subject, &Legend::classification(), &options()).unwrap();
        assert_eq!(aligned.spec().epsg, 32643);
        assert_eq!(aligned.spec().extent, reference.spec().extent);
        assert_eq!(aligned.counts().get(&6), Some(&12));
        assert_eq!(aligned.nodata_count(), 4);
    }
}
