use super::{CategoricalGrid, GridSpec, RasterError, NODATA};
use crate::projection::{Crs, Extent};
use geo_types::Coord;

/// Relative tolerance when comparing the extents of two grids cell for cell.
const SHAPE_TOLERANCE: f64 = 1e-6;

impl CategoricalGrid {
    /// Cuts out the cells whose edges are closest to `extent`.
    ///
    /// The window snaps to this grid's cell boundaries, so the result's extent
    /// differs from `extent` by less than one cell wherever the grid covers it.
    pub fn crop(&self, extent: &Extent) -> Result<CategoricalGrid, RasterError> {
        let spec = self.spec();
        let (rx, ry) = spec.resolution();
        let snap = |v: f64, max: usize| -> usize { v.round().clamp(0.0, max as f64) as usize };

        let col0 = snap((extent.min_x - spec.extent.min_x) / rx, spec.cols);
        let col1 = snap((extent.max_x - spec.extent.min_x) / rx, spec.cols);
        let row0 = snap((spec.extent.max_y - extent.max_y) / ry, spec.rows);
        let row1 = snap((spec.extent.max_y - extent.min_y) / ry, spec.rows);
        if col1 <= col0 || row1 <= row0 {
            return Err(RasterError::EmptyWindow(*extent));
        }

        let window = Extent::new(
            spec.extent.min_x + col0 as f64 * rx,
            spec.extent.max_y - row1 as f64 * ry,
            spec.extent.min_x + col1 as f64 * rx,
            spec.extent.max_y - row0 as f64 * ry,
        );
        let cropped_spec = GridSpec::new(window, col1 - col0, row1 - row0, spec.epsg)?;

        let mut cells = Vec::with_capacity(cropped_spec.len());
        for row in row0..row1 {
            let start = row * spec.cols;
            cells.extend_from_slice(&self.cells()[start + col0..start + col1]);
        }
        let mut cropped = CategoricalGrid::from_cells(cropped_spec, cells)?;
        if let Some(legend) = self.legend() {
            cropped = cropped.with_legend(legend.clone());
        }
        Ok(cropped)
    }

    /// Same cells, new bounds. Used to absorb round-off after a crop.
    pub fn with_forced_extent(&self, extent: Extent) -> Result<CategoricalGrid, RasterError> {
        let spec = self.spec().with_extent(extent)?;
        let mut forced = CategoricalGrid::from_cells(spec, self.cells().to_vec())?;
        if let Some(legend) = self.legend() {
            forced = forced.with_legend(legend.clone());
        }
        Ok(forced)
    }

    /// Nearest-neighbour resampling onto `target` in the same CRS.
    ///
    /// Each target cell copies the source cell under its centre, so only
    /// codes already present (or no data) can appear in the result.
    pub fn resample_nearest(&self, target: &GridSpec) -> Result<CategoricalGrid, RasterError> {
        let spec = self.spec();
        if spec.epsg != target.epsg {
            return Err(RasterError::ShapeMismatch(format!(
                "resampling EPSG:{} onto EPSG:{} needs a reprojection",
                spec.epsg, target.epsg
            )));
        }

        // Axis-aligned grids in one CRS map columns and rows independently
        let col_map: Vec<Option<usize>> = (0..target.cols)
            .map(|col| {
                let (x, _) = target.cell_center(col, 0);
                spec.cell_at(x, spec.extent.max_y).map(|(c, _)| c)
            })
            .collect();
        let row_map: Vec<Option<usize>> = (0..target.rows)
            .map(|row| {
                let (_, y) = target.cell_center(0, row);
                spec.cell_at(spec.extent.min_x, y).map(|(_, r)| r)
            })
            .collect();

        let mut resampled = CategoricalGrid::empty(*target);
        for (row, source_row) in row_map.iter().enumerate() {
            let Some(source_row) = source_row else {
                continue;
            };
            let source = &self.cells()[source_row * spec.cols..(source_row + 1) * spec.cols];
            let out = resampled.row_mut(row);
            for (col, source_col) in col_map.iter().enumerate() {
                if let Some(source_col) = source_col {
                    out[col] = source[*source_col];
                }
            }
        }
        if let Some(legend) = self.legend() {
            resampled = resampled.with_legend(legend.clone());
        }
        Ok(resampled)
    }

    /// Nearest-neighbour warp from `source_crs` onto `target` in `target_crs`,
    /// by inverse-mapping each target cell centre into this grid.
    pub fn reproject_nearest(
        &self,
        source_crs: &Crs,
        target: &GridSpec,
        target_crs: &Crs,
    ) -> Result<CategoricalGrid, RasterError> {
        if source_crs.epsg() != self.spec().epsg || target_crs.epsg() != target.epsg {
            return Err(RasterError::ShapeMismatch(
                "CRS does not match the grid it describes".into(),
            ));
        }
        if source_crs == target_crs {
            return self.resample_nearest(target);
        }

        let spec = self.spec();
        let mut warped = CategoricalGrid::empty(*target);
        for row in 0..target.rows {
            let out = warped.row_mut(row);
            for (col, cell) in out.iter_mut().enumerate() {
                let (x, y) = target.cell_center(col, row);
                let source = target_crs.transform_coord(source_crs, Coord { x, y })?;
                if let Some((c, r)) = spec.cell_at(source.x, source.y) {
                    *cell = self.cells()[r * spec.cols + c];
                }
            }
        }
        if let Some(legend) = self.legend() {
            warped = warped.with_legend(legend.clone());
        }
        Ok(warped)
    }

    /// Sets every cell that is no data in `mask` to no data.
    pub fn mask(&self, mask: &CategoricalGrid) -> Result<CategoricalGrid, RasterError> {
        let (a, b) = (self.spec(), mask.spec());
        let tolerance = SHAPE_TOLERANCE * a.resolution().0.max(a.resolution().1);
        if a.cols != b.cols
            || a.rows != b.rows
            || a.epsg != b.epsg
            || a.extent.max_deviation(&b.extent) > tolerance
        {
            return Err(RasterError::ShapeMismatch(format!("{a} vs mask {b}")));
        }

        let cells = self
            .cells()
            .iter()
            .zip(mask.cells())
            .map(|(value, m)| if *m == NODATA { NODATA } else { *value })
            .collect();
        let mut masked = CategoricalGrid::from_cells(*a, cells)?;
        if let Some(legend) = self.legend() {
            masked = masked.with_legend(legend.clone());
        }
        Ok(masked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Legend;

    fn grid(extent: Extent, resolution: f64, cells: Vec<u8>) -> CategoricalGrid {
        let spec = GridSpec::from_resolution(extent, resolution, 32643).unwrap();
        CategoricalGrid::from_cells(spec, cells).unwrap()
    }

    #[test]
    fn crop_snaps_to_cell_edges() {
        // 4x4 grid of 10 m cells, codes 1..=16
        let source = grid(Extent::new(0.0, 0.0, 40.0, 40.0), 10.0, (1..=16).collect());
        let cropped = source.crop(&Extent::new(9.0, 11.0, 31.0, 29.0)).unwrap();
        assert_eq!(cropped.spec().extent, Extent::new(10.0, 10.0, 30.0, 30.0));
        assert_eq!(cropped.cells(), &[6, 7, 10, 11]);
    }

    #[test]
    fn crop_outside_is_an_error() {
        let source = grid(Extent::new(0.0, 0.0, 20.0, 20.0), 10.0, vec![1; 4]);
        assert!(matches!(
            source.crop(&Extent::new(100.0, 100.0, 200.0, 200.0)),
            Err(RasterError::EmptyWindow(_))
        ));
    }

    #[test]
    fn nearest_resampling_never_invents_codes() {
        let cells = vec![1, 1, 2, 2, 1, 3, 3, 2, 0, 3, 3, 2, 0, 0, 5, 5, 5, 4];
        let source = grid(Extent::new(0.0, 0.0, 36.0, 18.0), 6.0, cells);
        let target =
            GridSpec::from_resolution(Extent::new(0.0, 0.0, 36.0, 18.0), 10.0, 32643).unwrap();
        let resampled = source.resample_nearest(&target).unwrap();
        assert!(resampled.codes().is_subset(&source.codes()));
        assert_eq!(resampled.spec().cols, 4);
    }

    #[test]
    fn downsampling_by_two_picks_the_cell_under_each_centre() {
        let source = grid(Extent::new(0.0, 0.0, 4.0, 4.0), 1.0, (1..=16).collect());
        let target = GridSpec::from_resolution(Extent::new(0.0, 0.0, 4.0, 4.0), 2.0, 32643).unwrap();
        // Centres at 1.0/3.0 land on the top-left-closed cells 1 and 3
        let resampled = source.resample_nearest(&target).unwrap();
        assert_eq!(resampled.cells(), &[6, 8, 14, 16]);
    }

    #[test]
    fn masking_is_idempotent() {
        let extent = Extent::new(0.0, 0.0, 12.0, 12.0);
        let data = grid(extent, 6.0, vec![1, 2, 3, 4]).with_legend(Legend::classification());
        let mask = grid(extent, 6.0, vec![9, 0, 9, 0]);

        let once = data.mask(&mask).unwrap();
        assert_eq!(once.cells(), &[1, NODATA, 3, NODATA]);
        assert_eq!(once.legend(), Some(&Legend::classification()));
        let twice = once.mask(&mask).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn masks_must_share_the_grid() {
        let data = grid(Extent::new(0.0, 0.0, 12.0, 12.0), 6.0, vec![1; 4]);
        let mask = grid(Extent::new(6.0, 0.0, 18.0, 12.0), 6.0, vec![1; 4]);
        assert!(matches!(data.mask(&mask), Err(RasterError::ShapeMismatch(_))));
    }

    #[test]
    fn reprojection_samples_the_source_crs() {
        let wgs84 = Crs::from_epsg(4326).unwrap();
        let utm = Crs::from_epsg(32643).unwrap();
        let spec = GridSpec::from_resolution(Extent::new(76.0, 11.0, 77.0, 12.0), 0.5, 4326).unwrap();
        let source = CategoricalGrid::from_cells(spec, vec![1, 2, 3, 4]).unwrap();

        let target_extent = wgs84
            .transform_extent(&utm, &Extent::new(76.05, 11.55, 76.45, 11.95), 4)
            .unwrap();
        let target = GridSpec::from_resolution(target_extent, 1000.0, 32643).unwrap();
        let warped = source.reproject_nearest(&wgs84, &target, &utm).unwrap();
        // Entirely inside the north-west source cell
        assert!(warped.codes().iter().all(|code| *code == 1));
        assert!(warped.counts().get(&1).copied().unwrap_or(0) > 0);
    }
}
