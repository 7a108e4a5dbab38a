//! Zonal statistics: area per class of a categorical grid.

use crate::class::ClassLabel;
use crate::error::{PipelineError, PipelineResult};
use crate::projection::Crs;
use crate::raster::CategoricalGrid;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::io::Write;
use std::path::Path;
use tracing::info;

pub const SQUARE_METRES_PER_KM2: f64 = 1_000_000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AreaRow {
    pub class: ClassLabel,
    pub time_period: String,
    pub area_m2: f64,
}

impl AreaRow {
    pub fn area_km2(&self) -> f64 {
        self.area_m2 / SQUARE_METRES_PER_KM2
    }
}

/// CSV shape of one row: `class,time_period,area_in_square_km`.
#[derive(Debug, Serialize, Deserialize)]
struct AreaRecord {
    class: String,
    #[serde(default)]
    time_period: Option<String>,
    area_in_square_km: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AreaTable {
    pub rows: Vec<AreaRow>,
}

impl AreaTable {
    pub fn total_m2(&self) -> f64 {
        self.rows.iter().map(|row| row.area_m2).sum()
    }

    pub fn area_m2(&self, class: ClassLabel, time_period: &str) -> Option<f64> {
        self.rows
            .iter()
            .find(|row| row.class == class && row.time_period == time_period)
            .map(|row| row.area_m2)
    }

    pub fn periods(&self) -> Vec<&str> {
        let mut periods: Vec<&str> = Vec::new();
        for row in &self.rows {
            if !periods.contains(&row.time_period.as_str()) {
                periods.push(&row.time_period);
            }
        }
        periods
    }

    pub fn encode_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut csv = csv::Writer::from_writer(writer);
        for row in &self.rows {
            csv.serialize(AreaRecord {
                class: row.class.to_string(),
                time_period: Some(row.time_period.clone()),
                area_in_square_km: row.area_km2(),
            })?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> PipelineResult<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path).map_err(|e| PipelineError::io(path, e))?;
        self.encode_csv(file).map_err(|source| PipelineError::Csv {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads a table written by another process. Rows without a
    /// `time_period` column take `default_period`.
    pub fn read_csv<P: AsRef<Path>>(path: P, default_period: Option<&str>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let csv_error = |source| PipelineError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(csv_error)?;

        let mut table = AreaTable::default();
        for record in reader.deserialize::<AreaRecord>() {
            let record = record.map_err(csv_error)?;
            let layer = path.display().to_string();
            let class = record
                .class
                .parse::<ClassLabel>()
                .map_err(|e| PipelineError::schema(&layer, format!("{e}")))?;
            let time_period = record
                .time_period
                .filter(|period| !period.is_empty())
                .or_else(|| default_period.map(str::to_string))
                .ok_or_else(|| PipelineError::schema(&layer, "row without time_period"))?;
            table.rows.push(AreaRow {
                class,
                time_period,
                area_m2: record.area_in_square_km * SQUARE_METRES_PER_KM2,
            });
        }
        Ok(table)
    }
}

impl Display for AreaTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in &self.rows {
            writeln!(
                f,
                "{:<20} {:>6} {:>12.6} km2",
                row.class.as_str(),
                row.time_period,
                row.area_km2()
            )?;
        }
        Ok(())
    }
}

/// Sums cell areas per class: cell count times the area of one cell.
///
/// Cell area is only meaningful in a projected CRS with metre units, so
/// geographic grids are rejected.
pub fn compute_areas(grid: &CategoricalGrid, time_period: &str) -> PipelineResult<AreaTable> {
    let spec = grid.spec();
    let crs = Crs::from_epsg(spec.epsg)?;
    if crs.is_geographic() {
        return Err(PipelineError::UnsupportedCrs {
            epsg: spec.epsg,
            reason: "cell areas need a projected CRS in metres".into(),
        });
    }
    let legend = grid
        .legend()
        .ok_or_else(|| PipelineError::schema(time_period, "grid has no legend"))?;

    let cell_area = spec.cell_area();
    let mut table = AreaTable::default();
    for (code, count) in grid.counts() {
        let class = legend.label(code).ok_or_else(|| {
            PipelineError::schema(time_period, format!("code {code} has no legend entry"))
        })?;
        table.rows.push(AreaRow {
            class,
            time_period: time_period.to_string(),
            area_m2: count as f64 * cell_area,
        });
    }

    for row in &table.rows {
        info!("{} {}: {:.6} km2", time_period, row.class, row.area_km2());
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::Extent;
    use crate::raster::{GridSpec, Legend, NODATA};
    use approx::assert_relative_eq;

    fn grid(cols: usize, rows: usize, epsg: u16, cells: Vec<u8>) -> CategoricalGrid {
        let extent = Extent::new(0.0, 0.0, cols as f64 * 6.0, rows as f64 * 6.0);
        let spec = GridSpec::from_resolution(extent, 6.0, epsg).unwrap();
        CategoricalGrid::from_cells(spec, cells)
            .unwrap()
            .with_legend(Legend::classification())
    }

    #[test]
    fn two_by_two_scenario() {
        let table = compute_areas(&grid(2, 2, 32643, vec![1, 1, 2, NODATA]), "1848").unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_relative_eq!(table.area_m2(ClassLabel::Agriculture, "1848").unwrap(), 72.0);
        assert_relative_eq!(table.area_m2(ClassLabel::SholaForest, "1848").unwrap(), 36.0);
        assert_relative_eq!(table.rows[0].area_km2(), 0.000072);
        assert_relative_eq!(table.rows[1].area_km2(), 0.000036);
    }

    #[test]
    fn areas_are_conserved() {
        let cells: Vec<u8> = (0..48).map(|i| (i * 7 % 8) as u8).collect();
        let grid = grid(8, 6, 32643, cells);
        let table = compute_areas(&grid, "2018").unwrap();
        let expected = (grid.spec().len() as u64 - grid.nodata_count()) as f64 * 36.0;
        assert_relative_eq!(table.total_m2(), expected, epsilon = 1e-9);
    }

    #[test]
    fn geographic_grids_are_rejected() {
        let result = compute_areas(&grid(2, 2, 4326, vec![1; 4]), "2018");
        assert!(matches!(result, Err(PipelineError::UnsupportedCrs { epsg: 4326, .. })));
    }

    #[test]
    fn unknown_codes_are_schema_errors() {
        let result = compute_areas(&grid(2, 2, 32643, vec![1, 9, 1, 1]), "2018");
        assert!(matches!(result, Err(PipelineError::Schema { .. })));
    }

    #[test]
    fn csv_uses_square_kilometres() {
        let table = compute_areas(&grid(2, 2, 32643, vec![1, 1, 2, NODATA]), "1848").unwrap();
        let mut out = Vec::new();
        table.encode_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("class,time_period,area_in_square_km"));
        let first: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(first[..2], ["agriculture", "1848"]);
        assert_relative_eq!(first[2].parse::<f64>().unwrap(), 0.000072);
    }

    #[test]
    fn external_tables_fill_in_the_period() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1973.csv");
        std::fs::write(&path, "class,area_in_square_km\ntea plantations, 12.5\nshola_forest,3\n").unwrap();
        let table = AreaTable::read_csv(&path, Some("1973")).unwrap();
        assert_eq!(table.periods(), vec!["1973"]);
        assert_relative_eq!(table.area_m2(ClassLabel::TeaPlantations, "1973").unwrap(), 12.5e6);
        assert!(AreaTable::read_csv(&path, None).is_err());
    }
}
