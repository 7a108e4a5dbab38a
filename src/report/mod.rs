//! Multi-period comparison of area tables.
//!
//! Tables for periods this crate does not produce are read from CSV files
//! supplied by other processes, joined with the tables of the current run,
//! reclassified and rendered as grouped bar charts.
//!
//! The charts are bare raster plots with no text: no axis ticks, labels or
//! class key. Facets follow the period order of the long-form CSV, bars
//! within a facet follow class order, and colours come from
//! `palette_color`. The CSV written next to them carries the values.

use crate::area::{AreaRow, AreaTable};
use crate::class::{ClassLabel, RemapTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[cfg(feature = "charts")]
mod chart;

#[cfg(feature = "charts")]
pub use chart::{palette_color, BarChart};

/// Area table of another period produced outside this pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalTable {
    pub path: PathBuf,
    /// Period for rows that lack a `time_period` column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_period: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub tables: Vec<ExternalTable>,
    pub remap: RemapTable,
    pub csv_name: String,
    pub absolute_chart_name: String,
    pub percent_chart_name: String,
    pub dpi: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            remap: RemapTable::plantations(),
            csv_name: "area_by_period.csv".into(),
            absolute_chart_name: "area_by_period.png".into(),
            percent_chart_name: "area_share_by_period.png".into(),
            dpi: 300,
        }
    }
}

/// What a chart shows on its value axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    SquareKilometres,
    Percent,
}

/// Wide table: one row per class, one column per period. Missing
/// class/period pairs stay `None`, as in an outer join.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Comparison {
    periods: Vec<String>,
    rows: BTreeMap<ClassLabel, Vec<Option<f64>>>,
}

impl Comparison {
    /// Outer join on class label. Periods keep their first-seen order.
    pub fn outer_join(tables: &[AreaTable]) -> Self {
        let mut comparison = Comparison::default();
        for row in tables.iter().flat_map(|table| table.rows.iter()) {
            let column = comparison.period_column(&row.time_period);
            let cells = comparison.row_mut(row.class);
            let cell = &mut cells[column];
            *cell = Some(cell.unwrap_or(0.0) + row.area_m2 / crate::area::SQUARE_METRES_PER_KM2);
        }
        comparison
    }

    fn period_column(&mut self, period: &str) -> usize {
        match self.periods.iter().position(|p| p == period) {
            Some(column) => column,
            None => {
                self.periods.push(period.to_string());
                for cells in self.rows.values_mut() {
                    cells.push(None);
                }
                self.periods.len() - 1
            }
        }
    }

    fn row_mut(&mut self, class: ClassLabel) -> &mut Vec<Option<f64>> {
        let width = self.periods.len();
        let cells = self.rows.entry(class).or_default();
        cells.resize(width, None);
        cells
    }

    /// Merges classes according to `remap`, summing their areas.
    pub fn reclassify(&self, remap: &RemapTable) -> Self {
        if remap.is_empty() {
            return self.clone();
        }
        let mut out = Comparison {
            periods: self.periods.clone(),
            rows: BTreeMap::new(),
        };
        for (class, cells) in &self.rows {
            let merged = out.row_mut(remap.apply(*class));
            for (target, value) in merged.iter_mut().zip(cells) {
                if let Some(value) = value {
                    *target = Some(target.unwrap_or(0.0) + value);
                }
            }
        }
        out
    }

    /// Each value as a percentage of its period's total.
    pub fn percentages(&self) -> Self {
        let totals = self.totals();
        let rows = self
            .rows
            .iter()
            .map(|(class, cells)| {
                let shares = cells
                    .iter()
                    .zip(&totals)
                    .map(|(value, total)| match value {
                        Some(v) if *total > 0.0 => Some(v / total * 100.0),
                        Some(_) => Some(0.0),
                        None => None,
                    })
                    .collect();
                (*class, shares)
            })
            .collect();
        Self {
            periods: self.periods.clone(),
            rows,
        }
    }

    pub fn totals(&self) -> Vec<f64> {
        (0..self.periods.len())
            .map(|column| self.rows.values().filter_map(|cells| cells[column]).sum())
            .collect()
    }

    pub fn periods(&self) -> &[String] {
        &self.periods
    }

    pub fn classes(&self) -> impl Iterator<Item = ClassLabel> + '_ {
        self.rows.keys().copied()
    }

    /// Value in km² (or percent after [`Comparison::percentages`]).
    pub fn get(&self, class: ClassLabel, period: &str) -> Option<f64> {
        let column = self.periods.iter().position(|p| p == period)?;
        self.rows.get(&class)?[column]
    }

    pub fn max_value(&self) -> f64 {
        self.rows
            .values()
            .flatten()
            .flatten()
            .fold(0.0, |max: f64, v| max.max(*v))
    }

    /// Long form, period-major; pairs missing from the join are skipped.
    pub fn to_long(&self) -> AreaTable {
        let mut table = AreaTable::default();
        for (column, period) in self.periods.iter().enumerate() {
            for (class, cells) in &self.rows {
                if let Some(km2) = cells[column] {
                    table.rows.push(AreaRow {
                        class: *class,
                        time_period: period.clone(),
                        area_m2: km2 * crate::area::SQUARE_METRES_PER_KM2,
                    });
                }
            }
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn table(period: &str, rows: &[(ClassLabel, f64)]) -> AreaTable {
        AreaTable {
            rows: rows
                .iter()
                .map(|(class, km2)| AreaRow {
                    class: *class,
                    time_period: period.into(),
                    area_m2: km2 * 1e6,
                })
                .collect(),
        }
    }

    fn sample() -> Comparison {
        Comparison::outer_join(&[
            table(
                "1848",
                &[(ClassLabel::SholaForest, 30.0), (ClassLabel::SholaGrassland, 70.0)],
            ),
            table(
                "1973",
                &[
                    (ClassLabel::SholaForest, 20.0),
                    (ClassLabel::TeaPlantations, 15.0),
                    (ClassLabel::TimberPlantations, 25.0),
                ],
            ),
        ])
    }

    #[test]
    fn outer_join_keeps_every_class() {
        let comparison = sample();
        assert_eq!(comparison.periods(), &["1848".to_string(), "1973".to_string()]);
        assert_eq!(comparison.classes().count(), 4);
        assert_eq!(comparison.get(ClassLabel::SholaGrassland, "1973"), None);
        assert_eq!(comparison.get(ClassLabel::TeaPlantations, "1848"), None);
        assert_relative_eq!(comparison.get(ClassLabel::SholaForest, "1973").unwrap(), 20.0);
    }

    #[test]
    fn plantations_are_merged() {
        let merged = sample().reclassify(&RemapTable::plantations());
        assert_relative_eq!(merged.get(ClassLabel::Plantations, "1973").unwrap(), 40.0);
        assert_eq!(merged.get(ClassLabel::Plantations, "1848"), None);
        assert!(merged.classes().all(|c| c != ClassLabel::TeaPlantations));
    }

    #[test]
    fn an_empty_remap_changes_nothing() {
        let comparison = sample();
        assert_eq!(comparison.reclassify(&RemapTable::default()), comparison);
    }

    #[test]
    fn percentages_sum_to_one_hundred() {
        let shares = sample().percentages();
        for period in ["1848", "1973"] {
            let total: f64 = shares.classes().filter_map(|c| shares.get(c, period)).sum();
            assert_relative_eq!(total, 100.0, epsilon = 1e-9);
        }
        assert_relative_eq!(shares.get(ClassLabel::SholaForest, "1848").unwrap(), 30.0);
    }

    #[test]
    fn long_form_skips_missing_pairs() {
        let long = sample().to_long();
        assert_eq!(long.rows.len(), 5);
        assert_eq!(long.periods(), vec!["1848", "1973"]);
        assert_relative_eq!(long.area_m2(ClassLabel::SholaGrassland, "1848").unwrap(), 70e6);
    }
}
