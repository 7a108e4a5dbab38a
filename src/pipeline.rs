//! Stage orchestration.
//!
//! Every stage takes its inputs as arguments and returns new values; nothing
//! is written until all stages have succeeded, and then every output goes
//! to a `.partial` sibling first and is renamed into place at the end.

use crate::align::{align, AlignOptions};
use crate::area::{compute_areas, AreaTable};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::projection::Crs;
use crate::raster::{
    decode_geotiff, pam_sidecar_path, write_geotiff, write_pam_legend, CategoricalGrid, GridSpec,
};
use crate::rasterize::rasterize;
use crate::report::{Comparison, ReportConfig};
use crate::vector::{
    harmonize, load_contour, read_layer, write_geojson, write_lines_geojson, Harmonized,
};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Everything one run produces, before it is written.
#[derive(Debug, Clone)]
pub struct PipelineOutputs {
    pub harmonized: Harmonized,
    pub historical: CategoricalGrid,
    pub modern: CategoricalGrid,
    /// Areas of both periods of this run, historical first.
    pub areas: AreaTable,
    pub report: Option<Report>,
}

/// Legacy comparison across periods.
#[derive(Debug, Clone)]
pub struct Report {
    pub comparison: Comparison,
    pub long_form: AreaTable,
}

/// Runs every stage and writes the outputs. Returns the outputs and the
/// paths written.
pub fn run(config: &PipelineConfig) -> PipelineResult<(PipelineOutputs, Vec<PathBuf>)> {
    let outputs = compute(config)?;
    let written = write_outputs(config, &outputs)?;
    Ok((outputs, written))
}

/// All stages, no writes.
pub fn compute(config: &PipelineConfig) -> PipelineResult<PipelineOutputs> {
    config.validate()?;
    let target = Crs::from_epsg(config.target_epsg)?;

    let contour = load_contour(&config.contour, &target)?;
    let mut raw_layers = Vec::with_capacity(config.layers.len());
    for spec in &config.layers {
        raw_layers.push(read_layer(spec)?);
    }
    let harmonized = harmonize(
        config.layers.iter().zip(raw_layers),
        &target,
        &config.remap,
        &contour,
    )?;

    let spec = GridSpec::from_resolution(config.extent, config.resolution(), config.target_epsg)?;
    let historical = rasterize(&harmonized.areas, &spec, &config.legend)?;

    let subject = read_raster(&config.modern.path)?;
    info!("Loaded {} from {}", subject, config.modern.path.display());
    let options = AlignOptions {
        tolerance: config.alignment_tolerance,
        resolution: config.modern.resolution,
    };
    let modern = align(&historical, &subject, &config.legend, &options)?;

    let mut areas = compute_areas(&historical, &config.periods.historical)?;
    areas
        .rows
        .extend(compute_areas(&modern, &config.periods.modern)?.rows);

    let report = match &config.report {
        Some(report) => Some(build_report(report, &areas)?),
        None => None,
    };

    Ok(PipelineOutputs {
        harmonized,
        historical,
        modern,
        areas,
        report,
    })
}

pub fn read_raster(path: &Path) -> PipelineResult<CategoricalGrid> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    Ok(decode_geotiff(&mut BufReader::new(file))?)
}

/// Joins this run's areas with the external tables and reclassifies.
pub fn build_report(config: &ReportConfig, current: &AreaTable) -> PipelineResult<Report> {
    let mut tables = Vec::with_capacity(config.tables.len() + 1);
    for external in &config.tables {
        tables.push(AreaTable::read_csv(
            &external.path,
            external.time_period.as_deref(),
        )?);
    }
    tables.push(current.clone());

    let comparison = Comparison::outer_join(&tables).reclassify(&config.remap);
    let long_form = comparison.to_long();
    info!(
        "Report covers periods {:?} and {} classes",
        comparison.periods(),
        comparison.classes().count()
    );
    Ok(Report {
        comparison,
        long_form,
    })
}

/// Writes every output through `.partial` files. If any write fails the
/// partial files are removed and no final path is touched.
pub fn write_outputs(config: &PipelineConfig, outputs: &PipelineOutputs) -> PipelineResult<Vec<PathBuf>> {
    let names = &config.output;
    fs::create_dir_all(&names.dir).map_err(|e| PipelineError::io(&names.dir, e))?;

    let mut staging = Staging::default();
    let result = stage_all(&mut staging, config, outputs);
    match result {
        Ok(()) => staging.commit(),
        Err(e) => {
            staging.discard();
            Err(e)
        }
    }
}

fn stage_all(staging: &mut Staging, config: &PipelineConfig, outputs: &PipelineOutputs) -> PipelineResult<()> {
    let names = &config.output;

    staging.stage(names.path(&names.harmonized), |path| {
        write_geojson(&outputs.harmonized.areas, path)
    })?;
    staging.stage(names.path(&names.linear), |path| {
        write_lines_geojson(&outputs.harmonized.lines, path)
    })?;
    for (name, grid) in [
        (&names.historical_raster, &outputs.historical),
        (&names.modern_raster, &outputs.modern),
    ] {
        let path = names.path(name);
        staging.stage(path.clone(), |partial| Ok(write_geotiff(grid, partial)?))?;
        if let Some(legend) = grid.legend() {
            staging.stage(pam_sidecar_path(&path), |partial| {
                Ok(write_pam_legend(legend, partial)?)
            })?;
        }
    }
    staging.stage(names.path(&names.areas), |path| outputs.areas.write_csv(path))?;

    if let (Some(report_config), Some(report)) = (&config.report, &outputs.report) {
        stage_report(staging, config, report_config, report)?;
    }
    Ok(())
}

#[cfg(feature = "charts")]
fn stage_report(
    staging: &mut Staging,
    config: &PipelineConfig,
    report_config: &ReportConfig,
    report: &Report,
) -> PipelineResult<()> {
    use crate::report::{BarChart, Metric};
    use std::io::{BufWriter, Write};

    let names = &config.output;
    staging.stage(names.path(&report_config.csv_name), |path| {
        report.long_form.write_csv(path)
    })?;

    let shares = report.comparison.percentages();
    for (name, comparison, metric) in [
        (&report_config.absolute_chart_name, &report.comparison, Metric::SquareKilometres),
        (&report_config.percent_chart_name, &shares, Metric::Percent),
    ] {
        staging.stage(names.path(name), |path| {
            let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
            let mut writer = BufWriter::new(file);
            BarChart::new(comparison, metric)
                .with_dpi(report_config.dpi)
                .encode_png(&mut writer)?;
            writer.flush().map_err(|e| PipelineError::io(path, e))
        })?;
    }
    Ok(())
}

#[cfg(not(feature = "charts"))]
fn stage_report(
    staging: &mut Staging,
    config: &PipelineConfig,
    report_config: &ReportConfig,
    report: &Report,
) -> PipelineResult<()> {
    let names = &config.output;
    staging.stage(names.path(&report_config.csv_name), |path| {
        report.long_form.write_csv(path)
    })?;
    warn!("Built without the charts feature, skipping report charts");
    Ok(())
}

/// Outputs written next to their final paths, waiting to be renamed.
#[derive(Debug, Default)]
struct Staging {
    staged: Vec<(PathBuf, PathBuf)>,
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".partial");
    PathBuf::from(name)
}

impl Staging {
    fn stage<F>(&mut self, path: PathBuf, write: F) -> PipelineResult<()>
    where
        F: FnOnce(&Path) -> PipelineResult<()>,
    {
        let partial = partial_path(&path);
        // Registered first so a half-written file is cleaned up too
        self.staged.push((partial.clone(), path));
        write(&partial)
    }

    fn commit(self) -> PipelineResult<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.staged.len());
        for (partial, path) in self.staged {
            fs::rename(&partial, &path).map_err(|e| PipelineError::io(&path, e))?;
            info!("Wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }

    fn discard(self) {
        for (partial, _) in self.staged {
            if partial.exists() {
                if let Err(e) = fs::remove_file(&partial) {
                    warn!("Could not remove {}: {e}", partial.display());
                }
            }
        }
    }
}
