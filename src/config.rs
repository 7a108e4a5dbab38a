//! Study constants, overridable from a JSON file.

use crate::class::{ClassLabel, RemapTable};
use crate::error::{PipelineError, PipelineResult};
use crate::projection::Extent;
use crate::raster::Legend;
use crate::report::ReportConfig;
use crate::vector::{ContourSource, LabelSource, LayerSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// WGS 84 / UTM zone 43N.
pub const DEFAULT_EPSG: u16 = 32643;

/// Smallest feature a surveyor could draw, in metres, for a map at
/// 1:`scale`: half a millimetre on paper.
pub fn detectable_size(scale: f64) -> f64 {
    scale / 2000.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModernSource {
    pub path: PathBuf,
    /// Cell size used only when the raster has to be reprojected.
    pub resolution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Periods {
    pub historical: String,
    pub modern: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputNames {
    pub dir: PathBuf,
    pub harmonized: String,
    pub linear: String,
    pub historical_raster: String,
    pub modern_raster: String,
    pub areas: String,
}

impl Default for OutputNames {
    fn default() -> Self {
        Self {
            dir: "results".into(),
            harmonized: "landcover_1848.geojson".into(),
            linear: "roads_1848.geojson".into(),
            historical_raster: "landcover_1848.tif".into(),
            modern_raster: "landcover_2018_aligned.tif".into(),
            areas: "area_1848_2018.csv".into(),
        }
    }
}

impl OutputNames {
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub target_epsg: u16,
    pub contour: ContourSource,
    pub layers: Vec<LayerSpec>,
    /// Denominator of the historical map scale.
    pub map_scale: f64,
    /// Overrides the cell size derived from `map_scale`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<f64>,
    pub extent: Extent,
    pub modern: ModernSource,
    pub legend: Legend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alignment_tolerance: Option<f64>,
    pub remap: RemapTable,
    pub periods: Periods,
    pub output: OutputNames,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let layer = |name: &str, label| LayerSpec::area(name, format!("data/1848/{name}.shp"), label);
        Self {
            target_epsg: DEFAULT_EPSG,
            contour: ContourSource {
                path: "data/contour/contour_1400m.shp".into(),
                epsg: None,
            },
            layers: vec![
                layer("agriculture", ClassLabel::Agriculture),
                layer("shola_forest", ClassLabel::SholaForest),
                layer("shola_grassland", ClassLabel::SholaGrassland),
                layer("swamps", ClassLabel::Swamps),
                layer("settlements", ClassLabel::Settlements),
                layer("plantations", ClassLabel::Plantations),
                layer("water_bodies", ClassLabel::WaterBodies),
                layer("no_data", ClassLabel::NoData),
                LayerSpec::linear("roads", "data/1848/roads.shp", ClassLabel::Roads),
            ],
            map_scale: 12_000.0,
            resolution: None,
            extent: Extent::new(654_000.0, 1_236_000.0, 720_000.0, 1_290_000.0),
            modern: ModernSource {
                path: "data/2018/classified_2018.tif".into(),
                resolution: 10.0,
            },
            legend: Legend::classification(),
            alignment_tolerance: None,
            remap: RemapTable::historical(),
            periods: Periods {
                historical: "1848".into(),
                modern: "2018".into(),
            },
            output: OutputNames::default(),
            report: None,
        }
    }
}

impl PipelineConfig {
    /// Reads a (possibly partial) JSON configuration; missing fields keep
    /// their defaults.
    pub fn from_path<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let config: PipelineConfig =
            serde_json::from_str(&text).map_err(|source| PipelineError::Config {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
            .unwrap_or_else(|| detectable_size(self.map_scale))
    }

    pub fn validate(&self) -> PipelineResult<()> {
        let invalid = |message: String| Err(PipelineError::InvalidConfig(message));

        let mut names = HashSet::new();
        for layer in &self.layers {
            if !names.insert(layer.name.as_str()) {
                return invalid(format!("layer {} is listed twice", layer.name));
            }
            if let LabelSource::Constant(label) = layer.label {
                let mapped = self.remap.apply(label);
                if layer.kind == crate::vector::LayerKind::Area && self.legend.code(mapped).is_none() {
                    return invalid(format!(
                        "layer {} maps to {mapped}, which has no legend code",
                        layer.name
                    ));
                }
            }
        }

        let resolution = self.resolution();
        if !(resolution.is_finite() && resolution > 0.0) {
            return invalid(format!("resolution must be positive, got {resolution}"));
        }
        if !(self.modern.resolution.is_finite() && self.modern.resolution > 0.0) {
            return invalid(format!(
                "modern resolution must be positive, got {}",
                self.modern.resolution
            ));
        }
        if !self.extent.is_valid() {
            return invalid(format!("extent {} is empty or inverted", self.extent));
        }
        if self.legend.is_empty() {
            return invalid("legend is empty".into());
        }
        if let Some(tolerance) = self.alignment_tolerance {
            if !(tolerance >= 0.0) {
                return invalid(format!("alignment tolerance {tolerance} is negative"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_study() {
        let config = PipelineConfig::default();
        assert_eq!(config.layers.len(), 9);
        assert_eq!(config.resolution(), 6.0);
        assert_eq!(config.target_epsg, 32643);
        assert!(config.report.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn partial_files_keep_the_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"map_scale": 24000, "output": {"dir": "/tmp/out"}}"#).unwrap();
        let config = PipelineConfig::from_path(&path).unwrap();
        assert_eq!(config.resolution(), 12.0);
        assert_eq!(config.output.dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.output.areas, OutputNames::default().areas);
        assert_eq!(config.layers, PipelineConfig::default().layers);
    }

    #[test]
    fn configs_round_trip_through_json() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"swamps\": \"shola_grassland\""));
        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn duplicate_layers_are_rejected() {
        let mut config = PipelineConfig::default();
        config.layers.push(config.layers[0].clone());
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn legends_reject_the_nodata_code() {
        let json = r#"{"legend": [{"code": 0, "label": "agriculture"}]}"#;
        assert!(serde_json::from_str::<PipelineConfig>(json).is_err());
        let json = r#"{"legend": [{"code": 1, "label": "agriculture"}, {"code": 1, "label": "settlements"}]}"#;
        assert!(serde_json::from_str::<PipelineConfig>(json).is_err());
    }

    #[test]
    fn unmapped_labels_are_rejected() {
        let mut config = PipelineConfig::default();
        config.remap = RemapTable::default();
        // Swamps no longer fold into grassland and have no code
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_geometry_settings_are_rejected() {
        let mut config = PipelineConfig {
            resolution: Some(0.0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        config.resolution = None;
        config.extent = Extent::new(10.0, 0.0, 0.0, 10.0);
        assert!(config.validate().is_err());
    }
}
