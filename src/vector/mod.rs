//! Historical vector layers: reading, harmonizing and writing.

use crate::class::ClassLabel;
use geo_types::{MultiLineString, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::PathBuf;

mod contour;
mod geojson_out;
mod harmonize;
mod source;

pub use contour::{load_contour, Contour, ContourSource};
pub use geojson_out::{encode_geojson, write_geojson, write_lines_geojson};
pub use harmonize::{harmonize, harmonize_layer, Harmonized};
pub use source::{read_layer, read_vector, RawFeature, RawLayer};

/// Whether a layer is filled area or linear network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Area,
    Linear,
}

/// Where a layer's class label comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    /// Every feature of the layer gets the same label.
    Constant(ClassLabel),
    /// Label read per feature from an attribute.
    Attribute(String),
}

/// One input vector file and how to map it onto the common schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    pub path: PathBuf,
    /// Source CRS. Sniffed from the `.prj` sidecar (or assumed WGS 84 for
    /// GeoJSON) when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epsg: Option<u16>,
    pub kind: LayerKind,
    pub label: LabelSource,
    /// Integer attribute used as feature id; features are numbered in file
    /// order when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_field: Option<String>,
}

impl LayerSpec {
    pub fn area<N: Into<String>, P: Into<PathBuf>>(name: N, path: P, label: ClassLabel) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            epsg: None,
            kind: LayerKind::Area,
            label: LabelSource::Constant(label),
            id_field: None,
        }
    }

    pub fn linear<N: Into<String>, P: Into<PathBuf>>(name: N, path: P, label: ClassLabel) -> Self {
        Self {
            kind: LayerKind::Linear,
            ..Self::area(name, path, label)
        }
    }

    pub fn with_epsg(mut self, epsg: u16) -> Self {
        self.epsg = Some(epsg);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: i64,
    pub class_label: ClassLabel,
    pub geometry: MultiPolygon<f64>,
}

/// Area features sharing one CRS, in concatenation order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCollection {
    pub epsg: u16,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(epsg: u16) -> Self {
        Self {
            epsg,
            features: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }
}

impl Display for FeatureCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FeatureCollection(EPSG:{}, {} features)", self.epsg, self.len())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineFeature {
    pub id: i64,
    pub class_label: ClassLabel,
    pub geometry: MultiLineString<f64>,
}

/// Linear features kept out of the area collection.
#[derive(Debug, Clone, PartialEq)]
pub struct LineCollection {
    pub epsg: u16,
    pub features: Vec<LineFeature>,
}

impl LineCollection {
    pub fn new(epsg: u16) -> Self {
        Self {
            epsg,
            features: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
