use super::LayerSpec;
use crate::error::{PipelineError, PipelineResult};
use crate::projection::epsg_from_wkt;
use geo_types::Geometry;
use geojson::GeoJson;
use serde_json::{Map, Value};
use shapefile::dbase::FieldValue;
use shapefile::Shape;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

const GEOJSON_DEFAULT_EPSG: u16 = 4326;

/// A feature as read from disk, before any cleaning. `geometry` is `None`
/// for null shapes and null GeoJSON geometries.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFeature {
    pub geometry: Option<Geometry<f64>>,
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawLayer {
    pub name: String,
    pub epsg: u16,
    pub features: Vec<RawFeature>,
}

pub fn read_layer(spec: &LayerSpec) -> PipelineResult<RawLayer> {
    read_vector(&spec.name, &spec.path, spec.epsg)
}

/// Reads a Shapefile (`.shp` + `.dbf`, CRS from `.prj`) or a GeoJSON file.
pub fn read_vector(name: &str, path: &Path, epsg: Option<u16>) -> PipelineResult<RawLayer> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let layer = match extension.as_deref() {
        Some("shp") => read_shapefile(name, path, epsg)?,
        Some("geojson") | Some("json") => read_geojson(name, path, epsg)?,
        _ => {
            return Err(PipelineError::schema(
                name,
                format!("{} is neither a shapefile nor GeoJSON", path.display()),
            ))
        }
    };
    debug!(
        "Read {} features from {} (EPSG:{})",
        layer.features.len(),
        path.display(),
        layer.epsg
    );
    Ok(layer)
}

fn read_shapefile(name: &str, path: &Path, epsg: Option<u16>) -> PipelineResult<RawLayer> {
    let epsg = match epsg {
        Some(epsg) => epsg,
        None => {
            let prj = path.with_extension("prj");
            let wkt = fs::read_to_string(&prj).map_err(|e| PipelineError::io(&prj, e))?;
            epsg_from_wkt(&wkt).ok_or_else(|| {
                PipelineError::schema(
                    name,
                    format!("{} has no EPSG authority, set epsg explicitly", prj.display()),
                )
            })?
        }
    };

    let shapefile_error = |source| PipelineError::Shapefile {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = shapefile::Reader::from_path(path).map_err(shapefile_error)?;
    let mut features = Vec::new();
    for item in reader.iter_shapes_and_records() {
        let (shape, record) = item.map_err(shapefile_error)?;
        let geometry = match shape {
            Shape::NullShape => None,
            shape => Some(Geometry::<f64>::try_from(shape).map_err(|e| {
                PipelineError::schema(name, format!("unsupported shape in {}: {e}", path.display()))
            })?),
        };
        let attributes = HashMap::<String, FieldValue>::from(record)
            .into_iter()
            .map(|(field, value)| (field, field_to_json(value)))
            .collect();
        features.push(RawFeature {
            geometry,
            attributes,
        });
    }

    Ok(RawLayer {
        name: name.to_string(),
        epsg,
        features,
    })
}

fn field_to_json(value: FieldValue) -> Value {
    match value {
        FieldValue::Character(Some(text)) => Value::String(text.trim().to_string()),
        FieldValue::Memo(text) => Value::String(text),
        FieldValue::Numeric(Some(n)) | FieldValue::Double(n) | FieldValue::Currency(n) => {
            number(n)
        }
        FieldValue::Float(Some(n)) => number(n as f64),
        FieldValue::Integer(n) => Value::from(n),
        FieldValue::Logical(Some(b)) => Value::Bool(b),
        FieldValue::Character(None)
        | FieldValue::Numeric(None)
        | FieldValue::Float(None)
        | FieldValue::Logical(None) => Value::Null,
        other => Value::String(format!("{other:?}")),
    }
}

// dBase has no integer type for N fields, so whole numbers come back as f64
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

fn read_geojson(name: &str, path: &Path, epsg: Option<u16>) -> PipelineResult<RawLayer> {
    let geojson_error = |source| PipelineError::GeoJson {
        path: path.to_path_buf(),
        source,
    };
    let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    let document = text.parse::<GeoJson>().map_err(geojson_error)?;

    let (declared, items) = match document {
        GeoJson::FeatureCollection(collection) => (
            collection.foreign_members.as_ref().and_then(declared_epsg),
            collection.features,
        ),
        GeoJson::Feature(feature) => (None, vec![feature]),
        GeoJson::Geometry(geometry) => (None, vec![geojson::Feature::from(geometry)]),
    };

    let mut features = Vec::with_capacity(items.len());
    for item in items {
        let geometry = match item.geometry {
            Some(geometry) => Some(Geometry::<f64>::try_from(geometry.value).map_err(geojson_error)?),
            None => None,
        };
        features.push(RawFeature {
            geometry,
            attributes: item.properties.unwrap_or_default(),
        });
    }

    Ok(RawLayer {
        name: name.to_string(),
        epsg: epsg.or(declared).unwrap_or(GEOJSON_DEFAULT_EPSG),
        features,
    })
}

/// EPSG code of a legacy named-CRS member such as
/// `{"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32643"}}`.
fn declared_epsg(members: &Map<String, Value>) -> Option<u16> {
    let name = members.get("crs")?.get("properties")?.get("name")?.as_str()?;
    if name.ends_with("CRS84") {
        return Some(4326);
    }
    name.rsplit(':').next()?.parse().ok()
}
