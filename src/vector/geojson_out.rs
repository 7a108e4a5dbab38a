use super::{FeatureCollection, LineCollection};
use crate::error::{PipelineError, PipelineResult};
use crate::class::ClassLabel;
use geojson::feature::Id;
use geojson::{Feature, GeoJson, Geometry, JsonObject, Value};
use serde_json::json;
use std::fs;
use std::path::Path;

fn properties(id: i64, class_label: ClassLabel) -> JsonObject {
    let mut properties = JsonObject::new();
    properties.insert("id".into(), json!(id));
    properties.insert("class_label".into(), json!(class_label.as_str()));
    properties
}

fn named_crs(epsg: u16) -> JsonObject {
    let mut members = JsonObject::new();
    members.insert(
        "crs".into(),
        json!({
            "type": "name",
            "properties": { "name": format!("urn:ogc:def:crs:EPSG::{epsg}") }
        }),
    );
    members
}

fn document(epsg: u16, features: Vec<Feature>) -> GeoJson {
    GeoJson::FeatureCollection(geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(named_crs(epsg)),
    })
}

/// Serializes the harmonized areas with properties `{id, class_label}`.
pub fn encode_geojson(collection: &FeatureCollection) -> String {
    let features = collection
        .iter()
        .map(|feature| Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::from(&feature.geometry))),
            id: Some(Id::Number(feature.id.into())),
            properties: Some(properties(feature.id, feature.class_label)),
            foreign_members: None,
        })
        .collect();
    document(collection.epsg, features).to_string()
}

fn encode_lines(collection: &LineCollection) -> String {
    let features = collection
        .features
        .iter()
        .map(|feature| Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::from(&feature.geometry))),
            id: Some(Id::Number(feature.id.into())),
            properties: Some(properties(feature.id, feature.class_label)),
            foreign_members: None,
        })
        .collect();
    document(collection.epsg, features).to_string()
}

pub fn write_geojson<P: AsRef<Path>>(collection: &FeatureCollection, path: P) -> PipelineResult<()> {
    let path = path.as_ref();
    fs::write(path, encode_geojson(collection)).map_err(|e| PipelineError::io(path, e))
}

pub fn write_lines_geojson<P: AsRef<Path>>(collection: &LineCollection, path: P) -> PipelineResult<()> {
    let path = path.as_ref();
    fs::write(path, encode_lines(collection)).map_err(|e| PipelineError::io(path, e))
}
