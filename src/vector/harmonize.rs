use super::source::{RawFeature, RawLayer};
use super::{
    Contour, Feature, FeatureCollection, LabelSource, LayerKind, LayerSpec, LineCollection,
    LineFeature,
};
use crate::class::{ClassLabel, RemapTable};
use crate::error::{PipelineError, PipelineResult};
use crate::projection::Crs;
use geo::{unary_union, CoordsIter, Validation};
use geo_types::{Geometry, MultiLineString, MultiPolygon, Polygon};
use tracing::{debug, info};

/// Output of the Vector Harmonizer: filled-area classes for rasterization
/// and linear features tracked on the side.
#[derive(Debug, Clone, PartialEq)]
pub struct Harmonized {
    pub areas: FeatureCollection,
    pub lines: LineCollection,
}

impl Harmonized {
    fn new(epsg: u16) -> Self {
        Self {
            areas: FeatureCollection::new(epsg),
            lines: LineCollection::new(epsg),
        }
    }

    fn extend(&mut self, other: Harmonized) {
        self.areas.features.extend(other.areas.features);
        self.lines.features.extend(other.lines.features);
    }
}

/// Harmonizes every layer and concatenates the results in layer order.
pub fn harmonize<'a, I>(
    layers: I,
    target: &Crs,
    remap: &RemapTable,
    contour: &Contour,
) -> PipelineResult<Harmonized>
where
    I: IntoIterator<Item = (&'a LayerSpec, RawLayer)>,
{
    let mut harmonized = Harmonized::new(target.epsg());
    for (spec, raw) in layers {
        harmonized.extend(harmonize_layer(spec, raw, target, remap, contour)?);
    }
    info!(
        "Harmonized {} area features and {} linear features",
        harmonized.areas.len(),
        harmonized.lines.len()
    );
    Ok(harmonized)
}

#[derive(Debug, Default)]
struct LayerStats {
    read: usize,
    empty: usize,
    outside: usize,
}

/// Cleans one layer: drops empty geometries, maps attributes to
/// `{id, class_label}`, reprojects, applies the remap table, repairs
/// polygons and clips everything to the contour.
pub fn harmonize_layer(
    spec: &LayerSpec,
    raw: RawLayer,
    target: &Crs,
    remap: &RemapTable,
    contour: &Contour,
) -> PipelineResult<Harmonized> {
    if contour.epsg != target.epsg() {
        return Err(PipelineError::schema(
            &spec.name,
            format!("contour is in EPSG:{}, expected {target}", contour.epsg),
        ));
    }
    let source = Crs::from_epsg(raw.epsg)?;
    let mut stats = LayerStats {
        read: raw.features.len(),
        ..Default::default()
    };
    let mut out = Harmonized::new(target.epsg());

    for (index, feature) in raw.features.into_iter().enumerate() {
        let Some(geometry) = feature.geometry.as_ref().filter(|g| g.coords_count() > 0) else {
            stats.empty += 1;
            continue;
        };
        let id = feature_id(spec, &feature, index)?;
        let class_label = remap.apply(feature_label(spec, &feature)?);
        let geometry = source.reproject(target, geometry)?;

        match spec.kind {
            LayerKind::Area => {
                let polygons = as_polygons(spec, id, geometry)?;
                let repaired = repair(spec, id, &polygons)?;
                if repaired.0.is_empty() {
                    stats.empty += 1;
                    continue;
                }
                let clipped = contour.clip_polygons(&repaired);
                if clipped.0.is_empty() {
                    stats.outside += 1;
                    continue;
                }
                out.areas.features.push(Feature {
                    id,
                    class_label,
                    geometry: clipped,
                });
            }
            LayerKind::Linear => {
                let lines = as_lines(spec, id, geometry)?;
                let clipped = contour.clip_lines(&lines);
                if clipped.0.iter().all(|line| line.0.len() < 2) {
                    stats.outside += 1;
                    continue;
                }
                out.lines.features.push(LineFeature {
                    id,
                    class_label,
                    geometry: clipped,
                });
            }
        }
    }

    info!(
        "Layer {}: {} read, {} empty dropped, {} outside contour, {} kept",
        spec.name,
        stats.read,
        stats.empty,
        stats.outside,
        out.areas.len() + out.lines.len()
    );
    Ok(out)
}

fn feature_id(spec: &LayerSpec, feature: &RawFeature, index: usize) -> PipelineResult<i64> {
    let Some(field) = &spec.id_field else {
        return Ok(index as i64);
    };
    feature
        .attributes
        .get(field)
        .and_then(|value| value.as_i64())
        .ok_or_else(|| {
            PipelineError::schema(
                &spec.name,
                format!("feature {index} has no integer id in attribute {field:?}"),
            )
        })
}

fn feature_label(spec: &LayerSpec, feature: &RawFeature) -> PipelineResult<ClassLabel> {
    match &spec.label {
        LabelSource::Constant(label) => Ok(*label),
        LabelSource::Attribute(field) => {
            let value = feature
                .attributes
                .get(field)
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    PipelineError::schema(&spec.name, format!("missing label attribute {field:?}"))
                })?;
            value
                .parse()
                .map_err(|e| PipelineError::schema(&spec.name, format!("{field:?}: {e}")))
        }
    }
}

fn as_polygons(spec: &LayerSpec, id: i64, geometry: Geometry<f64>) -> PipelineResult<MultiPolygon<f64>> {
    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    push_polygons(geometry, &mut polygons).map_err(|kind| {
        PipelineError::schema(
            &spec.name,
            format!("feature {id} is a {kind}, expected polygons"),
        )
    })?;
    Ok(MultiPolygon::new(polygons))
}

fn push_polygons(geometry: Geometry<f64>, polygons: &mut Vec<Polygon<f64>>) -> Result<(), &'static str> {
    match geometry {
        Geometry::Polygon(polygon) => polygons.push(polygon),
        Geometry::MultiPolygon(multi) => polygons.extend(multi),
        Geometry::Rect(rect) => polygons.push(rect.to_polygon()),
        Geometry::Triangle(triangle) => polygons.push(triangle.to_polygon()),
        Geometry::GeometryCollection(collection) => {
            for member in collection {
                push_polygons(member, polygons)?;
            }
        }
        Geometry::Point(_) | Geometry::MultiPoint(_) => return Err("point"),
        Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
            return Err("line")
        }
    }
    Ok(())
}

fn as_lines(spec: &LayerSpec, id: i64, geometry: Geometry<f64>) -> PipelineResult<MultiLineString<f64>> {
    match geometry {
        Geometry::LineString(line) => Ok(MultiLineString::new(vec![line])),
        Geometry::MultiLineString(lines) => Ok(lines),
        Geometry::Line(line) => Ok(MultiLineString::new(vec![line.into()])),
        other => Err(PipelineError::schema(
            &spec.name,
            format!(
                "feature {id} has {} coordinates but is not a line string",
                other.coords_count()
            ),
        )),
    }
}

/// Dissolves the parts of a feature into one valid multipolygon, fixing
/// self-intersections and overlapping parts. Like a zero-distance buffer, a
/// self-intersecting ring keeps only the part its orientation encloses.
fn repair(spec: &LayerSpec, id: i64, polygons: &MultiPolygon<f64>) -> PipelineResult<MultiPolygon<f64>> {
    repair_with(spec, id, polygons, |parts| unary_union(parts.0.iter()))
}

fn repair_with<F>(
    spec: &LayerSpec,
    id: i64,
    polygons: &MultiPolygon<f64>,
    dissolve: F,
) -> PipelineResult<MultiPolygon<f64>>
where
    F: FnOnce(&MultiPolygon<f64>) -> MultiPolygon<f64>,
{
    if polygons.is_valid() {
        return Ok(polygons.clone());
    }
    let repaired = dissolve(polygons);
    if !repaired.is_valid() {
        return Err(PipelineError::InvalidGeometry {
            layer: spec.name.clone(),
            id,
        });
    }
    debug!("Repaired feature {id} of layer {}", spec.name);
    Ok(repaired)
}
