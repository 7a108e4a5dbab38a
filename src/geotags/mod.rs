// https://docs.ogc.org/is/19-008r4/19-008r4.html#_geotiff_tags_for_coordinate_transformations

use crate::tiff::{Endian, Ifd, TagData, TagId};
use std::fmt::Display;

mod error;
mod id;
mod keys;
mod value;

pub use error::GeoTiffError;
pub use id::*;
pub use keys::{GeoKey, GeoKeyDirectory};
pub use value::GeoKeyValue;

/// Georeferencing of an axis-aligned raster: a tiepoint, a pixel scale and
/// the key directory naming its CRS.
#[derive(Clone, Debug, PartialEq)]
pub struct GeoTags {
    pub tiepoint: [f64; 6],
    pub pixel_scale: [f64; 3],
    pub directory: GeoKeyDirectory,
}

impl Display for GeoTags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "GeoTIFF Tags:")?;
        writeln!(f, "  Tiepoint: {:?}", self.tiepoint)?;
        writeln!(f, "  Pixel Scale: {:?}", self.pixel_scale)?;
        write!(
            f,
            "  Directory: {{version: {}, revision: {}.{}}}",
            self.directory.version, self.directory.revision.0, self.directory.revision.1,
        )?;
        for key in self.directory.keys.iter() {
            write!(f, "\n    {key}")?;
        }
        Ok(())
    }
}

impl GeoTags {
    /// Tags for a north-up raster whose top-left corner sits at `origin`.
    pub fn north_up(origin: (f64, f64), resolution: (f64, f64), epsg: u16, geographic: bool) -> Self {
        let mut directory = GeoKeyDirectory::default();
        let (model_type, crs_key) = if geographic {
            (MODEL_TYPE_GEOGRAPHIC, GeoKeyId::GeographicTypeGeoKey)
        } else {
            (MODEL_TYPE_PROJECTED, GeoKeyId::ProjectedCSTypeGeoKey)
        };
        directory.set(GeoKeyId::GTModelTypeGeoKey, GeoKeyValue::code(model_type));
        directory.set(
            GeoKeyId::GTRasterTypeGeoKey,
            GeoKeyValue::code(RASTER_PIXEL_IS_AREA),
        );
        directory.set(crs_key, GeoKeyValue::code(epsg));
        directory.set(
            GeoKeyId::GTCitationGeoKey,
            GeoKeyValue::Ascii(format!("EPSG:{epsg}")),
        );

        Self {
            tiepoint: [0.0, 0.0, 0.0, origin.0, origin.1, 0.0],
            pixel_scale: [resolution.0, resolution.1, 0.0],
            directory,
        }
    }

    pub fn parse(ifd: &Ifd) -> Result<Self, GeoTiffError> {
        let tiepoint = tag_array::<6>(ifd, TagId::ModelTiepoint);
        let pixel_scale = tag_array::<3>(ifd, TagId::ModelPixelScale);
        let transformation = tag_array::<16>(ifd, TagId::ModelTransformation);

        let (tiepoint, pixel_scale) = match (tiepoint, pixel_scale, transformation) {
            (Some(tiepoint), Some(pixel_scale), _) => (tiepoint, pixel_scale),
            (_, _, Some(m)) => {
                if m[1] != 0.0 || m[4] != 0.0 {
                    return Err(GeoTiffError::UnsupportedTransformation);
                }
                ([0.0, 0.0, 0.0, m[3], m[7], m[11]], [m[0], -m[5], m[10]])
            }
            (None, _, _) => return Err(GeoTiffError::MissingTag(TagId::ModelTiepoint)),
            (_, None, _) => return Err(GeoTiffError::MissingTag(TagId::ModelPixelScale)),
        };

        if !pixel_scale[0].is_normal() || !pixel_scale[1].is_normal() {
            return Err(GeoTiffError::BadTag(TagId::ModelPixelScale));
        }

        let directory = GeoKeyDirectory::parse(ifd)?;

        Ok(Self {
            tiepoint,
            pixel_scale,
            directory,
        })
    }

    pub fn add_to_ifd(&self, ifd: &mut Ifd, endian: Endian) {
        ifd.set_tag(TagId::ModelTiepoint, TagData::Double(self.tiepoint.to_vec()), endian);
        ifd.set_tag(
            TagId::ModelPixelScale,
            TagData::Double(self.pixel_scale.to_vec()),
            endian,
        );
        self.directory.add_to_ifd(ifd, endian);
    }

    /// EPSG code of the projected CRS, falling back to the geographic one.
    pub fn epsg(&self) -> Result<u16, GeoTiffError> {
        [GeoKeyId::ProjectedCSTypeGeoKey, GeoKeyId::GeographicTypeGeoKey]
            .into_iter()
            .filter_map(|id| self.directory.get(id))
            .filter_map(|value| value.as_code())
            // 32767 is "user defined", which carries no EPSG code
            .find(|code| *code != 0 && *code != 32767)
            .ok_or(GeoTiffError::MissingCrs)
    }

    pub fn pixel_is_point(&self) -> bool {
        self.directory
            .get(GeoKeyId::GTRasterTypeGeoKey)
            .and_then(|v| v.as_code())
            == Some(RASTER_PIXEL_IS_POINT)
    }

    pub fn resolution(&self) -> (f64, f64) {
        (self.pixel_scale[0], self.pixel_scale[1])
    }

    /// Model coordinates of the top-left corner of pixel (0, 0).
    pub fn origin(&self) -> (f64, f64) {
        let (sx, sy) = self.resolution();
        let [i, j, _, x, y, _] = self.tiepoint;
        let (mut left, mut top) = (x - i * sx, y + j * sy);
        if self.pixel_is_point() {
            left -= sx / 2.0;
            top += sy / 2.0;
        }
        (left, top)
    }
}

fn tag_array<const N: usize>(ifd: &Ifd, id: TagId) -> Option<[f64; N]> {
    ifd.get_tag_values::<f64>(id).ok()?.try_into().ok()
}
