// https://docs.ogc.org/is/19-008r4/19-008r4.html#_requirements_class_geokeydirectorytag

use super::{GeoKeyId, GeoKeyValue, GeoTiffError};
use crate::tiff::{Endian, Ifd, TagData, TagId, TagType};
use std::fmt::Display;

#[derive(Clone, Debug, PartialEq)]
pub struct GeoKey {
    pub code: u16,
    pub value: GeoKeyValue,
}

impl GeoKey {
    pub fn id(&self) -> Option<GeoKeyId> {
        GeoKeyId::try_from(self.code).ok()
    }
}

impl Display for GeoKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let id_string = match self.id() {
            Some(id) => format!("{id:?}"),
            None => format!("0x{:04X}", self.code),
        };
        write!(f, "{}: {}", id_string, self.value)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeoKeyDirectory {
    pub version: u16,
    pub revision: (u16, u16),
    pub keys: Vec<GeoKey>,
}

impl Default for GeoKeyDirectory {
    fn default() -> Self {
        Self {
            version: 1,
            revision: (1, 0),
            keys: vec![],
        }
    }
}

impl GeoKeyDirectory {
    pub fn get(&self, id: GeoKeyId) -> Option<&GeoKeyValue> {
        let code: u16 = id.into();
        self.keys.iter().find(|k| k.code == code).map(|k| &k.value)
    }

    pub fn set(&mut self, id: GeoKeyId, value: GeoKeyValue) {
        let code: u16 = id.into();
        let key = GeoKey { code, value };
        match self.keys.binary_search_by_key(&code, |k| k.code) {
            Ok(index) => self.keys[index] = key,
            Err(index) => self.keys.insert(index, key),
        }
    }

    pub fn parse(ifd: &Ifd) -> Result<Self, GeoTiffError> {
        let directory: Vec<u16> = ifd
            .get_tag(TagId::GeoKeyDirectory)
            .map_err(|_| GeoTiffError::MissingTag(TagId::GeoKeyDirectory))?
            .values()
            .ok_or(GeoTiffError::BadTag(TagId::GeoKeyDirectory))?;

        if directory.len() < 4 {
            return Err(GeoTiffError::BadTag(TagId::GeoKeyDirectory));
        }
        let version = directory[0];
        let revision = (directory[1], directory[2]);
        let key_count = directory[3] as usize;
        if directory.len() < 4 + key_count * 4 {
            return Err(GeoTiffError::BadTag(TagId::GeoKeyDirectory));
        }

        let keys = directory[4..4 + key_count * 4]
            .chunks_exact(4)
            .map(|entry| {
                let (code, location, count, offset) = (entry[0], entry[1], entry[2], entry[3]);
                let value = if location == 0 {
                    GeoKeyValue::code(offset)
                } else {
                    key_value_from_tag(ifd, location, offset as usize, count as usize)
                        .unwrap_or(GeoKeyValue::Undefined)
                };
                GeoKey { code, value }
            })
            .collect();

        Ok(Self {
            version,
            revision,
            keys,
        })
    }

    /// Serializes the directory into the three GeoTIFF tags of `ifd`.
    pub fn add_to_ifd(&self, ifd: &mut Ifd, endian: Endian) {
        let (directory, ascii_params, double_params) = self.unparse();
        ifd.set_tag(TagId::GeoKeyDirectory, TagData::Short(directory), endian);
        if !ascii_params.is_empty() {
            ifd.set_tag(TagId::GeoAsciiParams, TagData::Ascii(ascii_params), endian);
        }
        if !double_params.is_empty() {
            ifd.set_tag(TagId::GeoDoubleParams, TagData::Double(double_params), endian);
        }
    }

    fn unparse(&self) -> (Vec<u16>, String, Vec<f64>) {
        let mut directory = vec![
            self.version,
            self.revision.0,
            self.revision.1,
            self.keys.len() as u16,
        ];
        let mut shorts = vec![];
        let mut asciis = String::new();
        let mut doubles = vec![];
        let directory_size = 4 * (self.keys.len() + 1);

        for key in &self.keys {
            directory.push(key.code);
            match &key.value {
                GeoKeyValue::Short(v) if v.len() == 1 => directory.extend([0, 1, v[0]]),
                GeoKeyValue::Short(v) => {
                    directory.push(TagId::GeoKeyDirectory.into());
                    directory.push(v.len() as u16);
                    directory.push((directory_size + shorts.len()) as u16);
                    shorts.extend(v);
                }
                GeoKeyValue::Ascii(s) => {
                    // Each ASCII value is terminated by a pipe
                    directory.push(TagId::GeoAsciiParams.into());
                    directory.push(s.len() as u16 + 1);
                    directory.push(asciis.len() as u16);
                    asciis.push_str(s);
                    asciis.push('|');
                }
                GeoKeyValue::Double(v) => {
                    directory.push(TagId::GeoDoubleParams.into());
                    directory.push(v.len() as u16);
                    directory.push(doubles.len() as u16);
                    doubles.extend(v);
                }
                GeoKeyValue::Undefined => directory.extend([0, 0, 0]),
            }
        }

        ([directory, shorts].concat(), asciis, doubles)
    }
}

fn key_value_from_tag(ifd: &Ifd, location: u16, start: usize, count: usize) -> Option<GeoKeyValue> {
    let tag = ifd.get_tag_by_code(location)?;
    let end = start + count;
    match tag.datatype {
        TagType::Ascii => {
            let s = String::from_utf8(tag.data.get(start..end)?.to_vec()).ok()?;
            Some(GeoKeyValue::Ascii(
                s.trim_end_matches(|c| c == '|' || c == '\0').to_string(),
            ))
        }
        TagType::Short => Some(GeoKeyValue::Short(
            tag.values::<u16>()?.get(start..end)?.to_vec(),
        )),
        TagType::Double => Some(GeoKeyValue::Double(
            tag.values::<f64>()?.get(start..end)?.to_vec(),
        )),
        _ => None,
    }
}
