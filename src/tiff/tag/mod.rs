// https://www.itu.int/itudoc/itu-t/com16/tiff-fx/docs/tiff6.pdf
// https://www.awaresystems.be/imaging/tiff/bigtiff.html

use super::Endian;
use num_enum::{FromPrimitive, IntoPrimitive};
use num_traits::NumCast;
use std::fmt::Display;

mod data;
mod id;

pub use data::TagData;
pub use id::TagId;

#[derive(Clone, Debug)]
pub struct Tag {
    pub code: u16,
    pub datatype: TagType,
    pub count: usize,
    pub data: Vec<u8>,
    pub endian: Endian,
}

impl Tag {
    pub fn new(id: TagId, data: &TagData, endian: Endian) -> Self {
        Self {
            code: id.into(),
            datatype: data.tag_type(),
            count: data.count(),
            data: data.bytes(endian),
            endian,
        }
    }

    pub fn id(&self) -> Option<TagId> {
        TagId::try_from(self.code).ok()
    }

    /// Numeric values of the tag cast to `T`, coercing across integer and
    /// float types. `None` if the tag is not numeric or a value does not fit.
    pub fn values<T: NumCast>(&self) -> Option<Vec<T>> {
        let e = self.endian;
        let bytes = self.data.as_slice();
        match self.datatype {
            TagType::Byte | TagType::Undefined => bytes.iter().map(|v| T::from(*v)).collect(),
            TagType::SByte => bytes.iter().map(|v| T::from(*v as i8)).collect(),
            TagType::Short => e.decode_all_as::<2, u16, T>(bytes),
            TagType::SShort => e.decode_all_as::<2, i16, T>(bytes),
            TagType::Long | TagType::Ifd => e.decode_all_as::<4, u32, T>(bytes),
            TagType::SLong => e.decode_all_as::<4, i32, T>(bytes),
            TagType::Long8 | TagType::Ifd8 => e.decode_all_as::<8, u64, T>(bytes),
            TagType::SLong8 => e.decode_all_as::<8, i64, T>(bytes),
            TagType::Float => e.decode_all_as::<4, f32, T>(bytes),
            TagType::Double => e.decode_all_as::<8, f64, T>(bytes),
            TagType::Rational => {
                let parts: Vec<f64> = e.decode_all_as::<4, u32, f64>(bytes)?;
                parts
                    .chunks_exact(2)
                    .map(|pair| T::from(pair[0] / pair[1]))
                    .collect()
            }
            TagType::SRational => {
                let parts: Vec<f64> = e.decode_all_as::<4, i32, f64>(bytes)?;
                parts
                    .chunks_exact(2)
                    .map(|pair| T::from(pair[0] / pair[1]))
                    .collect()
            }
            TagType::Ascii | TagType::Unknown => None,
        }
    }

    pub fn value<T: NumCast + Copy>(&self) -> Option<T> {
        self.values::<T>()?.first().copied()
    }

    pub fn as_string(&self) -> Option<String> {
        match self.datatype {
            TagType::Ascii => String::from_utf8(self.data.clone())
                .ok()
                .map(|s| s.trim_end_matches('\0').to_string()),
            _ => None,
        }
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let id_string = match self.id() {
            Some(id) => format!("{id:?}"),
            None => format!("Unknown({})", self.code),
        };
        let value_string = match (self.as_string(), self.values::<f64>()) {
            (Some(s), _) => s.replace('\n', "\\n"),
            (None, Some(v)) if v.len() == 1 => format!("{}", v[0]),
            (None, Some(v)) => format!("{v:?}"),
            (None, None) => "Undefined".to_string(),
        };
        let value_string = if value_string.len() > 100 {
            format!("{}...", value_string.chars().take(97).collect::<String>())
        } else {
            value_string
        };
        write!(
            f,
            "{} {:?}[{}]: {}",
            id_string, self.datatype, self.count, value_string
        )
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum TagType {
    Byte = 1,
    Ascii = 2,
    Short = 3,
    Long = 4,
    Rational = 5,
    SByte = 6,
    Undefined = 7,
    SShort = 8,
    SLong = 9,
    SRational = 10,
    Float = 11,
    Double = 12,
    Ifd = 13,
    Long8 = 16,
    SLong8 = 17,
    Ifd8 = 18,

    #[num_enum(default)]
    Unknown = 0xFFFF,
}

impl TagType {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            TagType::Byte | TagType::Ascii | TagType::SByte | TagType::Undefined => 1,
            TagType::Short | TagType::SShort => 2,
            TagType::Long | TagType::SLong | TagType::Float | TagType::Ifd => 4,
            TagType::Rational
            | TagType::SRational
            | TagType::Double
            | TagType::Long8
            | TagType::SLong8
            | TagType::Ifd8 => 8,
            TagType::Unknown => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_values_coerce_between_types() {
        let tag = Tag::new(TagId::ImageWidth, &TagData::Short(vec![3, 7]), Endian::Big);
        assert_eq!(tag.values::<u32>(), Some(vec![3, 7]));
        assert_eq!(tag.value::<f64>(), Some(3.0));
    }

    #[test]
    fn ascii_tags_drop_trailing_nul() {
        let tag = Tag::new(TagId::GdalNoData, &TagData::from_ascii("0"), Endian::Little);
        assert_eq!(tag.count, 2);
        assert_eq!(tag.as_string().as_deref(), Some("0"));
        assert!(tag.values::<f64>().is_none());
    }
}
