use super::TagType;
use crate::tiff::Endian;

/// Owned tag payload used when building an IFD for writing.
#[derive(Clone, Debug, PartialEq)]
pub enum TagData {
    Ascii(String),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Double(Vec<f64>),
}

impl TagData {
    pub fn from_short(v: u16) -> Self {
        Self::Short(vec![v])
    }

    pub fn from_long(v: u32) -> Self {
        Self::Long(vec![v])
    }

    pub fn from_ascii(s: &str) -> Self {
        Self::Ascii(s.to_string())
    }

    /// Element count as recorded in the IFD entry. ASCII counts include the NUL.
    pub fn count(&self) -> usize {
        match self {
            Self::Ascii(s) => s.len() + 1,
            Self::Short(v) => v.len(),
            Self::Long(v) => v.len(),
            Self::Double(v) => v.len(),
        }
    }

    pub fn tag_type(&self) -> TagType {
        match self {
            Self::Ascii(_) => TagType::Ascii,
            Self::Short(_) => TagType::Short,
            Self::Long(_) => TagType::Long,
            Self::Double(_) => TagType::Double,
        }
    }

    pub fn bytes(&self, endian: Endian) -> Vec<u8> {
        match self {
            Self::Ascii(s) => s.bytes().chain(std::iter::once(0)).collect(),
            Self::Short(v) => endian.encode_all(v),
            Self::Long(v) => endian.encode_all(v),
            Self::Double(v) => endian.encode_all(v),
        }
    }
}
