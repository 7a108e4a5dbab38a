use std::fmt;

/// A GeoKey value, resolved from the directory or one of the param tags.
#[derive(Clone, Debug, PartialEq)]
pub enum GeoKeyValue {
    Short(Vec<u16>),
    Ascii(String),
    Double(Vec<f64>),
    Undefined,
}

impl GeoKeyValue {
    /// A single code such as an EPSG number or a model type.
    pub fn code(code: u16) -> Self {
        Self::Short(vec![code])
    }

    /// The value as a single integer code, if it is one.
    pub fn as_code(&self) -> Option<u16> {
        match self {
            Self::Short(v) if v.len() == 1 => Some(v[0]),
            Self::Double(v) if v.len() == 1 && v[0].fract() == 0.0 => {
                u16::try_from(v[0] as i64).ok()
            }
            _ => None,
        }
    }
}

impl fmt::Display for GeoKeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascii(s) => write!(f, "{s:?}"),
            Self::Short(v) if v.len() == 1 => write!(f, "{}", v[0]),
            Self::Short(v) => write!(f, "{v:?}"),
            Self::Double(v) => write!(f, "{v:?}"),
            Self::Undefined => f.write_str("?"),
        }
    }
}
