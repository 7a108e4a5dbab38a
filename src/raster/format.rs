use super::RasterError;
use crate::tiff::{Endian, Ifd, TagData, TagId};
use num_enum::{FromPrimitive, IntoPrimitive};

const BLACK_IS_ZERO: u16 = 1;
const CHUNKY: u16 = 1;

#[derive(Debug, PartialEq, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
enum SampleFormat {
    Unsigned = 1,
    Signed = 2,
    Float = 3,

    #[num_enum(default)]
    Other = 0xFFFF,
}

/// Sample layout of a single-band class raster: unsigned 8 or 16 bit integers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleLayout {
    pub bits_per_sample: usize,
}

impl SampleLayout {
    /// The layout written for class codes.
    pub const CLASS_CODES: Self = Self { bits_per_sample: 8 };

    pub fn from_ifd(ifd: &Ifd) -> Result<Self, RasterError> {
        let samples_per_pixel: u16 = ifd.get_tag_value(TagId::SamplesPerPixel).unwrap_or(1);
        if samples_per_pixel != 1 {
            return Err(RasterError::NotSupported(format!(
                "{samples_per_pixel} samples per pixel; classified rasters have one band"
            )));
        }

        let bits_per_sample: usize = ifd.get_tag_value(TagId::BitsPerSample).unwrap_or(1);
        let format: SampleFormat = ifd
            .get_tag_value::<u16>(TagId::SampleFormat)
            .unwrap_or(SampleFormat::Unsigned.into())
            .into();
        if format != SampleFormat::Unsigned || !matches!(bits_per_sample, 8 | 16) {
            return Err(RasterError::NotSupported(format!(
                "{bits_per_sample}-bit {format:?} samples"
            )));
        }

        Ok(Self { bits_per_sample })
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample / 8
    }

    pub fn add_to_ifd(&self, ifd: &mut Ifd, endian: Endian) {
        ifd.set_tag(TagId::BitsPerSample, TagData::from_short(self.bits_per_sample as u16), endian);
        ifd.set_tag(TagId::SamplesPerPixel, TagData::from_short(1), endian);
        ifd.set_tag(TagId::PhotometricInterpretation, TagData::from_short(BLACK_IS_ZERO), endian);
        ifd.set_tag(TagId::PlanarConfiguration, TagData::from_short(CHUNKY), endian);
        ifd.set_tag(
            TagId::SampleFormat,
            TagData::from_short(SampleFormat::Unsigned.into()),
            endian,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_code_layout_reads_back() {
        let mut ifd = Ifd::default();
        SampleLayout::CLASS_CODES.add_to_ifd(&mut ifd, Endian::Little);
        let layout = SampleLayout::from_ifd(&ifd).unwrap();
        assert_eq!(layout, SampleLayout::CLASS_CODES);
        assert_eq!(layout.bytes_per_sample(), 1);
    }

    #[test]
    fn float_samples_are_rejected() {
        let mut ifd = Ifd::default();
        ifd.set_tag(TagId::BitsPerSample, TagData::from_short(32), Endian::Little);
        ifd.set_tag(
            TagId::SampleFormat,
            TagData::from_short(SampleFormat::Float.into()),
            Endian::Little,
        );
        assert!(matches!(
            SampleLayout::from_ifd(&ifd),
            Err(RasterError::NotSupported(_))
        ));
    }
}
