use std::collections::BTreeSet;
use std::fmt::Display;
use std::io::{self, Read, Seek, Write};

mod endian;
mod error;
mod ifd;
mod tag;

pub use endian::Endian;
pub use error::TiffError;
pub use ifd::Ifd;
pub use tag::{Tag, TagData, TagId, TagType};

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Variant {
    Normal,
    Big,
}

impl Variant {
    fn read_offset<R: Read>(&self, endian: Endian, stream: &mut R) -> io::Result<u64> {
        match self {
            Variant::Normal => endian.read::<4, u32>(stream).map(|v| v as u64),
            Variant::Big => endian.read(stream),
        }
    }

    const fn offset_bytesize(&self) -> usize {
        match self {
            Variant::Normal => 4,
            Variant::Big => 8,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Tiff {
    pub endian: Endian,
    pub variant: Variant,
    pub ifds: Vec<Ifd>,
}

impl Tiff {
    pub fn open<R: Read + Seek>(stream: &mut R) -> Result<Self, TiffError> {
        let mut buf = [0; 4];
        stream.read_exact(&mut buf)?;

        let endian = match &buf[..2] {
            b"II" => Endian::Little,
            b"MM" => Endian::Big,
            _ => return Err(TiffError::BadMagicBytes),
        };

        let variant = match &buf[2..4] {
            b"\0*" | b"*\0" => Variant::Normal,
            b"\0+" | b"+\0" => Variant::Big,
            _ => return Err(TiffError::BadMagicBytes),
        };

        if Variant::Big == variant {
            // BigTIFF header carries the offset bytesize (8) and a reserved 0
            let _offset_bytesize: u16 = endian.read(stream)?;
            let _reserved: u16 = endian.read(stream)?;
        }

        let mut ifds = vec![];
        let mut visited = BTreeSet::new();
        let mut ifd_offset = variant.read_offset(endian, stream)?;
        while ifd_offset != 0 {
            if !visited.insert(ifd_offset) {
                return Err(TiffError::IfdCycle(ifd_offset));
            }
            let (ifd, next_offset) = Ifd::parse(stream, ifd_offset, endian, variant)?;
            ifd_offset = next_offset;
            ifds.push(ifd);
        }

        Ok(Self {
            endian,
            variant,
            ifds,
        })
    }

    pub fn ifd0(&self) -> Result<&Ifd, TiffError> {
        self.ifds.first().ok_or(TiffError::NoIfd)
    }

    /// Writes a classic TIFF with a single IFD whose image data is `blocks`.
    ///
    /// Blocks are laid out right after the header; their offsets and byte
    /// counts are written into `offsets_tag` and `counts_tag`. Tag payloads
    /// that do not fit in an entry follow the IFD.
    pub fn write_single<W: Write>(
        writer: &mut W,
        endian: Endian,
        mut ifd: Ifd,
        blocks: &[Vec<u8>],
        offsets_tag: TagId,
        counts_tag: TagId,
    ) -> Result<(), TiffError> {
        const HEADER_SIZE: u64 = 8;

        let mut offsets = Vec::with_capacity(blocks.len());
        let mut counts = Vec::with_capacity(blocks.len());
        let mut cursor = HEADER_SIZE;
        for block in blocks {
            offsets.push(classic_offset(cursor)?);
            counts.push(classic_offset(block.len() as u64)?);
            cursor += block.len() as u64;
        }
        ifd.set_tag(offsets_tag, TagData::Long(offsets), endian);
        ifd.set_tag(counts_tag, TagData::Long(counts), endian);

        // Word align the IFD
        let padding = cursor % 2;
        let ifd_offset = cursor + padding;
        let entries = ifd.0.len() as u64;
        let mut overflow_offset = ifd_offset + 2 + 12 * entries + 4;

        let mut directory = Vec::with_capacity((2 + 12 * entries + 4) as usize);
        let mut overflow = Vec::new();
        directory.extend(endian.encode(entries as u16));
        for tag in ifd.0.iter() {
            directory.extend(endian.encode(tag.code));
            directory.extend(endian.encode(u16::from(tag.datatype)));
            directory.extend(endian.encode(classic_offset(tag.count as u64)?));
            if tag.data.len() <= 4 {
                let mut inline = tag.data.clone();
                inline.resize(4, 0);
                directory.extend(inline);
            } else {
                directory.extend(endian.encode(classic_offset(overflow_offset)?));
                overflow.extend(&tag.data);
                if tag.data.len() % 2 == 1 {
                    overflow.push(0);
                }
                overflow_offset = ifd_offset + 2 + 12 * entries + 4 + overflow.len() as u64;
            }
        }
        directory.extend(endian.encode(0_u32));
        classic_offset(overflow_offset)?;

        writer.write_all(endian.magic())?;
        writer.write_all(&endian.encode(42_u16))?;
        writer.write_all(&endian.encode(classic_offset(ifd_offset)?))?;
        for block in blocks {
            writer.write_all(block)?;
        }
        if padding == 1 {
            writer.write_all(&[0])?;
        }
        writer.write_all(&directory)?;
        writer.write_all(&overflow)?;
        Ok(())
    }
}

fn classic_offset(value: u64) -> Result<u32, TiffError> {
    u32::try_from(value).map_err(|_| TiffError::TooLarge(value))
}

impl Display for Tiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, ifd) in self.ifds.iter().enumerate() {
            writeln!(f, "IFD {i}:")?;
            for tag in ifd.0.iter() {
                writeln!(f, "\t{}", tag)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn written_directory_parses_back() {
        let endian = Endian::Little;
        let mut ifd = Ifd::default();
        ifd.set_tag(TagId::ImageHeight, TagData::from_long(2), endian);
        ifd.set_tag(TagId::ImageWidth, TagData::from_long(3), endian);
        ifd.set_tag(TagId::GdalNoData, TagData::from_ascii("0"), endian);
        ifd.set_tag(
            TagId::ModelPixelScale,
            TagData::Double(vec![6.0, 6.0, 0.0]),
            endian,
        );

        let blocks = vec![vec![1, 2, 3], vec![4, 5, 6]];
        let mut bytes = vec![];
        Tiff::write_single(
            &mut bytes,
            endian,
            ifd,
            &blocks,
            TagId::StripOffsets,
            TagId::StripByteCounts,
        )
        .unwrap();

        let tiff = Tiff::open(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(tiff.endian, Endian::Little);
        assert_eq!(tiff.variant, Variant::Normal);
        let ifd0 = tiff.ifd0().unwrap();
        assert_eq!(ifd0.get_tag_value::<u32>(TagId::ImageWidth).unwrap(), 3);
        assert_eq!(
            ifd0.get_tag_values::<f64>(TagId::ModelPixelScale).unwrap(),
            vec![6.0, 6.0, 0.0]
        );
        let offsets: Vec<usize> = ifd0.get_tag_values(TagId::StripOffsets).unwrap();
        assert_eq!(&bytes[offsets[1]..offsets[1] + 3], &[4, 5, 6]);
        let nodata = ifd0.get_tag(TagId::GdalNoData).unwrap().as_string();
        assert_eq!(nodata.as_deref(), Some("0"));
    }

    #[test]
    fn looping_directory_chains_are_rejected() {
        // One empty IFD at offset 8 whose next-IFD offset points at itself
        let mut bytes = b"II*\0".to_vec();
        bytes.extend(8_u32.to_le_bytes());
        bytes.extend(0_u16.to_le_bytes());
        bytes.extend(8_u32.to_le_bytes());
        let result = Tiff::open(&mut Cursor::new(&bytes));
        assert!(matches!(result, Err(TiffError::IfdCycle(8))));
    }

    #[test]
    fn huge_tag_counts_are_rejected() {
        let mut bytes = b"II+\0".to_vec();
        bytes.extend(8_u16.to_le_bytes());
        bytes.extend(0_u16.to_le_bytes());
        bytes.extend(16_u64.to_le_bytes());
        bytes.extend((1_u64 << 60).to_le_bytes());
        let result = Tiff::open(&mut Cursor::new(&bytes));
        assert!(matches!(result, Err(TiffError::BadIfd { offset: 16, .. })));
    }

    #[test]
    fn huge_value_counts_are_rejected() {
        let mut bytes = b"II*\0".to_vec();
        bytes.extend(8_u32.to_le_bytes());
        bytes.extend(1_u16.to_le_bytes());
        bytes.extend(u16::from(TagId::ModelPixelScale).to_le_bytes());
        bytes.extend(u16::from(TagType::Double).to_le_bytes());
        bytes.extend(u32::MAX.to_le_bytes());
        bytes.extend(26_u32.to_le_bytes());
        bytes.extend(0_u32.to_le_bytes());
        let result = Tiff::open(&mut Cursor::new(&bytes));
        assert!(matches!(result, Err(TiffError::BadIfd { offset: 8, .. })));
    }

    #[test]
    fn rejects_non_tiff_streams() {
        let result = Tiff::open(&mut Cursor::new(b"PK\x03\x04 not a tiff"));
        assert!(matches!(result, Err(TiffError::BadMagicBytes)));
    }
}
