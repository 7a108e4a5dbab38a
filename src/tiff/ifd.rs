use super::{Endian, Tag, TagData, TagId, TagType, TiffError, Variant};
use num_traits::NumCast;
use std::io::{Read, Seek, SeekFrom};

#[derive(Clone, Debug, Default)]
pub struct Ifd(pub Vec<Tag>);

impl Ifd {
    /// Parses the directory at `offset`, returning it with the offset of the next one.
    ///
    /// Counts and sizes are bounded by the stream length before anything is allocated.
    pub fn parse<R: Read + Seek>(
        stream: &mut R,
        offset: u64,
        endian: Endian,
        variant: Variant,
    ) -> Result<(Ifd, u64), TiffError> {
        let stream_len = stream.seek(SeekFrom::End(0))?;
        let bad = |reason: String| TiffError::BadIfd { offset, reason };
        if offset >= stream_len {
            return Err(bad(format!("offset past the end of a {stream_len} byte stream")));
        }
        stream.seek(SeekFrom::Start(offset))?;

        let tag_count = match variant {
            Variant::Normal => endian.read::<2, u16>(stream)? as u64,
            Variant::Big => endian.read(stream)?,
        };
        let entry_size = 4 + 2 * variant.offset_bytesize() as u64;
        let entries_fit = tag_count
            .checked_mul(entry_size)
            .is_some_and(|size| size <= stream_len - offset);
        if !entries_fit {
            return Err(bad(format!("{tag_count} entries do not fit in the stream")));
        }

        let mut tags = Vec::new();
        for _ in 0..tag_count {
            let code: u16 = endian.read(stream)?;
            let datatype: TagType = endian.read::<2, u16>(stream)?.into();
            let count = variant.read_offset(endian, stream)?;

            let data_size = count
                .checked_mul(datatype.size_in_bytes() as u64)
                .filter(|size| *size <= stream_len)
                .ok_or_else(|| bad(format!("tag {code} claims {count} values")))?
                as usize;

            // Values that fit in the offset field are stored inline
            let offset_size = variant.offset_bytesize();
            let data = if data_size > offset_size {
                let data_offset = variant.read_offset(endian, stream)?;
                if data_offset.saturating_add(data_size as u64) > stream_len {
                    return Err(bad(format!("tag {code} data runs past the end of the stream")));
                }
                let resume = stream.stream_position()?;
                let mut data = vec![0; data_size];
                stream.seek(SeekFrom::Start(data_offset))?;
                stream.read_exact(&mut data)?;
                stream.seek(SeekFrom::Start(resume))?;
                data
            } else {
                let mut data = vec![0; offset_size];
                stream.read_exact(&mut data)?;
                data.truncate(data_size);
                data
            };

            tags.push(Tag {
                code,
                datatype,
                endian,
                count: count as usize,
                data,
            });
        }

        let next_ifd_offset = variant.read_offset(endian, stream)?;
        Ok((Ifd(tags), next_ifd_offset))
    }

    pub fn get_tag_by_code(&self, code: u16) -> Option<&Tag> {
        self.0.iter().find(|tag| tag.code == code)
    }

    pub fn get_tag(&self, id: TagId) -> Result<&Tag, TiffError> {
        self.get_tag_by_code(id.into())
            .ok_or(TiffError::MissingTag(id))
    }

    pub fn get_tag_values<T: NumCast>(&self, id: TagId) -> Result<Vec<T>, TiffError> {
        self.get_tag(id)?.values().ok_or(TiffError::BadTag(id))
    }

    pub fn get_tag_value<T: NumCast + Copy>(&self, id: TagId) -> Result<T, TiffError> {
        self.get_tag(id)?.value().ok_or(TiffError::BadTag(id))
    }

    /// Inserts or replaces a tag, keeping entries sorted by code as TIFF requires.
    pub fn set_tag(&mut self, id: TagId, data: TagData, endian: Endian) {
        let tag = Tag::new(id, &data, endian);
        match self.0.binary_search_by_key(&tag.code, |t| t.code) {
            Ok(index) => self.0[index] = tag,
            Err(index) => self.0.insert(index, tag),
        }
    }
}
