use super::format::SampleLayout;
use super::{CategoricalGrid, Compression, GridSpec, Predictor, RasterError, NODATA};
use crate::geotags::GeoTags;
use crate::projection::{Crs, Extent};
use crate::tiff::{Endian, Ifd, TagData, TagId, Tiff};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

const STRIP_TARGET_BYTES: usize = 64 * 1024;

/// Where the pixel data of an image lives: strips are full-width blocks,
/// tiles are fixed-size blocks padded at the image edges.
#[derive(Debug)]
struct BlockLayout {
    block_width: usize,
    block_height: usize,
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
}

impl BlockLayout {
    fn from_ifd(ifd: &Ifd, width: usize, height: usize) -> Result<Self, RasterError> {
        let layout = if let Ok(tile_width) = ifd.get_tag_value::<usize>(TagId::TileWidth) {
            Self {
                block_width: tile_width,
                block_height: ifd.get_tag_value(TagId::TileLength)?,
                offsets: ifd.get_tag_values(TagId::TileOffsets)?,
                byte_counts: ifd.get_tag_values(TagId::TileByteCounts)?,
            }
        } else {
            Self {
                block_width: width,
                block_height: ifd
                    .get_tag_value::<usize>(TagId::RowsPerStrip)
                    .unwrap_or(height)
                    .min(height),
                offsets: ifd.get_tag_values(TagId::StripOffsets)?,
                byte_counts: ifd.get_tag_values(TagId::StripByteCounts)?,
            }
        };
        if layout.block_width == 0 || layout.block_height == 0 {
            return Err(RasterError::InvalidGrid("zero-sized image blocks".into()));
        }
        if layout.offsets.len() != layout.byte_counts.len() {
            return Err(RasterError::InvalidGrid(
                "block offsets and byte counts differ in length".into(),
            ));
        }
        let expected = width.div_ceil(layout.block_width) * height.div_ceil(layout.block_height);
        if layout.offsets.len() < expected {
            return Err(RasterError::InvalidGrid(format!(
                "{} image blocks, expected {expected}",
                layout.offsets.len()
            )));
        }
        Ok(layout)
    }

    fn blocks_across(&self, width: usize) -> usize {
        width.div_ceil(self.block_width)
    }
}

/// Reads a single-band categorical GeoTIFF.
///
/// Cells equal to the GDAL no-data value become [`NODATA`]; other values
/// must fit in a `u8` class code.
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<CategoricalGrid, RasterError> {
    let mut reader = BufReader::new(File::open(path)?);
    decode_geotiff(&mut reader)
}

pub fn decode_geotiff<R: Read + Seek>(reader: &mut R) -> Result<CategoricalGrid, RasterError> {
    let tiff = Tiff::open(reader)?;
    let ifd = tiff.ifd0()?;
    let geo = GeoTags::parse(ifd)?;

    let width: usize = ifd.get_tag_value(TagId::ImageWidth)?;
    let height: usize = ifd.get_tag_value(TagId::ImageHeight)?;
    let samples = SampleLayout::from_ifd(ifd)?;
    let bits_per_sample = samples.bits_per_sample;
    let compression: Compression = ifd
        .get_tag_value::<u16>(TagId::Compression)
        .unwrap_or(Compression::Uncompressed.into())
        .into();
    let predictor: Predictor = ifd
        .get_tag_value::<u16>(TagId::Predictor)
        .unwrap_or(Predictor::No.into())
        .into();

    let nodata = ifd
        .get_tag(TagId::GdalNoData)
        .ok()
        .and_then(|tag| tag.as_string())
        .and_then(|s| s.trim().parse::<f64>().ok());

    let layout = BlockLayout::from_ifd(ifd, width, height)?;
    debug!(
        "GeoTIFF {width}x{height}, {bits_per_sample}-bit, {compression:?}, {:?} blocks of {}x{}",
        layout.offsets.len(),
        layout.block_width,
        layout.block_height
    );

    let bytes_per_sample = samples.bytes_per_sample();
    let cell_count = width
        .checked_mul(height)
        .ok_or_else(|| RasterError::InvalidGrid(format!("{width}x{height} cells")))?;
    let stream_len = reader.seek(SeekFrom::End(0))?;
    let mut cells = vec![NODATA; cell_count];
    let across = layout.blocks_across(width);
    for (index, (&offset, &count)) in layout.offsets.iter().zip(&layout.byte_counts).enumerate() {
        let block_col = index % across;
        let block_row = index / across;
        let x0 = block_col * layout.block_width;
        let y0 = block_row * layout.block_height;
        if y0 >= height {
            break;
        }

        match offset.checked_add(count) {
            Some(block_end) if block_end <= stream_len => {}
            _ => {
                return Err(RasterError::InvalidGrid(format!(
                    "image block {index} runs past the end of the file"
                )))
            }
        }
        let mut raw = vec![0; count as usize];
        reader.seek(SeekFrom::Start(offset))?;
        reader.read_exact(&mut raw)?;
        let mut buffer = compression.decode(&raw)?;
        predictor.undo(&mut buffer, layout.block_width, bits_per_sample, tiff.endian)?;

        let row_bytes = layout.block_width * bytes_per_sample;
        for (dy, row) in buffer.chunks(row_bytes).enumerate() {
            let y = y0 + dy;
            if y >= height || dy >= layout.block_height {
                break;
            }
            for (dx, sample) in row.chunks_exact(bytes_per_sample).enumerate() {
                let x = x0 + dx;
                if x >= width {
                    break;
                }
                let value = match bytes_per_sample {
                    1 => sample[0] as u64,
                    _ => tiff.endian.decode::<2, u16>([sample[0], sample[1]])? as u64,
                };
                cells[y * width + x] = class_code(value, nodata)?;
            }
        }
    }

    let (left, top) = geo.origin();
    let (sx, sy) = geo.resolution();
    let extent = Extent::new(left, top - sy * height as f64, left + sx * width as f64, top);
    let spec = GridSpec::new(extent, width, height, geo.epsg()?)?;
    CategoricalGrid::from_cells(spec, cells)
}

fn class_code(value: u64, nodata: Option<f64>) -> Result<u8, RasterError> {
    if nodata == Some(value as f64) {
        return Ok(NODATA);
    }
    u8::try_from(value).map_err(|_| RasterError::CodeOutOfRange(value))
}

/// Writes a grid as a Deflate-compressed, striped, single-band GeoTIFF.
pub fn write_geotiff<P: AsRef<Path>>(grid: &CategoricalGrid, path: P) -> Result<(), RasterError> {
    let mut writer = BufWriter::new(File::create(path)?);
    encode_geotiff(grid, &mut writer)?;
    writer.flush()?;
    Ok(())
}

pub fn encode_geotiff<W: Write>(grid: &CategoricalGrid, writer: &mut W) -> Result<(), RasterError> {
    let endian = Endian::Little;
    let spec = grid.spec();
    let compression = Compression::DeflateAdobe;
    let rows_per_strip = (STRIP_TARGET_BYTES / spec.cols).clamp(1, spec.rows);

    let mut ifd = Ifd::default();
    ifd.set_tag(TagId::ImageWidth, TagData::from_long(spec.cols as u32), endian);
    ifd.set_tag(TagId::ImageHeight, TagData::from_long(spec.rows as u32), endian);
    ifd.set_tag(TagId::Compression, TagData::from_short(compression.into()), endian);
    ifd.set_tag(TagId::RowsPerStrip, TagData::from_long(rows_per_strip as u32), endian);
    SampleLayout::CLASS_CODES.add_to_ifd(&mut ifd, endian);
    ifd.set_tag(TagId::GdalNoData, TagData::from_ascii(&NODATA.to_string()), endian);

    let geographic = Crs::from_epsg(spec.epsg)?.is_geographic();
    let geo = GeoTags::north_up(
        (spec.extent.min_x, spec.extent.max_y),
        spec.resolution(),
        spec.epsg,
        geographic,
    );
    geo.add_to_ifd(&mut ifd, endian);

    let blocks = grid
        .cells()
        .chunks(rows_per_strip * spec.cols)
        .map(|strip| compression.encode(strip))
        .collect::<Result<Vec<_>, _>>()?;

    Tiff::write_single(
        writer,
        endian,
        ifd,
        &blocks,
        TagId::StripOffsets,
        TagId::StripByteCounts,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geotags::{GeoKeyId, GeoKeyValue};
    use std::io::Cursor;

    fn sample_grid() -> CategoricalGrid {
        let spec =
            GridSpec::from_resolution(Extent::new(654000.0, 1289982.0, 654018.0, 1290000.0), 6.0, 32643)
                .unwrap();
        CategoricalGrid::from_cells(spec, vec![1, 1, 2, 0, 3, 7, 7, 0, 5]).unwrap()
    }

    #[test]
    fn written_grid_reads_back_identically() {
        let grid = sample_grid();
        let mut bytes = vec![];
        encode_geotiff(&grid, &mut bytes).unwrap();

        let read = decode_geotiff(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(read.spec(), grid.spec());
        assert_eq!(read.cells(), grid.cells());
    }

    /// Hand-built 3x2 tiled, LZW-free, PixelIsPoint GeoTIFF with nodata 255.
    #[test]
    fn tiles_and_nodata_values_are_honoured() {
        let endian = Endian::Big;
        let mut ifd = Ifd::default();
        ifd.set_tag(TagId::ImageWidth, TagData::from_long(3), endian);
        ifd.set_tag(TagId::ImageHeight, TagData::from_long(2), endian);
        ifd.set_tag(TagId::BitsPerSample, TagData::from_short(8), endian);
        ifd.set_tag(TagId::Compression, TagData::from_short(1), endian);
        ifd.set_tag(TagId::SamplesPerPixel, TagData::from_short(1), endian);
        ifd.set_tag(TagId::TileWidth, TagData::from_long(2), endian);
        ifd.set_tag(TagId::TileLength, TagData::from_long(2), endian);
        ifd.set_tag(TagId::GdalNoData, TagData::from_ascii("255"), endian);
        let mut geo = GeoTags::north_up((10.0, 20.0), (10.0, 10.0), 32643, false);
        geo.directory.set(
            GeoKeyId::GTRasterTypeGeoKey,
            GeoKeyValue::Short(vec![crate::geotags::RASTER_PIXEL_IS_POINT]),
        );
        geo.add_to_ifd(&mut ifd, endian);

        // Right tile is padded to two columns
        let blocks = vec![vec![1, 2, 4, 5], vec![3, 0, 255, 0]];
        let mut bytes = vec![];
        Tiff::write_single(&mut bytes, endian, ifd, &blocks, TagId::TileOffsets, TagId::TileByteCounts)
            .unwrap();

        let grid = decode_geotiff(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(grid.cells(), &[1, 2, 3, 4, 5, NODATA]);
        assert_eq!(grid.spec().extent, Extent::new(5.0, 5.0, 35.0, 25.0));
    }

    #[test]
    fn wide_class_codes_are_rejected() {
        assert!(matches!(class_code(300, None), Err(RasterError::CodeOutOfRange(300))));
        assert_eq!(class_code(300, Some(300.0)).unwrap(), NODATA);
        assert_eq!(class_code(7, Some(255.0)).unwrap(), 7);
    }
}
