// https://en.wikipedia.org/wiki/TIFF#TIFF_Compression_Tag
// https://github.com/image-rs/image-tiff/blob/master/src/decoder/mod.rs

use crate::tiff::Endian;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use num_enum::{FromPrimitive, IntoPrimitive};
use salzweg::decoder::TiffStyleDecoder;
use std::io::{self, Read, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecompressError {
    #[error("LZW stream is corrupt: {0}")]
    Lzw(String),
    #[error("PackBits stream is truncated")]
    PackBits,
    #[error("compression {0:?} is not supported")]
    CompressionNotSupported(Compression),
    #[error("predictor {0:?} is not supported for {1}-bit samples")]
    PredictorNotSupported(Predictor, usize),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, PartialEq, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum Compression {
    Uncompressed = 1,
    Lzw = 5,
    DeflateAdobe = 8,
    PackBits = 32773,
    Deflate = 32946,

    #[num_enum(default)]
    Unknown = 0x0000,
}

impl Compression {
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, DecompressError> {
        match self {
            Self::Uncompressed => Ok(bytes.to_vec()),
            Self::Lzw => TiffStyleDecoder::decode_to_vec(bytes)
                .map_err(|e| DecompressError::Lzw(format!("{e:?}"))),
            Self::DeflateAdobe | Self::Deflate => {
                let mut buf = vec![];
                ZlibDecoder::new(bytes).read_to_end(&mut buf)?;
                Ok(buf)
            }
            Self::PackBits => unpack_bits(bytes),
            other => Err(DecompressError::CompressionNotSupported(*other)),
        }
    }

    pub fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>, DecompressError> {
        match self {
            Self::Uncompressed => Ok(bytes.to_vec()),
            Self::DeflateAdobe | Self::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(bytes)?;
                Ok(encoder.finish()?)
            }
            other => Err(DecompressError::CompressionNotSupported(*other)),
        }
    }
}

fn unpack_bits(bytes: &[u8]) -> Result<Vec<u8>, DecompressError> {
    let mut out = Vec::with_capacity(bytes.len() * 2);
    let mut i = 0;
    while i < bytes.len() {
        let n = bytes[i] as i8;
        i += 1;
        match n {
            0..=127 => {
                let len = n as usize + 1;
                let literal = bytes.get(i..i + len).ok_or(DecompressError::PackBits)?;
                out.extend_from_slice(literal);
                i += len;
            }
            -127..=-1 => {
                let value = *bytes.get(i).ok_or(DecompressError::PackBits)?;
                out.extend(std::iter::repeat(value).take(1 + (-n) as usize));
                i += 1;
            }
            // -128 is a no-op
            _ => {}
        }
    }
    Ok(out)
}

#[derive(Debug, PartialEq, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum Predictor {
    No = 1,
    Horizontal = 2,
    FloatingPoint = 3,

    #[num_enum(default)]
    Unknown = 0x0000,
}

impl Predictor {
    /// Reverses the predictor in place for a block `width` samples wide.
    pub fn undo(
        &self,
        buffer: &mut [u8],
        width: usize,
        bits_per_sample: usize,
        endian: Endian,
    ) -> Result<(), DecompressError> {
        match (self, bits_per_sample) {
            (Self::No, _) => {}
            (Self::Horizontal, 8) => {
                for row in buffer.chunks_mut(width) {
                    for i in 1..row.len() {
                        row[i] = row[i].wrapping_add(row[i - 1]);
                    }
                }
            }
            (Self::Horizontal, 16) => {
                for row in buffer.chunks_mut(width * 2) {
                    let mut previous = 0_u16;
                    for pair in row.chunks_exact_mut(2) {
                        let delta: u16 = endian.decode([pair[0], pair[1]])?;
                        previous = previous.wrapping_add(delta);
                        pair.copy_from_slice(&endian.encode(previous));
                    }
                }
            }
            (other, bits) => return Err(DecompressError::PredictorNotSupported(*other, bits)),
        }
        Ok(())
    }
}
