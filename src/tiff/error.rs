use super::TagId;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TiffError {
    #[error("not a TIFF stream (bad magic bytes)")]
    BadMagicBytes,
    #[error("TIFF has no image file directory")]
    NoIfd,
    #[error("TIFF directory at offset {offset} is malformed: {reason}")]
    BadIfd { offset: u64, reason: String },
    #[error("TIFF directory chain loops back to offset {0}")]
    IfdCycle(u64),
    #[error("missing TIFF tag {0:?}")]
    MissingTag(TagId),
    #[error("malformed TIFF tag {0:?}")]
    BadTag(TagId),
    #[error("TIFF stream is too large for a classic TIFF ({0} bytes)")]
    TooLarge(u64),
    #[error(transparent)]
    ReadError(#[from] io::Error),
}
