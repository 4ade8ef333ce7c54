use crate::enums::ElementEncoding;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("Unsupported element encoding (datatype {0})")]
    UnsupportedEncoding(i16),

    #[error("Voxel {index} lies outside the {len} byte buffer")]
    OutOfBounds { index: usize, len: usize },
}

pub struct VoxelCodec;

impl VoxelCodec {
    /// Decode the scalar at `linear_index` from a little-endian voxel buffer.
    ///
    /// The byte offset is `linear_index * bytes_per_element(encoding)`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnsupportedEncoding`] for encodings without a
    /// decoder and [`CodecError::OutOfBounds`] if the element does not fit in
    /// `buffer`.
    pub fn decode(
        encoding: ElementEncoding,
        buffer: &[u8],
        linear_index: usize,
    ) -> Result<f32, CodecError> {
        let size = encoding
            .bytes_per_element()
            .ok_or(CodecError::UnsupportedEncoding(encoding.datatype()))?;
        let offset = linear_index * size;
        let bytes = buffer
            .get(offset..offset + size)
            .ok_or(CodecError::OutOfBounds {
                index: linear_index,
                len: buffer.len(),
            })?;

        let value = match encoding {
            ElementEncoding::U8 => bytes[0] as f32,
            ElementEncoding::U16 => LittleEndian::read_u16(bytes) as f32,
            ElementEncoding::F32 => LittleEndian::read_f32(bytes),
            ElementEncoding::Unsupported(code) => {
                return Err(CodecError::UnsupportedEncoding(code));
            }
        };
        Ok(value)
    }

    /// Tolerant variant used by the scans: any failure yields 0.
    ///
    /// Callers are expected to warn once per scan for unsupported encodings
    /// rather than once per voxel.
    #[inline]
    pub fn decode_or_zero(encoding: ElementEncoding, buffer: &[u8], linear_index: usize) -> f32 {
        Self::decode(encoding, buffer, linear_index).unwrap_or(0.0)
    }

    /// Emit the per-scan warning for an unsupported encoding.
    pub(crate) fn warn_if_unsupported(encoding: ElementEncoding, context: &str) {
        if let ElementEncoding::Unsupported(code) = encoding {
            log::warn!("Unsupported NIfTI datatype {code} during {context}, voxels read as 0");
        }
    }
}
