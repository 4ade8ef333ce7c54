use crate::{enums::ElementEncoding, volume::VolumeHeader};

use byteorder::{ByteOrder, LittleEndian};
use flate2::read::GzDecoder;
use std::io::{self, Read};

/// The byte-level grammar of a volumetric file format.
///
/// The loader only sequences these primitives and checks their results; the
/// magic numbers and header layout live behind this trait so another format
/// library can be plugged in.
pub trait VolumeFormat: Send + Sync {
    fn is_compressed(&self, bytes: &[u8]) -> bool;

    fn decompress(&self, bytes: &[u8]) -> io::Result<Vec<u8>>;

    fn is_valid_format(&self, bytes: &[u8]) -> bool;

    fn parse_header(&self, bytes: &[u8]) -> Option<VolumeHeader>;

    /// The voxel region described by `header`. May be shorter than the
    /// header promises if the file is truncated.
    fn extract_voxel_bytes<'a>(&self, header: &VolumeHeader, bytes: &'a [u8]) -> &'a [u8];
}

/// Single-file NIfTI-1 (`.nii` / `.nii.gz`), little-endian only.
#[derive(Clone, Copy, Debug, Default)]
pub struct Nifti1Format;

impl Nifti1Format {
    pub const HEADER_SIZE: usize = 348;
    /// Smallest data offset of a single-file NIfTI-1 (header + extension flag).
    pub const MIN_VOX_OFFSET: usize = 352;

    const DIM_OFFSET: usize = 40;
    const DATATYPE_OFFSET: usize = 70;
    const BITPIX_OFFSET: usize = 72;
    const PIXDIM_OFFSET: usize = 76;
    const VOX_OFFSET_OFFSET: usize = 108;
    const SCL_SLOPE_OFFSET: usize = 112;
    const SCL_INTER_OFFSET: usize = 116;
    const QFORM_CODE_OFFSET: usize = 252;
    const SFORM_CODE_OFFSET: usize = 254;
    const MAGIC_OFFSET: usize = 344;

    const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
}

impl VolumeFormat for Nifti1Format {
    fn is_compressed(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(&Self::GZIP_MAGIC)
    }

    fn decompress(&self, bytes: &[u8]) -> io::Result<Vec<u8>> {
        let mut decompressed = Vec::new();
        GzDecoder::new(bytes).read_to_end(&mut decompressed)?;
        Ok(decompressed)
    }

    fn is_valid_format(&self, bytes: &[u8]) -> bool {
        if bytes.len() < Self::HEADER_SIZE {
            return false;
        }
        let sizeof_hdr = LittleEndian::read_i32(&bytes[0..4]);
        let magic = &bytes[Self::MAGIC_OFFSET..Self::MAGIC_OFFSET + 4];
        sizeof_hdr == Self::HEADER_SIZE as i32 && (magic == b"n+1\0" || magic == b"ni1\0")
    }

    fn parse_header(&self, bytes: &[u8]) -> Option<VolumeHeader> {
        let header = bytes.get(..Self::HEADER_SIZE)?;
        let read_i16 = |offset: usize| LittleEndian::read_i16(&header[offset..offset + 2]);
        let read_f32 = |offset: usize| LittleEndian::read_f32(&header[offset..offset + 4]);

        let mut raw_dim = [0i16; 8];
        LittleEndian::read_i16_into(&header[Self::DIM_OFFSET..Self::DIM_OFFSET + 16], &mut raw_dim);
        if raw_dim[0] < 3 || raw_dim[1..=3].iter().any(|&d| d <= 0) {
            return None;
        }

        let mut pixdim = [0f32; 8];
        LittleEndian::read_f32_into(
            &header[Self::PIXDIM_OFFSET..Self::PIXDIM_OFFSET + 32],
            &mut pixdim,
        );

        let vox_offset = read_f32(Self::VOX_OFFSET_OFFSET);
        let vox_offset = if vox_offset.is_finite() && vox_offset as usize >= Self::MIN_VOX_OFFSET {
            vox_offset as usize
        } else {
            Self::MIN_VOX_OFFSET
        };

        Some(VolumeHeader {
            dims: [
                raw_dim[0] as usize,
                raw_dim[1] as usize,
                raw_dim[2] as usize,
                raw_dim[3] as usize,
            ],
            encoding: ElementEncoding::from_datatype(read_i16(Self::DATATYPE_OFFSET)),
            bitpix: read_i16(Self::BITPIX_OFFSET),
            pixdim,
            vox_offset,
            scl_slope: read_f32(Self::SCL_SLOPE_OFFSET),
            scl_inter: read_f32(Self::SCL_INTER_OFFSET),
            qform_code: read_i16(Self::QFORM_CODE_OFFSET),
            sform_code: read_i16(Self::SFORM_CODE_OFFSET),
        })
    }

    fn extract_voxel_bytes<'a>(&self, header: &VolumeHeader, bytes: &'a [u8]) -> &'a [u8] {
        // Only the first 3D volume of a 4D series is kept.
        let start = header.vox_offset.min(bytes.len());
        let end = start
            .saturating_add(header.expected_data_len())
            .min(bytes.len());
        &bytes[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{gzip, nifti_bytes};

    #[test]
    fn detects_gzip() {
        let raw = nifti_bytes((2, 2, 2), ElementEncoding::U8, &[0.0; 8]);
        assert!(!Nifti1Format.is_compressed(&raw));
        assert!(Nifti1Format.is_compressed(&gzip(&raw)));
    }

    #[test]
    fn decompress_restores_bytes() {
        let raw = nifti_bytes((2, 2, 2), ElementEncoding::U8, &[1.0; 8]);
        let restored = Nifti1Format.decompress(&gzip(&raw)).unwrap();
        assert_eq!(restored, raw);
    }

    #[test]
    fn rejects_non_nifti() {
        assert!(!Nifti1Format.is_valid_format(b"not a volume"));
        assert!(!Nifti1Format.is_valid_format(&[0u8; 400]));
    }

    #[test]
    fn parses_header_fields() {
        let raw = nifti_bytes((3, 4, 5), ElementEncoding::U16, &[0.0; 60]);
        assert!(Nifti1Format.is_valid_format(&raw));
        let header = Nifti1Format.parse_header(&raw).unwrap();
        assert_eq!(header.dims, [3, 3, 4, 5]);
        assert_eq!(header.encoding, ElementEncoding::U16);
        assert_eq!(header.bitpix, 16);
        assert_eq!(header.vox_offset, 352);
        assert_eq!(header.scl_slope, 1.0);
    }

    #[test]
    fn header_without_three_dimensions_is_rejected() {
        let mut raw = nifti_bytes((3, 4, 5), ElementEncoding::U8, &[0.0; 60]);
        raw[40..42].copy_from_slice(&2i16.to_le_bytes());
        assert!(Nifti1Format.parse_header(&raw).is_none());
    }

    #[test]
    fn extraction_is_clipped_to_the_buffer() {
        let raw = nifti_bytes((2, 2, 2), ElementEncoding::U16, &[0.0; 8]);
        let header = Nifti1Format.parse_header(&raw).unwrap();
        assert_eq!(Nifti1Format.extract_voxel_bytes(&header, &raw).len(), 16);
        let truncated = &raw[..raw.len() - 3];
        assert_eq!(Nifti1Format.extract_voxel_bytes(&header, truncated).len(), 13);
    }
}
