use crate::format::{Nifti1Format, VolumeFormat};
use crate::volume::Volume;

use std::{fs, path::Path};
use thiserror::Error;
use web_time::Instant;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("Decompression failed: {0}")]
    DecompressionFailed(#[source] std::io::Error),

    #[error("Not a valid NIfTI file")]
    InvalidFormat,

    #[error("Header could not be parsed")]
    HeaderParseFailed,

    #[error("Voxel data size mismatch: expected {expected} bytes, found {actual}")]
    VoxelDataSizeMismatch { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Decode a volume from the bytes of a `.nii` or `.nii.gz` file
    ///
    /// # Errors
    ///
    /// Each stage fails with its own variant: decompression, format check,
    /// header parsing and voxel extraction.
    pub fn load_from_bytes(bytes: &[u8]) -> Result<Volume, VolumeLoaderError> {
        Self::load_with_format(&Nifti1Format, bytes)
    }

    /// Decode a volume using a custom format backend
    pub fn load_with_format(
        format: &dyn VolumeFormat,
        bytes: &[u8],
    ) -> Result<Volume, VolumeLoaderError> {
        let start = Instant::now();

        let decompressed;
        let bytes = if format.is_compressed(bytes) {
            decompressed = format
                .decompress(bytes)
                .map_err(VolumeLoaderError::DecompressionFailed)?;
            log::debug!(
                "Decompressed {} bytes into {}",
                bytes.len(),
                decompressed.len()
            );
            decompressed.as_slice()
        } else {
            bytes
        };

        if !format.is_valid_format(bytes) {
            return Err(VolumeLoaderError::InvalidFormat);
        }

        let header = format
            .parse_header(bytes)
            .ok_or(VolumeLoaderError::HeaderParseFailed)?;
        log::debug!(
            "Header: dim {:?}, encoding {:?}, spacing {:?}",
            header.dim(),
            header.encoding,
            header.spacing()
        );
        if !header.encoding.is_supported() {
            log::warn!(
                "NIfTI datatype {} is not supported, voxels will read as 0",
                header.encoding.datatype()
            );
        }

        let voxels = format.extract_voxel_bytes(&header, bytes).to_vec();
        let volume = Volume::new(header, voxels)?;

        log::debug!("Decoded volume in {:?}", start.elapsed());
        Ok(volume)
    }

    /// Load a volume from a file path
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
        let bytes = fs::read(path.as_ref())?;
        Self::load_from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::ElementEncoding;
    use crate::test_utils::{gzip, nifti_bytes};

    #[test]
    fn loads_plain_and_compressed() {
        let values: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let raw = nifti_bytes((2, 3, 4), ElementEncoding::U16, &values);

        let plain = VolumeLoader::load_from_bytes(&raw).unwrap();
        let compressed = VolumeLoader::load_from_bytes(&gzip(&raw)).unwrap();
        assert_eq!(plain, compressed);
        assert_eq!(plain.dim(), (2, 3, 4));
        assert_eq!(plain.value(1, 2, 3), 23.0);
    }

    #[test]
    fn loads_float_volume() {
        let values = [0.0, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0];
        let raw = nifti_bytes((2, 2, 2), ElementEncoding::F32, &values);
        let volume = VolumeLoader::load_from_bytes(&raw).unwrap();
        assert_eq!(volume.header().encoding, ElementEncoding::F32);
        assert_eq!(volume.value(1, 0, 0), 0.25);
        assert_eq!(volume.value(1, 1, 1), 16.0);
    }

    #[test]
    fn broken_gzip_fails_decompression() {
        let mut bytes = gzip(&nifti_bytes((2, 2, 2), ElementEncoding::U8, &[0.0; 8]));
        bytes.truncate(12);
        assert!(matches!(
            VolumeLoader::load_from_bytes(&bytes),
            Err(VolumeLoaderError::DecompressionFailed(_))
        ));
    }

    #[test]
    fn garbage_is_invalid_format() {
        assert!(matches!(
            VolumeLoader::load_from_bytes(&[7u8; 512]),
            Err(VolumeLoaderError::InvalidFormat)
        ));
    }

    #[test]
    fn bad_dimensions_fail_header_parse() {
        let mut raw = nifti_bytes((2, 2, 2), ElementEncoding::U8, &[0.0; 8]);
        raw[42..44].copy_from_slice(&0i16.to_le_bytes());
        assert!(matches!(
            VolumeLoader::load_from_bytes(&raw),
            Err(VolumeLoaderError::HeaderParseFailed)
        ));
    }

    #[test]
    fn truncated_data_is_a_size_mismatch() {
        let raw = nifti_bytes((2, 2, 2), ElementEncoding::U16, &[0.0; 8]);
        let truncated = &raw[..raw.len() - 1];
        assert!(matches!(
            VolumeLoader::load_from_bytes(truncated),
            Err(VolumeLoaderError::VoxelDataSizeMismatch {
                expected: 16,
                actual: 15
            })
        ));
    }

    #[test]
    fn unsupported_datatype_still_loads() {
        let mut raw = nifti_bytes((2, 2, 1), ElementEncoding::U8, &[9.0; 4]);
        // DT_INT8 with bitpix 8
        raw[70..72].copy_from_slice(&256i16.to_le_bytes());
        let volume = VolumeLoader::load_from_bytes(&raw).unwrap();
        assert_eq!(volume.header().encoding, ElementEncoding::Unsupported(256));
        assert_eq!(volume.value(1, 1, 0), 0.0);
    }
}
