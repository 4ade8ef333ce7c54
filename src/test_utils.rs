//! Fixtures shared by the unit tests.

use crate::enums::ElementEncoding;
use crate::format::Nifti1Format;
use crate::volume::{Volume, VolumeHeader};

use flate2::{Compression, write::GzEncoder};
use std::io::Write;

pub(crate) fn encode_values(encoding: ElementEncoding, values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for &value in values {
        match encoding {
            ElementEncoding::U8 => bytes.push(value as u8),
            ElementEncoding::U16 => bytes.extend_from_slice(&(value as u16).to_le_bytes()),
            ElementEncoding::F32 => bytes.extend_from_slice(&value.to_le_bytes()),
            ElementEncoding::Unsupported(_) => panic!("no fixture encoder for {encoding:?}"),
        }
    }
    bytes
}

/// A minimal single-file NIfTI-1 image with `values` in x-fastest order.
pub(crate) fn nifti_bytes(
    dim: (usize, usize, usize),
    encoding: ElementEncoding,
    values: &[f32],
) -> Vec<u8> {
    assert_eq!(values.len(), dim.0 * dim.1 * dim.2);
    let mut bytes = vec![0u8; Nifti1Format::MIN_VOX_OFFSET];
    bytes[0..4].copy_from_slice(&348i32.to_le_bytes());

    let dims = [3i16, dim.0 as i16, dim.1 as i16, dim.2 as i16, 1, 1, 1, 1];
    for (i, d) in dims.iter().enumerate() {
        bytes[40 + i * 2..42 + i * 2].copy_from_slice(&d.to_le_bytes());
    }
    let bitpix = encoding.bytes_per_element().unwrap_or(1) as i16 * 8;
    bytes[70..72].copy_from_slice(&encoding.datatype().to_le_bytes());
    bytes[72..74].copy_from_slice(&bitpix.to_le_bytes());
    for i in 0..8 {
        bytes[76 + i * 4..80 + i * 4].copy_from_slice(&1.0f32.to_le_bytes());
    }
    bytes[108..112].copy_from_slice(&352.0f32.to_le_bytes());
    bytes[112..116].copy_from_slice(&1.0f32.to_le_bytes());
    bytes[344..348].copy_from_slice(b"n+1\0");

    bytes.extend(encode_values(encoding, values));
    bytes
}

pub(crate) fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Build a volume whose voxel `(x, y, z)` holds `f(x, y, z)`.
pub(crate) fn volume_from_fn(
    dim: (usize, usize, usize),
    encoding: ElementEncoding,
    f: impl Fn(usize, usize, usize) -> f32,
) -> Volume {
    let mut values = Vec::with_capacity(dim.0 * dim.1 * dim.2);
    for z in 0..dim.2 {
        for y in 0..dim.1 {
            for x in 0..dim.0 {
                values.push(f(x, y, z));
            }
        }
    }
    Volume::new(
        VolumeHeader::new(dim, encoding),
        encode_values(encoding, &values),
    )
    .unwrap()
}
