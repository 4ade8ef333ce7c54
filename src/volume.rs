use crate::codec::VoxelCodec;
use crate::enums::{ElementEncoding, Orientation};
use crate::normalizer::IntensityNormalizer;
use crate::volume_loader::VolumeLoaderError;

use image::{ImageBuffer, Rgba};
use ndarray::Array2;
use rayon::prelude::*;
use std::fmt;
use thiserror::Error;

pub type SliceImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VolumeError {
    #[error("Slice index {index} out of range for {orientation} axis of length {len}")]
    IndexOutOfRange {
        index: usize,
        len: usize,
        orientation: Orientation,
    },
}

/// Immutable metadata parsed from the file header.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeHeader {
    /// `[ndim, x, y, z]`. The leading slot is carried from the file and not
    /// used for addressing.
    pub dims: [usize; 4],
    pub encoding: ElementEncoding,
    pub bitpix: i16,
    pub pixdim: [f32; 8],
    pub vox_offset: usize,
    pub scl_slope: f32,
    pub scl_inter: f32,
    pub qform_code: i16,
    pub sform_code: i16,
}

impl VolumeHeader {
    /// Header for an in-memory 3D volume with unit spacing and no scaling.
    pub fn new(dim: (usize, usize, usize), encoding: ElementEncoding) -> Self {
        let bitpix = encoding.bytes_per_element().map_or(0, |size| (size * 8) as i16);
        Self {
            dims: [3, dim.0, dim.1, dim.2],
            encoding,
            bitpix,
            pixdim: [1.0; 8],
            vox_offset: 352,
            scl_slope: 1.0,
            scl_inter: 0.0,
            qform_code: 0,
            sform_code: 0,
        }
    }

    /// Get the dimensions of the volume (x, y, z)
    pub fn dim(&self) -> (usize, usize, usize) {
        (self.dims[1], self.dims[2], self.dims[3])
    }

    pub fn voxel_count(&self) -> usize {
        self.dims[1] * self.dims[2] * self.dims[3]
    }

    /// Element size used for layout. Unsupported encodings fall back to the
    /// header's `bitpix`.
    pub fn bytes_per_voxel(&self) -> usize {
        self.encoding
            .bytes_per_element()
            .unwrap_or_else(|| (self.bitpix.max(8) as usize) / 8)
    }

    pub fn expected_data_len(&self) -> usize {
        self.voxel_count() * self.bytes_per_voxel()
    }

    /// Voxel spacing in mm along (x, y, z)
    pub fn spacing(&self) -> (f32, f32, f32) {
        (self.pixdim[1], self.pixdim[2], self.pixdim[3])
    }
}

/// A decoded volume: header plus the raw little-endian voxel bytes, x
/// varying fastest.
#[derive(Clone, PartialEq)]
pub struct Volume {
    header: VolumeHeader,
    voxels: Vec<u8>,
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("header", &self.header)
            .field("voxels", &format!("{} bytes", self.voxels.len()))
            .finish()
    }
}

impl Volume {
    /// # Errors
    ///
    /// Returns [`VolumeLoaderError::VoxelDataSizeMismatch`] if `voxels` is not
    /// exactly `x * y * z * bytes_per_voxel` long.
    pub fn new(header: VolumeHeader, voxels: Vec<u8>) -> Result<Self, VolumeLoaderError> {
        let expected = header.expected_data_len();
        if voxels.len() != expected {
            return Err(VolumeLoaderError::VoxelDataSizeMismatch {
                expected,
                actual: voxels.len(),
            });
        }
        Ok(Self { header, voxels })
    }

    pub fn header(&self) -> &VolumeHeader {
        &self.header
    }

    /// Get a reference to the raw voxel bytes
    pub fn voxels(&self) -> &[u8] {
        &self.voxels
    }

    /// Get the dimensions of the volume (x, y, z)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.header.dim()
    }

    pub fn voxel_count(&self) -> usize {
        self.header.voxel_count()
    }

    #[inline]
    pub fn linear_index(&self, x: usize, y: usize, z: usize) -> usize {
        let (dim_x, dim_y, _) = self.dim();
        z * dim_y * dim_x + y * dim_x + x
    }

    /// Raw decoded scalar at a linear index. Unsupported encodings read as 0.
    #[inline]
    pub fn value_at_index(&self, index: usize) -> f32 {
        VoxelCodec::decode_or_zero(self.header.encoding, &self.voxels, index)
    }

    #[inline]
    pub fn value(&self, x: usize, y: usize, z: usize) -> f32 {
        self.value_at_index(self.linear_index(x, y, z))
    }

    pub fn axis_len(&self, orientation: Orientation) -> usize {
        let (dim_x, dim_y, dim_z) = self.dim();
        match orientation {
            Orientation::Axial => dim_z,
            Orientation::Coronal => dim_y,
            Orientation::Sagittal => dim_x,
        }
    }

    pub fn get_output_dimensions(&self, orientation: Orientation) -> (usize, usize) {
        // Always return (width, height) - standard image convention
        let (dim_x, dim_y, dim_z) = self.dim();
        match orientation {
            // Looking down Z-axis: X is width, Y is height
            Orientation::Axial => (dim_x, dim_y),
            // Looking down Y-axis: X is width, Z is height
            Orientation::Coronal => (dim_x, dim_z),
            // Looking down X-axis: Y is width, Z is height
            Orientation::Sagittal => (dim_y, dim_z),
        }
    }

    /// Voxel coordinates feeding raster pixel `(col, row)`.
    ///
    /// Coronal and sagittal rasters put the highest z on the top row so they
    /// display head-up next to the axial view.
    #[inline]
    fn source_voxel(
        &self,
        index: usize,
        orientation: Orientation,
        col: usize,
        row: usize,
    ) -> (usize, usize, usize) {
        let dim_z = self.dim().2;
        match orientation {
            Orientation::Axial => (col, row, index),
            Orientation::Coronal => (col, index, dim_z - 1 - row),
            Orientation::Sagittal => (index, col, dim_z - 1 - row),
        }
    }

    fn check_index(&self, index: usize, orientation: Orientation) -> Result<(), VolumeError> {
        let len = self.axis_len(orientation);
        if index >= len {
            return Err(VolumeError::IndexOutOfRange {
                index,
                len,
                orientation,
            });
        }
        Ok(())
    }

    /// Normalized intensities of one plane, indexed `[row, col]`.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::IndexOutOfRange`] if `index` is not within the
    /// axis selected by `orientation`.
    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
        normalizer: &IntensityNormalizer,
    ) -> Result<Array2<f32>, VolumeError> {
        self.check_index(index, orientation)?;
        VoxelCodec::warn_if_unsupported(self.header.encoding, "slice projection");

        let (width, height) = self.get_output_dimensions(orientation);
        let pixels: Vec<f32> = (0..height)
            .into_par_iter()
            .flat_map_iter(|row| {
                (0..width).map(move |col| {
                    let (x, y, z) = self.source_voxel(index, orientation, col, row);
                    normalizer.normalize(self.value(x, y, z))
                })
            })
            .collect();

        Ok(Array2::from_shape_vec((height, width), pixels)
            .expect("pixel count matches the output dimensions"))
    }

    // Grayscale replicated into RGB with full opacity
    fn slice_to_image(slice: &Array2<f32>) -> SliceImage {
        let (height, width) = slice.dim();
        let pixel_data: Vec<u8> = slice
            .as_slice()
            .expect("slices are built in standard layout")
            .par_iter()
            .flat_map_iter(|&v| {
                let gray = v.round().clamp(0.0, 255.0) as u8;
                [gray, gray, gray, u8::MAX]
            })
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
            .expect("buffer holds width * height RGBA pixels")
    }

    /// Render one plane as an RGBA raster, rows top to bottom.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::IndexOutOfRange`] if `index` is not within the
    /// axis selected by `orientation`.
    pub fn get_image_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
        normalizer: &IntensityNormalizer,
    ) -> Result<SliceImage, VolumeError> {
        let slice = self.get_slice_from_axis(index, orientation, normalizer)?;
        Ok(Self::slice_to_image(&slice))
    }
}
