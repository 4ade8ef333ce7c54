//! # NIfTI-volume library
//!
//! This crate decodes single-file NIfTI-1 volumes (`.nii` and `.nii.gz`)
//! and derives everything a viewer needs from them
//!
//! A volume is kept as its header plus the raw little-endian voxel bytes,
//! x varying fastest. From it the library produces:
//!  - 2D rasters of the three medical axes (Axial, Coronal, Sagittal)
//!  - a sparse point cloud of visible voxels for 3D rendering
//!  - similarity metrics between a reference and a produced volume
//!    (MSE, PSNR, SSIM) and the Dice overlap of two label volumes
//!
//!  Supported element types are `uint8`, `uint16` and `float32`. Voxels of
//!  any other type read as 0 so the rest of the file can still be shown.
//!  Display intensities map `[0, 1]` inputs linearly and clamp everything
//!  else against a configurable modality range (400 by default).
//!
//!  The core is synchronous. Hosts that must stay responsive can use the
//!  [`jobs`] module, which runs each operation on tokio's blocking pool with
//!  cooperative cancellation.
//!
//! # Examples
//!
//! ## Rendering the central sagittal slice
//!
//! ```no_run
//! # use nifti_volume::{VolumeLoader, IntensityNormalizer, Orientation};
//! let volume = VolumeLoader::load_from_file("brain.nii.gz")
//!     .expect("should have decoded the volume");
//! let image = volume
//!     .get_image_from_axis(
//!         volume.dim().0 / 2,
//!         Orientation::Sagittal,
//!         &IntensityNormalizer::default(),
//!     )
//!     .expect("index lies inside the volume");
//! image.save("result.png").expect("should have written the png");
//! ```
//!
//! ## Comparing a model output against its reference
//!
//! ```no_run
//! # use nifti_volume::{VolumeLoader, MetricsEngine};
//! let reference = VolumeLoader::load_from_file("reference.nii").unwrap();
//! let output = VolumeLoader::load_from_file("output.nii").unwrap();
//! let metrics = MetricsEngine::compute_comparison(&reference, &output).unwrap();
//! println!("psnr {:.2} dB, ssim {:.4}", metrics.psnr, metrics.ssim);
//! ```

pub mod cancel;
pub mod codec;
pub mod enums;
pub mod format;
pub mod jobs;
pub mod metrics;
pub mod normalizer;
pub mod point_cloud;
pub mod volume;
pub mod volume_loader;

#[cfg(test)]
pub(crate) mod test_utils;

pub use cancel::{CancelToken, Cancelled};
pub use codec::{CodecError, VoxelCodec};
pub use enums::{ElementEncoding, Orientation};
pub use format::{Nifti1Format, VolumeFormat};
pub use metrics::{ComparisonMetrics, Foreground, MetricsEngine, MetricsError};
pub use normalizer::IntensityNormalizer;
pub use point_cloud::{PointCloud, PointCloudBuilder, PointCloudOptions, PointSample};
pub use volume::{SliceImage, Volume, VolumeError, VolumeHeader};
pub use volume_loader::{VolumeLoader, VolumeLoaderError};
