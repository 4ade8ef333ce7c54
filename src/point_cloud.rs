use crate::cancel::{CancelToken, Cancelled, SCAN_CHUNK};
use crate::codec::VoxelCodec;
use crate::normalizer::IntensityNormalizer;
use crate::volume::Volume;

use rayon::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointSample {
    pub x: usize,
    pub y: usize,
    pub z: usize,
    /// Normalized intensity in `[0, 255]`
    pub intensity: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointCloudOptions {
    /// Keep voxels whose normalized intensity is strictly above this value.
    pub threshold: f32,
    /// Sample every `stride`-th voxel along each axis. 0 behaves like 1.
    pub stride: usize,
    pub normalizer: IntensityNormalizer,
}

impl Default for PointCloudOptions {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            stride: 1,
            normalizer: IntensityNormalizer::default(),
        }
    }
}

/// Visible voxels in scan order (z outer, y middle, x inner). The order
/// carries no spatial meaning.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<PointSample>,
}

impl PointCloud {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PointSample> {
        self.points.iter()
    }

    /// Largest coordinate seen on each axis
    pub fn bounds(&self) -> Option<(usize, usize, usize)> {
        self.points.iter().fold(None, |acc, p| {
            let (x, y, z) = acc.unwrap_or((0, 0, 0));
            Some((x.max(p.x), y.max(p.y), z.max(p.z)))
        })
    }

    /// Flat `xyz` positions centered on `center` and matching gray `rgb`
    /// colors in `[0, 1]`, ready for a vertex buffer.
    pub fn to_render_buffers(&self, center: (f32, f32, f32)) -> (Vec<f32>, Vec<f32>) {
        let mut positions = Vec::with_capacity(self.points.len() * 3);
        let mut colors = Vec::with_capacity(self.points.len() * 3);
        for p in &self.points {
            positions.extend([
                p.x as f32 - center.0,
                p.y as f32 - center.1,
                p.z as f32 - center.2,
            ]);
            let gray = p.intensity / 255.0;
            colors.extend([gray, gray, gray]);
        }
        (positions, colors)
    }
}

pub struct PointCloudBuilder;

impl PointCloudBuilder {
    pub fn build(volume: &Volume, options: &PointCloudOptions) -> PointCloud {
        Self::scan(volume, options, || false).unwrap_or_default()
    }

    /// Like [`build`](Self::build) but gives up when `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the token fired before the scan finished. No
    /// partial cloud is returned.
    pub fn build_cancellable(
        volume: &Volume,
        options: &PointCloudOptions,
        token: &CancelToken,
    ) -> Result<PointCloud, Cancelled> {
        Self::scan(volume, options, || token.is_cancelled()).ok_or(Cancelled)
    }

    fn scan(
        volume: &Volume,
        options: &PointCloudOptions,
        should_stop: impl Fn() -> bool + Sync,
    ) -> Option<PointCloud> {
        VoxelCodec::warn_if_unsupported(volume.header().encoding, "point cloud extraction");

        let (dim_x, dim_y, dim_z) = volume.dim();
        let stride = options.stride.max(1);

        let planes: Vec<Vec<PointSample>> = (0..dim_z)
            .into_par_iter()
            .step_by(stride)
            .map(|z| {
                let mut samples = Vec::new();
                let mut visited = 0usize;
                for y in (0..dim_y).step_by(stride) {
                    for x in (0..dim_x).step_by(stride) {
                        if visited % SCAN_CHUNK == 0 && should_stop() {
                            return None;
                        }
                        visited += 1;

                        let intensity = options.normalizer.normalize(volume.value(x, y, z));
                        if intensity > options.threshold {
                            samples.push(PointSample { x, y, z, intensity });
                        }
                    }
                }
                Some(samples)
            })
            .collect::<Option<_>>()?;

        let points: Vec<PointSample> = planes.into_iter().flatten().collect();
        log::debug!(
            "Point cloud: {} of {} voxels visible",
            points.len(),
            volume.voxel_count()
        );
        Some(PointCloud { points })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::ElementEncoding;
    use crate::test_utils::{nifti_bytes, volume_from_fn};
    use crate::volume_loader::VolumeLoader;

    #[test]
    fn empty_volume_has_no_points() {
        let volume = volume_from_fn((4, 3, 2), ElementEncoding::U16, |_, _, _| 0.0);
        assert!(PointCloudBuilder::build(&volume, &PointCloudOptions::default()).is_empty());
    }

    #[test]
    fn single_voxel_yields_single_point() {
        let volume = volume_from_fn((4, 3, 2), ElementEncoding::U16, |x, y, z| {
            if (x, y, z) == (2, 1, 1) { 200.0 } else { 0.0 }
        });
        let cloud = PointCloudBuilder::build(&volume, &PointCloudOptions::default());
        assert_eq!(
            cloud.points,
            vec![PointSample {
                x: 2,
                y: 1,
                z: 1,
                intensity: 127.5
            }]
        );
    }

    #[test]
    fn points_follow_scan_order() {
        let volume = volume_from_fn((3, 3, 3), ElementEncoding::U8, |_, _, _| 50.0);
        let cloud = PointCloudBuilder::build(&volume, &PointCloudOptions::default());
        assert_eq!(cloud.len(), 27);
        let indices: Vec<usize> = cloud
            .iter()
            .map(|p| volume.linear_index(p.x, p.y, p.z))
            .collect();
        assert_eq!(indices, (0..27).collect::<Vec<_>>());
    }

    #[test]
    fn bounds_reproduce_dimensions() {
        let volume = volume_from_fn((5, 3, 4), ElementEncoding::U8, |x, y, z| {
            ((x + y + z) % 3) as f32 * 100.0
        });
        let cloud = PointCloudBuilder::build(&volume, &PointCloudOptions::default());
        assert_eq!(cloud.bounds(), Some((4, 2, 3)));
        assert_eq!(PointCloud::default().bounds(), None);
    }

    #[test]
    fn decoded_volume_bounds_match_header() {
        let values: Vec<f32> = (0..60).map(|v| (v % 4) as f32 * 30.0).collect();
        let bytes = nifti_bytes((5, 4, 3), ElementEncoding::U8, &values);
        let volume = VolumeLoader::load_from_bytes(&bytes).unwrap();
        let cloud = PointCloudBuilder::build(&volume, &PointCloudOptions::default());
        let (dim_x, dim_y, dim_z) = volume.dim();
        assert_eq!(cloud.bounds(), Some((dim_x - 1, dim_y - 1, dim_z - 1)));
    }

    #[test]
    fn threshold_and_stride_thin_the_cloud() {
        let volume = volume_from_fn((4, 4, 4), ElementEncoding::U16, |x, _, _| x as f32 * 100.0);

        let strict = PointCloudOptions {
            threshold: 100.0,
            ..Default::default()
        };
        let cloud = PointCloudBuilder::build(&volume, &strict);
        // x = 2 -> 127.5 and x = 3 -> 191.25
        assert_eq!(cloud.len(), 32);
        assert!(cloud.iter().all(|p| p.x >= 2));

        let strided = PointCloudOptions {
            stride: 2,
            ..Default::default()
        };
        let cloud = PointCloudBuilder::build(&volume, &strided);
        // x = 2 only, on y, z in {0, 2}
        assert_eq!(cloud.len(), 4);
        assert!(cloud.iter().all(|p| p.x == 2 && p.y % 2 == 0 && p.z % 2 == 0));
    }

    #[test]
    fn cancelled_scan_returns_nothing() {
        let volume = volume_from_fn((4, 4, 4), ElementEncoding::U8, |_, _, _| 9.0);
        let token = CancelToken::new();
        token.cancel();
        assert_eq!(
            PointCloudBuilder::build_cancellable(&volume, &PointCloudOptions::default(), &token),
            Err(Cancelled)
        );
    }

    #[test]
    fn render_buffers_center_positions() {
        let cloud = PointCloud {
            points: vec![PointSample {
                x: 4,
                y: 0,
                z: 2,
                intensity: 255.0,
            }],
        };
        let (positions, colors) = cloud.to_render_buffers((2.0, 2.0, 2.0));
        assert_eq!(positions, vec![2.0, -2.0, 0.0]);
        assert_eq!(colors, vec![1.0, 1.0, 1.0]);
    }
}
