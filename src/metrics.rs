use crate::cancel::{CancelToken, Cancelled, SCAN_CHUNK};
use crate::codec::VoxelCodec;
use crate::volume::Volume;

use ndarray::Array2;
use rayon::prelude::*;
use std::collections::VecDeque;
use std::ops::Range;
use thiserror::Error;

/// Largest SSIM window edge. Axes shorter than this use their full length.
pub const SSIM_WINDOW: usize = 7;
const SSIM_K1: f64 = 0.01;
const SSIM_K2: f64 = 0.03;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricsError {
    #[error("Volume dimensions differ: {left:?} vs {right:?}")]
    DimensionMismatch {
        left: (usize, usize, usize),
        right: (usize, usize, usize),
    },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ComparisonMetrics {
    pub mse: f64,
    /// `+inf` when the volumes are identical
    pub psnr: f64,
    /// Mean structural similarity in `[0, 1]`
    pub ssim: f64,
}

/// Which label counts as foreground when computing overlap.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Foreground {
    #[default]
    NonZero,
    Label(f32),
}

impl Foreground {
    #[inline]
    fn contains(&self, value: f32) -> bool {
        match self {
            Foreground::NonZero => value != 0.0,
            Foreground::Label(label) => value == *label,
        }
    }
}

pub struct MetricsEngine;

impl MetricsEngine {
    /// MSE, PSNR and SSIM between a reference and a produced volume.
    ///
    /// Metrics are computed on decoded scalars, not display intensities.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::DimensionMismatch`] if the volumes differ in
    /// size.
    pub fn compute_comparison(
        reference: &Volume,
        output: &Volume,
    ) -> Result<ComparisonMetrics, MetricsError> {
        Self::comparison(reference, output, &|| false)
    }

    pub fn compute_comparison_cancellable(
        reference: &Volume,
        output: &Volume,
        token: &CancelToken,
    ) -> Result<ComparisonMetrics, MetricsError> {
        Self::comparison(reference, output, &|| token.is_cancelled())
    }

    /// Dice coefficient `2|A∩B| / (|A|+|B|)` between two label volumes.
    ///
    /// Two volumes without any foreground agree perfectly and score 1.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::DimensionMismatch`] if the volumes differ in
    /// size.
    pub fn compute_dice(
        reference: &Volume,
        output: &Volume,
        foreground: Foreground,
    ) -> Result<f64, MetricsError> {
        Self::dice(reference, output, foreground, &|| false)
    }

    pub fn compute_dice_cancellable(
        reference: &Volume,
        output: &Volume,
        foreground: Foreground,
        token: &CancelToken,
    ) -> Result<f64, MetricsError> {
        Self::dice(reference, output, foreground, &|| token.is_cancelled())
    }

    fn check_dimensions(a: &Volume, b: &Volume) -> Result<(), MetricsError> {
        if a.dim() != b.dim() {
            return Err(MetricsError::DimensionMismatch {
                left: a.dim(),
                right: b.dim(),
            });
        }
        Ok(())
    }

    /// Run `f` over consecutive index ranges of at most [`SCAN_CHUNK`]
    /// voxels, stopping before any chunk once `should_stop` fires.
    fn scan_chunks<T: Send>(
        len: usize,
        should_stop: &(dyn Fn() -> bool + Sync),
        f: impl Fn(Range<usize>) -> T + Sync,
    ) -> Result<Vec<T>, Cancelled> {
        (0..len.div_ceil(SCAN_CHUNK))
            .into_par_iter()
            .map(|chunk| {
                if should_stop() {
                    return Err(Cancelled);
                }
                let start = chunk * SCAN_CHUNK;
                Ok(f(start..(start + SCAN_CHUNK).min(len)))
            })
            .collect()
    }

    fn comparison(
        a: &Volume,
        b: &Volume,
        should_stop: &(dyn Fn() -> bool + Sync),
    ) -> Result<ComparisonMetrics, MetricsError> {
        Self::check_dimensions(a, b)?;
        VoxelCodec::warn_if_unsupported(a.header().encoding, "metrics");
        VoxelCodec::warn_if_unsupported(b.header().encoding, "metrics");

        let total = a.voxel_count();
        let partials = Self::scan_chunks(total, should_stop, |range| {
            range.fold((0.0f64, 0.0f64), |(sum, max), i| {
                let va = a.value_at_index(i) as f64;
                let vb = b.value_at_index(i) as f64;
                (sum + (va - vb).powi(2), max.max(va).max(vb))
            })
        })?;
        let (sum_squared_diff, max_val) = partials
            .into_iter()
            .fold((0.0, 0.0f64), |(sum, max), (s, m)| (sum + s, max.max(m)));

        let mse = if total == 0 {
            0.0
        } else {
            sum_squared_diff / total as f64
        };
        let psnr = if mse == 0.0 {
            f64::INFINITY
        } else {
            10.0 * (max_val.powi(2) / mse).log10()
        };
        let ssim = Self::ssim(a, b, max_val, should_stop)?;

        log::debug!("Comparison: mse {mse}, psnr {psnr}, ssim {ssim}");
        Ok(ComparisonMetrics { mse, psnr, ssim })
    }

    fn dice(
        a: &Volume,
        b: &Volume,
        foreground: Foreground,
        should_stop: &(dyn Fn() -> bool + Sync),
    ) -> Result<f64, MetricsError> {
        Self::check_dimensions(a, b)?;

        let partials = Self::scan_chunks(a.voxel_count(), should_stop, |range| {
            range.fold((0usize, 0usize, 0usize), |(both, in_a, in_b), i| {
                let fa = foreground.contains(a.value_at_index(i));
                let fb = foreground.contains(b.value_at_index(i));
                (
                    both + (fa && fb) as usize,
                    in_a + fa as usize,
                    in_b + fb as usize,
                )
            })
        })?;
        let (intersection, size_a, size_b) = partials
            .into_iter()
            .fold((0, 0, 0), |acc, p| (acc.0 + p.0, acc.1 + p.1, acc.2 + p.2));

        if size_a + size_b == 0 {
            return Ok(1.0);
        }
        Ok(2.0 * intersection as f64 / (size_a + size_b) as f64)
    }

    /// Mean SSIM over every valid window position, stride 1.
    ///
    /// Window sums are kept per z-plane with 2D integral images and a running
    /// total over the last `wz` planes, so memory stays at `wz` planes.
    fn ssim(
        a: &Volume,
        b: &Volume,
        max_val: f64,
        should_stop: &(dyn Fn() -> bool + Sync),
    ) -> Result<f64, Cancelled> {
        let (dim_x, dim_y, dim_z) = a.dim();
        if dim_x * dim_y * dim_z == 0 {
            return Ok(1.0);
        }
        let (wx, wy, wz) = (
            SSIM_WINDOW.min(dim_x),
            SSIM_WINDOW.min(dim_y),
            SSIM_WINDOW.min(dim_z),
        );
        let n = (wx * wy * wz) as f64;
        let range = if max_val > 0.0 { max_val } else { 1.0 };
        let c1 = (SSIM_K1 * range).powi(2);
        let c2 = (SSIM_K2 * range).powi(2);

        let mut window: VecDeque<WindowSums> = VecDeque::with_capacity(wz);
        let mut running = WindowSums::zeros(dim_y - wy + 1, dim_x - wx + 1);
        let mut total = 0.0;
        let mut count = 0usize;
        let mut since_check = 0usize;

        for z in 0..dim_z {
            if since_check >= SCAN_CHUNK {
                since_check = 0;
                if should_stop() {
                    return Err(Cancelled);
                }
            }
            since_check += dim_x * dim_y;

            let plane = WindowSums::from_plane(a, b, z, wx, wy);
            running.add(&plane);
            window.push_back(plane);
            if window.len() > wz {
                if let Some(old) = window.pop_front() {
                    running.sub(&old);
                }
            }
            if window.len() < wz {
                continue;
            }

            for ((((&sa, &sb), &saa), &sbb), &sab) in running
                .a
                .iter()
                .zip(&running.b)
                .zip(&running.aa)
                .zip(&running.bb)
                .zip(&running.ab)
            {
                let mu_a = sa / n;
                let mu_b = sb / n;
                let (var_a, var_b, cov) = if n > 1.0 {
                    (
                        (saa - n * mu_a * mu_a) / (n - 1.0),
                        (sbb - n * mu_b * mu_b) / (n - 1.0),
                        (sab - n * mu_a * mu_b) / (n - 1.0),
                    )
                } else {
                    (0.0, 0.0, 0.0)
                };
                let numerator = (2.0 * mu_a * mu_b + c1) * (2.0 * cov + c2);
                let denominator = (mu_a * mu_a + mu_b * mu_b + c1) * (var_a + var_b + c2);
                total += numerator / denominator;
                count += 1;
            }
        }

        Ok((total / count as f64).clamp(0.0, 1.0))
    }
}

/// Box sums of `a`, `b`, `a²`, `b²` and `ab` for every valid in-plane window.
struct WindowSums {
    a: Array2<f64>,
    b: Array2<f64>,
    aa: Array2<f64>,
    bb: Array2<f64>,
    ab: Array2<f64>,
}

impl WindowSums {
    fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            a: Array2::zeros((rows, cols)),
            b: Array2::zeros((rows, cols)),
            aa: Array2::zeros((rows, cols)),
            bb: Array2::zeros((rows, cols)),
            ab: Array2::zeros((rows, cols)),
        }
    }

    fn from_plane(a: &Volume, b: &Volume, z: usize, wx: usize, wy: usize) -> Self {
        let (dim_x, dim_y, _) = a.dim();
        let va = Array2::from_shape_fn((dim_y, dim_x), |(y, x)| a.value(x, y, z) as f64);
        let vb = Array2::from_shape_fn((dim_y, dim_x), |(y, x)| b.value(x, y, z) as f64);
        Self {
            a: box_sum(&va, wy, wx),
            b: box_sum(&vb, wy, wx),
            aa: box_sum(&(&va * &va), wy, wx),
            bb: box_sum(&(&vb * &vb), wy, wx),
            ab: box_sum(&(&va * &vb), wy, wx),
        }
    }

    fn add(&mut self, other: &Self) {
        self.a += &other.a;
        self.b += &other.b;
        self.aa += &other.aa;
        self.bb += &other.bb;
        self.ab += &other.ab;
    }

    fn sub(&mut self, other: &Self) {
        self.a -= &other.a;
        self.b -= &other.b;
        self.aa -= &other.aa;
        self.bb -= &other.bb;
        self.ab -= &other.ab;
    }
}

/// Sum of every `wy x wx` window fully inside `values`.
fn box_sum(values: &Array2<f64>, wy: usize, wx: usize) -> Array2<f64> {
    let (rows, cols) = values.dim();
    let mut integral = Array2::<f64>::zeros((rows + 1, cols + 1));
    for y in 0..rows {
        for x in 0..cols {
            integral[[y + 1, x + 1]] =
                values[[y, x]] + integral[[y, x + 1]] + integral[[y + 1, x]] - integral[[y, x]];
        }
    }
    Array2::from_shape_fn((rows - wy + 1, cols - wx + 1), |(y, x)| {
        integral[[y + wy, x + wx]] - integral[[y, x + wx]] - integral[[y + wy, x]]
            + integral[[y, x]]
    })
}
