/// Expected upper intensity bound of the modality when no override is given.
pub const DEFAULT_MAX_RANGE: f32 = 400.0;

/// Maps decoded scalars to display intensities in `[0, 255]`.
///
/// Values `<= 1` are treated as already normalized to the unit range and
/// scaled by 255. Larger values are divided by `max_range` and clamped.
/// `max_range` differs between scanners and modalities, so it is carried
/// here instead of being fixed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntensityNormalizer {
    pub max_range: f32,
}

impl Default for IntensityNormalizer {
    fn default() -> Self {
        Self {
            max_range: DEFAULT_MAX_RANGE,
        }
    }
}

impl IntensityNormalizer {
    pub fn new(max_range: f32) -> Self {
        Self { max_range }
    }

    #[inline]
    pub fn normalize(&self, raw: f32) -> f32 {
        if raw.is_nan() {
            return 0.0;
        }
        if raw <= 1.0 {
            (raw * 255.0).clamp(0.0, 255.0)
        } else {
            (raw / self.max_range * 255.0).clamp(0.0, 255.0)
        }
    }

    #[inline]
    pub fn normalize_to_u8(&self, raw: f32) -> u8 {
        self.normalize(raw).round() as u8
    }
}
