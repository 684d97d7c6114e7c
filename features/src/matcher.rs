use crate::config::FmConfig;
use crate::fast::fast_detect;
use crate::tracker::{track_corners, SearchWindow};
use crate::{FeatureError, Result};
use image::GrayImage;

/// Rounds of mean-distance outlier rejection.
const OUTLIER_ROUNDS: usize = 3;
/// Vertical search half-height of the tracker.
const VERTICAL_SEARCH: i32 = 2;

/// Measures how far the right overlap crop is shifted against the left one.
pub trait FeatureMatch: Send {
    fn config(&self) -> &FmConfig;

    fn set_config(&mut self, config: FmConfig);

    /// Horizontal offset in pixels of the right crop's content relative to the
    /// left crop's. `Ok(0.0)` when no reliable measurement exists.
    fn match_offset(&mut self, left: &GrayImage, right: &GrayImage) -> Result<f32>;
}

/// FAST corners tracked by patch search, averaged with outlier rejection.
#[derive(Debug, Clone, Default)]
pub struct DefaultFeatureMatch {
    config: FmConfig,
    mean_offset: f32,
    valid_count: usize,
}

impl DefaultFeatureMatch {
    pub fn new(config: FmConfig) -> Self {
        Self {
            config,
            mean_offset: 0.0,
            valid_count: 0,
        }
    }

    /// Unscaled mean offset of the last match.
    pub fn mean_offset(&self) -> f32 {
        self.mean_offset
    }

    /// Tracks that survived filtering in the last match.
    pub fn valid_count(&self) -> usize {
        self.valid_count
    }

    fn reset_offsets(&mut self) {
        self.mean_offset = 0.0;
        self.valid_count = 0;
    }
}

/// Drop offsets further than `max_error` from the mean, for up to `rounds` passes.
pub fn reject_outliers(offsets: &mut Vec<f32>, max_error: f32, rounds: usize) {
    for _ in 0..rounds {
        if offsets.is_empty() {
            return;
        }
        let mean = offsets.iter().sum::<f32>() / offsets.len() as f32;
        let before = offsets.len();
        offsets.retain(|o| (o - mean).abs() <= max_error);
        if offsets.len() == before {
            return;
        }
    }
}

impl FeatureMatch for DefaultFeatureMatch {
    fn config(&self) -> &FmConfig {
        &self.config
    }

    fn set_config(&mut self, config: FmConfig) {
        self.config = config;
    }

    fn match_offset(&mut self, left: &GrayImage, right: &GrayImage) -> Result<f32> {
        self.reset_offsets();

        if left.dimensions() != right.dimensions() {
            return Err(FeatureError::InvalidInput(format!(
                "crop sizes differ: {:?} vs {:?}",
                left.dimensions(),
                right.dimensions()
            )));
        }
        if left.width() < self.config.stitch_min_width {
            tracing::debug!(width = left.width(), "overlap narrower than stitch_min_width");
            return Ok(0.0);
        }

        let corners = fast_detect(left, self.config.fast_threshold, self.config.max_corners);
        if corners.len() < self.config.min_corners {
            tracing::debug!(corners = corners.len(), "too few corners");
            return Ok(0.0);
        }

        let window = SearchWindow {
            max_dx: (self.config.delta_mean_offset.max(0.0) as i32).min(left.width() as i32 / 2),
            max_dy: VERTICAL_SEARCH,
        };
        let tracks = track_corners(left, right, &corners.keypoints, window);

        let mut offsets: Vec<f32> = tracks
            .iter()
            .filter(|t| t.error <= self.config.max_track_error)
            .filter(|t| (t.dy as f32).abs() <= self.config.max_valid_offset_y)
            .map(|t| t.dx as f32)
            .collect();
        reject_outliers(&mut offsets, self.config.recur_offset_error, OUTLIER_ROUNDS);

        if offsets.len() < self.config.min_corners {
            tracing::debug!(valid = offsets.len(), "too few consistent tracks");
            return Ok(0.0);
        }

        let mean = offsets.iter().sum::<f32>() / offsets.len() as f32;
        if mean.abs() > self.config.delta_mean_offset {
            tracing::debug!(mean, "mean offset out of range");
            return Ok(0.0);
        }

        self.mean_offset = mean;
        self.valid_count = offsets.len();

        let limit = self.config.max_adjusted_offset.abs();
        Ok((mean * self.config.offset_factor).clamp(-limit, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_outliers_converges() {
        let mut v = vec![5.0, 5.0, 6.0, 4.0, 5.0, 20.0];
        reject_outliers(&mut v, 8.0, 3);
        assert_eq!(v, vec![5.0, 5.0, 6.0, 4.0, 5.0]);

        let mut far = vec![0.0, 100.0];
        reject_outliers(&mut far, 8.0, 3);
        assert!(far.is_empty());
    }

    #[test]
    fn test_size_mismatch_is_an_error() {
        let mut fm = DefaultFeatureMatch::default();
        let a = GrayImage::new(200, 40);
        let b = GrayImage::new(190, 40);
        assert!(fm.match_offset(&a, &b).is_err());
    }

    #[test]
    fn test_narrow_crop_reports_zero() {
        let mut fm = DefaultFeatureMatch::default();
        let a = GrayImage::new(100, 40);
        assert_eq!(fm.match_offset(&a, &a).unwrap(), 0.0);
        assert_eq!(fm.valid_count(), 0);
    }
}
