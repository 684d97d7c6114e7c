use serde::{Deserialize, Serialize};

/// Tunables of the overlap feature matcher.
///
/// Offsets and errors are in pixels of the cropped overlap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FmConfig {
    /// Crops narrower than this are not matched.
    pub stitch_min_width: u32,
    /// Minimum surviving tracks for a usable offset.
    pub min_corners: usize,
    /// Share of the measured mean offset that is reported.
    pub offset_factor: f32,
    /// Mean offsets beyond this are treated as mismatches.
    pub delta_mean_offset: f32,
    /// Tracks further than this from the running mean are dropped.
    pub recur_offset_error: f32,
    /// Clamp for the reported offset.
    pub max_adjusted_offset: f32,
    pub max_valid_offset_y: f32,
    /// Mean absolute patch difference above which a track is dropped.
    pub max_track_error: f32,
    pub fast_threshold: u8,
    pub max_corners: usize,
}

impl Default for FmConfig {
    fn default() -> Self {
        Self {
            stitch_min_width: 136,
            min_corners: 4,
            offset_factor: 0.8,
            delta_mean_offset: 120.0,
            recur_offset_error: 8.0,
            max_adjusted_offset: 24.0,
            max_valid_offset_y: 20.0,
            max_track_error: 28.0,
            fast_threshold: 20,
            max_corners: 200,
        }
    }
}

impl FmConfig {
    pub fn with_min_corners(mut self, min_corners: usize) -> Self {
        self.min_corners = min_corners;
        self
    }

    pub fn with_offset_factor(mut self, offset_factor: f32) -> Self {
        self.offset_factor = offset_factor;
        self
    }

    pub fn with_max_adjusted_offset(mut self, max_adjusted_offset: f32) -> Self {
        self.max_adjusted_offset = max_adjusted_offset;
        self
    }

    pub fn with_stitch_min_width(mut self, stitch_min_width: u32) -> Self {
        self.stitch_min_width = stitch_min_width;
        self
    }
}
