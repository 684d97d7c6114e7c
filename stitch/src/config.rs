use crate::error::{Result, StitchError};
use crate::layout::RingLayout;
use pano_core::{
    threads_from_env, BowlConfig, CameraInfo, ExtrinsicParameter, IntrinsicParameter, MAX_CAMERAS,
    MIN_CAMERAS,
};
use pano_features::FmConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Buffer pitch alignment.
pub const ALIGNMENT_X: u32 = 16;
pub const ALIGNMENT_Y: u32 = 4;
/// Slice widths are multiples of this.
pub const SLICE_ALIGNMENT: u32 = 16;
/// Dewarp tables sample every 16th slice pixel in each direction.
pub const MAP_FACTOR: u32 = 16;
/// One slice buffer per camera serializes consecutive frames.
pub const DEFAULT_POOL_CAPACITY: usize = 1;

/// How feature offsets correct a camera's dewarp scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    /// One scale factor per camera.
    #[default]
    SingleConst,
    DualConst,
    DualCurve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureMatchMode {
    /// No feedback; factors stay at their baseline.
    #[default]
    None,
    Default,
    Cluster,
    Capi,
}

impl FeatureMatchMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, FeatureMatchMode::None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitcherConfig {
    pub name: String,
    pub camera_num: usize,
    pub output_width: u32,
    pub output_height: u32,
    /// Interleaved channels of inputs, slices and output.
    pub channels: u8,
    /// Per-camera calibration. Empty means an evenly spaced equidistant ring.
    pub cameras: Vec<CameraInfo>,
    /// Input size of the synthesized ring when `cameras` is empty.
    pub input_width: u32,
    pub input_height: u32,
    /// Degrees each synthesized camera sees beyond its `360 / N` share.
    pub overlap_angle: f32,
    pub bowl: BowlConfig,
    pub scale_mode: ScaleMode,
    pub fm_mode: FeatureMatchMode,
    pub fm_config: FmConfig,
    pub alignment_x: u32,
    pub alignment_y: u32,
    pub slice_alignment: u32,
    pub pool_capacity: usize,
    /// Compute worker threads; `PANO_CPU_THREADS` takes precedence.
    pub worker_threads: Option<usize>,
    /// Cores the feature-match workers are pinned to, round-robin.
    pub fm_cores: Option<Vec<usize>>,
    /// Precomputed slice/overlap/copy geometry from an external solver.
    pub layout: Option<RingLayout>,
}

impl Default for StitcherConfig {
    fn default() -> Self {
        Self {
            name: "panostitch".to_string(),
            camera_num: 4,
            output_width: 0,
            output_height: 0,
            channels: 3,
            cameras: Vec::new(),
            input_width: 1280,
            input_height: 800,
            overlap_angle: 20.0,
            bowl: BowlConfig::default(),
            scale_mode: ScaleMode::default(),
            fm_mode: FeatureMatchMode::default(),
            fm_config: FmConfig::default(),
            alignment_x: ALIGNMENT_X,
            alignment_y: ALIGNMENT_Y,
            slice_alignment: SLICE_ALIGNMENT,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            worker_threads: None,
            fm_cores: None,
            layout: None,
        }
    }
}

impl StitcherConfig {
    pub fn new(camera_num: usize, output_width: u32, output_height: u32) -> Self {
        Self {
            camera_num,
            output_width,
            output_height,
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_output_size(mut self, width: u32, height: u32) -> Self {
        self.output_width = width;
        self.output_height = height;
        self
    }

    pub fn with_channels(mut self, channels: u8) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_cameras(mut self, cameras: Vec<CameraInfo>) -> Self {
        self.camera_num = cameras.len();
        self.cameras = cameras;
        self
    }

    pub fn with_input_size(mut self, width: u32, height: u32) -> Self {
        self.input_width = width;
        self.input_height = height;
        self
    }

    pub fn with_overlap_angle(mut self, degrees: f32) -> Self {
        self.overlap_angle = degrees;
        self
    }

    pub fn with_bowl(mut self, bowl: BowlConfig) -> Self {
        self.bowl = bowl;
        self
    }

    pub fn with_scale_mode(mut self, mode: ScaleMode) -> Self {
        self.scale_mode = mode;
        self
    }

    pub fn with_fm_mode(mut self, mode: FeatureMatchMode) -> Self {
        self.fm_mode = mode;
        self
    }

    pub fn with_fm_config(mut self, config: FmConfig) -> Self {
        self.fm_config = config;
        self
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    pub fn with_fm_cores(mut self, cores: Vec<usize>) -> Self {
        self.fm_cores = Some(cores);
        self
    }

    pub fn with_layout(mut self, layout: RingLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn output_size(&self) -> (u32, u32) {
        (self.output_width, self.output_height)
    }

    /// Reject configurations the pipeline cannot run, including a
    /// feature-match mode this build cannot provide.
    pub fn validate(&self) -> Result<()> {
        self.check(true)
    }

    pub(crate) fn check(&self, needs_builtin_matcher: bool) -> Result<()> {
        if self.output_width == 0 || self.output_height == 0 {
            return Err(StitchError::Config(format!("{}: output size was not set", self.name)));
        }
        if !(MIN_CAMERAS..=MAX_CAMERAS).contains(&self.camera_num) {
            return Err(StitchError::Config(format!(
                "{}: camera count {} outside [{}, {}]",
                self.name, self.camera_num, MIN_CAMERAS, MAX_CAMERAS
            )));
        }
        if !self.cameras.is_empty() && self.cameras.len() != self.camera_num {
            return Err(StitchError::Config(format!(
                "{}: {} camera infos for {} cameras",
                self.name,
                self.cameras.len(),
                self.camera_num
            )));
        }
        if !matches!(self.channels, 1 | 3 | 4) {
            return Err(StitchError::Config(format!(
                "{}: unsupported channel count {}",
                self.name, self.channels
            )));
        }
        if self.pool_capacity == 0 {
            return Err(StitchError::Config(format!(
                "{}: pool capacity must be at least 1",
                self.name
            )));
        }
        if self.alignment_x == 0 || self.alignment_y == 0 || self.slice_alignment == 0 {
            return Err(StitchError::Config(format!("{}: alignment must be non-zero", self.name)));
        }
        if self.fm_cores.as_ref().is_some_and(|c| c.is_empty()) {
            return Err(StitchError::Config(format!("{}: fm_cores is empty", self.name)));
        }
        if self.worker_threads == Some(0) {
            return Err(StitchError::Config(format!(
                "{}: worker_threads must be at least 1",
                self.name
            )));
        }

        match self.scale_mode {
            ScaleMode::SingleConst => {}
            other => {
                return Err(StitchError::Config(format!(
                    "{}: unsupported scale mode {:?}",
                    self.name, other
                )));
            }
        }

        match self.fm_mode {
            FeatureMatchMode::None => {}
            FeatureMatchMode::Default => {
                if needs_builtin_matcher && !cfg!(feature = "feature-match") {
                    return Err(StitchError::Unsupported(format!(
                        "{}: feature match requested but this build has no matcher",
                        self.name
                    )));
                }
            }
            other => {
                return Err(StitchError::Config(format!(
                    "{}: unsupported feature match mode {:?}",
                    self.name, other
                )));
            }
        }
        Ok(())
    }

    /// Worker threads after applying `PANO_CPU_THREADS`.
    pub fn resolved_worker_threads(&self) -> Result<usize> {
        let from_env = threads_from_env().map_err(StitchError::Config)?;
        Ok(from_env
            .or(self.worker_threads)
            .unwrap_or_else(rayon::current_num_threads)
            .max(1))
    }

    /// Viewpoint range of every camera, degrees.
    pub fn viewpoint_ranges(&self) -> Vec<f32> {
        if !self.cameras.is_empty() {
            return self.cameras.iter().map(|c| c.viewpoint_range).collect();
        }
        let share = 360.0 / self.camera_num.max(1) as f32;
        vec![share + self.overlap_angle; self.camera_num]
    }

    /// Calibration of every camera, synthesizing an evenly spaced ring when none is configured.
    pub fn camera_infos(&self) -> Vec<CameraInfo> {
        if !self.cameras.is_empty() {
            return self.cameras.clone();
        }
        let share = 360.0 / self.camera_num.max(1) as f32;
        (0..self.camera_num)
            .map(|i| {
                let extrinsic = ExtrinsicParameter {
                    trans_z: self.bowl.center_z,
                    yaw: i as f32 * share,
                    ..Default::default()
                };
                CameraInfo::new(
                    IntrinsicParameter::equidistant(self.input_width, self.input_height, 190.0),
                    extrinsic,
                    share + self.overlap_angle,
                )
            })
            .collect()
    }
}
