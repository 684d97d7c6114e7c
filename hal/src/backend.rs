use crate::{Result, SharedFrame};
use pano_core::{CopyArea, Factor, GeoMapTable, Rect};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    Cpu,
    Vulkan,
    WebGPU,
    Custom,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendType::Cpu => write!(f, "CPU"),
            BackendType::Vulkan => write!(f, "Vulkan"),
            BackendType::WebGPU => write!(f, "WebGPU"),
            BackendType::Custom => write!(f, "Custom"),
        }
    }
}

/// Completion callback of an asynchronous unit.
///
/// Invoked exactly once per successful `dispatch`, on whatever thread the
/// backend completes work on, with the dispatched parameters handed back and
/// the unit's status.
pub type Completion<P> = Box<dyn FnOnce(P, Result<()>) + Send + 'static>;

/// Parameters of one geometric-map (dewarp) run.
pub struct GeoMapParams {
    pub camera: usize,
    pub input: SharedFrame,
    pub output: SharedFrame,
    /// Sampling scale. `None` lets the mapper use its table-derived baseline;
    /// on completion this holds the factor actually applied.
    pub factor: Option<Factor>,
}

/// Parameters of one pairwise blend.
pub struct BlendParams {
    pub pair: usize,
    pub left: SharedFrame,
    pub right: SharedFrame,
    pub output: SharedFrame,
}

/// Parameters of one direct region copy.
pub struct CopyParams {
    pub index: usize,
    pub source: SharedFrame,
    pub output: SharedFrame,
}

/// Static areas a blender composites, fixed at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendSetup {
    pub output_size: (u32, u32),
    pub merge_window: Rect,
    pub left_area: Rect,
    pub right_area: Rect,
}

impl BlendSetup {
    pub fn validate(&self) -> Result<()> {
        let (w, h) = self.output_size;
        if !self.merge_window.fits_within(w, h) {
            return Err(crate::Error::InvalidInput(format!(
                "merge window {:?} outside {}x{} output",
                self.merge_window, w, h
            )));
        }
        if !self.left_area.same_size(&self.merge_window)
            || !self.right_area.same_size(&self.merge_window)
        {
            return Err(crate::Error::InvalidInput(format!(
                "blend areas {:?}/{:?} differ from merge window {:?}",
                self.left_area, self.right_area, self.merge_window
            )));
        }
        Ok(())
    }
}

/// Per-camera dewarp unit.
pub trait GeoMapper: Send + Sync {
    fn camera(&self) -> usize;

    fn output_size(&self) -> (u32, u32);

    fn set_lookup_table(&self, table: GeoMapTable) -> Result<()>;

    /// Factor used when a dispatch carries none; `Factor::ZERO` before a table is set.
    fn baseline_factor(&self) -> Factor;

    fn dispatch(&self, params: GeoMapParams, done: Completion<GeoMapParams>) -> Result<()>;

    /// Refuse further dispatches and fail queued work with `Error::Terminated`.
    fn terminate(&self);
}

/// Per-pair blend unit.
pub trait Blender: Send + Sync {
    fn pair(&self) -> usize;

    fn setup(&self) -> &BlendSetup;

    fn dispatch(&self, params: BlendParams, done: Completion<BlendParams>) -> Result<()>;

    fn terminate(&self);
}

/// Per-copy-area unit.
pub trait Copier: Send + Sync {
    fn area(&self) -> &CopyArea;

    fn dispatch(&self, params: CopyParams, done: Completion<CopyParams>) -> Result<()>;

    fn terminate(&self);
}

/// Factory for the asynchronous units of one compute device.
pub trait ComputeBackend: Send + Sync {
    fn backend_type(&self) -> BackendType;

    fn name(&self) -> &str;

    fn create_geo_mapper(
        &self,
        camera: usize,
        output_size: (u32, u32),
    ) -> Result<Box<dyn GeoMapper>>;

    fn create_blender(&self, pair: usize, setup: BlendSetup) -> Result<Box<dyn Blender>>;

    fn create_copier(&self, index: usize, area: CopyArea) -> Result<Box<dyn Copier>>;
}
