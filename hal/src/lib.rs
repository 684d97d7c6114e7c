//! Compute-unit contracts for the stitching pipeline and a CPU reference backend.
//!
//! Every unit is asynchronous: `dispatch` validates and enqueues, and the
//! completion callback runs later on a backend-owned thread.

pub mod backend;
pub mod cpu;

pub use backend::{
    BackendType, BlendParams, BlendSetup, Blender, Completion, ComputeBackend, CopyParams, Copier,
    GeoMapParams, GeoMapper,
};
pub use cpu::{CpuBackend, CpuBlender, CpuCopier, CpuGeoMapper};

use parking_lot::RwLock;
use pano_core::VideoFrame;
use std::sync::Arc;

/// Frame buffer shared between the pipeline and in-flight units.
pub type SharedFrame = Arc<RwLock<VideoFrame>>;

pub fn shared_frame(frame: VideoFrame) -> SharedFrame {
    Arc::new(RwLock::new(frame))
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("Unit terminated: {0}")]
    Terminated(String),

    #[error("Kernel error: {0}")]
    KernelError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Core error: {0}")]
    CoreError(#[from] pano_core::Error),
}
