//! Buffer pools and execution resources shared by a running stitcher.

pub mod arena;
pub mod executor;
pub mod pool;

pub use arena::{FrameArena, FrameId};
pub use executor::Executor;
pub use pool::SlicePool;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Pool {pool} exhausted ({capacity} buffers outstanding)")]
    ResourceExhausted { pool: String, capacity: usize },

    #[error("Pool {0} is shut down")]
    PoolShutdown(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),

    #[error("HAL error: {0}")]
    HalError(#[from] pano_hal::Error),
}

impl Error {
    /// Failures that clear once in-flight work releases its buffers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ResourceExhausted { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
