use thiserror::Error;

pub type Result<T> = std::result::Result<T, StitchError>;

#[derive(Debug, Error)]
pub enum StitchError {
    /// Rejected configuration; the stitcher does not start.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A unit refused or failed work for the current frame.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Overlap geometry unusable for correction; never fails a frame.
    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Resource exhausted: pool {pool} has all {capacity} buffers in use")]
    ResourceExhausted { pool: String, capacity: usize },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Stitcher stopped")]
    Stopped,

    #[error("Core error: {0}")]
    Core(#[from] pano_core::Error),

    #[error("Feature match error: {0}")]
    Feature(#[from] pano_features::FeatureError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StitchError {
    /// Back-pressure: the same call may succeed once the previous frame releases its buffers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StitchError::ResourceExhausted { .. })
    }
}

impl From<pano_runtime::Error> for StitchError {
    fn from(e: pano_runtime::Error) -> Self {
        match e {
            pano_runtime::Error::ResourceExhausted { pool, capacity } => {
                StitchError::ResourceExhausted { pool, capacity }
            }
            pano_runtime::Error::PoolShutdown(_) => StitchError::Stopped,
            pano_runtime::Error::HalError(e) => e.into(),
            other => StitchError::Config(other.to_string()),
        }
    }
}

impl From<pano_hal::Error> for StitchError {
    fn from(e: pano_hal::Error) -> Self {
        match e {
            pano_hal::Error::Terminated(_) => StitchError::Stopped,
            pano_hal::Error::CoreError(e) => StitchError::Core(e),
            other => StitchError::Dispatch(other.to_string()),
        }
    }
}
