//! Overlap feature matching: corner detection, patch tracking and offset estimation.

pub mod config;
pub mod fast;
pub mod matcher;
pub mod tracker;

pub use config::FmConfig;
pub use fast::{fast_detect, fast_score};
pub use matcher::{DefaultFeatureMatch, FeatureMatch};

pub type Result<T> = std::result::Result<T, FeatureError>;

#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("Detection error: {0}")]
    DetectionError(String),

    #[error("Matching error: {0}")]
    MatchingError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Core error: {0}")]
    CoreError(#[from] pano_core::Error),
}
