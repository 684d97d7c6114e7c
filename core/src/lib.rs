//! Shared geometry, camera and pixel-buffer types for the stitching pipeline.

pub mod camera;
pub mod geometry;
pub mod image;
pub mod keypoint;
pub mod runtime;
pub mod table;

pub use camera::*;
pub use geometry::*;
pub use image::*;
pub use keypoint::*;
pub use runtime::{init_global_thread_pool, threads_from_env, THREADS_ENV};
pub use table::GeoMapTable;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
}
