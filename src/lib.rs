pub use pano_core as core;
pub use pano_features as features;
pub use pano_hal as hal;
pub use pano_runtime as runtime;
pub use pano_stitch as stitch;

pub use pano_stitch::{Stitcher, StitcherBuilder, StitcherConfig, StitchError};

/// Initialize the global Rayon pool used for dewarp table generation and
/// other CPU work outside the compute backend.
///
/// Call once at startup. Repeated calls return the first result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `PANO_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<(), String> {
    pano_core::init_global_thread_pool(num_threads)
}
