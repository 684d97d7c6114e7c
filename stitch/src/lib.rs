//! Surround-view stitching of a fisheye camera ring.
//!
//! Each frame flows geomap (one per camera) → blend (one per adjacent pair)
//! and copy (non-overlapping areas) into a single panorama. With feature
//! matching on, every blended overlap is measured off the compute threads
//! and the resulting scale correction applies from the next frame.

pub mod config;
pub mod dewarp;
pub mod error;
pub mod feedback;
pub mod frame;
pub mod layout;
pub mod stitcher;
pub mod sync;

pub use config::{FeatureMatchMode, ScaleMode, StitcherConfig};
pub use dewarp::{PolyBowlDewarp, StretchTable, TableGenerator};
pub use error::{Result, StitchError};
pub use feedback::{pair_correction, PairCorrection, PendingCorrection};
pub use frame::{FrameHandle, FramePhase, StitchedFrame};
pub use layout::RingLayout;
pub use stitcher::{MatcherFactory, Stitcher, StitcherBuilder};
pub use sync::{PairSync, PairSyncSet};
