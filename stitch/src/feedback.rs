//! Per-camera scale correction from measured overlap offsets.

use crate::config::ScaleMode;
use crate::error::{Result, StitchError};
use pano_core::{BowlConfig, CameraRing, CenterMark, Factor, OverlapInfo, Rect};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One-shot factors waiting for a camera's next geomap dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingCorrection {
    /// From the pair where this camera is the right contributor.
    pub left: Factor,
    /// From the pair where this camera is the left contributor.
    pub right: Factor,
}

impl Default for PendingCorrection {
    fn default() -> Self {
        Self {
            left: Factor::IDENTITY,
            right: Factor::IDENTITY,
        }
    }
}

impl PendingCorrection {
    pub fn is_identity(&self) -> bool {
        self.left.is_identity() && self.right.is_identity()
    }
}

/// Corrections measured on one blended pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairCorrection {
    pub pair: usize,
    pub offset: f32,
    pub left_camera: usize,
    /// Goes to the left camera's `right` slot.
    pub right_factor: Factor,
    pub right_camera: usize,
    /// Goes to the right camera's `left` slot.
    pub left_factor: Factor,
}

fn scale_for(range: f32, offset: f32, side: &str, camera: usize) -> Result<Factor> {
    if range <= 1.0 {
        return Err(StitchError::Geometry(format!(
            "camera {} {} range {} px too small",
            camera, side, range
        )));
    }
    let x = (range + offset / 2.0) / range;
    if !(x > 0.0 && x < 2.0) {
        return Err(StitchError::Geometry(format!(
            "camera {} {} factor {} outside (0, 2)",
            camera, side, x
        )));
    }
    Ok(Factor::new(x, 1.0))
}

/// Turn a measured `offset` on `pair` into factors for both contributing cameras.
///
/// Ranges are the distances in slice pixels between each camera's slice
/// centre and the centre of its side of the overlap. Either side failing
/// rejects the whole pair.
pub fn pair_correction(
    ring: &CameraRing,
    pair: usize,
    overlap: &OverlapInfo,
    centers: &[CenterMark],
    offset: f32,
) -> Result<PairCorrection> {
    let (left_camera, right_camera) = ring.pair_cameras(pair);

    let left_range = overlap.left.center_x() - centers[left_camera].slice_center_x as f32;
    let right_factor = scale_for(left_range, offset, "left", left_camera)?;

    let right_range = centers[right_camera].slice_center_x as f32 - overlap.right.center_x();
    let left_factor = scale_for(right_range, offset, "right", right_camera)?;

    Ok(PairCorrection {
        pair,
        offset,
        left_camera,
        right_factor,
        right_camera,
        left_factor,
    })
}

/// Matching window inside one side of an overlap: the wall share from the top.
pub fn feature_crop(area: &Rect, bowl: &BowlConfig) -> Rect {
    let height = ((area.height as f32 * bowl.wall_ratio()) as i32).max(1);
    Rect::new(area.pos_x, 0, area.width, height.min(area.height.max(1)))
}

/// How pending corrections fold into a camera's persistent factor.
pub trait CorrectionModel: Send + Sync {
    fn apply(&self, last: Factor, pending: &PendingCorrection) -> Factor;
}

/// One scale factor per camera: the mean of both neighbours' corrections.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleScale;

impl CorrectionModel for SingleScale {
    fn apply(&self, last: Factor, pending: &PendingCorrection) -> Factor {
        Factor::average(last * pending.left, last * pending.right)
    }
}

/// Resolve a scale mode into its correction model.
pub fn correction_model(mode: ScaleMode) -> Result<Box<dyn CorrectionModel>> {
    match mode {
        ScaleMode::SingleConst => Ok(Box::new(SingleScale)),
        other => Err(StitchError::Config(format!("unsupported scale mode {:?}", other))),
    }
}

struct State {
    factors: Vec<Factor>,
    pending: Vec<PendingCorrection>,
}

/// Persistent geomap factors and pending corrections of every camera.
pub struct FeedbackState {
    model: Box<dyn CorrectionModel>,
    state: Mutex<State>,
}

impl FeedbackState {
    /// All factors start at the uninitialized sentinel.
    pub fn new(cameras: usize, model: Box<dyn CorrectionModel>) -> Self {
        Self {
            model,
            state: Mutex::new(State {
                factors: vec![Factor::ZERO; cameras],
                pending: vec![PendingCorrection::default(); cameras],
            }),
        }
    }

    pub fn factor(&self, camera: usize) -> Factor {
        self.state.lock().factors[camera]
    }

    pub fn pending(&self, camera: usize) -> PendingCorrection {
        self.state.lock().pending[camera]
    }

    pub fn store(&self, correction: &PairCorrection) {
        let mut st = self.state.lock();
        st.pending[correction.left_camera].right = correction.right_factor;
        st.pending[correction.right_camera].left = correction.left_factor;
    }

    /// Factor the next geomap of `camera` runs with: the persistent factor
    /// with pending corrections folded in. Nothing is written until `commit`.
    ///
    /// `None` while the factor is still the sentinel.
    pub fn next_factor(&self, camera: usize) -> Option<Factor> {
        let st = self.state.lock();
        let last = st.factors[camera];
        if last.is_sentinel() {
            return None;
        }
        let pending = &st.pending[camera];
        if pending.is_identity() {
            Some(last)
        } else {
            Some(self.model.apply(last, pending))
        }
    }

    /// Record the factor a successful geomap ran with.
    ///
    /// The first report becomes the baseline and leaves pending corrections
    /// in place. Later reports replace the factor and clear the corrections
    /// folded into it. Returns `true` when the baseline was adopted.
    pub fn commit(&self, camera: usize, applied: Factor) -> bool {
        if applied.is_sentinel() {
            return false;
        }
        let mut st = self.state.lock();
        if st.factors[camera].is_sentinel() {
            st.factors[camera] = applied;
            return true;
        }
        st.factors[camera] = applied;
        st.pending[camera] = PendingCorrection::default();
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn centers(n: usize, slice_center: u32) -> Vec<CenterMark> {
        (0..n)
            .map(|i| CenterMark {
                slice_center_x: slice_center,
                out_center_x: i as u32 * 100,
            })
            .collect()
    }

    fn overlap(left_x: i32, right_x: i32, width: i32) -> OverlapInfo {
        OverlapInfo {
            left: Rect::new(left_x, 0, width, 64),
            right: Rect::new(right_x, 0, width, 64),
            out_area: Rect::new(0, 0, width, 64),
        }
    }

    #[test]
    fn test_zero_offset_gives_identity() {
        let ring = CameraRing::new(4).unwrap();
        let c = pair_correction(&ring, 3, &overlap(480, 0, 112), &centers(4, 296), 0.0).unwrap();
        assert_eq!((c.left_camera, c.right_camera), (3, 0));
        assert_eq!(c.right_factor, Factor::IDENTITY);
        assert_eq!(c.left_factor, Factor::IDENTITY);
    }

    #[test]
    fn test_offset_scales_both_sides() {
        let ring = CameraRing::new(4).unwrap();
        // Both ranges are 240 px.
        let c = pair_correction(&ring, 0, &overlap(480, 0, 112), &centers(4, 296), 48.0).unwrap();
        assert!((c.right_factor.x - 1.1).abs() < 1e-6);
        assert!((c.left_factor.x - 1.1).abs() < 1e-6);
        assert_eq!(c.right_factor.y, 1.0);
    }

    #[test]
    fn test_range_of_one_pixel_is_rejected_on_either_side() {
        let ring = CameraRing::new(2).unwrap();
        // Left overlap centre 1 px right of the slice centre.
        let left = overlap(0, 0, 2);
        let cs = vec![
            CenterMark {
                slice_center_x: 0,
                out_center_x: 0,
            },
            CenterMark {
                slice_center_x: 500,
                out_center_x: 100,
            },
        ];
        assert!(matches!(
            pair_correction(&ring, 0, &left, &cs, 0.0),
            Err(StitchError::Geometry(_))
        ));

        // Right side: slice centre 1 px right of the overlap centre.
        let right = overlap(100, 0, 2);
        let cs = vec![
            CenterMark {
                slice_center_x: 0,
                out_center_x: 0,
            },
            CenterMark {
                slice_center_x: 2,
                out_center_x: 100,
            },
        ];
        assert!(matches!(
            pair_correction(&ring, 0, &right, &cs, 0.0),
            Err(StitchError::Geometry(_))
        ));
    }

    #[test]
    fn test_factor_bounds_are_exclusive() {
        // range 100: offset 200 gives exactly 2.0, offset -200 exactly 0.0.
        assert!(scale_for(100.0, 200.0, "left", 0).is_err());
        assert!(scale_for(100.0, -200.0, "left", 0).is_err());
        assert!(scale_for(100.0, 198.0, "left", 0).is_ok());
        assert!(scale_for(1.5, 0.0, "left", 0).is_ok());
    }

    #[test]
    fn test_correction_decays_after_one_frame() {
        let fb = FeedbackState::new(4, Box::new(SingleScale));
        assert!(fb.next_factor(0).is_none());
        assert!(fb.commit(0, Factor::new(0.5, 0.25)));
        assert_eq!(fb.factor(0), Factor::new(0.5, 0.25));

        fb.store(&PairCorrection {
            pair: 0,
            offset: 0.0,
            left_camera: 0,
            right_factor: Factor::new(1.1, 1.0),
            right_camera: 1,
            left_factor: Factor::new(0.9, 1.0),
        });
        assert_eq!(fb.pending(0).right, Factor::new(1.1, 1.0));

        let next = fb.next_factor(0).unwrap();
        assert!((next.x - 0.525).abs() < 1e-6);
        assert_eq!(next.y, 0.25);
        // Folding alone changes nothing.
        assert_eq!(fb.factor(0), Factor::new(0.5, 0.25));

        assert!(!fb.commit(0, next));
        assert_eq!(fb.factor(0), next);
        assert_eq!(fb.pending(0), PendingCorrection::default());

        // Nothing pending: the factor holds.
        assert_eq!(fb.next_factor(0).unwrap(), next);
    }

    #[test]
    fn test_uncommitted_fold_keeps_last_good_factor() {
        let fb = FeedbackState::new(2, Box::new(SingleScale));
        fb.commit(1, Factor::new(0.5, 0.5));
        fb.store(&PairCorrection {
            pair: 0,
            offset: 10.0,
            left_camera: 0,
            right_factor: Factor::new(1.2, 1.0),
            right_camera: 1,
            left_factor: Factor::new(1.2, 1.0),
        });

        // A frame that folds but never completes leaves state untouched.
        let first = fb.next_factor(1).unwrap();
        assert_eq!(fb.factor(1), Factor::new(0.5, 0.5));
        assert_eq!(fb.next_factor(1).unwrap(), first);
        assert!(!fb.pending(1).is_identity());
    }

    #[test]
    fn test_baseline_keeps_early_corrections() {
        let fb = FeedbackState::new(2, Box::new(SingleScale));
        fb.store(&PairCorrection {
            pair: 0,
            offset: 10.0,
            left_camera: 0,
            right_factor: Factor::new(1.2, 1.0),
            right_camera: 1,
            left_factor: Factor::new(1.2, 1.0),
        });
        assert!(fb.commit(0, Factor::new(0.5, 0.5)));
        assert!(!fb.commit(0, Factor::ZERO));
        assert_eq!(fb.pending(0).right, Factor::new(1.2, 1.0));
    }

    #[test]
    fn test_sentinel_camera_keeps_pending() {
        let fb = FeedbackState::new(2, Box::new(SingleScale));
        fb.store(&PairCorrection {
            pair: 1,
            offset: 4.0,
            left_camera: 1,
            right_factor: Factor::new(1.05, 1.0),
            right_camera: 0,
            left_factor: Factor::new(1.05, 1.0),
        });
        assert!(fb.next_factor(0).is_none());
        assert_eq!(fb.pending(0).left, Factor::new(1.05, 1.0));
    }

    #[test]
    fn test_feature_crop_keeps_wall_share() {
        let bowl = BowlConfig {
            wall_height: 3000.0,
            ground_length: 1000.0,
            ..Default::default()
        };
        assert_eq!(feature_crop(&Rect::new(480, 0, 112, 640), &bowl), Rect::new(480, 0, 112, 480));
    }

    #[test]
    fn test_only_single_scale_resolves() {
        assert!(correction_model(ScaleMode::SingleConst).is_ok());
        assert!(correction_model(ScaleMode::DualCurve).is_err());
    }
}
