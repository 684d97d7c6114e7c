use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// Smallest supported camera ring.
pub const MIN_CAMERAS: usize = 2;
/// Largest supported camera ring.
pub const MAX_CAMERAS: usize = 6;

/// Round `value` up to the next multiple of `alignment`.
pub fn align_up(value: u32, alignment: u32) -> u32 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Normalize an angle in degrees into `[0, 360)`.
pub fn format_angle(angle: f32) -> f32 {
    let a = angle % 360.0;
    if a < 0.0 {
        a + 360.0
    } else {
        a
    }
}

/// Integer pixel rectangle.
///
/// Signed so intermediate layout arithmetic can go negative before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub pos_x: i32,
    pub pos_y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(pos_x: i32, pos_y: i32, width: i32, height: i32) -> Self {
        Self {
            pos_x,
            pos_y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.pos_x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.pos_y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn center_x(&self) -> f32 {
        self.pos_x as f32 + self.width as f32 / 2.0
    }

    pub fn same_size(&self, other: &Rect) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// True when the rectangle lies inside a `width x height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        !self.is_empty()
            && self.pos_x >= 0
            && self.pos_y >= 0
            && self.right() <= width as i32
            && self.bottom() <= height as i32
    }
}

/// Horizontal/vertical scale applied to geometric-map sampling coordinates.
///
/// `Factor::ZERO` is the "not yet initialized" sentinel of a geo mapper.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub x: f32,
    pub y: f32,
}

impl Factor {
    pub const IDENTITY: Self = Self { x: 1.0, y: 1.0 };
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Either component is still at zero.
    pub fn is_sentinel(&self) -> bool {
        const EPS: f32 = 1e-6;
        self.x.abs() < EPS || self.y.abs() < EPS
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Component-wise mean of two factors.
    pub fn average(a: Factor, b: Factor) -> Factor {
        Factor::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
    }
}

impl Default for Factor {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Factor {
    type Output = Factor;

    fn mul(self, rhs: Factor) -> Factor {
        Factor::new(self.x * rhs.x, self.y * rhs.y)
    }
}

/// Angular window and pixel size of one camera's rectified output.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RoundViewSlice {
    pub angle_start: f32,
    pub angle_range: f32,
    pub width: u32,
    pub height: u32,
}

impl RoundViewSlice {
    pub fn angle_end(&self) -> f32 {
        self.angle_start + self.angle_range
    }
}

/// Where a camera's optical centre lands in its slice and in the output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CenterMark {
    pub slice_center_x: u32,
    pub out_center_x: u32,
}

/// Overlap between camera `idx` (left) and camera `idx + 1` (right).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OverlapInfo {
    /// Region of the left camera's slice.
    pub left: Rect,
    /// Region of the right camera's slice.
    pub right: Rect,
    /// Region of the output frame both blend into.
    pub out_area: Rect,
}

/// A slice region copied straight to the output without blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CopyArea {
    pub source: usize,
    pub in_area: Rect,
    pub out_area: Rect,
}

/// Circular ordering of camera slots `0..count`.
///
/// Pair `i` joins camera `i` (left contributor) and camera `(i + 1) % count`
/// (right contributor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraRing {
    count: usize,
}

impl CameraRing {
    pub fn new(count: usize) -> crate::Result<Self> {
        if !(MIN_CAMERAS..=MAX_CAMERAS).contains(&count) {
            return Err(crate::Error::InvalidInput(format!(
                "camera count {} outside [{}, {}]",
                count, MIN_CAMERAS, MAX_CAMERAS
            )));
        }
        Ok(Self { count })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn next(&self, idx: usize) -> usize {
        (idx + 1) % self.count
    }

    pub fn prev(&self, idx: usize) -> usize {
        (idx + self.count - 1) % self.count
    }

    /// Cameras `(left, right)` contributing to `pair`.
    pub fn pair_cameras(&self, pair: usize) -> (usize, usize) {
        (pair, self.next(pair))
    }

    /// Pairs a camera contributes to: `[as right contributor, as left contributor]`.
    pub fn pairs_of(&self, camera: usize) -> [usize; 2] {
        [self.prev(camera), camera]
    }

    pub fn cameras(&self) -> std::ops::Range<usize> {
        0..self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 4), 20);
        assert_eq!(align_up(17, 1), 17);
    }

    #[test]
    fn test_format_angle() {
        assert_eq!(format_angle(370.0), 10.0);
        assert_eq!(format_angle(-30.0), 330.0);
        assert_eq!(format_angle(0.0), 0.0);
    }

    #[test]
    fn test_ring_neighbors_wrap() {
        let ring = CameraRing::new(4).unwrap();
        assert_eq!(ring.next(3), 0);
        assert_eq!(ring.prev(0), 3);
        assert_eq!(ring.pair_cameras(3), (3, 0));
        assert_eq!(ring.pairs_of(0), [3, 0]);
        assert_eq!(ring.pairs_of(2), [1, 2]);
    }

    #[test]
    fn test_two_camera_ring_has_two_distinct_pairs() {
        let ring = CameraRing::new(2).unwrap();
        assert_eq!(ring.pairs_of(0), [1, 0]);
        assert_eq!(ring.pairs_of(1), [0, 1]);
        assert_eq!(ring.pair_cameras(1), (1, 0));
    }

    #[test]
    fn test_ring_rejects_bad_count() {
        assert!(CameraRing::new(1).is_err());
        assert!(CameraRing::new(7).is_err());
    }

    #[test]
    fn test_factor_ops() {
        let f = Factor::new(0.5, 0.25) * Factor::new(2.0, 1.0);
        assert_eq!(f, Factor::new(1.0, 0.25));
        assert!(Factor::ZERO.is_sentinel());
        assert!(Factor::new(1.0, 0.0).is_sentinel());
        assert!(!Factor::IDENTITY.is_sentinel());
        assert_eq!(
            Factor::average(Factor::new(1.0, 1.0), Factor::new(1.2, 1.0)),
            Factor::new(1.1, 1.0)
        );
    }

    #[test]
    fn test_rect_bounds() {
        let r = Rect::new(4, 0, 8, 10);
        assert_eq!(r.right(), 12);
        assert_eq!(r.center_x(), 8.0);
        assert!(r.fits_within(12, 10));
        assert!(!r.fits_within(11, 10));
        assert!(!Rect::new(-1, 0, 4, 4).fits_within(100, 100));
    }
}
