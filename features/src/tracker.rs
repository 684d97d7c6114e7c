//! Horizontal patch tracking between two overlap crops.

use image::GrayImage;
use pano_core::KeyPoint;
use rayon::prelude::*;

/// Patch half-size; patches are `(2r+1)^2` pixels.
pub const PATCH_RADIUS: i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Track {
    pub from: KeyPoint,
    pub dx: i32,
    pub dy: i32,
    /// Mean absolute difference of the best patch.
    pub error: f32,
}

/// Search window around each corner.
#[derive(Debug, Clone, Copy)]
pub struct SearchWindow {
    pub max_dx: i32,
    pub max_dy: i32,
}

fn patch_sad(a: &GrayImage, ax: i32, ay: i32, b: &GrayImage, bx: i32, by: i32) -> u32 {
    let mut sad = 0u32;
    for oy in -PATCH_RADIUS..=PATCH_RADIUS {
        for ox in -PATCH_RADIUS..=PATCH_RADIUS {
            let va = a.get_pixel((ax + ox) as u32, (ay + oy) as u32)[0];
            let vb = b.get_pixel((bx + ox) as u32, (by + oy) as u32)[0];
            sad += va.abs_diff(vb) as u32;
        }
    }
    sad
}

fn fits(img: &GrayImage, x: i32, y: i32) -> bool {
    x - PATCH_RADIUS >= 0
        && y - PATCH_RADIUS >= 0
        && x + PATCH_RADIUS < img.width() as i32
        && y + PATCH_RADIUS < img.height() as i32
}

/// Best SAD match of `corner`'s patch in `to`, `None` when no candidate fits.
pub fn track_corner(
    from: &GrayImage,
    to: &GrayImage,
    corner: &KeyPoint,
    window: SearchWindow,
) -> Option<Track> {
    let cx = corner.x.round() as i32;
    let cy = corner.y.round() as i32;
    if !fits(from, cx, cy) {
        return None;
    }

    let mut best: Option<(u32, i32, i32)> = None;
    for dy in -window.max_dy..=window.max_dy {
        for dx in -window.max_dx..=window.max_dx {
            let (tx, ty) = (cx + dx, cy + dy);
            if !fits(to, tx, ty) {
                continue;
            }
            let sad = patch_sad(from, cx, cy, to, tx, ty);
            // Prefer the smaller displacement on ties.
            let better = match best {
                None => true,
                Some((b, bdx, bdy)) => {
                    sad < b || (sad == b && dx.abs() + dy.abs() < bdx.abs() + bdy.abs())
                }
            };
            if better {
                best = Some((sad, dx, dy));
            }
        }
    }

    let area = ((2 * PATCH_RADIUS + 1) * (2 * PATCH_RADIUS + 1)) as f32;
    best.map(|(sad, dx, dy)| Track {
        from: *corner,
        dx,
        dy,
        error: sad as f32 / area,
    })
}

pub fn track_corners(
    from: &GrayImage,
    to: &GrayImage,
    corners: &[KeyPoint],
    window: SearchWindow,
) -> Vec<Track> {
    corners
        .par_iter()
        .filter_map(|kp| track_corner(from, to, kp, window))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn textured(width: u32, height: u32, shift: i32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let sx = x as i32 - shift;
            let v = (sx.wrapping_mul(37) ^ (y as i32).wrapping_mul(91)).rem_euclid(251);
            Luma([v as u8])
        })
    }

    #[test]
    fn test_tracks_pure_horizontal_shift() {
        let a = textured(64, 32, 0);
        let b = textured(64, 32, 5);
        let window = SearchWindow {
            max_dx: 10,
            max_dy: 2,
        };
        let t = track_corner(&a, &b, &KeyPoint::new(20.0, 16.0), window).unwrap();
        assert_eq!((t.dx, t.dy), (5, 0));
        assert_eq!(t.error, 0.0);
    }

    #[test]
    fn test_corner_near_border_is_skipped() {
        let a = textured(32, 32, 0);
        let window = SearchWindow {
            max_dx: 4,
            max_dy: 0,
        };
        assert!(track_corner(&a, &a, &KeyPoint::new(1.0, 16.0), window).is_none());
    }
}
