//! Lookup tables that map slice positions back into fisheye input images.

use crate::config::MAP_FACTOR;
use crate::error::{Result, StitchError};
use nalgebra::Vector3;
use pano_core::{format_angle, BowlConfig, CameraInfo, GeoMapTable, RoundViewSlice};
use rayon::prelude::*;

/// Table grid for a slice: one entry per `MAP_FACTOR` pixels, at least 2x2.
pub fn table_size(slice: &RoundViewSlice) -> (u32, u32) {
    ((slice.width / MAP_FACTOR).max(2), (slice.height / MAP_FACTOR).max(2))
}

/// Builds one camera's dewarp table once, at configuration time.
pub trait TableGenerator: Send + Sync {
    fn generate(
        &self,
        camera: usize,
        info: &CameraInfo,
        slice: &RoundViewSlice,
        bowl: &BowlConfig,
        table_size: (u32, u32),
    ) -> Result<GeoMapTable>;
}

/// Angular window `(start, end)` of a slice on the bowl, with `start < end`.
pub fn bowl_angle_window(slice: &RoundViewSlice) -> (f32, f32) {
    let mut start = slice.angle_start;
    let end = format_angle(start + slice.angle_range);
    if end < start {
        start -= 360.0;
    }
    (start, end)
}

/// Projects slices onto the bowl and back through a polynomial fisheye model.
///
/// Slice columns sweep the bowl angle window left to right. The top
/// `wall_ratio` of the rows climbs down the elliptical wall from `wall_height`
/// to the ground; the remaining rows walk `ground_length` inward on the ground.
///
/// Camera frame: optical axis `+x`, image right `+y`, image down `-z`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolyBowlDewarp;

impl PolyBowlDewarp {
    /// Ellipse radius of the bowl at height `z` along world angle `theta` (radians).
    fn wall_radius(bowl: &BowlConfig, z: f32, theta: f32) -> f32 {
        let dz = (z - bowl.center_z) / bowl.c;
        let s = (1.0 - dz * dz).max(0.0).sqrt();
        let (a, b) = (bowl.a * s, bowl.b * s);
        if a <= f32::EPSILON || b <= f32::EPSILON {
            return 0.0;
        }
        let (sin, cos) = theta.sin_cos();
        1.0 / ((cos * cos) / (a * a) + (sin * sin) / (b * b)).sqrt()
    }

    fn world_point(bowl: &BowlConfig, theta: f32, row_frac: f32) -> Vector3<f32> {
        let wall_ratio = bowl.wall_ratio();
        let (sin, cos) = theta.sin_cos();
        if row_frac <= wall_ratio && wall_ratio > 0.0 {
            let z = bowl.wall_height * (1.0 - row_frac / wall_ratio);
            let r = Self::wall_radius(bowl, z, theta);
            Vector3::new(r * cos, r * sin, z)
        } else {
            let g = if wall_ratio < 1.0 {
                (row_frac - wall_ratio) / (1.0 - wall_ratio)
            } else {
                0.0
            };
            let r = (Self::wall_radius(bowl, 0.0, theta) - g * bowl.ground_length).max(0.0);
            Vector3::new(r * cos, r * sin, 0.0)
        }
    }

    fn project(info: &CameraInfo, world: &Vector3<f32>) -> [f32; 2] {
        let p = info.extrinsic.world_to_camera(world);
        let norm = p.norm();
        let intr = &info.intrinsic;
        if norm <= f32::EPSILON {
            return [intr.cx, intr.cy];
        }

        let theta = (p.x / norm).clamp(-1.0, 1.0).acos();
        let (ux, uy) = (p.y, -p.z);
        let lateral = (ux * ux + uy * uy).sqrt();
        if lateral <= f32::EPSILON {
            return [intr.cx, intr.cy];
        }
        let r = intr.radius_for_angle(theta);
        let (dx, dy) = (ux / lateral, uy / lateral);
        [intr.cx + r * dx + intr.skew * r * dy, intr.cy + r * dy]
    }
}

impl TableGenerator for PolyBowlDewarp {
    fn generate(
        &self,
        camera: usize,
        info: &CameraInfo,
        slice: &RoundViewSlice,
        bowl: &BowlConfig,
        table_size: (u32, u32),
    ) -> Result<GeoMapTable> {
        let (tw, th) = table_size;
        if tw < 2 || th < 2 {
            return Err(StitchError::Config(format!(
                "camera {} table {}x{} too small",
                camera, tw, th
            )));
        }
        let (start, end) = bowl_angle_window(slice);

        let mut points = vec![[0.0f32; 2]; (tw * th) as usize];
        points
            .par_chunks_mut(tw as usize)
            .enumerate()
            .for_each(|(row, out)| {
                let row_frac = row as f32 / (th - 1) as f32;
                for (col, pt) in out.iter_mut().enumerate() {
                    let angle = start + (end - start) * col as f32 / (tw - 1) as f32;
                    let world = Self::world_point(bowl, angle.to_radians(), row_frac);
                    *pt = Self::project(info, &world);
                }
            });

        tracing::debug!(camera, tw, th, start, end, "bowl dewarp table generated");
        Ok(GeoMapTable::new(tw, th, points)?)
    }
}

/// Spreads the table evenly over the whole input frame.
///
/// For inputs that are already rectified, or synthetic test rigs.
#[derive(Debug, Clone, Copy, Default)]
pub struct StretchTable;

impl TableGenerator for StretchTable {
    fn generate(
        &self,
        camera: usize,
        info: &CameraInfo,
        _slice: &RoundViewSlice,
        _bowl: &BowlConfig,
        table_size: (u32, u32),
    ) -> Result<GeoMapTable> {
        let (tw, th) = table_size;
        let (iw, ih) = (info.intrinsic.width, info.intrinsic.height);
        if tw < 2 || th < 2 || iw == 0 || ih == 0 {
            return Err(StitchError::Config(format!(
                "camera {} cannot stretch {}x{} table over {}x{} input",
                camera, tw, th, iw, ih
            )));
        }

        let sx = (iw - 1) as f32 / (tw - 1) as f32;
        let sy = (ih - 1) as f32 / (th - 1) as f32;
        let points = (0..th)
            .flat_map(|y| (0..tw).map(move |x| [x as f32 * sx, y as f32 * sy]))
            .collect();
        Ok(GeoMapTable::new(tw, th, points)?)
    }
}
