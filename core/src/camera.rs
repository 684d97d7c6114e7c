use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Fisheye intrinsics with a polynomial incidence-angle model.
///
/// The image radius of a ray at incidence `theta` is
/// `poly_coeff[0] + poly_coeff[1]*theta + poly_coeff[2]*theta^2 + ...`.
/// An empty polynomial falls back to the equidistant model derived from `fov`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicParameter {
    pub width: u32,
    pub height: u32,
    pub cx: f32,
    pub cy: f32,
    /// Field of view in degrees.
    pub fov: f32,
    pub skew: f32,
    #[serde(default)]
    pub poly_coeff: Vec<f32>,
}

impl IntrinsicParameter {
    pub fn equidistant(width: u32, height: u32, fov: f32) -> Self {
        Self {
            width,
            height,
            cx: width as f32 / 2.0,
            cy: height as f32 / 2.0,
            fov,
            skew: 0.0,
            poly_coeff: Vec::new(),
        }
    }

    /// Image radius in pixels for a ray at `theta` radians off the optical axis.
    pub fn radius_for_angle(&self, theta: f32) -> f32 {
        if self.poly_coeff.is_empty() {
            let half_fov = (self.fov / 2.0).to_radians().max(f32::EPSILON);
            let max_radius = self.width.min(self.height) as f32 / 2.0;
            return theta / half_fov * max_radius;
        }

        let mut acc = 0.0f32;
        let mut power = 1.0f32;
        for &c in &self.poly_coeff {
            acc += c * power;
            power *= theta;
        }
        acc
    }
}

/// Camera pose relative to the rig centre, millimetres and degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtrinsicParameter {
    pub trans_x: f32,
    pub trans_y: f32,
    pub trans_z: f32,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl ExtrinsicParameter {
    pub fn rotation(&self) -> Rotation3<f32> {
        Rotation3::from_euler_angles(
            self.roll.to_radians(),
            self.pitch.to_radians(),
            self.yaw.to_radians(),
        )
    }

    pub fn translation(&self) -> Vector3<f32> {
        Vector3::new(self.trans_x, self.trans_y, self.trans_z)
    }

    /// Move a rig-frame point into this camera's frame.
    pub fn world_to_camera(&self, point: &Vector3<f32>) -> Vector3<f32> {
        self.rotation().inverse() * (point - self.translation())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub intrinsic: IntrinsicParameter,
    pub extrinsic: ExtrinsicParameter,
    /// Horizontal view angle the camera contributes to the ring, degrees.
    pub viewpoint_range: f32,
}

impl CameraInfo {
    pub fn new(
        intrinsic: IntrinsicParameter,
        extrinsic: ExtrinsicParameter,
        viewpoint_range: f32,
    ) -> Self {
        Self {
            intrinsic,
            extrinsic,
            viewpoint_range,
        }
    }
}

/// Bowl projection surface: an elliptical wall standing on a ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BowlConfig {
    /// Semi-axis along x, mm.
    pub a: f32,
    /// Semi-axis along y, mm.
    pub b: f32,
    /// Semi-axis along z, mm.
    pub c: f32,
    pub angle_start: f32,
    pub angle_end: f32,
    pub center_z: f32,
    pub wall_height: f32,
    pub ground_length: f32,
}

impl BowlConfig {
    /// Share of a slice's height that shows the wall rather than the ground.
    pub fn wall_ratio(&self) -> f32 {
        let total = self.wall_height + self.ground_length;
        if total <= 0.0 {
            return 1.0;
        }
        self.wall_height / total
    }
}

impl Default for BowlConfig {
    fn default() -> Self {
        Self {
            a: 6060.0,
            b: 4388.0,
            c: 3300.0,
            angle_start: 0.0,
            angle_end: 360.0,
            center_z: 1500.0,
            wall_height: 3000.0,
            ground_length: 2000.0,
        }
    }
}
