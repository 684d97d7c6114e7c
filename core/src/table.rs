use crate::{Error, Result};

/// Coarse dewarp lookup table.
///
/// Each cell holds the input-image position sampled for the corresponding
/// grid point of a camera slice. Geo mappers interpolate between cells.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoMapTable {
    width: u32,
    height: u32,
    points: Vec<[f32; 2]>,
}

impl GeoMapTable {
    pub fn new(width: u32, height: u32, points: Vec<[f32; 2]>) -> Result<Self> {
        if width < 2 || height < 2 {
            return Err(Error::InvalidInput(format!(
                "lookup table must be at least 2x2, got {}x{}",
                width, height
            )));
        }
        if points.len() != (width * height) as usize {
            return Err(Error::InvalidInput(format!(
                "lookup table expects {} points, got {}",
                width * height,
                points.len()
            )));
        }
        Ok(Self {
            width,
            height,
            points,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn points(&self) -> &[[f32; 2]] {
        &self.points
    }

    pub fn get(&self, x: u32, y: u32) -> [f32; 2] {
        self.points[(y * self.width + x) as usize]
    }

    /// Bilinear lookup at a fractional table position, `None` outside the grid.
    pub fn sample(&self, tx: f32, ty: f32) -> Option<[f32; 2]> {
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        if !(tx >= 0.0 && ty >= 0.0 && tx <= max_x && ty <= max_y) {
            return None;
        }

        let x0 = tx.floor() as u32;
        let y0 = ty.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = tx - x0 as f32;
        let fy = ty - y0 as f32;

        let lerp = |a: [f32; 2], b: [f32; 2], t: f32| {
            [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t]
        };
        let top = lerp(self.get(x0, y0), self.get(x1, y0), fx);
        let bottom = lerp(self.get(x0, y1), self.get(x1, y1), fx);
        Some(lerp(top, bottom, fy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: u32, height: u32) -> GeoMapTable {
        let points = (0..height)
            .flat_map(|y| (0..width).map(move |x| [x as f32 * 10.0, y as f32 * 10.0]))
            .collect();
        GeoMapTable::new(width, height, points).unwrap()
    }

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(GeoMapTable::new(1, 4, vec![[0.0; 2]; 4]).is_err());
        assert!(GeoMapTable::new(2, 2, vec![[0.0; 2]; 3]).is_err());
    }

    #[test]
    fn test_sample_interpolates() {
        let t = ramp(3, 3);
        assert_eq!(t.sample(0.5, 1.5), Some([5.0, 15.0]));
        assert_eq!(t.sample(2.0, 2.0), Some([20.0, 20.0]));
        assert_eq!(t.sample(2.1, 0.0), None);
        assert_eq!(t.sample(-0.1, 0.0), None);
    }
}
