//! Slice, overlap and copy geometry of a camera ring.

use crate::error::{Result, StitchError};
use pano_core::{
    align_up, format_angle, CameraRing, CenterMark, CopyArea, OverlapInfo, Rect, RoundViewSlice,
};
use serde::{Deserialize, Serialize};

/// Everything the pipeline needs to know about where pixels go.
///
/// Overlap `i` joins camera `i` (left) and camera `(i + 1) % N` (right).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingLayout {
    pub slices: Vec<RoundViewSlice>,
    pub centers: Vec<CenterMark>,
    pub overlaps: Vec<OverlapInfo>,
    pub copy_areas: Vec<CopyArea>,
}

impl RingLayout {
    /// Lay `viewpoint_ranges.len()` cameras evenly around the output.
    ///
    /// Camera `i` is centred at `i * 360 / N` degrees and output column 0 is
    /// camera 0's centre, so camera 0's exclusive area wraps across the output edge.
    pub fn estimate(
        output_size: (u32, u32),
        viewpoint_ranges: &[f32],
        slice_alignment: u32,
    ) -> Result<Self> {
        let ring = CameraRing::new(viewpoint_ranges.len())
            .map_err(|e| StitchError::Config(e.to_string()))?;
        let n = ring.len();
        let (out_w, out_h) = output_size;
        if out_w == 0 || out_h == 0 {
            return Err(StitchError::Config("output size was not set".into()));
        }
        let w = out_w as i32;

        let mut slices = Vec::with_capacity(n);
        let mut centers = Vec::with_capacity(n);
        for (i, &range) in viewpoint_ranges.iter().enumerate() {
            if !(range > 0.0 && range < 360.0) {
                return Err(StitchError::Config(format!(
                    "camera {} viewpoint range {} out of (0, 360)",
                    i, range
                )));
            }
            let center_angle = i as f32 * 360.0 / n as f32;
            let width = align_up((range / 360.0 * out_w as f32).round() as u32, slice_alignment);
            slices.push(RoundViewSlice {
                angle_start: format_angle(center_angle - range / 2.0),
                angle_range: range,
                width,
                height: out_h,
            });
            centers.push(CenterMark {
                slice_center_x: width / 2,
                out_center_x: (i as u32 * out_w) / n as u32,
            });
        }

        // Output column of each slice's first pixel, unwrapped.
        let origin = |cam: usize, unwrap: i32| {
            centers[cam].out_center_x as i32 + unwrap - slices[cam].width as i32 / 2
        };

        let mut overlaps = Vec::with_capacity(n);
        // Unwrapped output span of every overlap, for copy areas.
        let mut spans = Vec::with_capacity(n);
        for pair in ring.cameras() {
            let (l, r) = ring.pair_cameras(pair);
            let r_unwrap = if r == 0 { w } else { 0 };
            let l_end = origin(l, 0) + slices[l].width as i32;
            let r_start = origin(r, r_unwrap);
            let overlap_w = l_end - r_start;
            if overlap_w <= 0 {
                return Err(StitchError::Geometry(format!(
                    "cameras {} and {} do not overlap ({} px gap)",
                    l, r, -overlap_w
                )));
            }

            let mid =
                (centers[l].out_center_x as i32 + centers[r].out_center_x as i32 + r_unwrap) / 2;
            let out_x = mid - overlap_w / 2;
            if out_x < 0 || out_x + overlap_w > w {
                return Err(StitchError::Geometry(format!(
                    "overlap {} crosses the output edge",
                    pair
                )));
            }
            let left = Rect::new(out_x - origin(l, 0), 0, overlap_w, out_h as i32);
            let right = Rect::new(out_x - r_start, 0, overlap_w, out_h as i32);
            overlaps.push(OverlapInfo {
                left,
                right,
                out_area: Rect::new(out_x, 0, overlap_w, out_h as i32),
            });
            spans.push((out_x, out_x + overlap_w));
        }

        let mut copy_areas = Vec::new();
        for cam in ring.cameras() {
            let prev = ring.prev(cam);
            let (mut start, mut end) = (spans[prev].1, spans[cam].0);
            // Camera 0's previous overlap sits at the far end of the output.
            if cam == 0 {
                start -= w;
            }
            if end < start {
                return Err(StitchError::Geometry(format!(
                    "overlaps of camera {} intersect ({} px)",
                    cam,
                    start - end
                )));
            }
            if end == start {
                continue;
            }

            let in_start = start - origin(cam, 0);
            if start < 0 {
                let wrapped = -start;
                copy_areas.push(CopyArea {
                    source: cam,
                    in_area: Rect::new(in_start, 0, wrapped, out_h as i32),
                    out_area: Rect::new(w - wrapped, 0, wrapped, out_h as i32),
                });
                if end > 0 {
                    copy_areas.push(CopyArea {
                        source: cam,
                        in_area: Rect::new(in_start + wrapped, 0, end, out_h as i32),
                        out_area: Rect::new(0, 0, end, out_h as i32),
                    });
                }
            } else {
                if end > w {
                    end = w;
                }
                copy_areas.push(CopyArea {
                    source: cam,
                    in_area: Rect::new(in_start, 0, end - start, out_h as i32),
                    out_area: Rect::new(start, 0, end - start, out_h as i32),
                });
            }
        }

        let layout = Self {
            slices,
            centers,
            overlaps,
            copy_areas,
        };
        layout.validate(ring, output_size)?;
        tracing::debug!(cameras = n, copies = layout.copy_areas.len(), "ring layout estimated");
        Ok(layout)
    }

    pub fn camera_num(&self) -> usize {
        self.slices.len()
    }

    /// Check a layout, estimated or supplied, against the ring and output frame.
    pub fn validate(&self, ring: CameraRing, output_size: (u32, u32)) -> Result<()> {
        let n = ring.len();
        if self.slices.len() != n || self.centers.len() != n || self.overlaps.len() != n {
            return Err(StitchError::Config(format!(
                "layout has {} slices, {} centers, {} overlaps for {} cameras",
                self.slices.len(),
                self.centers.len(),
                self.overlaps.len(),
                n
            )));
        }
        for (i, s) in self.slices.iter().enumerate() {
            if s.width == 0 || s.height == 0 {
                return Err(StitchError::Config(format!("slice {} is empty", i)));
            }
            if self.centers[i].slice_center_x > s.width {
                return Err(StitchError::Config(format!("slice {} center outside slice", i)));
            }
        }

        let (out_w, out_h) = output_size;
        for (pair, o) in self.overlaps.iter().enumerate() {
            let (l, r) = ring.pair_cameras(pair);
            let fits = o.left.fits_within(self.slices[l].width, self.slices[l].height)
                && o.right.fits_within(self.slices[r].width, self.slices[r].height)
                && o.out_area.fits_within(out_w, out_h);
            if !fits {
                return Err(StitchError::Geometry(format!(
                    "overlap {} rectangles outside their frames",
                    pair
                )));
            }
            if !o.left.same_size(&o.out_area) || !o.right.same_size(&o.out_area) {
                return Err(StitchError::Geometry(format!(
                    "overlap {} rectangles differ in size",
                    pair
                )));
            }
        }

        for (i, c) in self.copy_areas.iter().enumerate() {
            if c.source >= n {
                return Err(StitchError::Config(format!(
                    "copy area {} source {} out of range",
                    i, c.source
                )));
            }
            let slice = &self.slices[c.source];
            if !c.in_area.fits_within(slice.width, slice.height)
                || !c.out_area.fits_within(out_w, out_h)
                || !c.in_area.same_size(&c.out_area)
            {
                return Err(StitchError::Geometry(format!("copy area {} invalid: {:?}", i, c)));
            }
        }
        Ok(())
    }

    /// Copy areas fed by `camera`'s slice.
    pub fn copies_from(&self, camera: usize) -> impl Iterator<Item = (usize, &CopyArea)> {
        self.copy_areas
            .iter()
            .enumerate()
            .filter(move |(_, c)| c.source == camera)
    }
}
