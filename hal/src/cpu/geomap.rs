use super::JobQueue;
use crate::backend::{Completion, GeoMapParams};
use crate::{Error, GeoMapper, Result};
use pano_core::{Factor, GeoMapTable, VideoFrame};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::sync::Arc;

/// Dewarps one camera's input into its slice through a coarse lookup table.
///
/// Output pixel `(x, y)` samples the table at
/// `(x - out_w/2) * factor.x + (tw-1)/2` (likewise for `y`), and the input
/// frame at the interpolated table entry.
pub struct CpuGeoMapper {
    camera: usize,
    output_size: (u32, u32),
    table: RwLock<Option<Arc<GeoMapTable>>>,
    queue: JobQueue,
}

impl CpuGeoMapper {
    pub(crate) fn new(camera: usize, output_size: (u32, u32), queue: JobQueue) -> Result<Self> {
        if output_size.0 == 0 || output_size.1 == 0 {
            return Err(Error::InvalidInput(format!(
                "geomap {} output size {}x{}",
                camera, output_size.0, output_size.1
            )));
        }
        Ok(Self {
            camera,
            output_size,
            table: RwLock::new(None),
            queue,
        })
    }
}

/// Factor that spreads the whole table across an output of `output_size`.
pub fn baseline_factor(table: &GeoMapTable, output_size: (u32, u32)) -> Factor {
    Factor::new(
        (table.width() - 1) as f32 / output_size.0 as f32,
        (table.height() - 1) as f32 / output_size.1 as f32,
    )
}

fn remap(input: &VideoFrame, output: &mut VideoFrame, table: &GeoMapTable, factor: Factor) {
    let width = output.width() as usize;
    let height = output.height() as usize;
    let channels = output.channels();
    let stride = output.stride();
    let out_cx = width as f32 / 2.0;
    let out_cy = height as f32 / 2.0;
    let table_cx = (table.width() - 1) as f32 / 2.0;
    let table_cy = (table.height() - 1) as f32 / 2.0;

    output.as_bytes_mut()[..stride * height]
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            let ty = (y as f32 - out_cy) * factor.y + table_cy;
            for x in 0..width {
                let tx = (x as f32 - out_cx) * factor.x + table_cx;
                let px = &mut row[x * channels..(x + 1) * channels];
                match table.sample(tx, ty) {
                    Some([ix, iy]) => {
                        input.sample_bilinear(ix, iy, px);
                    }
                    None => px.iter_mut().for_each(|v| *v = 0),
                }
            }
        });
}

impl GeoMapper for CpuGeoMapper {
    fn camera(&self) -> usize {
        self.camera
    }

    fn output_size(&self) -> (u32, u32) {
        self.output_size
    }

    fn set_lookup_table(&self, table: GeoMapTable) -> Result<()> {
        *self.table.write() = Some(Arc::new(table));
        Ok(())
    }

    fn baseline_factor(&self) -> Factor {
        match self.table.read().as_ref() {
            Some(table) => baseline_factor(table, self.output_size),
            None => Factor::ZERO,
        }
    }

    fn dispatch(&self, params: GeoMapParams, done: Completion<GeoMapParams>) -> Result<()> {
        let table = self
            .table
            .read()
            .clone()
            .ok_or_else(|| {
                Error::InvalidInput(format!("geomap {} has no lookup table", self.camera))
            })?;

        let factor = match params.factor {
            Some(f) if !f.is_sentinel() => f,
            Some(f) => {
                return Err(Error::InvalidInput(format!(
                    "geomap {} factor {:?} is not initialized",
                    self.camera, f
                )))
            }
            None => baseline_factor(&table, self.output_size),
        };

        let (out_w, out_h) = self.output_size;
        let camera = self.camera;
        self.queue.submit(params, done, move |p| {
            let input = p.input.read();
            let mut output = p.output.write();
            if output.width() != out_w || output.height() != out_h {
                return Err(Error::InvalidInput(format!(
                    "geomap {} output buffer {}x{}, expected {}x{}",
                    camera,
                    output.width(),
                    output.height(),
                    out_w,
                    out_h
                )));
            }
            if input.channels() != output.channels() {
                return Err(Error::InvalidInput(format!(
                    "geomap {} channel mismatch {} vs {}",
                    camera,
                    input.channels(),
                    output.channels()
                )));
            }

            remap(&input, &mut output, &table, factor);
            drop(output);
            drop(input);
            p.factor = Some(factor);
            Ok(())
        })
    }

    fn terminate(&self) {
        self.queue.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pano_core::FrameInfo;

    fn identity_table(w: u32, h: u32, step: f32) -> GeoMapTable {
        let mut points = Vec::new();
        for y in 0..h {
            for x in 0..w {
                points.push([x as f32 * step, y as f32 * step]);
            }
        }
        GeoMapTable::new(w, h, points).unwrap()
    }

    #[test]
    fn test_baseline_factor() {
        let table = identity_table(9, 5, 16.0);
        let f = baseline_factor(&table, (128, 64));
        assert!((f.x - 8.0 / 128.0).abs() < 1e-6);
        assert!((f.y - 4.0 / 64.0).abs() < 1e-6);
    }

    #[test]
    fn test_remap_uniform_input_fills_output() {
        let input = VideoFrame::filled(FrameInfo::new(160, 80, 3), &[10, 20, 30]);
        let mut output = VideoFrame::new(FrameInfo::new(128, 64, 3));
        let table = identity_table(9, 5, 16.0);
        let f = baseline_factor(&table, (128, 64));

        remap(&input, &mut output, &table, f);

        assert_eq!(output.pixel(0, 0), &[10, 20, 30]);
        assert_eq!(output.pixel(127, 63), &[10, 20, 30]);
        assert_eq!(output.pixel(64, 32), &[10, 20, 30]);
    }

    #[test]
    fn test_remap_outside_table_is_black() {
        let input = VideoFrame::filled(FrameInfo::new(64, 64, 1), &[200]);
        let mut output = VideoFrame::new(FrameInfo::new(32, 32, 1));
        let table = identity_table(3, 3, 16.0);

        // Doubling the baseline walks off both table edges near the borders.
        let f = baseline_factor(&table, (32, 32));
        remap(&input, &mut output, &table, Factor::new(f.x * 2.0, f.y * 2.0));

        assert_eq!(output.pixel(0, 16), &[0]);
        assert_eq!(output.pixel(16, 16), &[200]);
    }
}
