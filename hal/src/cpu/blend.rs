use super::JobQueue;
use crate::backend::{BlendParams, BlendSetup, Completion};
use crate::{Blender, Error, Result};
use pano_core::{Rect, VideoFrame};

/// Feathers the overlap of two adjacent slices into the output merge window.
///
/// Column `i` of a window `w` wide weighs the right contributor by `(i + 0.5) / w`.
pub struct CpuBlender {
    pair: usize,
    setup: BlendSetup,
    queue: JobQueue,
}

impl CpuBlender {
    pub(crate) fn new(pair: usize, setup: BlendSetup, queue: JobQueue) -> Result<Self> {
        setup.validate()?;
        Ok(Self { pair, setup, queue })
    }
}

fn feather(
    left: &VideoFrame,
    right: &VideoFrame,
    output: &mut VideoFrame,
    setup: &BlendSetup,
) -> Result<()> {
    let check = |frame: &VideoFrame, area: &Rect, what: &str| {
        if !area.fits_within(frame.width(), frame.height()) {
            return Err(Error::InvalidInput(format!(
                "{} area {:?} outside {}x{} buffer",
                what,
                area,
                frame.width(),
                frame.height()
            )));
        }
        if frame.channels() != output.channels() {
            return Err(Error::InvalidInput(format!(
                "{} has {} channels, output has {}",
                what,
                frame.channels(),
                output.channels()
            )));
        }
        Ok(())
    };
    check(left, &setup.left_area, "left")?;
    check(right, &setup.right_area, "right")?;
    let window = setup.merge_window;
    if !window.fits_within(output.width(), output.height()) {
        return Err(Error::InvalidInput(format!(
            "merge window {:?} outside {}x{} output",
            window,
            output.width(),
            output.height()
        )));
    }

    let c = output.channels();
    let w = window.width as usize;
    for row in 0..window.height {
        let l = left.row((setup.left_area.pos_y + row) as u32);
        let r = right.row((setup.right_area.pos_y + row) as u32);
        let l_off = setup.left_area.pos_x as usize * c;
        let r_off = setup.right_area.pos_x as usize * c;
        let o_off = window.pos_x as usize * c;
        let out = output.row_mut((window.pos_y + row) as u32);

        for i in 0..w {
            let wgt = (i as f32 + 0.5) / w as f32;
            for ch in 0..c {
                let a = l[l_off + i * c + ch] as f32;
                let b = r[r_off + i * c + ch] as f32;
                out[o_off + i * c + ch] = (a * (1.0 - wgt) + b * wgt).round() as u8;
            }
        }
    }
    Ok(())
}

impl Blender for CpuBlender {
    fn pair(&self) -> usize {
        self.pair
    }

    fn setup(&self) -> &BlendSetup {
        &self.setup
    }

    fn dispatch(&self, params: BlendParams, done: Completion<BlendParams>) -> Result<()> {
        let setup = self.setup;
        self.queue.submit(params, done, move |p| {
            let left = p.left.read();
            let right = p.right.read();
            let mut output = p.output.write();
            feather(&left, &right, &mut output, &setup)
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

    fn setup(window: Rect, left: Rect, right: Rect) -> BlendSetup {
        BlendSetup {
            output_size: (64, 8),
            merge_window: window,
            left_area: left,
            right_area: right,
        }
    }

    #[test]
    fn test_feather_ramps_left_to_right() {
        let left = VideoFrame::filled(FrameInfo::new(32, 8, 1), &[0]);
        let right = VideoFrame::filled(FrameInfo::new(32, 8, 1), &[200]);
        let mut out = VideoFrame::new(FrameInfo::new(64, 8, 1));
        let s = setup(Rect::new(10, 0, 10, 8), Rect::new(22, 0, 10, 8), Rect::new(0, 0, 10, 8));

        feather(&left, &right, &mut out, &s).unwrap();

        assert_eq!(out.pixel(10, 0), &[10]);
        assert_eq!(out.pixel(19, 7), &[190]);
        assert_eq!(out.pixel(9, 0), &[0]);
        assert_eq!(out.pixel(20, 0), &[0]);
    }

    #[test]
    fn test_equal_inputs_blend_to_same_value() {
        let left = VideoFrame::filled(FrameInfo::new(16, 4, 3), &[7, 77, 177]);
        let right = left.clone();
        let mut out = VideoFrame::new(FrameInfo::new(64, 8, 3));
        let s = setup(Rect::new(0, 0, 16, 4), Rect::new(0, 0, 16, 4), Rect::new(0, 0, 16, 4));

        feather(&left, &right, &mut out, &s).unwrap();

        for x in 0..16 {
            assert_eq!(out.pixel(x, 3), &[7, 77, 177]);
        }
    }

    #[test]
    fn test_setup_rejects_mismatched_areas() {
        let s = setup(Rect::new(0, 0, 16, 4), Rect::new(0, 0, 8, 4), Rect::new(0, 0, 16, 4));
        assert!(s.validate().is_err());
        let s = setup(Rect::new(60, 0, 16, 4), Rect::new(0, 0, 16, 4), Rect::new(0, 0, 16, 4));
        assert!(s.validate().is_err());
    }
}
