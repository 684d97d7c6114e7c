use crate::geometry::{align_up, Rect};
use crate::{Error, Result};
use image::{GrayImage, Luma, Rgb, RgbImage};

/// Layout of an interleaved 8-bit pixel buffer.
///
/// The backing store is padded to `aligned_width x aligned_height` so rows
/// start on the pitch a compute device expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub aligned_width: u32,
    pub aligned_height: u32,
    pub channels: u8,
}

impl FrameInfo {
    pub fn new(width: u32, height: u32, channels: u8) -> Self {
        Self::aligned(width, height, channels, 1, 1)
    }

    pub fn aligned(width: u32, height: u32, channels: u8, align_x: u32, align_y: u32) -> Self {
        Self {
            width,
            height,
            aligned_width: align_up(width, align_x),
            aligned_height: align_up(height, align_y),
            channels,
        }
    }

    pub fn stride(&self) -> usize {
        self.aligned_width as usize * self.channels as usize
    }

    pub fn byte_len(&self) -> usize {
        self.stride() * self.aligned_height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.channels == 0
    }
}

/// Owned interleaved frame: camera input, dewarped slice or stitched output.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    info: FrameInfo,
    data: Vec<u8>,
}

impl VideoFrame {
    pub fn new(info: FrameInfo) -> Self {
        Self {
            data: vec![0; info.byte_len()],
            info,
        }
    }

    pub fn filled(info: FrameInfo, pixel: &[u8]) -> Self {
        let mut frame = Self::new(info);
        frame.fill(pixel);
        frame
    }

    pub fn info(&self) -> FrameInfo {
        self.info
    }

    pub fn width(&self) -> u32 {
        self.info.width
    }

    pub fn height(&self) -> u32 {
        self.info.height
    }

    pub fn channels(&self) -> usize {
        self.info.channels as usize
    }

    pub fn stride(&self) -> usize {
        self.info.stride()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Visible pixels of row `y`, without padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride();
        &self.data[start..start + self.info.width as usize * self.channels()]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride();
        let len = self.info.width as usize * self.channels();
        &mut self.data[start..start + len]
    }

    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let c = self.channels();
        let start = y as usize * self.stride() + x as usize * c;
        &self.data[start..start + c]
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, value: &[u8]) {
        let c = self.channels();
        let start = y as usize * self.stride() + x as usize * c;
        self.data[start..start + c].copy_from_slice(&value[..c]);
    }

    pub fn fill(&mut self, pixel: &[u8]) {
        let full = Rect::new(0, 0, self.info.width as i32, self.info.height as i32);
        self.fill_rect(&full, pixel);
    }

    pub fn fill_rect(&mut self, rect: &Rect, pixel: &[u8]) {
        let c = self.channels();
        for y in rect.pos_y.max(0)..rect.bottom().min(self.info.height as i32) {
            let row = self.row_mut(y as u32);
            for x in rect.pos_x.max(0)..rect.right().min(row.len() as i32 / c as i32) {
                let start = x as usize * c;
                row[start..start + c].copy_from_slice(&pixel[..c]);
            }
        }
    }

    /// Bilinear sample at a fractional position.
    ///
    /// Returns `false` and writes zeros when the position falls outside the frame.
    pub fn sample_bilinear(&self, x: f32, y: f32, out: &mut [u8]) -> bool {
        let max_x = self.info.width as f32 - 1.0;
        let max_y = self.info.height as f32 - 1.0;
        if !(x >= 0.0 && y >= 0.0 && x <= max_x && y <= max_y) {
            out.iter_mut().for_each(|v| *v = 0);
            return false;
        }

        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.info.width - 1);
        let y1 = (y0 + 1).min(self.info.height - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let p00 = self.pixel(x0, y0);
        let p10 = self.pixel(x1, y0);
        let p01 = self.pixel(x0, y1);
        let p11 = self.pixel(x1, y1);
        for c in 0..self.channels().min(out.len()) {
            let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
            let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
            out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
        }
        true
    }

    /// Copy `src_rect` of `src` into `dst_rect` of `self`. Both rectangles must match in size.
    pub fn copy_rect_from(
        &mut self,
        src: &VideoFrame,
        src_rect: &Rect,
        dst_rect: &Rect,
    ) -> Result<()> {
        if src.channels() != self.channels() {
            return Err(Error::InvalidInput(format!(
                "channel mismatch: source {} vs destination {}",
                src.channels(),
                self.channels()
            )));
        }
        if !src_rect.same_size(dst_rect) {
            return Err(Error::InvalidGeometry(format!(
                "copy size mismatch: {:?} vs {:?}",
                src_rect, dst_rect
            )));
        }
        if !src_rect.fits_within(src.width(), src.height())
            || !dst_rect.fits_within(self.width(), self.height())
        {
            return Err(Error::InvalidGeometry(format!(
                "copy area out of bounds: {:?} -> {:?}",
                src_rect, dst_rect
            )));
        }

        let c = self.channels();
        let span = src_rect.width as usize * c;
        for row in 0..src_rect.height {
            let s = src.row((src_rect.pos_y + row) as u32);
            let s_start = src_rect.pos_x as usize * c;
            let d_start = dst_rect.pos_x as usize * c;
            let d = self.row_mut((dst_rect.pos_y + row) as u32);
            d[d_start..d_start + span].copy_from_slice(&s[s_start..s_start + span]);
        }
        Ok(())
    }

    /// Luma of a sub-rectangle, for feature matching.
    pub fn crop_luma(&self, rect: &Rect) -> Result<GrayImage> {
        if !rect.fits_within(self.width(), self.height()) {
            return Err(Error::InvalidGeometry(format!(
                "crop {:?} outside {}x{} frame",
                rect,
                self.width(),
                self.height()
            )));
        }

        let mut out = GrayImage::new(rect.width as u32, rect.height as u32);
        for y in 0..rect.height as u32 {
            for x in 0..rect.width as u32 {
                let p = self.pixel(rect.pos_x as u32 + x, rect.pos_y as u32 + y);
                out.put_pixel(x, y, Luma([luma(p)]));
            }
        }
        Ok(out)
    }

    pub fn from_gray_image(img: &GrayImage) -> Self {
        let mut frame = Self::new(FrameInfo::new(img.width(), img.height(), 1));
        for (x, y, p) in img.enumerate_pixels() {
            frame.put_pixel(x, y, &p.0);
        }
        frame
    }

    pub fn from_rgb_image(img: &RgbImage) -> Self {
        let mut frame = Self::new(FrameInfo::new(img.width(), img.height(), 3));
        for (x, y, p) in img.enumerate_pixels() {
            frame.put_pixel(x, y, &p.0);
        }
        frame
    }

    /// Convert to an RGB image; single-channel frames are replicated.
    pub fn to_rgb_image(&self) -> RgbImage {
        let mut out = RgbImage::new(self.width(), self.height());
        for y in 0..self.height() {
            for x in 0..self.width() {
                let p = self.pixel(x, y);
                let rgb = if p.len() >= 3 { [p[0], p[1], p[2]] } else { [p[0]; 3] };
                out.put_pixel(x, y, Rgb(rgb));
            }
        }
        out
    }
}

fn luma(p: &[u8]) -> u8 {
    if p.len() < 3 {
        return p[0];
    }
    ((p[0] as u32 * 77 + p[1] as u32 * 150 + p[2] as u32 * 29) >> 8) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_layout() {
        let info = FrameInfo::aligned(30, 10, 3, 16, 4);
        assert_eq!(info.aligned_width, 32);
        assert_eq!(info.aligned_height, 12);
        assert_eq!(info.stride(), 96);
        assert_eq!(VideoFrame::new(info).as_bytes().len(), 96 * 12);
    }

    #[test]
    fn test_fill_rect_and_row() {
        let mut f = VideoFrame::new(FrameInfo::aligned(8, 4, 1, 16, 4));
        f.fill_rect(&Rect::new(2, 1, 3, 2), &[9]);
        assert_eq!(f.row(0), &[0; 8]);
        assert_eq!(f.row(1), &[0, 0, 9, 9, 9, 0, 0, 0]);
        assert_eq!(f.pixel(4, 2), &[9]);
        assert_eq!(f.pixel(4, 3), &[0]);
    }

    #[test]
    fn test_bilinear_midpoint() {
        let mut f = VideoFrame::new(FrameInfo::new(2, 1, 1));
        f.put_pixel(0, 0, &[0]);
        f.put_pixel(1, 0, &[100]);
        let mut out = [0u8];
        assert!(f.sample_bilinear(0.5, 0.0, &mut out));
        assert_eq!(out[0], 50);
        assert!(!f.sample_bilinear(1.5, 0.0, &mut out));
        assert_eq!(out[0], 0);
    }

    #[test]
    fn test_copy_rect_validates() {
        let src = VideoFrame::filled(FrameInfo::new(4, 4, 3), &[1, 2, 3]);
        let mut dst = VideoFrame::new(FrameInfo::new(8, 4, 3));
        dst.copy_rect_from(&src, &Rect::new(0, 0, 4, 4), &Rect::new(4, 0, 4, 4))
            .unwrap();
        assert_eq!(dst.pixel(5, 2), &[1, 2, 3]);
        assert_eq!(dst.pixel(3, 2), &[0, 0, 0]);

        assert!(dst
            .copy_rect_from(&src, &Rect::new(0, 0, 4, 4), &Rect::new(6, 0, 4, 4))
            .is_err());
        assert!(dst
            .copy_rect_from(&src, &Rect::new(0, 0, 4, 4), &Rect::new(0, 0, 2, 4))
            .is_err());
    }

    #[test]
    fn test_crop_luma_of_gray_frame() {
        let mut f = VideoFrame::new(FrameInfo::new(4, 4, 1));
        f.put_pixel(2, 1, &[200]);
        let crop = f.crop_luma(&Rect::new(1, 1, 2, 2)).unwrap();
        assert_eq!(crop.dimensions(), (2, 2));
        assert_eq!(crop.get_pixel(1, 0)[0], 200);
    }
}
