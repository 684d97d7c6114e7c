use image::GrayImage;
use pano_core::{KeyPoint, KeyPoints};
use rayon::prelude::*;

const CIRCLE_OFFSETS: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Contiguous ring pixels required for a corner.
pub const FAST_ARC: u32 = 9;

/// FAST-9 corners: a contiguous arc of at least 9 of the 16 ring pixels all
/// brighter or all darker than the centre by `threshold`.
/// Keeps the `max_keypoints` strongest by summed arc contrast.
pub fn fast_detect(image: &GrayImage, threshold: u8, max_keypoints: usize) -> KeyPoints {
    let width = image.width() as i32;
    let height = image.height() as i32;
    if width < 7 || height < 7 {
        return KeyPoints::new();
    }

    let keypoints: Vec<KeyPoint> = (3..height - 3)
        .into_par_iter()
        .flat_map_iter(|y| {
            (3..width - 3).filter_map(move |x| {
                let (arc, contrast) = ring_test(image, x, y, threshold);
                (arc >= FAST_ARC)
                    .then(|| KeyPoint::new(x as f32, y as f32).with_response(contrast as f32))
            })
        })
        .collect();

    let mut kps = KeyPoints { keypoints };
    kps.retain_strongest(max_keypoints);
    kps
}

/// Longest contiguous arc of ring pixels passing the test on either side.
pub fn fast_score(image: &GrayImage, x: i32, y: i32, threshold: u8) -> u32 {
    ring_test(image, x, y, threshold).0
}

fn longest_run(flags: &[bool; 16]) -> u32 {
    let mut best = 0u32;
    let mut run = 0u32;
    // Walk the ring twice so runs crossing index 0 are counted whole.
    for i in 0..32 {
        if flags[i % 16] {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best.min(16)
}

fn ring_test(image: &GrayImage, x: i32, y: i32, threshold: u8) -> (u32, u32) {
    let p = image.get_pixel(x as u32, y as u32)[0];

    let mut bright = [false; 16];
    let mut dark = [false; 16];
    let mut bright_sum = 0u32;
    let mut dark_sum = 0u32;

    for (i, &(dx, dy)) in CIRCLE_OFFSETS.iter().enumerate() {
        let px = x + dx;
        let py = y + dy;
        if px < 0 || py < 0 || px >= image.width() as i32 || py >= image.height() as i32 {
            continue;
        }

        let val = image.get_pixel(px as u32, py as u32)[0];
        if val > p.saturating_add(threshold) {
            bright[i] = true;
            bright_sum += (val - p) as u32;
        } else if val < p.saturating_sub(threshold) {
            dark[i] = true;
            dark_sum += (p - val) as u32;
        }
    }

    let bright_arc = longest_run(&bright);
    let dark_arc = longest_run(&dark);
    if bright_arc >= dark_arc {
        (bright_arc, bright_sum)
    } else {
        (dark_arc, dark_sum)
    }
}
