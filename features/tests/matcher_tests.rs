use image::{GrayImage, Luma};
use pano_features::{fast_detect, DefaultFeatureMatch, FeatureMatch, FmConfig};

const BLOCK: i64 = 8;

fn block_value(bx: i64, by: i64) -> u8 {
    let mut h = (bx.wrapping_mul(374_761_393) ^ by.wrapping_mul(668_265_263)) as u64;
    h = (h ^ (h >> 13)).wrapping_mul(1_274_126_177);
    ((h >> 16) & 0xff) as u8
}

/// Random block texture, with content moved `shift` pixels to the right.
fn texture(width: u32, height: u32, shift: i64) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let sx = x as i64 - shift;
        Luma([block_value(sx.div_euclid(BLOCK), (y as i64).div_euclid(BLOCK))])
    })
}

fn strict() -> FmConfig {
    FmConfig {
        max_track_error: 4.0,
        ..FmConfig::default()
    }
}

#[test]
fn test_texture_has_corners() {
    let img = texture(200, 48, 0);
    assert!(fast_detect(&img, 20, 200).len() >= 4);
}

#[test]
fn test_measures_small_shift_scaled_by_offset_factor() {
    let mut fm = DefaultFeatureMatch::new(strict());
    let offset = fm.match_offset(&texture(200, 48, 0), &texture(200, 48, 6)).unwrap();

    assert!((fm.mean_offset() - 6.0).abs() < 1e-3);
    assert!((offset - 4.8).abs() < 1e-3);
    assert!(fm.valid_count() >= 4);
}

#[test]
fn test_negative_shift() {
    let mut fm = DefaultFeatureMatch::new(strict());
    let offset = fm.match_offset(&texture(200, 48, 0), &texture(200, 48, -10)).unwrap();
    assert!((offset + 8.0).abs() < 1e-3);
}

#[test]
fn test_identical_crops_give_zero_offset() {
    let mut fm = DefaultFeatureMatch::new(strict());
    let img = texture(200, 48, 0);
    assert_eq!(fm.match_offset(&img, &img).unwrap(), 0.0);
    assert!(fm.valid_count() >= 4);
}

#[test]
fn test_large_shift_is_clamped() {
    let mut fm = DefaultFeatureMatch::new(strict());
    let offset = fm.match_offset(&texture(200, 48, 0), &texture(200, 48, 40)).unwrap();
    assert_eq!(offset, 24.0);
}

#[test]
fn test_featureless_crop_gives_zero() {
    let mut fm = DefaultFeatureMatch::default();
    let flat = GrayImage::from_pixel(200, 48, Luma([128]));
    assert_eq!(fm.match_offset(&flat, &flat).unwrap(), 0.0);
    assert_eq!(fm.valid_count(), 0);
}

#[test]
fn test_min_corners_gate() {
    let mut fm = DefaultFeatureMatch::new(strict().with_min_corners(100_000));
    let offset = fm.match_offset(&texture(200, 48, 0), &texture(200, 48, 6)).unwrap();
    assert_eq!(offset, 0.0);
}

#[test]
fn test_config_round_trips_through_json() {
    let cfg = FmConfig::default().with_offset_factor(0.5);
    let json = serde_json::to_string(&cfg).unwrap();
    let back: FmConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, cfg);

    let partial: FmConfig = serde_json::from_str(r#"{"min_corners": 9}"#).unwrap();
    assert_eq!(partial.min_corners, 9);
    assert_eq!(partial.stitch_min_width, 136);
}
