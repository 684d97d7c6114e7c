use panostitch::core::{FrameInfo, VideoFrame};
use panostitch::stitch::StretchTable;
use panostitch::{Stitcher, StitcherConfig};

#[test]
fn test_init_thread_pool_is_idempotent() {
    let first = panostitch::init_thread_pool(Some(2));
    let second = panostitch::init_thread_pool(Some(8));
    assert_eq!(first, second);
}

#[test]
fn test_facade_stitches_a_ring() {
    let config = StitcherConfig::new(3, 576, 32).with_input_size(32, 32);
    let stitcher = Stitcher::builder(config)
        .with_table_generator(StretchTable)
        .build()
        .unwrap();
    assert_eq!(stitcher.backend_name(), "CPU");

    let inputs = (0..3)
        .map(|_| VideoFrame::filled(FrameInfo::new(32, 32, 3), &[80, 80, 80]))
        .collect();
    let out = stitcher.stitch(inputs).unwrap();
    assert_eq!(out.image.width(), 576);
    assert!(out.image.pixel(0, 0).iter().all(|&v| v == 80));
    assert!(out.image.pixel(300, 31).iter().all(|&v| v == 80));
}
