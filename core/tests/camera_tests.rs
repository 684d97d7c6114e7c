use nalgebra::Vector3;
use pano_core::{BowlConfig, CameraInfo, ExtrinsicParameter, IntrinsicParameter};

#[test]
fn test_yawed_camera_sees_rotated_axis() {
    let ext = ExtrinsicParameter {
        yaw: 90.0,
        ..Default::default()
    };

    // A point on the rig's +y axis lies on the camera's +x axis after a 90 degree yaw.
    let p = ext.world_to_camera(&Vector3::new(0.0, 1.0, 0.0));
    assert!((p.x - 1.0).abs() < 1e-5);
    assert!(p.y.abs() < 1e-5);
    assert!(p.z.abs() < 1e-5);
}

#[test]
fn test_translation_is_removed_before_rotation() {
    let ext = ExtrinsicParameter {
        trans_x: 100.0,
        ..Default::default()
    };
    let p = ext.world_to_camera(&Vector3::new(100.0, 0.0, 5.0));
    assert!((p.norm() - 5.0).abs() < 1e-5);
}

#[test]
fn test_camera_info_json_roundtrip() {
    let info = CameraInfo::new(
        IntrinsicParameter::equidistant(1280, 800, 190.0),
        ExtrinsicParameter {
            yaw: 45.0,
            ..Default::default()
        },
        120.0,
    );
    let json = serde_json::to_string(&info).unwrap();
    let back: CameraInfo = serde_json::from_str(&json).unwrap();
    assert_eq!(info, back);

    let json = serde_json::to_string(&BowlConfig::default()).unwrap();
    let bowl: BowlConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(bowl, BowlConfig::default());
}
