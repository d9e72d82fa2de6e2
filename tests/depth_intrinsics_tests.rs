//! Depth conversion and calibration reference values

use sensorcast::{
    depth::{flip_vertical, linearize, DepthRange, EDGE_EPSILON},
    intrinsics::CameraIntrinsics,
};

#[cfg(test)]
mod depth_intrinsics_tests {
    use super::*;

    #[test]
    fn test_reversed_reference_values() {
        assert_eq!(linearize(0.0, 0.1, 100.0, true), 100.0);
        assert_eq!(linearize(1.0, 0.1, 100.0, true), 0.1);
    }

    #[test]
    fn test_standard_reference_values() {
        assert_eq!(linearize(0.0, 0.1, 100.0, false), 0.1);
        assert_eq!(linearize(1.0, 0.1, 100.0, false), 100.0);
    }

    #[test]
    fn test_round_trip_both_conventions() {
        for reversed in [false, true] {
            let range = DepthRange::new(0.5, 50.0, reversed).unwrap();
            for distance in [0.75f32, 1.0, 2.0, 5.0, 10.0] {
                let raw = range.encode(distance);
                let got = range.linearize(raw);
                assert!(
                    (got - distance).abs() < 1e-3 * distance,
                    "reversed={} distance={} got={}",
                    reversed,
                    distance,
                    got
                );
            }
        }
    }

    #[test]
    fn test_output_always_in_bounds() {
        let range = DepthRange::new(0.1, 100.0, false).unwrap();
        let mut samples: Vec<f32> = (0..=1000).map(|i| i as f32 / 1000.0).collect();
        samples.extend_from_slice(&[-1.0, 2.0, EDGE_EPSILON, 1.0 - EDGE_EPSILON, f32::NAN]);
        range.linearize_in_place(&mut samples);
        assert!(samples.iter().all(|&d| (0.1..=200.0).contains(&d)));
    }

    #[test]
    fn test_flip_then_flip_is_identity() {
        let original: Vec<f32> = (0..15).map(|i| i as f32).collect();
        let mut buf = original.clone();
        flip_vertical(&mut buf, 5, 3);
        assert_eq!(&buf[..5], &original[10..]);
        flip_vertical(&mut buf, 5, 3);
        assert_eq!(buf, original);
    }

    #[test]
    fn test_intrinsics_reference() {
        let k = CameraIntrinsics::from_fov(60.0, 16.0 / 9.0, 640, 360);
        let fy = 360.0 / (2.0 * 30f64.to_radians().tan());
        assert!((k.fy() - fy).abs() < 1e-9);
        assert_eq!(k.cx(), 320.0);
        assert_eq!(k.cy(), 180.0);
        assert_eq!(k.r, [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(k.p[3], 0.0);
        assert_eq!(k.distortion_model, "plumb_bob");
        assert!(k.d.iter().all(|&c| c == 0.0));
        // square pixels when the aspect matches the resolution
        assert!((k.fx() - k.fy()).abs() < 1e-6);
    }
}
