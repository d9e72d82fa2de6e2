//! Pinhole camera intrinsics from field of view
//!
//! Rendered cameras have no lens distortion and no extrinsic calibration, so
//! the model is a plain pinhole with the principal point at the image centre.

use serde::{Deserialize, Serialize};

/// Distortion model name reported alongside the (all-zero) coefficients
pub const DISTORTION_MODEL: &str = "plumb_bob";

/// Number of plumb_bob distortion coefficients
pub const DISTORTION_COEFFS: usize = 5;

/// Intrinsic calibration of one rendered camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub width: u32,
    pub height: u32,
    /// Row-major 3x3 camera matrix
    pub k: [f64; 9],
    /// Row-major 3x3 rectification rotation (identity)
    pub r: [f64; 9],
    /// Row-major 3x4 projection matrix `[K | 0]`
    pub p: [f64; 12],
    pub distortion_model: String,
    pub d: Vec<f64>,
}

impl CameraIntrinsics {
    /// Derive intrinsics from a vertical field of view (degrees) and aspect ratio
    pub fn from_fov(fov_y_deg: f64, aspect: f64, width: u32, height: u32) -> Self {
        let fov_y = fov_y_deg.to_radians();
        let fov_x = 2.0 * ((fov_y / 2.0).tan() * aspect).atan();

        let fy = height as f64 / (2.0 * (fov_y / 2.0).tan());
        let fx = width as f64 / (2.0 * (fov_x / 2.0).tan());
        let cx = width as f64 / 2.0;
        let cy = height as f64 / 2.0;

        Self {
            width,
            height,
            k: [fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0],
            r: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            p: [fx, 0.0, cx, 0.0, 0.0, fy, cy, 0.0, 0.0, 0.0, 1.0, 0.0],
            distortion_model: DISTORTION_MODEL.to_string(),
            d: vec![0.0; DISTORTION_COEFFS],
        }
    }

    /// Same as [`from_fov`](Self::from_fov) with the aspect taken from the resolution
    pub fn for_resolution(fov_y_deg: f64, width: u32, height: u32) -> Self {
        Self::from_fov(fov_y_deg, aspect_ratio(width, height), width, height)
    }

    /// Calibration of an image of `output` size produced by stretching the
    /// camera's `native` frame
    pub fn for_output(fov_y_deg: f64, native: (u32, u32), output: (u32, u32)) -> Self {
        Self::from_fov(fov_y_deg, aspect_ratio(native.0, native.1), output.0, output.1)
    }

    pub fn fx(&self) -> f64 {
        self.k[0]
    }

    pub fn fy(&self) -> f64 {
        self.k[4]
    }

    pub fn cx(&self) -> f64 {
        self.k[2]
    }

    pub fn cy(&self) -> f64 {
        self.k[5]
    }

    /// Horizontal field of view in degrees implied by `fx`
    pub fn fov_x_deg(&self) -> f64 {
        (2.0 * (self.width as f64 / (2.0 * self.fx())).atan()).to_degrees()
    }
}

/// Width over height, 1.0 for a zero height
pub fn aspect_ratio(width: u32, height: u32) -> f64 {
    if height == 0 {
        1.0
    } else {
        width as f64 / height as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_values() {
        let k = CameraIntrinsics::from_fov(60.0, 16.0 / 9.0, 640, 360);
        let expected_fy = 360.0 / (2.0 * 30f64.to_radians().tan());

        assert!((k.fy() - expected_fy).abs() < 1e-3);
        assert!((k.cx() - 320.0).abs() < 1e-3);
        assert!((k.cy() - 180.0).abs() < 1e-3);
        // square pixels when the aspect matches the resolution
        assert!((k.fx() - k.fy()).abs() < 1e-3);
    }

    #[test]
    fn test_stretched_output_keeps_camera_aspect() {
        let stretched = CameraIntrinsics::for_output(60.0, (640, 480), (100, 50));
        let native = CameraIntrinsics::for_resolution(60.0, 640, 480);

        // horizontal FOV is the camera's, not the output's
        assert!((stretched.fov_x_deg() - native.fov_x_deg()).abs() < 1e-9);
        assert!((stretched.fx() - 64.951905).abs() < 1e-5);
        assert!((stretched.fy() - 43.301270).abs() < 1e-5);
        assert_eq!(aspect_ratio(640, 0), 1.0);
    }

    #[test]
    fn test_projection_layout() {
        let k = CameraIntrinsics::from_fov(45.0, 4.0 / 3.0, 800, 600);
        assert_eq!(k.p[0], k.k[0]);
        assert_eq!(k.p[2], k.k[2]);
        assert_eq!(k.p[5], k.k[4]);
        assert_eq!(k.p[6], k.k[5]);
        assert_eq!(k.p[3], 0.0);
        assert_eq!(k.p[7], 0.0);
        assert_eq!(k.p[10], 1.0);
        assert_eq!(k.p[11], 0.0);
        assert_eq!(k.r, [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(k.distortion_model, "plumb_bob");
        assert!(k.d.iter().all(|&c| c == 0.0));
    }

    #[test]
    fn test_horizontal_fov() {
        let k = CameraIntrinsics::for_resolution(90.0, 100, 100);
        assert!((k.fov_x_deg() - 90.0).abs() < 1e-9);
        assert!((k.fx() - 50.0).abs() < 1e-9);
    }
}
