//! Outgoing message shapes (sensor_msgs/Image and sensor_msgs/CameraInfo)
//!
//! Borrowed variants are what workers serialize, pointing straight into the
//! pooled task buffers. The `Decoded*` variants own their data and exist for
//! subscribers and tests reading the wire format back.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Encoding name of single-channel 32-bit float depth images
pub const ENCODING_DEPTH: &str = "32FC1";
/// Encoding name of packed 8-bit RGB images
pub const ENCODING_RGB: &str = "rgb8";

/// Wall-clock timestamp with nanosecond resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Time {
    pub sec: i32,
    pub nsec: i32,
}

impl Time {
    /// Current wall-clock time
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();
        Self {
            sec: since_epoch.as_secs() as i32,
            nsec: since_epoch.subsec_nanos() as i32,
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.nsec as f64 * 1e-9
    }
}

/// Message header
#[derive(Debug, Clone, Serialize)]
pub struct Header<'a> {
    pub seq: u32,
    pub stamp: Time,
    pub frame_id: &'a str,
}

/// Image message referencing pooled pixel data
#[derive(Debug, Serialize)]
pub struct ImageMessage<'a> {
    pub header: Header<'a>,
    pub height: i32,
    pub width: i32,
    pub encoding: &'a str,
    pub is_bigendian: bool,
    /// Bytes per row
    pub step: i32,
    pub data: &'a [u8],
}

/// Region of interest inside the full frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub x_offset: i32,
    pub y_offset: i32,
    pub height: i32,
    pub width: i32,
    pub do_rectify: bool,
}

impl RegionOfInterest {
    /// ROI covering a whole `width x height` frame
    pub fn full_frame(width: i32, height: i32) -> Self {
        Self {
            x_offset: 0,
            y_offset: 0,
            height,
            width,
            do_rectify: false,
        }
    }
}

/// Calibration message
#[derive(Debug, Serialize)]
pub struct CameraInfoMessage<'a> {
    pub header: Header<'a>,
    pub height: i32,
    pub width: i32,
    pub distortion_model: &'a str,
    pub d: &'a [f64],
    pub k: [f64; 9],
    pub r: [f64; 9],
    pub p: [f64; 12],
    pub binning_x: i32,
    pub binning_y: i32,
    pub roi: RegionOfInterest,
}

/// Owned header read back from the wire
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecodedHeader {
    pub seq: u32,
    pub stamp: Time,
    pub frame_id: String,
}

/// Owned image read back from the wire
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecodedImage {
    pub header: DecodedHeader,
    pub height: i32,
    pub width: i32,
    pub encoding: String,
    pub is_bigendian: bool,
    pub step: i32,
    pub data: Vec<u8>,
}

impl DecodedImage {
    /// Interpret the payload as little-endian `f32` samples
    pub fn depth_samples(&self) -> Vec<f32> {
        self.data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }
}

/// Owned calibration read back from the wire
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecodedCameraInfo {
    pub header: DecodedHeader,
    pub height: i32,
    pub width: i32,
    pub distortion_model: String,
    pub d: Vec<f64>,
    pub k: [f64; 9],
    pub r: [f64; 9],
    pub p: [f64; 12],
    pub binning_x: i32,
    pub binning_y: i32,
    pub roi: RegionOfInterest,
}
