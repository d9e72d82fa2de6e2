//! Per-camera capture settings and naming

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    depth::DepthRange,
    error::{CaptureError, Result},
};

/// Stable identifier of a registered camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CameraId(pub u32);

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cam#{}", self.0)
    }
}

/// Captured data kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Depth,
    Rgb,
    Intrinsics,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Depth => "depth",
            Modality::Rgb => "rgb",
            Modality::Intrinsics => "intrinsics",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output resolution before downsampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Resolution {
    /// Whatever the camera renders at
    Native,
    /// Fixed capture size
    Fixed { width: u32, height: u32 },
}

impl Default for Resolution {
    fn default() -> Self {
        Self::Native
    }
}

/// Configuration of one camera, as found in config files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Camera name, used to derive default topics and frame ids
    pub name: String,
    pub capture_depth: bool,
    pub capture_rgb: bool,
    pub publish_intrinsics: bool,
    pub depth_topic: Option<String>,
    pub rgb_topic: Option<String>,
    pub info_topic: Option<String>,
    pub depth_frame_id: Option<String>,
    pub color_frame_id: Option<String>,
    /// Periodic capture rate in Hz
    pub publish_rate: f64,
    /// Capture periodically instead of only on request
    pub continuous: bool,
    pub resolution: Resolution,
    /// Integer divisor applied to the output resolution
    pub downsample_factor: u32,
    pub depth: DepthRange,
    /// Vertical field of view in degrees
    pub fov_y_deg: f64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            name: "camera".to_string(),
            capture_depth: true,
            capture_rgb: true,
            publish_intrinsics: true,
            depth_topic: None,
            rgb_topic: None,
            info_topic: None,
            depth_frame_id: None,
            color_frame_id: None,
            publish_rate: 10.0,
            continuous: true,
            resolution: Resolution::Native,
            downsample_factor: 1,
            depth: DepthRange::default(),
            fov_y_deg: 60.0,
        }
    }
}

impl CameraSettings {
    /// Create settings for a named camera with default values
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_rate(mut self, hz: f64) -> Self {
        self.publish_rate = hz;
        self
    }

    pub fn with_continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    pub fn with_modalities(mut self, depth: bool, rgb: bool, intrinsics: bool) -> Self {
        self.capture_depth = depth;
        self.capture_rgb = rgb;
        self.publish_intrinsics = intrinsics;
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_downsample(mut self, factor: u32) -> Self {
        self.downsample_factor = factor;
        self
    }

    pub fn with_depth_range(mut self, depth: DepthRange) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_fov(mut self, fov_y_deg: f64) -> Self {
        self.fov_y_deg = fov_y_deg;
        self
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CaptureError::invalid_parameter(
                "name",
                "Camera name cannot be empty",
            ));
        }

        if self.continuous && !(self.publish_rate.is_finite() && self.publish_rate > 0.0) {
            return Err(CaptureError::invalid_parameter(
                "publish_rate",
                "Continuous capture needs a positive, finite rate",
            ));
        }

        if self.downsample_factor == 0 {
            return Err(CaptureError::invalid_parameter(
                "downsample_factor",
                "Downsample factor must be at least 1",
            ));
        }

        if let Resolution::Fixed { width, height } = self.resolution {
            if width == 0 || height == 0 {
                return Err(CaptureError::invalid_parameter(
                    "resolution",
                    "Fixed resolution must be non-zero",
                ));
            }
        }

        if !(self.fov_y_deg > 0.0 && self.fov_y_deg < 180.0) {
            return Err(CaptureError::invalid_parameter(
                "fov_y_deg",
                "Field of view must be within (0, 180) degrees",
            ));
        }

        self.depth.validate()
    }

    /// Output size for a camera rendering at `native`
    pub fn output_size(&self, native: (u32, u32)) -> (u32, u32) {
        let (width, height) = match self.resolution {
            Resolution::Native => native,
            Resolution::Fixed { width, height } => (width, height),
        };
        let factor = self.downsample_factor.max(1);
        ((width / factor).max(1), (height / factor).max(1))
    }

    /// Resolve topic names and frame ids, filling defaults from the camera name
    pub fn naming(&self) -> CameraNaming {
        let name = self.name.trim_matches('/');
        let color_frame: Arc<str> = self
            .color_frame_id
            .clone()
            .unwrap_or_else(|| format!("{}_color_optical_frame", name))
            .into();

        CameraNaming {
            depth_topic: self
                .depth_topic
                .clone()
                .unwrap_or_else(|| format!("/{}/depth/image_raw", name))
                .into(),
            rgb_topic: self
                .rgb_topic
                .clone()
                .unwrap_or_else(|| format!("/{}/rgb/image_raw", name))
                .into(),
            info_topic: self
                .info_topic
                .clone()
                .unwrap_or_else(|| format!("/{}/camera_info", name))
                .into(),
            depth_frame_id: self
                .depth_frame_id
                .clone()
                .unwrap_or_else(|| format!("{}_depth_optical_frame", name))
                .into(),
            info_frame_id: color_frame.clone(),
            color_frame_id: color_frame,
        }
    }
}

/// Immutable topic and frame names of one camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraNaming {
    pub depth_topic: Arc<str>,
    pub rgb_topic: Arc<str>,
    pub info_topic: Arc<str>,
    pub depth_frame_id: Arc<str>,
    pub color_frame_id: Arc<str>,
    pub info_frame_id: Arc<str>,
}

impl CameraNaming {
    /// Topic and frame id used for messages of `modality`
    pub fn for_modality(&self, modality: Modality) -> (&Arc<str>, &Arc<str>) {
        match modality {
            Modality::Depth => (&self.depth_topic, &self.depth_frame_id),
            Modality::Rgb => (&self.rgb_topic, &self.color_frame_id),
            Modality::Intrinsics => (&self.info_topic, &self.info_frame_id),
        }
    }
}
