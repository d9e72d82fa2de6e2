//! Render collaborator interface
//!
//! The pipeline never touches a GPU directly. Whatever owns the renderer
//! implements [`RenderSurface`] and hands out opaque texture handles, performs
//! blits and runs the actual GPU-to-CPU transfers.

use crate::{camera::CameraId, error::CaptureError, error::Result};

/// Pixel format of a texture handed out by the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// Single-channel 32-bit float depth
    Depth32Float,
    /// Four 8-bit channels
    Rgba8,
    /// Three 8-bit channels
    Rgb8,
}

/// Opaque reference to a texture owned by the render collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

impl TextureHandle {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Bytes returned by a finished transfer.
///
/// Depth textures come back as little-endian `f32` samples, colour textures as
/// tightly packed 3 or 4 byte pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadbackData {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Outcome of one transfer
pub type ReadbackResult = std::result::Result<ReadbackData, CaptureError>;

/// One-shot completion handler for an asynchronous transfer
pub type ReadbackCallback = Box<dyn FnOnce(ReadbackResult) + Send + 'static>;

/// A camera the renderer currently draws
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveCamera {
    pub id: CameraId,
    pub name: String,
}

/// Everything the pipeline needs from the renderer
pub trait RenderSurface: Send + Sync {
    /// Cameras currently rendering, for auto-discovery
    fn active_cameras(&self) -> Vec<ActiveCamera>;

    /// Size the camera renders at, `None` if the camera is unknown
    fn native_resolution(&self, camera: CameraId) -> Option<(u32, u32)>;

    /// The camera's depth buffer, `None` if it has none this frame
    fn depth_texture(&self, camera: CameraId) -> Option<TextureHandle>;

    /// Get or create a float target of the given size for reduced depth
    fn depth_target(&self, camera: CameraId, width: u32, height: u32) -> Result<TextureHandle>;

    /// Get or create the colour target the camera renders into
    fn color_target(&self, camera: CameraId, width: u32, height: u32) -> Result<TextureHandle>;

    /// Copy `src` into `dst`, rescaling to the destination size
    fn blit(&self, src: &TextureHandle, dst: &TextureHandle) -> Result<()>;

    /// Start an asynchronous transfer. `on_complete` runs exactly once, on
    /// whatever thread the surface chooses.
    fn request_readback(&self, texture: &TextureHandle, on_complete: ReadbackCallback);

    /// Blocking transfer
    fn read_pixels(&self, texture: &TextureHandle) -> ReadbackResult;

    /// Free any targets allocated for the camera
    fn release_camera_resources(&self, camera: CameraId);
}
