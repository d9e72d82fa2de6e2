//! GPU-to-CPU transfer coordination

pub mod convert;
pub mod coordinator;
pub mod surface;

pub use convert::{
    copy_depth_samples, copy_rgb, pixel_stride, rgba_to_rgb_blocked, rgba_to_rgb_scalar,
};
pub use coordinator::{ReadbackCoordinator, ReadbackOptions, ReadbackStats, ReadbackStatsSnapshot};
pub use surface::{
    ActiveCamera, ReadbackCallback, ReadbackData, ReadbackResult, RenderSurface, TextureFormat,
    TextureHandle,
};
