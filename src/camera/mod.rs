//! Camera registration and per-camera capture state

pub mod context;
pub mod registry;
pub mod settings;

pub use context::{CameraCaptureContext, PendingGuard, ScheduleState};
pub use registry::CameraRegistry;
pub use settings::{CameraId, CameraNaming, CameraSettings, Modality, Resolution};
