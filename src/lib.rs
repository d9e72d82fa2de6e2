//! # Sensorcast - Capture-to-Publish Pipeline for Rendered Sensors
//!
//! Sensorcast turns rendering viewpoints into sensor streams: it captures
//! per-camera depth and colour images, converts raw depth into metric
//! distances, and publishes timestamped, framed messages to a pub/sub
//! transport at a bounded rate without stalling the render loop.
//!
//! ## Features
//!
//! - **Per-camera scheduling**: manual triggers, periodic capture, backpressure
//! - **Asynchronous readback**: at most one transfer in flight per camera and modality
//! - **Depth linearization**: standard and reversed-Z depth buffers
//! - **Pinhole intrinsics**: calibration derived from field of view
//! - **Pooled buffers**: allocation-free steady state
//! - **Worker pool**: concurrent serialization and publishing
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   tick    ┌────────────────────┐  transfer  ┌──────────────┐
//! │ CaptureSched. │ ────────▶ │ ReadbackCoordinator│ ─────────▶ │ RenderSurface│
//! └───────────────┘           └────────────────────┘            └──────────────┘
//!                                       ▲  completion callback          │
//!                                       └───────────────────────────────┘
//!                                       │ PublishTask
//!                                       ▼
//!                             ┌────────────────────┐   N workers  ┌───────────┐
//!                             │    PublishQueue    │ ───────────▶ │ Transport │
//!                             └────────────────────┘              └───────────┘
//! ```

// Core modules
pub mod error;
pub mod buffers;
pub mod camera;
pub mod config;
pub mod depth;
pub mod intrinsics;
pub mod scheduler;
pub mod readback;
pub mod publish;
pub mod pipeline;

// Diagnostics and in-process collaborators
pub mod instrumentation;
pub mod synthetic;

// Main API re-exports
pub use pipeline::{CapturePipeline, PipelineStats, TickReport};
pub use config::{BackpressureConfig, PipelineConfig, PipelineConfigBuilder};
pub use error::{CaptureError, Result};
pub use buffers::{BufferPool, BufferPoolConfig, BufferPoolConfigBuilder, BufferPoolStats, PooledBuffer, TypedPool};
pub use camera::{CameraCaptureContext, CameraId, CameraNaming, CameraRegistry, CameraSettings, Modality, Resolution};
pub use depth::{linearize, DepthRange};
pub use intrinsics::CameraIntrinsics;
pub use scheduler::{CaptureCycle, CaptureScheduler, SchedulerCommand, SkipReason};
pub use readback::{ReadbackCoordinator, ReadbackOptions, RenderSurface, TextureHandle};
pub use publish::{
    BincodeEncoder, ChannelTransport, LogTransport, MessageEncoder, PublishQueue, PublishTask,
    Transport, WorkerPool,
};
pub use instrumentation::Instrumentation;
pub use synthetic::SyntheticSurface;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
