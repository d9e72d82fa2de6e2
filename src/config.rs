//! Pipeline configuration

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    buffers::BufferPoolConfig,
    camera::CameraSettings,
    error::{CaptureError, Result},
    publish::WorkerPoolOptions,
    readback::ReadbackOptions,
};

/// Default number of publish workers
pub const DEFAULT_WORKER_COUNT: usize = 2;

/// Default queue length above which due captures are dropped
pub const DEFAULT_MAX_QUEUE_LEN: usize = 8;

/// Queue-length based load shedding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackpressureConfig {
    pub enabled: bool,
    /// Captures are skipped while more than this many tasks are queued
    pub max_queue_len: usize,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_queue_len: DEFAULT_MAX_QUEUE_LEN,
        }
    }
}

impl BackpressureConfig {
    /// Whether a tick seeing `queue_len` queued tasks should drop captures
    pub fn should_skip(&self, queue_len: usize) -> bool {
        self.enabled && queue_len > self.max_queue_len
    }
}

/// Configuration of a whole capture pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of publish worker threads
    pub worker_count: usize,
    /// Use callback-based transfers instead of blocking reads
    pub use_async_readback: bool,
    /// Collect operation timings and log them periodically
    pub enable_instrumentation: bool,
    /// Interval between timing summaries in milliseconds
    pub instrumentation_interval_ms: u64,
    pub backpressure: BackpressureConfig,
    pub pool: BufferPoolConfig,
    /// Longest a worker waits on an empty queue, in milliseconds
    pub idle_wait_ms: u64,
    /// Longest shutdown waits for workers, in milliseconds
    pub shutdown_timeout_ms: u64,
    /// Flip depth images vertically (bottom-up render targets)
    pub flip_depth_rows: bool,
    /// Flip colour images vertically
    pub flip_color_rows: bool,
    /// Per-camera settings, matched by name at discovery
    pub cameras: Vec<CameraSettings>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            use_async_readback: true,
            enable_instrumentation: false,
            instrumentation_interval_ms: 5_000,
            backpressure: BackpressureConfig::default(),
            pool: BufferPoolConfig::default(),
            idle_wait_ms: 2,
            shutdown_timeout_ms: 1_000,
            flip_depth_rows: true,
            flip_color_rows: false,
            cameras: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CaptureError::from_io(e, &format!("Failed to read config {}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| CaptureError::config(e.to_string()))
    }

    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn with_async_readback(mut self, enabled: bool) -> Self {
        self.use_async_readback = enabled;
        self
    }

    pub fn with_instrumentation(mut self, enabled: bool) -> Self {
        self.enable_instrumentation = enabled;
        self
    }

    pub fn with_backpressure(mut self, backpressure: BackpressureConfig) -> Self {
        self.backpressure = backpressure;
        self
    }

    pub fn with_pool(mut self, pool: BufferPoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_camera(mut self, camera: CameraSettings) -> Self {
        self.cameras.push(camera);
        self
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn instrumentation_interval(&self) -> Duration {
        Duration::from_millis(self.instrumentation_interval_ms)
    }

    /// Settings configured for the camera called `name`
    pub fn camera_settings(&self, name: &str) -> Option<&CameraSettings> {
        self.cameras.iter().find(|c| c.name == name)
    }

    pub fn worker_options(&self) -> WorkerPoolOptions {
        WorkerPoolOptions {
            worker_count: self.worker_count,
            idle_wait: self.idle_wait(),
            shutdown_timeout: self.shutdown_timeout(),
        }
    }

    pub fn readback_options(&self) -> ReadbackOptions {
        ReadbackOptions {
            use_async: self.use_async_readback,
            flip_depth_rows: self.flip_depth_rows,
            flip_color_rows: self.flip_color_rows,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(CaptureError::invalid_parameter(
                "worker_count",
                "At least one publish worker is required",
            ));
        }

        if self.idle_wait_ms == 0 {
            return Err(CaptureError::invalid_parameter(
                "idle_wait_ms",
                "Idle wait must be non-zero",
            ));
        }

        if self.enable_instrumentation && self.instrumentation_interval_ms == 0 {
            return Err(CaptureError::invalid_parameter(
                "instrumentation_interval_ms",
                "Summary interval must be non-zero",
            ));
        }

        self.pool.validate()?;

        for (i, camera) in self.cameras.iter().enumerate() {
            camera.validate()?;
            if self.cameras[..i].iter().any(|c| c.name == camera.name) {
                return Err(CaptureError::invalid_parameter(
                    "cameras",
                    format!("Camera '{}' is configured twice", camera.name),
                ));
            }
        }

        Ok(())
    }
}

/// Builder pattern for pipeline configuration
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    pub fn async_readback(mut self, enabled: bool) -> Self {
        self.config.use_async_readback = enabled;
        self
    }

    pub fn instrumentation(mut self, enabled: bool, interval: Duration) -> Self {
        self.config.enable_instrumentation = enabled;
        self.config.instrumentation_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn backpressure(mut self, enabled: bool, max_queue_len: usize) -> Self {
        self.config.backpressure = BackpressureConfig {
            enabled,
            max_queue_len,
        };
        self
    }

    pub fn max_pooled(mut self, max_pooled: usize) -> Self {
        self.config.pool.max_pooled = max_pooled;
        self
    }

    pub fn idle_wait(mut self, wait: Duration) -> Self {
        self.config.idle_wait_ms = wait.as_millis() as u64;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn flip_rows(mut self, depth: bool, color: bool) -> Self {
        self.config.flip_depth_rows = depth;
        self.config.flip_color_rows = color;
        self
    }

    pub fn camera(mut self, camera: CameraSettings) -> Self {
        self.config.cameras.push(camera);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
