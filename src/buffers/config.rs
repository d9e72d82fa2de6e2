//! Buffer pool configuration

use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, Result};

/// Default number of idle buffers kept per buffer kind
pub const DEFAULT_MAX_POOLED: usize = 32;

/// Configuration for buffer pools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    /// Maximum number of idle buffers kept per kind (bytes and floats separately)
    pub max_pooled: usize,
    /// Number of buffers of each kind to allocate up front
    pub initial_count: usize,
    /// Element length of pre-allocated buffers
    pub initial_len: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            max_pooled: DEFAULT_MAX_POOLED,
            initial_count: 0,
            initial_len: 0,
        }
    }
}

impl BufferPoolConfig {
    /// Set the idle buffer cap
    pub fn with_max_pooled(mut self, max_pooled: usize) -> Self {
        self.max_pooled = max_pooled;
        self
    }

    /// Pre-allocate `count` buffers of `len` elements per kind
    pub fn with_preallocation(mut self, count: usize, len: usize) -> Self {
        self.initial_count = count;
        self.initial_len = len;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_pooled == 0 {
            return Err(CaptureError::invalid_parameter(
                "max_pooled",
                "Pool cap cannot be zero",
            ));
        }

        if self.initial_count > self.max_pooled {
            return Err(CaptureError::invalid_parameter(
                "initial_count",
                "Initial count cannot exceed max_pooled",
            ));
        }

        Ok(())
    }
}

/// Builder pattern for buffer pool configuration
pub struct BufferPoolConfigBuilder {
    config: BufferPoolConfig,
}

impl BufferPoolConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: BufferPoolConfig::default(),
        }
    }

    /// Set maximum idle buffers per kind
    pub fn max_pooled(mut self, max_pooled: usize) -> Self {
        self.config.max_pooled = max_pooled;
        self
    }

    /// Set initial count
    pub fn initial_count(mut self, count: usize) -> Self {
        self.config.initial_count = count;
        self
    }

    /// Set initial buffer length
    pub fn initial_len(mut self, len: usize) -> Self {
        self.config.initial_len = len;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<BufferPoolConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for BufferPoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
