//! Buffer management and memory pools
//!
//! This module provides reusable byte and float buffers for the capture path so
//! that steady-state frames do not allocate. Buffers are handed out as
//! [`PooledBuffer`] guards and find their way home when dropped.

pub mod buffer;
pub mod config;
pub mod pool;
pub mod stats;

// Re-export main types
pub use buffer::PooledBuffer;
pub use config::{BufferPoolConfig, BufferPoolConfigBuilder};
pub use pool::{BufferPool, TypedPool};
pub use stats::{AtomicBufferPoolStats, BufferPoolStats};
