//! Buffer pool implementation for allocation-free steady state

use std::sync::{Arc, Mutex};

use crate::error::Result;

use super::{
    buffer::PooledBuffer,
    config::BufferPoolConfig,
    stats::{AtomicBufferPoolStats, BufferPoolStats},
};

/// Idle storage for one buffer kind, shared between the pool and its guards
#[derive(Debug)]
pub(crate) struct Shelf<T> {
    kind: &'static str,
    max_pooled: usize,
    available: Mutex<Vec<Vec<T>>>,
    stats: AtomicBufferPoolStats,
}

impl<T: Copy + Default> Shelf<T> {
    /// Best-fit lookup: the smallest idle buffer whose capacity covers `min_len`
    fn take(&self, min_len: usize) -> Option<Vec<T>> {
        let mut available = self.available.lock().unwrap();
        let index = available
            .iter()
            .enumerate()
            .filter(|(_, v)| v.capacity() >= min_len)
            .min_by_key(|(_, v)| v.capacity())
            .map(|(i, _)| i)?;
        Some(available.swap_remove(index))
    }

    pub(crate) fn put_back(&self, data: Vec<T>) {
        let kept = {
            let mut available = self.available.lock().unwrap();
            if available.len() < self.max_pooled {
                available.push(data);
                true
            } else {
                false
            }
        };
        self.stats.record_release(kept);
    }
}

/// A pool of reusable buffers of a single element type
#[derive(Debug)]
pub struct TypedPool<T> {
    shelf: Arc<Shelf<T>>,
}

impl<T: Copy + Default> TypedPool<T> {
    /// Create a pool that keeps at most `max_pooled` idle buffers
    pub fn new(kind: &'static str, max_pooled: usize) -> Self {
        Self {
            shelf: Arc::new(Shelf {
                kind,
                max_pooled,
                available: Mutex::new(Vec::new()),
                stats: AtomicBufferPoolStats::new(),
            }),
        }
    }

    /// Get a buffer of exactly `min_len` elements, reusing idle storage when
    /// one with enough capacity exists. Contents are reset to `T::default()`.
    pub fn acquire(&self, min_len: usize) -> PooledBuffer<T> {
        let (mut data, reused) = match self.shelf.take(min_len) {
            Some(data) => (data, true),
            None => (Vec::with_capacity(min_len), false),
        };
        data.clear();
        data.resize(min_len, T::default());
        self.shelf.stats.record_acquire(reused);
        PooledBuffer::new(data, Arc::downgrade(&self.shelf))
    }

    /// Return a buffer to the pool. Equivalent to dropping it.
    pub fn release(&self, buffer: PooledBuffer<T>) {
        drop(buffer);
    }

    /// Number of idle buffers currently held
    pub fn available_count(&self) -> usize {
        self.shelf.available.lock().unwrap().len()
    }

    /// Idle buffer cap
    pub fn max_pooled(&self) -> usize {
        self.shelf.max_pooled
    }

    /// Name of the buffer kind, used in logs
    pub fn kind(&self) -> &'static str {
        self.shelf.kind
    }

    /// Get current statistics
    pub fn stats(&self) -> BufferPoolStats {
        self.shelf.stats.snapshot()
    }

    /// Drop idle buffers until at most `target_available` remain
    pub fn shrink(&self, target_available: usize) -> usize {
        let mut available = self.shelf.available.lock().unwrap();
        let removed = available.len().saturating_sub(target_available);
        available.truncate(target_available);
        removed
    }

    fn preallocate(&self, count: usize, len: usize) {
        let mut available = self.shelf.available.lock().unwrap();
        for _ in 0..count.min(self.shelf.max_pooled) {
            available.push(Vec::with_capacity(len));
        }
    }
}

/// Byte and float buffer pools shared by the capture and publish paths
#[derive(Debug)]
pub struct BufferPool {
    config: BufferPoolConfig,
    bytes: TypedPool<u8>,
    floats: TypedPool<f32>,
}

impl BufferPool {
    /// Create a new buffer pool
    pub fn new(config: BufferPoolConfig) -> Result<Self> {
        config.validate()?;

        let bytes = TypedPool::new("bytes", config.max_pooled);
        let floats = TypedPool::new("floats", config.max_pooled);

        if config.initial_count > 0 {
            bytes.preallocate(config.initial_count, config.initial_len);
            floats.preallocate(config.initial_count, config.initial_len);
        }

        Ok(Self {
            config,
            bytes,
            floats,
        })
    }

    /// Get a byte buffer of `min_len` bytes
    pub fn acquire_bytes(&self, min_len: usize) -> PooledBuffer<u8> {
        self.bytes.acquire(min_len)
    }

    /// Get a float buffer of `min_len` samples
    pub fn acquire_floats(&self, min_len: usize) -> PooledBuffer<f32> {
        self.floats.acquire(min_len)
    }

    /// Return a byte buffer
    pub fn release_bytes(&self, buffer: PooledBuffer<u8>) {
        self.bytes.release(buffer);
    }

    /// Return a float buffer
    pub fn release_floats(&self, buffer: PooledBuffer<f32>) {
        self.floats.release(buffer);
    }

    /// Byte buffer pool
    pub fn bytes(&self) -> &TypedPool<u8> {
        &self.bytes
    }

    /// Float buffer pool
    pub fn floats(&self) -> &TypedPool<f32> {
        &self.floats
    }

    /// Get pool configuration
    pub fn config(&self) -> &BufferPoolConfig {
        &self.config
    }

    /// Buffers of either kind currently handed out
    pub fn outstanding(&self) -> usize {
        self.bytes.stats().outstanding + self.floats.stats().outstanding
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self {
            config: BufferPoolConfig::default(),
            bytes: TypedPool::new("bytes", super::config::DEFAULT_MAX_POOLED),
            floats: TypedPool::new("floats", super::config::DEFAULT_MAX_POOLED),
        }
    }
}
