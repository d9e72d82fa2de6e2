//! Pool-backed buffer guard

use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::Weak,
};

use super::pool::Shelf;

/// A buffer borrowed from a [`TypedPool`](super::TypedPool).
///
/// The guard owns its storage exclusively. Dropping it hands the storage back
/// to the pool it came from, so a buffer is returned exactly once no matter
/// which path (publish, error, shutdown) releases it. If the pool itself is
/// gone the storage is simply freed.
pub struct PooledBuffer<T: Copy + Default> {
    data: Option<Vec<T>>,
    home: Weak<Shelf<T>>,
}

impl<T: Copy + Default> PooledBuffer<T> {
    pub(super) fn new(data: Vec<T>, home: Weak<Shelf<T>>) -> Self {
        Self {
            data: Some(data),
            home,
        }
    }

    /// Create a buffer that does not belong to any pool
    pub fn detached(data: Vec<T>) -> Self {
        Self {
            data: Some(data),
            home: Weak::new(),
        }
    }

    /// Number of elements in use
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Whether the buffer holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated element capacity of the underlying storage
    pub fn capacity(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::capacity)
    }

    /// Pointer to the underlying storage, stable across pool round-trips
    pub fn as_ptr(&self) -> *const T {
        self.as_slice().as_ptr()
    }

    /// Get the buffer as a slice
    pub fn as_slice(&self) -> &[T] {
        self.data.as_deref().unwrap_or(&[])
    }

    /// Get the buffer as a mutable slice
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data.as_deref_mut().unwrap_or(&mut [])
    }

    /// Shorten or lengthen the visible region, filling new elements with `value`.
    /// Growing past the capacity reallocates.
    pub fn resize(&mut self, len: usize, value: T) {
        if let Some(data) = self.data.as_mut() {
            data.resize(len, value);
        }
    }

    /// Drop the contents, keeping the storage
    pub fn clear(&mut self) {
        if let Some(data) = self.data.as_mut() {
            data.clear();
        }
    }

    /// Growable view for writers that append (serializers)
    pub fn vec_mut(&mut self) -> &mut Vec<T> {
        self.data.get_or_insert_with(Vec::new)
    }

    /// Whether this buffer will return to a live pool when dropped
    pub fn is_pooled(&self) -> bool {
        self.home.strong_count() > 0
    }
}

impl<T: Copy + Default> Deref for PooledBuffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: Copy + Default> DerefMut for PooledBuffer<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: Copy + Default> fmt::Debug for PooledBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

impl<T: Copy + Default> Drop for PooledBuffer<T> {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            if let Some(shelf) = self.home.upgrade() {
                shelf.put_back(data);
            }
        }
    }
}
