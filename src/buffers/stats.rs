//! Buffer pool statistics tracking

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Statistics for buffer pool monitoring
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferPoolStats {
    /// Acquisitions served from an idle buffer
    pub hits: u64,
    /// Acquisitions that had to allocate fresh storage
    pub misses: u64,
    /// Buffers handed back to the pool
    pub releases: u64,
    /// Released buffers freed because the pool was at its cap
    pub discards: u64,
    /// Buffers currently handed out
    pub outstanding: usize,
    /// Peak number of buffers handed out simultaneously
    pub peak_outstanding: usize,
}

impl BufferPoolStats {
    /// Total number of acquisitions
    pub fn acquisitions(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of acquisitions served without allocating (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.acquisitions();
        if total == 0 {
            return 1.0;
        }
        self.hits as f64 / total as f64
    }

    /// Get a summary string of the statistics
    pub fn summary(&self) -> String {
        format!(
            "BufferPoolStats {{ hits: {}, misses: {}, releases: {}, discards: {}, \
             outstanding: {}, peak: {}, hit_rate: {:.2}% }}",
            self.hits,
            self.misses,
            self.releases,
            self.discards,
            self.outstanding,
            self.peak_outstanding,
            self.hit_rate() * 100.0
        )
    }
}

/// Thread-safe statistics for buffer pools
#[derive(Debug, Default)]
pub struct AtomicBufferPoolStats {
    hits: AtomicU64,
    misses: AtomicU64,
    releases: AtomicU64,
    discards: AtomicU64,
    outstanding: AtomicUsize,
    peak_outstanding: AtomicUsize,
}

impl AtomicBufferPoolStats {
    /// Create new atomic statistics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an acquisition, `reused` telling whether it was served from the pool
    pub fn record_acquire(&self, reused: bool) {
        if reused {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        let now_out = self.outstanding.fetch_add(1, Ordering::Relaxed) + 1;

        let mut peak = self.peak_outstanding.load(Ordering::Relaxed);
        while now_out > peak {
            match self.peak_outstanding.compare_exchange_weak(
                peak,
                now_out,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => peak = x,
            }
        }
    }

    /// Record a buffer coming home, `kept` telling whether the pool retained it
    pub fn record_release(&self, kept: bool) {
        self.releases.fetch_add(1, Ordering::Relaxed);
        if !kept {
            self.discards.fetch_add(1, Ordering::Relaxed);
        }
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> BufferPoolStats {
        BufferPoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            discards: self.discards.load(Ordering::Relaxed),
            outstanding: self.outstanding.load(Ordering::Relaxed),
            peak_outstanding: self.peak_outstanding.load(Ordering::Relaxed),
        }
    }
}
