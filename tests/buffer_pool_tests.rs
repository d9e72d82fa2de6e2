//! Buffer pool behaviour under churn and contention

use std::{
    sync::{Arc, Barrier},
    thread,
};

use sensorcast::buffers::{BufferPool, BufferPoolConfig, BufferPoolConfigBuilder, TypedPool};

#[cfg(test)]
mod buffer_pool_tests {
    use super::*;

    #[test]
    fn test_churn_respects_cap() {
        let config = BufferPoolConfigBuilder::new().max_pooled(20).build().unwrap();
        let pool = BufferPool::new(config).unwrap();

        for i in 0..10_000 {
            // hold a varying number at once so the cap is actually exercised
            let held: Vec<_> = (0..(i % 32) + 1)
                .map(|j| pool.acquire_bytes(64 + j * 16))
                .collect();
            drop(held);
            assert!(pool.bytes().available_count() <= 20);
        }

        let stats = pool.bytes().stats();
        assert_eq!(stats.outstanding, 0);
        assert!(stats.discards > 0);
        assert!(stats.hits > stats.misses);
    }

    #[test]
    fn test_steady_state_stops_allocating() {
        let pool = BufferPool::default();
        // warm up with the working set
        drop((0..4).map(|_| pool.acquire_floats(640 * 480)).collect::<Vec<_>>());
        let warm = pool.floats().stats().misses;

        for _ in 0..1_000 {
            let frames: Vec<_> = (0..4).map(|_| pool.acquire_floats(640 * 480)).collect();
            drop(frames);
        }
        assert_eq!(pool.floats().stats().misses, warm);
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let pool = Arc::new(TypedPool::<u8>::new("bytes", 8));
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let pool = Arc::clone(&pool);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..2_000 {
                        let mut buffer = pool.acquire(256);
                        buffer[0] = t as u8;
                        buffer[255] = i as u8;
                        // exclusively owned while held
                        assert_eq!(buffer[0], t as u8);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.outstanding, 0);
        assert_eq!(stats.acquisitions(), (threads * 2_000) as u64);
        assert_eq!(stats.releases, stats.acquisitions());
        assert!(stats.peak_outstanding <= threads);
        assert!(pool.available_count() <= 8);
    }

    #[test]
    fn test_zero_cap_rejected() {
        assert!(BufferPool::new(BufferPoolConfig::default().with_max_pooled(0)).is_err());
    }
}
