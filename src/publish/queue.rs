//! Multi-producer multi-consumer FIFO of publish tasks

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Condvar, Mutex,
    },
    time::Duration,
};

use crate::error::{CaptureError, Result};

use super::task::PublishTask;

/// Queue statistics
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Tasks accepted
    pub enqueued: AtomicU64,
    /// Tasks handed to consumers
    pub dequeued: AtomicU64,
    /// Tasks refused because the queue was closed
    pub rejected: AtomicU64,
    /// Tasks dropped unprocessed at shutdown
    pub discarded: AtomicU64,
    /// Deepest the queue has been
    pub peak_depth: AtomicUsize,
}

impl QueueStats {
    fn record_depth(&self, depth: usize) {
        let mut peak = self.peak_depth.load(Ordering::Relaxed);
        while depth > peak {
            match self.peak_depth.compare_exchange_weak(
                peak,
                depth,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => peak = x,
            }
        }
    }

    /// Tasks accepted but not yet dequeued or discarded
    pub fn in_flight(&self) -> u64 {
        self.enqueued
            .load(Ordering::Relaxed)
            .saturating_sub(self.dequeued.load(Ordering::Relaxed))
            .saturating_sub(self.discarded.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    tasks: VecDeque<PublishTask>,
    closed: bool,
}

/// Shared FIFO between capture completions and publish workers.
///
/// Producers never block beyond the queue lock. Consumers either poll with
/// [`try_pop`](Self::try_pop) or park for a bounded time with
/// [`pop_timeout`](Self::pop_timeout).
#[derive(Debug, Default)]
pub struct PublishQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    len: AtomicUsize,
    stats: QueueStats,
}

impl PublishQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task. Fails with `ShutDown` once the queue is closed, in
    /// which case the task is dropped and its buffers returned.
    pub fn push(&self, task: PublishTask) -> Result<()> {
        let depth = {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(CaptureError::ShutDown);
            }
            state.tasks.push_back(task);
            self.len.store(state.tasks.len(), Ordering::Release);
            state.tasks.len()
        };

        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        self.stats.record_depth(depth);
        self.available.notify_one();
        Ok(())
    }

    /// Take the oldest task if there is one
    pub fn try_pop(&self) -> Option<PublishTask> {
        let mut state = self.state.lock().unwrap();
        let task = state.tasks.pop_front();
        if task.is_some() {
            self.len.store(state.tasks.len(), Ordering::Release);
            self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
        }
        task
    }

    /// Take the oldest task, waiting up to `timeout` for one to arrive.
    /// Returns `None` on timeout or when the queue is closed and empty.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<PublishTask> {
        let state = self.state.lock().unwrap();
        let (mut state, _) = self
            .available
            .wait_timeout_while(state, timeout, |s| s.tasks.is_empty() && !s.closed)
            .unwrap();

        let task = state.tasks.pop_front();
        if task.is_some() {
            self.len.store(state.tasks.len(), Ordering::Release);
            self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
        }
        task
    }

    /// Current number of queued tasks, readable without taking the lock
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuse further pushes and wake every waiting consumer
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Drop every queued task, returning how many were discarded
    pub fn clear(&self) -> usize {
        let drained: Vec<PublishTask> = {
            let mut state = self.state.lock().unwrap();
            let drained = state.tasks.drain(..).collect();
            self.len.store(0, Ordering::Release);
            drained
        };
        let count = drained.len();
        self.stats
            .discarded
            .fetch_add(count as u64, Ordering::Relaxed);
        // buffers go back to their pools outside the queue lock
        drop(drained);
        count
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        buffers::PooledBuffer,
        camera::CameraId,
        publish::{
            messages::Time,
            task::{CaptureMeta, ImageTask},
        },
    };
    use std::{sync::Arc, thread, time::Instant};

    fn task(sequence: u32) -> PublishTask {
        PublishTask::Rgb(ImageTask {
            meta: CaptureMeta {
                camera: CameraId(1),
                topic: Arc::from("/cam/rgb"),
                frame_id: Arc::from("cam"),
                sequence,
                stamp: Time::default(),
            },
            width: 1,
            height: 1,
            data: PooledBuffer::detached(vec![0, 0, 0]),
        })
    }

    #[test]
    fn test_fifo_order() {
        let queue = PublishQueue::new();
        for i in 0..5 {
            queue.push(task(i)).unwrap();
        }
        assert_eq!(queue.len(), 5);

        let order: Vec<u32> = std::iter::from_fn(|| queue.try_pop())
            .map(|t| t.sequence())
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
        assert_eq!(queue.stats().peak_depth.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_pop_timeout_returns_none_when_idle() {
        let queue = PublishQueue::new();
        let start = Instant::now();
        assert!(queue.pop_timeout(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_pop_timeout_wakes_on_push() {
        let queue = Arc::new(PublishQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop_timeout(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        queue.push(task(7)).unwrap();

        let got = consumer.join().unwrap().unwrap();
        assert_eq!(got.sequence(), 7);
    }

    #[test]
    fn test_close_rejects_and_wakes() {
        let queue = Arc::new(PublishQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop_timeout(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();

        assert!(consumer.join().unwrap().is_none());
        assert!(matches!(queue.push(task(1)), Err(CaptureError::ShutDown)));
        assert_eq!(queue.stats().rejected.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_clear_discards() {
        let queue = PublishQueue::new();
        queue.push(task(1)).unwrap();
        queue.push(task(2)).unwrap();
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.stats().in_flight(), 0);
    }
}
