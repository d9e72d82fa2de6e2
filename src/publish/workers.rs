//! Publish worker pool

use std::{
    any::Any,
    io,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc, Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    buffers::BufferPool,
    error::{CaptureError, Result},
    instrumentation::{self, Instrumentation},
};

use super::{
    encoder::{encode_task, MessageEncoder},
    queue::PublishQueue,
    task::PublishTask,
    transport::Transport,
};

/// Publish outcome counters
#[derive(Debug, Default)]
pub struct PublishStats {
    pub published: AtomicU64,
    pub encode_failures: AtomicU64,
    pub transport_failures: AtomicU64,
    pub bytes_sent: AtomicU64,
}

impl PublishStats {
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.encode_failures.load(Ordering::Relaxed)
            + self.transport_failures.load(Ordering::Relaxed)
    }
}

/// Turns tasks into wire messages and hands them to the transport
pub struct TaskPublisher {
    encoder: Box<dyn MessageEncoder>,
    transport: Arc<dyn Transport>,
    pool: Arc<BufferPool>,
    instrumentation: Option<Arc<Instrumentation>>,
    stats: PublishStats,
}

impl TaskPublisher {
    pub fn new(
        encoder: Box<dyn MessageEncoder>,
        transport: Arc<dyn Transport>,
        pool: Arc<BufferPool>,
        instrumentation: Option<Arc<Instrumentation>>,
    ) -> Self {
        Self {
            encoder,
            transport,
            pool,
            instrumentation,
            stats: PublishStats::default(),
        }
    }

    /// Serialize and send one task. The task and every buffer it holds are
    /// released before this returns, whatever the outcome.
    pub fn publish(&self, task: PublishTask) -> Result<()> {
        let start = Instant::now();
        let encoded = match encode_task(self.encoder.as_ref(), &self.pool, &task) {
            Ok(encoded) => encoded,
            Err(e) => {
                self.stats.encode_failures.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };
        instrumentation::record(&self.instrumentation, "encode", start.elapsed());

        let send_start = Instant::now();
        let sent = self.transport.publish(task.topic(), &encoded);
        instrumentation::record(&self.instrumentation, "transport", send_start.elapsed());

        match sent {
            Ok(()) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .bytes_sent
                    .fetch_add(encoded.len() as u64, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.stats.transport_failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> &PublishStats {
        &self.stats
    }
}

/// Worker pool settings
#[derive(Debug, Clone, Copy)]
pub struct WorkerPoolOptions {
    pub worker_count: usize,
    /// Longest a worker parks on an empty queue before re-checking shutdown
    pub idle_wait: Duration,
    /// Upper bound on how long shutdown waits for workers to exit
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolOptions {
    fn default() -> Self {
        Self {
            worker_count: 2,
            idle_wait: Duration::from_millis(2),
            shutdown_timeout: Duration::from_secs(1),
        }
    }
}

type WorkerBody = Box<dyn FnOnce() + Send + 'static>;

/// N threads draining the publish queue
pub struct WorkerPool {
    running: Arc<AtomicBool>,
    queue: Arc<PublishQueue>,
    publisher: Arc<TaskPublisher>,
    handles: Vec<Option<JoinHandle<()>>>,
    exited: mpsc::Receiver<usize>,
    options: WorkerPoolOptions,
}

impl WorkerPool {
    /// Start `options.worker_count` workers
    pub fn spawn(
        queue: Arc<PublishQueue>,
        publisher: Arc<TaskPublisher>,
        options: WorkerPoolOptions,
    ) -> Result<Self> {
        Self::spawn_with(queue, publisher, options, |name, body| {
            thread::Builder::new().name(name).spawn(body)
        })
    }

    /// Start the workers through `spawn_thread`. If any spawn fails, the
    /// workers already started are stopped before the error is returned.
    fn spawn_with<F>(
        queue: Arc<PublishQueue>,
        publisher: Arc<TaskPublisher>,
        options: WorkerPoolOptions,
        mut spawn_thread: F,
    ) -> Result<Self>
    where
        F: FnMut(String, WorkerBody) -> io::Result<JoinHandle<()>>,
    {
        if options.worker_count == 0 {
            return Err(CaptureError::invalid_parameter(
                "worker_count",
                "At least one publish worker is required",
            ));
        }

        let (exit_tx, exited) = mpsc::channel();
        // dropping a partially started pool shuts its workers down
        let mut pool = Self {
            running: Arc::new(AtomicBool::new(true)),
            queue,
            publisher,
            handles: Vec::with_capacity(options.worker_count),
            exited,
            options,
        };

        for index in 0..options.worker_count {
            let running = Arc::clone(&pool.running);
            let queue = Arc::clone(&pool.queue);
            let publisher = Arc::clone(&pool.publisher);
            let exit_tx = exit_tx.clone();
            let idle_wait = options.idle_wait;

            let body: WorkerBody = Box::new(move || {
                worker_loop(index, &running, &queue, &publisher, idle_wait);
                let _ = exit_tx.send(index);
            });
            match spawn_thread(format!("publish-worker-{}", index), body) {
                Ok(handle) => pool.handles.push(Some(handle)),
                Err(e) => {
                    log::error!(
                        "failed to spawn publish worker {}, stopping {} started",
                        index,
                        pool.handles.len()
                    );
                    return Err(CaptureError::from_io(e, "Failed to spawn publish worker"));
                }
            }
        }

        log::info!("started {} publish workers", options.worker_count);
        Ok(pool)
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn publisher(&self) -> &Arc<TaskPublisher> {
        &self.publisher
    }

    /// Stop the workers, waiting at most `shutdown_timeout` for them, then
    /// drop whatever is still queued. Returns the number of workers joined;
    /// any that did not exit in time are left detached.
    pub fn shutdown(&mut self) -> usize {
        if !self.running.swap(false, Ordering::AcqRel) {
            return 0;
        }
        self.queue.close();

        let deadline = Instant::now() + self.options.shutdown_timeout;
        let mut joined = 0;
        while joined < self.handles.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.exited.recv_timeout(remaining) {
                Ok(index) => {
                    if let Some(handle) = self.handles.get_mut(index).and_then(Option::take) {
                        let _ = handle.join();
                    }
                    joined += 1;
                }
                Err(_) => break,
            }
        }

        if joined < self.handles.len() {
            log::warn!(
                "{} publish workers did not stop within {:?}",
                self.handles.len() - joined,
                self.options.shutdown_timeout
            );
        }

        let dropped = self.queue.clear();
        if dropped > 0 {
            log::info!("dropped {} queued tasks at shutdown", dropped);
        }
        joined
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    index: usize,
    running: &AtomicBool,
    queue: &PublishQueue,
    publisher: &TaskPublisher,
    idle_wait: Duration,
) {
    log::debug!("publish worker {} running", index);
    while running.load(Ordering::Acquire) {
        let Some(task) = queue.pop_timeout(idle_wait) else {
            continue;
        };

        let topic = task.topic().to_string();
        let sequence = task.sequence();
        // the task's buffers go back to the pool while unwinding
        match panic::catch_unwind(AssertUnwindSafe(|| publisher.publish(task))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::error!(
                    "worker {} failed to publish {} seq {}: {}",
                    index,
                    topic,
                    sequence,
                    e
                );
            }
            Err(payload) => {
                publisher
                    .stats
                    .transport_failures
                    .fetch_add(1, Ordering::Relaxed);
                log::error!(
                    "worker {} panicked publishing {} seq {}: {}",
                    index,
                    topic,
                    sequence,
                    panic_message(payload.as_ref())
                );
            }
        }
    }
    log::debug!("publish worker {} exiting", index);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::{BincodeEncoder, ChannelTransport};

    fn publisher() -> Arc<TaskPublisher> {
        let (transport, _receiver) = ChannelTransport::new();
        Arc::new(TaskPublisher::new(
            Box::new(BincodeEncoder),
            Arc::new(transport),
            Arc::new(BufferPool::default()),
            None,
        ))
    }

    #[test]
    fn test_failed_spawn_stops_started_workers() {
        let queue = Arc::new(PublishQueue::new());
        let options = WorkerPoolOptions {
            worker_count: 3,
            ..Default::default()
        };
        let (done_tx, done_rx) = mpsc::channel();

        let result = WorkerPool::spawn_with(
            Arc::clone(&queue),
            publisher(),
            options,
            |name, body: WorkerBody| {
                if name.ends_with('2') {
                    return Err(io::Error::new(io::ErrorKind::Other, "no more threads"));
                }
                let done_tx = done_tx.clone();
                thread::Builder::new().name(name).spawn(move || {
                    body();
                    let _ = done_tx.send(());
                })
            },
        );

        assert!(matches!(result, Err(CaptureError::Io { .. })));
        assert!(queue.is_closed());
        for _ in 0..2 {
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
    }

    #[test]
    fn test_panic_message() {
        let payload = panic::catch_unwind(|| panic!("transport exploded")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "transport exploded");
        let payload = panic::catch_unwind(|| panic!("{} exploded", "encoder")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "encoder exploded");
    }
}
