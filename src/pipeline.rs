//! Capture-to-publish pipeline
//!
//! Owns every piece of one pipeline instance: the camera registry, scheduler,
//! readback coordinator, buffer pool, publish queue and worker pool. The
//! render loop calls [`CapturePipeline::tick`] once per frame (or
//! [`CapturePipeline::on_frame_rendered`] per camera); everything else
//! happens on completion callbacks and worker threads.

use std::{
    sync::{atomic::Ordering, Arc},
    time::Instant,
};

use crate::{
    buffers::{BufferPool, BufferPoolStats},
    camera::{CameraCaptureContext, CameraId, CameraRegistry, CameraSettings},
    config::PipelineConfig,
    error::Result,
    instrumentation::{self, Instrumentation},
    publish::{
        BincodeEncoder, MessageEncoder, PublishQueue, TaskPublisher, Transport, WorkerPool,
    },
    readback::{ReadbackCoordinator, ReadbackStatsSnapshot, RenderSurface},
    scheduler::{CaptureScheduler, Decision, SchedulerCommand, SchedulerStatsSnapshot, SkipReason},
};

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Capture cycles started
    pub dispatched: usize,
    /// Cycles started but at least one modality failed to issue
    pub failed: usize,
    pub backpressure: usize,
    pub pending: usize,
    pub not_due: usize,
    pub disabled: usize,
}

impl TickReport {
    fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Backpressure => self.backpressure += 1,
            SkipReason::Pending => self.pending += 1,
            SkipReason::NotDue => self.not_due += 1,
            SkipReason::Disabled | SkipReason::Inactive => self.disabled += 1,
        }
    }
}

/// Pipeline-wide counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    pub cameras: usize,
    pub scheduler: SchedulerStatsSnapshot,
    pub readback: ReadbackStatsSnapshot,
    pub byte_pool: BufferPoolStats,
    pub float_pool: BufferPoolStats,
    pub queue_len: usize,
    pub enqueued: u64,
    pub discarded: u64,
    pub peak_queue_len: usize,
    pub published: u64,
    pub publish_failures: u64,
}

/// One running capture pipeline
pub struct CapturePipeline {
    config: PipelineConfig,
    surface: Arc<dyn RenderSurface>,
    registry: CameraRegistry,
    scheduler: CaptureScheduler,
    coordinator: ReadbackCoordinator,
    pool: Arc<BufferPool>,
    queue: Arc<PublishQueue>,
    workers: WorkerPool,
    instrumentation: Option<Arc<Instrumentation>>,
}

impl CapturePipeline {
    /// Start a pipeline publishing bincode-encoded messages
    pub fn new(
        config: PipelineConfig,
        surface: Arc<dyn RenderSurface>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        Self::with_encoder(config, surface, transport, Box::new(BincodeEncoder))
    }

    /// Start a pipeline with a custom wire encoding
    pub fn with_encoder(
        config: PipelineConfig,
        surface: Arc<dyn RenderSurface>,
        transport: Arc<dyn Transport>,
        encoder: Box<dyn MessageEncoder>,
    ) -> Result<Self> {
        config.validate()?;

        let instrumentation = config
            .enable_instrumentation
            .then(|| Arc::new(Instrumentation::new(config.instrumentation_interval())));
        let pool = Arc::new(BufferPool::new(config.pool.clone())?);
        let queue = Arc::new(PublishQueue::new());

        let publisher = Arc::new(TaskPublisher::new(
            encoder,
            transport,
            Arc::clone(&pool),
            instrumentation.clone(),
        ));
        let workers = WorkerPool::spawn(Arc::clone(&queue), publisher, config.worker_options())?;

        let coordinator = ReadbackCoordinator::new(
            Arc::clone(&surface),
            Arc::clone(&pool),
            Arc::clone(&queue),
            config.readback_options(),
            instrumentation.clone(),
        );

        log::info!(
            "capture pipeline started: {} workers, {} readback",
            config.worker_count,
            if config.use_async_readback {
                "async"
            } else {
                "sync"
            }
        );

        Ok(Self {
            scheduler: CaptureScheduler::new(config.backpressure),
            registry: CameraRegistry::new(),
            config,
            surface,
            coordinator,
            pool,
            queue,
            workers,
            instrumentation,
        })
    }

    /// Register a camera under a fresh id
    pub fn register_camera(&self, settings: CameraSettings) -> Result<CameraId> {
        let camera = self.registry.register(settings)?;
        log::info!("registered {} as {}", camera.settings().name, camera.id());
        Ok(camera.id())
    }

    /// Register a camera under the id the render surface uses for it
    pub fn register_camera_with_id(&self, id: CameraId, settings: CameraSettings) -> Result<()> {
        let camera = self.registry.register_with_id(id, settings)?;
        log::info!("registered {} as {}", camera.settings().name, id);
        Ok(())
    }

    /// Register every camera the surface reports that is not registered yet.
    ///
    /// Settings come from the config entry with the camera's name, or the
    /// defaults when there is none. Returns the newly registered ids.
    pub fn register_active_cameras(&self) -> Result<Vec<CameraId>> {
        let mut registered = Vec::new();
        for active in self.surface.active_cameras() {
            if self.registry.contains(active.id) {
                continue;
            }
            let settings = self
                .config
                .camera_settings(&active.name)
                .cloned()
                .unwrap_or_else(|| CameraSettings::new(active.name.clone()));
            self.register_camera_with_id(active.id, settings)?;
            registered.push(active.id);
        }
        Ok(registered)
    }

    /// Remove a camera. Transfers still in flight for it complete as no-ops.
    pub fn deregister_camera(&self, id: CameraId) -> Result<()> {
        let camera = self.registry.deregister(id)?;
        self.surface.release_camera_resources(id);
        log::info!("deregistered {} ({})", camera.settings().name, id);
        Ok(())
    }

    pub fn camera(&self, id: CameraId) -> Option<Arc<CameraCaptureContext>> {
        self.registry.get(id)
    }

    pub fn cameras(&self) -> Vec<CameraId> {
        self.registry.ids()
    }

    /// Apply a scene/input command; takes effect on the next tick
    pub fn apply(&self, command: SchedulerCommand) -> Result<()> {
        self.scheduler.apply(&self.registry, command)
    }

    /// Trigger one capture of `camera`, or of every camera
    pub fn request_capture(&self, camera: Option<CameraId>) -> Result<()> {
        self.scheduler.request_capture(&self.registry, camera)
    }

    /// Run the scheduler over every camera. Never blocks on I/O.
    pub fn tick(&self, now: Instant) -> TickReport {
        let start = Instant::now();
        let mut report = TickReport::default();
        let queue_len = self.queue.len();
        let global = self.scheduler.take_global_trigger();

        for camera in self.registry.snapshot() {
            self.tick_camera(&camera, global, queue_len, now, &mut report);
        }

        instrumentation::record(&self.instrumentation, "tick", start.elapsed());
        if let Some(instr) = &self.instrumentation {
            instr.maybe_emit(now);
        }
        report
    }

    /// Run the scheduler for one camera after it finished rendering a frame
    pub fn on_frame_rendered(&self, camera: CameraId, now: Instant) -> Result<TickReport> {
        let camera = self.registry.require(camera)?;
        let mut report = TickReport::default();
        self.tick_camera(&camera, false, self.queue.len(), now, &mut report);
        Ok(report)
    }

    fn tick_camera(
        &self,
        camera: &Arc<CameraCaptureContext>,
        global: bool,
        queue_len: usize,
        now: Instant,
        report: &mut TickReport,
    ) {
        match self.scheduler.evaluate(camera, global, queue_len, now) {
            Decision::Dispatch(cycle) => {
                report.dispatched += 1;
                let sequence = cycle.sequence;
                if let Err(e) = self.coordinator.dispatch(cycle) {
                    report.failed += 1;
                    log::warn!("{} capture {} incomplete: {}", camera.id(), sequence, e);
                }
            }
            Decision::Skip(reason) => report.record(reason),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn queue(&self) -> &Arc<PublishQueue> {
        &self.queue
    }

    pub fn coordinator(&self) -> &ReadbackCoordinator {
        &self.coordinator
    }

    pub fn instrumentation(&self) -> Option<&Arc<Instrumentation>> {
        self.instrumentation.as_ref()
    }

    /// Whether the workers are still running
    pub fn is_running(&self) -> bool {
        self.workers.is_running()
    }

    pub fn stats(&self) -> PipelineStats {
        let queue = self.queue.stats();
        let publisher = self.workers.publisher().stats();
        PipelineStats {
            cameras: self.registry.len(),
            scheduler: self.scheduler.stats().snapshot(),
            readback: self.coordinator.stats().snapshot(),
            byte_pool: self.pool.bytes().stats(),
            float_pool: self.pool.floats().stats(),
            queue_len: self.queue.len(),
            enqueued: queue.enqueued.load(Ordering::Relaxed),
            discarded: queue.discarded.load(Ordering::Relaxed),
            peak_queue_len: queue.peak_depth.load(Ordering::Relaxed),
            published: publisher.published(),
            publish_failures: publisher.failures(),
        }
    }

    /// Stop the workers and drop whatever is still queued. Idempotent.
    pub fn shutdown(&mut self) {
        if !self.workers.is_running() {
            return;
        }
        let joined = self.workers.shutdown();
        let stats = self.stats();
        log::info!(
            "capture pipeline stopped: {} workers joined, {} published, {} dropped",
            joined,
            stats.published,
            stats.discarded
        );
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
