//! Readback coordination
//!
//! Issues at most one transfer per camera and modality, and turns finished
//! transfers into publish tasks: samples are normalized into pooled buffers,
//! depth is flipped and linearized, then the task goes on the publish queue.
//! Completion never waits on the transport.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use crate::{
    buffers::BufferPool,
    camera::{CameraCaptureContext, Modality, PendingGuard},
    depth::{flip_rows, flip_vertical},
    error::{CaptureError, Result},
    instrumentation::{self, Instrumentation},
    intrinsics::CameraIntrinsics,
    publish::{CaptureMeta, ImageTask, IntrinsicsTask, PublishQueue, PublishTask, Time},
    scheduler::CaptureCycle,
};

use super::{
    convert::{copy_depth_samples, copy_rgb, pixel_stride},
    surface::{ReadbackData, ReadbackResult, RenderSurface, TextureHandle},
};

/// How transfers are performed and post-processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadbackOptions {
    /// Callback-based transfers; blocking reads otherwise
    pub use_async: bool,
    pub flip_depth_rows: bool,
    pub flip_color_rows: bool,
}

impl Default for ReadbackOptions {
    fn default() -> Self {
        Self {
            use_async: true,
            flip_depth_rows: true,
            flip_color_rows: false,
        }
    }
}

/// Readback counters
#[derive(Debug, Default)]
pub struct ReadbackStats {
    pub issued: AtomicU64,
    pub completed: AtomicU64,
    pub transfer_errors: AtomicU64,
    pub stride_errors: AtomicU64,
    pub missing_textures: AtomicU64,
    /// Completions that arrived after their camera was deregistered
    pub stale_completions: AtomicU64,
    /// Short depth transfers padded with the far plane
    pub padded_transfers: AtomicU64,
}

impl ReadbackStats {
    pub fn snapshot(&self) -> ReadbackStatsSnapshot {
        ReadbackStatsSnapshot {
            issued: self.issued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            transfer_errors: self.transfer_errors.load(Ordering::Relaxed),
            stride_errors: self.stride_errors.load(Ordering::Relaxed),
            missing_textures: self.missing_textures.load(Ordering::Relaxed),
            stale_completions: self.stale_completions.load(Ordering::Relaxed),
            padded_transfers: self.padded_transfers.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ReadbackStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadbackStatsSnapshot {
    pub issued: u64,
    pub completed: u64,
    pub transfer_errors: u64,
    pub stride_errors: u64,
    pub missing_textures: u64,
    pub stale_completions: u64,
    pub padded_transfers: u64,
}

impl ReadbackStatsSnapshot {
    /// Frames lost to transfer or layout problems
    pub fn dropped_frames(&self) -> u64 {
        self.transfer_errors + self.stride_errors
    }
}

/// A transfer in flight, carrying the claim on its camera's slot
struct InFlight {
    guard: PendingGuard,
    meta: CaptureMeta,
    width: u32,
    height: u32,
}

impl InFlight {
    /// Size of the delivered image: what the surface reports, or the
    /// requested size when it reports none
    fn layout(&self, data: &ReadbackData) -> (u32, u32) {
        if data.width == 0 || data.height == 0 {
            (self.width, self.height)
        } else {
            (data.width, data.height)
        }
    }
}

/// Shared state needed to finish a transfer, on whichever thread it completes
struct CompletionSink {
    pool: Arc<BufferPool>,
    queue: Arc<PublishQueue>,
    stats: ReadbackStats,
    instrumentation: Option<Arc<Instrumentation>>,
    options: ReadbackOptions,
}

impl CompletionSink {
    fn complete(&self, job: InFlight, result: ReadbackResult) {
        let start = Instant::now();
        let operation = match job.guard.modality() {
            Modality::Depth => "depth_completion",
            _ => "rgb_completion",
        };
        self.finish(job, result);
        instrumentation::record(&self.instrumentation, operation, start.elapsed());
    }

    fn finish(&self, job: InFlight, result: ReadbackResult) {
        let modality = job.guard.modality();
        let camera = Arc::clone(job.guard.camera());

        if !camera.is_active() {
            self.stale(&camera, modality);
            return;
        }

        let data = match result {
            Ok(data) => data,
            Err(e) => {
                self.stats.transfer_errors.fetch_add(1, Ordering::Relaxed);
                log::warn!("{} {} readback failed: {}", camera.id(), modality, e);
                return;
            }
        };

        let task = match modality {
            Modality::Depth => self.depth_task(&camera, &job, data),
            Modality::Rgb => self.rgb_task(&job, data),
            Modality::Intrinsics => return,
        };

        match task {
            Ok(task) => self.enqueue(&camera, modality, task),
            Err(e) => {
                if matches!(e, CaptureError::UnsupportedStride { .. }) {
                    self.stats.stride_errors.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.stats.transfer_errors.fetch_add(1, Ordering::Relaxed);
                }
                log::warn!("{} {} frame dropped: {}", camera.id(), modality, e);
            }
        }
        // job.guard drops here, releasing the slot after the task is queued
    }

    /// Queue a finished frame unless its camera went away while the frame
    /// was being processed
    fn enqueue(&self, camera: &CameraCaptureContext, modality: Modality, task: PublishTask) {
        if !camera.is_active() {
            self.stale(camera, modality);
            return;
        }
        self.stats.completed.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.queue.push(task) {
            log::debug!("{} {} frame not queued: {}", camera.id(), modality, e);
        }
    }

    fn stale(&self, camera: &CameraCaptureContext, modality: Modality) {
        self.stats.stale_completions.fetch_add(1, Ordering::Relaxed);
        log::debug!("{} {} readback finished after deregistration", camera.id(), modality);
    }

    fn depth_task(
        &self,
        camera: &CameraCaptureContext,
        job: &InFlight,
        data: ReadbackData,
    ) -> Result<PublishTask> {
        let range = camera.depth_range();
        let (out_width, out_height) = job.layout(&data);
        let (width, height) = (out_width as usize, out_height as usize);
        let mut samples = self.pool.acquire_floats(width * height);

        let copied = copy_depth_samples(&data.bytes, &mut samples, range.far_plane_sample());
        if copied < samples.len() {
            self.stats.padded_transfers.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "{} depth transfer short by {} samples",
                camera.id(),
                samples.len() - copied
            );
        }

        if self.options.flip_depth_rows {
            flip_vertical(&mut samples, width, height);
        }
        range.linearize_in_place(&mut samples);

        Ok(PublishTask::Depth(ImageTask {
            meta: job.meta.clone(),
            width: out_width,
            height: out_height,
            data: samples,
        }))
    }

    fn rgb_task(&self, job: &InFlight, data: ReadbackData) -> Result<PublishTask> {
        let (out_width, out_height) = job.layout(&data);
        let (width, height) = (out_width as usize, out_height as usize);
        let pixels = width * height;
        let stride = pixel_stride(data.bytes.len(), pixels)?;

        let mut rgb = self.pool.acquire_bytes(pixels * 3);
        copy_rgb(&data.bytes, stride, &mut rgb)?;
        if self.options.flip_color_rows {
            flip_rows(&mut rgb, width * 3, height);
        }

        Ok(PublishTask::Rgb(ImageTask {
            meta: job.meta.clone(),
            width: out_width,
            height: out_height,
            data: rgb,
        }))
    }
}

/// Issues transfers against the render surface and finishes them into tasks
pub struct ReadbackCoordinator {
    surface: Arc<dyn RenderSurface>,
    sink: Arc<CompletionSink>,
}

impl ReadbackCoordinator {
    pub fn new(
        surface: Arc<dyn RenderSurface>,
        pool: Arc<BufferPool>,
        queue: Arc<PublishQueue>,
        options: ReadbackOptions,
        instrumentation: Option<Arc<Instrumentation>>,
    ) -> Self {
        Self {
            surface,
            sink: Arc::new(CompletionSink {
                pool,
                queue,
                stats: ReadbackStats::default(),
                instrumentation,
                options,
            }),
        }
    }

    /// Start every part of a dispatched cycle.
    ///
    /// Each modality is attempted even if another fails; the first error is
    /// returned after all were tried.
    pub fn dispatch(&self, cycle: CaptureCycle) -> Result<()> {
        let CaptureCycle {
            camera,
            sequence,
            stamp,
            depth,
            rgb,
            intrinsics,
        } = cycle;

        let mut first_error = None;
        if intrinsics {
            if let Err(e) = self.publish_intrinsics(&camera, sequence, stamp) {
                first_error.get_or_insert(e);
            }
        }
        if let Some(guard) = depth {
            if let Err(e) = self.issue_depth(guard, sequence, stamp) {
                first_error.get_or_insert(e);
            }
        }
        if let Some(guard) = rgb {
            if let Err(e) = self.issue_rgb(guard, sequence, stamp) {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Request a depth transfer, refusing while one is in flight
    pub fn request_depth(
        &self,
        camera: &Arc<CameraCaptureContext>,
        sequence: u32,
        stamp: Time,
    ) -> Result<()> {
        let guard = Self::claim(camera, Modality::Depth)?;
        self.issue_depth(guard, sequence, stamp)
    }

    /// Request a colour transfer, refusing while one is in flight
    pub fn request_rgb(
        &self,
        camera: &Arc<CameraCaptureContext>,
        sequence: u32,
        stamp: Time,
    ) -> Result<()> {
        let guard = Self::claim(camera, Modality::Rgb)?;
        self.issue_rgb(guard, sequence, stamp)
    }

    /// Compute the camera's calibration and queue it
    pub fn publish_intrinsics(
        &self,
        camera: &CameraCaptureContext,
        sequence: u32,
        stamp: Time,
    ) -> Result<()> {
        let native = self.native_resolution(camera)?;
        let output = camera.settings().output_size(native);
        let intrinsics = CameraIntrinsics::for_output(camera.settings().fov_y_deg, native, output);

        self.sink
            .queue
            .push(PublishTask::Intrinsics(IntrinsicsTask {
                meta: CaptureMeta::for_camera(camera, Modality::Intrinsics, sequence, stamp),
                intrinsics,
            }))
    }

    /// Issue a depth transfer for an already claimed slot
    pub fn issue_depth(&self, guard: PendingGuard, sequence: u32, stamp: Time) -> Result<()> {
        let camera = Arc::clone(guard.camera());
        let id = camera.id();

        let Some(texture) = self.surface.depth_texture(id) else {
            self.sink.stats.missing_textures.fetch_add(1, Ordering::Relaxed);
            log::warn!("{} has no depth texture, skipping this cycle", id);
            return Err(CaptureError::missing_texture(id.0, "no depth texture"));
        };

        let (width, height) = camera.settings().output_size(texture.size());
        let texture = if (width, height) != texture.size() {
            let target = self.surface.depth_target(id, width, height)?;
            self.surface.blit(&texture, &target)?;
            target
        } else {
            texture
        };

        self.issue(
            texture,
            InFlight {
                meta: CaptureMeta::for_camera(&camera, Modality::Depth, sequence, stamp),
                guard,
                width,
                height,
            },
        );
        Ok(())
    }

    /// Issue a colour transfer for an already claimed slot
    pub fn issue_rgb(&self, guard: PendingGuard, sequence: u32, stamp: Time) -> Result<()> {
        let camera = Arc::clone(guard.camera());
        let native = self.native_resolution(&camera)?;
        let (width, height) = camera.settings().output_size(native);
        let texture = self.surface.color_target(camera.id(), width, height)?;

        self.issue(
            texture,
            InFlight {
                meta: CaptureMeta::for_camera(&camera, Modality::Rgb, sequence, stamp),
                guard,
                width,
                height,
            },
        );
        Ok(())
    }

    pub fn options(&self) -> ReadbackOptions {
        self.sink.options
    }

    pub fn stats(&self) -> &ReadbackStats {
        &self.sink.stats
    }

    fn issue(&self, texture: TextureHandle, job: InFlight) {
        self.sink.stats.issued.fetch_add(1, Ordering::Relaxed);
        if self.sink.options.use_async {
            let sink = Arc::clone(&self.sink);
            self.surface.request_readback(
                &texture,
                Box::new(move |result: ReadbackResult| sink.complete(job, result)),
            );
        } else {
            let result = self.surface.read_pixels(&texture);
            self.sink.complete(job, result);
        }
    }

    fn native_resolution(&self, camera: &CameraCaptureContext) -> Result<(u32, u32)> {
        self.surface.native_resolution(camera.id()).ok_or_else(|| {
            self.sink.stats.missing_textures.fetch_add(1, Ordering::Relaxed);
            log::warn!("{} is not known to the render surface", camera.id());
            CaptureError::missing_texture(camera.id().0, "camera not rendering")
        })
    }

    fn claim(camera: &Arc<CameraCaptureContext>, modality: Modality) -> Result<PendingGuard> {
        camera
            .try_claim(modality)
            .ok_or(CaptureError::ReadbackPending {
                camera: camera.id().0,
                modality: modality.as_str(),
            })
    }
}
