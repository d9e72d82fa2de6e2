//! Per-tick capture scheduling with backpressure
//!
//! Each tick the scheduler walks the registered cameras and decides which are
//! due, either because a manual trigger was raised since the last tick or
//! because their periodic deadline has passed. A due camera is dropped (not
//! deferred) while the publish queue is over its threshold, and a modality is
//! skipped while its previous readback is still in flight.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use crate::{
    camera::{CameraCaptureContext, CameraId, CameraRegistry, Modality, PendingGuard},
    config::BackpressureConfig,
    error::Result,
    publish::Time,
};

/// Scene/input events applied between ticks
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchedulerCommand {
    /// Trigger one capture of a camera, or of every camera when `None`
    RequestCapture(Option<CameraId>),
    SetContinuous { camera: CameraId, enabled: bool },
    SetRate { camera: CameraId, hz: f64 },
    SetEnabled {
        camera: CameraId,
        modality: Modality,
        enabled: bool,
    },
}

/// Why a camera produced nothing this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Deregistered
    Inactive,
    /// Every modality switched off
    Disabled,
    /// Neither triggered nor periodically due
    NotDue,
    /// Publish queue over threshold
    Backpressure,
    /// Every requested readback still in flight
    Pending,
}

/// One dispatched capture cycle.
///
/// Holds the in-flight claims for the modalities that will be read back; the
/// claims travel with the requests and clear when their completion finishes.
#[derive(Debug)]
pub struct CaptureCycle {
    pub camera: Arc<CameraCaptureContext>,
    pub sequence: u32,
    pub stamp: Time,
    pub depth: Option<PendingGuard>,
    pub rgb: Option<PendingGuard>,
    pub intrinsics: bool,
}

/// Result of evaluating one camera
#[derive(Debug)]
pub enum Decision {
    Dispatch(CaptureCycle),
    Skip(SkipReason),
}

/// Scheduler counters
#[derive(Debug, Default)]
pub struct SchedulerStats {
    pub dispatched: AtomicU64,
    pub backpressure_skips: AtomicU64,
    pub pending_skips: AtomicU64,
    /// Single modalities left out of an otherwise dispatched cycle
    pub modality_skips: AtomicU64,
}

impl SchedulerStats {
    pub fn snapshot(&self) -> SchedulerStatsSnapshot {
        SchedulerStatsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            backpressure_skips: self.backpressure_skips.load(Ordering::Relaxed),
            pending_skips: self.pending_skips.load(Ordering::Relaxed),
            modality_skips: self.modality_skips.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SchedulerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStatsSnapshot {
    pub dispatched: u64,
    pub backpressure_skips: u64,
    pub pending_skips: u64,
    pub modality_skips: u64,
}

/// Decides which cameras capture on each tick
#[derive(Debug)]
pub struct CaptureScheduler {
    backpressure: BackpressureConfig,
    global_trigger: AtomicBool,
    stats: SchedulerStats,
}

impl CaptureScheduler {
    pub fn new(backpressure: BackpressureConfig) -> Self {
        Self {
            backpressure,
            global_trigger: AtomicBool::new(false),
            stats: SchedulerStats::default(),
        }
    }

    /// Raise the trigger of one camera, or the global trigger
    pub fn request_capture(
        &self,
        registry: &CameraRegistry,
        camera: Option<CameraId>,
    ) -> Result<()> {
        match camera {
            Some(id) => registry.require(id)?.request_capture(),
            None => self.global_trigger.store(true, Ordering::Release),
        }
        Ok(())
    }

    /// Apply a scene/input command
    pub fn apply(&self, registry: &CameraRegistry, command: SchedulerCommand) -> Result<()> {
        match command {
            SchedulerCommand::RequestCapture(camera) => self.request_capture(registry, camera)?,
            SchedulerCommand::SetContinuous { camera, enabled } => {
                registry.require(camera)?.set_continuous(enabled);
                log::debug!("{} continuous capture {}", camera, enabled);
            }
            SchedulerCommand::SetRate { camera, hz } => {
                registry.require(camera)?.set_rate(hz)?;
                log::debug!("{} rate set to {} Hz", camera, hz);
            }
            SchedulerCommand::SetEnabled {
                camera,
                modality,
                enabled,
            } => {
                registry.require(camera)?.set_enabled(modality, enabled);
                log::debug!("{} {} capture {}", camera, modality, enabled);
            }
        }
        Ok(())
    }

    /// Consume the global trigger
    pub fn take_global_trigger(&self) -> bool {
        self.global_trigger.swap(false, Ordering::AcqRel)
    }

    /// Evaluate every camera for one tick, returning the dispatched cycles
    pub fn tick(
        &self,
        cameras: &[Arc<CameraCaptureContext>],
        queue_len: usize,
        now: Instant,
    ) -> Vec<CaptureCycle> {
        let global = self.take_global_trigger();
        cameras
            .iter()
            .filter_map(|camera| match self.evaluate(camera, global, queue_len, now) {
                Decision::Dispatch(cycle) => Some(cycle),
                Decision::Skip(_) => None,
            })
            .collect()
    }

    /// Decide what `camera` does at `now`.
    ///
    /// A manual trigger is consumed and a passed periodic deadline advanced even
    /// when the cycle is then dropped; the sequence number only moves on
    /// dispatch.
    pub fn evaluate(
        &self,
        camera: &Arc<CameraCaptureContext>,
        global_trigger: bool,
        queue_len: usize,
        now: Instant,
    ) -> Decision {
        if !camera.is_active() {
            return Decision::Skip(SkipReason::Inactive);
        }
        if !camera.any_enabled() {
            return Decision::Skip(SkipReason::Disabled);
        }
        if !camera.take_due(global_trigger, now) {
            return Decision::Skip(SkipReason::NotDue);
        }

        if self.backpressure.should_skip(queue_len) {
            self.stats.backpressure_skips.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "{} capture dropped, {} tasks queued (limit {})",
                camera.id(),
                queue_len,
                self.backpressure.max_queue_len
            );
            return Decision::Skip(SkipReason::Backpressure);
        }

        let depth = self.claim(camera, Modality::Depth);
        let rgb = self.claim(camera, Modality::Rgb);
        let wants_images = camera.is_enabled(Modality::Depth) || camera.is_enabled(Modality::Rgb);

        if wants_images && depth.is_none() && rgb.is_none() {
            self.stats.pending_skips.fetch_add(1, Ordering::Relaxed);
            log::debug!("{} capture skipped, readbacks still pending", camera.id());
            return Decision::Skip(SkipReason::Pending);
        }

        let sequence = camera.advance_sequence();
        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);

        Decision::Dispatch(CaptureCycle {
            camera: Arc::clone(camera),
            sequence,
            stamp: Time::now(),
            depth,
            rgb,
            intrinsics: camera.is_enabled(Modality::Intrinsics),
        })
    }

    pub fn backpressure(&self) -> &BackpressureConfig {
        &self.backpressure
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    fn claim(
        &self,
        camera: &Arc<CameraCaptureContext>,
        modality: Modality,
    ) -> Option<PendingGuard> {
        if !camera.is_enabled(modality) {
            return None;
        }
        let guard = camera.try_claim(modality);
        if guard.is_none() {
            self.stats.modality_skips.fetch_add(1, Ordering::Relaxed);
            log::debug!("{} {} readback still pending", camera.id(), modality);
        }
        guard
    }
}

impl Default for CaptureScheduler {
    fn default() -> Self {
        Self::new(BackpressureConfig::default())
    }
}
