//! Per-camera capture state

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use crate::{
    depth::DepthRange,
    error::{CaptureError, Result},
};

use super::settings::{CameraId, CameraNaming, CameraSettings, Modality};

/// Timing and trigger state touched by the scheduling tick
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleState {
    /// Earliest instant of the next periodic capture; `None` means due now
    pub next_capture_time: Option<Instant>,
    /// Periodic rate in Hz
    pub publish_rate: f64,
    /// Periodic capture enabled
    pub continuous: bool,
    /// Manual trigger raised since the last tick
    pub capture_requested: bool,
}

/// State of one registered camera
///
/// Identity, settings and naming are fixed at registration. Modality flags and
/// timing change through scheduler commands; the pending markers and the
/// sequence counter are shared with readback completions, which may run on
/// another thread.
#[derive(Debug)]
pub struct CameraCaptureContext {
    id: CameraId,
    settings: CameraSettings,
    naming: CameraNaming,
    capture_depth: AtomicBool,
    capture_rgb: AtomicBool,
    publish_intrinsics: AtomicBool,
    schedule: Mutex<ScheduleState>,
    sequence: AtomicU32,
    depth_pending: AtomicBool,
    rgb_pending: AtomicBool,
    active: AtomicBool,
}

impl CameraCaptureContext {
    /// Create the context for a camera being registered
    pub fn new(id: CameraId, settings: CameraSettings) -> Result<Self> {
        settings.validate()?;

        Ok(Self {
            id,
            naming: settings.naming(),
            capture_depth: AtomicBool::new(settings.capture_depth),
            capture_rgb: AtomicBool::new(settings.capture_rgb),
            publish_intrinsics: AtomicBool::new(settings.publish_intrinsics),
            schedule: Mutex::new(ScheduleState {
                next_capture_time: None,
                publish_rate: settings.publish_rate,
                continuous: settings.continuous,
                capture_requested: false,
            }),
            sequence: AtomicU32::new(0),
            depth_pending: AtomicBool::new(false),
            rgb_pending: AtomicBool::new(false),
            active: AtomicBool::new(true),
            settings,
        })
    }

    pub fn id(&self) -> CameraId {
        self.id
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    pub fn naming(&self) -> &CameraNaming {
        &self.naming
    }

    pub fn depth_range(&self) -> DepthRange {
        self.settings.depth
    }

    /// Whether `modality` is currently captured for this camera
    pub fn is_enabled(&self, modality: Modality) -> bool {
        self.flag(modality).load(Ordering::Relaxed)
    }

    /// Toggle capture of `modality`
    pub fn set_enabled(&self, modality: Modality, enabled: bool) {
        self.flag(modality).store(enabled, Ordering::Relaxed);
    }

    /// Whether any modality is enabled
    pub fn any_enabled(&self) -> bool {
        self.is_enabled(Modality::Depth)
            || self.is_enabled(Modality::Rgb)
            || self.is_enabled(Modality::Intrinsics)
    }

    /// Raise the manual trigger; consumed by the next tick
    pub fn request_capture(&self) {
        self.schedule.lock().unwrap().capture_requested = true;
    }

    /// Switch periodic capture on or off. Turning it on makes the camera due
    /// on the next tick.
    pub fn set_continuous(&self, continuous: bool) {
        let mut schedule = self.schedule.lock().unwrap();
        if continuous && !schedule.continuous {
            schedule.next_capture_time = None;
        }
        schedule.continuous = continuous;
    }

    /// Change the periodic rate
    pub fn set_rate(&self, hz: f64) -> Result<()> {
        if !(hz.is_finite() && hz > 0.0) {
            return Err(CaptureError::invalid_parameter(
                "publish_rate",
                "Rate must be positive and finite",
            ));
        }
        self.schedule.lock().unwrap().publish_rate = hz;
        Ok(())
    }

    /// Snapshot of the timing state
    pub fn schedule(&self) -> ScheduleState {
        self.schedule.lock().unwrap().clone()
    }

    /// Decide whether the camera is due at `now`, consuming the manual trigger.
    ///
    /// A periodic deadline that has passed moves to `now + 1/rate`; missed
    /// periods are not caught up.
    pub(crate) fn take_due(&self, global_trigger: bool, now: Instant) -> bool {
        let mut schedule = self.schedule.lock().unwrap();
        let manual = std::mem::take(&mut schedule.capture_requested) || global_trigger;

        let periodic = schedule.continuous
            && schedule.publish_rate > 0.0
            && schedule.next_capture_time.map_or(true, |deadline| now >= deadline);
        if periodic {
            schedule.next_capture_time =
                Some(now + Duration::from_secs_f64(1.0 / schedule.publish_rate));
        }

        manual || periodic
    }

    /// Number of capture cycles dispatched so far
    pub fn sequence_number(&self) -> u32 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Consume one sequence number for a new capture cycle
    pub(crate) fn advance_sequence(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::AcqRel)
    }

    /// Whether a readback for `modality` is in flight
    pub fn is_pending(&self, modality: Modality) -> bool {
        self.pending_flag(modality)
            .map_or(false, |flag| flag.load(Ordering::Acquire))
    }

    /// Claim the in-flight marker for `modality`.
    ///
    /// Returns `None` when a readback is already outstanding, or for modalities
    /// that never go through a readback. The marker clears when the guard drops.
    pub fn try_claim(self: &Arc<Self>, modality: Modality) -> Option<PendingGuard> {
        let flag = self.pending_flag(modality)?;
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(PendingGuard {
            camera: Arc::clone(self),
            modality,
        })
    }

    /// Still registered
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    fn flag(&self, modality: Modality) -> &AtomicBool {
        match modality {
            Modality::Depth => &self.capture_depth,
            Modality::Rgb => &self.capture_rgb,
            Modality::Intrinsics => &self.publish_intrinsics,
        }
    }

    fn pending_flag(&self, modality: Modality) -> Option<&AtomicBool> {
        match modality {
            Modality::Depth => Some(&self.depth_pending),
            Modality::Rgb => Some(&self.rgb_pending),
            Modality::Intrinsics => None,
        }
    }
}

/// Exclusive claim on a camera's in-flight readback slot
#[derive(Debug)]
pub struct PendingGuard {
    camera: Arc<CameraCaptureContext>,
    modality: Modality,
}

impl PendingGuard {
    pub fn camera(&self) -> &Arc<CameraCaptureContext> {
        &self.camera
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Some(flag) = self.camera.pending_flag(self.modality) {
            flag.store(false, Ordering::Release);
        }
    }
}
