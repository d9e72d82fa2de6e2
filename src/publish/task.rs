//! Units of work handed from capture completion to the publish workers

use std::sync::Arc;

use crate::{
    buffers::PooledBuffer,
    camera::{CameraCaptureContext, CameraId, Modality},
    intrinsics::CameraIntrinsics,
};

use super::messages::Time;

/// Capture metadata attached to every outgoing message
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureMeta {
    pub camera: CameraId,
    pub topic: Arc<str>,
    pub frame_id: Arc<str>,
    pub sequence: u32,
    /// Capture-start timestamp
    pub stamp: Time,
}

impl CaptureMeta {
    /// Metadata for `modality` of `camera` in the cycle numbered `sequence`
    pub fn for_camera(
        camera: &CameraCaptureContext,
        modality: Modality,
        sequence: u32,
        stamp: Time,
    ) -> Self {
        let (topic, frame_id) = camera.naming().for_modality(modality);
        Self {
            camera: camera.id(),
            topic: Arc::clone(topic),
            frame_id: Arc::clone(frame_id),
            sequence,
            stamp,
        }
    }
}

/// Image payload backed by a pooled buffer
#[derive(Debug)]
pub struct ImageTask<T: Copy + Default> {
    pub meta: CaptureMeta,
    pub width: u32,
    pub height: u32,
    /// Row-major samples, `width * height * channels` long
    pub data: PooledBuffer<T>,
}

/// Calibration payload, computed synchronously
#[derive(Debug)]
pub struct IntrinsicsTask {
    pub meta: CaptureMeta,
    pub intrinsics: CameraIntrinsics,
}

/// A message waiting to be serialized and sent.
///
/// Owned by exactly one party at a time; dropping it returns its buffers.
#[derive(Debug)]
pub enum PublishTask {
    Depth(ImageTask<f32>),
    Rgb(ImageTask<u8>),
    Intrinsics(IntrinsicsTask),
}

impl PublishTask {
    pub fn meta(&self) -> &CaptureMeta {
        match self {
            PublishTask::Depth(task) => &task.meta,
            PublishTask::Rgb(task) => &task.meta,
            PublishTask::Intrinsics(task) => &task.meta,
        }
    }

    pub fn modality(&self) -> Modality {
        match self {
            PublishTask::Depth(_) => Modality::Depth,
            PublishTask::Rgb(_) => Modality::Rgb,
            PublishTask::Intrinsics(_) => Modality::Intrinsics,
        }
    }

    pub fn topic(&self) -> &str {
        &self.meta().topic
    }

    pub fn sequence(&self) -> u32 {
        self.meta().sequence
    }

    /// Rough serialized size, used to size the output buffer
    pub fn size_hint(&self) -> usize {
        const HEADER_ALLOWANCE: usize = 256;
        let payload = match self {
            PublishTask::Depth(task) => task.data.len() * std::mem::size_of::<f32>(),
            PublishTask::Rgb(task) => task.data.len(),
            PublishTask::Intrinsics(_) => 41 * std::mem::size_of::<f64>(),
        };
        payload + HEADER_ALLOWANCE
    }
}
