//! Publish side of the pipeline: tasks, the shared queue, wire encoding,
//! transports and the worker pool draining the queue.

pub mod encoder;
pub mod messages;
pub mod queue;
pub mod task;
pub mod transport;
pub mod workers;

pub use encoder::{encode_task, BincodeEncoder, MessageEncoder};
pub use messages::{
    CameraInfoMessage, DecodedCameraInfo, DecodedHeader, DecodedImage, Header, ImageMessage,
    RegionOfInterest, Time, ENCODING_DEPTH, ENCODING_RGB,
};
pub use queue::{PublishQueue, QueueStats};
pub use task::{CaptureMeta, ImageTask, IntrinsicsTask, PublishTask};
pub use transport::{ChannelTransport, Envelope, LogTransport, Transport};
pub use workers::{PublishStats, TaskPublisher, WorkerPool, WorkerPoolOptions};
