//! Wire-format encoding of publish tasks

use crate::{
    buffers::{BufferPool, PooledBuffer},
    error::Result,
};

use super::{
    messages::{
        CameraInfoMessage, DecodedCameraInfo, DecodedImage, Header, ImageMessage,
        RegionOfInterest, ENCODING_DEPTH, ENCODING_RGB,
    },
    task::{CaptureMeta, PublishTask},
};

/// Serializes outgoing messages into bytes for the transport
pub trait MessageEncoder: Send + Sync {
    /// Append the encoded image to `out`
    fn encode_image(&self, message: &ImageMessage<'_>, out: &mut Vec<u8>) -> Result<()>;

    /// Append the encoded calibration to `out`
    fn encode_camera_info(&self, message: &CameraInfoMessage<'_>, out: &mut Vec<u8>)
        -> Result<()>;
}

/// Little-endian bincode encoding of the serde message structs
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeEncoder;

impl BincodeEncoder {
    pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn decode_camera_info(bytes: &[u8]) -> Result<DecodedCameraInfo> {
        Ok(bincode::deserialize(bytes)?)
    }
}

impl MessageEncoder for BincodeEncoder {
    fn encode_image(&self, message: &ImageMessage<'_>, out: &mut Vec<u8>) -> Result<()> {
        bincode::serialize_into(out, message)?;
        Ok(())
    }

    fn encode_camera_info(
        &self,
        message: &CameraInfoMessage<'_>,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        bincode::serialize_into(out, message)?;
        Ok(())
    }
}

fn header(meta: &CaptureMeta) -> Header<'_> {
    Header {
        seq: meta.sequence,
        stamp: meta.stamp,
        frame_id: &meta.frame_id,
    }
}

/// Encode `task` into a pooled byte buffer.
///
/// Depth samples are staged as little-endian bytes in a second pooled buffer
/// that is released before returning.
pub fn encode_task(
    encoder: &dyn MessageEncoder,
    pool: &BufferPool,
    task: &PublishTask,
) -> Result<PooledBuffer<u8>> {
    let mut out = pool.acquire_bytes(task.size_hint());
    out.clear();

    match task {
        PublishTask::Depth(image) => {
            let mut staged = pool.acquire_bytes(image.data.len() * 4);
            for (dst, sample) in staged.chunks_exact_mut(4).zip(image.data.iter()) {
                dst.copy_from_slice(&sample.to_le_bytes());
            }
            let message = ImageMessage {
                header: header(&image.meta),
                height: image.height as i32,
                width: image.width as i32,
                encoding: ENCODING_DEPTH,
                is_bigendian: false,
                step: (image.width * 4) as i32,
                data: &staged,
            };
            encoder.encode_image(&message, out.vec_mut())?;
        }
        PublishTask::Rgb(image) => {
            let message = ImageMessage {
                header: header(&image.meta),
                height: image.height as i32,
                width: image.width as i32,
                encoding: ENCODING_RGB,
                is_bigendian: false,
                step: (image.width * 3) as i32,
                data: &image.data,
            };
            encoder.encode_image(&message, out.vec_mut())?;
        }
        PublishTask::Intrinsics(info) => {
            let k = &info.intrinsics;
            let message = CameraInfoMessage {
                header: header(&info.meta),
                height: k.height as i32,
                width: k.width as i32,
                distortion_model: &k.distortion_model,
                d: &k.d,
                k: k.k,
                r: k.r,
                p: k.p,
                binning_x: 0,
                binning_y: 0,
                roi: RegionOfInterest::full_frame(k.width as i32, k.height as i32),
            };
            encoder.encode_camera_info(&message, out.vec_mut())?;
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        camera::CameraId,
        intrinsics::CameraIntrinsics,
        publish::{
            messages::Time,
            task::{ImageTask, IntrinsicsTask},
        },
    };
    use std::sync::Arc;

    fn meta(sequence: u32) -> CaptureMeta {
        CaptureMeta {
            camera: CameraId(3),
            topic: Arc::from("/front/depth/image_raw"),
            frame_id: Arc::from("front_depth_optical_frame"),
            sequence,
            stamp: Time { sec: 10, nsec: 20 },
        }
    }

    #[test]
    fn test_depth_image_encoding() {
        let pool = BufferPool::default();
        let mut data = pool.acquire_floats(4);
        data.copy_from_slice(&[0.5, 1.0, 2.5, 100.0]);
        let task = PublishTask::Depth(ImageTask {
            meta: meta(9),
            width: 2,
            height: 2,
            data,
        });

        let bytes = encode_task(&BincodeEncoder, &pool, &task).unwrap();
        let image = BincodeEncoder::decode_image(&bytes).unwrap();

        assert_eq!(image.header.seq, 9);
        assert_eq!(image.header.stamp, Time { sec: 10, nsec: 20 });
        assert_eq!(image.header.frame_id, "front_depth_optical_frame");
        assert_eq!(image.encoding, "32FC1");
        assert_eq!((image.width, image.height, image.step), (2, 2, 8));
        assert!(!image.is_bigendian);
        assert_eq!(image.depth_samples(), vec![0.5, 1.0, 2.5, 100.0]);
    }

    #[test]
    fn test_camera_info_encoding() {
        let pool = BufferPool::default();
        let intrinsics = CameraIntrinsics::from_fov(60.0, 16.0 / 9.0, 640, 360);
        let task = PublishTask::Intrinsics(IntrinsicsTask {
            meta: meta(1),
            intrinsics: intrinsics.clone(),
        });

        let bytes = encode_task(&BincodeEncoder, &pool, &task).unwrap();
        let info = BincodeEncoder::decode_camera_info(&bytes).unwrap();

        assert_eq!(info.distortion_model, "plumb_bob");
        assert_eq!(info.k, intrinsics.k);
        assert_eq!(info.p, intrinsics.p);
        assert_eq!(info.roi, RegionOfInterest::full_frame(640, 360));
        assert_eq!((info.binning_x, info.binning_y), (0, 0));
    }

    #[test]
    fn test_staging_buffers_return_to_pool() {
        let pool = BufferPool::default();
        let task = PublishTask::Depth(ImageTask {
            meta: meta(0),
            width: 8,
            height: 8,
            data: pool.acquire_floats(64),
        });
        let bytes = encode_task(&BincodeEncoder, &pool, &task).unwrap();
        // staging buffer is already home, output buffer still out
        assert_eq!(pool.bytes().stats().outstanding, 1);
        drop(bytes);
        drop(task);
        assert_eq!(pool.outstanding(), 0);
    }
}
