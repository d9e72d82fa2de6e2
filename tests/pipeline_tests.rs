//! End-to-end pipeline tests against the synthetic render surface

use std::{
    sync::{mpsc::Receiver, Arc},
    thread,
    time::{Duration, Instant},
};

use sensorcast::{
    camera::{CameraId, CameraSettings, Modality},
    depth::DepthRange,
    pipeline::CapturePipeline,
    publish::{BincodeEncoder, ChannelTransport, Envelope},
    scheduler::SchedulerCommand,
    synthetic::{synthetic_distance, SyntheticSurface},
    PipelineConfig, PipelineConfigBuilder,
};

fn single_worker() -> PipelineConfig {
    PipelineConfigBuilder::new().worker_count(1).build().unwrap()
}

fn manual_camera(name: &str) -> CameraSettings {
    CameraSettings::new(name).with_continuous(false)
}

fn receive(receiver: &Receiver<Envelope>, count: usize) -> Vec<Envelope> {
    (0..count)
        .map(|_| receiver.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect()
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;

    #[test]
    fn test_capture_cycle_end_to_end() {
        let surface = Arc::new(SyntheticSurface::new());
        surface.add_camera(CameraId(1), "front", 4, 3);
        let (transport, receiver) = ChannelTransport::new();
        let pipeline =
            CapturePipeline::new(single_worker(), surface.clone(), Arc::new(transport)).unwrap();

        assert_eq!(pipeline.register_active_cameras().unwrap(), vec![CameraId(1)]);
        let report = pipeline.tick(Instant::now());
        assert_eq!(report.dispatched, 1);

        let mut envelopes = receive(&receiver, 3);
        envelopes.sort_by(|a, b| a.topic.cmp(&b.topic));
        let topics: Vec<&str> = envelopes.iter().map(|e| e.topic.as_str()).collect();
        assert_eq!(
            topics,
            vec!["/front/camera_info", "/front/depth/image_raw", "/front/rgb/image_raw"]
        );

        let info = BincodeEncoder::decode_camera_info(&envelopes[0].payload).unwrap();
        assert_eq!((info.width, info.height), (4, 3));
        assert_eq!(info.header.frame_id, "front_color_optical_frame");
        assert_eq!(info.d, vec![0.0; 5]);

        let depth = BincodeEncoder::decode_image(&envelopes[1].payload).unwrap();
        assert_eq!(depth.header.seq, 0);
        assert_eq!(depth.header.frame_id, "front_depth_optical_frame");
        assert_eq!(depth.encoding, "32FC1");
        assert_eq!((depth.width, depth.height, depth.step), (4, 3, 16));
        let samples = depth.depth_samples();
        let range = DepthRange::default();
        for row in 0..3u32 {
            let expected = synthetic_distance(&range, row, 3);
            let got = samples[row as usize * 4];
            assert!((got - expected).abs() < 1e-2 * expected);
        }

        let rgb = BincodeEncoder::decode_image(&envelopes[2].payload).unwrap();
        assert_eq!(rgb.encoding, "rgb8");
        assert_eq!(rgb.step, 12);
        assert_eq!(rgb.data.len(), 36);
        assert_eq!(rgb.header.stamp, depth.header.stamp);
        assert_eq!(rgb.header.seq, info.header.seq);
    }

    #[test]
    fn test_sequence_numbers_increase_per_cycle() {
        let surface = Arc::new(SyntheticSurface::new());
        surface.add_camera(CameraId(7), "side", 2, 2);
        let (transport, receiver) = ChannelTransport::new();
        let config =
            single_worker().with_camera(manual_camera("side").with_modalities(true, false, false));
        let pipeline = CapturePipeline::new(config, surface.clone(), Arc::new(transport)).unwrap();
        pipeline.register_active_cameras().unwrap();

        for _ in 0..5 {
            pipeline.request_capture(Some(CameraId(7))).unwrap();
            assert_eq!(pipeline.tick(Instant::now()).dispatched, 1);
        }
        // nothing pending, nothing triggered
        assert_eq!(pipeline.tick(Instant::now()).dispatched, 0);

        let seqs: Vec<u32> = receive(&receiver, 5)
            .iter()
            .map(|e| BincodeEncoder::decode_image(&e.payload).unwrap().header.seq)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        assert_eq!(pipeline.camera(CameraId(7)).unwrap().sequence_number(), 5);
    }

    #[test]
    fn test_pending_readback_skips_cycle() {
        let surface = Arc::new(SyntheticSurface::deferred());
        surface.add_camera(CameraId(1), "front", 2, 2);
        let (transport, receiver) = ChannelTransport::new();
        let config = single_worker().with_camera(manual_camera("front"));
        let pipeline = CapturePipeline::new(config, surface.clone(), Arc::new(transport)).unwrap();
        pipeline.register_active_cameras().unwrap();
        let camera = pipeline.camera(CameraId(1)).unwrap();

        pipeline.request_capture(None).unwrap();
        assert_eq!(pipeline.tick(Instant::now()).dispatched, 1);
        assert!(camera.is_pending(Modality::Depth));
        assert!(camera.is_pending(Modality::Rgb));

        pipeline.request_capture(None).unwrap();
        let report = pipeline.tick(Instant::now());
        assert_eq!(report.pending, 1);
        assert_eq!(camera.sequence_number(), 1);

        assert_eq!(surface.complete_pending(), 2);
        // intrinsics from the tick plus the two completed images
        assert_eq!(receive(&receiver, 3).len(), 3);

        pipeline.request_capture(None).unwrap();
        assert_eq!(pipeline.tick(Instant::now()).dispatched, 1);
        assert_eq!(camera.sequence_number(), 2);
    }

    #[test]
    fn test_deregistration_releases_and_ignores_late_completions() {
        let surface = Arc::new(SyntheticSurface::deferred());
        surface.add_camera(CameraId(2), "rear", 2, 2);
        let (transport, _receiver) = ChannelTransport::new();
        let config =
            single_worker().with_camera(manual_camera("rear").with_modalities(true, true, false));
        let pipeline = CapturePipeline::new(config, surface.clone(), Arc::new(transport)).unwrap();
        pipeline.register_active_cameras().unwrap();

        pipeline.request_capture(Some(CameraId(2))).unwrap();
        pipeline.tick(Instant::now());
        pipeline.deregister_camera(CameraId(2)).unwrap();
        assert_eq!(surface.released_cameras(), vec![CameraId(2)]);

        surface.complete_pending();
        let stats = pipeline.stats();
        assert_eq!(stats.readback.stale_completions, 2);
        assert_eq!(stats.enqueued, 0);
        assert_eq!(stats.cameras, 0);
        assert!(pipeline.deregister_camera(CameraId(2)).is_err());
    }

    #[test]
    fn test_commands_change_schedule() {
        let surface = Arc::new(SyntheticSurface::new());
        surface.add_camera(CameraId(1), "front", 2, 2);
        let (transport, _receiver) = ChannelTransport::new();
        let config = single_worker().with_camera(manual_camera("front"));
        let pipeline = CapturePipeline::new(config, surface.clone(), Arc::new(transport)).unwrap();
        pipeline.register_active_cameras().unwrap();

        let start = Instant::now();
        assert_eq!(pipeline.tick(start).dispatched, 0);

        pipeline
            .apply(SchedulerCommand::SetContinuous {
                camera: CameraId(1),
                enabled: true,
            })
            .unwrap();
        pipeline
            .apply(SchedulerCommand::SetRate {
                camera: CameraId(1),
                hz: 20.0,
            })
            .unwrap();

        assert_eq!(pipeline.tick(start).dispatched, 1);
        assert_eq!(pipeline.tick(start + Duration::from_millis(10)).not_due, 1);
        assert_eq!(pipeline.tick(start + Duration::from_millis(60)).dispatched, 1);
    }

    #[test]
    fn test_frame_rendered_hook_ticks_one_camera() {
        let surface = Arc::new(SyntheticSurface::new());
        surface.add_camera(CameraId(1), "a", 2, 2);
        surface.add_camera(CameraId(2), "b", 2, 2);
        let (transport, _receiver) = ChannelTransport::new();
        let pipeline =
            CapturePipeline::new(single_worker(), surface.clone(), Arc::new(transport)).unwrap();
        pipeline.register_active_cameras().unwrap();

        let report = pipeline.on_frame_rendered(CameraId(2), Instant::now()).unwrap();
        assert_eq!(report.dispatched, 1);
        assert_eq!(pipeline.camera(CameraId(1)).unwrap().sequence_number(), 0);
        assert_eq!(pipeline.camera(CameraId(2)).unwrap().sequence_number(), 1);
        assert!(pipeline.on_frame_rendered(CameraId(9), Instant::now()).is_err());
    }

    #[test]
    fn test_missing_depth_texture_is_not_fatal() {
        let surface = Arc::new(SyntheticSurface::new());
        surface.add_camera(CameraId(1), "front", 2, 2);
        surface.set_depth_available(CameraId(1), false);
        let (transport, receiver) = ChannelTransport::new();
        let config = single_worker().with_camera(manual_camera("front"));
        let pipeline = CapturePipeline::new(config, surface.clone(), Arc::new(transport)).unwrap();
        pipeline.register_active_cameras().unwrap();

        pipeline.request_capture(None).unwrap();
        let report = pipeline.tick(Instant::now());
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.failed, 1);

        // colour and calibration still go out
        let mut topics: Vec<String> = receive(&receiver, 2).into_iter().map(|e| e.topic).collect();
        topics.sort();
        assert_eq!(topics, vec!["/front/camera_info", "/front/rgb/image_raw"]);
    }

    #[test]
    fn test_transport_failures_do_not_stop_workers() {
        let surface = Arc::new(SyntheticSurface::new());
        surface.add_camera(CameraId(1), "front", 2, 2);
        let (transport, receiver) = ChannelTransport::new();
        drop(receiver);
        let config = single_worker().with_camera(manual_camera("front"));
        let pipeline = CapturePipeline::new(config, surface.clone(), Arc::new(transport)).unwrap();
        pipeline.register_active_cameras().unwrap();

        for _ in 0..3 {
            pipeline.request_capture(None).unwrap();
            pipeline.tick(Instant::now());
        }

        assert!(wait_until(|| pipeline.stats().publish_failures == 9));
        assert!(pipeline.is_running());
        assert!(wait_until(|| pipeline.pool().outstanding() == 0));
    }

    #[test]
    fn test_sync_readback_mode() {
        let surface = Arc::new(SyntheticSurface::deferred());
        surface.add_camera(CameraId(1), "front", 2, 2);
        let (transport, receiver) = ChannelTransport::new();
        let config = single_worker()
            .with_async_readback(false)
            .with_camera(manual_camera("front").with_modalities(true, false, false));
        let pipeline = CapturePipeline::new(config, surface.clone(), Arc::new(transport)).unwrap();
        pipeline.register_active_cameras().unwrap();

        pipeline.request_capture(None).unwrap();
        pipeline.tick(Instant::now());
        assert_eq!(surface.pending_count(), 0);
        assert_eq!(receive(&receiver, 1)[0].topic, "/front/depth/image_raw");
    }

    #[test]
    fn test_shutdown_is_idempotent_and_returns_buffers() {
        let surface = Arc::new(SyntheticSurface::new());
        surface.add_camera(CameraId(1), "front", 16, 16);
        let (transport, receiver) = ChannelTransport::new();
        let mut pipeline =
            CapturePipeline::new(single_worker(), surface.clone(), Arc::new(transport)).unwrap();
        pipeline.register_active_cameras().unwrap();
        pipeline.tick(Instant::now());
        receive(&receiver, 3);

        pipeline.shutdown();
        assert!(!pipeline.is_running());
        pipeline.shutdown();
        assert_eq!(pipeline.pool().outstanding(), 0);
        assert_eq!(pipeline.stats().published, 3);
    }

    #[test]
    fn test_instrumentation_records_operations() {
        let surface = Arc::new(SyntheticSurface::new());
        surface.add_camera(CameraId(1), "front", 2, 2);
        let (transport, receiver) = ChannelTransport::new();
        let config = single_worker().with_instrumentation(true);
        let pipeline = CapturePipeline::new(config, surface.clone(), Arc::new(transport)).unwrap();
        pipeline.register_active_cameras().unwrap();

        pipeline.tick(Instant::now());
        receive(&receiver, 3);

        let instr = pipeline.instrumentation().unwrap();
        assert!(wait_until(|| instr.snapshot().get("transport").map_or(0, |s| s.count) == 3));
        let snapshot = instr.snapshot();
        assert_eq!(snapshot["tick"].count, 1);
        assert_eq!(snapshot["depth_completion"].count, 1);
        assert_eq!(snapshot["rgb_completion"].count, 1);
    }
}
