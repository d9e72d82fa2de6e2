//! Deterministic in-process render surface
//!
//! Stands in for a renderer in the CLI and in tests. Depth images are a
//! vertical gradient stored bottom-up, as GPU render targets are; colour images
//! encode the pixel position. Completions can run immediately or be held
//! until [`SyntheticSurface::complete_pending`] is called, and failures can be
//! injected.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use crate::{
    camera::CameraId,
    depth::DepthRange,
    error::{CaptureError, Result},
    readback::{
        ActiveCamera, ReadbackCallback, ReadbackData, ReadbackResult, RenderSurface,
        TextureFormat, TextureHandle,
    },
};

/// When asynchronous readbacks invoke their callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Inside `request_readback`
    Immediate,
    /// On the next `complete_pending` call
    Deferred,
}

/// Metric distance the synthetic depth image holds on image row `row`
pub fn synthetic_distance(range: &DepthRange, row: u32, height: u32) -> f32 {
    let t = (row as f32 + 0.5) / height.max(1) as f32;
    range.near + (range.far - range.near) * 0.5 * t
}

#[derive(Debug, Clone)]
struct SyntheticCamera {
    name: String,
    width: u32,
    height: u32,
    range: DepthRange,
    has_depth: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TargetKind {
    Depth,
    Color,
}

#[derive(Debug, Clone, Copy)]
struct TextureInfo {
    camera: CameraId,
    kind: TargetKind,
}

#[derive(Default)]
struct SurfaceState {
    cameras: BTreeMap<CameraId, SyntheticCamera>,
    textures: HashMap<u64, TextureInfo>,
    native_depth: HashMap<CameraId, TextureHandle>,
    targets: HashMap<(CameraId, TargetKind), TextureHandle>,
    pending: Vec<(TextureHandle, ReadbackCallback)>,
    released: Vec<CameraId>,
    fail_next: usize,
    depth_truncation: usize,
    color_stride: usize,
    target_alignment: u32,
    blits: u64,
}

/// Fake renderer implementing [`RenderSurface`]
pub struct SyntheticSurface {
    mode: CompletionMode,
    state: Mutex<SurfaceState>,
    next_texture: AtomicU64,
    frame: AtomicU64,
}

impl SyntheticSurface {
    /// Surface whose asynchronous readbacks complete immediately
    pub fn new() -> Self {
        Self::with_mode(CompletionMode::Immediate)
    }

    /// Surface whose readbacks wait for [`complete_pending`](Self::complete_pending)
    pub fn deferred() -> Self {
        Self::with_mode(CompletionMode::Deferred)
    }

    pub fn with_mode(mode: CompletionMode) -> Self {
        Self {
            mode,
            state: Mutex::new(SurfaceState {
                color_stride: 4,
                ..Default::default()
            }),
            next_texture: AtomicU64::new(1),
            frame: AtomicU64::new(0),
        }
    }

    /// Add a rendering camera with the default depth range
    pub fn add_camera(&self, id: CameraId, name: impl Into<String>, width: u32, height: u32) {
        self.add_camera_with_range(id, name, width, height, DepthRange::default());
    }

    /// Add a rendering camera whose depth buffer uses `range`
    pub fn add_camera_with_range(
        &self,
        id: CameraId,
        name: impl Into<String>,
        width: u32,
        height: u32,
        range: DepthRange,
    ) {
        let camera = SyntheticCamera {
            name: name.into(),
            width,
            height,
            range,
            has_depth: true,
        };
        self.state.lock().unwrap().cameras.insert(id, camera);
    }

    /// Stop rendering a camera
    pub fn remove_camera(&self, id: CameraId) {
        self.state.lock().unwrap().cameras.remove(&id);
    }

    /// Make the camera's depth texture (un)available
    pub fn set_depth_available(&self, id: CameraId, available: bool) {
        if let Some(camera) = self.state.lock().unwrap().cameras.get_mut(&id) {
            camera.has_depth = available;
        }
    }

    /// Bytes per pixel of colour transfers (3, 4, or anything else to test
    /// rejection)
    pub fn set_color_stride(&self, stride: usize) {
        self.state.lock().unwrap().color_stride = stride;
    }

    /// Round render-target sizes up to a multiple of `alignment` pixels
    pub fn set_target_alignment(&self, alignment: u32) {
        self.state.lock().unwrap().target_alignment = alignment;
    }

    /// Fail the next `count` transfers
    pub fn fail_next_readbacks(&self, count: usize) {
        self.state.lock().unwrap().fail_next = count;
    }

    /// Return `samples` fewer depth samples than the texture holds
    pub fn truncate_depth(&self, samples: usize) {
        self.state.lock().unwrap().depth_truncation = samples;
    }

    /// Advance the frame counter; shows up in the blue channel
    pub fn render_frame(&self) -> u64 {
        self.frame.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Transfers waiting for [`complete_pending`](Self::complete_pending)
    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Run every held completion, returning how many ran
    pub fn complete_pending(&self) -> usize {
        let pending = std::mem::take(&mut self.state.lock().unwrap().pending);
        let count = pending.len();
        for (texture, callback) in pending {
            callback(self.read_pixels(&texture));
        }
        count
    }

    /// Cameras whose resources were released, in order
    pub fn released_cameras(&self) -> Vec<CameraId> {
        self.state.lock().unwrap().released.clone()
    }

    pub fn blit_count(&self) -> u64 {
        self.state.lock().unwrap().blits
    }

    fn allocate(&self, kind: TargetKind, width: u32, height: u32) -> TextureHandle {
        let format = match kind {
            TargetKind::Depth => TextureFormat::Depth32Float,
            TargetKind::Color => TextureFormat::Rgba8,
        };
        TextureHandle {
            id: self.next_texture.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            format,
        }
    }

    fn target(
        &self,
        camera: CameraId,
        kind: TargetKind,
        width: u32,
        height: u32,
    ) -> Result<TextureHandle> {
        let mut state = self.state.lock().unwrap();
        if !state.cameras.contains_key(&camera) {
            return Err(CaptureError::missing_texture(camera.0, "camera not rendering"));
        }
        let align = state.target_alignment.max(1);
        let (width, height) = (
            (width + align - 1) / align * align,
            (height + align - 1) / align * align,
        );
        if let Some(existing) = state.targets.get(&(camera, kind)) {
            if existing.size() == (width, height) {
                return Ok(*existing);
            }
            let stale = existing.id;
            state.textures.remove(&stale);
        }

        let texture = self.allocate(kind, width, height);
        state.textures.insert(texture.id, TextureInfo { camera, kind });
        state.targets.insert((camera, kind), texture);
        Ok(texture)
    }

    fn depth_bytes(
        camera: &SyntheticCamera,
        width: u32,
        height: u32,
        truncation: usize,
    ) -> Vec<u8> {
        let samples = (width as usize * height as usize).saturating_sub(truncation);
        let mut bytes = Vec::with_capacity(samples * 4);
        // bottom-up rows: buffer row 0 is the bottom image row
        'rows: for buffer_row in 0..height {
            let image_row = height - 1 - buffer_row;
            let raw = camera
                .range
                .encode(synthetic_distance(&camera.range, image_row, height));
            for _ in 0..width {
                if bytes.len() == samples * 4 {
                    break 'rows;
                }
                bytes.extend_from_slice(&raw.to_le_bytes());
            }
        }
        bytes
    }

    fn color_bytes(width: u32, height: u32, stride: usize, frame: u64) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(width as usize * height as usize * stride);
        for y in 0..height {
            for x in 0..width {
                let pixel = [x as u8, y as u8, frame as u8, 255];
                for c in 0..stride {
                    bytes.push(pixel.get(c).copied().unwrap_or(0));
                }
            }
        }
        bytes
    }
}

impl Default for SyntheticSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSurface for SyntheticSurface {
    fn active_cameras(&self) -> Vec<ActiveCamera> {
        self.state
            .lock()
            .unwrap()
            .cameras
            .iter()
            .map(|(id, camera)| ActiveCamera {
                id: *id,
                name: camera.name.clone(),
            })
            .collect()
    }

    fn native_resolution(&self, camera: CameraId) -> Option<(u32, u32)> {
        self.state
            .lock()
            .unwrap()
            .cameras
            .get(&camera)
            .map(|c| (c.width, c.height))
    }

    fn depth_texture(&self, camera: CameraId) -> Option<TextureHandle> {
        let mut state = self.state.lock().unwrap();
        let (width, height) = match state.cameras.get(&camera) {
            Some(c) if c.has_depth => (c.width, c.height),
            _ => return None,
        };
        if let Some(texture) = state.native_depth.get(&camera) {
            return Some(*texture);
        }

        let texture = self.allocate(TargetKind::Depth, width, height);
        state.textures.insert(
            texture.id,
            TextureInfo {
                camera,
                kind: TargetKind::Depth,
            },
        );
        state.native_depth.insert(camera, texture);
        Some(texture)
    }

    fn depth_target(&self, camera: CameraId, width: u32, height: u32) -> Result<TextureHandle> {
        self.target(camera, TargetKind::Depth, width, height)
    }

    fn color_target(&self, camera: CameraId, width: u32, height: u32) -> Result<TextureHandle> {
        self.target(camera, TargetKind::Color, width, height)
    }

    fn blit(&self, src: &TextureHandle, dst: &TextureHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.textures.contains_key(&src.id) || !state.textures.contains_key(&dst.id) {
            return Err(CaptureError::transfer("blit between unknown textures"));
        }
        state.blits += 1;
        Ok(())
    }

    fn request_readback(&self, texture: &TextureHandle, on_complete: ReadbackCallback) {
        match self.mode {
            CompletionMode::Immediate => on_complete(self.read_pixels(texture)),
            CompletionMode::Deferred => {
                self.state
                    .lock()
                    .unwrap()
                    .pending
                    .push((*texture, on_complete));
            }
        }
    }

    fn read_pixels(&self, texture: &TextureHandle) -> ReadbackResult {
        let mut state = self.state.lock().unwrap();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(CaptureError::transfer("injected readback failure"));
        }

        let info = *state
            .textures
            .get(&texture.id)
            .ok_or_else(|| CaptureError::transfer(format!("unknown texture {}", texture.id)))?;
        let camera = state
            .cameras
            .get(&info.camera)
            .ok_or_else(|| CaptureError::transfer(format!("{} stopped rendering", info.camera)))?;

        let bytes = match info.kind {
            TargetKind::Depth => Self::depth_bytes(
                camera,
                texture.width,
                texture.height,
                state.depth_truncation,
            ),
            TargetKind::Color => Self::color_bytes(
                texture.width,
                texture.height,
                state.color_stride,
                self.frame.load(Ordering::Relaxed),
            ),
        };

        Ok(ReadbackData {
            bytes,
            width: texture.width,
            height: texture.height,
        })
    }

    fn release_camera_resources(&self, camera: CameraId) {
        let mut state = self.state.lock().unwrap();
        state.targets.retain(|(owner, _), _| *owner != camera);
        state.native_depth.remove(&camera);
        state.textures.retain(|_, info| info.camera != camera);
        state.released.push(camera);
        log::debug!("released render targets of {}", camera);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth_values(data: &ReadbackData) -> Vec<f32> {
        data.bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    #[test]
    fn test_depth_is_bottom_up_gradient() {
        let surface = SyntheticSurface::new();
        let range = DepthRange::default();
        surface.add_camera(CameraId(1), "a", 2, 3);

        let texture = surface.depth_texture(CameraId(1)).unwrap();
        let data = surface.read_pixels(&texture).unwrap();
        let raw = depth_values(&data);
        assert_eq!(raw.len(), 6);

        // first buffer row holds the bottom image row
        let bottom = range.linearize(raw[0]);
        let expected = synthetic_distance(&range, 2, 3);
        assert!((bottom - expected).abs() < 1e-2 * expected);
    }

    #[test]
    fn test_color_stride_and_truncation() {
        let surface = SyntheticSurface::new();
        surface.add_camera(CameraId(1), "a", 4, 2);

        let color = surface.color_target(CameraId(1), 4, 2).unwrap();
        assert_eq!(surface.read_pixels(&color).unwrap().bytes.len(), 32);
        surface.set_color_stride(3);
        assert_eq!(surface.read_pixels(&color).unwrap().bytes.len(), 24);

        surface.truncate_depth(3);
        let depth = surface.depth_texture(CameraId(1)).unwrap();
        assert_eq!(surface.read_pixels(&depth).unwrap().bytes.len(), 5 * 4);
    }

    #[test]
    fn test_deferred_completion_and_failures() {
        let surface = SyntheticSurface::deferred();
        surface.add_camera(CameraId(1), "a", 2, 2);
        let texture = surface.depth_texture(CameraId(1)).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let tx2 = tx.clone();
        surface.request_readback(
            &texture,
            Box::new(move |r: ReadbackResult| tx.send(r.is_ok()).unwrap()),
        );
        surface.fail_next_readbacks(1);
        surface.request_readback(
            &texture,
            Box::new(move |r: ReadbackResult| tx2.send(r.is_ok()).unwrap()),
        );
        assert_eq!(surface.pending_count(), 2);
        assert!(rx.try_recv().is_err());

        assert_eq!(surface.complete_pending(), 2);
        assert!(!rx.recv().unwrap());
        assert!(rx.recv().unwrap());
    }

    #[test]
    fn test_target_alignment_rounds_up() {
        let surface = SyntheticSurface::new();
        surface.add_camera(CameraId(1), "a", 6, 6);
        surface.set_target_alignment(4);

        let color = surface.color_target(CameraId(1), 3, 5).unwrap();
        assert_eq!(color.size(), (4, 8));
        let data = surface.read_pixels(&color).unwrap();
        assert_eq!((data.width, data.height), (4, 8));
        assert_eq!(data.bytes.len(), 4 * 8 * 4);
    }

    #[test]
    fn test_release_forgets_targets() {
        let surface = SyntheticSurface::new();
        surface.add_camera(CameraId(4), "a", 8, 8);
        let target = surface.depth_target(CameraId(4), 4, 4).unwrap();
        let depth = surface.depth_texture(CameraId(4)).unwrap();
        surface.blit(&depth, &target).unwrap();
        assert_eq!(surface.blit_count(), 1);

        surface.release_camera_resources(CameraId(4));
        assert_eq!(surface.released_cameras(), vec![CameraId(4)]);
        assert!(surface.read_pixels(&target).is_err());
    }
}
