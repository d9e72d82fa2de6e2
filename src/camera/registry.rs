//! Registry of cameras owned by one pipeline instance

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, RwLock,
    },
};

use crate::error::{CaptureError, Result};

use super::{
    context::CameraCaptureContext,
    settings::{CameraId, CameraSettings},
};

/// Maps camera ids to their capture contexts
#[derive(Debug)]
pub struct CameraRegistry {
    cameras: RwLock<HashMap<CameraId, Arc<CameraCaptureContext>>>,
    next_id: AtomicU32,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self {
            cameras: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Register a camera under a freshly assigned id
    pub fn register(&self, settings: CameraSettings) -> Result<Arc<CameraCaptureContext>> {
        let mut cameras = self.cameras.write().unwrap();
        let mut id = CameraId(self.next_id.fetch_add(1, Ordering::Relaxed));
        while cameras.contains_key(&id) {
            id = CameraId(self.next_id.fetch_add(1, Ordering::Relaxed));
        }

        let context = Arc::new(CameraCaptureContext::new(id, settings)?);
        cameras.insert(id, Arc::clone(&context));
        Ok(context)
    }

    /// Register a camera under an id chosen by the render collaborator
    pub fn register_with_id(
        &self,
        id: CameraId,
        settings: CameraSettings,
    ) -> Result<Arc<CameraCaptureContext>> {
        let mut cameras = self.cameras.write().unwrap();
        if cameras.contains_key(&id) {
            return Err(CaptureError::CameraExists { camera: id.0 });
        }

        let context = Arc::new(CameraCaptureContext::new(id, settings)?);
        cameras.insert(id, Arc::clone(&context));
        Ok(context)
    }

    /// Remove a camera. Its context is marked inactive so late readback
    /// completions holding it become no-ops.
    pub fn deregister(&self, id: CameraId) -> Result<Arc<CameraCaptureContext>> {
        let context = self
            .cameras
            .write()
            .unwrap()
            .remove(&id)
            .ok_or(CaptureError::CameraNotFound { camera: id.0 })?;
        context.deactivate();
        Ok(context)
    }

    pub fn get(&self, id: CameraId) -> Option<Arc<CameraCaptureContext>> {
        self.cameras.read().unwrap().get(&id).cloned()
    }

    /// Look up a camera, failing with `CameraNotFound`
    pub fn require(&self, id: CameraId) -> Result<Arc<CameraCaptureContext>> {
        self.get(id).ok_or(CaptureError::CameraNotFound { camera: id.0 })
    }

    pub fn contains(&self, id: CameraId) -> bool {
        self.cameras.read().unwrap().contains_key(&id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<CameraCaptureContext>> {
        self.cameras
            .read()
            .unwrap()
            .values()
            .find(|ctx| ctx.settings().name == name)
            .cloned()
    }

    /// All registered cameras ordered by id
    pub fn snapshot(&self) -> Vec<Arc<CameraCaptureContext>> {
        let mut cameras: Vec<_> = self.cameras.read().unwrap().values().cloned().collect();
        cameras.sort_by_key(|ctx| ctx.id());
        cameras
    }

    pub fn ids(&self) -> Vec<CameraId> {
        self.snapshot().iter().map(|ctx| ctx.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.cameras.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CameraRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = CameraRegistry::new();
        let a = registry.register(CameraSettings::new("a")).unwrap();
        let b = registry.register(CameraSettings::new("b")).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.find_by_name("b").unwrap().id(), b.id());
        assert_eq!(registry.ids(), vec![a.id(), b.id()]);
    }

    #[test]
    fn test_explicit_id_conflicts() {
        let registry = CameraRegistry::new();
        registry
            .register_with_id(CameraId(1), CameraSettings::new("a"))
            .unwrap();
        let err = registry
            .register_with_id(CameraId(1), CameraSettings::new("b"))
            .unwrap_err();
        assert!(matches!(err, CaptureError::CameraExists { camera: 1 }));

        // auto ids skip the taken one
        let next = registry.register(CameraSettings::new("c")).unwrap();
        assert_ne!(next.id(), CameraId(1));
    }

    #[test]
    fn test_deregister_deactivates() {
        let registry = CameraRegistry::new();
        let ctx = registry.register(CameraSettings::new("a")).unwrap();
        let id = ctx.id();

        registry.deregister(id).unwrap();
        assert!(!ctx.is_active());
        assert!(!registry.contains(id));
        assert!(matches!(
            registry.deregister(id),
            Err(CaptureError::CameraNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let registry = CameraRegistry::new();
        assert!(registry
            .register(CameraSettings::new("a").with_downsample(0))
            .is_err());
        assert!(registry.is_empty());
    }
}
