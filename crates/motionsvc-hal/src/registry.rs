//! [`ControllerRegistry`] – device id → live controller handle.
//!
//! The motion kernel owns exactly one registry and is the only component
//! that mutates it.  At most one controller is registered per device id;
//! registering a second one replaces (and returns) the first so the caller
//! can dispose of it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::controller::DeviceController;

/// Registry of connected controllers, keyed by device id.
#[derive(Default)]
pub struct ControllerRegistry {
    controllers: HashMap<String, Arc<dyn DeviceController>>,
}

impl ControllerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller under its own device id.  Returns the
    /// controller previously registered for that id, if any.
    pub fn register(
        &mut self,
        controller: Arc<dyn DeviceController>,
    ) -> Option<Arc<dyn DeviceController>> {
        self.controllers
            .insert(controller.device_id().to_string(), controller)
    }

    /// Shared handle to the controller for `device_id`.
    pub fn get(&self, device_id: &str) -> Option<Arc<dyn DeviceController>> {
        self.controllers.get(device_id).cloned()
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.controllers.contains_key(device_id)
    }

    pub fn remove(&mut self, device_id: &str) -> Option<Arc<dyn DeviceController>> {
        self.controllers.remove(device_id)
    }

    /// Registered device ids, sorted.
    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.controllers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of every registered controller.
    pub fn controllers(&self) -> Vec<Arc<dyn DeviceController>> {
        self.controllers.values().cloned().collect()
    }

    /// Remove and return every registered controller.
    pub fn drain(&mut self) -> Vec<Arc<dyn DeviceController>> {
        self.controllers.drain().map(|(_, c)| c).collect()
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{ControllerFactory, SdkControllerFactory};
    use crate::sim::{SimGantrySdk, SimHexapodSdk};
    use motionsvc_types::{DeviceClass, DeviceConfig};

    fn factory() -> SdkControllerFactory {
        SdkControllerFactory::new()
            .with_hexapod_sdk(Arc::new(SimHexapodSdk::new()))
            .with_gantry_sdk(Arc::new(SimGantrySdk::new()))
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = ControllerRegistry::new();
        let hex = DeviceConfig::new("hex-1", "Hexapod", DeviceClass::Hexapod);
        registry.register(factory().create(&hex).unwrap());

        assert!(registry.contains("hex-1"));
        assert_eq!(registry.get("hex-1").unwrap().device_id(), "hex-1");
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn re_registering_replaces_old_controller() {
        let mut registry = ControllerRegistry::new();
        let hex = DeviceConfig::new("hex-1", "Hexapod", DeviceClass::Hexapod);
        assert!(registry.register(factory().create(&hex).unwrap()).is_none());
        assert!(registry.register(factory().create(&hex).unwrap()).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn device_ids_are_sorted_and_drain_empties() {
        let mut registry = ControllerRegistry::new();
        for id in ["b", "a", "c"] {
            let device = DeviceConfig::new(id, id, DeviceClass::Gantry);
            registry.register(factory().create(&device).unwrap());
        }
        assert_eq!(registry.device_ids(), vec!["a", "b", "c"]);
        assert_eq!(registry.drain().len(), 3);
        assert!(registry.is_empty());
    }
}
