//! Construction of concrete controllers from device configuration.

use std::sync::Arc;
use std::time::Duration;

use motionsvc_types::{DeviceClass, DeviceConfig};
use tracing::warn;

use crate::controller::{DeviceController, POLL_INTERVAL};
use crate::gantry::GantryController;
use crate::hexapod::HexapodController;
use crate::sdk::{GantrySdk, HexapodSdk};

/// Builds the controller that serves a configured device.
///
/// Returns `None` when the factory has no binding for the device's class;
/// the kernel logs and skips such devices.
pub trait ControllerFactory: Send + Sync {
    fn create(&self, device: &DeviceConfig) -> Option<Arc<dyn DeviceController>>;
}

/// Standard factory over one vendor SDK handle per device class.
#[derive(Clone)]
pub struct SdkControllerFactory {
    hexapod: Option<Arc<dyn HexapodSdk>>,
    gantry: Option<Arc<dyn GantrySdk>>,
    poll_interval: Duration,
}

impl Default for SdkControllerFactory {
    fn default() -> Self {
        Self {
            hexapod: None,
            gantry: None,
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl SdkControllerFactory {
    /// A factory with no bindings; add them with the `with_*` methods.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hexapod_sdk(mut self, sdk: Arc<dyn HexapodSdk>) -> Self {
        self.hexapod = Some(sdk);
        self
    }

    pub fn with_gantry_sdk(mut self, sdk: Arc<dyn GantrySdk>) -> Self {
        self.gantry = Some(sdk);
        self
    }

    /// Status-poll interval handed to every controller this factory builds.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl ControllerFactory for SdkControllerFactory {
    fn create(&self, device: &DeviceConfig) -> Option<Arc<dyn DeviceController>> {
        match device.device_class {
            DeviceClass::Hexapod => match &self.hexapod {
                Some(sdk) => Some(Arc::new(
                    HexapodController::new(device, sdk.clone())
                        .with_poll_interval(self.poll_interval),
                )),
                None => {
                    warn!(device = %device.id, "no hexapod binding available");
                    None
                }
            },
            DeviceClass::Gantry => match &self.gantry {
                Some(sdk) => Some(Arc::new(
                    GantryController::new(device, sdk.clone())
                        .with_poll_interval(self.poll_interval),
                )),
                None => {
                    warn!(device = %device.id, "no gantry binding available");
                    None
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimGantrySdk, SimHexapodSdk};
    use motionsvc_types::ControllerState;

    #[test]
    fn builds_controller_matching_device_class() {
        let factory = SdkControllerFactory::new()
            .with_hexapod_sdk(Arc::new(SimHexapodSdk::new()))
            .with_gantry_sdk(Arc::new(SimGantrySdk::new()));

        let hex = DeviceConfig::new("hex-1", "Hexapod", DeviceClass::Hexapod);
        let gantry = DeviceConfig::new("g-1", "Gantry", DeviceClass::Gantry);

        let c = factory.create(&hex).unwrap();
        assert_eq!(c.device_id(), "hex-1");
        assert_eq!(c.device_class(), DeviceClass::Hexapod);
        assert_eq!(c.state(), ControllerState::Uninitialized);

        let c = factory.create(&gantry).unwrap();
        assert_eq!(c.device_class(), DeviceClass::Gantry);
    }

    #[test]
    fn missing_binding_yields_none() {
        let factory = SdkControllerFactory::new().with_hexapod_sdk(Arc::new(SimHexapodSdk::new()));
        let gantry = DeviceConfig::new("g-1", "Gantry", DeviceClass::Gantry);
        assert!(factory.create(&gantry).is_none());
    }
}
