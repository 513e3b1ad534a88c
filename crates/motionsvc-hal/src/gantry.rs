//! [`GantryController`] – three-axis linear stage behind a [`GantrySdk`].
//!
//! Rotary components of targets and deltas are ignored; reported positions
//! always carry `u = v = w = 0`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use motionsvc_types::{ControllerState, DeviceClass, DeviceConfig, MotionError, Position};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::controller::{
    DeviceController, Lifecycle, POLL_INTERVAL, idle_within, validate_delta, validate_speed,
};
use crate::sdk::{GantryHandle, GantrySdk, SdkError};

/// Axis indices in `X Y Z` order.
const AXES: [usize; 3] = [0, 1, 2];

/// Home target when the device has no taught "Home" position.
pub const GANTRY_DEFAULT_HOME: Position = Position::ZERO;

/// Controller for one gantry.
pub struct GantryController {
    address: String,
    port: u16,
    sdk: Arc<dyn GantrySdk>,
    life: Lifecycle<GantryHandle>,
    poll_interval: Duration,
}

impl GantryController {
    pub fn new(device: &DeviceConfig, sdk: Arc<dyn GantrySdk>) -> Self {
        Self {
            address: device.address.clone(),
            port: device.port,
            sdk,
            life: Lifecycle::new(device.id.clone()),
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.life.subscribe()
    }

    fn fault(&self, err: SdkError) -> MotionError {
        MotionError::hardware(self.life.device_id(), err)
    }

    async fn any_axis_moving(&self, handle: GantryHandle) -> Result<bool, MotionError> {
        for axis in AXES {
            if self
                .sdk
                .axis_moving(handle, axis)
                .await
                .map_err(|e| self.fault(e))?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn wait_until_settled(&self, handle: GantryHandle) -> Result<(), MotionError> {
        while self.any_axis_moving(handle).await? {
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(())
    }

    async fn settle(
        &self,
        handle: GantryHandle,
        generation: u64,
        issued: Result<(), SdkError>,
    ) -> Result<(), MotionError> {
        let settled = match issued {
            Ok(()) => self.wait_until_settled(handle).await,
            Err(e) => Err(self.fault(e)),
        };
        self.life.finish_move(generation, settled)
    }
}

#[async_trait]
impl DeviceController for GantryController {
    fn device_id(&self) -> &str {
        self.life.device_id()
    }

    fn device_class(&self) -> DeviceClass {
        DeviceClass::Gantry
    }

    fn state(&self) -> ControllerState {
        self.life.state()
    }

    async fn initialize(&self) -> Result<(), MotionError> {
        if !self.life.begin_connect()? {
            return Ok(());
        }

        let handle = match self.sdk.open(&self.address, self.port).await {
            Ok(handle) => handle,
            Err(e) => {
                self.life.connect_failed();
                warn!(device = %self.device_id(), error = %e, "gantry connection failed");
                return Err(self.fault(e));
            }
        };
        if let Err(e) = self.sdk.enable_axes(handle, &AXES).await {
            warn!(device = %self.device_id(), error = %e, "gantry axis enable failed");
            if let Err(close_err) = self.sdk.close(handle).await {
                warn!(device = %self.device_id(), error = %close_err, "gantry close after failed enable");
            }
            self.life.connect_failed();
            return Err(self.fault(e));
        }

        self.life.connected(handle);
        info!(device = %self.device_id(), handle = handle.0, "gantry connected");
        Ok(())
    }

    async fn move_to_position(&self, target: Position) -> Result<(), MotionError> {
        let handle = self.life.connected_session()?;
        let target = target.for_class(DeviceClass::Gantry);
        if !target.is_finite() {
            return Err(MotionError::InvalidArgument(format!(
                "non-finite target for {}",
                self.device_id()
            )));
        }
        debug!(device = %self.device_id(), %target, "gantry absolute move");
        let generation = self.life.begin_move();
        let issued = self
            .sdk
            .to_point(handle, &AXES, &[target.x, target.y, target.z], false)
            .await;
        self.settle(handle, generation, issued).await
    }

    async fn move_relative(&self, delta: &[f64]) -> Result<(), MotionError> {
        let handle = self.life.connected_session()?;
        validate_delta(self.device_id(), delta)?;
        let linear = &delta[..delta.len().min(AXES.len())];
        if delta[linear.len()..].iter().any(|d| *d != 0.0) {
            debug!(device = %self.device_id(), "ignoring rotary components of gantry jog");
        }
        let generation = self.life.begin_move();
        let issued = self
            .sdk
            .to_point(handle, &AXES[..linear.len()], linear, true)
            .await;
        self.settle(handle, generation, issued).await
    }

    async fn stop(&self) -> Result<(), MotionError> {
        let Ok(handle) = self.life.connected_session() else {
            debug!(device = %self.device_id(), "stop on unconnected gantry is a no-op");
            return Ok(());
        };
        self.life.record_halt();
        self.sdk.kill_all(handle).await.map_err(|e| self.fault(e))?;
        self.life.set_connected_state(ControllerState::Idle);
        Ok(())
    }

    async fn current_position(&self) -> Result<Position, MotionError> {
        let handle = self.life.connected_session()?;
        let mut xyz = [0.0; 3];
        for (slot, axis) in xyz.iter_mut().zip(AXES) {
            *slot = self
                .sdk
                .feedback_position(handle, axis)
                .await
                .map_err(|e| self.fault(e))?;
        }
        Ok(Position::linear(xyz[0], xyz[1], xyz[2]))
    }

    async fn home(&self, taught_home: Option<Position>) -> Result<(), MotionError> {
        let target = taught_home.unwrap_or(GANTRY_DEFAULT_HOME);
        info!(device = %self.device_id(), taught = taught_home.is_some(), "gantry homing");
        self.move_to_position(target).await
    }

    async fn set_speed(&self, speed: f64) -> Result<(), MotionError> {
        let handle = self.life.connected_session()?;
        validate_speed(self.device_id(), speed)?;
        for axis in AXES {
            self.sdk
                .set_velocity(handle, axis, speed)
                .await
                .map_err(|e| self.fault(e))?;
        }
        Ok(())
    }

    async fn speed(&self) -> Result<f64, MotionError> {
        let handle = self.life.connected_session()?;
        self.sdk
            .velocity(handle, AXES[0])
            .await
            .map_err(|e| self.fault(e))
    }

    async fn wait_for_idle(&self, timeout: Duration) -> Result<(), MotionError> {
        let handle = self.life.connected_session()?;
        idle_within(self.device_id(), timeout, self.wait_until_settled(handle)).await
    }

    async fn dispose(&self) {
        let Some(session) = self.life.dispose() else {
            return;
        };
        if let Some(handle) = session
            && let Err(e) = self.sdk.close(handle).await
        {
            warn!(device = %self.device_id(), error = %e, "gantry close failed; continuing");
        }
        info!(device = %self.device_id(), "gantry disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimGantrySdk;

    fn controller(sdk: &Arc<SimGantrySdk>) -> GantryController {
        let device = DeviceConfig::new("gantry-1", "Gantry", DeviceClass::Gantry).with_endpoint("10.0.0.2", 701);
        GantryController::new(&device, sdk.clone()).with_poll_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn absolute_move_ignores_rotary_axes() {
        let sdk = Arc::new(SimGantrySdk::new());
        let c = controller(&sdk);
        c.initialize().await.unwrap();

        c.move_to_position(Position::new(10.0, 20.0, 5.0, 1.0, 2.0, 3.0))
            .await
            .unwrap();
        assert_eq!(c.current_position().await.unwrap(), Position::linear(10.0, 20.0, 5.0));
        assert_eq!(c.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn relative_move_uses_linear_components_only() {
        let sdk = Arc::new(SimGantrySdk::new());
        sdk.bench().place("10.0.0.2", 701, Position::linear(1.0, 1.0, 1.0));
        let c = controller(&sdk);
        c.initialize().await.unwrap();

        c.move_relative(&[1.0, 0.0, -0.5, 9.0, 9.0, 9.0]).await.unwrap();
        assert_eq!(c.current_position().await.unwrap(), Position::linear(2.0, 1.0, 0.5));

        c.move_relative(&[0.5]).await.unwrap();
        assert_eq!(c.current_position().await.unwrap(), Position::linear(2.5, 1.0, 0.5));
    }

    #[tokio::test]
    async fn speed_applies_to_every_axis() {
        let sdk = Arc::new(SimGantrySdk::new());
        let c = controller(&sdk);
        c.initialize().await.unwrap();
        c.set_speed(40.0).await.unwrap();
        assert_eq!(c.speed().await.unwrap(), 40.0);
    }

    #[tokio::test]
    async fn refused_connection_is_reported_not_panicked() {
        let sdk = Arc::new(SimGantrySdk::new());
        sdk.bench().refuse_connections("10.0.0.2", 701);
        let c = controller(&sdk);
        assert!(c.initialize().await.is_err());
        assert_eq!(c.state(), ControllerState::Uninitialized);
        c.stop().await.unwrap();
    }

    #[tokio::test]
    async fn default_home_is_origin() {
        let sdk = Arc::new(SimGantrySdk::new());
        sdk.bench().place("10.0.0.2", 701, Position::linear(3.0, 3.0, 3.0));
        let c = controller(&sdk);
        c.initialize().await.unwrap();
        c.home(None).await.unwrap();
        assert_eq!(c.current_position().await.unwrap(), GANTRY_DEFAULT_HOME);
    }

    #[tokio::test]
    async fn dispose_twice_is_safe() {
        let sdk = Arc::new(SimGantrySdk::new());
        let c = controller(&sdk);
        c.initialize().await.unwrap();
        c.dispose().await;
        c.dispose().await;
        assert_eq!(c.state(), ControllerState::Disconnected);
        assert_eq!(sdk.bench().open_sessions(), 0);
    }

    #[tokio::test]
    async fn kill_during_move_fails_the_move() {
        let sdk = Arc::new(SimGantrySdk::new());
        sdk.bench().set_motion_polls(200);
        let c = Arc::new(controller(&sdk));
        c.initialize().await.unwrap();

        let mover = {
            let c = c.clone();
            tokio::spawn(async move { c.move_relative(&[50.0, 0.0, 0.0]).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(c.state(), ControllerState::Moving);
        c.stop().await.unwrap();

        let err = mover.await.unwrap().unwrap_err();
        assert!(matches!(err, MotionError::Halted(ref id) if id == "gantry-1"));
        assert_eq!(c.current_position().await.unwrap(), Position::ZERO);
        assert_eq!(c.state(), ControllerState::Idle);
    }
}
