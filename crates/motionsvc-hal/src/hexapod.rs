//! [`HexapodController`] – six-axis stage behind a [`HexapodSdk`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use motionsvc_types::{ControllerState, DeviceClass, DeviceConfig, MotionError, Position};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::controller::{
    DeviceController, Lifecycle, POLL_INTERVAL, idle_within, validate_delta, validate_speed,
};
use crate::sdk::{HexapodSdk, SdkError};

/// Axis letters in `X Y Z U V W` order, as the vendor binding expects them.
const AXES: [&str; 6] = ["X", "Y", "Z", "U", "V", "W"];

/// Home target when the device has no taught "Home" position.
pub const HEXAPOD_DEFAULT_HOME: Position = Position::ZERO;

/// Controller for one hexapod.
pub struct HexapodController {
    address: String,
    port: u16,
    sdk: Arc<dyn HexapodSdk>,
    life: Lifecycle<i32>,
    poll_interval: Duration,
}

impl HexapodController {
    pub fn new(device: &DeviceConfig, sdk: Arc<dyn HexapodSdk>) -> Self {
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

    /// Subscribe to lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.life.subscribe()
    }

    fn fault(&self, err: SdkError) -> MotionError {
        MotionError::hardware(self.life.device_id(), err)
    }

    async fn wait_until_settled(&self, id: i32) -> Result<(), MotionError> {
        while self.sdk.is_moving(id).await.map_err(|e| self.fault(e))? {
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(())
    }

    /// Wait for an issued command to finish and return to `Idle` either way.
    async fn settle(
        &self,
        id: i32,
        generation: u64,
        issued: Result<(), SdkError>,
    ) -> Result<(), MotionError> {
        let settled = match issued {
            Ok(()) => self.wait_until_settled(id).await,
            Err(e) => Err(self.fault(e)),
        };
        self.life.finish_move(generation, settled)
    }
}

#[async_trait]
impl DeviceController for HexapodController {
    fn device_id(&self) -> &str {
        self.life.device_id()
    }

    fn device_class(&self) -> DeviceClass {
        DeviceClass::Hexapod
    }

    fn state(&self) -> ControllerState {
        self.life.state()
    }

    async fn initialize(&self) -> Result<(), MotionError> {
        if !self.life.begin_connect()? {
            return Ok(());
        }
        match self.sdk.connect(&self.address, self.port).await {
            Ok(id) => {
                self.life.connected(id);
                info!(device = %self.device_id(), controller_id = id, "hexapod connected");
                Ok(())
            }
            Err(e) => {
                self.life.connect_failed();
                warn!(device = %self.device_id(), error = %e, "hexapod connection failed");
                Err(self.fault(e))
            }
        }
    }

    async fn move_to_position(&self, target: Position) -> Result<(), MotionError> {
        let id = self.life.connected_session()?;
        if !target.is_finite() {
            return Err(MotionError::InvalidArgument(format!(
                "non-finite target for {}",
                self.device_id()
            )));
        }
        debug!(device = %self.device_id(), %target, "hexapod absolute move");
        let generation = self.life.begin_move();
        let issued = self
            .sdk
            .move_absolute(id, &AXES.join(" "), &target.to_axes())
            .await;
        self.settle(id, generation, issued).await
    }

    async fn move_relative(&self, delta: &[f64]) -> Result<(), MotionError> {
        let id = self.life.connected_session()?;
        validate_delta(self.device_id(), delta)?;
        let axes = AXES[..delta.len()].join(" ");
        debug!(device = %self.device_id(), ?delta, "hexapod relative move");
        let generation = self.life.begin_move();
        let issued = self.sdk.move_relative(id, &axes, delta).await;
        self.settle(id, generation, issued).await
    }

    async fn stop(&self) -> Result<(), MotionError> {
        let Ok(id) = self.life.connected_session() else {
            debug!(device = %self.device_id(), "stop on unconnected hexapod is a no-op");
            return Ok(());
        };
        self.life.record_halt();
        self.sdk.halt(id).await.map_err(|e| self.fault(e))?;
        self.life.set_connected_state(ControllerState::Idle);
        Ok(())
    }

    async fn current_position(&self) -> Result<Position, MotionError> {
        let id = self.life.connected_session()?;
        let values = self
            .sdk
            .query_position(id, &AXES.join(" "))
            .await
            .map_err(|e| self.fault(e))?;
        Ok(Position::from_axes(&values))
    }

    async fn home(&self, taught_home: Option<Position>) -> Result<(), MotionError> {
        let target = taught_home.unwrap_or(HEXAPOD_DEFAULT_HOME);
        info!(device = %self.device_id(), taught = taught_home.is_some(), "hexapod homing");
        self.move_to_position(target).await
    }

    async fn set_speed(&self, speed: f64) -> Result<(), MotionError> {
        let id = self.life.connected_session()?;
        validate_speed(self.device_id(), speed)?;
        self.sdk
            .set_system_velocity(id, speed)
            .await
            .map_err(|e| self.fault(e))
    }

    async fn speed(&self) -> Result<f64, MotionError> {
        let id = self.life.connected_session()?;
        self.sdk
            .system_velocity(id)
            .await
            .map_err(|e| self.fault(e))
    }

    async fn wait_for_idle(&self, timeout: Duration) -> Result<(), MotionError> {
        let id = self.life.connected_session()?;
        idle_within(self.device_id(), timeout, self.wait_until_settled(id)).await
    }

    async fn dispose(&self) {
        let Some(session) = self.life.dispose() else {
            return;
        };
        if let Some(id) = session
            && let Err(e) = self.sdk.close(id).await
        {
            warn!(device = %self.device_id(), error = %e, "hexapod close failed; continuing");
        }
        info!(device = %self.device_id(), "hexapod disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimHexapodSdk;

    fn device() -> DeviceConfig {
        DeviceConfig::new("hex-1", "Hexapod Left", DeviceClass::Hexapod).with_endpoint("10.0.0.1", 50000)
    }

    fn controller(sdk: &Arc<SimHexapodSdk>) -> HexapodController {
        HexapodController::new(&device(), sdk.clone()).with_poll_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn initialize_connects_and_moves_absolute() {
        let sdk = Arc::new(SimHexapodSdk::new());
        let c = controller(&sdk);
        assert!(!c.is_connected());

        c.initialize().await.unwrap();
        assert_eq!(c.state(), ControllerState::Connected);

        let target = Position::new(1.0, 2.0, 3.0, 0.1, 0.2, 0.3);
        c.move_to_position(target).await.unwrap();
        assert_eq!(c.state(), ControllerState::Idle);
        assert_eq!(c.current_position().await.unwrap(), target);
    }

    #[tokio::test]
    async fn failed_connection_leaves_controller_unconnected() {
        let sdk = Arc::new(SimHexapodSdk::new());
        sdk.bench().refuse_connections("10.0.0.1", 50000);
        let c = controller(&sdk);

        assert!(matches!(c.initialize().await, Err(MotionError::HardwareFault { .. })));
        assert!(!c.is_connected());
        assert!(matches!(
            c.move_to_position(Position::ZERO).await,
            Err(MotionError::NotConnected(_))
        ));
    }

    #[tokio::test]
    async fn relative_move_addresses_leading_axes() {
        let sdk = Arc::new(SimHexapodSdk::new());
        sdk.bench().place("10.0.0.1", 50000, Position::linear(1.0, 1.0, 1.0));
        let c = controller(&sdk);
        c.initialize().await.unwrap();

        c.move_relative(&[0.5, -0.5]).await.unwrap();
        assert_eq!(c.current_position().await.unwrap(), Position::linear(1.5, 0.5, 1.0));
        assert!(c.move_relative(&[]).await.is_err());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let sdk = Arc::new(SimHexapodSdk::new());
        let c = controller(&sdk);
        // Before connecting it is a no-op.
        c.stop().await.unwrap();
        c.initialize().await.unwrap();
        c.stop().await.unwrap();
        c.stop().await.unwrap();
        assert_eq!(c.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn hardware_fault_during_move_surfaces_as_error() {
        let sdk = Arc::new(SimHexapodSdk::new());
        let bad = Position::linear(99.0, 0.0, 0.0);
        sdk.bench().fail_moves_to("10.0.0.1", 50000, bad);
        let c = controller(&sdk);
        c.initialize().await.unwrap();

        let err = c.move_to_position(bad).await.unwrap_err();
        assert!(matches!(err, MotionError::HardwareFault { .. }));
        assert!(c.is_connected());
        assert_eq!(c.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn home_prefers_taught_position() {
        let sdk = Arc::new(SimHexapodSdk::new());
        sdk.bench().place("10.0.0.1", 50000, Position::linear(4.0, 4.0, 4.0));
        let c = controller(&sdk);
        c.initialize().await.unwrap();

        c.home(None).await.unwrap();
        assert_eq!(c.current_position().await.unwrap(), HEXAPOD_DEFAULT_HOME);

        let taught = Position::new(0.0, 0.0, 10.0, 0.0, 0.0, 1.0);
        c.home(Some(taught)).await.unwrap();
        assert_eq!(c.current_position().await.unwrap(), taught);
    }

    #[tokio::test]
    async fn speed_round_trips_and_is_validated() {
        let sdk = Arc::new(SimHexapodSdk::new());
        let c = controller(&sdk);
        c.initialize().await.unwrap();

        c.set_speed(2.5).await.unwrap();
        assert_eq!(c.speed().await.unwrap(), 2.5);
        assert!(matches!(c.set_speed(0.0).await, Err(MotionError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn wait_for_idle_times_out_on_endless_motion() {
        let sdk = Arc::new(SimHexapodSdk::new());
        sdk.bench().set_motion_polls(100_000);
        let c = Arc::new(controller(&sdk));
        c.initialize().await.unwrap();

        let mover = {
            let c = c.clone();
            tokio::spawn(async move { c.move_to_position(Position::linear(1.0, 0.0, 0.0)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(c.state(), ControllerState::Moving);

        let err = c.wait_for_idle(Duration::from_millis(30)).await.unwrap_err();
        assert!(matches!(err, MotionError::Timeout { .. }));

        c.stop().await.unwrap();
        assert!(matches!(mover.await.unwrap(), Err(MotionError::Halted(_))));
        c.wait_for_idle(Duration::from_millis(100)).await.unwrap();
    }

    #[tokio::test]
    async fn stop_during_move_fails_the_move() {
        let sdk = Arc::new(SimHexapodSdk::new());
        sdk.bench().set_motion_polls(200);
        let c = Arc::new(controller(&sdk));
        c.initialize().await.unwrap();

        let target = Position::linear(3.0, 0.0, 0.0);
        let mover = {
            let c = c.clone();
            tokio::spawn(async move { c.move_to_position(target).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        c.stop().await.unwrap();

        let err = mover.await.unwrap().unwrap_err();
        assert_eq!(err, MotionError::Halted("hex-1".into()));
        assert_eq!(c.state(), ControllerState::Idle);

        // The next move is unaffected by the earlier halt.
        sdk.bench().set_motion_polls(0);
        c.move_to_position(target).await.unwrap();
        assert_eq!(c.current_position().await.unwrap(), target);
    }

    #[tokio::test]
    async fn dispose_is_terminal_and_repeatable() {
        let sdk = Arc::new(SimHexapodSdk::new());
        let c = controller(&sdk);
        c.initialize().await.unwrap();
        assert_eq!(sdk.bench().open_sessions(), 1);

        c.dispose().await;
        c.dispose().await;
        assert_eq!(c.state(), ControllerState::Disconnected);
        assert_eq!(sdk.bench().open_sessions(), 0);
        assert!(c.initialize().await.is_err());
        assert!(c.current_position().await.is_err());
    }
}
