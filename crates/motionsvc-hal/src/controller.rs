//! Generic `DeviceController` trait for hexapods, gantries and any other
//! position-controlled stage.
//!
//! Controllers are registered with a
//! [`ControllerRegistry`][crate::registry::ControllerRegistry] owned by the
//! motion kernel.  Every hardware round-trip is `async` and suspends the
//! caller until the vendor call (and any "wait until idle" polling) has
//! completed.

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use motionsvc_types::{ControllerState, DeviceClass, MotionError, Position};
use tokio::sync::watch;

/// Interval between "is moving" status checks while waiting for motion to
/// complete.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Upper bound for [`DeviceController::wait_for_idle`] callers that have no
/// better deadline.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// A live binding between one configured device and its hardware session.
///
/// # Contract
///
/// * `initialize` opens the session.  Expected connectivity failures return
///   an error and leave [`is_connected`][Self::is_connected] false; they must
///   never panic.
/// * `move_to_position` / `move_relative` return only once the hardware
///   reports that motion has finished.  A move cut short by a concurrent
///   `stop` fails with [`MotionError::Halted`].
/// * `stop` is idempotent.
/// * `dispose` may be called any number of times and swallows (logs)
///   cleanup failures.  After it the instance is permanently
///   [`ControllerState::Disconnected`].
#[async_trait]
pub trait DeviceController: Send + Sync {
    /// Identifier of the configured device this controller drives.
    fn device_id(&self) -> &str;

    fn device_class(&self) -> DeviceClass;

    /// Current lifecycle state.
    fn state(&self) -> ControllerState;

    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Open the hardware session.
    async fn initialize(&self) -> Result<(), MotionError>;

    /// Absolute move across every axis relevant to the device class.
    async fn move_to_position(&self, target: Position) -> Result<(), MotionError>;

    /// Incremental move.  `delta` is given in `X Y Z U V W` order; axes the
    /// device does not have are ignored.
    async fn move_relative(&self, delta: &[f64]) -> Result<(), MotionError>;

    /// Halt any motion immediately.
    async fn stop(&self) -> Result<(), MotionError>;

    /// Live position.  Axes the device does not have read as zero.
    async fn current_position(&self) -> Result<Position, MotionError>;

    /// Move to `taught_home` when the device has a taught "Home" position,
    /// otherwise to the class-specific default.
    async fn home(&self, taught_home: Option<Position>) -> Result<(), MotionError>;

    /// Set the system-wide velocity scalar.
    async fn set_speed(&self, speed: f64) -> Result<(), MotionError>;

    async fn speed(&self) -> Result<f64, MotionError>;

    /// Block until every axis reports idle, or fail with
    /// [`MotionError::Timeout`] once `timeout` has elapsed.
    async fn wait_for_idle(&self, timeout: Duration) -> Result<(), MotionError>;

    /// Release the hardware session.
    async fn dispose(&self);
}

// ────────────────────────────────────────────────────────────────────────────
// Shared helpers for concrete controllers
// ────────────────────────────────────────────────────────────────────────────

/// Small interior-mutable slot for a vendor session handle.
///
/// The lock is held only for the copy in or out, never across an `.await`,
/// so a `stop` can always reach the hardware while a move is polling.
#[derive(Debug)]
pub(crate) struct SessionCell<T: Copy> {
    slot: Mutex<Option<T>>,
}

impl<T: Copy> SessionCell<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub(crate) fn get(&self) -> Option<T> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set(&self, value: T) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(value);
    }

    pub(crate) fn take(&self) -> Option<T> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// Lifecycle bookkeeping shared by the concrete controllers: the observable
/// state, the session slot and the number of halts issued so far.
///
/// A move records the halt count when it starts; if the count has moved on
/// by the time the hardware settles, the move was interrupted.
pub(crate) struct Lifecycle<T: Copy> {
    device_id: String,
    state: watch::Sender<ControllerState>,
    session: SessionCell<T>,
    halts: AtomicU64,
}

impl<T: Copy> Lifecycle<T> {
    pub(crate) fn new(device_id: impl Into<String>) -> Self {
        let (state, _) = watch::channel(ControllerState::Uninitialized);
        Self {
            device_id: device_id.into(),
            state,
            session: SessionCell::new(),
            halts: AtomicU64::new(0),
        }
    }

    pub(crate) fn device_id(&self) -> &str {
        &self.device_id
    }

    pub(crate) fn state(&self) -> ControllerState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    pub(crate) fn connected_session(&self) -> Result<T, MotionError> {
        match self.session.get() {
            Some(session) if self.state().is_connected() => Ok(session),
            _ => Err(MotionError::NotConnected(self.device_id.clone())),
        }
    }

    /// Transition only while a session is live, so a concurrent `dispose`
    /// is never overwritten.
    pub(crate) fn set_connected_state(&self, next: ControllerState) {
        self.state.send_if_modified(|current| {
            if current.is_connected() && *current != next {
                *current = next;
                true
            } else {
                false
            }
        });
    }

    /// Enter `Connecting`.  Returns `Ok(false)` when a session is already
    /// live and there is nothing to do.
    pub(crate) fn begin_connect(&self) -> Result<bool, MotionError> {
        match self.state() {
            ControllerState::Disconnected => Err(MotionError::NotConnected(self.device_id.clone())),
            s if s.is_connected() => Ok(false),
            _ => {
                self.state.send_replace(ControllerState::Connecting);
                Ok(true)
            }
        }
    }

    pub(crate) fn connected(&self, session: T) {
        self.session.set(session);
        self.state.send_replace(ControllerState::Connected);
    }

    pub(crate) fn connect_failed(&self) {
        self.state.send_replace(ControllerState::Uninitialized);
    }

    /// Enter `Moving` and return the halt count the move runs under.
    pub(crate) fn begin_move(&self) -> u64 {
        let generation = self.halts.load(Ordering::SeqCst);
        self.set_connected_state(ControllerState::Moving);
        generation
    }

    /// Return to `Idle` and turn a move that settled after a halt into
    /// [`MotionError::Halted`].
    pub(crate) fn finish_move(
        &self,
        generation: u64,
        settled: Result<(), MotionError>,
    ) -> Result<(), MotionError> {
        self.set_connected_state(ControllerState::Idle);
        settled?;
        if self.halts.load(Ordering::SeqCst) != generation {
            return Err(MotionError::Halted(self.device_id.clone()));
        }
        Ok(())
    }

    /// Count a halt.  Called before the halt reaches the hardware so a
    /// polling move cannot observe the stop before the count.
    pub(crate) fn record_halt(&self) {
        self.halts.fetch_add(1, Ordering::SeqCst);
    }

    /// Enter the terminal `Disconnected` state.  Returns `None` when the
    /// controller was already disposed, otherwise the session to close (if
    /// one was open).
    pub(crate) fn dispose(&self) -> Option<Option<T>> {
        let previous = self.state.send_replace(ControllerState::Disconnected);
        (previous != ControllerState::Disconnected).then(|| self.session.take())
    }
}

/// Run `settle` under `timeout`, mapping expiry to [`MotionError::Timeout`].
pub(crate) async fn idle_within<F>(device: &str, timeout: Duration, settle: F) -> Result<(), MotionError>
where
    F: Future<Output = Result<(), MotionError>>,
{
    tokio::time::timeout(timeout, settle)
        .await
        .map_err(|_| MotionError::Timeout {
            device: device.to_string(),
            after_ms: timeout.as_millis() as u64,
        })?
}

/// Reject non-finite or non-positive velocity scalars.
pub(crate) fn validate_speed(device: &str, speed: f64) -> Result<(), MotionError> {
    if speed.is_finite() && speed > 0.0 {
        Ok(())
    } else {
        Err(MotionError::InvalidArgument(format!(
            "speed for {device} must be a positive finite number, got {speed}"
        )))
    }
}

/// Validate an incremental move vector (one to six finite components).
pub(crate) fn validate_delta(device: &str, delta: &[f64]) -> Result<(), MotionError> {
    if delta.is_empty() || delta.len() > 6 {
        return Err(MotionError::InvalidArgument(format!(
            "relative move for {device} needs 1..=6 components, got {}",
            delta.len()
        )));
    }
    if delta.iter().any(|d| !d.is_finite()) {
        return Err(MotionError::InvalidArgument(format!(
            "relative move for {device} contains a non-finite component"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cell_set_get_take() {
        let cell = SessionCell::<i32>::new();
        assert_eq!(cell.get(), None);
        cell.set(7);
        assert_eq!(cell.get(), Some(7));
        assert_eq!(cell.take(), Some(7));
        assert_eq!(cell.take(), None);
    }

    #[test]
    fn lifecycle_connect_guard() {
        let life = Lifecycle::<i32>::new("d");
        assert!(matches!(life.connected_session(), Err(MotionError::NotConnected(_))));
        assert_eq!(life.begin_connect(), Ok(true));
        assert_eq!(life.state(), ControllerState::Connecting);
        life.connect_failed();
        assert_eq!(life.state(), ControllerState::Uninitialized);

        assert_eq!(life.begin_connect(), Ok(true));
        life.connected(3);
        assert_eq!(life.begin_connect(), Ok(false));
        assert_eq!(life.connected_session(), Ok(3));
    }

    #[test]
    fn move_interrupted_by_halt_is_reported() {
        let life = Lifecycle::<i32>::new("d");
        life.begin_connect().unwrap();
        life.connected(1);

        let generation = life.begin_move();
        assert_eq!(life.state(), ControllerState::Moving);
        assert_eq!(life.finish_move(generation, Ok(())), Ok(()));
        assert_eq!(life.state(), ControllerState::Idle);

        let generation = life.begin_move();
        life.record_halt();
        assert_eq!(
            life.finish_move(generation, Ok(())),
            Err(MotionError::Halted("d".into()))
        );

        // A halt before the move started does not taint it.
        let generation = life.begin_move();
        assert_eq!(life.finish_move(generation, Ok(())), Ok(()));

        // Hardware faults win over the halt check.
        let generation = life.begin_move();
        life.record_halt();
        let fault = MotionError::hardware("d", "axis fault");
        assert_eq!(life.finish_move(generation, Err(fault.clone())), Err(fault));
    }

    #[test]
    fn lifecycle_dispose_is_terminal() {
        let life = Lifecycle::<i32>::new("d");
        life.begin_connect().unwrap();
        life.connected(5);
        assert_eq!(life.dispose(), Some(Some(5)));
        assert_eq!(life.dispose(), None);
        assert_eq!(life.state(), ControllerState::Disconnected);
        assert!(life.begin_connect().is_err());

        // Transitions after disposal are ignored.
        life.set_connected_state(ControllerState::Idle);
        assert_eq!(life.state(), ControllerState::Disconnected);
    }

    #[tokio::test]
    async fn idle_within_maps_expiry_to_timeout() {
        let err = idle_within("d", Duration::from_millis(5), std::future::pending())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MotionError::Timeout {
                device: "d".into(),
                after_ms: 5
            }
        );
        assert!(idle_within("d", Duration::from_millis(5), async { Ok(()) }).await.is_ok());
    }

    #[test]
    fn speed_must_be_positive_and_finite() {
        assert!(validate_speed("d", 1.5).is_ok());
        assert!(validate_speed("d", 0.0).is_err());
        assert!(validate_speed("d", -2.0).is_err());
        assert!(validate_speed("d", f64::NAN).is_err());
    }

    #[test]
    fn delta_length_and_values_are_checked() {
        assert!(validate_delta("d", &[0.1]).is_ok());
        assert!(validate_delta("d", &[0.0; 6]).is_ok());
        assert!(validate_delta("d", &[]).is_err());
        assert!(validate_delta("d", &[0.0; 7]).is_err());
        assert!(validate_delta("d", &[f64::INFINITY]).is_err());
    }
}
