//! In-process simulated vendor SDKs for CI and hardware-free operation.
//!
//! [`SimHexapodSdk`] and [`SimGantrySdk`] implement the vendor capability
//! traits on top of a shared [`SimBench`]: a table of simulated units keyed
//! by network endpoint (`address:port`).  A move takes a configurable number
//! of "is moving" polls to complete, which lets tests exercise the real
//! wait-until-idle loops, halts and timeouts.
//!
//! Fault injection:
//!
//! * [`SimBench::refuse_connections`] – `connect`/`open` fails for an
//!   endpoint.
//! * [`SimBench::fail_moves_to`] – any move whose target equals the given
//!   position is rejected by the "controller".
//!
//! [`SimBackend`] bundles one SDK of each class and builds a
//! [`SdkControllerFactory`] over them.
//!
//! # Example
//!
//! ```rust
//! use motionsvc_hal::sim::SimBackend;
//! use motionsvc_hal::ControllerFactory;
//! use motionsvc_types::{DeviceClass, DeviceConfig, Position};
//!
//! let backend = SimBackend::new();
//! let device = DeviceConfig::new("hex-1", "Hexapod Left", DeviceClass::Hexapod)
//!     .with_endpoint("10.0.0.10", 50000);
//! backend.place_device(&device, Position::linear(1.0, 2.0, 3.0));
//!
//! let controller = backend.factory().create(&device);
//! assert!(controller.is_some());
//! assert_eq!(backend.position_of(&device), Some(Position::linear(1.0, 2.0, 3.0)));
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use motionsvc_types::{DeviceClass, DeviceConfig, Position};

use crate::factory::SdkControllerFactory;
use crate::sdk::{GantryHandle, GantrySdk, HexapodSdk, SdkError};

/// Polls a simulated move needs before it reports idle.
const DEFAULT_MOTION_POLLS: u32 = 2;

/// Two targets closer than this on every axis are considered identical.
const TARGET_EPSILON: f64 = 1e-9;

// ────────────────────────────────────────────────────────────────────────────
// Simulated unit
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct SimUnit {
    position: [f64; 6],
    target: [f64; 6],
    remaining_polls: u32,
    velocity: [f64; 6],
    enabled: [bool; 6],
    moves_issued: usize,
    fault_targets: Vec<[f64; 6]>,
    refuse_connect: bool,
}

impl Default for SimUnit {
    fn default() -> Self {
        Self {
            position: [0.0; 6],
            target: [0.0; 6],
            remaining_polls: 0,
            velocity: [1.0; 6],
            enabled: [false; 6],
            moves_issued: 0,
            fault_targets: Vec::new(),
            refuse_connect: false,
        }
    }
}

impl SimUnit {
    fn command_move(
        &mut self,
        axes: &[usize],
        values: &[f64],
        relative: bool,
        motion_polls: u32,
    ) -> Result<(), SdkError> {
        if axes.len() != values.len() {
            return Err(SdkError::CommandRejected {
                code: 2,
                message: format!("{} axes but {} values", axes.len(), values.len()),
            });
        }
        let mut target = self.position;
        for (&axis, &value) in axes.iter().zip(values) {
            target[axis] = if relative { target[axis] + value } else { value };
        }
        if self
            .fault_targets
            .iter()
            .any(|fault| fault.iter().zip(&target).all(|(a, b)| (a - b).abs() < TARGET_EPSILON))
        {
            return Err(SdkError::CommandRejected {
                code: 7,
                message: "target out of workspace".to_string(),
            });
        }
        self.moves_issued += 1;
        self.target = target;
        if motion_polls == 0 {
            self.position = target;
            self.remaining_polls = 0;
        } else {
            self.remaining_polls = motion_polls;
        }
        Ok(())
    }

    /// One status poll.  Motion completes on the poll that drains the
    /// counter.
    fn poll_moving(&mut self) -> bool {
        if self.remaining_polls == 0 {
            return false;
        }
        self.remaining_polls -= 1;
        if self.remaining_polls == 0 {
            self.position = self.target;
            false
        } else {
            true
        }
    }

    fn halt(&mut self) {
        self.remaining_polls = 0;
        self.target = self.position;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bench
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct BenchState {
    units: HashMap<String, SimUnit>,
    sessions: HashMap<u64, String>,
    next_session: u64,
    motion_polls: u32,
}

impl Default for BenchState {
    fn default() -> Self {
        Self {
            units: HashMap::new(),
            sessions: HashMap::new(),
            next_session: 1,
            motion_polls: DEFAULT_MOTION_POLLS,
        }
    }
}

/// Shared table of simulated units, keyed by `address:port`.
///
/// All configuration methods take `&self`, so a bench can be reconfigured
/// after its SDK has been handed to a controller factory.
#[derive(Debug, Default)]
pub struct SimBench {
    state: Mutex<BenchState>,
}

fn endpoint(address: &str, port: u16) -> String {
    format!("{address}:{port}")
}

impl SimBench {
    fn lock(&self) -> MutexGuard<'_, BenchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of polls every subsequent move takes to complete.  Zero makes
    /// moves complete instantly.
    pub fn set_motion_polls(&self, polls: u32) {
        self.lock().motion_polls = polls;
    }

    /// Put the unit at `address:port` at `position` (creating it if needed).
    pub fn place(&self, address: &str, port: u16, position: Position) {
        let mut state = self.lock();
        let unit = state.units.entry(endpoint(address, port)).or_default();
        unit.position = position.to_axes();
        unit.target = unit.position;
        unit.remaining_polls = 0;
    }

    /// Make `connect`/`open` fail for `address:port`.
    pub fn refuse_connections(&self, address: &str, port: u16) {
        self.lock()
            .units
            .entry(endpoint(address, port))
            .or_default()
            .refuse_connect = true;
    }

    /// Reject any move of the unit at `address:port` whose target is
    /// `position`.
    pub fn fail_moves_to(&self, address: &str, port: u16, position: Position) {
        self.lock()
            .units
            .entry(endpoint(address, port))
            .or_default()
            .fault_targets
            .push(position.to_axes());
    }

    /// Current simulated position, if the unit exists.
    pub fn position_of(&self, address: &str, port: u16) -> Option<Position> {
        self.lock()
            .units
            .get(&endpoint(address, port))
            .map(|u| Position::from_axes(&u.position))
    }

    /// Number of accepted move commands sent to the unit.
    pub fn moves_issued(&self, address: &str, port: u16) -> usize {
        self.lock()
            .units
            .get(&endpoint(address, port))
            .map(|u| u.moves_issued)
            .unwrap_or(0)
    }

    /// Number of sessions currently open across all units.
    pub fn open_sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    fn open(&self, address: &str, port: u16) -> Result<u64, SdkError> {
        let key = endpoint(address, port);
        let mut state = self.lock();
        let unit = state.units.entry(key.clone()).or_default();
        if unit.refuse_connect {
            return Err(SdkError::ConnectionFailed {
                endpoint: key,
                reason: "connection refused".to_string(),
            });
        }
        let session = state.next_session;
        state.next_session += 1;
        state.sessions.insert(session, key);
        Ok(session)
    }

    fn close(&self, session: u64) -> Result<(), SdkError> {
        self.lock()
            .sessions
            .remove(&session)
            .map(|_| ())
            .ok_or_else(|| SdkError::CommandRejected {
                code: 1,
                message: format!("unknown session {session}"),
            })
    }

    fn with_unit<R>(
        &self,
        session: u64,
        f: impl FnOnce(&mut SimUnit, u32) -> Result<R, SdkError>,
    ) -> Result<R, SdkError> {
        let mut state = self.lock();
        let polls = state.motion_polls;
        let key = state
            .sessions
            .get(&session)
            .cloned()
            .ok_or_else(|| SdkError::Transport(format!("session {session} is not open")))?;
        let unit = state.units.entry(key).or_default();
        f(unit, polls)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Hexapod SDK
// ────────────────────────────────────────────────────────────────────────────

/// Simulated hexapod binding.
#[derive(Debug, Default)]
pub struct SimHexapodSdk {
    bench: SimBench,
}

impl SimHexapodSdk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bench(&self) -> &SimBench {
        &self.bench
    }
}

fn hexapod_axes(axes: &str) -> Result<Vec<usize>, SdkError> {
    axes.split_whitespace()
        .map(|axis| match axis {
            "X" => Ok(0),
            "Y" => Ok(1),
            "Z" => Ok(2),
            "U" => Ok(3),
            "V" => Ok(4),
            "W" => Ok(5),
            other => Err(SdkError::CommandRejected {
                code: 15,
                message: format!("invalid axis identifier '{other}'"),
            }),
        })
        .collect()
}

fn session_id(id: i32) -> u64 {
    u64::from(id.unsigned_abs())
}

#[async_trait]
impl HexapodSdk for SimHexapodSdk {
    async fn connect(&self, address: &str, port: u16) -> Result<i32, SdkError> {
        let session = self.bench.open(address, port)?;
        i32::try_from(session).map_err(|_| SdkError::Transport("controller id overflow".into()))
    }

    async fn move_absolute(&self, id: i32, axes: &str, values: &[f64]) -> Result<(), SdkError> {
        let axes = hexapod_axes(axes)?;
        self.bench
            .with_unit(session_id(id), |unit, polls| unit.command_move(&axes, values, false, polls))
    }

    async fn move_relative(&self, id: i32, axes: &str, values: &[f64]) -> Result<(), SdkError> {
        let axes = hexapod_axes(axes)?;
        self.bench
            .with_unit(session_id(id), |unit, polls| unit.command_move(&axes, values, true, polls))
    }

    async fn is_moving(&self, id: i32) -> Result<bool, SdkError> {
        self.bench
            .with_unit(session_id(id), |unit, _| Ok(unit.poll_moving()))
    }

    async fn halt(&self, id: i32) -> Result<(), SdkError> {
        self.bench.with_unit(session_id(id), |unit, _| {
            unit.halt();
            Ok(())
        })
    }

    async fn query_position(&self, id: i32, axes: &str) -> Result<Vec<f64>, SdkError> {
        let axes = hexapod_axes(axes)?;
        self.bench.with_unit(session_id(id), |unit, _| {
            Ok(axes.iter().map(|&a| unit.position[a]).collect())
        })
    }

    async fn set_system_velocity(&self, id: i32, velocity: f64) -> Result<(), SdkError> {
        self.bench.with_unit(session_id(id), |unit, _| {
            unit.velocity = [velocity; 6];
            Ok(())
        })
    }

    async fn system_velocity(&self, id: i32) -> Result<f64, SdkError> {
        self.bench
            .with_unit(session_id(id), |unit, _| Ok(unit.velocity[0]))
    }

    async fn close(&self, id: i32) -> Result<(), SdkError> {
        self.bench.close(session_id(id))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Gantry SDK
// ────────────────────────────────────────────────────────────────────────────

/// Simulated gantry binding.  Axes must be enabled before they move.
#[derive(Debug, Default)]
pub struct SimGantrySdk {
    bench: SimBench,
}

impl SimGantrySdk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bench(&self) -> &SimBench {
        &self.bench
    }
}

fn check_gantry_axis(axis: usize) -> Result<(), SdkError> {
    if axis < 3 {
        Ok(())
    } else {
        Err(SdkError::CommandRejected {
            code: 3001,
            message: format!("axis {axis} does not exist"),
        })
    }
}

#[async_trait]
impl GantrySdk for SimGantrySdk {
    async fn open(&self, address: &str, port: u16) -> Result<GantryHandle, SdkError> {
        self.bench.open(address, port).map(GantryHandle)
    }

    async fn enable_axes(&self, handle: GantryHandle, axes: &[usize]) -> Result<(), SdkError> {
        axes.iter().try_for_each(|&a| check_gantry_axis(a))?;
        self.bench.with_unit(handle.0, |unit, _| {
            for &axis in axes {
                unit.enabled[axis] = true;
            }
            Ok(())
        })
    }

    async fn to_point(
        &self,
        handle: GantryHandle,
        axes: &[usize],
        points: &[f64],
        relative: bool,
    ) -> Result<(), SdkError> {
        axes.iter().try_for_each(|&a| check_gantry_axis(a))?;
        self.bench.with_unit(handle.0, |unit, polls| {
            if let Some(&axis) = axes.iter().find(|&&a| !unit.enabled[a]) {
                return Err(SdkError::CommandRejected {
                    code: 3002,
                    message: format!("axis {axis} is disabled"),
                });
            }
            unit.command_move(axes, points, relative, polls)
        })
    }

    async fn axis_moving(&self, handle: GantryHandle, axis: usize) -> Result<bool, SdkError> {
        check_gantry_axis(axis)?;
        // The whole unit settles together, so only the first axis drains the
        // motion counter; other axes mirror it.
        self.bench.with_unit(handle.0, |unit, _| {
            Ok(if axis == 0 {
                unit.poll_moving()
            } else {
                unit.remaining_polls > 0
            })
        })
    }

    async fn kill_all(&self, handle: GantryHandle) -> Result<(), SdkError> {
        self.bench.with_unit(handle.0, |unit, _| {
            unit.halt();
            Ok(())
        })
    }

    async fn feedback_position(&self, handle: GantryHandle, axis: usize) -> Result<f64, SdkError> {
        check_gantry_axis(axis)?;
        self.bench
            .with_unit(handle.0, |unit, _| Ok(unit.position[axis]))
    }

    async fn set_velocity(&self, handle: GantryHandle, axis: usize, velocity: f64) -> Result<(), SdkError> {
        check_gantry_axis(axis)?;
        self.bench.with_unit(handle.0, |unit, _| {
            unit.velocity[axis] = velocity;
            Ok(())
        })
    }

    async fn velocity(&self, handle: GantryHandle, axis: usize) -> Result<f64, SdkError> {
        check_gantry_axis(axis)?;
        self.bench
            .with_unit(handle.0, |unit, _| Ok(unit.velocity[axis]))
    }

    async fn close(&self, handle: GantryHandle) -> Result<(), SdkError> {
        self.bench.close(handle.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Backend bundle
// ────────────────────────────────────────────────────────────────────────────

/// One simulated SDK per device class plus device-level helpers that route
/// to the right bench by [`DeviceConfig::device_class`].
#[derive(Debug, Clone, Default)]
pub struct SimBackend {
    pub hexapod: Arc<SimHexapodSdk>,
    pub gantry: Arc<SimGantrySdk>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A controller factory over both simulated SDKs.
    pub fn factory(&self) -> SdkControllerFactory {
        SdkControllerFactory::new()
            .with_hexapod_sdk(self.hexapod.clone())
            .with_gantry_sdk(self.gantry.clone())
    }

    /// The bench serving `class`.
    pub fn bench(&self, class: DeviceClass) -> &SimBench {
        match class {
            DeviceClass::Hexapod => self.hexapod.bench(),
            DeviceClass::Gantry => self.gantry.bench(),
        }
    }

    /// Set the motion duration (in polls) on both benches.
    pub fn set_motion_polls(&self, polls: u32) {
        self.hexapod.bench().set_motion_polls(polls);
        self.gantry.bench().set_motion_polls(polls);
    }

    pub fn place_device(&self, device: &DeviceConfig, position: Position) {
        self.bench(device.device_class)
            .place(&device.address, device.port, position.for_class(device.device_class));
    }

    pub fn refuse_device(&self, device: &DeviceConfig) {
        self.bench(device.device_class)
            .refuse_connections(&device.address, device.port);
    }

    pub fn fail_device_moves_to(&self, device: &DeviceConfig, position: Position) {
        self.bench(device.device_class).fail_moves_to(
            &device.address,
            device.port,
            position.for_class(device.device_class),
        );
    }

    pub fn position_of(&self, device: &DeviceConfig) -> Option<Position> {
        self.bench(device.device_class)
            .position_of(&device.address, device.port)
    }

    pub fn moves_issued(&self, device: &DeviceConfig) -> usize {
        self.bench(device.device_class)
            .moves_issued(&device.address, device.port)
    }
}
