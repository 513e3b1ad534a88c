//! `motionsvc-types` – shared domain vocabulary.
//!
//! Every other crate in the workspace speaks in these types: device
//! configuration as loaded from disk, 6-DOF positions, routing graph
//! definitions, controller lifecycle states, and the [`MotionError`]
//! taxonomy used internally before faults are flattened into boolean
//! results at the public boundaries.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ────────────────────────────────────────────────────────────────────────────
// Position
// ────────────────────────────────────────────────────────────────────────────

/// A point in six degrees of freedom.
///
/// `x`, `y`, `z` are linear axes and always meaningful.  `u`, `v`, `w` are
/// rotary axes and only meaningful for [`DeviceClass::Hexapod`] devices; for
/// gantries they are kept at zero (see [`Position::for_class`]).
///
/// Serialises with upper-case axis keys (`{"X":1.0,"Y":2.0,...}`) to match
/// the persisted position files.  Missing rotary keys default to zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
    #[serde(rename = "Z")]
    pub z: f64,
    #[serde(rename = "U", default)]
    pub u: f64,
    #[serde(rename = "V", default)]
    pub v: f64,
    #[serde(rename = "W", default)]
    pub w: f64,
}

impl Position {
    /// The origin on all six axes.
    pub const ZERO: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        u: 0.0,
        v: 0.0,
        w: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64, u: f64, v: f64, w: f64) -> Self {
        Self { x, y, z, u, v, w }
    }

    /// A purely linear position with all rotary axes at zero.
    pub fn linear(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            ..Self::ZERO
        }
    }

    /// Build a position from up to six axis values in `X Y Z U V W` order.
    /// Missing trailing axes are zero; values beyond the sixth are ignored.
    pub fn from_axes(values: &[f64]) -> Self {
        let mut axes = [0.0; 6];
        for (slot, value) in axes.iter_mut().zip(values) {
            *slot = *value;
        }
        let [x, y, z, u, v, w] = axes;
        Self { x, y, z, u, v, w }
    }

    /// All six axes in `X Y Z U V W` order.
    pub fn to_axes(&self) -> [f64; 6] {
        [self.x, self.y, self.z, self.u, self.v, self.w]
    }

    /// Project this position onto the axes a device class actually has.
    ///
    /// Gantries have no rotary axes, so their `u`, `v`, `w` are zeroed.
    pub fn for_class(self, class: DeviceClass) -> Self {
        match class {
            DeviceClass::Hexapod => self,
            DeviceClass::Gantry => Self::linear(self.x, self.y, self.z),
        }
    }

    /// True when every axis value is a finite number.
    pub fn is_finite(&self) -> bool {
        self.to_axes().iter().all(|v| v.is_finite())
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "X={:.4} Y={:.4} Z={:.4} U={:.4} V={:.4} W={:.4}",
            self.x, self.y, self.z, self.u, self.v, self.w
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Devices
// ────────────────────────────────────────────────────────────────────────────

/// The kind of positioning hardware behind a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    /// Six-axis parallel kinematic stage (X, Y, Z, U, V, W).
    Hexapod,
    /// Three-axis linear stage (X, Y, Z).
    Gantry,
}

impl DeviceClass {
    /// Number of axes the hardware exposes.
    pub fn axis_count(&self) -> usize {
        match self {
            DeviceClass::Hexapod => 6,
            DeviceClass::Gantry => 3,
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Hexapod => write!(f, "Hexapod"),
            DeviceClass::Gantry => write!(f, "Gantry"),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// Identity and configuration of one physical unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    /// Unique, stable identifier.
    pub id: String,
    /// Operator-facing display name.  Also feeds the planner's graph-name
    /// heuristic (`"left"`, `"right"`, `"bottom"`).
    #[serde(default)]
    pub name: String,
    pub device_class: DeviceClass,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: u16,
    /// Explicit routing graph identifier, overriding the name heuristic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<String>,
    /// Taught named positions.  Keys are case-sensitive.
    #[serde(default)]
    pub positions: BTreeMap<String, Position>,
}

impl DeviceConfig {
    /// Convenience constructor for an enabled device with no taught
    /// positions.
    pub fn new(id: impl Into<String>, name: impl Into<String>, device_class: DeviceClass) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            device_class,
            enabled: true,
            address: String::new(),
            port: 0,
            graph_id: None,
            positions: BTreeMap::new(),
        }
    }

    /// Builder-style helper used by tests and tooling.
    pub fn with_position(mut self, name: impl Into<String>, position: Position) -> Self {
        self.positions
            .insert(name.into(), position.for_class(self.device_class));
        self
    }

    /// Builder-style helper setting the explicit graph id.
    pub fn with_graph(mut self, graph_id: impl Into<String>) -> Self {
        self.graph_id = Some(graph_id.into());
        self
    }

    /// Builder-style helper setting the network endpoint.
    pub fn with_endpoint(mut self, address: impl Into<String>, port: u16) -> Self {
        self.address = address.into();
        self.port = port;
        self
    }

    /// Look up a taught position by exact (case-sensitive) name.
    pub fn position(&self, name: &str) -> Option<Position> {
        self.positions.get(name).copied()
    }
}

/// Persisted named positions: device id → (position name → coordinates).
pub type PositionTable = BTreeMap<String, BTreeMap<String, Position>>;

// ────────────────────────────────────────────────────────────────────────────
// Graphs
// ────────────────────────────────────────────────────────────────────────────

/// One weighted connection between two named positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDefinition {
    pub from: String,
    pub to: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Only traversable from `from` to `to` when set.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub one_way: bool,
}

fn default_weight() -> f64 {
    1.0
}

impl EdgeDefinition {
    pub fn new(from: impl Into<String>, to: impl Into<String>, weight: f64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            weight,
            one_way: false,
        }
    }
}

/// A routing graph as stored on disk.  Nodes referenced only by edges are
/// legal; the planner synthesises them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphDefinition {
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

/// All graphs known to the planner, keyed by graph id.
pub type GraphCollection = BTreeMap<String, GraphDefinition>;

// ────────────────────────────────────────────────────────────────────────────
// Controller lifecycle
// ────────────────────────────────────────────────────────────────────────────

/// Lifecycle of one controller instance.
///
/// `Uninitialized → Connecting → Connected → (Moving ⇄ Idle) → Disconnected`.
/// `Disconnected` is terminal for that instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerState {
    Uninitialized,
    Connecting,
    Connected,
    Moving,
    Idle,
    Disconnected,
}

impl ControllerState {
    /// True while a live hardware session exists.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ControllerState::Connected | ControllerState::Moving | ControllerState::Idle
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Internal fault taxonomy.
///
/// Public kernel, planner and coordinator operations never return this type
/// directly; they log it and report `false` / `None` / an empty path.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MotionError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device {0} is not connected")]
    NotConnected(String),

    #[error("Position '{position}' is not taught on device {device}")]
    PositionNotFound { device: String, position: String },

    #[error("Hardware Fault on {device}: {details}")]
    HardwareFault { device: String, details: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Timed out after {after_ms} ms waiting for {device}")]
    Timeout { device: String, after_ms: u64 },

    /// A `stop` landed while the move was in flight; the target was not
    /// reached.
    #[error("Motion on {0} was halted before reaching its target")]
    Halted(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl MotionError {
    /// Shorthand for [`MotionError::HardwareFault`].
    pub fn hardware(device: impl Into<String>, details: impl fmt::Display) -> Self {
        MotionError::HardwareFault {
            device: device.into(),
            details: details.to_string(),
        }
    }
}
