//! `motionsvc-runtime` – Coordination & Service Composition
//!
//! Ties the kernel and planner together into the surface an operator
//! console or automation client talks to.
//!
//! # Modules
//!
//! - [`operation`] – [`CoordinatedOperation`] / [`CoordinationStep`]: an
//!   ordered list of parallel or sequential multi-device steps with async
//!   completion and failure hooks.
//! - [`coordinator`] – [`MultiDeviceCoordinator`]: parallel, sequential and
//!   multi-step execution of per-device paths with cooperative
//!   cancellation.
//! - [`service`] – [`MotionService`]: owns one kernel, one planner and one
//!   coordinator and exposes every operation of all three.
//! - [`monitor`] – [`PositionMonitor`]: cancellable periodic position
//!   sampling into a bounded channel.
//! - [`telemetry`] – `tracing` subscriber and optional OTLP exporter setup.

pub mod coordinator;
pub mod monitor;
pub mod operation;
pub mod service;
pub mod telemetry;

pub use coordinator::{DeviceResults, MultiDeviceCoordinator};
pub use monitor::{PositionMonitor, PositionUpdate};
pub use operation::{CoordinatedOperation, CoordinationStep, ExecutionMode, HookError};
pub use service::MotionService;
