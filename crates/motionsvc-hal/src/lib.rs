//! `motionsvc-hal` – Device Controller Abstraction
//!
//! A uniform command/status surface over heterogeneous positioning hardware.
//! The rest of the system only ever talks to [`DeviceController`], so vendor
//! bindings can be swapped without touching the kernel, planner or
//! coordinator.
//!
//! # Modules
//!
//! - [`controller`] – the [`DeviceController`] capability trait plus the
//!   shared polling constants.
//! - [`sdk`] – opaque vendor capabilities ([`HexapodSdk`], [`GantrySdk`]) and
//!   their [`SdkError`] vocabulary.
//! - [`hexapod`] / [`gantry`] – the two concrete controllers, each
//!   self-contained behind the same contract.
//! - [`factory`] – [`ControllerFactory`]: builds the right controller for a
//!   [`DeviceConfig`][motionsvc_types::DeviceConfig].
//! - [`registry`] – [`ControllerRegistry`]: device id → live controller.
//! - [`sim`] – simulated vendor SDKs for running the full stack without
//!   hardware.

pub mod controller;
pub mod factory;
pub mod gantry;
pub mod hexapod;
pub mod registry;
pub mod sdk;
pub mod sim;

pub use controller::{DEFAULT_IDLE_TIMEOUT, DeviceController, POLL_INTERVAL};
pub use factory::{ControllerFactory, SdkControllerFactory};
pub use gantry::{GANTRY_DEFAULT_HOME, GantryController};
pub use hexapod::{HEXAPOD_DEFAULT_HOME, HexapodController};
pub use registry::ControllerRegistry;
pub use sdk::{GantryHandle, GantrySdk, HexapodSdk, SdkError};
pub use sim::{SimBackend, SimBench, SimGantrySdk, SimHexapodSdk};
