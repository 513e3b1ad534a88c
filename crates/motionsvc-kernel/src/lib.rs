//! `motionsvc-kernel` – Motion Kernel
//!
//! Owns device configuration, the controller registry and named-position
//! bookkeeping, and dispatches every single-device operation.  Faults from
//! the hardware layer stop here: public [`MotionKernel`] methods report
//! `bool` / `Option` results and log the underlying
//! [`MotionError`][motionsvc_types::MotionError].
//!
//! # Modules
//!
//! - [`motion_kernel`] – [`MotionKernel`]: initialisation, moves, stop,
//!   home, speed, teach/save/reload and current-position resolution.
//! - [`config_loader`] – tolerant JSON loading of the device list and the
//!   graph collection.
//! - [`position_store`] – [`PositionStore`]: durable load/save of the
//!   device → position table, with JSON-file and in-memory backends.
//! - [`position_match`] – class-aware distance between positions and
//!   nearest-taught-position lookup.

pub mod config_loader;
pub mod motion_kernel;
pub mod position_match;
pub mod position_store;

pub use motion_kernel::{KERNEL_MATCH_TOLERANCE, MotionKernel};
pub use position_match::{ROTARY_WEIGHT, closest_position, match_position, position_distance};
pub use position_store::{JsonPositionStore, MemoryPositionStore, PositionStore};
