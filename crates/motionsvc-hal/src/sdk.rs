//! Vendor hardware capabilities.
//!
//! The real driver bindings live outside this workspace.  Each device class
//! is reached through one of these object-safe traits; the concrete
//! controllers in [`hexapod`][crate::hexapod] and [`gantry`][crate::gantry]
//! translate the uniform [`DeviceController`][crate::DeviceController]
//! contract into calls on them.
//!
//! The two SDKs differ in addressing: the hexapod binding
//! addresses axes by letter through a single integer controller id, while
//! the gantry binding addresses axes by index through an opaque handle and
//! exposes per-axis velocity.

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a vendor binding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SdkError {
    #[error("connection to {endpoint} failed: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("controller rejected command (code {code}): {message}")]
    CommandRejected { code: i32, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Hexapod controller binding.
///
/// `axes` arguments are whitespace-separated axis letters, e.g. `"X Y Z U V W"`,
/// and `values` carries one entry per listed axis in the same order.
#[async_trait]
pub trait HexapodSdk: Send + Sync {
    /// Open a TCP session and return the vendor controller id.
    async fn connect(&self, address: &str, port: u16) -> Result<i32, SdkError>;

    async fn move_absolute(&self, id: i32, axes: &str, values: &[f64]) -> Result<(), SdkError>;

    async fn move_relative(&self, id: i32, axes: &str, values: &[f64]) -> Result<(), SdkError>;

    /// True while any axis is still in motion.
    async fn is_moving(&self, id: i32) -> Result<bool, SdkError>;

    /// Stop all axes immediately.
    async fn halt(&self, id: i32) -> Result<(), SdkError>;

    async fn query_position(&self, id: i32, axes: &str) -> Result<Vec<f64>, SdkError>;

    async fn set_system_velocity(&self, id: i32, velocity: f64) -> Result<(), SdkError>;

    async fn system_velocity(&self, id: i32) -> Result<f64, SdkError>;

    async fn close(&self, id: i32) -> Result<(), SdkError>;
}

/// Opaque session handle issued by a [`GantrySdk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GantryHandle(pub u64);

/// Gantry motion controller binding.  Axes are addressed by index
/// (`0 = X`, `1 = Y`, `2 = Z`).
#[async_trait]
pub trait GantrySdk: Send + Sync {
    async fn open(&self, address: &str, port: u16) -> Result<GantryHandle, SdkError>;

    /// Energise the listed axes.  Required once after `open`.
    async fn enable_axes(&self, handle: GantryHandle, axes: &[usize]) -> Result<(), SdkError>;

    /// Point-to-point move of the listed axes; `relative` selects incremental
    /// targets.
    async fn to_point(
        &self,
        handle: GantryHandle,
        axes: &[usize],
        points: &[f64],
        relative: bool,
    ) -> Result<(), SdkError>;

    async fn axis_moving(&self, handle: GantryHandle, axis: usize) -> Result<bool, SdkError>;

    /// Kill motion on every axis.
    async fn kill_all(&self, handle: GantryHandle) -> Result<(), SdkError>;

    async fn feedback_position(&self, handle: GantryHandle, axis: usize) -> Result<f64, SdkError>;

    async fn set_velocity(&self, handle: GantryHandle, axis: usize, velocity: f64) -> Result<(), SdkError>;

    async fn velocity(&self, handle: GantryHandle, axis: usize) -> Result<f64, SdkError>;

    async fn close(&self, handle: GantryHandle) -> Result<(), SdkError>;
}
