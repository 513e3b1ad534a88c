//! Coordinated multi-step operations.
//!
//! A [`CoordinatedOperation`] is built by the caller, handed to
//! [`MultiDeviceCoordinator::execute_coordinated_operation`][crate::MultiDeviceCoordinator::execute_coordinated_operation]
//! and consumed by it.
//!
//! # Example
//!
//! ```rust
//! use motionsvc_runtime::{CoordinatedOperation, CoordinationStep};
//!
//! let operation = CoordinatedOperation::new("load lens")
//!     .with_step(
//!         CoordinationStep::parallel("approach")
//!             .with_path("hex-l", ["Home", "Approach"])
//!             .with_path("hex-r", ["Home", "Approach"]),
//!     )
//!     .with_step(
//!         CoordinationStep::sequential("grip")
//!             .with_path("hex-l", ["LensGrip"])
//!             .on_complete(|| async { Ok(()) }),
//!     )
//!     .on_failure(|index, step| {
//!         let description = step.description.clone();
//!         async move {
//!             eprintln!("step {index} ({description}) failed");
//!             Ok(())
//!         }
//!     });
//!
//! assert_eq!(operation.steps().len(), 2);
//! ```

use std::fmt;
use std::future::Future;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use thiserror::Error;

/// Why a hook stopped an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    /// The hook asked for the operation to stop.
    #[error("cancelled by hook")]
    Cancelled,

    #[error("hook failed: {0}")]
    Failed(String),
}

pub type HookFuture = BoxFuture<'static, Result<(), HookError>>;

/// Runs after a step in which every device succeeded.
pub type CompletionHook = Box<dyn Fn() -> HookFuture + Send + Sync>;

/// Runs once with the index and definition of the step that failed.
pub type FailureHook = Box<dyn Fn(usize, &CoordinationStep) -> HookFuture + Send + Sync>;

/// How the devices within one step are driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// All device paths at once.
    Parallel,
    /// One device after another, in insertion order, stopping at the first
    /// failure.
    Sequential,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Parallel => write!(f, "parallel"),
            ExecutionMode::Sequential => write!(f, "sequential"),
        }
    }
}

/// One step: a set of per-device paths run under one [`ExecutionMode`].
pub struct CoordinationStep {
    pub description: String,
    pub mode: ExecutionMode,
    /// Device id → waypoint names, in insertion order.  Device ids are
    /// unique.
    pub paths: Vec<(String, Vec<String>)>,
    pub(crate) on_complete: Option<CompletionHook>,
}

impl CoordinationStep {
    pub fn new(description: impl Into<String>, mode: ExecutionMode) -> Self {
        Self {
            description: description.into(),
            mode,
            paths: Vec::new(),
            on_complete: None,
        }
    }

    pub fn parallel(description: impl Into<String>) -> Self {
        Self::new(description, ExecutionMode::Parallel)
    }

    pub fn sequential(description: impl Into<String>) -> Self {
        Self::new(description, ExecutionMode::Sequential)
    }

    /// Set the path for a device.  Setting it again replaces the earlier
    /// path but keeps the device's original place in the order.
    pub fn with_path<I, S>(mut self, device_id: impl Into<String>, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let device_id = device_id.into();
        let path: Vec<String> = path.into_iter().map(Into::into).collect();
        match self.paths.iter_mut().find(|(id, _)| *id == device_id) {
            Some((_, existing)) => *existing = path,
            None => self.paths.push((device_id, path)),
        }
        self
    }

    /// Hook awaited after the step succeeds and before the next step
    /// starts.  An `Err` aborts the operation.
    pub fn on_complete<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        let hook: CompletionHook = Box::new(move || hook().boxed());
        self.on_complete = Some(hook);
        self
    }

    pub fn has_completion_hook(&self) -> bool {
        self.on_complete.is_some()
    }

    pub fn device_ids(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(|(id, _)| id.as_str())
    }
}

impl fmt::Debug for CoordinationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinationStep")
            .field("description", &self.description)
            .field("mode", &self.mode)
            .field("paths", &self.paths)
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// An ordered list of steps with an optional operation-wide failure hook.
pub struct CoordinatedOperation {
    pub name: String,
    steps: Vec<CoordinationStep>,
    pub(crate) on_failure: Option<FailureHook>,
}

impl CoordinatedOperation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            on_failure: None,
        }
    }

    pub fn with_step(mut self, step: CoordinationStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Hook awaited with the failing step's index and definition.  Not
    /// invoked for cancellation or for a failing completion hook.
    pub fn on_failure<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(usize, &CoordinationStep) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        let hook: FailureHook =
            Box::new(move |index: usize, step: &CoordinationStep| hook(index, step).boxed());
        self.on_failure = Some(hook);
        self
    }

    pub fn steps(&self) -> &[CoordinationStep] {
        &self.steps
    }
}

impl fmt::Debug for CoordinatedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinatedOperation")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}
