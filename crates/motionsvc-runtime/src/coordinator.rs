//! [`MultiDeviceCoordinator`] – runs per-device paths across many devices.
//!
//! Every top-level call (parallel run, sequential run, coordinated
//! operation) gets a fresh [`CancellationToken`] and a run id.
//! [`cancel_operation`](MultiDeviceCoordinator::cancel_operation) trips the
//! token of the most recent call.  Cancellation is cooperative: it is
//! checked between waypoints and between devices, and a move already sent
//! to the hardware runs to completion.
//!
//! Outcome rules:
//!
//! - **Parallel**: every device gets a definite result.  On cancellation,
//!   devices that have not reported yet are `false`.  If a device task
//!   dies unexpectedly, every device is `false`.
//! - **Sequential**: stops at the first failing device.  Devices after it
//!   are absent from the result map.
//! - **Coordinated**: a step succeeds iff all of its devices succeed.  A
//!   failed step calls the operation's failure hook and ends the run; a
//!   successful step calls its completion hook, and a failing hook also
//!   ends the run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use motionsvc_planner::PathPlanner;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::operation::{CoordinatedOperation, ExecutionMode, HookError};

/// Device id → whether its path completed.
pub type DeviceResults = HashMap<String, bool>;

pub struct MultiDeviceCoordinator {
    planner: Arc<PathPlanner>,
    current: Mutex<Option<CancellationToken>>,
    active_runs: Arc<AtomicUsize>,
}

/// Marks a top-level run as in flight until dropped.
struct RunGuard(Arc<AtomicUsize>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MultiDeviceCoordinator {
    pub fn new(planner: Arc<PathPlanner>) -> Self {
        Self {
            planner,
            current: Mutex::new(None),
            active_runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Signal the most recently started run to stop.  Returns `false` when
    /// no run has been started yet.
    pub fn cancel_operation(&self) -> bool {
        match self.lock_current().as_ref() {
            Some(token) => {
                info!("cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a top-level run is in flight.
    pub fn is_running(&self) -> bool {
        self.active_runs.load(Ordering::SeqCst) > 0
    }

    /// Drive every device along its path at the same time.
    pub async fn execute_parallel_paths(&self, paths: HashMap<String, Vec<String>>) -> DeviceResults {
        let (token, _guard) = self.begin_run();
        let mut paths: Vec<(String, Vec<String>)> = paths.into_iter().collect();
        paths.sort_by(|a, b| a.0.cmp(&b.0));
        let span = info_span!("parallel_run", run = %Uuid::new_v4(), devices = paths.len());
        self.run_parallel(&paths, &token).instrument(span).await
    }

    /// Drive devices one after another in the given order, stopping at the
    /// first failure.
    pub async fn execute_sequential_paths(&self, paths: Vec<(String, Vec<String>)>) -> DeviceResults {
        let (token, _guard) = self.begin_run();
        let span = info_span!("sequential_run", run = %Uuid::new_v4(), devices = paths.len());
        self.run_sequential(&paths, &token).instrument(span).await
    }

    /// Run each step of `operation` in order.  Returns `true` only if every
    /// step and every completion hook succeeded.
    pub async fn execute_coordinated_operation(&self, operation: CoordinatedOperation) -> bool {
        let (token, _guard) = self.begin_run();
        let span = info_span!(
            "coordinated_operation",
            run = %Uuid::new_v4(),
            operation = %operation.name,
            steps = operation.steps().len()
        );
        self.run_operation(&operation, &token).instrument(span).await
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin_run(&self) -> (CancellationToken, RunGuard) {
        let token = CancellationToken::new();
        *self.lock_current() = Some(token.clone());
        self.active_runs.fetch_add(1, Ordering::SeqCst);
        (token, RunGuard(self.active_runs.clone()))
    }

    async fn run_operation(&self, operation: &CoordinatedOperation, token: &CancellationToken) -> bool {
        info!("operation started");
        for (index, step) in operation.steps().iter().enumerate() {
            if token.is_cancelled() {
                info!(step = index, "operation cancelled before step");
                return false;
            }
            info!(
                step = index,
                description = %step.description,
                mode = %step.mode,
                devices = step.paths.len(),
                "step started"
            );
            let results = match step.mode {
                ExecutionMode::Parallel => self.run_parallel(&step.paths, token).await,
                ExecutionMode::Sequential => self.run_sequential(&step.paths, token).await,
            };
            let succeeded = step
                .device_ids()
                .all(|id| results.get(id).copied().unwrap_or(false));

            if token.is_cancelled() {
                info!(step = index, "operation cancelled during step");
                return false;
            }
            if !succeeded {
                warn!(step = index, description = %step.description, ?results, "step failed; aborting operation");
                if let Some(hook) = &operation.on_failure
                    && let Err(e) = hook(index, step).await
                {
                    warn!(step = index, error = %e, "failure hook returned an error");
                }
                return false;
            }
            info!(step = index, "step succeeded");

            if let Some(hook) = &step.on_complete {
                match hook().await {
                    Ok(()) => debug!(step = index, "completion hook finished"),
                    Err(HookError::Cancelled) => {
                        info!(step = index, "completion hook cancelled the operation");
                        return false;
                    }
                    Err(e) => {
                        warn!(step = index, error = %e, "completion hook failed; aborting operation");
                        return false;
                    }
                }
            }
        }
        info!("operation completed");
        true
    }

    async fn run_parallel(&self, paths: &[(String, Vec<String>)], token: &CancellationToken) -> DeviceResults {
        let recorded: Arc<Mutex<DeviceResults>> = Arc::default();
        let mut tasks = JoinSet::new();
        for (device_id, path) in paths {
            let planner = self.planner.clone();
            let recorded = recorded.clone();
            let token = token.clone();
            let device_id = device_id.clone();
            let path = path.clone();
            tasks.spawn(async move {
                let ok = planner
                    .move_along_path_cancellable(&device_id, &path, &token)
                    .await;
                debug!(device = %device_id, ok, "device path finished");
                recorded
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(device_id, ok);
            }
            .in_current_span());
        }

        let finished = tokio::select! {
            biased;
            clean = join_all(&mut tasks) => Some(clean),
            () = token.cancelled() => None,
        };

        let mut results = recorded.lock().unwrap_or_else(|e| e.into_inner()).clone();
        match finished {
            Some(true) => {}
            Some(false) => {
                error!("device task failed unexpectedly; marking every device failed");
                for (device_id, _) in paths {
                    results.insert(device_id.clone(), false);
                }
            }
            None => {
                // Running moves finish on their own; their tasks stop at the
                // next waypoint check.
                tasks.detach_all();
                for (device_id, _) in paths {
                    results.entry(device_id.clone()).or_insert(false);
                }
                info!(?results, "parallel run cancelled");
            }
        }
        results
    }

    async fn run_sequential(&self, paths: &[(String, Vec<String>)], token: &CancellationToken) -> DeviceResults {
        let mut results = DeviceResults::new();
        for (device_id, path) in paths {
            if token.is_cancelled() {
                info!(device = %device_id, "sequential run cancelled");
                break;
            }
            let ok = self
                .planner
                .move_along_path_cancellable(device_id, path, token)
                .await;
            results.insert(device_id.clone(), ok);
            if !ok {
                warn!(device = %device_id, "device path failed; remaining devices skipped");
                break;
            }
        }
        results
    }
}

/// Await every task.  `false` if any of them panicked or was aborted.
async fn join_all(tasks: &mut JoinSet<()>) -> bool {
    let mut clean = true;
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "device task did not complete");
            clean = false;
        }
    }
    clean
}
