//! [`PositionMonitor`] – periodic position sampling.
//!
//! The monitor is an explicit task with one owner: whoever called
//! [`PositionMonitor::start`] holds the handle and must call
//! [`PositionMonitor::stop`].  Each tick samples every connected device and
//! pushes a [`PositionUpdate`] into a bounded channel.  A full channel drops
//! the update; a closed channel ends the task.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use motionsvc_kernel::{KERNEL_MATCH_TOLERANCE, MotionKernel, match_position};
use motionsvc_types::Position;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the update channel.
pub const MONITOR_CHANNEL_CAPACITY: usize = 64;

/// Shortest accepted sampling interval.
pub const MIN_MONITOR_INTERVAL: Duration = Duration::from_millis(10);

/// One sampled device position.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionUpdate {
    pub device_id: String,
    pub position: Position,
    /// Taught position the device is at, within the kernel tolerance.
    pub position_name: Option<String>,
    pub sampled_at: DateTime<Utc>,
}

pub struct PositionMonitor {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PositionMonitor {
    /// Spawn the sampling task.  Must be called from within a Tokio
    /// runtime.
    pub fn start(kernel: Arc<MotionKernel>, interval: Duration) -> (Self, mpsc::Receiver<PositionUpdate>) {
        let interval = interval.max(MIN_MONITOR_INTERVAL);
        let (tx, rx) = mpsc::channel(MONITOR_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(sample_loop(kernel, interval, tx, cancel.clone()));
        info!(interval_ms = interval.as_millis() as u64, "position monitor started");
        (Self { cancel, task }, rx)
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop sampling and wait for the task to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "position monitor task ended abnormally");
        }
        info!("position monitor stopped");
    }
}

async fn sample_loop(
    kernel: Arc<MotionKernel>,
    interval: Duration,
    tx: mpsc::Sender<PositionUpdate>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        for device_id in kernel.connected_device_ids().await {
            if cancel.is_cancelled() {
                return;
            }
            let Some(position) = kernel.current_position(&device_id).await else {
                continue;
            };
            let position_name = kernel.device(&device_id).await.and_then(|device| {
                match_position(
                    device.device_class,
                    &position,
                    &device.positions,
                    KERNEL_MATCH_TOLERANCE,
                )
            });
            let update = PositionUpdate {
                device_id,
                position,
                position_name,
                sampled_at: Utc::now(),
            };
            match tx.try_send(update) {
                Ok(()) => {}
                Err(TrySendError::Full(update)) => {
                    debug!(device = %update.device_id, "monitor channel full; update dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("monitor receiver dropped; stopping");
                    return;
                }
            }
        }
    }
}
