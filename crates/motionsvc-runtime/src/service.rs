//! [`MotionService`] – one kernel, one planner, one coordinator.
//!
//! The service is the only place the three are wired together.  Callers
//! that need more than the forwarding methods can reach each component
//! through [`kernel`](MotionService::kernel),
//! [`planner`](MotionService::planner) and
//! [`coordinator`](MotionService::coordinator).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use motionsvc_kernel::MotionKernel;
use motionsvc_planner::PathPlanner;
use motionsvc_types::{DeviceConfig, GraphCollection, Position};
use tokio::sync::{Mutex, mpsc};
use tracing::info;

use crate::coordinator::{DeviceResults, MultiDeviceCoordinator};
use crate::monitor::{PositionMonitor, PositionUpdate};
use crate::operation::CoordinatedOperation;

pub struct MotionService {
    kernel: Arc<MotionKernel>,
    planner: Arc<PathPlanner>,
    coordinator: MultiDeviceCoordinator,
    monitor: Mutex<Option<PositionMonitor>>,
}

impl MotionService {
    /// Compose a service over an in-memory graph collection.
    pub fn new(kernel: MotionKernel, graphs: GraphCollection) -> Self {
        let kernel = Arc::new(kernel);
        let planner = PathPlanner::new(kernel.clone(), graphs);
        Self::compose(kernel, planner)
    }

    /// Compose a service whose planner reads (and refreshes from) a JSON
    /// graph file.
    pub fn with_graph_file(kernel: MotionKernel, graphs_path: impl Into<PathBuf>) -> Self {
        let kernel = Arc::new(kernel);
        let planner = PathPlanner::from_file(kernel.clone(), graphs_path);
        Self::compose(kernel, planner)
    }

    fn compose(kernel: Arc<MotionKernel>, planner: PathPlanner) -> Self {
        let planner = Arc::new(planner);
        let coordinator = MultiDeviceCoordinator::new(planner.clone());
        Self {
            kernel,
            planner,
            coordinator,
            monitor: Mutex::new(None),
        }
    }

    pub fn kernel(&self) -> &Arc<MotionKernel> {
        &self.kernel
    }

    pub fn planner(&self) -> &Arc<PathPlanner> {
        &self.planner
    }

    pub fn coordinator(&self) -> &MultiDeviceCoordinator {
        &self.coordinator
    }

    // ── Single device ────────────────────────────────────────────────────

    pub async fn initialize_all(&self) -> usize {
        self.kernel.initialize_all().await
    }

    pub async fn devices(&self) -> Vec<DeviceConfig> {
        self.kernel.devices().await
    }

    pub async fn is_connected(&self, device_id: &str) -> bool {
        self.kernel.is_connected(device_id).await
    }

    pub async fn move_to_named_position(&self, device_id: &str, position_name: &str) -> bool {
        self.kernel.move_to_named_position(device_id, position_name).await
    }

    pub async fn move_relative(&self, device_id: &str, delta: &[f64]) -> bool {
        self.kernel.move_relative(device_id, delta).await
    }

    pub async fn stop(&self, device_id: &str) -> bool {
        self.kernel.stop(device_id).await
    }

    pub async fn stop_all(&self) -> bool {
        self.kernel.stop_all().await
    }

    pub async fn home(&self, device_id: &str) -> bool {
        self.kernel.home(device_id).await
    }

    pub async fn current_position(&self, device_id: &str) -> Option<Position> {
        self.kernel.current_position(device_id).await
    }

    pub async fn current_position_name(&self, device_id: &str) -> Option<String> {
        self.kernel.current_position_name(device_id).await
    }

    pub async fn speed(&self, device_id: &str) -> Option<f64> {
        self.kernel.speed(device_id).await
    }

    pub async fn set_speed(&self, device_id: &str, speed: f64) -> bool {
        self.kernel.set_speed(device_id, speed).await
    }

    pub async fn teach_position(&self, device_id: &str, name: &str, position: Position) -> bool {
        self.kernel.teach_position(device_id, name, position).await
    }

    pub async fn teach_current_position(&self, device_id: &str, name: &str) -> bool {
        self.kernel.teach_current_position(device_id, name).await
    }

    pub async fn save_positions(&self) -> bool {
        self.kernel.save_positions().await
    }

    pub async fn reload_positions(&self) -> bool {
        self.kernel.reload_positions().await
    }

    // ── Path planning ────────────────────────────────────────────────────

    pub fn available_graphs(&self) -> Vec<String> {
        self.planner.available_graphs()
    }

    pub async fn available_destinations(&self, device_id: &str) -> Vec<String> {
        self.planner.available_destinations(device_id).await
    }

    pub fn find_path(&self, graph_id: &str, start: &str, end: &str) -> Vec<String> {
        self.planner.find_path(graph_id, start, end)
    }

    pub async fn move_along_path(&self, device_id: &str, path: &[String]) -> bool {
        self.planner.move_along_path(device_id, path).await
    }

    pub async fn move_to_destination_via_path(&self, device_id: &str, destination: &str) -> bool {
        self.planner
            .move_to_destination_via_path(device_id, destination)
            .await
    }

    // ── Coordination ─────────────────────────────────────────────────────

    pub async fn execute_parallel_paths(&self, paths: HashMap<String, Vec<String>>) -> DeviceResults {
        self.coordinator.execute_parallel_paths(paths).await
    }

    pub async fn execute_sequential_paths(&self, paths: Vec<(String, Vec<String>)>) -> DeviceResults {
        self.coordinator.execute_sequential_paths(paths).await
    }

    pub async fn execute_coordinated_operation(&self, operation: CoordinatedOperation) -> bool {
        self.coordinator.execute_coordinated_operation(operation).await
    }

    /// Route several devices to graph destinations at once.  Devices whose
    /// route cannot be planned are `false` without moving; devices already
    /// there only re-confirm their position.
    pub async fn move_to_destinations_in_parallel(&self, targets: &[(String, String)]) -> DeviceResults {
        let mut results = DeviceResults::new();
        let mut paths = HashMap::new();
        for (device_id, destination) in targets {
            let route = self.planner.route_to_destination(device_id, destination).await;
            if route.is_empty() {
                results.insert(device_id.clone(), false);
            } else {
                let waypoints = if route.len() > 1 { route[1..].to_vec() } else { route };
                paths.insert(device_id.clone(), waypoints);
            }
        }
        results.extend(self.coordinator.execute_parallel_paths(paths).await);
        results
    }

    pub fn cancel_operation(&self) -> bool {
        self.coordinator.cancel_operation()
    }

    // ── Monitoring & lifecycle ───────────────────────────────────────────

    /// Start sampling connected devices every `interval`, replacing any
    /// monitor already running.
    pub async fn start_position_monitor(&self, interval: Duration) -> mpsc::Receiver<PositionUpdate> {
        let mut slot = self.monitor.lock().await;
        if let Some(previous) = slot.take() {
            previous.stop().await;
        }
        let (monitor, rx) = PositionMonitor::start(self.kernel.clone(), interval);
        *slot = Some(monitor);
        rx
    }

    /// Stop the running monitor.  Returns `false` if none was running.
    pub async fn stop_position_monitor(&self) -> bool {
        match self.monitor.lock().await.take() {
            Some(monitor) => {
                monitor.stop().await;
                true
            }
            None => false,
        }
    }

    /// Stop monitoring, cancel any coordinated run and disconnect every
    /// device.
    pub async fn shutdown(&self) {
        self.stop_position_monitor().await;
        self.coordinator.cancel_operation();
        self.kernel.shutdown().await;
        info!("motion service shut down");
    }
}
