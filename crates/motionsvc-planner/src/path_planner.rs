//! [`PathPlanner`] – graph-routed motion for single devices.
//!
//! Graph resolution for a device, in order:
//!
//! 1. its explicit `graphId`, when that graph exists;
//! 2. `"Gantry"` for gantries, or for hexapods a graph named after the
//!    device's side: a name containing `left`, `right` or `bottom` maps to
//!    `HexapodLeft`, `HexapodRight` or `HexapodBottom`;
//! 3. for hexapods only, the first graph (by id) whose id contains
//!    `hexapod`.
//!
//! The device's "current node" is the taught position it sits at, matched
//! with [`HEXAPOD_NODE_TOLERANCE`] or [`GANTRY_NODE_TOLERANCE`].

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use motionsvc_kernel::MotionKernel;
use motionsvc_kernel::config_loader;
use motionsvc_types::{DeviceClass, DeviceConfig, GraphCollection};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::graph::RoutingGraph;

/// Current-node match tolerance for hexapods.
pub const HEXAPOD_NODE_TOLERANCE: f64 = 0.05;

/// Current-node match tolerance for gantries.
pub const GANTRY_NODE_TOLERANCE: f64 = 0.5;

const SIDE_GRAPHS: [(&str, &str); 3] = [
    ("left", "HexapodLeft"),
    ("right", "HexapodRight"),
    ("bottom", "HexapodBottom"),
];

const GANTRY_GRAPH: &str = "Gantry";

pub struct PathPlanner {
    kernel: Arc<MotionKernel>,
    graphs: RwLock<GraphCollection>,
    source: Option<PathBuf>,
}

impl PathPlanner {
    /// Planner over an in-memory graph collection.
    pub fn new(kernel: Arc<MotionKernel>, graphs: GraphCollection) -> Self {
        Self {
            kernel,
            graphs: RwLock::new(graphs),
            source: None,
        }
    }

    /// Planner over a JSON graph file.  A missing or malformed file yields
    /// no graphs; [`refresh_graphs`](Self::refresh_graphs) re-reads it.
    pub fn from_file(kernel: Arc<MotionKernel>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let graphs = config_loader::load_graphs(&path);
        Self {
            kernel,
            graphs: RwLock::new(graphs),
            source: Some(path),
        }
    }

    /// Discard the loaded graphs and read the source file again on the
    /// blocking pool.  Returns `false` for planners built from an in-memory
    /// collection.
    pub async fn refresh_graphs(&self) -> bool {
        let Some(path) = self.source.clone() else {
            debug!("planner has no graph file; nothing to refresh");
            return false;
        };
        let graphs = match tokio::task::spawn_blocking(move || config_loader::load_graphs(&path)).await {
            Ok(graphs) => graphs,
            Err(e) => {
                warn!(error = %e, "graph reload task failed; keeping current graphs");
                return false;
            }
        };
        info!(count = graphs.len(), "routing graphs refreshed");
        *self.graphs.write().unwrap_or_else(|e| e.into_inner()) = graphs;
        true
    }

    /// Ids of every loaded graph, sorted.
    pub fn available_graphs(&self) -> Vec<String> {
        self.read_graphs().keys().cloned().collect()
    }

    /// Working graph for `graph_id`.
    pub fn graph(&self, graph_id: &str) -> Option<RoutingGraph> {
        self.read_graphs()
            .get(graph_id)
            .map(|definition| RoutingGraph::build(graph_id, definition))
    }

    /// Shortest route between two nodes of a graph.  Empty when the graph
    /// is unknown, either node is absent or the end is unreachable.
    pub fn find_path(&self, graph_id: &str, start: &str, end: &str) -> Vec<String> {
        match self.graph(graph_id) {
            Some(graph) => graph.shortest_path(start, end),
            None => {
                warn!(graph = %graph_id, "unknown graph");
                Vec::new()
            }
        }
    }

    /// Sum of edge weights along `path` in `graph_id`.
    pub fn path_cost(&self, graph_id: &str, path: &[String]) -> Option<f64> {
        self.graph(graph_id)?.path_cost(path)
    }

    /// Graph id used for a device.
    pub async fn graph_id_for_device(&self, device_id: &str) -> Option<String> {
        let device = self.kernel.device(device_id).await?;
        self.resolve_graph_id(&device)
    }

    /// Every node of the device's graph.
    pub async fn available_destinations(&self, device_id: &str) -> Vec<String> {
        match self.device_graph(device_id).await {
            Some(graph) => graph.nodes().to_vec(),
            None => Vec::new(),
        }
    }

    pub async fn find_path_for_device(&self, device_id: &str, start: &str, end: &str) -> Vec<String> {
        match self.device_graph(device_id).await {
            Some(graph) => graph.shortest_path(start, end),
            None => Vec::new(),
        }
    }

    /// The taught position the device sits at, with the class-specific
    /// planner tolerance.
    pub async fn current_node(&self, device_id: &str) -> Option<String> {
        let device = self.kernel.device(device_id).await?;
        let tolerance = match device.device_class {
            DeviceClass::Hexapod => HEXAPOD_NODE_TOLERANCE,
            DeviceClass::Gantry => GANTRY_NODE_TOLERANCE,
        };
        self.kernel
            .current_position_name_within(device_id, tolerance)
            .await
    }

    /// Visit each waypoint of `path` in order, stopping at the first move
    /// that fails.  The device is left wherever it stopped.
    pub async fn move_along_path(&self, device_id: &str, path: &[String]) -> bool {
        self.move_along_path_cancellable(device_id, path, &CancellationToken::new())
            .await
    }

    /// As [`move_along_path`](Self::move_along_path), checking `cancel`
    /// before each waypoint.  A move already issued is allowed to finish;
    /// a device stop that interrupts it ends the traversal.
    pub async fn move_along_path_cancellable(
        &self,
        device_id: &str,
        path: &[String],
        cancel: &CancellationToken,
    ) -> bool {
        if path.is_empty() {
            warn!(device = %device_id, "empty path");
            return false;
        }
        let span = info_span!("path_traversal", device = %device_id, waypoints = path.len());
        async {
            for (step, waypoint) in path.iter().enumerate() {
                if cancel.is_cancelled() {
                    info!(step, waypoint = %waypoint, "traversal cancelled");
                    return false;
                }
                debug!(step, waypoint = %waypoint, "moving to waypoint");
                if !self.kernel.move_to_named_position(device_id, waypoint).await {
                    warn!(step, waypoint = %waypoint, "waypoint move failed; traversal stopped");
                    return false;
                }
            }
            info!("traversal complete");
            true
        }
        .instrument(span)
        .await
    }

    /// Route the device from wherever it is to `destination` along its
    /// graph.
    pub async fn move_to_destination_via_path(&self, device_id: &str, destination: &str) -> bool {
        let route = self.route_to_destination(device_id, destination).await;
        match route.len() {
            0 => false,
            1 => {
                info!(device = %device_id, destination, "already at destination");
                true
            }
            _ => {
                info!(device = %device_id, route = ?route, "routing to destination");
                self.move_along_path(device_id, &route[1..]).await
            }
        }
    }

    /// Shortest route from the device's current node to `destination`,
    /// starting with the current node.  A device already at the destination
    /// gets a single-node route; an unknown start or unreachable
    /// destination gets an empty one.
    pub async fn route_to_destination(&self, device_id: &str, destination: &str) -> Vec<String> {
        let Some(graph) = self.device_graph(device_id).await else {
            return Vec::new();
        };
        if !graph.contains(destination) {
            warn!(device = %device_id, graph = %graph.id(), destination, "destination not in graph");
            return Vec::new();
        }
        let Some(current) = self.current_node(device_id).await else {
            warn!(device = %device_id, destination, "current position unknown; refusing to route");
            return Vec::new();
        };
        let route = graph.shortest_path(&current, destination);
        if route.is_empty() {
            warn!(device = %device_id, from = %current, destination, "no route to destination");
        }
        route
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn read_graphs(&self) -> std::sync::RwLockReadGuard<'_, GraphCollection> {
        self.graphs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn resolve_graph_id(&self, device: &DeviceConfig) -> Option<String> {
        let graphs = self.read_graphs();

        if let Some(explicit) = &device.graph_id {
            if graphs.contains_key(explicit) {
                return Some(explicit.clone());
            }
            warn!(device = %device.id, graph = %explicit, "configured graph not loaded; falling back");
        }

        match device.device_class {
            DeviceClass::Gantry => graphs.contains_key(GANTRY_GRAPH).then(|| GANTRY_GRAPH.to_string()),
            DeviceClass::Hexapod => {
                let name = device.name.to_lowercase();
                SIDE_GRAPHS
                    .iter()
                    .find(|(side, graph)| name.contains(side) && graphs.contains_key(*graph))
                    .map(|(_, graph)| graph.to_string())
                    .or_else(|| {
                        graphs
                            .keys()
                            .find(|id| id.to_lowercase().contains("hexapod"))
                            .cloned()
                    })
            }
        }
    }

    async fn device_graph(&self, device_id: &str) -> Option<RoutingGraph> {
        let Some(device) = self.kernel.device(device_id).await else {
            warn!(device = %device_id, "unknown device");
            return None;
        };
        let Some(graph_id) = self.resolve_graph_id(&device) else {
            warn!(device = %device_id, name = %device.name, "no routing graph for device");
            return None;
        };
        self.graph(&graph_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motionsvc_hal::SimBackend;
    use motionsvc_kernel::MemoryPositionStore;
    use motionsvc_types::{EdgeDefinition, GraphDefinition, Position};
    use std::time::Duration;

    fn left() -> DeviceConfig {
        DeviceConfig::new("hex-l", "Hexapod Left", DeviceClass::Hexapod)
            .with_endpoint("10.0.0.10", 50000)
            .with_position("Home", Position::ZERO)
            .with_position("A", Position::linear(1.0, 0.0, 0.0))
            .with_position("B", Position::linear(2.0, 0.0, 0.0))
    }

    fn gantry() -> DeviceConfig {
        DeviceConfig::new("gantry", "Main Gantry", DeviceClass::Gantry)
            .with_endpoint("10.0.0.20", 701)
            .with_position("Park", Position::ZERO)
            .with_position("Load", Position::linear(100.0, 0.0, 0.0))
    }

    fn graphs() -> GraphCollection {
        let mut graphs = GraphCollection::new();
        graphs.insert(
            "HexapodLeft".into(),
            GraphDefinition {
                nodes: vec!["Home".into(), "A".into(), "B".into()],
                edges: vec![
                    EdgeDefinition::new("Home", "A", 1.0),
                    EdgeDefinition::new("A", "B", 1.0),
                    EdgeDefinition::new("Home", "B", 5.0),
                ],
            },
        );
        graphs.insert(
            "Gantry".into(),
            GraphDefinition {
                nodes: vec!["Park".into(), "Load".into()],
                edges: vec![EdgeDefinition::new("Park", "Load", 1.0)],
            },
        );
        graphs
    }

    async fn planner(backend: &SimBackend, devices: Vec<DeviceConfig>) -> PathPlanner {
        let factory = backend.factory().with_poll_interval(Duration::from_millis(1));
        let kernel = Arc::new(MotionKernel::new(
            devices,
            Arc::new(factory),
            Arc::new(MemoryPositionStore::new()),
        ));
        kernel.initialize_all().await;
        PathPlanner::new(kernel, graphs())
    }

    #[tokio::test]
    async fn routes_through_cheapest_waypoints() {
        let backend = SimBackend::new();
        let p = planner(&backend, vec![left(), gantry()]).await;

        assert_eq!(p.find_path("HexapodLeft", "Home", "B"), vec!["Home", "A", "B"]);
        assert!(p.move_to_destination_via_path("hex-l", "B").await);
        assert_eq!(backend.position_of(&left()), Some(Position::linear(2.0, 0.0, 0.0)));
        assert_eq!(backend.moves_issued(&left()), 2);
        assert_eq!(p.current_node("hex-l").await.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn already_at_destination_issues_no_motion() {
        let backend = SimBackend::new();
        let p = planner(&backend, vec![left()]).await;
        assert_eq!(p.route_to_destination("hex-l", "home").await, vec!["Home"]);
        assert!(p.move_to_destination_via_path("hex-l", "home").await);
        assert_eq!(backend.moves_issued(&left()), 0);
    }

    #[tokio::test]
    async fn unknown_start_refuses_to_route() {
        let backend = SimBackend::new();
        backend.place_device(&left(), Position::linear(0.5, 0.0, 0.0));
        let p = planner(&backend, vec![left()]).await;

        assert_eq!(p.current_node("hex-l").await, None);
        assert!(!p.move_to_destination_via_path("hex-l", "B").await);
        assert_eq!(backend.moves_issued(&left()), 0);
    }

    #[tokio::test]
    async fn gantry_uses_looser_tolerance() {
        let backend = SimBackend::new();
        backend.place_device(&gantry(), Position::linear(0.3, 0.0, 0.0));
        let p = planner(&backend, vec![gantry()]).await;
        assert_eq!(p.current_node("gantry").await.as_deref(), Some("Park"));
        assert!(p.move_to_destination_via_path("gantry", "Load").await);
    }

    #[tokio::test]
    async fn failed_waypoint_stops_traversal() {
        let backend = SimBackend::new();
        backend.fail_device_moves_to(&left(), Position::linear(1.0, 0.0, 0.0));
        let p = planner(&backend, vec![left()]).await;

        assert!(!p.move_to_destination_via_path("hex-l", "B").await);
        assert_eq!(backend.moves_issued(&left()), 0);
        assert_eq!(backend.position_of(&left()), Some(Position::ZERO));
    }

    #[tokio::test]
    async fn device_stop_mid_waypoint_ends_traversal() {
        let backend = SimBackend::new();
        backend.set_motion_polls(200);
        let factory = backend.factory().with_poll_interval(Duration::from_millis(5));
        let kernel = Arc::new(MotionKernel::new(
            vec![left()],
            Arc::new(factory),
            Arc::new(MemoryPositionStore::new()),
        ));
        kernel.initialize_all().await;
        let p = Arc::new(PathPlanner::new(kernel.clone(), graphs()));

        let traversal = {
            let p = p.clone();
            tokio::spawn(async move {
                let path = vec!["A".to_string(), "B".to_string()];
                p.move_along_path("hex-l", &path).await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(kernel.stop("hex-l").await);

        assert!(!traversal.await.unwrap());
        assert_eq!(backend.moves_issued(&left()), 1);
        assert_eq!(backend.position_of(&left()), Some(Position::ZERO));
    }

    #[tokio::test]
    async fn cancelled_token_prevents_further_waypoints() {
        let backend = SimBackend::new();
        let p = planner(&backend, vec![left()]).await;
        let token = CancellationToken::new();
        token.cancel();
        let path = vec!["A".to_string(), "B".to_string()];
        assert!(!p.move_along_path_cancellable("hex-l", &path, &token).await);
        assert_eq!(backend.moves_issued(&left()), 0);
        assert!(!p.move_along_path("hex-l", &[]).await);
    }

    #[tokio::test]
    async fn graph_resolution_order() {
        let backend = SimBackend::new();
        let right = DeviceConfig::new("hex-r", "Hexapod RIGHT", DeviceClass::Hexapod);
        let explicit = DeviceConfig::new("hex-x", "Probe", DeviceClass::Hexapod).with_graph("Gantry");
        let stale = DeviceConfig::new("hex-s", "Spare", DeviceClass::Hexapod).with_graph("Missing");
        let lone_gantry = DeviceConfig::new("g2", "Left Gantry", DeviceClass::Gantry).with_graph("Missing");
        let p = planner(&backend, vec![left(), right, explicit, stale, lone_gantry]).await;

        assert_eq!(p.graph_id_for_device("hex-l").await.as_deref(), Some("HexapodLeft"));
        // no HexapodRight graph loaded: falls back to the first hexapod graph
        assert_eq!(p.graph_id_for_device("hex-r").await.as_deref(), Some("HexapodLeft"));
        assert_eq!(p.graph_id_for_device("hex-x").await.as_deref(), Some("Gantry"));
        assert_eq!(p.graph_id_for_device("hex-s").await.as_deref(), Some("HexapodLeft"));
        assert_eq!(p.graph_id_for_device("g2").await.as_deref(), Some("Gantry"));
        assert_eq!(p.graph_id_for_device("nope").await, None);
    }

    #[tokio::test]
    async fn destinations_and_missing_graph() {
        let backend = SimBackend::new();
        let factory = backend.factory().with_poll_interval(Duration::from_millis(1));
        let kernel = Arc::new(MotionKernel::new(
            vec![left()],
            Arc::new(factory),
            Arc::new(MemoryPositionStore::new()),
        ));
        kernel.initialize_all().await;

        let p = PathPlanner::new(kernel.clone(), graphs());
        assert_eq!(p.available_destinations("hex-l").await, vec!["Home", "A", "B"]);
        assert_eq!(p.available_graphs(), vec!["Gantry", "HexapodLeft"]);
        assert!(!p.refresh_graphs().await);

        let empty = PathPlanner::new(kernel, GraphCollection::new());
        assert!(empty.available_destinations("hex-l").await.is_empty());
        assert!(empty.find_path_for_device("hex-l", "Home", "B").await.is_empty());
        assert!(!empty.move_to_destination_via_path("hex-l", "B").await);
    }

    #[tokio::test]
    async fn refresh_rereads_graph_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graphs.json");
        std::fs::write(&path, r#"{"Gantry": {"nodes": ["Park"], "edges": []}}"#).unwrap();

        let backend = SimBackend::new();
        let factory = backend.factory();
        let kernel = Arc::new(MotionKernel::new(
            vec![gantry()],
            Arc::new(factory),
            Arc::new(MemoryPositionStore::new()),
        ));
        let p = PathPlanner::from_file(kernel, &path);
        assert_eq!(p.available_destinations("gantry").await, vec!["Park"]);

        std::fs::write(
            &path,
            r#"{"Gantry": {"nodes": ["Park", "Load"], "edges": [{"from": "Park", "to": "Load", "weight": 3}]}}"#,
        )
        .unwrap();
        assert!(p.refresh_graphs().await);
        assert_eq!(p.find_path_for_device("gantry", "park", "load").await, vec!["Park", "Load"]);
        assert_eq!(
            p.path_cost("Gantry", &["Park".to_string(), "Load".to_string()]),
            Some(3.0)
        );
    }
}
