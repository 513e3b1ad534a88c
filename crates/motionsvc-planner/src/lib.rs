//! `motionsvc-planner` – Path Planner
//!
//! Moves a device between taught positions along the edges of a routing
//! graph instead of in a straight line.
//!
//! # Modules
//!
//! - [`graph`] – [`RoutingGraph`]: case-insensitive adjacency built from a
//!   [`GraphDefinition`][motionsvc_types::GraphDefinition], with Dijkstra
//!   shortest paths and path costing.
//! - [`path_planner`] – [`PathPlanner`]: resolves which graph a device
//!   uses, works out where the device currently is, and drives the
//!   [`MotionKernel`][motionsvc_kernel::MotionKernel] waypoint by waypoint.

pub mod graph;
pub mod path_planner;

pub use graph::RoutingGraph;
pub use path_planner::{GANTRY_NODE_TOLERANCE, HEXAPOD_NODE_TOLERANCE, PathPlanner};
