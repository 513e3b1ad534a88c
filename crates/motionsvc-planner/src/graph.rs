//! [`RoutingGraph`] – working adjacency structure for one routing graph.
//!
//! Node names compare case-insensitively; the first spelling seen (declared
//! nodes first, then edge endpoints) is the one reported back in paths.
//! Nodes that only appear as edge endpoints are synthesised with a warning.
//! Edges run both ways unless marked `oneWay`.
//!
//! ```rust
//! use motionsvc_planner::RoutingGraph;
//! use motionsvc_types::{EdgeDefinition, GraphDefinition};
//!
//! let definition = GraphDefinition {
//!     nodes: vec!["Home".into(), "A".into(), "B".into()],
//!     edges: vec![
//!         EdgeDefinition::new("Home", "A", 1.0),
//!         EdgeDefinition::new("A", "B", 1.0),
//!         EdgeDefinition::new("Home", "B", 5.0),
//!     ],
//! };
//! let graph = RoutingGraph::build("HexapodLeft", &definition);
//! assert_eq!(graph.shortest_path("home", "b"), vec!["Home", "A", "B"]);
//! ```

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use motionsvc_types::GraphDefinition;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RoutingGraph {
    id: String,
    names: Vec<String>,
    index: HashMap<String, usize>,
    adjacency: Vec<Vec<(usize, f64)>>,
}

impl RoutingGraph {
    /// Build the working graph for `definition`.
    pub fn build(id: &str, definition: &GraphDefinition) -> Self {
        let mut graph = Self {
            id: id.to_string(),
            names: Vec::new(),
            index: HashMap::new(),
            adjacency: Vec::new(),
        };

        for node in &definition.nodes {
            if graph.intern(node).is_none() {
                debug!(graph = %id, node = %node, "node declared twice");
            }
        }

        for edge in &definition.edges {
            if !edge.weight.is_finite() || edge.weight < 0.0 {
                warn!(graph = %id, from = %edge.from, to = %edge.to, weight = edge.weight, "skipping edge with invalid weight");
                continue;
            }
            let from = graph.node_or_synthesise(&edge.from);
            let to = graph.node_or_synthesise(&edge.to);
            graph.adjacency[from].push((to, edge.weight));
            if !edge.one_way {
                graph.adjacency[to].push((from, edge.weight));
            }
        }
        graph
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Every node, declared ones first, in insertion order.
    pub fn nodes(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, node: &str) -> bool {
        self.index.contains_key(&key(node))
    }

    /// The graph's own spelling of `node`.
    pub fn canonical_name(&self, node: &str) -> Option<&str> {
        self.index.get(&key(node)).map(|&i| self.names[i].as_str())
    }

    /// Nodes reachable from `node` in one hop, with edge weights.
    pub fn neighbours(&self, node: &str) -> Vec<(&str, f64)> {
        match self.index.get(&key(node)) {
            Some(&i) => self.adjacency[i]
                .iter()
                .map(|&(j, w)| (self.names[j].as_str(), w))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Cheapest direct edge from `from` to `to`.
    pub fn edge_weight(&self, from: &str, to: &str) -> Option<f64> {
        let from = *self.index.get(&key(from))?;
        let to = *self.index.get(&key(to))?;
        self.adjacency[from]
            .iter()
            .filter(|&&(j, _)| j == to)
            .map(|&(_, w)| w)
            .min_by(f64::total_cmp)
    }

    /// Lowest-cost route from `start` to `end`, both inclusive.
    ///
    /// Empty if either endpoint is unknown or `end` is unreachable.  A path
    /// from a node to itself is that single node.
    pub fn shortest_path(&self, start: &str, end: &str) -> Vec<String> {
        let (Some(&source), Some(&target)) = (self.index.get(&key(start)), self.index.get(&key(end)))
        else {
            warn!(graph = %self.id, start, end, "path endpoint not in graph");
            return Vec::new();
        };

        let mut dist = vec![f64::INFINITY; self.names.len()];
        let mut prev: Vec<Option<usize>> = vec![None; self.names.len()];
        let mut frontier = BinaryHeap::new();
        let mut seq = 0u64;

        dist[source] = 0.0;
        frontier.push(Frontier { cost: 0.0, seq, node: source });

        while let Some(Frontier { cost, node, .. }) = frontier.pop() {
            if node == target {
                break;
            }
            if cost > dist[node] {
                continue;
            }
            for &(next, weight) in &self.adjacency[node] {
                let candidate = cost + weight;
                if candidate < dist[next] {
                    dist[next] = candidate;
                    prev[next] = Some(node);
                    seq += 1;
                    frontier.push(Frontier { cost: candidate, seq, node: next });
                }
            }
        }

        if dist[target].is_infinite() {
            warn!(graph = %self.id, start, end, "destination unreachable");
            return Vec::new();
        }

        let mut path = vec![self.names[target].clone()];
        let mut cursor = target;
        while let Some(p) = prev[cursor] {
            path.push(self.names[p].clone());
            cursor = p;
        }
        path.reverse();
        path
    }

    /// Sum of edge weights along `path`, or `None` if a hop is not an edge.
    /// A single-node path costs zero.
    pub fn path_cost<S: AsRef<str>>(&self, path: &[S]) -> Option<f64> {
        if path.is_empty() {
            return None;
        }
        if path.len() == 1 {
            return self.contains(path[0].as_ref()).then_some(0.0);
        }
        path.windows(2)
            .map(|hop| self.edge_weight(hop[0].as_ref(), hop[1].as_ref()))
            .sum()
    }

    /// Index of `name`, adding it if new.  `None` when it already existed.
    fn intern(&mut self, name: &str) -> Option<usize> {
        let k = key(name);
        if self.index.contains_key(&k) {
            return None;
        }
        let i = self.names.len();
        self.names.push(name.to_string());
        self.adjacency.push(Vec::new());
        self.index.insert(k, i);
        Some(i)
    }

    fn node_or_synthesise(&mut self, name: &str) -> usize {
        if let Some(&i) = self.index.get(&key(name)) {
            return i;
        }
        warn!(graph = %self.id, node = %name, "edge references undeclared node; synthesising");
        self.intern(name).unwrap_or_default()
    }
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Min-heap entry: lowest cost first, earliest discovery on ties.
#[derive(Debug)]
struct Frontier {
    cost: f64,
    seq: u64,
    node: usize,
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}
