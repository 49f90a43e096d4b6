//! Waypoint graph synthesis along the great circle between two points.
//!
//! Nodes are spaced evenly along the initial great-circle bearing. Each node
//! connects to its successor, and (for graphs with more than four nodes) to
//! the nodes two and three steps ahead when that shortcut is close enough to
//! the chained distance. The extra edges let the search trade a slightly
//! longer hop for cheaper terrain without blowing up the search space.

use serde::{Deserialize, Serialize};

use crate::error::RouteError;
use crate::geo::{bearing, destination_point, haversine_km};
use crate::models::Location;
use crate::terrain::{TerrainClassifier, TerrainKind};

/// Below this distance a route is just its two endpoints.
pub const DEGENERATE_ROUTE_KM: f64 = 0.1;
/// Shortcut edges must be within this ratio of the chained distance.
pub const SHORTCUT_TOLERANCE: f64 = 0.3;
const SHORTCUT_MIN_NODES: usize = 5;
const SHORTCUT_MAX_SKIP: usize = 3;

pub type NodeIndex = usize;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub location: Location,
    pub terrain: TerrainKind,
    pub altitude_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: NodeIndex,
    pub to: NodeIndex,
    pub distance_km: f64,
    pub cost: f64,
}

/// Adjacency-list graph over the nodes of one route computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteGraph {
    nodes: Vec<GraphNode>,
    adjacency: Vec<Vec<GraphEdge>>,
}

impl RouteGraph {
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node(&self, index: NodeIndex) -> Option<&GraphNode> {
        self.nodes.get(index)
    }

    pub fn edges_from(&self, index: NodeIndex) -> &[GraphEdge] {
        self.adjacency.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.nodes.iter().position(|node| node.id == id)
    }

    /// Direct edge between two nodes, if one exists.
    pub fn edge(&self, from: NodeIndex, to: NodeIndex) -> Option<&GraphEdge> {
        self.edges_from(from).iter().find(|edge| edge.to == to)
    }
}

fn node_id(index: usize) -> String {
    format!("wp-{index}")
}

fn make_node(index: usize, location: Location, classifier: &dyn TerrainClassifier) -> GraphNode {
    let terrain = classifier.classify(&location);
    GraphNode {
        id: node_id(index),
        altitude_m: terrain.altitude_m(),
        terrain,
        location,
    }
}

/// Synthesize route nodes from `start` to `end`.
///
/// Routes shorter than [`DEGENERATE_ROUTE_KM`] collapse to the two endpoints.
/// Otherwise the route is cut into `ceil(distance / max_segment_km)` equal
/// segments; the first and last nodes are the endpoints themselves.
pub fn build_waypoints(
    start: &Location,
    end: &Location,
    max_segment_km: f64,
    classifier: &dyn TerrainClassifier,
) -> Result<Vec<GraphNode>, RouteError> {
    if !(max_segment_km.is_finite() && max_segment_km > 0.0) {
        return Err(RouteError::InvalidSegmentLength(max_segment_km));
    }

    let distance_km = start.distance_km(end);
    if distance_km < DEGENERATE_ROUTE_KM {
        return Ok(vec![
            make_node(0, start.clone(), classifier),
            make_node(1, end.clone(), classifier),
        ]);
    }

    let segments = (distance_km / max_segment_km).ceil().max(1.0) as usize;
    let heading = bearing(
        start.latitude(),
        start.longitude(),
        end.latitude(),
        end.longitude(),
    );
    let step_km = distance_km / segments as f64;

    let mut nodes = Vec::with_capacity(segments + 1);
    nodes.push(make_node(0, start.clone(), classifier));
    for i in 1..segments {
        let (lat, lon) = destination_point(
            start.latitude(),
            start.longitude(),
            step_km * i as f64,
            heading,
        );
        let location = Location::new(lat, lon)?;
        nodes.push(make_node(i, location, classifier));
    }
    nodes.push(make_node(segments, end.clone(), classifier));

    Ok(nodes)
}

/// Penalty for abrupt cruise altitude changes between two nodes.
pub fn altitude_modifier(delta_altitude_m: f64) -> f64 {
    let delta = delta_altitude_m.abs();
    if delta <= 1000.0 {
        1.0
    } else if delta <= 2000.0 {
        0.9
    } else {
        0.8
    }
}

fn node_distance(a: &GraphNode, b: &GraphNode) -> f64 {
    haversine_km(
        a.location.latitude(),
        a.location.longitude(),
        b.location.latitude(),
        b.location.longitude(),
    )
}

fn make_edge(nodes: &[GraphNode], from: NodeIndex, to: NodeIndex, distance_km: f64) -> GraphEdge {
    let a = &nodes[from];
    let b = &nodes[to];
    let terrain = (a.terrain.speed_modifier() + b.terrain.speed_modifier()) / 2.0;
    let altitude = altitude_modifier(b.altitude_m - a.altitude_m);
    // Zero-length edges still need a positive cost for the search.
    let cost = (distance_km / (terrain * altitude)).max(f64::MIN_POSITIVE);
    GraphEdge {
        from,
        to,
        distance_km,
        cost,
    }
}

/// Connect nodes into a search graph.
pub fn build_graph(nodes: Vec<GraphNode>) -> RouteGraph {
    let n = nodes.len();
    let mut adjacency: Vec<Vec<GraphEdge>> = vec![Vec::new(); n];

    let successor_km: Vec<f64> = nodes
        .windows(2)
        .map(|pair| node_distance(&pair[0], &pair[1]))
        .collect();

    for (i, distance_km) in successor_km.iter().enumerate() {
        adjacency[i].push(make_edge(&nodes, i, i + 1, *distance_km));
    }

    if n >= SHORTCUT_MIN_NODES {
        for i in 0..n {
            for skip in 2..=SHORTCUT_MAX_SKIP {
                let j = i + skip;
                if j >= n {
                    break;
                }
                let chained: f64 = successor_km[i..j].iter().sum();
                let direct = node_distance(&nodes[i], &nodes[j]);
                let within = (direct - chained).abs() <= chained * SHORTCUT_TOLERANCE;
                if within {
                    adjacency[i].push(make_edge(&nodes, i, j, direct));
                }
            }
        }
    }

    RouteGraph { nodes, adjacency }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::{BoundingBoxClassifier, UniformTerrain};

    fn at(lat: f64, lon: f64) -> Location {
        Location::new(lat, lon).unwrap()
    }

    #[test]
    fn identical_points_are_degenerate() {
        let p = at(10.0, 10.0);
        let nodes = build_waypoints(&p, &p, 500.0, &UniformTerrain(TerrainKind::Land)).unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(nodes[0].location.same_point(&p));
        assert!(nodes[1].location.same_point(&p));
    }

    #[test]
    fn segments_respect_max_length() {
        let start = at(40.7128, -74.0060);
        let end = at(51.5074, -0.1278);
        let nodes =
            build_waypoints(&start, &end, 500.0, &BoundingBoxClassifier::default()).unwrap();
        // ~5570 km / 500 km => 12 segments => 13 nodes
        assert_eq!(nodes.len(), 13);
        for pair in nodes.windows(2) {
            assert!(node_distance(&pair[0], &pair[1]) <= 500.0 + 1e-6);
        }
        assert!(nodes[0].location.same_point(&start));
        assert!(nodes[12].location.same_point(&end));
        assert_eq!(nodes[0].terrain, TerrainKind::Urban);
        assert!(nodes.iter().any(|node| node.terrain == TerrainKind::Ocean));
    }

    #[test]
    fn rejects_non_positive_segment_length() {
        let err = build_waypoints(&at(0.0, 0.0), &at(1.0, 1.0), 0.0, &UniformTerrain(TerrainKind::Land));
        assert!(matches!(err, Err(RouteError::InvalidSegmentLength(_))));
    }

    #[test]
    fn small_graphs_have_only_successor_edges() {
        let nodes =
            build_waypoints(&at(0.0, 0.0), &at(0.0, 2.5), 100.0, &UniformTerrain(TerrainKind::Land))
                .unwrap();
        assert_eq!(nodes.len(), 4);
        let graph = build_graph(nodes);
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn large_graphs_get_shortcuts() {
        let nodes =
            build_waypoints(&at(0.0, 0.0), &at(0.0, 10.0), 100.0, &UniformTerrain(TerrainKind::Land))
                .unwrap();
        let n = nodes.len();
        assert!(n > 4);
        let graph = build_graph(nodes);
        assert!(graph.edge(0, 2).is_some());
        assert!(graph.edge(0, 3).is_some());
        assert!(graph.edge(0, 4).is_none());
        // successors + skip-2 + skip-3
        assert_eq!(graph.edge_count(), (n - 1) + (n - 2) + (n - 3));
    }

    #[test]
    fn edge_cost_applies_terrain_and_altitude() {
        let nodes = vec![
            GraphNode {
                id: "a".into(),
                location: at(0.0, 0.0),
                terrain: TerrainKind::Ocean,
                altitude_m: TerrainKind::Ocean.altitude_m(),
            },
            GraphNode {
                id: "b".into(),
                location: at(0.0, 1.0),
                terrain: TerrainKind::Mountain,
                altitude_m: TerrainKind::Mountain.altitude_m(),
            },
        ];
        let graph = build_graph(nodes);
        let edge = graph.edge(0, 1).unwrap();
        let expected = edge.distance_km / (((1.2 + 0.7) / 2.0) * 0.8);
        assert!((edge.cost - expected).abs() < 1e-9);
    }

    #[test]
    fn altitude_modifier_bands() {
        assert_eq!(altitude_modifier(-1000.0), 1.0);
        assert_eq!(altitude_modifier(1500.0), 0.9);
        assert_eq!(altitude_modifier(2900.0), 0.8);
    }
}
