//! Dijkstra shortest-path search over a [`RouteGraph`].

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::error::RouteError;
use crate::route_graph::{GraphNode, NodeIndex, RouteGraph};

#[derive(Debug, Clone)]
pub struct PathResult {
    pub nodes: Vec<GraphNode>,
    pub total_distance_km: f64,
    pub total_cost: f64,
    pub nodes_visited: usize,
}

#[derive(Debug, Clone, Copy)]
struct FloatOrd(f64);

impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Heap entry; ties on cost break on the lower node index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OpenNode {
    cost: FloatOrd,
    index: NodeIndex,
}

fn no_path(graph: &RouteGraph, start: NodeIndex, end: NodeIndex) -> RouteError {
    let label = |index: NodeIndex| {
        graph
            .node(index)
            .map(|node| node.id.clone())
            .unwrap_or_else(|| index.to_string())
    };
    RouteError::NoPathFound {
        from: label(start),
        to: label(end),
    }
}

/// Find the cheapest path between two nodes identified by id.
pub fn find_path(graph: &RouteGraph, start_id: &str, end_id: &str) -> Result<PathResult, RouteError> {
    if graph.is_empty() {
        return Err(RouteError::EmptyGraph);
    }
    let missing = || RouteError::NoPathFound {
        from: start_id.to_string(),
        to: end_id.to_string(),
    };
    let start = graph.index_of(start_id).ok_or_else(missing)?;
    let end = graph.index_of(end_id).ok_or_else(missing)?;
    find_path_by_index(graph, start, end)
}

/// Find the cheapest path between two node indices.
pub fn find_path_by_index(
    graph: &RouteGraph,
    start: NodeIndex,
    end: NodeIndex,
) -> Result<PathResult, RouteError> {
    let n = graph.len();
    if n == 0 {
        return Err(RouteError::EmptyGraph);
    }
    if start >= n || end >= n {
        return Err(no_path(graph, start, end));
    }

    if start == end {
        return Ok(PathResult {
            nodes: vec![graph.nodes()[start].clone()],
            total_distance_km: 0.0,
            total_cost: 0.0,
            nodes_visited: 1,
        });
    }

    if n == 2 {
        let edge = graph.edge(start, end).ok_or_else(|| no_path(graph, start, end))?;
        return Ok(PathResult {
            nodes: vec![graph.nodes()[start].clone(), graph.nodes()[end].clone()],
            total_distance_km: edge.distance_km,
            total_cost: edge.cost,
            nodes_visited: 2,
        });
    }

    let mut dist = vec![f64::INFINITY; n];
    let mut previous: Vec<Option<NodeIndex>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut open_set: BinaryHeap<Reverse<OpenNode>> = BinaryHeap::new();
    let mut nodes_visited = 0usize;

    dist[start] = 0.0;
    open_set.push(Reverse(OpenNode {
        cost: FloatOrd(0.0),
        index: start,
    }));

    while let Some(Reverse(current)) = open_set.pop() {
        let index = current.index;
        if visited[index] {
            continue;
        }
        visited[index] = true;
        nodes_visited += 1;

        if index == end {
            break;
        }

        for edge in graph.edges_from(index) {
            if visited[edge.to] {
                continue;
            }
            let tentative = dist[index] + edge.cost;
            if tentative < dist[edge.to] {
                dist[edge.to] = tentative;
                previous[edge.to] = Some(index);
                open_set.push(Reverse(OpenNode {
                    cost: FloatOrd(tentative),
                    index: edge.to,
                }));
            }
        }
    }

    if !dist[end].is_finite() {
        return Err(no_path(graph, start, end));
    }

    let mut indices = vec![end];
    let mut cursor = end;
    while let Some(prev) = previous[cursor] {
        indices.push(prev);
        cursor = prev;
        if indices.len() > n {
            break;
        }
    }
    if cursor != start {
        return Err(no_path(graph, start, end));
    }
    indices.reverse();

    let mut total_distance_km = 0.0;
    let mut total_cost = 0.0;
    for pair in indices.windows(2) {
        let edge = graph
            .edge(pair[0], pair[1])
            .ok_or_else(|| no_path(graph, start, end))?;
        total_distance_km += edge.distance_km;
        total_cost += edge.cost;
    }

    Ok(PathResult {
        nodes: indices
            .into_iter()
            .map(|index| graph.nodes()[index].clone())
            .collect(),
        total_distance_km,
        total_cost,
        nodes_visited,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Location;
    use crate::route_graph::{build_graph, build_waypoints};
    use crate::terrain::{BoundingBoxClassifier, TerrainKind, UniformTerrain};

    fn at(lat: f64, lon: f64) -> Location {
        Location::new(lat, lon).unwrap()
    }

    fn node(id: &str, lat: f64, lon: f64, terrain: TerrainKind) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            location: at(lat, lon),
            terrain,
            altitude_m: terrain.altitude_m(),
        }
    }

    #[test]
    fn path_runs_from_start_to_end() {
        let start = at(40.7128, -74.0060);
        let end = at(51.5074, -0.1278);
        let nodes =
            build_waypoints(&start, &end, 500.0, &BoundingBoxClassifier::default()).unwrap();
        let last_id = nodes.last().unwrap().id.clone();
        let graph = build_graph(nodes);
        let result = find_path(&graph, "wp-0", &last_id).unwrap();

        assert!(result.nodes.first().unwrap().location.same_point(&start));
        assert!(result.nodes.last().unwrap().location.same_point(&end));
        assert!(result.total_distance_km > 0.0);
        assert!((result.total_distance_km - 5570.0).abs() < 50.0);
    }

    #[test]
    fn degenerate_route_has_zero_distance() {
        let p = at(48.8566, 2.3522);
        let nodes = build_waypoints(&p, &p, 500.0, &UniformTerrain(TerrainKind::Urban)).unwrap();
        let graph = build_graph(nodes);
        let result = find_path(&graph, "wp-0", "wp-1").unwrap();
        assert_eq!(result.nodes.len(), 2);
        assert_eq!(result.total_distance_km, 0.0);
    }

    #[test]
    fn unreachable_destination_is_no_path() {
        let nodes = vec![
            node("a", 0.0, 0.0, TerrainKind::Land),
            node("b", 0.0, 1.0, TerrainKind::Land),
            node("c", 0.0, 2.0, TerrainKind::Land),
        ];
        let graph = build_graph(nodes);
        // edges only point forward
        let err = find_path(&graph, "c", "a").unwrap_err();
        assert!(matches!(err, RouteError::NoPathFound { .. }));
    }

    #[test]
    fn unknown_node_id_is_no_path() {
        let graph = build_graph(vec![
            node("a", 0.0, 0.0, TerrainKind::Land),
            node("b", 0.0, 1.0, TerrainKind::Land),
        ]);
        assert!(matches!(
            find_path(&graph, "a", "zzz"),
            Err(RouteError::NoPathFound { .. })
        ));
    }

    #[test]
    fn prefers_cheaper_terrain_via_shortcut() {
        // Straight line; middle node 2 is mountain, so the skip 1 -> 3 is cheaper
        // than routing over it.
        let graph = build_graph(vec![
            node("n0", 0.0, 0.0, TerrainKind::Ocean),
            node("n1", 0.0, 1.0, TerrainKind::Ocean),
            node("n2", 0.0, 2.0, TerrainKind::Mountain),
            node("n3", 0.0, 3.0, TerrainKind::Ocean),
            node("n4", 0.0, 4.0, TerrainKind::Ocean),
        ]);
        let result = find_path(&graph, "n0", "n4").unwrap();
        let ids: Vec<&str> = result.nodes.iter().map(|n| n.id.as_str()).collect();
        assert!(!ids.contains(&"n2"), "path went over the mountain: {ids:?}");
        assert_eq!(ids.first(), Some(&"n0"));
        assert_eq!(ids.last(), Some(&"n4"));
    }

    #[test]
    fn cost_is_sum_of_edges() {
        let graph = build_graph(vec![
            node("a", 0.0, 0.0, TerrainKind::Land),
            node("b", 0.0, 1.0, TerrainKind::Land),
            node("c", 0.0, 2.0, TerrainKind::Land),
        ]);
        let result = find_path(&graph, "a", "c").unwrap();
        let ab = graph.edge(0, 1).unwrap();
        let bc = graph.edge(1, 2).unwrap();
        assert!((result.total_cost - (ab.cost + bc.cost)).abs() < 1e-9);
        assert!((result.total_distance_km - (ab.distance_km + bc.distance_km)).abs() < 1e-9);
    }
}
