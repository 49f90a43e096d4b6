//! Route planning facade: waypoint synthesis, graph build and search in one call.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RouteError;
use crate::models::{Location, Waypoint};
use crate::pathfinder::{find_path_by_index, PathResult};
use crate::route_graph::{build_graph, build_waypoints};
use crate::terrain::{BoundingBoxClassifier, TerrainClassifier};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteOptions {
    /// Maximum distance between consecutive synthesized nodes.
    pub max_segment_km: f64,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            max_segment_km: 500.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedRoute {
    pub waypoints: Vec<Waypoint>,
    pub total_distance_km: f64,
    pub total_cost: f64,
    pub nodes_visited: usize,
}

/// Time needed to cover `distance_km` at `speed_kmh`.
///
/// Non-positive speeds yield zero; absurdly long results saturate at ten years.
pub fn travel_duration(distance_km: f64, speed_kmh: f64) -> Duration {
    if !(speed_kmh.is_finite() && speed_kmh > 0.0) || !distance_km.is_finite() {
        return Duration::zero();
    }
    const MAX_MS: f64 = 10.0 * 365.0 * 24.0 * 3_600_000.0;
    let ms = (distance_km.max(0.0) / speed_kmh * 3_600_000.0).min(MAX_MS);
    Duration::milliseconds(ms.round() as i64)
}

/// Plans great-circle routes with a pluggable terrain classifier.
#[derive(Clone)]
pub struct RoutePlanner {
    classifier: Arc<dyn TerrainClassifier>,
    options: RouteOptions,
}

impl std::fmt::Debug for RoutePlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutePlanner")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for RoutePlanner {
    fn default() -> Self {
        Self::new(Arc::new(BoundingBoxClassifier::default()), RouteOptions::default())
    }
}

impl RoutePlanner {
    pub fn new(classifier: Arc<dyn TerrainClassifier>, options: RouteOptions) -> Self {
        Self {
            classifier,
            options,
        }
    }

    /// Run the graph search between two locations.
    pub fn find(&self, start: &Location, end: &Location) -> Result<PathResult, RouteError> {
        let nodes = build_waypoints(
            start,
            end,
            self.options.max_segment_km,
            self.classifier.as_ref(),
        )?;
        let last = nodes.len().saturating_sub(1);
        let graph = build_graph(nodes);
        find_path_by_index(&graph, 0, last)
    }

    /// Plan a timed path departing at `departure` and flown at `speed_kmh`.
    pub fn plan(
        &self,
        start: &Location,
        end: &Location,
        departure: DateTime<Utc>,
        speed_kmh: f64,
    ) -> Result<PlannedRoute, RouteError> {
        let result = self.find(start, end)?;

        let mut waypoints = Vec::with_capacity(result.nodes.len());
        let mut elapsed_km = 0.0;
        let mut previous: Option<&Location> = None;
        for node in &result.nodes {
            if let Some(prev) = previous {
                elapsed_km += prev.distance_km(&node.location);
            }
            waypoints.push(Waypoint {
                latitude: node.location.latitude(),
                longitude: node.location.longitude(),
                altitude_m: node.altitude_m,
                sequence_time: departure + travel_duration(elapsed_km, speed_kmh),
            });
            previous = Some(&node.location);
        }

        Ok(PlannedRoute {
            waypoints,
            total_distance_km: result.total_distance_km,
            total_cost: result.total_cost,
            nodes_visited: result.nodes_visited,
        })
    }
}
