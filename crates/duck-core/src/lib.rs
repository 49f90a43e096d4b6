pub mod error;
pub mod geo;
pub mod models;
pub mod pathfinder;
pub mod planner;
pub mod route_graph;
pub mod scoring;
pub mod terrain;

pub use error::{LocationError, RouteError};
pub use geo::{bearing, bearing_deg, destination_point, haversine_km, interpolate};
pub use models::{
    path_length_km, Flight, FlightProgress, FlightStatus, JourneyResult, Location, WeatherKind,
    WeatherSample, Waypoint,
};
pub use pathfinder::{find_path, find_path_by_index, PathResult};
pub use planner::{travel_duration, PlannedRoute, RouteOptions, RoutePlanner};
pub use route_graph::{build_graph, build_waypoints, GraphEdge, GraphNode, RouteGraph};
pub use scoring::{compute_points, journey_result};
pub use terrain::{BoundingBoxClassifier, TerrainBox, TerrainClassifier, TerrainKind, UniformTerrain};
