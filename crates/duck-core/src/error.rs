//! Error types shared by the core crate.

use thiserror::Error;

/// Coordinates outside the valid WGS84 range, or not finite.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("invalid location: latitude {latitude}, longitude {longitude}")]
pub struct LocationError {
    pub latitude: f64,
    pub longitude: f64,
}

/// Failures of route planning.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    #[error(transparent)]
    InvalidLocation(#[from] LocationError),

    /// The destination is unreachable from the source in the built graph.
    #[error("no path found from {from} to {to}")]
    NoPathFound { from: String, to: String },

    #[error("route graph has no nodes")]
    EmptyGraph,

    #[error("max segment length must be positive, got {0}")]
    InvalidSegmentLength(f64),
}
