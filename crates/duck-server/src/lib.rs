//! Duck courier flight simulator: scheduling, weather, delivery and HTTP API.

pub mod api;
pub mod cache;
pub mod config;
pub mod delivery;
pub mod simulator;
pub mod state;
pub mod weather;

pub use config::{Config, SimulatorConfig, TimeoutPolicy};
pub use simulator::{FlightError, FlightEvent, FlightSimulator, ProgressCallback};
