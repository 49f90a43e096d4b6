//! Shared application state handed to every handler.

use crate::config::Config;
use crate::simulator::FlightSimulator;

pub struct AppState {
    simulator: FlightSimulator,
    config: Config,
}

impl AppState {
    pub fn new(config: Config, simulator: FlightSimulator) -> Self {
        Self { simulator, config }
    }

    pub fn simulator(&self) -> &FlightSimulator {
        &self.simulator
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
