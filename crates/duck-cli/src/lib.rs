//! Shared helpers for the duck CLI binaries.

use anyhow::{anyhow, Context, Result};
use duck_core::{Location, WeatherKind};

/// Parse `LAT,LON` into a validated location.
pub fn parse_point(value: &str) -> Result<Location> {
    let (lat, lon) = value
        .split_once(',')
        .ok_or_else(|| anyhow!("expected LAT,LON, got {value:?}"))?;
    let lat: f64 = lat.trim().parse().context("latitude is not a number")?;
    let lon: f64 = lon.trim().parse().context("longitude is not a number")?;
    Ok(Location::new(lat, lon)?)
}

/// Weather source selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeatherChoice {
    Fixed(WeatherKind),
    OpenMeteo,
}

pub fn parse_weather(value: &str) -> Result<WeatherChoice> {
    match value.trim().to_ascii_lowercase().as_str() {
        "open-meteo" | "openmeteo" | "live" => Ok(WeatherChoice::OpenMeteo),
        other => other
            .parse::<WeatherKind>()
            .map(WeatherChoice::Fixed)
            .map_err(|err| anyhow!(err)),
    }
}
