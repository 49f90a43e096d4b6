//! Server and simulator configuration from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use duck_core::RouteOptions;
use serde::{Deserialize, Serialize};

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<f64>(key)
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    /// Empty disables the live provider and flies in clear weather.
    pub weather_provider_url: String,
    pub weather_cache_ttl_s: u64,
    pub weather_cache_max_entries: usize,
    pub weather_request_timeout_s: u64,
    pub delivery_webhook_url: Option<String>,
    pub simulator: SimulatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            weather_provider_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            weather_cache_ttl_s: 600,
            weather_cache_max_entries: 4096,
            weather_request_timeout_s: 8,
            delivery_webhook_url: None,
            simulator: SimulatorConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: env_parse("DUCK_PORT").unwrap_or(defaults.server_port),
            weather_provider_url: env::var("DUCK_WEATHER_URL")
                .unwrap_or(defaults.weather_provider_url),
            weather_cache_ttl_s: env_parse("DUCK_WEATHER_CACHE_TTL_S")
                .unwrap_or(defaults.weather_cache_ttl_s),
            weather_cache_max_entries: env_parse("DUCK_WEATHER_CACHE_MAX_ENTRIES")
                .unwrap_or(defaults.weather_cache_max_entries),
            weather_request_timeout_s: env_parse("DUCK_WEATHER_TIMEOUT_S")
                .unwrap_or(defaults.weather_request_timeout_s),
            delivery_webhook_url: env::var("DUCK_DELIVERY_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            simulator: SimulatorConfig::from_env(),
        }
    }
}

/// What happens to a flight still en route after `max_flight_duration`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutPolicy {
    /// Land the duck at its destination and deliver as usual.
    #[default]
    Complete,
    /// Drop the flight without delivery.
    Cancel,
    /// Keep flying.
    Ignore,
}

impl FromStr for TimeoutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "complete" => Ok(TimeoutPolicy::Complete),
            "cancel" => Ok(TimeoutPolicy::Cancel),
            "ignore" => Ok(TimeoutPolicy::Ignore),
            other => Err(format!("unknown timeout policy: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub base_speed_kmh: f64,
    pub progress_tick_interval: Duration,
    pub weather_tick_interval: Duration,
    pub max_flight_duration: Duration,
    pub timeout_policy: TimeoutPolicy,
    /// Upper bound for a single weather provider call.
    pub weather_timeout: Duration,
    /// Upper bound for a single delivery notification.
    pub delivery_timeout: Duration,
    /// Minimum absolute change in speed multiplier that counts as new weather.
    pub weather_change_threshold: f64,
    /// Storm intensity above which the route is recomputed.
    pub severe_storm_intensity: f64,
    pub route: RouteOptions,
    pub event_capacity: usize,
    pub result_archive_max_entries: usize,
    pub result_archive_ttl: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            base_speed_kmh: 50.0,
            progress_tick_interval: Duration::from_secs(30),
            weather_tick_interval: Duration::from_secs(5 * 60),
            max_flight_duration: Duration::from_secs(48 * 3600),
            timeout_policy: TimeoutPolicy::Complete,
            weather_timeout: Duration::from_secs(10),
            delivery_timeout: Duration::from_secs(10),
            weather_change_threshold: 0.2,
            severe_storm_intensity: 0.7,
            route: RouteOptions::default(),
            event_capacity: 256,
            result_archive_max_entries: 1024,
            result_archive_ttl: Duration::from_secs(24 * 3600),
        }
    }
}

impl SimulatorConfig {
    /// Defaults overridden by `DUCK_*` variables; unparsable values are ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut route = defaults.route.clone();
        if let Some(km) = env_parse::<f64>("DUCK_MAX_SEGMENT_KM").filter(|km| *km > 0.0) {
            route.max_segment_km = km;
        }

        Self {
            base_speed_kmh: env_parse::<f64>("DUCK_BASE_SPEED_KMH")
                .filter(|speed| speed.is_finite() && *speed > 0.0)
                .unwrap_or(defaults.base_speed_kmh),
            progress_tick_interval: env_secs("DUCK_PROGRESS_TICK_S")
                .unwrap_or(defaults.progress_tick_interval),
            weather_tick_interval: env_secs("DUCK_WEATHER_TICK_S")
                .unwrap_or(defaults.weather_tick_interval),
            max_flight_duration: env_parse::<f64>("DUCK_MAX_FLIGHT_HOURS")
                .filter(|hours| hours.is_finite() && *hours > 0.0)
                .map(|hours| Duration::from_secs_f64(hours * 3600.0))
                .unwrap_or(defaults.max_flight_duration),
            timeout_policy: env_parse("DUCK_TIMEOUT_POLICY").unwrap_or(defaults.timeout_policy),
            weather_timeout: env_secs("DUCK_WEATHER_CALL_TIMEOUT_S")
                .unwrap_or(defaults.weather_timeout),
            delivery_timeout: env_secs("DUCK_DELIVERY_TIMEOUT_S")
                .unwrap_or(defaults.delivery_timeout),
            weather_change_threshold: env_parse("DUCK_WEATHER_CHANGE_THRESHOLD")
                .unwrap_or(defaults.weather_change_threshold),
            severe_storm_intensity: env_parse("DUCK_SEVERE_STORM_INTENSITY")
                .unwrap_or(defaults.severe_storm_intensity),
            route,
            event_capacity: defaults.event_capacity,
            result_archive_max_entries: env_parse("DUCK_RESULT_ARCHIVE_MAX")
                .unwrap_or(defaults.result_archive_max_entries),
            result_archive_ttl: defaults.result_archive_ttl,
        }
    }

    pub fn with_base_speed(mut self, base_speed_kmh: f64) -> Self {
        self.base_speed_kmh = base_speed_kmh;
        self
    }

    pub fn with_ticks(mut self, progress: Duration, weather: Duration) -> Self {
        self.progress_tick_interval = progress;
        self.weather_tick_interval = weather;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SimulatorConfig::default();
        assert_eq!(cfg.base_speed_kmh, 50.0);
        assert_eq!(cfg.progress_tick_interval, Duration::from_secs(30));
        assert_eq!(cfg.weather_tick_interval, Duration::from_secs(300));
        assert_eq!(cfg.max_flight_duration, Duration::from_secs(172_800));
        assert_eq!(cfg.timeout_policy, TimeoutPolicy::Complete);
    }

    #[test]
    fn timeout_policy_parses() {
        assert_eq!("Cancel".parse::<TimeoutPolicy>(), Ok(TimeoutPolicy::Cancel));
        assert_eq!(" ignore ".parse::<TimeoutPolicy>(), Ok(TimeoutPolicy::Ignore));
        assert!("explode".parse::<TimeoutPolicy>().is_err());
    }
}
